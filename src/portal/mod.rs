//! Typing billing values into the school portal.
//!
//! The portal has no API: values are entered through a browser driven over
//! WebDriver, locating each input by the tooltip of its cell.

pub mod import;
pub mod plan;
pub mod session;
pub mod sheet;
pub mod tooltip;
pub mod webdriver;

pub use import::{run_import, ImportOptions, ImportOutcome};
pub use session::ClickeduPortal;
pub use sheet::ImportSheet;
