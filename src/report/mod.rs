//! Summary output.

pub mod generator;

pub use generator::{
    generate_csv_report, generate_json_report, output_file_name, render_rates, render_table,
    write_report,
};
