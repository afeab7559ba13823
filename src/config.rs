//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.billsync.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".billsync.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Attendance export layout.
    #[serde(default)]
    pub attendance: AttendanceConfig,

    /// Pricing and output columns.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Billing portal automation.
    #[serde(default)]
    pub portal: PortalConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory where summaries are written when no output file is given.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Layout of the attendance export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceConfig {
    /// Text encoding label of the export (any WHATWG label).
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Field separator.
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Summary rows at the end of the export that carry no student data.
    #[serde(default = "default_footer_rows")]
    pub footer_rows: usize,

    #[serde(default = "default_student_column")]
    pub student_column: String,

    #[serde(default = "default_year_column")]
    pub year_column: String,

    #[serde(default = "default_category_column")]
    pub category_column: String,

    /// Rate type column; also names the output file.
    #[serde(default = "default_rate_column")]
    pub rate_column: String,

    /// Columns ignored entirely.
    #[serde(default = "default_dropped_columns")]
    pub dropped_columns: Vec<String>,

    #[serde(default = "default_permanent_label")]
    pub permanent_label: String,

    #[serde(default = "default_temporary_label")]
    pub temporary_label: String,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            separator: default_separator(),
            footer_rows: default_footer_rows(),
            student_column: default_student_column(),
            year_column: default_year_column(),
            category_column: default_category_column(),
            rate_column: default_rate_column(),
            dropped_columns: default_dropped_columns(),
            permanent_label: default_permanent_label(),
            temporary_label: default_temporary_label(),
        }
    }
}

fn default_encoding() -> String {
    "ISO-8859-1".to_string()
}

fn default_separator() -> char {
    ';'
}

fn default_footer_rows() -> usize {
    4
}

fn default_student_column() -> String {
    "Resum d'assistència".to_string()
}

fn default_year_column() -> String {
    "Curs/classe".to_string()
}

fn default_category_column() -> String {
    "Inscripció".to_string()
}

fn default_rate_column() -> String {
    "Tarifa".to_string()
}

fn default_dropped_columns() -> Vec<String> {
    vec![
        "Dates",
        "Menú",
        "presents",
        "absències",
        "percentatge",
        "Total",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_permanent_label() -> String {
    "Inscripció permanent".to_string()
}

fn default_temporary_label() -> String {
    "Inscripció puntual".to_string()
}

/// Pricing rules and output column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Absences up to this count are not refunded (Acollida only).
    #[serde(default = "default_min_days_to_discount")]
    pub min_days_to_discount: u32,

    /// Decimal separator used when writing amounts.
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: char,

    #[serde(default = "default_level_column")]
    pub level_column: String,

    #[serde(default = "default_charge_column")]
    pub charge_column: String,

    #[serde(default = "default_refund_column")]
    pub refund_column: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            min_days_to_discount: default_min_days_to_discount(),
            decimal_separator: default_decimal_separator(),
            level_column: default_level_column(),
            charge_column: default_charge_column(),
            refund_column: default_refund_column(),
        }
    }
}

fn default_min_days_to_discount() -> u32 {
    9
}

fn default_decimal_separator() -> char {
    ','
}

fn default_level_column() -> String {
    "Nivell".to_string()
}

fn default_charge_column() -> String {
    "Cobrar".to_string()
}

fn default_refund_column() -> String {
    "Devolucions".to_string()
}

/// Billing portal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Page opened when the browser starts; the user logs in manually.
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// WebDriver server (e.g. a running chromedriver).
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_page_title_class")]
    pub page_title_class: String,

    /// Title text that identifies the billing assignment page.
    #[serde(default = "default_page_title")]
    pub page_title: String,

    /// Id of the table holding the billing fields.
    #[serde(default = "default_table_id")]
    pub table_id: String,

    /// Column of the import sheet with the student name.
    #[serde(default = "default_name_column")]
    pub name_column: String,

    /// Time the user has to log in and reach the billing page.
    #[serde(default = "default_page_timeout")]
    pub page_timeout_seconds: u64,

    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,

    /// Time to wait for a field's checkbox to become clickable.
    #[serde(default = "default_field_timeout")]
    pub field_timeout_seconds: u64,

    /// Time the user has to review and save after filling.
    #[serde(default = "default_save_timeout")]
    pub save_timeout_seconds: u64,

    #[serde(default = "default_click_pause")]
    pub click_pause_millis: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            webdriver_url: default_webdriver_url(),
            page_title_class: default_page_title_class(),
            page_title: default_page_title(),
            table_id: default_table_id(),
            name_column: default_name_column(),
            page_timeout_seconds: default_page_timeout(),
            poll_seconds: default_poll_seconds(),
            field_timeout_seconds: default_field_timeout(),
            save_timeout_seconds: default_save_timeout(),
            click_pause_millis: default_click_pause(),
        }
    }
}

fn default_login_url() -> String {
    "https://santjosep.clickedu.eu/user.php?action=login".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_page_title_class() -> String {
    "titol_pagina".to_string()
}

fn default_page_title() -> String {
    "Assignació de conceptes facturables als usuaris".to_string()
}

fn default_table_id() -> String {
    "unique_id".to_string()
}

fn default_name_column() -> String {
    "Usuari".to_string()
}

fn default_page_timeout() -> u64 {
    60
}

fn default_poll_seconds() -> u64 {
    2
}

fn default_field_timeout() -> u64 {
    10
}

fn default_save_timeout() -> u64 {
    15 * 60
}

fn default_click_pause() -> u64 {
    1000
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if args.verbose {
            self.general.verbose = true;
        }

        match &args.command {
            crate::cli::Command::Summarize(summarize) => {
                if let Some(min_days) = summarize.min_days {
                    self.billing.min_days_to_discount = min_days;
                }
                if let Some(ref dir) = summarize.output_dir {
                    self.general.output_dir = dir.clone();
                }
            }
            crate::cli::Command::Rates(rates) => {
                if let Some(min_days) = rates.min_days {
                    self.billing.min_days_to_discount = min_days;
                }
            }
            crate::cli::Command::Import(import) => {
                if let Some(ref url) = import.webdriver_url {
                    self.portal.webdriver_url = url.clone();
                }
                if let Some(ref url) = import.login_url {
                    self.portal.login_url = url.clone();
                }
            }
            crate::cli::Command::Init => {}
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.attendance.encoding, "ISO-8859-1");
        assert_eq!(config.attendance.footer_rows, 4);
        assert_eq!(config.billing.min_days_to_discount, 9);
        assert_eq!(config.portal.name_column, "Usuari");
        assert!(config
            .attendance
            .dropped_columns
            .contains(&"percentatge".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output_dir = "out"

[attendance]
encoding = "UTF-8"
footer_rows = 2

[billing]
min_days_to_discount = 5
decimal_separator = "."

[portal]
webdriver_url = "http://127.0.0.1:4444"
save_timeout_seconds = 60
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output_dir, PathBuf::from("out"));
        assert_eq!(config.attendance.encoding, "UTF-8");
        assert_eq!(config.attendance.footer_rows, 2);
        assert_eq!(config.attendance.student_column, "Resum d'assistència");
        assert_eq!(config.billing.min_days_to_discount, 5);
        assert_eq!(config.billing.decimal_separator, '.');
        assert_eq!(config.portal.webdriver_url, "http://127.0.0.1:4444");
        assert_eq!(config.portal.save_timeout_seconds, 60);
        assert_eq!(config.portal.page_timeout_seconds, 60);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[attendance]"));
        assert!(toml_str.contains("[billing]"));
        assert!(toml_str.contains("[portal]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.portal.table_id, "unique_id");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[billing]\nmin_days_to_discount = 3\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.billing.min_days_to_discount, 3);
        assert_eq!(config.billing.charge_column, "Cobrar");
    }
}
