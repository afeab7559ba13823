//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Tool;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Billsync - monthly school billing from attendance exports
///
/// Summarizes the daily attendance export into one billing line per
/// student, with charges for temporary students and refunds for
/// permanent ones, and types the results into the billing portal.
///
/// Examples:
///   billsync summarize --attendance october.csv --prices preus.csv --discounts descomptes.csv --tool menjador
///   billsync summarize --attendance october.csv --prices preus.csv --discounts descomptes.csv --tool acollida --min-days 5
///   billsync rates --prices preus.csv --discounts descomptes.csv --tool menjador --charge 10=4.5
///   billsync import Menjador_October.csv
///   billsync init
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .billsync.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate an attendance export into a monthly billing summary
    Summarize(SummarizeArgs),
    /// Print the effective rate tables
    Rates(RatesArgs),
    /// Type a billing sheet into the portal through a WebDriver session
    Import(ImportArgs),
    /// Generate a default .billsync.toml configuration file
    Init,
}

/// Rate table inputs shared by `summarize` and `rates`.
#[derive(ClapArgs, Debug, Clone)]
pub struct RateArgs {
    /// Which billing sheet to produce
    #[arg(long, value_name = "TOOL")]
    pub tool: Tool,

    /// CSV with the prices for temporary students
    ///
    /// Menjador: columns min_days;price. Acollida: columns type;price.
    #[arg(long, value_name = "FILE")]
    pub prices: PathBuf,

    /// CSV with the absence discounts for permanent students
    ///
    /// Menjador: column discount. Acollida: columns type;discount.
    #[arg(long, value_name = "FILE")]
    pub discounts: PathBuf,

    /// Override a price: KEY=AMOUNT, KEY being min_days or type
    #[arg(long = "charge", value_name = "KEY=AMOUNT")]
    pub charge_overrides: Vec<String>,

    /// Override a discount: KEY=AMOUNT for Acollida, AMOUNT for Menjador
    #[arg(long = "refund", value_name = "[KEY=]AMOUNT")]
    pub refund_overrides: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SummarizeArgs {
    /// Attendance export to group
    #[arg(short, long, value_name = "FILE")]
    pub attendance: PathBuf,

    #[command(flatten)]
    pub rates: RateArgs,

    /// Absences not refunded before discounting starts (Acollida)
    #[arg(long, value_name = "DAYS")]
    pub min_days: Option<u32>,

    /// Output file; defaults to <rate>_<Month>.csv in the output directory
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Directory for the generated file name
    #[arg(long, value_name = "DIR", conflicts_with = "output")]
    pub output_dir: Option<PathBuf>,

    /// Output format (csv, json)
    #[arg(long, default_value = "csv", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Print the summary without writing any file
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RatesArgs {
    #[command(flatten)]
    pub rates: RateArgs,

    /// Absences not refunded before discounting starts (Acollida)
    #[arg(long, value_name = "DAYS")]
    pub min_days: Option<u32>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ImportArgs {
    /// Billing sheet with one row per student and one column per concept
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// WebDriver server URL (e.g. a running chromedriver)
    #[arg(long, value_name = "URL", env = "BILLSYNC_WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Page opened when the browser starts
    #[arg(long, value_name = "URL")]
    pub login_url: Option<String>,

    /// Exit with code 2 if any student or concept was not found
    #[arg(long)]
    pub strict: bool,
}

/// Output format for the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Semicolon separated, in the export's encoding (default)
    #[default]
    Csv,
    /// JSON format
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref config) = self.config {
            require_file(config, "Config file")?;
        }

        match &self.command {
            Command::Summarize(summarize) => {
                require_file(&summarize.attendance, "Attendance file")?;
                summarize.rates.validate()?;
            }
            Command::Rates(rates) => rates.rates.validate()?,
            Command::Import(import) => {
                require_file(&import.file, "Billing sheet")?;
                for url in [&import.webdriver_url, &import.login_url].into_iter().flatten() {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        return Err(format!("URL must start with 'http://' or 'https://': {}", url));
                    }
                }
            }
            Command::Init => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

impl RateArgs {
    fn validate(&self) -> Result<(), String> {
        require_file(&self.prices, "Prices file")?;
        require_file(&self.discounts, "Discounts file")?;

        for entry in &self.charge_overrides {
            if !entry.contains('=') {
                return Err(format!("Price override must be KEY=AMOUNT: {}", entry));
            }
        }
        for entry in &self.refund_overrides {
            match self.tool {
                Tool::Acollida if !entry.contains('=') => {
                    return Err(format!("Acollida discount override must be KEY=AMOUNT: {}", entry));
                }
                Tool::Menjador if entry.contains('=') => {
                    return Err(format!("Menjador discount override must be AMOUNT: {}", entry));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn require_file(path: &Path, what: &str) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("{} does not exist: {}", what, path.display()));
    }
    if !path.is_file() {
        return Err(format!("{} is not a file: {}", what, path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rate_args(dir: &TempDir, tool: Tool) -> RateArgs {
        let prices = dir.path().join("preus.csv");
        let discounts = dir.path().join("descomptes.csv");
        std::fs::write(&prices, "min_days;price\n0;5\n").unwrap();
        std::fs::write(&discounts, "discount\n3\n").unwrap();
        RateArgs {
            tool,
            prices,
            discounts,
            charge_overrides: vec![],
            refund_overrides: vec![],
        }
    }

    fn make_args(command: Command) -> Args {
        Args {
            command,
            config: None,
            verbose: false,
            quiet: false,
        }
    }

    fn summarize_args(dir: &TempDir) -> SummarizeArgs {
        let attendance = dir.path().join("assistencia.csv");
        std::fs::write(&attendance, "x\n").unwrap();
        SummarizeArgs {
            attendance,
            rates: rate_args(dir, Tool::Menjador),
            min_days: None,
            output: None,
            output_dir: None,
            format: OutputFormat::Csv,
            dry_run: false,
        }
    }

    #[test]
    fn test_parse_summarize_command() {
        let args = Args::try_parse_from([
            "billsync",
            "summarize",
            "--attendance",
            "a.csv",
            "--prices",
            "p.csv",
            "--discounts",
            "d.csv",
            "--tool",
            "acollida",
            "--charge",
            "Matí=2,5",
            "--refund",
            "Matí=1",
            "--min-days",
            "5",
            "-v",
        ])
        .unwrap();

        assert!(args.verbose);
        match args.command {
            Command::Summarize(s) => {
                assert_eq!(s.rates.tool, Tool::Acollida);
                assert_eq!(s.rates.charge_overrides, vec!["Matí=2,5"]);
                assert_eq!(s.min_days, Some(5));
                assert_eq!(s.format, OutputFormat::Csv);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_validation_valid_summarize() {
        let dir = TempDir::new().unwrap();
        let args = make_args(Command::Summarize(summarize_args(&dir)));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_attendance() {
        let dir = TempDir::new().unwrap();
        let mut summarize = summarize_args(&dir);
        summarize.attendance = dir.path().join("missing.csv");
        let args = make_args(Command::Summarize(summarize));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_acollida_refund_needs_key() {
        let dir = TempDir::new().unwrap();
        let mut rates = rate_args(&dir, Tool::Acollida);
        rates.refund_overrides = vec!["2.5".to_string()];
        let args = make_args(Command::Rates(RatesArgs {
            rates,
            min_days: None,
        }));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_menjador_refund_takes_no_key() {
        let dir = TempDir::new().unwrap();
        let mut rates = rate_args(&dir, Tool::Menjador);
        rates.refund_overrides = vec!["5=2".to_string()];
        let args = make_args(Command::Rates(RatesArgs {
            rates: rates.clone(),
            min_days: None,
        }));
        assert!(args.validate().is_err());

        rates.refund_overrides = vec!["2,5".to_string()];
        let args = make_args(Command::Rates(RatesArgs {
            rates,
            min_days: None,
        }));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("import.csv");
        std::fs::write(&file, "Usuari\n").unwrap();
        let args = make_args(Command::Import(ImportArgs {
            file,
            webdriver_url: Some("localhost:9515".to_string()),
            login_url: None,
            strict: false,
        }));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::Init);
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::Init);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
