//! Billsync - monthly school billing from attendance exports
//!
//! A CLI tool that groups the daily attendance export of the lunch and
//! morning care services into one billing line per student, and types the
//! resulting amounts into the school's billing portal.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid input, missing WebDriver, page timeout, etc.)
//!   2 - `import --strict` could not place every value of the sheet

mod attendance;
mod billing;
mod cli;
mod config;
mod models;
mod portal;
mod report;

use anyhow::{Context, Result};
use attendance::AttendanceReader;
use billing::Rates;
use cli::{Args, Command, ImportArgs, OutputFormat, RateArgs, RatesArgs, SummarizeArgs};
use config::{Config, CONFIG_FILE_NAME};
use models::{Enrollment, SummaryTable};
use portal::{ClickeduPortal, ImportOptions, ImportOutcome, ImportSheet};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init early (no logging needed)
    if matches!(args.command, Command::Init) {
        return handle_init();
    }

    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("Billsync v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config_source);
    debug!("Arguments: {:?}", args);

    match run(&args, &config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Billsync failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle `init`: generate a default .billsync.toml.
fn handle_init() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to match the export columns, labels and portal page.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the subcommand. Returns the exit code.
async fn run(args: &Args, config: &Config) -> Result<i32> {
    match &args.command {
        Command::Summarize(summarize) => run_summarize(summarize, config),
        Command::Rates(rates) => run_rates(rates, config),
        Command::Import(import) => run_import(import, config, args.quiet).await,
        Command::Init => Ok(0),
    }
}

/// Group the attendance export and write the billing summary.
fn run_summarize(args: &SummarizeArgs, config: &Config) -> Result<i32> {
    let start_time = Instant::now();
    let tool = args.rates.tool;

    // Step 1: Read the export
    println!("📥 Reading attendance export: {}", args.attendance.display());
    let sheet = AttendanceReader::new(&config.attendance).read_path(&args.attendance, tool)?;
    println!(
        "   {} rows, {} day columns",
        sheet.records.len(),
        sheet.day_columns.len()
    );

    // Step 2: Rates
    let rates = load_rates(&args.rates, config)?;

    // Step 3: Group and price
    println!("\n🧮 Building {} summary...", tool);
    let table = billing::build_summary(&sheet, tool, &rates, &config.attendance);

    if args.dry_run {
        println!("\n🔍 Dry run: nothing will be written.\n");
        print!("{}", report::render_table(&table, config));
        print_summary(&table, config, start_time);
        println!("\n✅ Dry run complete.");
        return Ok(0);
    }

    // Step 4: Write
    println!("\n📝 Writing summary...");
    let content = match args.format {
        OutputFormat::Csv => report::generate_csv_report(&table, config)?,
        OutputFormat::Json => report::generate_json_report(&table)?.into_bytes(),
    };

    let path = match &args.output {
        Some(path) => path.clone(),
        None => config
            .general
            .output_dir
            .join(report::output_file_name(&table, args.format)),
    };
    report::write_report(&path, &content)?;

    print_summary(&table, config, start_time);
    println!("\n✅ Summary saved to: {}", path.display());

    Ok(0)
}

/// Print the effective rate tables.
fn run_rates(args: &RatesArgs, config: &Config) -> Result<i32> {
    let rates = load_rates(&args.rates, config)?;
    println!("💶 {} rates\n", args.rates.tool);
    print!(
        "{}",
        report::render_rates(&rates, config.billing.decimal_separator)
    );
    Ok(0)
}

/// Type a billing sheet into the portal.
async fn run_import(args: &ImportArgs, config: &Config, quiet: bool) -> Result<i32> {
    let sheet = ImportSheet::read_path(
        &args.file,
        &config.portal.name_column,
        config.attendance.separator,
    )?;
    println!(
        "📄 Billing sheet: {} students, {} concepts",
        sheet.rows.len(),
        sheet.concepts.len()
    );

    println!("\n🌐 Opening browser at {}", config.portal.login_url);
    println!(
        "   Log in and open '{}' within {}s.",
        config.portal.page_title, config.portal.page_timeout_seconds
    );
    println!(
        "   Once the values are typed, review them and save within {} minutes.\n",
        config.portal.save_timeout_seconds / 60
    );

    let mut billing_portal = ClickeduPortal::new(config.portal.clone());
    let options = ImportOptions {
        show_progress: !quiet,
    };
    let outcome = portal::run_import(&mut billing_portal, &sheet, &options).await?;

    print_import_outcome(&outcome);

    if args.strict && outcome.has_unmatched() {
        eprintln!("\n⛔ Some values could not be placed. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Load the rate files and apply the command-line overrides.
fn load_rates(args: &RateArgs, config: &Config) -> Result<Rates> {
    let mut rates = Rates::load(
        args.tool,
        &args.prices,
        &args.discounts,
        config.attendance.separator,
        config.billing.min_days_to_discount,
    )?;

    for entry in &args.charge_overrides {
        rates
            .override_charge(entry)
            .with_context(|| format!("Invalid price override '{}'", entry))?;
    }
    for entry in &args.refund_overrides {
        rates
            .override_refund(entry)
            .with_context(|| format!("Invalid discount override '{}'", entry))?;
    }

    Ok(rates)
}

fn print_summary(table: &SummaryTable, config: &Config, start_time: Instant) {
    let amount = |value: f64| billing::format_amount(value, config.billing.decimal_separator);

    println!("\n📊 Billing Summary:");
    println!("   Lines: {}", table.rows.len());
    println!(
        "   - 🟠 Temporary: {} | 🟢 Permanent: {} | ⚪ Other: {}",
        table.count_enrollment(Enrollment::Temporary),
        table.count_enrollment(Enrollment::Permanent),
        table.count_enrollment(Enrollment::Other)
    );
    println!("   Charges: {}", amount(table.total_charges()));
    println!("   Refunds: {}", amount(table.total_refunds()));
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
}

fn print_import_outcome(outcome: &ImportOutcome) {
    println!("\n📊 Import Summary:");
    println!("   Fields filled: {}", outcome.filled);

    if !outcome.unknown_concepts.is_empty() {
        println!(
            "   ❓ Concepts not found: {}",
            outcome.unknown_concepts.join(", ")
        );
    }
    for student in &outcome.missing_students {
        println!("   ❓ Student not found: {}", student);
    }
    for missing in &outcome.missing_concepts {
        println!(
            "   ❓ Concept {} not found for {}",
            missing.concept, missing.student
        );
    }
    for failure in &outcome.failures {
        println!(
            "   ❌ {} / {}: {}",
            failure.student, failure.concept, failure.error
        );
    }

    if outcome.saved {
        println!("\n✅ Import complete and saved.");
    } else {
        println!("\n⚠️  The page was not saved before the timeout. Check the portal.");
    }
}

/// Load configuration from file or use defaults.
///
/// Returns the configuration and a description of where it came from.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, config_path.display().to_string()));
    }

    // Try default location
    match Config::load_default()? {
        Some(config) => Ok((config, CONFIG_FILE_NAME.to_string())),
        None => Ok((Config::default(), "defaults".to_string())),
    }
}
