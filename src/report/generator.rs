//! Summary output generation.
//!
//! This module writes the billing summary as a semicolon separated file in
//! the export's encoding (the format the spreadsheet and the portal import
//! expect), as JSON, or as a plain table for the terminal.

use crate::attendance::{encode, separator_byte};
use crate::billing::format_amount;
use crate::billing::rates::{ChargeRates, Rates, RefundRates};
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::models::{Enrollment, SummaryTable};
use anyhow::{Context, Result};
use chrono::Month;
use csv::WriterBuilder;
use std::path::Path;
use tracing::warn;

/// Header row of the CSV summary.
pub fn summary_headers(table: &SummaryTable, config: &Config) -> Vec<String> {
    let mut headers = vec![config.attendance.student_column.clone()];
    if table.tool.groups_by_rate() {
        headers.push(config.attendance.rate_column.clone());
    }
    headers.push(config.billing.level_column.clone());
    headers.push(config.attendance.category_column.clone());
    headers.extend(table.day_columns.iter().cloned());
    headers.extend(["-", "A", "P"].into_iter().map(String::from));
    headers.push(config.billing.charge_column.clone());
    headers.push(config.billing.refund_column.clone());
    headers
}

/// Render the summary as CSV text (not yet encoded).
pub fn generate_csv_text(table: &SummaryTable, config: &Config) -> Result<String> {
    let decimal = config.billing.decimal_separator;
    let mut writer = WriterBuilder::new()
        .delimiter(separator_byte(config.attendance.separator)?)
        .from_writer(Vec::new());

    writer.write_record(summary_headers(table, config))?;

    for row in &table.rows {
        let mut record = vec![row.student.clone()];
        if table.tool.groups_by_rate() {
            record.push(row.rate.clone().unwrap_or_default());
        }
        record.push(row.level.clone());
        record.push(row.category.clone());
        record.extend(row.marks.iter().map(|m| m.as_str().to_string()));
        record.push(row.counts.unmarked.to_string());
        record.push(row.counts.absent.to_string());
        record.push(row.counts.present.to_string());
        record.push(row.charge.map(|c| format_amount(c, decimal)).unwrap_or_default());
        record.push(row.refund.map(|r| format_amount(r, decimal)).unwrap_or_default());
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Render the summary as CSV bytes in the configured encoding.
pub fn generate_csv_report(table: &SummaryTable, config: &Config) -> Result<Vec<u8>> {
    let text = generate_csv_text(table, config)?;
    Ok(encode(&text, &config.attendance.encoding)?)
}

/// Generate a JSON report.
pub fn generate_json_report(table: &SummaryTable) -> Result<String> {
    serde_json::to_string_pretty(table).map_err(Into::into)
}

/// File name for the summary: `<rate>_<Month>.<ext>`.
pub fn output_file_name(table: &SummaryTable, format: OutputFormat) -> String {
    let month = table
        .month()
        .and_then(|m| u8::try_from(m).ok())
        .and_then(|m| Month::try_from(m).ok());

    match month {
        Some(month) => format!("{}_{}.{}", table.base_name, month.name(), format.extension()),
        None => {
            warn!(
                "Could not read the month from day column {:?}; naming output after the rate only",
                table.day_columns.first()
            );
            format!("{}.{}", table.base_name, format.extension())
        }
    }
}

/// Write report bytes to a file.
pub fn write_report(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write summary to {}", path.display()))
}

/// Plain text table for `--dry-run`.
pub fn render_table(table: &SummaryTable, config: &Config) -> String {
    let decimal = config.billing.decimal_separator;
    let name_width = table
        .rows
        .iter()
        .map(|r| r.student.chars().count())
        .max()
        .unwrap_or(0)
        .max(config.attendance.student_column.chars().count());

    let mut output = String::new();
    output.push_str(&format!(
        "{:<name_width$}  {:<8}  {:<10}  {:>3} {:>3} {:>3}  {:>10}  {:>10}\n",
        config.attendance.student_column,
        config.billing.level_column,
        "Tipus",
        "-",
        "A",
        "P",
        config.billing.charge_column,
        config.billing.refund_column,
    ));

    for row in &table.rows {
        let kind = match (&row.rate, row.enrollment) {
            (Some(rate), _) => rate.clone(),
            (None, Enrollment::Temporary) => "puntual".to_string(),
            (None, Enrollment::Permanent) => "permanent".to_string(),
            (None, Enrollment::Other) => "-".to_string(),
        };
        output.push_str(&format!(
            "{:<name_width$}  {:<8}  {:<10}  {:>3} {:>3} {:>3}  {:>10}  {:>10}\n",
            row.student,
            row.level,
            kind,
            row.counts.unmarked,
            row.counts.absent,
            row.counts.present,
            row.charge.map(|c| format_amount(c, decimal)).unwrap_or_default(),
            row.refund.map(|r| format_amount(r, decimal)).unwrap_or_default(),
        ));
    }

    output
}

/// Human readable description of the effective rates.
pub fn render_rates(rates: &Rates, decimal_separator: char) -> String {
    let amount = |value: f64| format_amount(value, decimal_separator);
    let mut output = String::new();

    output.push_str("Prices (temporary students, per day present):\n");
    match &rates.charges {
        ChargeRates::Tiered(tiers) if tiers.is_empty() => output.push_str("  (none)\n"),
        ChargeRates::Tiered(tiers) => {
            for tier in tiers {
                output.push_str(&format!(
                    "  more than {} days: {}\n",
                    tier.min_days,
                    amount(tier.price)
                ));
            }
        }
        ChargeRates::ByType(prices) if prices.is_empty() => output.push_str("  (none)\n"),
        ChargeRates::ByType(prices) => {
            for price in prices {
                output.push_str(&format!("  {}: {}\n", price.rate_type, amount(price.amount)));
            }
        }
    }

    output.push_str("Discounts (permanent students, per absence):\n");
    match &rates.refunds {
        RefundRates::Flat(Some(discount)) => {
            output.push_str(&format!("  every absence: {}\n", amount(*discount)))
        }
        RefundRates::Flat(None) => output.push_str("  (none)\n"),
        RefundRates::ByType { rates, min_days } => {
            output.push_str(&format!("  absences beyond {} days\n", min_days));
            if rates.is_empty() {
                output.push_str("  (none)\n");
            }
            for rate in rates {
                output.push_str(&format!("  {}: {}\n", rate.rate_type, amount(rate.amount)));
            }
        }
    }

    output
}
