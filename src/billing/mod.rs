//! Aggregation and pricing of attendance into billing summaries.

pub mod aggregator;
pub mod error;
pub mod pricing;
pub mod rates;

pub use aggregator::aggregate;
pub use error::BillingError;
pub use pricing::{charge_for, format_amount, refund_for};
pub use rates::Rates;

use crate::attendance::AttendanceSheet;
use crate::config::AttendanceConfig;
use crate::models::{SummaryRow, SummaryTable, Tool};
use tracing::info;

/// Build the monthly summary: group the sheet, then price every line.
pub fn build_summary(
    sheet: &AttendanceSheet,
    tool: Tool,
    rates: &Rates,
    labels: &AttendanceConfig,
) -> SummaryTable {
    let rows: Vec<SummaryRow> = aggregate(sheet, tool, labels)
        .into_iter()
        .map(|record| {
            let charge = charge_for(&record, rates);
            let refund = refund_for(&record, rates);
            SummaryRow {
                student: record.student,
                rate: record.rate,
                level: record.level,
                category: record.category,
                enrollment: record.enrollment,
                marks: record.marks,
                counts: record.counts,
                charge,
                refund,
            }
        })
        .collect();

    info!("Built {} summary rows for {}", rows.len(), tool);

    SummaryTable {
        tool,
        base_name: sheet.base_name.clone(),
        day_columns: sheet.day_columns.clone(),
        rows,
    }
}
