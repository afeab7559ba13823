//! Charges, refunds and amount formatting.

use super::aggregator::GroupedRecord;
use super::rates::Rates;
use crate::models::Enrollment;

/// Amount to charge a temporary student; `None` for other enrollments.
pub fn charge_for(record: &GroupedRecord, rates: &Rates) -> Option<f64> {
    if record.enrollment != Enrollment::Temporary {
        return None;
    }
    let days = record.counts.billable_days(Enrollment::Temporary);
    let price = rates.price_per_day(days, record.rate.as_deref());
    Some(round_cents(f64::from(days) * price))
}

/// Amount to refund a permanent student, as a negative number; `None` for
/// other enrollments.
pub fn refund_for(record: &GroupedRecord, rates: &Rates) -> Option<f64> {
    if record.enrollment != Enrollment::Permanent {
        return None;
    }
    let days = record.counts.billable_days(Enrollment::Permanent);
    let (refundable, discount) = rates.refund_per_day(days, record.rate.as_deref());
    Some(round_cents(-(f64::from(refundable) * discount)))
}

/// Round to two decimals, ties to even, folding negative zero into zero.
pub fn round_cents(amount: f64) -> f64 {
    let rounded = (amount * 100.0).round_ties_even() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Format an amount the way the portal expects it.
///
/// Shortest representation with at least one decimal digit, using the
/// given decimal separator: `7,5`, `12,0`, `-3,25`.
pub fn format_amount(amount: f64, decimal_separator: char) -> String {
    let amount = round_cents(amount);
    let mut text = amount.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    text.replace('.', &decimal_separator.to_string())
}
