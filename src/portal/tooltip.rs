//! Binding of portal form fields to (student, concept) pairs.
//!
//! Every billing cell of the portal carries a `tooltip` attribute shaped like
//! `Student Name<br />Concept - description`.

use super::session::PortalField;
use super::webdriver::ElementId;
use tracing::debug;

const TOOLTIP_SEPARATOR: &str = "<br />";

/// A form field identified by the student and concept it bills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingField {
    pub student: String,
    pub concept: String,
    pub handle: ElementId,
}

impl BillingField {
    /// Parse a tooltip. Returns `None` when it has no concept part.
    pub fn from_tooltip(tooltip: &str, handle: ElementId) -> Option<Self> {
        let mut parts = tooltip.split(TOOLTIP_SEPARATOR);
        let student = parts.next()?.trim();
        let detail = parts.next()?;
        let concept = detail
            .split_once('-')
            .map_or(detail, |(concept, _)| concept)
            .trim();

        Some(Self {
            student: student.to_string(),
            concept: concept.to_string(),
            handle,
        })
    }
}

/// Keep the fields whose tooltip describes a billing cell.
pub fn bind_fields(fields: impl IntoIterator<Item = PortalField>) -> Vec<BillingField> {
    let mut skipped = 0;
    let bound: Vec<BillingField> = fields
        .into_iter()
        .filter_map(|field| {
            let parsed = BillingField::from_tooltip(&field.tooltip, field.handle);
            if parsed.is_none() {
                skipped += 1;
            }
            parsed
        })
        .collect();

    debug!(
        "Bound {} billing fields ({} tooltips skipped)",
        bound.len(),
        skipped
    );
    bound
}
