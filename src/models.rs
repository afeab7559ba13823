//! Data models for the billing summaries.
//!
//! This module contains the core data structures shared by the attendance
//! reader, the aggregator, the pricing rules and the report writers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the school's two billing sheets is being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Lunch service: one line per student, tiered price per day present.
    Menjador,
    /// Morning care: one line per student and rate type, price per type.
    Acollida,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Menjador => write!(f, "Menjador"),
            Tool::Acollida => write!(f, "Acollida"),
        }
    }
}

impl Tool {
    /// Whether rows are split by the rate column as well as by student.
    pub fn groups_by_rate(&self) -> bool {
        matches!(self, Tool::Acollida)
    }
}

/// Enrollment category of a student, ordered by priority.
///
/// When a student appears under both categories in the same month the
/// temporary one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enrollment {
    /// Label not recognised; no charge and no refund.
    Other,
    /// Pays a fixed monthly fee; absences are refunded.
    Permanent,
    /// Pays per day present.
    Temporary,
}

impl Enrollment {
    /// Classify a category label using the configured labels.
    pub fn classify(label: &str, permanent_label: &str, temporary_label: &str) -> Self {
        let label = label.trim();
        if label == temporary_label {
            Enrollment::Temporary
        } else if label == permanent_label {
            Enrollment::Permanent
        } else {
            Enrollment::Other
        }
    }
}

/// A single day cell of the attendance export, ordered by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mark {
    #[serde(rename = "-")]
    Unmarked,
    #[serde(rename = "A")]
    Absent,
    #[serde(rename = "P")]
    Present,
}

impl Mark {
    /// Parse a cell value. Empty cells count as unmarked.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" | "-" => Some(Mark::Unmarked),
            "A" => Some(Mark::Absent),
            "P" => Some(Mark::Present),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mark::Unmarked => "-",
            Mark::Absent => "A",
            Mark::Present => "P",
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of days per mark in one summary row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkCounts {
    pub unmarked: u32,
    pub absent: u32,
    pub present: u32,
}

impl MarkCounts {
    /// Count the marks of a row.
    pub fn from_marks(marks: &[Mark]) -> Self {
        let mut counts = Self::default();
        for mark in marks {
            match mark {
                Mark::Unmarked => counts.unmarked += 1,
                Mark::Absent => counts.absent += 1,
                Mark::Present => counts.present += 1,
            }
        }
        counts
    }

    /// The count that drives billing for an enrollment.
    pub fn billable_days(&self, enrollment: Enrollment) -> u32 {
        match enrollment {
            Enrollment::Temporary => self.present,
            Enrollment::Permanent => self.absent,
            Enrollment::Other => 0,
        }
    }
}

/// One line of the monthly billing summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Student name as it appears in the export.
    pub student: String,
    /// Rate type, present only when the tool groups by rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
    /// School level derived from the class column (e.g. `P3`).
    pub level: String,
    /// Winning category label.
    pub category: String,
    pub enrollment: Enrollment,
    /// One resolved mark per day column.
    pub marks: Vec<Mark>,
    pub counts: MarkCounts,
    /// Amount to charge, rounded to cents; `None` unless temporary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<f64>,
    /// Amount to refund (negative), rounded to cents; `None` unless permanent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund: Option<f64>,
}

/// The complete monthly summary for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub tool: Tool,
    /// Rate value of the first row of the export, used for the file name.
    pub base_name: String,
    /// Day column headers, in export order.
    pub day_columns: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    /// Month number (1-12) read from the first day header, `DD/MM weekday`.
    pub fn month(&self) -> Option<u32> {
        let header = self.day_columns.first()?;
        let month = header.split('/').nth(1)?.split(' ').next()?.trim();
        month.parse::<u32>().ok().filter(|m| (1..=12).contains(m))
    }

    /// Sum of all charges.
    pub fn total_charges(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.charge).sum()
    }

    /// Sum of all refunds (negative or zero).
    pub fn total_refunds(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.refund).sum()
    }

    pub fn count_enrollment(&self, enrollment: Enrollment) -> usize {
        self.rows
            .iter()
            .filter(|r| r.enrollment == enrollment)
            .count()
    }
}
