//! Validation errors for attendance and rate inputs.

use thiserror::Error;

/// Errors raised while validating the input files of a billing run.
#[derive(Debug, Error, PartialEq)]
pub enum BillingError {
    #[error("unknown text encoding: {0}")]
    UnknownEncoding(String),

    #[error("missing required column '{column}' in {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("no attendance rows left after skipping {footer_rows} footer rows")]
    NoAttendanceRows { footer_rows: usize },

    #[error("no day columns found in attendance export")]
    NoDayColumns,

    #[error("row {row}: unknown attendance mark '{value}' in column '{column}'")]
    UnknownMark {
        row: usize,
        column: String,
        value: String,
    },

    #[error("{source_name} row {row}: invalid amount '{value}'")]
    InvalidAmount {
        source_name: String,
        row: usize,
        value: String,
    },

    #[error("no rate with key '{0}' to override")]
    UnknownRateKey(String),

    #[error("invalid rate override '{0}', expected KEY=AMOUNT")]
    InvalidOverride(String),
}
