//! Import sheet with the values to type into the portal.

use crate::attendance::{decode, separator_byte};
use crate::billing::BillingError;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::path::Path;
use tracing::debug;

/// One student row; only non-empty cells are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    pub line: usize,
    pub student: String,
    /// `(concept, value)` pairs in column order.
    pub values: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSheet {
    /// Concept columns, i.e. every column but the name column.
    pub concepts: Vec<String>,
    pub rows: Vec<ImportRow>,
}

impl ImportSheet {
    /// Read a UTF-8 sheet from disk.
    pub fn read_path(path: &Path, name_column: &str, separator: char) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read billing sheet: {}", path.display()))?;
        let content = decode(&bytes, "UTF-8")?;
        Self::parse_str(&content, name_column, separator)
            .with_context(|| format!("Invalid billing sheet: {}", path.display()))
    }

    pub fn parse_str(content: &str, name_column: &str, separator: char) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(separator_byte(separator)?)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .context("Failed to read billing sheet headers")?
            .clone();

        let name_index = headers
            .iter()
            .position(|h| h == name_column)
            .ok_or_else(|| BillingError::MissingColumn {
                column: name_column.to_string(),
                source_name: "billing sheet".to_string(),
            })?;

        let concepts: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(idx, header)| *idx != name_index && !header.is_empty())
            .map(|(idx, header)| (idx, header.to_string()))
            .collect();

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let line = index + 2;
            let record =
                result.with_context(|| format!("Failed to parse billing sheet row {}", line))?;

            let student = record.get(name_index).unwrap_or("").to_string();
            if student.is_empty() {
                debug!("Skipping billing sheet row {} without a name", line);
                continue;
            }

            let values = concepts
                .iter()
                .filter_map(|(idx, concept)| {
                    record
                        .get(*idx)
                        .filter(|v| !v.is_empty())
                        .map(|v| (concept.clone(), v.to_string()))
                })
                .collect();

            rows.push(ImportRow {
                line,
                student,
                values,
            });
        }

        debug!(
            "Billing sheet: {} rows, {} concepts",
            rows.len(),
            concepts.len()
        );

        Ok(Self {
            concepts: concepts.into_iter().map(|(_, c)| c).collect(),
            rows,
        })
    }
}
