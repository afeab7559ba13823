//! Reader for the monthly attendance export.
//!
//! The export is a semicolon separated file in a legacy single-byte
//! encoding, with one row per student and enrollment line, one column per
//! day and a few summary rows at the bottom.

use crate::billing::BillingError;
use crate::config::AttendanceConfig;
use crate::models::{Mark, Tool};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use encoding_rs::Encoding;
use std::path::Path;
use tracing::{debug, warn};

/// One data row of the export.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    /// Line number in the source file (1-indexed, header is line 1).
    pub line: usize,
    pub student: String,
    /// Class column, e.g. `P3 / A`.
    pub year: String,
    pub category: String,
    /// Rate type; always read, used for grouping only in Acollida mode.
    pub rate: Option<String>,
    /// One mark per day column.
    pub marks: Vec<Mark>,
}

/// The parsed export.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSheet {
    pub day_columns: Vec<String>,
    pub records: Vec<AttendanceRecord>,
    /// Rate value of the first data row, used to name the output.
    pub base_name: String,
}

/// Reads attendance exports according to the configured layout.
pub struct AttendanceReader<'a> {
    config: &'a AttendanceConfig,
}

impl<'a> AttendanceReader<'a> {
    pub fn new(config: &'a AttendanceConfig) -> Self {
        Self { config }
    }

    /// Read and parse an export from disk.
    pub fn read_path(&self, path: &Path, tool: Tool) -> Result<AttendanceSheet> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read attendance file: {}", path.display()))?;
        self.read_bytes(&bytes, tool)
            .with_context(|| format!("Invalid attendance file: {}", path.display()))
    }

    /// Decode raw bytes with the configured encoding and parse them.
    pub fn read_bytes(&self, bytes: &[u8], tool: Tool) -> Result<AttendanceSheet> {
        let content = decode(bytes, &self.config.encoding)?;
        self.parse_str(&content, tool)
    }

    /// Parse already decoded content.
    pub fn parse_str(&self, content: &str, tool: Tool) -> Result<AttendanceSheet> {
        let delimiter = separator_byte(self.config.separator)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .context("Failed to read attendance headers")?
            .clone();

        let mut records: Vec<StringRecord> = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record =
                result.with_context(|| format!("Failed to parse attendance row {}", index + 2))?;
            records.push(record);
        }

        let footer_rows = self.config.footer_rows;
        if records.len() <= footer_rows {
            return Err(BillingError::NoAttendanceRows { footer_rows }.into());
        }
        records.truncate(records.len() - footer_rows);
        debug!(
            "Read {} attendance rows ({} footer rows skipped)",
            records.len(),
            footer_rows
        );

        let layout = self.layout(&headers, tool)?;

        let first_rate = layout
            .rate
            .and_then(|idx| records[0].get(idx))
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let base_name = first_rate.unwrap_or_else(|| tool.to_string());

        let mut parsed = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let line = index + 2;
            let field = |idx: usize| record.get(idx).unwrap_or("").to_string();

            let mut marks = Vec::with_capacity(layout.days.len());
            for (column, &idx) in layout.day_columns.iter().zip(&layout.days) {
                let value = record.get(idx).unwrap_or("");
                let mark = Mark::parse(value).ok_or_else(|| BillingError::UnknownMark {
                    row: line,
                    column: column.clone(),
                    value: value.to_string(),
                })?;
                marks.push(mark);
            }

            parsed.push(AttendanceRecord {
                line,
                student: field(layout.student),
                year: field(layout.year),
                category: field(layout.category),
                rate: layout.rate.map(field),
                marks,
            });
        }

        Ok(AttendanceSheet {
            day_columns: layout.day_columns,
            records: parsed,
            base_name,
        })
    }

    /// Locate the known columns; everything left over is a day column.
    fn layout(&self, headers: &StringRecord, tool: Tool) -> Result<Layout, BillingError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| BillingError::MissingColumn {
                column: name.to_string(),
                source_name: "attendance export".to_string(),
            })
        };

        let student = require(&self.config.student_column)?;
        let year = require(&self.config.year_column)?;
        let category = require(&self.config.category_column)?;
        let rate = if tool.groups_by_rate() {
            Some(require(&self.config.rate_column)?)
        } else {
            find(&self.config.rate_column)
        };

        let known = [Some(student), Some(year), Some(category), rate];
        let mut days = Vec::new();
        let mut day_columns = Vec::new();
        for (idx, header) in headers.iter().enumerate() {
            if header.is_empty()
                || known.contains(&Some(idx))
                || self.config.dropped_columns.iter().any(|d| d == header)
            {
                continue;
            }
            days.push(idx);
            day_columns.push(header.to_string());
        }

        if days.is_empty() {
            return Err(BillingError::NoDayColumns);
        }

        Ok(Layout {
            student,
            year,
            category,
            rate,
            days,
            day_columns,
        })
    }
}

struct Layout {
    student: usize,
    year: usize,
    category: usize,
    rate: Option<usize>,
    days: Vec<usize>,
    day_columns: Vec<String>,
}

/// Decode bytes using a WHATWG encoding label.
pub fn decode(bytes: &[u8], label: &str) -> Result<String, BillingError> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| BillingError::UnknownEncoding(label.to_string()))?;
    let (content, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(
            "Some bytes could not be decoded as {}; they were replaced",
            actual.name()
        );
    }
    Ok(content.into_owned())
}

/// Encode text for writing with a WHATWG encoding label.
pub fn encode(content: &str, label: &str) -> Result<Vec<u8>, BillingError> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| BillingError::UnknownEncoding(label.to_string()))?;
    let (bytes, actual, had_errors) = encoding.encode(content);
    if had_errors {
        warn!(
            "Some characters cannot be represented in {}; they were escaped",
            actual.name()
        );
    }
    Ok(bytes.into_owned())
}

pub fn separator_byte(separator: char) -> Result<u8> {
    if !separator.is_ascii() {
        anyhow::bail!("Separator must be an ASCII character, got '{}'", separator);
    }
    Ok(separator as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
Resum d'assistència;Curs/classe;Inscripció;Tarifa;Dates;Menú;01/10 dc;02/10 dj;03/10 dv;presents;absències;percentatge;Total
Anna Puig;P3 / A;Inscripció permanent;Menjador;oct;Basal;P;A;P;2;1;66;3
Biel Soler;P4 / B;Inscripció puntual;Menjador;oct;Basal;P;-;;1;0;33;3
Total;;;;;;;;;;;;
Presents;;;;;;;;;;;;
Absents;;;;;;;;;;;;
Percentatge;;;;;;;;;;;;
";

    fn config() -> AttendanceConfig {
        AttendanceConfig::default()
    }

    #[test]
    fn test_parse_export() {
        let config = config();
        let sheet = AttendanceReader::new(&config)
            .parse_str(EXPORT, Tool::Menjador)
            .unwrap();

        assert_eq!(sheet.day_columns, vec!["01/10 dc", "02/10 dj", "03/10 dv"]);
        assert_eq!(sheet.records.len(), 2);
        assert_eq!(sheet.base_name, "Menjador");

        let anna = &sheet.records[0];
        assert_eq!(anna.student, "Anna Puig");
        assert_eq!(anna.year, "P3 / A");
        assert_eq!(anna.category, "Inscripció permanent");
        assert_eq!(anna.marks, vec![Mark::Present, Mark::Absent, Mark::Present]);

        let biel = &sheet.records[1];
        assert_eq!(biel.line, 3);
        assert_eq!(
            biel.marks,
            vec![Mark::Present, Mark::Unmarked, Mark::Unmarked]
        );
    }

    #[test]
    fn test_decode_latin1_bytes() {
        let config = config();
        let bytes = encode(EXPORT, "ISO-8859-1").unwrap();
        assert!(std::str::from_utf8(&bytes).is_err());

        let sheet = AttendanceReader::new(&config)
            .read_bytes(&bytes, Tool::Menjador)
            .unwrap();
        assert_eq!(sheet.records[0].category, "Inscripció permanent");
    }

    #[test]
    fn test_only_footer_rows() {
        let config = config();
        let content = "Resum d'assistència;Curs/classe;Inscripció;01/10 dc\na;b;c;d\ne;f;g;h\n";
        let err = AttendanceReader::new(&config)
            .parse_str(content, Tool::Menjador)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<BillingError>(),
            Some(&BillingError::NoAttendanceRows { footer_rows: 4 })
        );
    }

    #[test]
    fn test_missing_rate_column_in_acollida() {
        let mut config = config();
        config.footer_rows = 0;
        let content = "Resum d'assistència;Curs/classe;Inscripció;01/10 dc\nAnna;P3 / A;Inscripció permanent;P\n";

        let reader = AttendanceReader::new(&config);
        assert!(reader.parse_str(content, Tool::Menjador).is_ok());

        let err = reader.parse_str(content, Tool::Acollida).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BillingError>(),
            Some(BillingError::MissingColumn { column, .. }) if column == "Tarifa"
        ));
    }

    #[test]
    fn test_unknown_mark() {
        let mut config = config();
        config.footer_rows = 0;
        let content = "Resum d'assistència;Curs/classe;Inscripció;01/10 dc\nAnna;P3 / A;Inscripció permanent;X\n";
        let err = AttendanceReader::new(&config)
            .parse_str(content, Tool::Menjador)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<BillingError>(),
            Some(&BillingError::UnknownMark {
                row: 2,
                column: "01/10 dc".to_string(),
                value: "X".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_encoding() {
        assert_eq!(
            decode(b"abc", "klingon"),
            Err(BillingError::UnknownEncoding("klingon".to_string()))
        );
    }

    #[test]
    fn test_read_path() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assistencia.csv");
        std::fs::write(&path, encode(EXPORT, "ISO-8859-1").unwrap()).unwrap();

        let sheet = AttendanceReader::new(&config)
            .read_path(&path, Tool::Acollida)
            .unwrap();
        assert_eq!(sheet.records[1].rate.as_deref(), Some("Menjador"));
    }
}
