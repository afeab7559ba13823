//! Grouping of attendance rows into one line per student.
//!
//! A student can appear on several rows of the export (for instance after
//! switching enrollment mid-month). Rows of the same group are merged by
//! keeping, for every column, the value with the highest priority.

use crate::attendance::{AttendanceRecord, AttendanceSheet};
use crate::config::AttendanceConfig;
use crate::models::{Enrollment, Mark, MarkCounts, Tool};
use std::collections::HashMap;
use tracing::debug;

/// Merged attendance for one student (and rate type, in Acollida mode).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedRecord {
    pub student: String,
    pub rate: Option<String>,
    pub level: String,
    pub category: String,
    pub enrollment: Enrollment,
    pub marks: Vec<Mark>,
    pub counts: MarkCounts,
}

struct Group {
    student: String,
    rate: Option<String>,
    year: String,
    category: String,
    enrollment: Enrollment,
    marks: Vec<Mark>,
}

impl Group {
    fn start(record: &AttendanceRecord, rate: Option<String>, enrollment: Enrollment) -> Self {
        Self {
            student: record.student.clone(),
            rate,
            year: record.year.clone(),
            category: record.category.clone(),
            enrollment,
            marks: record.marks.clone(),
        }
    }

    fn merge(&mut self, record: &AttendanceRecord, enrollment: Enrollment) {
        debug!("Merging row {} into {}", record.line, self.student);

        // All rows of a student should share the class; keep the smallest.
        if record.year < self.year {
            self.year = record.year.clone();
        }

        if (enrollment, record.category.as_str()) > (self.enrollment, self.category.as_str()) {
            self.enrollment = enrollment;
            self.category = record.category.clone();
        }

        for (current, incoming) in self.marks.iter_mut().zip(&record.marks) {
            *current = (*current).max(*incoming);
        }
    }

    fn finish(self) -> GroupedRecord {
        let level = level_of(&self.year);
        let counts = MarkCounts::from_marks(&self.marks);
        GroupedRecord {
            student: self.student,
            rate: self.rate,
            level,
            category: self.category,
            enrollment: self.enrollment,
            marks: self.marks,
            counts,
        }
    }
}

/// Level part of a class label: `P3 / A` becomes `P3`.
pub fn level_of(year: &str) -> String {
    year.split(" / ").next().unwrap_or(year).to_string()
}

/// Group the sheet's rows and resolve conflicts between repeated rows.
///
/// The result is sorted by level (in order of first appearance), then by
/// category and student, or by student, category and rate when grouping by
/// rate.
pub fn aggregate(
    sheet: &AttendanceSheet,
    tool: Tool,
    labels: &AttendanceConfig,
) -> Vec<GroupedRecord> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<(String, Option<String>), usize> = HashMap::new();

    for record in &sheet.records {
        let rate = if tool.groups_by_rate() {
            record.rate.clone()
        } else {
            None
        };
        let enrollment = Enrollment::classify(
            &record.category,
            &labels.permanent_label,
            &labels.temporary_label,
        );

        let key = (record.student.clone(), rate.clone());
        match index.get(&key) {
            Some(&position) => groups[position].merge(record, enrollment),
            None => {
                index.insert(key, groups.len());
                groups.push(Group::start(record, rate, enrollment));
            }
        }
    }

    debug!(
        "Grouped {} rows into {} lines",
        sheet.records.len(),
        groups.len()
    );

    let mut grouped: Vec<GroupedRecord> = groups.into_iter().map(Group::finish).collect();

    let mut level_order: HashMap<String, usize> = HashMap::new();
    for record in &grouped {
        let next = level_order.len();
        level_order.entry(record.level.clone()).or_insert(next);
    }

    grouped.sort_by(|a, b| {
        let by_level = level_order[&a.level].cmp(&level_order[&b.level]);
        if tool.groups_by_rate() {
            by_level
                .then_with(|| a.student.cmp(&b.student))
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.rate.cmp(&b.rate))
        } else {
            by_level
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.student.cmp(&b.student))
        }
    });

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Mark::{Absent as A, Present as P, Unmarked as U};

    const PERMANENT: &str = "Inscripció permanent";
    const TEMPORARY: &str = "Inscripció puntual";

    fn record(student: &str, year: &str, category: &str, rate: &str, marks: &[Mark]) -> AttendanceRecord {
        AttendanceRecord {
            line: 0,
            student: student.to_string(),
            year: year.to_string(),
            category: category.to_string(),
            rate: Some(rate.to_string()),
            marks: marks.to_vec(),
        }
    }

    fn sheet(records: Vec<AttendanceRecord>) -> AttendanceSheet {
        AttendanceSheet {
            day_columns: vec!["01/10 dc".into(), "02/10 dj".into(), "03/10 dv".into()],
            records,
            base_name: "Menjador".to_string(),
        }
    }

    #[test]
    fn test_level_of() {
        assert_eq!(level_of("P3 / A"), "P3");
        assert_eq!(level_of("1r / B / extra"), "1r");
        assert_eq!(level_of("ESO"), "ESO");
    }

    #[test]
    fn test_repeated_rows_resolve_by_priority() {
        let sheet = sheet(vec![
            record("Anna", "P3 / A", PERMANENT, "Fix", &[A, U, A]),
            record("Anna", "P3 / A", TEMPORARY, "Fix", &[U, P, A]),
        ]);

        let grouped = aggregate(&sheet, Tool::Menjador, &AttendanceConfig::default());

        assert_eq!(grouped.len(), 1);
        let anna = &grouped[0];
        assert_eq!(anna.marks, vec![A, P, A]);
        assert_eq!(anna.enrollment, Enrollment::Temporary);
        assert_eq!(anna.category, TEMPORARY);
        assert_eq!(anna.counts.present, 1);
        assert_eq!(anna.counts.absent, 2);
        assert_eq!(anna.rate, None);
    }

    #[test]
    fn test_level_from_smallest_year() {
        let sheet = sheet(vec![
            record("Anna", "P4 / B", PERMANENT, "Fix", &[P, P, P]),
            record("Anna", "P3 / A", PERMANENT, "Fix", &[P, P, P]),
        ]);
        let grouped = aggregate(&sheet, Tool::Menjador, &AttendanceConfig::default());
        assert_eq!(grouped[0].level, "P3");
    }

    #[test]
    fn test_acollida_groups_by_rate() {
        let sheet = sheet(vec![
            record("Anna", "P3 / A", PERMANENT, "Matí", &[P, P, A]),
            record("Anna", "P3 / A", PERMANENT, "Tarda", &[A, A, A]),
        ]);

        let menjador = aggregate(&sheet, Tool::Menjador, &AttendanceConfig::default());
        assert_eq!(menjador.len(), 1);

        let acollida = aggregate(&sheet, Tool::Acollida, &AttendanceConfig::default());
        assert_eq!(acollida.len(), 2);
        assert_eq!(acollida[0].rate.as_deref(), Some("Matí"));
        assert_eq!(acollida[0].counts.absent, 1);
        assert_eq!(acollida[1].rate.as_deref(), Some("Tarda"));
        assert_eq!(acollida[1].counts.absent, 3);
    }

    #[test]
    fn test_sorting_keeps_level_appearance_order() {
        let sheet = sheet(vec![
            record("Pau", "P5 / A", PERMANENT, "Fix", &[P, P, P]),
            record("Berta", "P3 / A", TEMPORARY, "Fix", &[P, P, P]),
            record("Aina", "P3 / A", PERMANENT, "Fix", &[P, P, P]),
            record("Carla", "P5 / A", PERMANENT, "Fix", &[P, P, P]),
        ]);

        let grouped = aggregate(&sheet, Tool::Menjador, &AttendanceConfig::default());
        let order: Vec<&str> = grouped.iter().map(|g| g.student.as_str()).collect();

        // P5 appears first; permanent sorts before puntual.
        assert_eq!(order, vec!["Carla", "Pau", "Aina", "Berta"]);
    }

    #[test]
    fn test_acollida_sorts_by_level_student_category_rate() {
        let sheet = sheet(vec![
            record("Pau", "P4 / A", PERMANENT, "Tarda", &[P, P, P]),
            record("Biel", "P3 / A", TEMPORARY, "Matí", &[P, U, U]),
            record("Anna", "P4 / B", TEMPORARY, "Tarda", &[P, P, U]),
            record("Carla", "P3 / B", PERMANENT, "Tarda", &[A, P, P]),
            record("Anna", "P4 / B", PERMANENT, "Matí", &[A, A, P]),
            record("Biel", "P3 / A", PERMANENT, "Tarda", &[A, A, A]),
            record("Carla", "P3 / B", PERMANENT, "Matí", &[P, P, P]),
        ]);

        let grouped = aggregate(&sheet, Tool::Acollida, &AttendanceConfig::default());
        let order: Vec<(&str, &str)> = grouped
            .iter()
            .map(|g| (g.student.as_str(), g.rate.as_deref().unwrap_or("")))
            .collect();

        // P4 appears first; within a student, permanent sorts before puntual,
        // then Matí before Tarda.
        assert_eq!(
            order,
            vec![
                ("Anna", "Matí"),
                ("Anna", "Tarda"),
                ("Pau", "Tarda"),
                ("Biel", "Tarda"),
                ("Biel", "Matí"),
                ("Carla", "Matí"),
                ("Carla", "Tarda"),
            ]
        );
        assert_eq!(grouped[0].level, "P4");
        assert_eq!(grouped[3].level, "P3");
        assert_eq!(grouped[4].enrollment, Enrollment::Temporary);
    }

    #[test]
    fn test_unknown_category_is_lowest_priority() {
        let sheet = sheet(vec![
            record("Anna", "P3 / A", "Baixa", "Fix", &[U, U, U]),
            record("Anna", "P3 / A", PERMANENT, "Fix", &[U, U, A]),
        ]);
        let grouped = aggregate(&sheet, Tool::Menjador, &AttendanceConfig::default());
        assert_eq!(grouped[0].enrollment, Enrollment::Permanent);
        assert_eq!(grouped[0].category, PERMANENT);
    }
}
