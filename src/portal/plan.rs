//! Matching of the import sheet against the portal's billing fields.

use super::sheet::ImportSheet;
use super::tooltip::BillingField;
use super::webdriver::ElementId;
use std::collections::HashSet;
use tracing::warn;

/// A value to type into one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub student: String,
    pub concept: String,
    pub value: String,
    pub handle: ElementId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingConcept {
    pub student: String,
    pub concept: String,
}

/// What will be typed, and what could not be matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillPlan {
    pub assignments: Vec<Assignment>,
    /// Sheet columns no portal field bills.
    pub unknown_concepts: Vec<String>,
    /// Students with no field at all on the page.
    pub missing_students: Vec<String>,
    /// Known concepts the page does not offer for a given student.
    pub missing_concepts: Vec<MissingConcept>,
}

impl FillPlan {
    pub fn build(sheet: &ImportSheet, fields: &[BillingField]) -> Self {
        let known: HashSet<&str> = fields.iter().map(|f| f.concept.as_str()).collect();
        let mut plan = FillPlan::default();

        for concept in &sheet.concepts {
            if !known.contains(concept.as_str()) {
                warn!("Concept not found on the page: {}", concept);
                plan.unknown_concepts.push(concept.clone());
            }
        }

        for row in &sheet.rows {
            let student_fields: Vec<&BillingField> =
                fields.iter().filter(|f| f.student == row.student).collect();
            if student_fields.is_empty() {
                warn!(
                    "Student not found on the page: {} (row {})",
                    row.student, row.line
                );
                plan.missing_students.push(row.student.clone());
                continue;
            }

            for (concept, value) in &row.values {
                if !known.contains(concept.as_str()) {
                    continue;
                }
                match student_fields.iter().find(|f| &f.concept == concept) {
                    Some(field) => plan.assignments.push(Assignment {
                        student: row.student.clone(),
                        concept: concept.clone(),
                        value: value.clone(),
                        handle: field.handle.clone(),
                    }),
                    None => {
                        warn!("Concept {} not found for {}", concept, row.student);
                        plan.missing_concepts.push(MissingConcept {
                            student: row.student.clone(),
                            concept: concept.clone(),
                        });
                    }
                }
            }
        }

        plan
    }

    /// Whether every sheet cell found its field.
    pub fn is_complete(&self) -> bool {
        self.unknown_concepts.is_empty()
            && self.missing_students.is_empty()
            && self.missing_concepts.is_empty()
    }
}
