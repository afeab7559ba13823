//! The import flow: bind the page's fields, then type the sheet into them.

use super::plan::{FillPlan, MissingConcept};
use super::session::BillingPortal;
use super::sheet::ImportSheet;
use super::tooltip::bind_fields;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Show a progress bar while filling.
    pub show_progress: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            show_progress: true,
        }
    }
}

/// A field that matched but could not be filled.
#[derive(Debug, Clone, PartialEq)]
pub struct FillFailure {
    pub student: String,
    pub concept: String,
    pub error: String,
}

/// Result of an import run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    pub filled: usize,
    pub unknown_concepts: Vec<String>,
    pub missing_students: Vec<String>,
    pub missing_concepts: Vec<MissingConcept>,
    pub failures: Vec<FillFailure>,
    /// Whether the user saved the page before the timeout.
    pub saved: bool,
}

impl ImportOutcome {
    /// Whether any sheet value did not reach the portal.
    pub fn has_unmatched(&self) -> bool {
        !self.unknown_concepts.is_empty()
            || !self.missing_students.is_empty()
            || !self.missing_concepts.is_empty()
            || !self.failures.is_empty()
    }
}

/// Run the whole import against a portal. The portal is closed afterwards,
/// also when the import fails.
pub async fn run_import<P: BillingPortal>(
    portal: &mut P,
    sheet: &ImportSheet,
    options: &ImportOptions,
) -> Result<ImportOutcome> {
    let result = match portal.open().await {
        Ok(()) => fill_portal(portal, sheet, options).await,
        Err(e) => Err(e),
    };

    if let Err(e) = portal.close().await {
        warn!("Failed to close the browser session: {}", e);
    }
    result
}

async fn fill_portal<P: BillingPortal>(
    portal: &mut P,
    sheet: &ImportSheet,
    options: &ImportOptions,
) -> Result<ImportOutcome> {
    portal.wait_for_billing_page().await?;

    let fields = bind_fields(portal.billing_fields().await?);
    info!("Page offers {} billing fields", fields.len());

    let plan = FillPlan::build(sheet, &fields);
    if !plan.is_complete() {
        warn!("Some values of the sheet have no matching field on the page");
    }
    let mut outcome = ImportOutcome {
        unknown_concepts: plan.unknown_concepts,
        missing_students: plan.missing_students,
        missing_concepts: plan.missing_concepts,
        ..Default::default()
    };

    let progress = if options.show_progress {
        let pb = ProgressBar::new(plan.assignments.len() as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    } else {
        ProgressBar::hidden()
    };

    for assignment in &plan.assignments {
        progress.set_message(assignment.student.clone());
        match portal.fill_field(&assignment.handle, &assignment.value).await {
            Ok(()) => outcome.filled += 1,
            Err(e) => {
                warn!(
                    "Could not fill {} for {}: {}",
                    assignment.concept, assignment.student, e
                );
                outcome.failures.push(FillFailure {
                    student: assignment.student.clone(),
                    concept: assignment.concept.clone(),
                    error: e.to_string(),
                });
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    info!(
        "Filled {} of {} fields; waiting for the user to save",
        outcome.filled,
        plan.assignments.len()
    );
    outcome.saved = portal.wait_for_save().await?;
    if !outcome.saved {
        warn!("The page was not saved before the timeout");
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::session::PortalField;
    use crate::portal::webdriver::ElementId;
    use anyhow::bail;

    /// In-memory portal recording every typed value.
    #[derive(Default)]
    struct FakePortal {
        fields: Vec<PortalField>,
        open_fails: bool,
        page_ready: bool,
        broken: Vec<String>,
        saves: bool,
        opened: bool,
        closed: bool,
        typed: Vec<(String, String)>,
    }

    impl FakePortal {
        fn with_tooltips(tooltips: &[(&str, &str)]) -> Self {
            Self {
                fields: tooltips
                    .iter()
                    .map(|(id, tooltip)| PortalField {
                        tooltip: tooltip.to_string(),
                        handle: ElementId(id.to_string()),
                    })
                    .collect(),
                page_ready: true,
                saves: true,
                ..Default::default()
            }
        }
    }

    impl BillingPortal for FakePortal {
        async fn open(&mut self) -> Result<()> {
            self.opened = true;
            if self.open_fails {
                bail!("login page did not load");
            }
            Ok(())
        }

        async fn wait_for_billing_page(&mut self) -> Result<()> {
            if !self.page_ready {
                bail!("page did not show up");
            }
            Ok(())
        }

        async fn billing_fields(&mut self) -> Result<Vec<PortalField>> {
            Ok(self.fields.clone())
        }

        async fn fill_field(&mut self, field: &ElementId, value: &str) -> Result<()> {
            if self.broken.contains(&field.0) {
                bail!("checkbox not clickable");
            }
            self.typed.push((field.0.clone(), value.to_string()));
            Ok(())
        }

        async fn wait_for_save(&mut self) -> Result<bool> {
            Ok(self.saves)
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn sheet() -> ImportSheet {
        ImportSheet::parse_str(
            "Usuari;Menjador;Acollida;Colònies\n\
             Anna Puig;-3,5;2,2;\n\
             Biel Soler;21,9;;150\n\
             Carla Vidal;7,0;;\n",
            "Usuari",
            ';',
        )
        .unwrap()
    }

    fn portal() -> FakePortal {
        FakePortal::with_tooltips(&[
            ("t0", "Desa"),
            ("a-m", "Anna Puig<br />Menjador - Octubre"),
            ("a-a", "Anna Puig<br />Acollida - Octubre"),
            ("b-m", "Biel Soler<br />Menjador - Octubre"),
        ])
    }

    fn quiet() -> ImportOptions {
        ImportOptions {
            show_progress: false,
        }
    }

    #[tokio::test]
    async fn test_import_fills_matched_fields() {
        let mut portal = portal();
        let outcome = run_import(&mut portal, &sheet(), &quiet()).await.unwrap();

        assert_eq!(
            portal.typed,
            vec![
                ("a-m".to_string(), "-3,5".to_string()),
                ("a-a".to_string(), "2,2".to_string()),
                ("b-m".to_string(), "21,9".to_string()),
            ]
        );
        assert_eq!(outcome.filled, 3);
        assert_eq!(outcome.unknown_concepts, vec!["Colònies"]);
        assert_eq!(outcome.missing_students, vec!["Carla Vidal"]);
        assert!(outcome.missing_concepts.is_empty());
        assert!(outcome.saved);
        assert!(outcome.has_unmatched());
        assert!(portal.opened && portal.closed);
    }

    #[tokio::test]
    async fn test_fill_failures_are_recorded() {
        let mut portal = portal();
        portal.broken = vec!["a-a".to_string()];
        let outcome = run_import(&mut portal, &sheet(), &quiet()).await.unwrap();

        assert_eq!(outcome.filled, 2);
        assert_eq!(
            outcome.failures,
            vec![FillFailure {
                student: "Anna Puig".to_string(),
                concept: "Acollida".to_string(),
                error: "checkbox not clickable".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_open_still_closes() {
        let mut portal = portal();
        portal.open_fails = true;
        let err = run_import(&mut portal, &sheet(), &quiet()).await.unwrap_err();
        assert_eq!(err.to_string(), "login page did not load");
        assert!(portal.closed);
        assert!(portal.typed.is_empty());
    }

    #[tokio::test]
    async fn test_page_timeout_still_closes() {
        let mut portal = portal();
        portal.page_ready = false;
        assert!(run_import(&mut portal, &sheet(), &quiet()).await.is_err());
        assert!(portal.closed);
        assert!(portal.typed.is_empty());
    }

    #[test]
    fn test_unsaved_import() {
        let mut portal = portal();
        portal.saves = false;
        let outcome =
            tokio_test::block_on(run_import(&mut portal, &sheet(), &quiet())).unwrap();
        assert!(!outcome.saved);
    }

    #[test]
    fn test_clean_outcome() {
        assert!(!ImportOutcome::default().has_unmatched());
    }
}
