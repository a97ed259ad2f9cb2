use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{Category, FileFormat, Indicator, Visibility};
use crate::error::{EtlError, Result};
use crate::pipeline::mapper::ColumnMapping;
use crate::pipeline::storage::CatalogStore;
use crate::pipeline::table::{Table, MISSING_SENTINEL};

/// Columns folded into a synthesized description
const SUMMARY_COLUMN_LIMIT: usize = 3;

/// Everything a run needs to stamp onto the records it creates
#[derive(Debug, Clone)]
pub struct MaterializeContext<'a> {
    pub category: &'a Category,
    pub visibility: Visibility,
    pub uploaded_by: Option<String>,
    pub batch_started_at: DateTime<Utc>,
}

/// Why a row produced no indicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    BlankTitle,
    StoreError(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub row_index: usize,
    pub reason: SkipReason,
}

/// Records created by one run, in row order
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaterializeOutcome {
    pub created: Vec<Indicator>,
    pub skipped: Vec<SkippedRow>,
}

impl MaterializeOutcome {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Turns each row of a cleaned table into a catalog indicator
pub struct IndicatorMaterializer {
    store: Arc<dyn CatalogStore>,
}

impl IndicatorMaterializer {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn materialize(
        &self,
        table: &Table,
        mapping: &ColumnMapping,
        ctx: &MaterializeContext<'_>,
    ) -> Result<MaterializeOutcome> {
        let category_id = ctx
            .category
            .id
            .ok_or_else(|| EtlError::InvalidState("category has no id".to_string()))?;

        let (data_model, created) = self
            .store
            .get_or_create_data_model(
                &ctx.category.name,
                &format!("Modèle pour {}", ctx.category.name),
            )
            .await?;
        if created {
            debug!("Data model '{}' created on first use", data_model.name);
        }

        let notes = provenance_note(ctx.batch_started_at);
        let mut outcome = MaterializeOutcome::default();

        for row_index in 0..table.row_count() {
            let title = row_title(table, mapping, row_index);
            if is_blank_title(&title) {
                debug!("Skipping row {}: blank title", row_index);
                outcome.skipped.push(SkippedRow {
                    row_index,
                    reason: SkipReason::BlankTitle,
                });
                continue;
            }

            let mut indicator = Indicator {
                id: None,
                title,
                description: row_description(table, mapping, row_index),
                category_id,
                data_model_id: data_model.id,
                visibility: ctx.visibility,
                file_format: FileFormat::Excel,
                uploaded_by: ctx.uploaded_by.clone(),
                created_at: Utc::now(),
                is_processed: true,
                processing_notes: notes.clone(),
            };

            match self.store.create_indicator(&mut indicator).await {
                Ok(()) => outcome.created.push(indicator),
                Err(e) => {
                    warn!("Erreur lors de la création de l'indicateur {}: {}", row_index, e);
                    outcome.skipped.push(SkippedRow {
                        row_index,
                        reason: SkipReason::StoreError(e.to_string()),
                    });
                }
            }
        }

        Ok(outcome)
    }
}

pub fn provenance_note(at: DateTime<Utc>) -> String {
    format!("Créé via ETL le {}", at.format("%Y-%m-%d %H:%M:%S"))
}

/// Empty titles and the missing-value token never become indicators
pub fn is_blank_title(title: &str) -> bool {
    title.is_empty() || title.eq_ignore_ascii_case(MISSING_SENTINEL)
}

fn row_title(table: &Table, mapping: &ColumnMapping, row_index: usize) -> String {
    match &mapping.title {
        Some(col) => table.cell(row_index, col.index).to_string().trim().to_string(),
        None => format!("Indicateur {}", row_index),
    }
}

fn row_description(table: &Table, mapping: &ColumnMapping, row_index: usize) -> String {
    if let Some(col) = &mapping.description {
        return table.cell(row_index, col.index).to_string().trim().to_string();
    }

    let title_index = mapping.title.as_ref().map(|c| c.index);
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != title_index)
        .take(SUMMARY_COLUMN_LIMIT)
        .map(|(idx, name)| format!("{}: {}", name, table.cell(row_index, idx)))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mapper::{ColumnMapper, ColumnRef};
    use crate::pipeline::storage::InMemoryStore;
    use crate::pipeline::table::Cell;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    async fn store_with_category(name: &str) -> (Arc<InMemoryStore>, Category) {
        let store = Arc::new(InMemoryStore::new());
        let mut category = Category {
            id: None,
            name: name.to_string(),
            description: String::new(),
            created_at: Utc::now(),
        };
        store.create_category(&mut category).await.unwrap();
        (store, category)
    }

    fn ctx(category: &Category) -> MaterializeContext<'_> {
        MaterializeContext {
            category,
            visibility: Visibility::Public,
            uploaded_by: Some("admin".to_string()),
            batch_started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_blank_and_sentinel_titles_are_skipped() {
        let (store, category) = store_with_category("Santé").await;
        let table = Table::new(
            vec!["title".to_string(), "description".to_string()],
            vec![
                vec![text("A"), text("desc A")],
                vec![Cell::Empty, text("desc B")],
                vec![text("NaN"), text("desc N")],
                vec![text("C"), text("desc C")],
            ],
        );
        let mapping = ColumnMapper::map(&table.columns);

        let outcome = IndicatorMaterializer::new(store.clone())
            .materialize(&table, &mapping, &ctx(&category))
            .await
            .unwrap();

        let titles: Vec<&str> = outcome.created.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert_eq!(outcome.skipped_count(), 2);
        assert_eq!(outcome.skipped[0].row_index, 1);
        assert_eq!(outcome.skipped[1].reason, SkipReason::BlankTitle);

        let first = &outcome.created[0];
        assert_eq!(first.description, "desc A");
        assert_eq!(first.visibility, Visibility::Public);
        assert_eq!(first.file_format, FileFormat::Excel);
        assert!(first.is_processed);
        assert!(first.processing_notes.starts_with("Créé via ETL le "));
        assert_eq!(first.uploaded_by.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_data_model_is_shared_per_category() {
        let (store, category) = store_with_category("Éducation").await;
        let table = Table::new(vec!["name".to_string()], vec![vec![text("X")], vec![text("Y")]]);
        let mapping = ColumnMapper::map(&table.columns);
        let materializer = IndicatorMaterializer::new(store.clone());

        let first = materializer.materialize(&table, &mapping, &ctx(&category)).await.unwrap();
        let second = materializer.materialize(&table, &mapping, &ctx(&category)).await.unwrap();

        let models = store.list_data_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "Éducation");
        assert_eq!(models[0].description, "Modèle pour Éducation");
        assert_eq!(first.created[0].data_model_id, models[0].id);
        assert_eq!(second.created[1].data_model_id, models[0].id);
    }

    #[tokio::test]
    async fn test_single_column_description_summary_is_empty() {
        let (store, category) = store_with_category("Santé").await;
        let table = Table::new(vec!["valeur".to_string()], vec![vec![Cell::Int(42)]]);
        let mapping = ColumnMapper::map(&table.columns);

        let outcome = IndicatorMaterializer::new(store)
            .materialize(&table, &mapping, &ctx(&category))
            .await
            .unwrap();
        assert_eq!(outcome.created[0].title, "42");
        assert_eq!(outcome.created[0].description, "");
    }

    #[test]
    fn test_description_summary_uses_three_other_columns() {
        let table = Table::new(
            ["title", "a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
            vec![vec![text("T"), text("1"), Cell::Int(2), Cell::Empty, text("4")]],
        );
        let mapping = ColumnMapping {
            title: Some(ColumnRef { name: "title".to_string(), index: 0 }),
            description: None,
        };
        assert_eq!(row_description(&table, &mapping, 0), "a: 1 | b: 2 | c: ");
    }

    #[test]
    fn test_placeholder_title_without_title_column() {
        let table = Table::new(vec![], vec![vec![], vec![]]);
        let mapping = ColumnMapping::default();
        assert_eq!(row_title(&table, &mapping, 1), "Indicateur 1");
    }

    #[tokio::test]
    async fn test_store_errors_skip_the_row() {
        let (store, category) = store_with_category("Santé").await;
        let long_title = "x".repeat(300);
        let table = Table::new(
            vec!["title".to_string()],
            vec![vec![text(&long_title)], vec![text("ok")]],
        );
        let mapping = ColumnMapper::map(&table.columns);

        let outcome = IndicatorMaterializer::new(store)
            .materialize(&table, &mapping, &ctx(&category))
            .await
            .unwrap();
        assert_eq!(outcome.created_count(), 1);
        assert_eq!(outcome.created[0].title, "ok");
        assert!(matches!(outcome.skipped[0].reason, SkipReason::StoreError(_)));
    }

    #[test]
    fn test_is_blank_title() {
        assert!(is_blank_title(""));
        assert!(is_blank_title("nan"));
        assert!(is_blank_title("NAN"));
        assert!(!is_blank_title("nano"));
    }
}
