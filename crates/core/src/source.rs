use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::cleaning::classify::classify_column;
use crate::cleaning::DataCleaner;
use crate::domain::item::RawItem;
use crate::domain::schema::{BoardId, BoardSchema, FieldDef, FieldKind, SourceBoard};
use crate::errors::SourceError;

/// Read-only access to the external board store.
///
/// Filtering is never pushed down: values are canonicalized after fetching, so the
/// source always returns every item of a board.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_board(&self, board_id: &BoardId) -> Result<SourceBoard, SourceError>;
    async fn fetch_items(&self, board_id: &BoardId) -> Result<Vec<RawItem>, SourceError>;
}

/// A board the deployment is configured to answer questions about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfiguredBoard {
    pub key: String,
    pub board_id: BoardId,
}

impl ConfiguredBoard {
    pub fn new(key: impl Into<String>, board_id: impl Into<BoardId>) -> Self {
        Self { key: key.into(), board_id: board_id.into() }
    }

    pub fn from_map(boards: &BTreeMap<String, String>) -> Vec<Self> {
        boards.iter().map(|(key, id)| Self::new(key.clone(), id.as_str())).collect()
    }
}

/// Builds [`BoardSchema`]s, including the live distinct values of categorical fields.
#[derive(Clone)]
pub struct SchemaProvider {
    source: Arc<dyn DataSource>,
    cleaner: DataCleaner,
    max_distinct_values: usize,
}

impl SchemaProvider {
    pub fn new(source: Arc<dyn DataSource>, cleaner: DataCleaner, max_distinct_values: usize) -> Self {
        Self { source, cleaner, max_distinct_values }
    }

    pub async fn describe(&self, board: &ConfiguredBoard) -> Result<BoardSchema, SourceError> {
        let source_board = self.source.fetch_board(&board.board_id).await?;
        let items = self.source.fetch_items(&board.board_id).await?;
        let schema = self.build(&board.key, source_board, &items);
        debug!(
            event_name = "schema.described",
            board_id = %schema.board_id,
            fields = schema.fields.len(),
            items = items.len(),
            "described board schema"
        );
        Ok(schema)
    }

    pub fn build(&self, key: &str, source_board: SourceBoard, items: &[RawItem]) -> BoardSchema {
        let mut fields = BTreeMap::new();
        for column in &source_board.columns {
            if column.column_type == "name" {
                continue;
            }
            let classification = classify_column(&column.title, &column.column_type);
            let distinct_values = match classification.kind {
                FieldKind::Category | FieldKind::Text => self.distinct_values(&column.title, classification.kind, items),
                _ => None,
            };
            fields.insert(
                column.title.clone(),
                FieldDef {
                    kind: classification.kind,
                    source_type: column.column_type.clone(),
                    distinct_values,
                    unit: classification.unit,
                },
            );
        }

        BoardSchema { board_id: source_board.board_id, key: key.to_string(), name: source_board.name, fields }
    }

    fn distinct_values(&self, field: &str, kind: FieldKind, items: &[RawItem]) -> Option<Vec<String>> {
        let mut values = BTreeSet::new();
        for raw in items.iter().filter_map(|item| item.fields.get(field).and_then(|value| value.as_deref())) {
            if let Some(label) = self.cleaner.canonical_label(kind, raw) {
                values.insert(label);
                if values.len() > self.max_distinct_values {
                    return None;
                }
            }
        }
        (!values.is_empty()).then(|| values.into_iter().collect())
    }
}
