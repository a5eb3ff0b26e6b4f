//! Integration tests for `SqliteStore` against an in-memory database.

use annograph_core::{
  label::{LabelInput, LabelsByLevel},
  query::SearchQuery,
  record::ColumnMapping,
  store::AnnotationStore,
};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::SqliteStore;

mod labels;
mod records;
mod search;
mod views;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn rows(contents: &[&str]) -> Vec<Map<String, Value>> {
  contents
    .iter()
    .enumerate()
    .map(|(i, content)| {
      let mut row = Map::new();
      row.insert("id".into(), json!(i + 1));
      row.insert("text".into(), json!(content));
      row
    })
    .collect()
}

/// Import `contents` as records 1..=n of dataset `d` and return their uuids
/// in `record_id` order.
async fn seed(s: &SqliteStore, contents: &[&str]) -> Vec<Uuid> {
  s.import_records("d".into(), rows(contents), ColumnMapping::new("id", "text"))
    .await
    .unwrap();
  all_records(s).await
}

/// Every record uuid, in search order.
async fn all_records(s: &SqliteStore) -> Vec<Uuid> {
  s.search(&SearchQuery { limit: 1000, ..Default::default() })
    .await
    .unwrap()
}

fn record_labels(labels: &[(&str, Value)]) -> LabelsByLevel {
  LabelsByLevel {
    labels_record: labels
      .iter()
      .map(|(name, value)| LabelInput::record(name, value.clone()))
      .collect(),
    ..Default::default()
  }
}

/// Annotate `record` with one record-level label.
async fn label(s: &SqliteStore, record: Uuid, annotator: &str, name: &str, value: Value) -> Uuid {
  s.annotate(record, annotator.into(), record_labels(&[(name, value)]))
    .await
    .unwrap()
}
