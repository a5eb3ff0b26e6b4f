//! Records (the corpus items under annotation) and the import mapping that
//! turns external rows into record fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Result, error::FieldErrors};

/// A corpus item. Unique by `(record_id, dataset)`; `uuid` survives
/// re-import while `content` may be overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
  pub uuid:      Uuid,
  pub dataset:   String,
  /// Per-dataset ordinal supplied by the import.
  pub record_id: i64,
  pub content:   String,
}

/// A named value attached to a record or a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
  pub name:  String,
  pub value: Value,
}

impl Metadata {
  pub fn new(name: impl Into<String>, value: Value) -> Self {
    Self { name: name.into(), value }
  }
}

/// One entry of a record-metadata batch update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadataUpdate {
  pub uuid:  Uuid,
  pub value: Value,
}

// ─── Import ──────────────────────────────────────────────────────────────────

/// Maps record fields to the column names of the external rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
  /// Column holding the per-dataset ordinal.
  pub id:       String,
  /// Column holding the record content.
  pub content:  String,
  /// Optional column imported as record metadata of the same name.
  #[serde(default)]
  pub metadata: Option<String>,
}

impl ColumnMapping {
  pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
    Self { id: id.into(), content: content.into(), metadata: None }
  }

  pub fn with_metadata(mut self, column: impl Into<String>) -> Self {
    self.metadata = Some(column.into());
    self
  }
}

/// A row after mapping, ready to be merged on `(record_id, dataset)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedRow {
  pub record_id: i64,
  pub content:   String,
  pub metadata:  Option<Metadata>,
}

/// Map external rows to record fields, collecting every problem before
/// failing so nothing is written for a partially valid batch.
pub fn map_rows(
  rows: &[Map<String, Value>],
  mapping: &ColumnMapping,
) -> Result<Vec<ImportedRow>> {
  let mut errors = FieldErrors::new();
  if mapping.id.trim().is_empty() {
    errors.push("column_mapping.id", "must not be empty");
  }
  if mapping.content.trim().is_empty() {
    errors.push("column_mapping.content", "must not be empty");
  }
  if !errors.is_empty() {
    return Err(crate::Error::Validation(errors));
  }

  let mut mapped = Vec::with_capacity(rows.len());
  for (i, row) in rows.iter().enumerate() {
    let id_path = format!("rows[{i}].{}", mapping.id);
    let record_id = match row.get(&mapping.id) {
      None | Some(Value::Null) => {
        errors.push(id_path, "missing");
        None
      }
      Some(v) => {
        let parsed = ordinal(v);
        if parsed.is_none() {
          errors.push(id_path, format!("{v} is not an integer ordinal"));
        }
        parsed
      }
    };

    let content_path = format!("rows[{i}].{}", mapping.content);
    let content = match row.get(&mapping.content) {
      None | Some(Value::Null) => {
        errors.push(content_path, "missing");
        None
      }
      Some(Value::String(s)) => Some(s.clone()),
      Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
      Some(_) => {
        errors.push(content_path, "must be a scalar");
        None
      }
    };

    let metadata = mapping.metadata.as_ref().and_then(|column| {
      row
        .get(column)
        .filter(|v| !v.is_null())
        .map(|v| Metadata::new(column.clone(), v.clone()))
    });

    if let (Some(record_id), Some(content)) = (record_id, content) {
      mapped.push(ImportedRow { record_id, content, metadata });
    }
  }

  errors.into_result()?;
  Ok(mapped)
}

/// Integer coercion for ordinals: integers, integral floats, and strings that
/// parse as either.
fn ordinal(v: &Value) -> Option<i64> {
  match v {
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
          .ok()
          .filter(|f| f.fract() == 0.0)
          .map(|f| f as i64)
      })
    }
    _ => None,
  }
}

/// A flattened `(record, annotator, label)` row for bulk export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
  pub record_id:   i64,
  pub content:     String,
  pub annotator:   String,
  pub label_name:  String,
  pub label_value: Value,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::error::ErrorKind;
  use crate::error::Classify as _;

  fn rows(v: Value) -> Vec<Map<String, Value>> {
    serde_json::from_value(v).unwrap()
  }

  #[test]
  fn maps_id_and_content() {
    let input = rows(json!([
      {"sent_id": 1, "content": "first"},
      {"sent_id": "2", "content": "second"},
      {"sent_id": 3.0, "content": 42},
    ]));
    let mapped = map_rows(&input, &ColumnMapping::new("sent_id", "content")).unwrap();

    assert_eq!(mapped.len(), 3);
    assert_eq!(mapped[0].record_id, 1);
    assert_eq!(mapped[1].record_id, 2);
    assert_eq!(mapped[2].record_id, 3);
    assert_eq!(mapped[2].content, "42");
    assert!(mapped.iter().all(|r| r.metadata.is_none()));
  }

  #[test]
  fn reports_every_bad_row_by_path() {
    let input = rows(json!([
      {"sent_id": 1},
      {"sent_id": "x", "content": "fine"},
    ]));
    let err = map_rows(&input, &ColumnMapping::new("sent_id", "content")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let crate::Error::Validation(fields) = err else { unreachable!() };
    assert!(fields.get("rows[0].content").is_some());
    assert!(fields.get("rows[1].sent_id").is_some());
  }

  #[test]
  fn metadata_column_becomes_record_metadata() {
    let input = rows(json!([{"id": 7, "text": "t", "emb": [0.1, 0.2]}]));
    let mapping = ColumnMapping::new("id", "text").with_metadata("emb");
    let mapped = map_rows(&input, &mapping).unwrap();
    assert_eq!(mapped[0].metadata, Some(Metadata::new("emb", json!([0.1, 0.2]))));
  }
}
