//! Labels, single named judgments at record or span granularity, and the
//! input shapes used to write them.
//!
//! A label is identified by its key: `(record, annotator, level, name)` for
//! record-level labels, plus `(start_idx, end_idx)` for span-level labels.
//! Distinct spans are independent keys, so overlapping spans coexist.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result, error::FieldErrors, record::Metadata};

// ─── Level ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelLevel {
  Record,
  Span,
}

impl LabelLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Record => "record",
      Self::Span => "span",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "record" => Ok(Self::Record),
      "span" => Ok(Self::Span),
      other => Err(Error::invalid(
        "label_level",
        format!("unsupported label level {other:?}, expected one of: record, span"),
      )),
    }
  }
}

/// A `[start_idx, end_idx]` character range inside a record's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
  pub start_idx: i64,
  pub end_idx:   i64,
}

impl Span {
  pub fn new(start_idx: i64, end_idx: i64) -> Self { Self { start_idx, end_idx } }
}

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The identity of a label within the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelKey {
  pub record_uuid: Uuid,
  pub annotator:   String,
  pub level:       LabelLevel,
  pub name:        String,
  pub span:        Option<Span>,
}

impl LabelKey {
  pub fn record(record_uuid: Uuid, annotator: &str, name: &str) -> Self {
    Self {
      record_uuid,
      annotator: annotator.to_owned(),
      level: LabelLevel::Record,
      name: name.to_owned(),
      span: None,
    }
  }

  pub fn span(record_uuid: Uuid, annotator: &str, name: &str, span: Span) -> Self {
    Self {
      record_uuid,
      annotator: annotator.to_owned(),
      level: LabelLevel::Span,
      name: name.to_owned(),
      span: Some(span),
    }
  }

  /// Check the key shape, reporting problems under `prefix`.
  pub fn check(&self, prefix: &str, errors: &mut FieldErrors) {
    if self.annotator.trim().is_empty() {
      errors.push(join(prefix, "annotator"), "must not be empty");
    }
    if self.name.trim().is_empty() {
      errors.push(join(prefix, "label_name"), "must not be empty");
    }
    match (self.level, self.span) {
      (LabelLevel::Span, None) => {
        errors.push(join(prefix, "start_idx"), "span labels require start_idx and end_idx");
      }
      (LabelLevel::Span, Some(span)) => {
        if span.start_idx < 0 {
          errors.push(join(prefix, "start_idx"), "must not be negative");
        }
        if span.end_idx < span.start_idx {
          errors.push(join(prefix, "end_idx"), "must not be smaller than start_idx");
        }
      }
      (LabelLevel::Record, Some(_)) => {
        errors.push(join(prefix, "start_idx"), "record labels do not take a span");
      }
      (LabelLevel::Record, None) => {}
    }
  }

  pub fn validate(&self) -> Result<()> {
    let mut errors = FieldErrors::new();
    self.check("", &mut errors);
    errors.into_result()
  }
}

fn join(prefix: &str, field: &str) -> String {
  if prefix.is_empty() {
    field.to_owned()
  } else {
    format!("{prefix}.{field}")
  }
}

// ─── Label ───────────────────────────────────────────────────────────────────

/// A persisted label with its attached metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
  pub uuid:        Uuid,
  pub record_uuid: Uuid,
  pub annotator:   String,
  pub level:       LabelLevel,
  pub name:        String,
  pub value:       Value,
  pub span:        Option<Span>,
  pub metadata:    Vec<Metadata>,
}

/// Input to [`crate::store::AnnotationStore::upsert_label`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewLabel {
  pub key:      LabelKey,
  pub value:    Value,
  pub metadata: Vec<Metadata>,
}

impl NewLabel {
  pub fn new(key: LabelKey, value: Value) -> Self {
    Self { key, value, metadata: Vec::new() }
  }

  pub fn with_metadata(mut self, metadata: Vec<Metadata>) -> Self {
    self.metadata = metadata;
    self
  }

  pub fn check(&self, prefix: &str, errors: &mut FieldErrors) {
    self.key.check(prefix, errors);
    if self.value.is_null() {
      errors.push(join(prefix, "label_value"), "must not be null");
    }
    for (i, m) in self.metadata.iter().enumerate() {
      if m.name.trim().is_empty() {
        errors.push(
          join(prefix, &format!("metadata_list[{i}].metadata_name")),
          "must not be empty",
        );
      }
    }
  }

  pub fn validate(&self) -> Result<()> {
    let mut errors = FieldErrors::new();
    self.check("", &mut errors);
    errors.into_result()
  }
}

/// Names in `requested` that would collide with `existing` metadata on the
/// same label, or that appear more than once in `requested`. Sorted, unique.
pub fn metadata_conflicts(existing: &[String], requested: &[Metadata]) -> Vec<String> {
  let existing: BTreeSet<&str> = existing.iter().map(String::as_str).collect();
  let mut seen = BTreeSet::new();
  let mut conflicts = BTreeSet::new();
  for m in requested {
    if existing.contains(m.name.as_str()) || !seen.insert(m.name.as_str()) {
      conflicts.insert(m.name.clone());
    }
  }
  conflicts.into_iter().collect()
}

// ─── Wire shapes ─────────────────────────────────────────────────────────────

/// Label metadata as submitted alongside a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataInput {
  pub metadata_name:  String,
  pub metadata_value: Value,
}

impl From<MetadataInput> for Metadata {
  fn from(m: MetadataInput) -> Self { Metadata::new(m.metadata_name, m.metadata_value) }
}

/// One label inside an annotate payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelInput {
  pub label_name:    String,
  pub label_value:   Value,
  #[serde(default)]
  pub start_idx:     Option<i64>,
  #[serde(default)]
  pub end_idx:       Option<i64>,
  #[serde(default)]
  pub metadata_list: Vec<MetadataInput>,
}

impl LabelInput {
  pub fn record(name: &str, value: Value) -> Self {
    Self {
      label_name:    name.to_owned(),
      label_value:   value,
      start_idx:     None,
      end_idx:       None,
      metadata_list: Vec::new(),
    }
  }

  pub fn span(name: &str, value: Value, start_idx: i64, end_idx: i64) -> Self {
    Self {
      start_idx: Some(start_idx),
      end_idx: Some(end_idx),
      ..Self::record(name, value)
    }
  }

  fn into_new_label(
    self,
    record_uuid: Uuid,
    annotator: &str,
    level: LabelLevel,
    prefix: &str,
    errors: &mut FieldErrors,
  ) -> Option<NewLabel> {
    let span = match (level, self.start_idx, self.end_idx) {
      (LabelLevel::Record, None, None) => None,
      (LabelLevel::Record, _, _) => {
        errors.push(join(prefix, "start_idx"), "record labels do not take a span");
        return None;
      }
      (LabelLevel::Span, Some(start), Some(end)) => Some(Span::new(start, end)),
      (LabelLevel::Span, start, _) => {
        let missing = if start.is_none() { "start_idx" } else { "end_idx" };
        errors.push(join(prefix, missing), "missing");
        return None;
      }
    };
    let label = NewLabel {
      key:      LabelKey {
        record_uuid,
        annotator: annotator.to_owned(),
        level,
        name: self.label_name,
        span,
      },
      value:    self.label_value,
      metadata: self.metadata_list.into_iter().map(Metadata::from).collect(),
    };
    label.check(prefix, errors);
    Some(label)
  }
}

/// The labels of one annotator for one record, grouped by level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelsByLevel {
  #[serde(default)]
  pub labels_record: Vec<LabelInput>,
  #[serde(default)]
  pub labels_span:   Vec<LabelInput>,
}

impl LabelsByLevel {
  pub fn is_empty(&self) -> bool { self.labels_record.is_empty() && self.labels_span.is_empty() }

  /// Validate every entry and build the label writes, span level first.
  pub fn into_new_labels(self, record_uuid: Uuid, annotator: &str) -> Result<Vec<NewLabel>> {
    let mut errors = FieldErrors::new();
    if annotator.trim().is_empty() {
      errors.push("annotator", "must not be empty");
    }
    let mut labels = Vec::with_capacity(self.labels_record.len() + self.labels_span.len());
    for (i, input) in self.labels_span.into_iter().enumerate() {
      let prefix = format!("labels_span[{i}]");
      labels.extend(input.into_new_label(record_uuid, annotator, LabelLevel::Span, &prefix, &mut errors));
    }
    for (i, input) in self.labels_record.into_iter().enumerate() {
      let prefix = format!("labels_record[{i}]");
      labels.extend(input.into_new_label(record_uuid, annotator, LabelLevel::Record, &prefix, &mut errors));
    }
    errors.into_result()?;
    Ok(labels)
  }
}

/// A single-label edit: set (upsert and link) or, with `label_value: None`,
/// remove by exact key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEdit {
  pub label_name:    String,
  pub label_level:   LabelLevel,
  #[serde(default)]
  pub label_value:   Option<Value>,
  #[serde(default)]
  pub start_idx:     Option<i64>,
  #[serde(default)]
  pub end_idx:       Option<i64>,
  #[serde(default)]
  pub metadata_list: Vec<MetadataInput>,
}

impl LabelEdit {
  pub fn key(&self, record_uuid: Uuid, annotator: &str) -> Result<LabelKey> {
    let span = match (self.start_idx, self.end_idx) {
      (Some(start), Some(end)) => Some(Span::new(start, end)),
      _ => None,
    };
    let key = LabelKey {
      record_uuid,
      annotator: annotator.to_owned(),
      level: self.label_level,
      name: self.label_name.clone(),
      span,
    };
    key.validate()?;
    Ok(key)
  }

  /// Turn the edit into the single write it stands for.
  pub fn into_write(self, record_uuid: Uuid, annotator: &str) -> Result<LabelWrite> {
    let key = self.key(record_uuid, annotator)?;
    match self.label_value {
      None => Ok(LabelWrite::Remove(key)),
      Some(value) => {
        let label = NewLabel {
          key,
          value,
          metadata: self.metadata_list.into_iter().map(Metadata::from).collect(),
        };
        label.validate()?;
        Ok(LabelWrite::Set(label))
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelWrite {
  Set(NewLabel),
  Remove(LabelKey),
}

/// Result of [`crate::store::AnnotationStore::apply_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelEditOutcome {
  Set { label_uuid: Uuid, annotation_uuid: Uuid },
  Removed { count: u64 },
}
