//! Read models returned by the view and statistics operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  label::{Label, LabelLevel},
  record::Metadata,
  stats::Vote,
  verification::{StatusFilter, VerificationStatus},
};

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordViewOptions {
  #[serde(default)]
  pub include_id:      bool,
  #[serde(default)]
  pub include_content: bool,
  /// Record metadata to include; `None` includes all of it.
  #[serde(default)]
  pub meta_names:      Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
  pub uuid:            Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub record_id:       Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content:         Option<String>,
  pub record_metadata: Vec<Metadata>,
}

// ─── Annotations ─────────────────────────────────────────────────────────────

/// Narrows an annotation view. `None` means no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationViewFilter {
  #[serde(default)]
  pub annotators:       Option<Vec<String>>,
  #[serde(default)]
  pub label_names:      Option<Vec<String>>,
  /// Label metadata names to include with each label.
  #[serde(default)]
  pub label_meta_names: Option<Vec<String>>,
}

fn admitted(list: &Option<Vec<String>>, item: &str) -> bool {
  list.as_ref().is_none_or(|names| names.iter().any(|n| n == item))
}

impl AnnotationViewFilter {
  pub fn admits_annotator(&self, annotator: &str) -> bool { admitted(&self.annotators, annotator) }

  pub fn admits_label(&self, name: &str) -> bool { admitted(&self.label_names, name) }

  pub fn admits_label_meta(&self, name: &str) -> bool { admitted(&self.label_meta_names, name) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelView {
  pub label_uuid:    Uuid,
  pub label_name:    String,
  pub label_value:   Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_idx:     Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_idx:       Option<i64>,
  pub metadata_list: Vec<Metadata>,
}

impl From<Label> for LabelView {
  fn from(label: Label) -> Self {
    Self {
      label_uuid:    label.uuid,
      label_name:    label.name,
      label_value:   label.value,
      start_idx:     label.span.map(|s| s.start_idx),
      end_idx:       label.span.map(|s| s.end_idx),
      metadata_list: label.metadata,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorLabels {
  pub annotator:     String,
  pub labels_record: Vec<LabelView>,
  pub labels_span:   Vec<LabelView>,
}

impl AnnotatorLabels {
  pub fn new(annotator: impl Into<String>) -> Self {
    Self { annotator: annotator.into(), labels_record: Vec::new(), labels_span: Vec::new() }
  }

  pub fn push(&mut self, level: LabelLevel, label: LabelView) {
    match level {
      LabelLevel::Record => self.labels_record.push(label),
      LabelLevel::Span => self.labels_span.push(label),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordAnnotations {
  pub uuid:            Uuid,
  pub annotation_list: Vec<AnnotatorLabels>,
}

// ─── Verifications ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationViewFilter {
  pub label_name:  String,
  pub label_level: LabelLevel,
  /// Annotator whose annotations were verified.
  pub annotator:   String,
  #[serde(default)]
  pub verifiers:   Option<Vec<String>>,
  #[serde(default)]
  pub status:      StatusFilter,
}

impl VerificationViewFilter {
  pub fn admits_verifier(&self, verifier: &str) -> bool { admitted(&self.verifiers, verifier) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEntry {
  pub annotator:      String,
  pub verifier:       String,
  pub status:         VerificationStatus,
  /// The label the verification points at.
  pub labels:         Vec<LabelView>,
  pub last_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordVerifications {
  pub uuid:              Uuid,
  /// Newest first.
  pub verification_list: Vec<VerificationEntry>,
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedPoint {
  pub uuid:      Uuid,
  pub x_axis:    f64,
  pub y_axis:    f64,
  pub agg_label: Vote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarRecord {
  pub uuid:    Uuid,
  pub content: String,
  pub score:   f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Similar {
  pub uuid:    Uuid,
  /// Most similar first.
  pub similar: Vec<SimilarRecord>,
}
