//! Verifications: supervisor judgments that confirm or correct a label.
//!
//! The confirm/correct decision is made here, in plain code, from the labels
//! the store already holds; the store then issues exactly one write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Error, Result,
  error::FieldErrors,
  label::LabelLevel,
  query::canonical,
};

// ─── Status ──────────────────────────────────────────────────────────────────

/// The typed edge between a verification and its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
  /// The verifier agreed with a label the annotator already holds.
  Confirms,
  /// The verifier submitted a value the annotator does not hold.
  Corrects,
}

impl VerificationStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Confirms => "CONFIRMS",
      Self::Corrects => "CORRECTS",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "CONFIRMS" => Some(Self::Confirms),
      "CORRECTS" => Some(Self::Corrects),
      _ => None,
    }
  }
}

/// Status filter for the verification view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusFilter {
  Confirms,
  Corrects,
  #[default]
  All,
}

impl StatusFilter {
  pub fn admits(self, status: VerificationStatus) -> bool {
    match self {
      Self::All => true,
      Self::Confirms => status == VerificationStatus::Confirms,
      Self::Corrects => status == VerificationStatus::Corrects,
    }
  }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// Keyed by `(annotation, label_name, verifier)`; linked to exactly one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
  pub uuid:            Uuid,
  pub annotation_uuid: Uuid,
  /// Annotator of the verified annotation.
  pub annotator:       String,
  pub label_name:      String,
  pub verifier:        String,
  pub status:          VerificationStatus,
  pub label_uuid:      Uuid,
  pub last_timestamp:  DateTime<Utc>,
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// A label as submitted with a verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyLabel {
  pub label_name:  String,
  pub label_level: LabelLevel,
  pub label_value: Value,
}

/// Input to [`crate::store::AnnotationStore::verify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
  pub record_uuid: Uuid,
  /// Annotator whose annotation is being verified.
  pub annotator:   String,
  pub verifier:    String,
  pub label_name:  String,
  pub label_level: LabelLevel,
  pub labels:      Vec<VerifyLabel>,
}

impl VerifyRequest {
  /// Check the request and return the single submitted value.
  ///
  /// Span level and empty submissions are unsupported; more than one label
  /// or a label that does not match `label_name`/`label_level` is invalid.
  pub fn submitted_value(&self) -> Result<&Value> {
    if self.label_level == LabelLevel::Span {
      return Err(Error::Unsupported("span-level verification is not supported".into()));
    }
    if self.labels.is_empty() {
      return Err(Error::Unsupported(
        "verification with an empty label list is not supported".into(),
      ));
    }

    let mut errors = FieldErrors::new();
    if self.annotator.trim().is_empty() {
      errors.push("annotator", "must not be empty");
    }
    if self.verifier.trim().is_empty() {
      errors.push("verifier", "must not be empty");
    }
    if self.label_name.trim().is_empty() {
      errors.push("label_name", "must not be empty");
    }
    if self.labels.len() > 1 {
      errors.push("labels", "exactly one label may be submitted for record-level verification");
    }
    let label = &self.labels[0];
    if label.label_name != self.label_name {
      errors.push("labels[0].label_name", format!("expected {:?}", self.label_name));
    }
    if label.label_level != self.label_level {
      errors.push("labels[0].label_level", format!("expected {:?}", self.label_level.as_str()));
    }
    if label.label_value.is_null() {
      errors.push("labels[0].label_value", "must not be null");
    }
    errors.into_result()?;
    Ok(&label.label_value)
  }
}

// ─── Decision ────────────────────────────────────────────────────────────────

/// What a verification write has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
  /// Link the verification to this existing label.
  Confirm { label_uuid: Uuid },
  /// Create a verifier-owned label carrying the submitted value.
  Correct,
}

impl Reconciliation {
  pub fn status(self) -> VerificationStatus {
    match self {
      Self::Confirm { .. } => VerificationStatus::Confirms,
      Self::Correct => VerificationStatus::Corrects,
    }
  }
}

/// Decide between confirm and correct purely on value equality against the
/// annotation's labels of the verified name. Verifier identity plays no part.
pub fn reconcile(candidates: &[(Uuid, Value)], submitted: &Value) -> Reconciliation {
  candidates
    .iter()
    .find(|(_, value)| canonical(value) == canonical(submitted))
    .map(|(label_uuid, _)| Reconciliation::Confirm { label_uuid: *label_uuid })
    .unwrap_or(Reconciliation::Correct)
}

/// Result of a verify call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
  pub verification_uuid: Uuid,
  pub status:            VerificationStatus,
  pub label_uuid:        Uuid,
  pub last_timestamp:    DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::error::{Classify as _, ErrorKind};

  fn request(labels: Vec<VerifyLabel>) -> VerifyRequest {
    VerifyRequest {
      record_uuid: Uuid::nil(),
      annotator:   "u1".into(),
      verifier:    "boss".into(),
      label_name:  "sentiment".into(),
      label_level: LabelLevel::Record,
      labels,
    }
  }

  fn label(value: Value) -> VerifyLabel {
    VerifyLabel {
      label_name:  "sentiment".into(),
      label_level: LabelLevel::Record,
      label_value: value,
    }
  }

  #[test]
  fn equal_value_confirms_existing_label() {
    let existing = Uuid::new_v4();
    let candidates = vec![(Uuid::new_v4(), json!(["neg"])), (existing, json!(["pos"]))];
    assert_eq!(
      reconcile(&candidates, &json!(["pos"])),
      Reconciliation::Confirm { label_uuid: existing }
    );
  }

  #[test]
  fn unseen_value_corrects() {
    let candidates = vec![(Uuid::new_v4(), json!(["neg"]))];
    assert_eq!(reconcile(&candidates, &json!(["pos"])), Reconciliation::Correct);
    assert_eq!(reconcile(&[], &json!(["pos"])), Reconciliation::Correct);
  }

  #[test]
  fn integral_float_confirms_integer_label() {
    let existing = Uuid::new_v4();
    assert_eq!(
      reconcile(&[(existing, json!(1))], &json!(1.0)),
      Reconciliation::Confirm { label_uuid: existing }
    );
  }

  #[test]
  fn span_level_is_unsupported() {
    let mut req = request(vec![label(json!(["pos"]))]);
    req.label_level = LabelLevel::Span;
    assert_eq!(req.submitted_value().unwrap_err().kind(), ErrorKind::Unsupported);
  }

  #[test]
  fn empty_label_list_is_unsupported() {
    assert_eq!(request(vec![]).submitted_value().unwrap_err().kind(), ErrorKind::Unsupported);
  }

  #[test]
  fn more_than_one_label_is_invalid() {
    let req = request(vec![label(json!(["pos"])), label(json!(["neg"]))]);
    assert_eq!(req.submitted_value().unwrap_err().kind(), ErrorKind::Validation);
  }

  #[test]
  fn single_matching_label_yields_its_value() {
    let req = request(vec![label(json!(["pos"]))]);
    assert_eq!(req.submitted_value().unwrap(), &json!(["pos"]));
  }
}
