//! Annotations (one annotator's labeling bundle for one record) and the
//! batch annotate contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::{Classify, ErrorKind},
  label::LabelsByLevel,
};

/// Keyed by `(record_uuid, annotator)`; created lazily on first label write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
  pub uuid:        Uuid,
  pub record_uuid: Uuid,
  pub annotator:   String,
  pub created_on:  DateTime<Utc>,
  /// Labels currently linked through `label_of`.
  pub label_uuids: Vec<Uuid>,
}

/// One entry of an [`annotate_batch`] call.
///
/// [`annotate_batch`]: crate::store::AnnotationStore::annotate_batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
  pub record_uuid: Uuid,
  #[serde(default)]
  pub labels:      LabelsByLevel,
}

/// Per-item outcome. Items never abort each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
  pub uuid:    Uuid,
  #[serde(flatten)]
  pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchOutcome {
  Annotated { annotation_uuid: Uuid },
  Failed { error: String, kind: ErrorKind },
}

impl BatchItemResult {
  pub fn annotated(uuid: Uuid, annotation_uuid: Uuid) -> Self {
    Self { uuid, outcome: BatchOutcome::Annotated { annotation_uuid } }
  }

  pub fn failed<E: std::error::Error + Classify>(uuid: Uuid, error: &E) -> Self {
    Self {
      uuid,
      outcome: BatchOutcome::Failed { error: error.to_string(), kind: error.kind() },
    }
  }

  pub fn annotation_uuid(&self) -> Option<Uuid> {
    match self.outcome {
      BatchOutcome::Annotated { annotation_uuid } => Some(annotation_uuid),
      BatchOutcome::Failed { .. } => None,
    }
  }
}
