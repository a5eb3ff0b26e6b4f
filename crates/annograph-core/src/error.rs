//! Error types for `annograph-core`.
//!
//! Every failure surfaced by an engine operation belongs to exactly one
//! [`ErrorKind`]. Backends expose the kind of their own errors through
//! [`Classify`] so callers can branch (retry, report, reject) without
//! inspecting backend-specific variants.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The caller-visible category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  Validation,
  Conflict,
  Unsupported,
  /// The backing store could not be reached; safe to retry with backoff.
  StoreUnavailable,
  /// The store answered with an unexpected shape. Never retried.
  InternalInconsistency,
}

/// Implemented by every error type an [`AnnotationStore`] may return.
///
/// [`AnnotationStore`]: crate::store::AnnotationStore
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

// ─── Field errors ────────────────────────────────────────────────────────────

/// Validation messages indexed by the path of the offending field, e.g.
/// `label_schema[1].options[0].value`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
  pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
    self.0.entry(path.into()).or_default().push(message.into());
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn len(&self) -> usize { self.0.values().map(Vec::len).sum() }

  pub fn get(&self, path: &str) -> Option<&[String]> {
    self.0.get(path).map(Vec::as_slice)
  }

  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  /// Turn a non-empty collection into an error, or `Ok(())` if empty.
  pub fn into_result(self) -> Result<()> {
    if self.is_empty() {
      Ok(())
    } else {
      Err(Error::Validation(self))
    }
  }
}

impl fmt::Display for FieldErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for (path, messages) in &self.0 {
      for message in messages {
        if !first {
          f.write_str("; ")?;
        }
        first = false;
        if path.is_empty() {
          f.write_str(message)?;
        } else {
          write!(f, "{path}: {message}")?;
        }
      }
    }
    Ok(())
  }
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
  #[error("record not found: {0}")]
  RecordNotFound(Uuid),

  #[error("label not found: {0}")]
  LabelNotFound(Uuid),

  #[error("agent not found: {0}")]
  AgentNotFound(Uuid),

  #[error("annotation not found for record {record_uuid} and annotator {annotator:?}")]
  AnnotationNotFound { record_uuid: Uuid, annotator: String },

  #[error("validation failed: {0}")]
  Validation(FieldErrors),

  #[error("metadata {names:?} already exists for label {label_uuid}; no metadata was attached")]
  MetadataConflict { label_uuid: Uuid, names: Vec<String> },

  #[error("schema document rejected: {0}")]
  SchemaConflict(FieldErrors),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unsupported: {0}")]
  Unsupported(String),

  #[error("store unavailable: {0}")]
  StoreUnavailable(String),

  #[error("internal inconsistency: {0}")]
  InternalInconsistency(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Shorthand for a single-field validation failure.
  pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
    let mut errors = FieldErrors::new();
    errors.push(path, message);
    Self::Validation(errors)
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::RecordNotFound(_)
      | Self::LabelNotFound(_)
      | Self::AgentNotFound(_)
      | Self::AnnotationNotFound { .. } => ErrorKind::NotFound,
      Self::Validation(_) => ErrorKind::Validation,
      Self::MetadataConflict { .. } | Self::SchemaConflict(_) | Self::Conflict(_) => {
        ErrorKind::Conflict
      }
      Self::Unsupported(_) => ErrorKind::Unsupported,
      Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
      Self::InternalInconsistency(_) | Self::Serialization(_) => {
        ErrorKind::InternalInconsistency
      }
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
