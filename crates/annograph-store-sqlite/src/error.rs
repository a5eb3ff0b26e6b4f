//! Error type for `annograph-store-sqlite`.

use annograph_core::{Classify, ErrorKind};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] annograph_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value outside its known set.
  #[error("unexpected stored value: {0}")]
  Decode(String),

  #[error("store belongs to project {found:?}, not {requested:?}")]
  ProjectMismatch { requested: String, found: String },
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Database(e) => classify_connection(e),
      Self::Sqlite(e) => classify_sqlite(e),
      Self::ProjectMismatch { .. } => ErrorKind::Conflict,
      Self::Json(_) | Self::Uuid(_) | Self::DateParse(_) | Self::Decode(_) => {
        ErrorKind::InternalInconsistency
      }
    }
  }
}

fn classify_connection(e: &tokio_rusqlite::Error) -> ErrorKind {
  match e {
    tokio_rusqlite::Error::ConnectionClosed | tokio_rusqlite::Error::Close(_) => {
      ErrorKind::StoreUnavailable
    }
    tokio_rusqlite::Error::Rusqlite(e) => classify_sqlite(e),
    _ => ErrorKind::InternalInconsistency,
  }
}

fn classify_sqlite(e: &rusqlite::Error) -> ErrorKind {
  match e.sqlite_error_code() {
    Some(ErrorCode::ConstraintViolation) => ErrorKind::Conflict,
    Some(
      ErrorCode::DatabaseBusy
      | ErrorCode::DatabaseLocked
      | ErrorCode::CannotOpen
      | ErrorCode::NotADatabase
      | ErrorCode::ReadOnly
      | ErrorCode::DiskFull
      | ErrorCode::SystemIoFailure,
    ) => ErrorKind::StoreUnavailable,
    _ => ErrorKind::InternalInconsistency,
  }
}

/// True if `e` is a uniqueness or other constraint violation.
pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

impl Error {
  pub(crate) fn decode(what: impl Into<String>) -> Self { Self::Decode(what.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn closed_connection_is_retryable() {
    let err = Error::Database(tokio_rusqlite::Error::ConnectionClosed);
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
  }

  #[test]
  fn core_errors_keep_their_kind() {
    let err = Error::from(annograph_core::Error::RecordNotFound(uuid::Uuid::nil()));
    assert_eq!(err.kind(), ErrorKind::NotFound);
  }

  #[test]
  fn decode_failures_are_inconsistencies() {
    assert_eq!(Error::decode("level \"x\"").kind(), ErrorKind::InternalInconsistency);
  }
}
