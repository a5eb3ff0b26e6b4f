//! Subsets of records assigned to annotators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable set of record uuids assigned to one annotator. Assignments
/// are never edited; a new assignment supersedes older ones by creation
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
  pub uuid:         Uuid,
  pub record_uuids: Vec<Uuid>,
  pub annotator:    String,
  pub assigned_by:  String,
  pub created_on:   DateTime<Utc>,
}
