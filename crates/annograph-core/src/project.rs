//! The project (the root node schemas, subsets and agents hang off) and the
//! caller identity supplied by the identity collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project envelope. One store holds exactly one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
  pub uuid:        Uuid,
  pub name:        String,
  pub description: String,
  pub created_on:  DateTime<Utc>,
}

/// What the caller is allowed to do, as asserted by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Administrator,
  #[default]
  Contributor,
  /// An automated agent run writing annotations under a job id.
  Job,
}

/// The `{user_id, role}` pair attached to every call. Trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub user_id: String,
  pub role:    Role,
}

impl Identity {
  pub fn new(user_id: impl Into<String>, role: Role) -> Self {
    Self { user_id: user_id.into(), role }
  }
}
