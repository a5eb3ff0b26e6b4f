//! Record subsets assigned to annotators.

use annograph_core::{Error as CoreError, assignment::Assignment};
use rusqlite::Connection;
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawAssignment, encode_dt, encode_uuid, encode_uuid_list},
  records,
};

pub fn set(
  conn: &Connection,
  project_uuid: Uuid,
  record_uuids: Vec<Uuid>,
  annotator: &str,
  assigned_by: &str,
) -> Result<Assignment> {
  if annotator.trim().is_empty() {
    return Err(CoreError::invalid("annotator", "must not be empty").into());
  }
  for uuid in &record_uuids {
    records::ensure(conn, *uuid)?;
  }

  let assignment = Assignment {
    uuid: Uuid::new_v4(),
    record_uuids,
    annotator: annotator.to_owned(),
    assigned_by: assigned_by.to_owned(),
    created_on: chrono::Utc::now(),
  };
  conn.execute(
    "INSERT INTO subsets (uuid, project_uuid, annotator, assigned_by, created_on, record_uuids)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    rusqlite::params![
      encode_uuid(assignment.uuid),
      encode_uuid(project_uuid),
      assignment.annotator,
      assignment.assigned_by,
      encode_dt(assignment.created_on),
      encode_uuid_list(&assignment.record_uuids),
    ],
  )?;
  tracing::info!(
    uuid = %assignment.uuid,
    annotator = %assignment.annotator,
    records = assignment.record_uuids.len(),
    "assigned records"
  );
  Ok(assignment)
}

/// Assignments of `annotator`, newest first.
pub fn get(conn: &Connection, annotator: &str, latest_only: bool) -> Result<Vec<Assignment>> {
  let mut stmt = conn.prepare_cached(
    "SELECT uuid, record_uuids, annotator, assigned_by, created_on FROM subsets
     WHERE annotator = ?1
     ORDER BY created_on DESC, rowid DESC
     LIMIT CASE WHEN ?2 THEN 1 ELSE -1 END",
  )?;
  let raws = stmt
    .query_map(rusqlite::params![annotator, latest_only], RawAssignment::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawAssignment::into_assignment).collect()
}
