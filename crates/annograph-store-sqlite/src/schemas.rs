//! The label-schema registry: an append-only history with one active row.

use annograph_core::schema::{SchemaDocument, SchemaVersion};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawSchema, encode_dt, encode_uuid},
};

const COLUMNS: &str = "uuid, document, created_on, active";

/// Versions newest first, optionally only active or only retired ones.
pub fn list(conn: &Connection, active: Option<bool>) -> Result<Vec<SchemaVersion>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {COLUMNS} FROM schemas
     WHERE ?1 IS NULL OR active = ?1
     ORDER BY created_on DESC, rowid DESC"
  ))?;
  let raws = stmt
    .query_map([active], RawSchema::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawSchema::into_version).collect()
}

pub fn active(conn: &Connection) -> Result<Option<SchemaVersion>> {
  let raw = conn
    .query_row(
      &format!("SELECT {COLUMNS} FROM schemas WHERE active = 1"),
      [],
      RawSchema::from_row,
    )
    .optional()?;
  raw.map(RawSchema::into_version).transpose()
}

/// Make `document` the active version unless it already is.
pub fn set(conn: &Connection, project_uuid: Uuid, document: SchemaDocument) -> Result<SchemaVersion> {
  document.validate()?;

  if let Some(current) = active(conn)?
    && current.document.same_as(&document)
  {
    tracing::debug!(uuid = %current.uuid, "schema unchanged");
    return Ok(current);
  }

  conn.execute("UPDATE schemas SET active = 0 WHERE active = 1", [])?;
  let version = SchemaVersion {
    uuid: Uuid::new_v4(),
    document,
    created_on: chrono::Utc::now(),
    active: true,
  };
  conn.execute(
    "INSERT INTO schemas (uuid, project_uuid, document, created_on, active)
     VALUES (?1, ?2, ?3, ?4, 1)",
    rusqlite::params![
      encode_uuid(version.uuid),
      encode_uuid(project_uuid),
      serde_json::to_string(&version.document)?,
      encode_dt(version.created_on),
    ],
  )?;
  tracing::info!(
    uuid = %version.uuid,
    labels = version.document.label_schema.len(),
    "activated schema version"
  );
  Ok(version)
}
