//! Record import and record metadata.

use annograph_core::{
  Error as CoreError,
  record::{ExportRow, ImportedRow, Record, RecordMetadataUpdate},
};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RECORD_COLUMNS, RawRecord, decode_json, encode_json, encode_uuid, encode_uuid_list},
};

pub const EXPORT_LIMIT: usize = 1000;

/// Merge rows on `(record_id, dataset)`. New keys get a fresh uuid; existing
/// keys keep theirs and take the new content.
pub fn import(conn: &Connection, dataset: &str, rows: &[ImportedRow]) -> Result<u64> {
  let mut upsert = conn.prepare_cached(
    "INSERT INTO records (uuid, dataset, record_id, content) VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (record_id, dataset) DO UPDATE SET content = excluded.content
     RETURNING uuid",
  )?;
  let mut written = 0;
  for row in rows {
    let uuid: String = upsert.query_row(
      rusqlite::params![encode_uuid(Uuid::new_v4()), dataset, row.record_id, row.content],
      |r| r.get(0),
    )?;
    if let Some(meta) = &row.metadata {
      upsert_metadata(conn, &uuid, &meta.name, &meta.value)?;
    }
    written += 1;
  }
  Ok(written)
}

fn upsert_metadata(
  conn: &Connection,
  record_uuid: &str,
  name: &str,
  value: &serde_json::Value,
) -> Result<()> {
  conn
    .prepare_cached(
      "INSERT INTO record_metadata (record_uuid, name, value_json) VALUES (?1, ?2, ?3)
       ON CONFLICT (record_uuid, name) DO UPDATE SET value_json = excluded.value_json",
    )?
    .execute(rusqlite::params![record_uuid, name, encode_json(value)])?;
  Ok(())
}

pub fn exists(conn: &Connection, uuid: Uuid) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM records WHERE uuid = ?1",
        [encode_uuid(uuid)],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

/// Fail with `RecordNotFound` unless the record exists.
pub fn ensure(conn: &Connection, uuid: Uuid) -> Result<()> {
  if exists(conn, uuid)? {
    Ok(())
  } else {
    Err(CoreError::RecordNotFound(uuid).into())
  }
}

pub fn get(conn: &Connection, uuid: Uuid) -> Result<Record> {
  let raw = conn
    .query_row(
      &format!("SELECT {RECORD_COLUMNS} FROM records r WHERE r.uuid = ?1"),
      [encode_uuid(uuid)],
      RawRecord::from_row,
    )
    .optional()?;
  match raw {
    Some(raw) => raw.into_record(),
    None => Err(CoreError::RecordNotFound(uuid).into()),
  }
}

/// Records among `uuids`, ordered by `record_id`.
pub fn contents(conn: &Connection, uuids: &[Uuid]) -> Result<Vec<Record>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {RECORD_COLUMNS} FROM records r
     WHERE r.uuid IN (SELECT value FROM json_each(?1))
     ORDER BY r.record_id, r.dataset, r.uuid"
  ))?;
  let raws = stmt
    .query_map([encode_uuid_list(uuids)], RawRecord::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawRecord::into_record).collect()
}

/// Upsert metadata `name` on each listed record that exists.
pub fn set_metadata(conn: &Connection, name: &str, updates: &[RecordMetadataUpdate]) -> Result<u64> {
  let mut written = 0;
  for update in updates {
    if !exists(conn, update.uuid)? {
      tracing::debug!(uuid = %update.uuid, "skipping metadata for unknown record");
      continue;
    }
    upsert_metadata(conn, &encode_uuid(update.uuid), name, &update.value)?;
    written += 1;
  }
  Ok(written)
}

pub fn export(conn: &Connection) -> Result<Vec<ExportRow>> {
  let mut stmt = conn.prepare(
    "SELECT r.record_id, r.content, a.annotator, l.name, l.value_json
     FROM records r
     JOIN annotations a        ON a.record_uuid = r.uuid
     JOIN annotation_labels al ON al.annotation_uuid = a.uuid
     JOIN labels l             ON l.uuid = al.label_uuid
     ORDER BY r.dataset, r.record_id, a.annotator, l.name, l.span_key
     LIMIT ?1",
  )?;
  let raws = stmt
    .query_map([EXPORT_LIMIT as i64], |r| {
      Ok((r.get::<_, i64>(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get::<_, String>(4)?))
    })?
    .collect::<rusqlite::Result<Vec<(i64, String, String, String, String)>>>()?;
  raws
    .into_iter()
    .map(|(record_id, content, annotator, label_name, value_json)| {
      Ok(ExportRow {
        record_id,
        content,
        annotator,
        label_name,
        label_value: decode_json(&value_json)?,
      })
    })
    .collect()
}

/// All metadata of one record, by name.
pub fn metadata_of(conn: &Connection, record_uuid: &str) -> Result<Vec<(String, String)>> {
  let mut stmt = conn.prepare_cached(
    "SELECT name, value_json FROM record_metadata WHERE record_uuid = ?1 ORDER BY name",
  )?;
  let rows = stmt
    .query_map([record_uuid], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}
