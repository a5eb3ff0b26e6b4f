//! Label upserts, label metadata, and annotation merges.
//!
//! A label is matched on its key through the `labels_key_idx` unique index,
//! so concurrent writers targeting the same key converge on one row.
//! Annotations are matched the same way on `(record_uuid, annotator)`.

use std::collections::HashSet;

use annograph_core::{
  Error as CoreError,
  annotation::Annotation,
  error::FieldErrors,
  label::{Label, LabelKey, NewLabel, metadata_conflicts},
  record::Metadata,
};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    LABEL_COLUMNS, RawLabel, RawMetadata, decode_dt, decode_uuid, encode_json, encode_uuid,
    encode_uuid_list, now, span_key,
  },
  error::is_constraint_violation,
  records,
};

// ─── Labels ──────────────────────────────────────────────────────────────────

/// Create or update the annotator label at `key`; returns its uuid.
pub fn upsert(conn: &Connection, key: &LabelKey, value: &serde_json::Value) -> Result<Uuid> {
  let span = key.span;
  let uuid: String = conn
    .prepare_cached(
      "INSERT INTO labels (
         uuid, record_uuid, annotator, level, name, span_key, start_idx, end_idx, value_json, source
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'annotation')
       ON CONFLICT (record_uuid, annotator, level, name, span_key) WHERE source = 'annotation'
       DO UPDATE SET value_json = excluded.value_json
       RETURNING uuid",
    )?
    .query_row(
      rusqlite::params![
        encode_uuid(Uuid::new_v4()),
        encode_uuid(key.record_uuid),
        key.annotator,
        key.level.as_str(),
        key.name,
        span_key(span),
        span.map(|s| s.start_idx),
        span.map(|s| s.end_idx),
        encode_json(value),
      ],
      |r| r.get(0),
    )?;
  decode_uuid(&uuid)
}

/// Upsert `label` and try to attach its metadata. Returns the label uuid and
/// the conflicting metadata names, if the batch was rejected.
pub fn upsert_with_metadata(conn: &Connection, label: &NewLabel) -> Result<(Uuid, Vec<String>)> {
  records::ensure(conn, label.key.record_uuid)?;
  let uuid = upsert(conn, &label.key, &label.value)?;
  let conflicts = if label.metadata.is_empty() {
    Vec::new()
  } else {
    attach_metadata(conn, uuid, &label.metadata)?
  };
  Ok((uuid, conflicts))
}

/// Attach every entry of `metadata` or none. Returns the names that
/// prevented the attach; empty on success.
///
/// Names already on the label are caught up front. A uniqueness violation
/// while inserting counts as the same conflict, and the savepoint discards
/// whatever part of the batch was written.
pub fn attach_metadata(conn: &Connection, label_uuid: Uuid, metadata: &[Metadata]) -> Result<Vec<String>> {
  let label = encode_uuid(label_uuid);
  let existing = metadata_names(conn, &label)?;
  let conflicts = metadata_conflicts(&existing, metadata);
  if !conflicts.is_empty() {
    return Ok(conflicts);
  }

  conn.execute_batch("SAVEPOINT label_metadata")?;
  let mut insert = conn.prepare_cached(
    "INSERT INTO label_metadata (label_uuid, name, value_json) VALUES (?1, ?2, ?3)",
  )?;
  for m in metadata {
    match insert.execute(rusqlite::params![label, m.name, encode_json(&m.value)]) {
      Ok(_) => {}
      Err(e) if is_constraint_violation(&e) => {
        conn.execute_batch("ROLLBACK TO label_metadata; RELEASE label_metadata")?;
        return Ok(vec![m.name.clone()]);
      }
      Err(e) => {
        conn.execute_batch("ROLLBACK TO label_metadata; RELEASE label_metadata")?;
        return Err(e.into());
      }
    }
  }
  conn.execute_batch("RELEASE label_metadata")?;
  Ok(Vec::new())
}

fn metadata_names(conn: &Connection, label_uuid: &str) -> Result<Vec<String>> {
  let mut stmt = conn.prepare_cached("SELECT name FROM label_metadata WHERE label_uuid = ?1")?;
  let names = stmt
    .query_map([label_uuid], |r| r.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(names)
}

pub fn metadata(conn: &Connection, label_uuid: &str) -> Result<Vec<Metadata>> {
  let mut stmt = conn.prepare_cached(
    "SELECT name, value_json FROM label_metadata WHERE label_uuid = ?1 ORDER BY name",
  )?;
  let raws = stmt
    .query_map([label_uuid], |r| Ok(RawMetadata { name: r.get(0)?, value_json: r.get(1)? }))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawMetadata::into_metadata).collect()
}

pub fn ensure(conn: &Connection, uuid: Uuid) -> Result<()> {
  let found = conn
    .query_row("SELECT 1 FROM labels WHERE uuid = ?1", [encode_uuid(uuid)], |_| Ok(()))
    .optional()?;
  match found {
    Some(()) => Ok(()),
    None => Err(CoreError::LabelNotFound(uuid).into()),
  }
}

pub fn get(conn: &Connection, uuid: Uuid) -> Result<Label> {
  let raw = conn
    .query_row(
      &format!("SELECT {LABEL_COLUMNS} FROM labels l WHERE l.uuid = ?1"),
      [encode_uuid(uuid)],
      RawLabel::from_row,
    )
    .optional()?;
  let Some(raw) = raw else {
    return Err(CoreError::LabelNotFound(uuid).into());
  };
  let mut label = raw.into_label()?;
  label.metadata = metadata(conn, &encode_uuid(uuid))?;
  Ok(label)
}

/// Delete the annotator label with exactly this key. Links, metadata, and
/// verifications of the label go with it.
pub fn remove(conn: &Connection, key: &LabelKey) -> Result<u64> {
  let removed = conn.execute(
    "DELETE FROM labels
     WHERE record_uuid = ?1 AND annotator = ?2 AND level = ?3 AND name = ?4
       AND span_key = ?5 AND source = 'annotation'",
    rusqlite::params![
      encode_uuid(key.record_uuid),
      key.annotator,
      key.level.as_str(),
      key.name,
      span_key(key.span),
    ],
  )?;
  Ok(removed as u64)
}

// ─── Annotations ─────────────────────────────────────────────────────────────

/// Match or create the `(record, annotator)` annotation; returns its uuid.
pub fn annotation(conn: &Connection, record_uuid: Uuid, annotator: &str) -> Result<Uuid> {
  let uuid: String = conn
    .prepare_cached(
      "INSERT INTO annotations (uuid, record_uuid, annotator, created_on) VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (record_uuid, annotator) DO UPDATE SET annotator = excluded.annotator
       RETURNING uuid",
    )?
    .query_row(
      rusqlite::params![encode_uuid(Uuid::new_v4()), encode_uuid(record_uuid), annotator, now()],
      |r| r.get(0),
    )?;
  decode_uuid(&uuid)
}

pub fn find_annotation(conn: &Connection, record_uuid: Uuid, annotator: &str) -> Result<Option<Uuid>> {
  let uuid: Option<String> = conn
    .query_row(
      "SELECT uuid FROM annotations WHERE record_uuid = ?1 AND annotator = ?2",
      rusqlite::params![encode_uuid(record_uuid), annotator],
      |r| r.get(0),
    )
    .optional()?;
  uuid.as_deref().map(decode_uuid).transpose()
}

pub fn linked_labels(conn: &Connection, annotation_uuid: Uuid) -> Result<Vec<Uuid>> {
  let mut stmt = conn.prepare_cached(
    "SELECT al.label_uuid FROM annotation_labels al
     JOIN labels l ON l.uuid = al.label_uuid
     WHERE al.annotation_uuid = ?1
     ORDER BY l.level, l.name, l.span_key",
  )?;
  let uuids = stmt
    .query_map([encode_uuid(annotation_uuid)], |r| r.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  uuids.iter().map(|s| decode_uuid(s)).collect()
}

/// Link `label_uuids` to the annotation, creating it if absent. With
/// `overwrite`, previously linked labels not in `label_uuids` are deleted.
///
/// Only the annotator's own labels on this record may be linked.
pub fn merge(
  conn: &Connection,
  record_uuid: Uuid,
  annotator: &str,
  label_uuids: &[Uuid],
  overwrite: bool,
) -> Result<Uuid> {
  records::ensure(conn, record_uuid)?;
  if annotator.trim().is_empty() {
    return Err(CoreError::invalid("annotator", "must not be empty").into());
  }

  let record = encode_uuid(record_uuid);
  let mut errors = FieldErrors::new();
  for (i, uuid) in label_uuids.iter().enumerate() {
    let owner: Option<(String, String, String)> = conn
      .query_row(
        "SELECT record_uuid, annotator, source FROM labels WHERE uuid = ?1",
        [encode_uuid(*uuid)],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
      )
      .optional()?;
    let Some((owner_record, owner, source)) = owner else {
      return Err(CoreError::LabelNotFound(*uuid).into());
    };
    let path = format!("label_uuids[{i}]");
    if owner_record != record {
      errors.push(path.clone(), "belongs to another record");
    }
    if owner != annotator {
      errors.push(path.clone(), format!("belongs to annotator {owner:?}"));
    }
    if source != "annotation" {
      errors.push(path, "is a verifier's correction");
    }
  }
  errors.into_result()?;

  let annotation_uuid = annotation(conn, record_uuid, annotator)?;
  let annotation = encode_uuid(annotation_uuid);

  if overwrite {
    let detached = conn.execute(
      "DELETE FROM labels
       WHERE uuid IN (SELECT label_uuid FROM annotation_labels WHERE annotation_uuid = ?1)
         AND uuid NOT IN (SELECT value FROM json_each(?2))",
      rusqlite::params![annotation, encode_uuid_list(label_uuids)],
    )?;
    if detached > 0 {
      tracing::debug!(%annotation_uuid, detached, "overwrite removed labels");
    }
  }

  let mut link = conn.prepare_cached(
    "INSERT OR IGNORE INTO annotation_labels (annotation_uuid, label_uuid) VALUES (?1, ?2)",
  )?;
  let mut seen = HashSet::new();
  for uuid in label_uuids {
    if seen.insert(*uuid) {
      link.execute(rusqlite::params![annotation, encode_uuid(*uuid)])?;
    }
  }
  Ok(annotation_uuid)
}

/// Full replace of the annotator's labels on a record. Any metadata conflict
/// fails the whole call.
pub fn annotate(conn: &Connection, record_uuid: Uuid, annotator: &str, labels: &[NewLabel]) -> Result<Uuid> {
  records::ensure(conn, record_uuid)?;
  let mut label_uuids = Vec::with_capacity(labels.len());
  for label in labels {
    let (uuid, conflicts) = upsert_with_metadata(conn, label)?;
    if !conflicts.is_empty() {
      return Err(CoreError::MetadataConflict { label_uuid: uuid, names: conflicts }.into());
    }
    label_uuids.push(uuid);
  }
  merge(conn, record_uuid, annotator, &label_uuids, true)
}

/// The `(record, annotator)` annotation with its linked labels.
pub fn get_annotation(conn: &Connection, record_uuid: Uuid, annotator: &str) -> Result<Annotation> {
  let found: Option<(String, String)> = conn
    .query_row(
      "SELECT uuid, created_on FROM annotations WHERE record_uuid = ?1 AND annotator = ?2",
      rusqlite::params![encode_uuid(record_uuid), annotator],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;
  let Some((uuid, created_on)) = found else {
    return Err(
      CoreError::AnnotationNotFound { record_uuid, annotator: annotator.to_owned() }.into(),
    );
  };
  let uuid = decode_uuid(&uuid)?;
  Ok(Annotation {
    uuid,
    record_uuid,
    annotator: annotator.to_owned(),
    created_on: decode_dt(&created_on)?,
    label_uuids: linked_labels(conn, uuid)?,
  })
}
