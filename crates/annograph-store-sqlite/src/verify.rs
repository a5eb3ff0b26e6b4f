//! Supervisor verification: confirm an existing label or correct it.
//!
//! The confirm/correct decision is taken in code from the candidate labels;
//! exactly one verification write follows.

use annograph_core::{
  Error as CoreError,
  verification::{Reconciliation, VerifyOutcome, VerifyRequest, reconcile},
};
use rusqlite::{Connection, OptionalExtension as _};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Result,
  encode::{decode_dt, decode_json, decode_uuid, encode_json, encode_uuid, now},
  labels, records,
};

/// Labels a submitted value is compared against: the annotator's labels of
/// that name on the annotation, then correction labels already attached to
/// verifications of that annotation and name.
fn candidates(conn: &Connection, annotation_uuid: &str, label_name: &str) -> Result<Vec<(Uuid, Value)>> {
  let mut stmt = conn.prepare_cached(
    "SELECT uuid, value_json FROM (
       SELECT l.uuid, l.value_json, 0 AS rank, l.rowid AS seq
       FROM annotation_labels al
       JOIN labels l ON l.uuid = al.label_uuid
       WHERE al.annotation_uuid = ?1 AND l.name = ?2 AND l.level = 'record'
       UNION
       SELECT l.uuid, l.value_json, 1 AS rank, l.rowid AS seq
       FROM verifications v
       JOIN labels l ON l.uuid = v.label_uuid
       WHERE v.annotation_uuid = ?1 AND v.label_name = ?2 AND l.source = 'correction'
     )
     ORDER BY rank, seq",
  )?;
  let raws = stmt
    .query_map([annotation_uuid, label_name], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws
    .into_iter()
    .map(|(uuid, value)| Ok((decode_uuid(&uuid)?, decode_json(&value)?)))
    .collect()
}

pub fn verify(conn: &Connection, request: &VerifyRequest) -> Result<VerifyOutcome> {
  let submitted = request.submitted_value()?;
  records::ensure(conn, request.record_uuid)?;
  let annotation_uuid = labels::find_annotation(conn, request.record_uuid, &request.annotator)?
    .ok_or_else(|| CoreError::AnnotationNotFound {
      record_uuid: request.record_uuid,
      annotator:   request.annotator.clone(),
    })?;
  let annotation = encode_uuid(annotation_uuid);

  let decision = reconcile(&candidates(conn, &annotation, &request.label_name)?, submitted);
  let label_uuid = match decision {
    Reconciliation::Confirm { label_uuid } => label_uuid,
    Reconciliation::Correct => {
      let uuid = Uuid::new_v4();
      conn.execute(
        "INSERT INTO labels (uuid, record_uuid, annotator, level, name, span_key, value_json, source)
         VALUES (?1, ?2, ?3, ?4, ?5, '', ?6, 'correction')",
        rusqlite::params![
          encode_uuid(uuid),
          encode_uuid(request.record_uuid),
          request.verifier,
          request.label_level.as_str(),
          request.label_name,
          encode_json(submitted),
        ],
      )?;
      uuid
    }
  };

  let previous: Option<String> = conn
    .query_row(
      "SELECT label_uuid FROM verifications
       WHERE annotation_uuid = ?1 AND label_name = ?2 AND verifier = ?3",
      rusqlite::params![annotation, request.label_name, request.verifier],
      |r| r.get(0),
    )
    .optional()?;

  let status = decision.status();
  let (uuid, stamp): (String, String) = conn.query_row(
    "INSERT INTO verifications (
       uuid, annotation_uuid, label_name, verifier, status, label_uuid, last_timestamp
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (annotation_uuid, label_name, verifier) DO UPDATE SET
       status         = excluded.status,
       label_uuid     = excluded.label_uuid,
       last_timestamp = excluded.last_timestamp
     RETURNING uuid, last_timestamp",
    rusqlite::params![
      encode_uuid(Uuid::new_v4()),
      annotation,
      request.label_name,
      request.verifier,
      status.as_str(),
      encode_uuid(label_uuid),
      now(),
    ],
    |r| Ok((r.get(0)?, r.get(1)?)),
  )?;

  // A correction label nobody points at any more is dropped.
  if let Some(previous) = previous.filter(|p| *p != encode_uuid(label_uuid)) {
    conn.execute(
      "DELETE FROM labels
       WHERE uuid = ?1 AND source = 'correction'
         AND NOT EXISTS (SELECT 1 FROM verifications WHERE label_uuid = ?1)",
      [previous],
    )?;
  }

  tracing::debug!(
    verification = %uuid,
    status = status.as_str(),
    verifier = %request.verifier,
    "verification recorded"
  );
  Ok(VerifyOutcome {
    verification_uuid: decode_uuid(&uuid)?,
    status,
    label_uuid,
    last_timestamp: decode_dt(&stamp)?,
  })
}

