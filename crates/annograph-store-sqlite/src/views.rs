//! Read models over records, annotations, and verifications. Unknown record
//! uuids are skipped; results follow `record_id` order.

use std::collections::BTreeMap;

use annograph_core::{
  Error as CoreError,
  label::LabelLevel,
  record::Metadata,
  view::{
    AnnotationViewFilter, AnnotatorLabels, LabelView, RecordAnnotations, RecordVerifications,
    RecordView, RecordViewOptions, VerificationEntry, VerificationViewFilter,
  },
};
use rusqlite::Connection;
use uuid::Uuid;

use crate::{
  Result,
  encode::{LABEL_COLUMNS, RawLabel, decode_dt, decode_json, decode_status, encode_uuid},
  labels, records,
};

pub fn record_view(conn: &Connection, uuids: &[Uuid], options: &RecordViewOptions) -> Result<Vec<RecordView>> {
  records::contents(conn, uuids)?
    .into_iter()
    .map(|record| {
      let record_metadata = records::metadata_of(conn, &encode_uuid(record.uuid))?
        .into_iter()
        .filter(|(name, _)| {
          options.meta_names.as_ref().is_none_or(|names| names.contains(name))
        })
        .map(|(name, value)| Ok(Metadata { name, value: decode_json(&value)? }))
        .collect::<Result<Vec<_>>>()?;
      Ok(RecordView {
        uuid: record.uuid,
        record_id: options.include_id.then_some(record.record_id),
        content: options.include_content.then_some(record.content),
        record_metadata,
      })
    })
    .collect()
}

fn label_view(conn: &Connection, raw: RawLabel, keep_meta: impl Fn(&str) -> bool) -> Result<(LabelLevel, LabelView)> {
  let uuid = raw.uuid.clone();
  let mut label = raw.into_label()?;
  label.metadata = labels::metadata(conn, &uuid)?
    .into_iter()
    .filter(|m| keep_meta(&m.name))
    .collect();
  Ok((label.level, LabelView::from(label)))
}

pub fn annotation_view(
  conn: &Connection,
  uuids: &[Uuid],
  filter: &AnnotationViewFilter,
) -> Result<Vec<RecordAnnotations>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT a.annotator, {LABEL_COLUMNS}
     FROM annotations a
     JOIN annotation_labels al ON al.annotation_uuid = a.uuid
     JOIN labels l             ON l.uuid = al.label_uuid
     WHERE a.record_uuid = ?1
     ORDER BY a.annotator, l.level, l.name, l.start_idx, l.end_idx"
  ))?;

  let mut out = Vec::new();
  for record in records::contents(conn, uuids)? {
    let rows = stmt
      .query_map([encode_uuid(record.uuid)], |r| {
        Ok((r.get::<_, String>(0)?, RawLabel::from_row_at(r, 1)?))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut by_annotator: BTreeMap<String, AnnotatorLabels> = BTreeMap::new();
    for (annotator, raw) in rows {
      if !filter.admits_annotator(&annotator) || !filter.admits_label(&raw.name) {
        continue;
      }
      let (level, view) = label_view(conn, raw, |name| filter.admits_label_meta(name))?;
      by_annotator
        .entry(annotator.clone())
        .or_insert_with(|| AnnotatorLabels::new(annotator))
        .push(level, view);
    }
    out.push(RecordAnnotations {
      uuid:            record.uuid,
      annotation_list: by_annotator.into_values().collect(),
    });
  }
  Ok(out)
}

pub fn verification_view(
  conn: &Connection,
  uuids: &[Uuid],
  filter: &VerificationViewFilter,
) -> Result<Vec<RecordVerifications>> {
  if filter.label_level == LabelLevel::Span {
    return Err(CoreError::Unsupported("span-level verification views are not supported".into()).into());
  }

  let mut stmt = conn.prepare_cached(&format!(
    "SELECT v.verifier, v.status, v.last_timestamp, {LABEL_COLUMNS}
     FROM verifications v
     JOIN annotations a ON a.uuid = v.annotation_uuid
     JOIN labels l      ON l.uuid = v.label_uuid
     WHERE a.record_uuid = ?1 AND a.annotator = ?2 AND v.label_name = ?3
     ORDER BY v.last_timestamp DESC, v.rowid DESC"
  ))?;

  let mut out = Vec::new();
  for record in records::contents(conn, uuids)? {
    let rows = stmt
      .query_map(
        rusqlite::params![encode_uuid(record.uuid), filter.annotator, filter.label_name],
        |r| {
          let head: (String, String, String) = (r.get(0)?, r.get(1)?, r.get(2)?);
          Ok((head, RawLabel::from_row_at(r, 3)?))
        },
      )?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut verification_list = Vec::new();
    for ((verifier, status, stamp), raw) in rows {
      let status = decode_status(&status)?;
      if !filter.admits_verifier(&verifier) || !filter.status.admits(status) {
        continue;
      }
      let (_, label) = label_view(conn, raw, |_| true)?;
      verification_list.push(VerificationEntry {
        annotator: filter.annotator.clone(),
        verifier,
        status,
        labels: vec![label],
        last_timestamp: decode_dt(&stamp)?,
      });
    }
    out.push(RecordVerifications { uuid: record.uuid, verification_list });
  }
  Ok(out)
}
