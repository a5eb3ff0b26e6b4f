//! Row gathering for the statistics operations. The arithmetic lives in
//! `annograph_core::stats`.

use std::collections::BTreeMap;

use annograph_core::{
  Error as CoreError,
  error::FieldErrors,
  stats::{self, Aggregation, LabelProgress},
  view::{ProjectedPoint, Similar, SimilarRecord},
};
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Result,
  encode::{decode_json, decode_uuid, encode_str_list, encode_uuid, encode_uuid_list},
  records,
};

pub fn record_count(conn: &Connection) -> Result<u64> {
  let n: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
  Ok(n as u64)
}

pub fn label_progress(conn: &Connection) -> Result<LabelProgress> {
  let (total, annotated): (i64, i64) = conn.query_row(
    "SELECT
       (SELECT COUNT(*) FROM records),
       (SELECT COUNT(DISTINCT a.record_uuid)
          FROM annotations a
          JOIN annotation_labels al ON al.annotation_uuid = a.uuid)",
    [],
    |r| Ok((r.get(0)?, r.get(1)?)),
  )?;
  Ok(LabelProgress { total: total as u64, annotated: annotated as u64 })
}

/// `(record, annotator, value)` for every linked label named `label_name`,
/// optionally restricted to some annotators.
fn label_values(
  conn: &Connection,
  label_name: &str,
  annotators: &[String],
) -> Result<Vec<(Uuid, String, Value)>> {
  let mut stmt = conn.prepare_cached(
    "SELECT a.record_uuid, a.annotator, l.value_json
     FROM annotations a
     JOIN annotation_labels al ON al.annotation_uuid = a.uuid
     JOIN labels l             ON l.uuid = al.label_uuid
     WHERE l.name = ?1
       AND (json_array_length(?2) = 0 OR a.annotator IN (SELECT value FROM json_each(?2)))
     ORDER BY a.record_uuid, a.annotator",
  )?;
  let raws = stmt
    .query_map(rusqlite::params![label_name, encode_str_list(annotators)], |r| {
      Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws
    .into_iter()
    .map(|(record, annotator, value)| Ok((decode_uuid(&record)?, annotator, decode_json(&value)?)))
    .collect()
}

fn by_record(rows: Vec<(Uuid, String, Value)>) -> BTreeMap<Uuid, Vec<Value>> {
  let mut grouped: BTreeMap<Uuid, Vec<Value>> = BTreeMap::new();
  for (record, _, value) in rows {
    grouped.entry(record).or_default().push(value);
  }
  grouped
}

pub fn label_distributions(
  conn: &Connection,
  label_name: &str,
  annotators: &[String],
  aggregation: Aggregation,
) -> Result<BTreeMap<String, u64>> {
  let rows = label_values(conn, label_name, annotators)?;
  Ok(stats::distribution(by_record(rows).into_values(), aggregation))
}

pub fn annotator_contributions(conn: &Connection, label_name: Option<&str>) -> Result<BTreeMap<String, u64>> {
  let mut stmt = conn.prepare_cached(
    "SELECT a.annotator, COUNT(*)
     FROM annotations a
     JOIN annotation_labels al ON al.annotation_uuid = a.uuid
     JOIN labels l             ON l.uuid = al.label_uuid
     WHERE ?1 IS NULL OR l.name = ?1
     GROUP BY a.annotator",
  )?;
  let rows = stmt
    .query_map([label_name], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?
    .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
  Ok(rows)
}

pub fn annotator_agreements(conn: &Connection, label_name: &str) -> Result<BTreeMap<String, f64>> {
  let rows = label_values(conn, label_name, &[])?;
  Ok(stats::pairwise_agreements(&rows))
}

/// Record uuid → parsed vector metadata `meta_name`, for records that have
/// it. A value that is not a numeric array is reported against its record.
fn vectors(conn: &Connection, meta_name: &str, uuids: Option<&[Uuid]>) -> Result<BTreeMap<Uuid, Vec<f64>>> {
  let mut stmt = conn.prepare_cached(
    "SELECT m.record_uuid, m.value_json FROM record_metadata m
     WHERE m.name = ?1
       AND (?2 IS NULL OR m.record_uuid IN (SELECT value FROM json_each(?2)))",
  )?;
  let raws = stmt
    .query_map(rusqlite::params![meta_name, uuids.map(encode_uuid_list)], |r| {
      Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut out = BTreeMap::new();
  let mut errors = FieldErrors::new();
  for (record, value) in raws {
    let uuid = decode_uuid(&record)?;
    match stats::parse_vector(&decode_json(&value)?) {
      Some(v) => {
        out.insert(uuid, v);
      }
      None => errors.push(format!("{meta_name}[{uuid}]"), "is not an array of numbers"),
    }
  }
  errors.into_result()?;
  Ok(out)
}

pub fn embedding_projection(
  conn: &Connection,
  label_name: &str,
  embedding_name: &str,
) -> Result<Vec<ProjectedPoint>> {
  let grouped = by_record(label_values(conn, label_name, &[])?);
  let records: Vec<Uuid> = grouped.keys().copied().collect();
  let mut embeddings = vectors(conn, embedding_name, Some(&records))?;

  let mut errors = FieldErrors::new();
  let mut points = Vec::with_capacity(records.len());
  for uuid in &records {
    match embeddings.remove(uuid) {
      Some(v) => points.push(v),
      None => errors.push(
        embedding_name,
        format!("record {uuid} has no {embedding_name:?} metadata"),
      ),
    }
  }
  errors.into_result()?;

  let projected = stats::project_2d(&points)?;
  tracing::debug!(records = records.len(), embedding = embedding_name, "projected embeddings");
  records
    .into_iter()
    .zip(projected)
    .map(|(uuid, [x_axis, y_axis])| {
      let agg_label = stats::majority_vote(&grouped[&uuid])
        .ok_or_else(|| CoreError::InternalInconsistency(format!("record {uuid} lost its labels")))?;
      Ok(ProjectedPoint { uuid, x_axis, y_axis, agg_label })
    })
    .collect()
}

pub fn suggest_similar(
  conn: &Connection,
  uuids: &[Uuid],
  meta_name: &str,
  limit: usize,
) -> Result<Vec<Similar>> {
  let all = vectors(conn, meta_name, None)?;
  let mut out = Vec::with_capacity(uuids.len());
  for uuid in uuids {
    records::ensure(conn, *uuid)?;
    let Some(target) = all.get(uuid) else {
      return Err(CoreError::invalid(
        "uuids",
        format!("record {uuid} has no {meta_name:?} metadata"),
      )
      .into());
    };
    let mut scored: Vec<(Uuid, f64)> = all
      .iter()
      .filter(|(other, _)| *other != uuid)
      .filter_map(|(other, v)| stats::cosine(target, v).map(|s| (*other, s)))
      .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(limit);

    let mut similar = Vec::with_capacity(scored.len());
    for (other, score) in scored {
      let content: String = conn.query_row(
        "SELECT content FROM records WHERE uuid = ?1",
        [encode_uuid(other)],
        |r| r.get(0),
      )?;
      similar.push(SimilarRecord { uuid: other, content, score });
    }
    out.push(Similar { uuid: *uuid, similar });
  }
  Ok(out)
}
