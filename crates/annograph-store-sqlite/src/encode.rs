//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings (microseconds, `Z`) so they
//! sort lexicographically. JSON values are stored as compact canonical JSON text.
//! UUIDs are stored as hyphenated lowercase strings.

use annograph_core::{
  agent::Agent,
  assignment::Assignment,
  label::{Label, LabelLevel, Span},
  query::canonical,
  record::{Metadata, Record},
  schema::{SchemaDocument, SchemaVersion},
  verification::VerificationStatus,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

/// A JSON array of uuids, bound as one parameter and expanded in SQL with
/// `json_each`.
pub fn encode_uuid_list(ids: &[Uuid]) -> String {
  Value::from(ids.iter().copied().map(encode_uuid).collect::<Vec<_>>()).to_string()
}

/// A JSON array of strings, for `json_each` membership tests.
pub fn encode_str_list(items: &[String]) -> String { Value::from(items.to_vec()).to_string() }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn now() -> String { encode_dt(Utc::now()) }

/// Compact JSON text with integral floats written as integers, so stored
/// values and `==` search operands compare alike.
pub fn encode_json(value: &Value) -> String { canonical(value).to_string() }

pub fn decode_json(s: &str) -> Result<Value> { Ok(serde_json::from_str(s)?) }

pub fn decode_level(s: &str) -> Result<LabelLevel> {
  match s {
    "record" => Ok(LabelLevel::Record),
    "span" => Ok(LabelLevel::Span),
    other => Err(Error::decode(format!("label level {other:?}"))),
  }
}

pub fn decode_status(s: &str) -> Result<VerificationStatus> {
  VerificationStatus::parse(s).ok_or_else(|| Error::decode(format!("verification status {s:?}")))
}

/// The `span_key` column value for a label key.
pub fn span_key(span: Option<Span>) -> String {
  match span {
    Some(span) => format!("{}:{}", span.start_idx, span.end_idx),
    None => String::new(),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const RECORD_COLUMNS: &str = "r.uuid, r.dataset, r.record_id, r.content";

pub struct RawRecord {
  pub uuid:      String,
  pub dataset:   String,
  pub record_id: i64,
  pub content:   String,
}

impl RawRecord {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uuid:      row.get(0)?,
      dataset:   row.get(1)?,
      record_id: row.get(2)?,
      content:   row.get(3)?,
    })
  }

  pub fn into_record(self) -> Result<Record> {
    Ok(Record {
      uuid:      decode_uuid(&self.uuid)?,
      dataset:   self.dataset,
      record_id: self.record_id,
      content:   self.content,
    })
  }
}

pub struct RawMetadata {
  pub name:       String,
  pub value_json: String,
}

impl RawMetadata {
  pub fn into_metadata(self) -> Result<Metadata> {
    Ok(Metadata { name: self.name, value: decode_json(&self.value_json)? })
  }
}

pub const LABEL_COLUMNS: &str =
  "l.uuid, l.record_uuid, l.annotator, l.level, l.name, l.start_idx, l.end_idx, l.value_json";

pub struct RawLabel {
  pub uuid:        String,
  pub record_uuid: String,
  pub annotator:   String,
  pub level:       String,
  pub name:        String,
  pub start_idx:   Option<i64>,
  pub end_idx:     Option<i64>,
  pub value_json:  String,
}

impl RawLabel {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> { Self::from_row_at(row, 0) }

  /// Read [`LABEL_COLUMNS`] starting at `offset`.
  pub fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      uuid:        row.get(offset)?,
      record_uuid: row.get(offset + 1)?,
      annotator:   row.get(offset + 2)?,
      level:       row.get(offset + 3)?,
      name:        row.get(offset + 4)?,
      start_idx:   row.get(offset + 5)?,
      end_idx:     row.get(offset + 6)?,
      value_json:  row.get(offset + 7)?,
    })
  }

  /// Decode with no metadata attached; callers fill it in.
  pub fn into_label(self) -> Result<Label> {
    let level = decode_level(&self.level)?;
    let span = match (level, self.start_idx, self.end_idx) {
      (LabelLevel::Span, Some(start), Some(end)) => Some(Span::new(start, end)),
      (LabelLevel::Span, ..) => {
        return Err(Error::decode(format!("span label {} without bounds", self.uuid)));
      }
      (LabelLevel::Record, ..) => None,
    };
    Ok(Label {
      uuid: decode_uuid(&self.uuid)?,
      record_uuid: decode_uuid(&self.record_uuid)?,
      annotator: self.annotator,
      level,
      name: self.name,
      value: decode_json(&self.value_json)?,
      span,
      metadata: Vec::new(),
    })
  }
}

pub struct RawSchema {
  pub uuid:       String,
  pub document:   String,
  pub created_on: String,
  pub active:     bool,
}

impl RawSchema {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uuid:       row.get(0)?,
      document:   row.get(1)?,
      created_on: row.get(2)?,
      active:     row.get(3)?,
    })
  }

  pub fn into_version(self) -> Result<SchemaVersion> {
    let document: SchemaDocument = serde_json::from_str(&self.document)?;
    Ok(SchemaVersion {
      uuid: decode_uuid(&self.uuid)?,
      document,
      created_on: decode_dt(&self.created_on)?,
      active: self.active,
    })
  }
}

pub struct RawAssignment {
  pub uuid:         String,
  pub record_uuids: String,
  pub annotator:    String,
  pub assigned_by:  String,
  pub created_on:   String,
}

impl RawAssignment {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uuid:         row.get(0)?,
      record_uuids: row.get(1)?,
      annotator:    row.get(2)?,
      assigned_by:  row.get(3)?,
      created_on:   row.get(4)?,
    })
  }

  pub fn into_assignment(self) -> Result<Assignment> {
    Ok(Assignment {
      uuid:         decode_uuid(&self.uuid)?,
      record_uuids: serde_json::from_str(&self.record_uuids)?,
      annotator:    self.annotator,
      assigned_by:  self.assigned_by,
      created_on:   decode_dt(&self.created_on)?,
    })
  }
}

pub const AGENT_COLUMNS: &str =
  "ag.uuid, ag.created_by, ag.created_on, ag.model_config, ag.prompt_template, ag.provider_api";

pub struct RawAgent {
  pub uuid:            String,
  pub created_by:      String,
  pub created_on:      String,
  pub model_config:    String,
  pub prompt_template: String,
  pub provider_api:    String,
}

impl RawAgent {
  /// Read the agent columns starting at `offset`.
  pub fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      uuid:            row.get(offset)?,
      created_by:      row.get(offset + 1)?,
      created_on:      row.get(offset + 2)?,
      model_config:    row.get(offset + 3)?,
      prompt_template: row.get(offset + 4)?,
      provider_api:    row.get(offset + 5)?,
    })
  }

  pub fn into_agent(self) -> Result<Agent> {
    Ok(Agent {
      uuid:            decode_uuid(&self.uuid)?,
      created_by:      self.created_by,
      created_on:      decode_dt(&self.created_on)?,
      model_config:    serde_json::from_str(&self.model_config)?,
      prompt_template: self.prompt_template,
      provider_api:    self.provider_api,
      job_list:        None,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width() {
    let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let b = a + chrono::Duration::microseconds(1);
    assert_eq!(encode_dt(a), "2024-01-02T03:04:05.000000Z");
    assert_eq!(encode_dt(a).len(), encode_dt(b).len());
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn span_keys() {
    assert_eq!(span_key(None), "");
    assert_eq!(span_key(Some(Span::new(3, 9))), "3:9");
  }

  #[test]
  fn lists_are_json_arrays() {
    assert_eq!(encode_uuid_list(&[Uuid::nil()]), format!("[\"{}\"]", Uuid::nil()));
    assert_eq!(encode_str_list(&[]), "[]");
  }
}
