//! Label-schema documents and their validation.
//!
//! Schema versions form an append-only history per project with at most one
//! active row. Whether a submission creates a new version is decided by
//! order-independent structural comparison against the active document.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, error::FieldErrors, label::LabelLevel};

/// An option value: schemas accept integers and strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
  Int(i64),
  Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelOption {
  pub text:  String,
  pub value: OptionValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelSchema {
  pub name:    String,
  pub level:   LabelLevel,
  pub options: Vec<LabelOption>,
}

/// The document submitted to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDocument {
  pub label_schema: Vec<LabelSchema>,
}

impl SchemaDocument {
  /// Check shape, then uniqueness. Shape problems are validation errors;
  /// duplicate label names or option values are conflicts. Both carry
  /// field paths.
  pub fn validate(&self) -> Result<()> {
    let mut shape = FieldErrors::new();
    let mut duplicates = FieldErrors::new();
    let mut names = BTreeSet::new();

    for (i, label) in self.label_schema.iter().enumerate() {
      if label.name.trim().is_empty() {
        shape.push(format!("label_schema[{i}].name"), "must not be empty");
      }
      if label.options.is_empty() {
        shape.push(format!("label_schema[{i}].options"), "must contain at least one option");
      }
      if !names.insert(label.name.as_str()) {
        duplicates.push(
          format!("label_schema[{i}].name"),
          format!(
            "'{}' appears more than once. Label name should be unique within the label schema.",
            label.name
          ),
        );
      }
      let mut values = BTreeSet::new();
      for (j, option) in label.options.iter().enumerate() {
        if !values.insert(&option.value) {
          duplicates.push(
            format!("label_schema[{i}].options[{j}].value"),
            format!("options for '{}' can not have duplicate values.", label.name),
          );
        }
      }
    }

    if !shape.is_empty() {
      return Err(Error::Validation(shape));
    }
    if !duplicates.is_empty() {
      return Err(Error::SchemaConflict(duplicates));
    }
    Ok(())
  }

  /// A copy with labels and options in a canonical order.
  pub fn normalized(&self) -> Self {
    let mut doc = self.clone();
    for label in &mut doc.label_schema {
      label
        .options
        .sort_by(|a, b| a.value.cmp(&b.value).then_with(|| a.text.cmp(&b.text)));
    }
    doc
      .label_schema
      .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.level.cmp(&b.level)));
    doc
  }

  /// Structural equality ignoring the order of labels and options.
  pub fn same_as(&self, other: &Self) -> bool { self.normalized() == other.normalized() }

  pub fn label(&self, name: &str) -> Option<&LabelSchema> {
    self.label_schema.iter().find(|l| l.name == name)
  }
}

/// A persisted schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
  pub uuid:       Uuid,
  pub document:   SchemaDocument,
  pub created_on: DateTime<Utc>,
  pub active:     bool,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::error::{Classify as _, ErrorKind};

  fn doc(v: serde_json::Value) -> SchemaDocument { serde_json::from_value(v).unwrap() }

  fn pair_validation() -> SchemaDocument {
    doc(json!({"label_schema": [
      {"name": "pair_validation", "level": "record", "options": [
        {"value": "true", "text": "Correct pair"},
        {"value": "false", "text": "Incorrect pair"},
      ]},
      {"name": "related_span", "level": "span", "options": [
        {"value": 1, "text": "related"},
      ]},
    ]}))
  }

  #[test]
  fn valid_document_passes() { pair_validation().validate().unwrap(); }

  #[test]
  fn duplicate_label_names_conflict_with_path() {
    let d = doc(json!({"label_schema": [
      {"name": "a", "level": "record", "options": [{"value": 1, "text": "x"}]},
      {"name": "a", "level": "span", "options": [{"value": 1, "text": "x"}]},
    ]}));
    let err = d.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let Error::SchemaConflict(fields) = err else { unreachable!() };
    assert!(fields.get("label_schema[1].name").is_some());
  }

  #[test]
  fn duplicate_option_values_conflict_with_path() {
    let d = doc(json!({"label_schema": [
      {"name": "a", "level": "record", "options": [
        {"value": "x", "text": "one"},
        {"value": "x", "text": "two"},
      ]},
    ]}));
    let Err(Error::SchemaConflict(fields)) = d.validate() else {
      panic!("expected conflict");
    };
    assert!(fields.get("label_schema[0].options[1].value").is_some());
  }

  #[test]
  fn empty_options_are_invalid() {
    let d = doc(json!({"label_schema": [{"name": "a", "level": "record", "options": []}]}));
    assert_eq!(d.validate().unwrap_err().kind(), ErrorKind::Validation);
  }

  #[test]
  fn missing_level_is_rejected() {
    let parsed: Result<SchemaDocument, _> = serde_json::from_value(json!({
      "label_schema": [{"name": "a", "options": [{"value": 1, "text": "x"}]}]
    }));
    assert!(parsed.is_err());
  }

  #[test]
  fn unknown_fields_are_rejected() {
    let parsed: Result<SchemaDocument, _> = serde_json::from_value(json!({
      "label_schema": [],
      "version": 2
    }));
    assert!(parsed.is_err());
  }

  #[test]
  fn comparison_ignores_order() {
    let mut shuffled = pair_validation();
    shuffled.label_schema.reverse();
    shuffled.label_schema[1].options.reverse();
    assert!(pair_validation().same_as(&shuffled));

    shuffled.label_schema[1].options[0].text = "changed".into();
    assert!(!pair_validation().same_as(&shuffled));
  }
}
