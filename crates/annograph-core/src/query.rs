//! Search filters and the typed predicate AST they compile to.
//!
//! Callers describe a search with a [`SearchQuery`]. [`SearchQuery::compile`]
//! validates it and produces a [`Predicate`]: a tree of record-scope and
//! annotation-scope clause nodes whose names are [`Ident`]s. Backends walk
//! the tree to build their own query text; user-supplied names never reach a
//! backend unless they passed identifier validation, and values are always
//! carried as data.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Result, error::FieldErrors};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 1000;

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// A label or metadata name that passed identifier-syntax validation: a
/// letter or `_`, followed by letters, digits, or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Ident(String);

impl Ident {
  pub fn parse(s: &str) -> Option<Self> {
    let mut chars = s.chars();
    let first = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
      return None;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_') {
      return None;
    }
    Some(Self(s.to_owned()))
  }

  fn checked(path: String, s: &str, errors: &mut FieldErrors) -> Option<Self> {
    let parsed = Self::parse(s);
    if parsed.is_none() {
      errors.push(path, format!("{s:?} is not a valid identifier"));
    }
    parsed
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Ident {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Wire-level filters ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
  Eq,
  Lt,
  Le,
  Gt,
  Ge,
  Exists,
  Conflicts,
}

impl Operator {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Eq => "==",
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
      Self::Exists => "exists",
      Self::Conflicts => "conflicts",
    }
  }
}

impl FromStr for Operator {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "==" => Ok(Self::Eq),
      "<" => Ok(Self::Lt),
      "<=" => Ok(Self::Le),
      ">" => Ok(Self::Gt),
      ">=" => Ok(Self::Ge),
      "exists" => Ok(Self::Exists),
      "conflicts" => Ok(Self::Conflicts),
      other => Err(format!("operator {other:?} not supported")),
    }
  }
}

impl TryFrom<String> for Operator {
  type Error = String;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<Operator> for String {
  fn from(op: Operator) -> Self { op.as_str().to_owned() }
}

/// `{name, operator, value}` over a named property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
  pub name:     String,
  pub operator: Operator,
  #[serde(default)]
  pub value:    Option<Value>,
}

impl Condition {
  pub fn new(name: &str, operator: Operator, value: Option<Value>) -> Self {
    Self { name: name.to_owned(), operator, value }
  }
}

/// A label-metadata condition scoped to labels named `label_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMetadataCondition {
  pub label_name: String,
  #[serde(flatten)]
  pub condition:  Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationMode {
  #[default]
  All,
  Verified,
  Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCondition {
  pub label_name:  String,
  #[serde(default)]
  pub search_mode: VerificationMode,
}

/// Input to [`crate::store::AnnotationStore::search`].
///
/// Record conditions and annotation conditions are each conjunctive; a
/// record matches when it satisfies every record condition and at least one
/// of its annotations satisfies every annotation condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
  #[serde(default = "default_limit")]
  pub limit:                     usize,
  #[serde(default)]
  pub skip:                      usize,
  // record conditions
  #[serde(default)]
  pub uuid_list:                 Option<Vec<Uuid>>,
  #[serde(default)]
  pub keyword:                   Option<String>,
  #[serde(default)]
  pub regex:                     Option<String>,
  #[serde(default)]
  pub record_metadata_condition: Option<Condition>,
  // annotation conditions
  #[serde(default)]
  pub annotator_list:            Option<Vec<String>>,
  #[serde(default)]
  pub label_condition:           Option<Condition>,
  #[serde(default)]
  pub label_metadata_condition:  Option<LabelMetadataCondition>,
  #[serde(default)]
  pub verification_condition:    Option<VerificationCondition>,
}

fn default_limit() -> usize { DEFAULT_LIMIT }

impl Default for SearchQuery {
  fn default() -> Self {
    Self {
      limit:                     DEFAULT_LIMIT,
      skip:                      0,
      uuid_list:                 None,
      keyword:                   None,
      regex:                     None,
      record_metadata_condition: None,
      annotator_list:            None,
      label_condition:           None,
      label_metadata_condition:  None,
      verification_condition:    None,
    }
  }
}

// ─── AST ─────────────────────────────────────────────────────────────────────

/// A comparison against a property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
  /// Exact match of any scalar or structured value, after [`canonical`]
  /// number normalisation on both sides.
  Eq(Value),
  /// Numeric range; the stored value is coerced to a float.
  Range(RangeOp, f64),
  /// True iff the named property is present; the value is ignored.
  Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
  Lt,
  Le,
  Gt,
  Ge,
}

impl RangeOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
    }
  }

  pub fn holds(self, lhs: f64, rhs: f64) -> bool {
    match self {
      Self::Lt => lhs < rhs,
      Self::Le => lhs <= rhs,
      Self::Gt => lhs > rhs,
      Self::Ge => lhs >= rhs,
    }
  }
}

/// `name == <ident> AND value <comparison>` over a named property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyTest {
  pub name:       Ident,
  pub comparison: Comparison,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordClause {
  UuidIn(Vec<Uuid>),
  ContentContains(String),
  /// Full-content regular-expression match; the pattern is known to compile.
  ContentMatches(String),
  Metadata(PropertyTest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationClause {
  AnnotatorIn(Vec<String>),
  Label(PropertyTest),
  /// Some label named `label_name` on the annotation carries metadata
  /// satisfying `test`.
  LabelMetadata { label_name: Ident, test: PropertyTest },
  /// The annotation has (or lacks) a verification for `label_name`.
  Verified { label_name: Ident, verified: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
  Record(RecordClause),
  /// At least one annotation of the record satisfies every clause.
  AnyAnnotation(Vec<AnnotationClause>),
  /// Over annotations satisfying `scope`, labels named `label_name` carry
  /// two or more distinct values.
  Conflict { label_name: Ident, scope: Vec<AnnotationClause> },
}

/// A compiled, validated search.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
  pub clauses: Vec<Clause>,
  pub skip:    usize,
  pub limit:   usize,
}

impl Predicate {
  pub fn is_unfiltered(&self) -> bool { self.clauses.is_empty() }
}

// ─── Compilation ─────────────────────────────────────────────────────────────

impl SearchQuery {
  /// Validate every condition and build the predicate tree. All problems are
  /// reported together, indexed by field path.
  pub fn compile(&self) -> Result<Predicate> {
    let mut errors = FieldErrors::new();
    let mut clauses = Vec::new();

    if self.limit == 0 {
      errors.push("limit", "must be at least 1");
    } else if self.limit > MAX_LIMIT {
      errors.push("limit", format!("must not exceed {MAX_LIMIT}"));
    }

    // Record scope.
    if let Some(uuids) = &self.uuid_list {
      clauses.push(Clause::Record(RecordClause::UuidIn(uuids.clone())));
    }
    if let Some(keyword) = &self.keyword {
      clauses.push(Clause::Record(RecordClause::ContentContains(keyword.clone())));
    }
    if let Some(pattern) = &self.regex {
      match regex::Regex::new(&format!("^(?:{pattern})$")) {
        Ok(_) => clauses.push(Clause::Record(RecordClause::ContentMatches(pattern.clone()))),
        Err(e) => errors.push("regex", e.to_string()),
      }
    }
    if let Some(cond) = &self.record_metadata_condition
      && let Some(test) = property_test("record_metadata_condition", cond, &mut errors)
    {
      clauses.push(Clause::Record(RecordClause::Metadata(test)));
    }

    // Annotation scope.
    let mut scope = Vec::new();
    if let Some(annotators) = &self.annotator_list {
      scope.push(AnnotationClause::AnnotatorIn(annotators.clone()));
    }
    if let Some(cond) = &self.verification_condition {
      let label_name =
        Ident::checked("verification_condition.label_name".into(), &cond.label_name, &mut errors);
      match (cond.search_mode, label_name) {
        (VerificationMode::All, _) | (_, None) => {}
        (VerificationMode::Verified, Some(label_name)) => {
          scope.push(AnnotationClause::Verified { label_name, verified: true });
        }
        (VerificationMode::Unverified, Some(label_name)) => {
          scope.push(AnnotationClause::Verified { label_name, verified: false });
        }
      }
    }
    let mut label_meta = None;
    if let Some(cond) = &self.label_metadata_condition {
      let label_name = Ident::checked(
        "label_metadata_condition.label_name".into(),
        &cond.label_name,
        &mut errors,
      );
      let test = property_test("label_metadata_condition", &cond.condition, &mut errors);
      if let (Some(label_name), Some(test)) = (label_name, test) {
        label_meta = Some(AnnotationClause::LabelMetadata { label_name, test });
      }
    }

    let mut conflict = None;
    if let Some(cond) = &self.label_condition {
      if cond.operator == Operator::Conflicts {
        conflict = Ident::checked("label_condition.name".into(), &cond.name, &mut errors);
      } else if let Some(test) = property_test("label_condition", cond, &mut errors) {
        scope.push(AnnotationClause::Label(test));
      }
    }

    // The conflict set is drawn from annotations passing the annotator and
    // verification filters; a label-metadata test is then a separate
    // requirement on the record.
    match conflict {
      Some(label_name) => {
        clauses.push(Clause::Conflict { label_name, scope });
        clauses.extend(label_meta.map(|c| Clause::AnyAnnotation(vec![c])));
      }
      None => {
        scope.extend(label_meta);
        if !scope.is_empty() {
          clauses.push(Clause::AnyAnnotation(scope));
        }
      }
    }

    errors.into_result()?;
    Ok(Predicate { clauses, skip: self.skip, limit: self.limit })
  }
}

fn property_test(prefix: &str, cond: &Condition, errors: &mut FieldErrors) -> Option<PropertyTest> {
  let name = Ident::checked(format!("{prefix}.name"), &cond.name, errors);
  let comparison = match cond.operator {
    Operator::Exists => Some(Comparison::Exists),
    Operator::Eq => match &cond.value {
      Some(value) if !value.is_null() => Some(Comparison::Eq(value.clone())),
      _ => {
        errors.push(format!("{prefix}.value"), "required for operator ==");
        None
      }
    },
    op @ (Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge) => {
      let range = match op {
        Operator::Lt => RangeOp::Lt,
        Operator::Le => RangeOp::Le,
        Operator::Gt => RangeOp::Gt,
        _ => RangeOp::Ge,
      };
      match cond.value.as_ref().and_then(coerce_float) {
        Some(bound) => Some(Comparison::Range(range, bound)),
        None => {
          errors.push(
            format!("{prefix}.value"),
            format!("a numeric value is required for operator {}", op.as_str()),
          );
          None
        }
      }
    }
    Operator::Conflicts => {
      errors.push(
        format!("{prefix}.operator"),
        "conflicts is only supported on label_condition",
      );
      None
    }
  };
  Some(PropertyTest { name: name?, comparison: comparison? })
}

/// Float coercion shared by compilation and backends: numbers, and strings
/// holding a number.
pub fn coerce_float(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// `value` with every integral float rewritten as an integer, recursively,
/// so `1.0` and `1` store and compare alike.
pub fn canonical(value: &Value) -> Value {
  // Integers above 2^53 are not exactly representable as f64.
  const EXACT: f64 = 9_007_199_254_740_992.0;
  match value {
    Value::Number(n) if n.is_f64() => match n.as_f64() {
      Some(f) if f.fract() == 0.0 && f.abs() <= EXACT => Value::from(f as i64),
      _ => value.clone(),
    },
    Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
    Value::Object(map) => {
      Value::Object(map.iter().map(|(k, v)| (k.clone(), canonical(v))).collect())
    }
    _ => value.clone(),
  }
}
