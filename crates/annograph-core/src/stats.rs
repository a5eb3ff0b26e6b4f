//! Aggregation and agreement statistics over label values.
//!
//! Everything here is pure; the store gathers rows and hands them over.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  fmt,
  str::FromStr,
};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result, error::FieldErrors};

/// Reported instead of a winner when the two most frequent values tie.
pub const TIED: &str = "tied_annotations";

/// Stands in for a judgment an annotator did not make on a record.
pub const ABSENT: &str = "NULL";

const POWER_ITERATIONS: usize = 500;
const CONVERGENCE: f64 = 1e-12;

// ─── Majority vote ───────────────────────────────────────────────────────────

/// The grouping key for a label value: string arrays are joined with `,`,
/// anything else is its compact JSON text.
pub fn value_key(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Array(items) if items.iter().all(Value::is_string) => items
      .iter()
      .filter_map(Value::as_str)
      .collect::<Vec<_>>()
      .join(","),
    other => other.to_string(),
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vote {
  Winner(String),
  Tied,
}

impl Vote {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Winner(key) => key,
      Self::Tied => TIED,
    }
  }
}

impl fmt::Display for Vote {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl Serialize for Vote {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

/// Group values by [`value_key`] and pick the most frequent. When the top two
/// groups have equal counts the result is [`Vote::Tied`]. `None` for no
/// values.
pub fn majority_vote<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<Vote> {
  let mut counts: HashMap<String, usize> = HashMap::new();
  for value in values {
    *counts.entry(value_key(value)).or_default() += 1;
  }
  let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
  // Count descending; the key order only makes the winner deterministic.
  ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
  let mut iter = ranked.into_iter();
  let (first, first_count) = iter.next()?;
  match iter.next() {
    Some((_, second_count)) if second_count == first_count => Some(Vote::Tied),
    _ => Some(Vote::Winner(first)),
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
  #[default]
  MajorityVote,
}

impl FromStr for Aggregation {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "majority_vote" => Ok(Self::MajorityVote),
      other => Err(Error::Unsupported(format!(
        "aggregation {other:?}; supported functions are: majority_vote"
      ))),
    }
  }
}

/// Count of records per aggregated value.
pub fn distribution<I>(per_record: I, aggregation: Aggregation) -> BTreeMap<String, u64>
where
  I: IntoIterator<Item = Vec<Value>>,
{
  let mut counts = BTreeMap::new();
  for values in per_record {
    let vote = match aggregation {
      Aggregation::MajorityVote => majority_vote(&values),
    };
    if let Some(vote) = vote {
      *counts.entry(vote.as_str().to_owned()).or_default() += 1;
    }
  }
  counts
}

// ─── Agreement ───────────────────────────────────────────────────────────────

/// Cohen's kappa between two equally long judgment sequences, rounded to
/// four decimals. Perfect expected agreement yields 1.0 when observed
/// agreement is also perfect and 0.0 otherwise.
pub fn cohen_kappa(a: &[String], b: &[String]) -> f64 {
  let n = a.len().min(b.len());
  if n == 0 {
    return 0.0;
  }
  let (a, b) = (&a[..n], &b[..n]);
  let observed = a.iter().zip(b).filter(|(x, y)| x == y).count() as f64 / n as f64;

  let categories: BTreeSet<&String> = a.iter().chain(b).collect();
  let expected: f64 = categories
    .into_iter()
    .map(|c| {
      let pa = a.iter().filter(|x| *x == c).count() as f64 / n as f64;
      let pb = b.iter().filter(|x| *x == c).count() as f64 / n as f64;
      pa * pb
    })
    .sum();

  if (1.0 - expected).abs() < f64::EPSILON {
    return if (observed - 1.0).abs() < f64::EPSILON { 1.0 } else { 0.0 };
  }
  round4((observed - expected) / (1.0 - expected))
}

fn round4(x: f64) -> f64 { (x * 10_000.0).round() / 10_000.0 }

/// Pairwise kappa for every ordered pair of annotators (self-pairs
/// included), keyed `"a,b"`. Input rows are `(record, annotator, value)`;
/// an annotator's several values on one record are joined in key order.
pub fn pairwise_agreements(rows: &[(Uuid, String, Value)]) -> BTreeMap<String, f64> {
  let mut table: BTreeMap<Uuid, BTreeMap<&str, Vec<String>>> = BTreeMap::new();
  let mut annotators = BTreeSet::new();
  for (record, annotator, value) in rows {
    annotators.insert(annotator.as_str());
    table
      .entry(*record)
      .or_default()
      .entry(annotator.as_str())
      .or_default()
      .push(value_key(value));
  }

  let column = |annotator: &str| -> Vec<String> {
    table
      .values()
      .map(|judgments| match judgments.get(annotator) {
        Some(keys) => {
          let mut keys = keys.clone();
          keys.sort();
          keys.join("|")
        }
        None => ABSENT.to_owned(),
      })
      .collect()
  };
  let columns: BTreeMap<&str, Vec<String>> =
    annotators.iter().map(|a| (*a, column(a))).collect();

  let mut out = BTreeMap::new();
  for (a, col_a) in &columns {
    for (b, col_b) in &columns {
      out.insert(format!("{a},{b}"), cohen_kappa(col_a, col_b));
    }
  }
  out
}

// ─── Progress ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelProgress {
  pub total:     u64,
  /// Records with at least one label from any annotator.
  pub annotated: u64,
}

// ─── Vectors ─────────────────────────────────────────────────────────────────

/// Read a JSON array of numbers as a vector.
pub fn parse_vector(value: &Value) -> Option<Vec<f64>> {
  value.as_array()?.iter().map(Value::as_f64).collect()
}

pub fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
  if a.len() != b.len() || a.is_empty() {
    return None;
  }
  let norm_a = dot(a, a).sqrt();
  let norm_b = dot(b, b).sqrt();
  if norm_a == 0.0 || norm_b == 0.0 {
    return None;
  }
  Some(dot(a, b) / (norm_a * norm_b))
}

fn dot(a: &[f64], b: &[f64]) -> f64 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

/// Project vectors onto their first two principal components.
///
/// Components come from power iteration on the centred data, the second
/// orthogonalised against the first. Each component's sign is fixed so its
/// largest-magnitude coordinate is positive, so identical input always
/// yields identical output.
pub fn project_2d(vectors: &[Vec<f64>]) -> Result<Vec<[f64; 2]>> {
  let Some(dim) = vectors.first().map(Vec::len) else {
    return Ok(Vec::new());
  };
  let mut errors = FieldErrors::new();
  for (i, v) in vectors.iter().enumerate() {
    if v.is_empty() || v.len() != dim {
      errors.push(
        format!("embeddings[{i}]"),
        format!("expected {dim} dimensions, found {}", v.len()),
      );
    } else if v.iter().any(|x| !x.is_finite()) {
      errors.push(format!("embeddings[{i}]"), "contains a non-finite value");
    }
  }
  errors.into_result()?;

  let n = vectors.len() as f64;
  let mut mean = vec![0.0; dim];
  for v in vectors {
    for (m, x) in mean.iter_mut().zip(v) {
      *m += x / n;
    }
  }
  let centred: Vec<Vec<f64>> = vectors
    .iter()
    .map(|v| v.iter().zip(&mean).map(|(x, m)| x - m).collect())
    .collect();

  let first = principal_component(&centred, dim, None);
  let second = principal_component(&centred, dim, first.as_deref());

  let coordinate = |row: &[f64], axis: &Option<Vec<f64>>| match axis {
    Some(axis) => dot(row, axis),
    None => 0.0,
  };
  Ok(
    centred
      .iter()
      .map(|row| [coordinate(row, &first), coordinate(row, &second)])
      .collect(),
  )
}

/// The dominant eigenvector of `XᵀX`, optionally restricted to the
/// complement of `orthogonal_to`. `None` when the data has no variance left
/// in that subspace.
fn principal_component(
  rows: &[Vec<f64>],
  dim: usize,
  orthogonal_to: Option<&[f64]>,
) -> Option<Vec<f64>> {
  let deflate = |v: &mut Vec<f64>| {
    if let Some(u) = orthogonal_to {
      let p = dot(v, u);
      v.iter_mut().zip(u).for_each(|(x, y)| *x -= p * y);
    }
  };
  let normalise = |v: &mut Vec<f64>| -> bool {
    let norm = dot(v, v).sqrt();
    if norm < CONVERGENCE {
      return false;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    true
  };

  let mut v: Vec<f64> = (0..dim).map(|i| 1.0 / (i as f64 + 1.0)).collect();
  deflate(&mut v);
  if !normalise(&mut v) {
    return None;
  }

  for _ in 0..POWER_ITERATIONS {
    let projections: Vec<f64> = rows.iter().map(|row| dot(row, &v)).collect();
    let mut next = vec![0.0; dim];
    for (row, p) in rows.iter().zip(&projections) {
      next.iter_mut().zip(row).for_each(|(x, r)| *x += p * r);
    }
    deflate(&mut next);
    if !normalise(&mut next) {
      return None;
    }
    let delta: f64 = next.iter().zip(&v).map(|(a, b)| (a - b).abs()).sum();
    v = next;
    if delta < CONVERGENCE {
      break;
    }
  }

  let pivot = v.iter().copied().fold(0.0_f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
  if pivot < 0.0 {
    v.iter_mut().for_each(|x| *x = -*x);
  }
  Some(v)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn value_keys() {
    assert_eq!(value_key(&json!(["a", "b"])), "a,b");
    assert_eq!(value_key(&json!("x")), "x");
    assert_eq!(value_key(&json!(true)), "true");
    assert_eq!(value_key(&json!([1, 2])), "[1,2]");
  }

  #[test]
  fn majority_vote_ties_are_reported() {
    let values = [json!(["a"]), json!(["a"]), json!(["b"]), json!(["b"])];
    assert_eq!(majority_vote(&values), Some(Vote::Tied));
  }

  #[test]
  fn majority_vote_winner() {
    let values = [json!(["a"]), json!(["b"]), json!(["a"])];
    assert_eq!(majority_vote(&values), Some(Vote::Winner("a".into())));
    assert_eq!(majority_vote(&[json!(["solo"])]), Some(Vote::Winner("solo".into())));
    assert_eq!(majority_vote(&Vec::<Value>::new()), None);
  }

  #[test]
  fn unsupported_aggregation() {
    let err = "mean".parse::<Aggregation>().unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
  }

  #[test]
  fn distribution_counts_votes() {
    let d = distribution(
      vec![vec![json!(["x"])], vec![json!(["x"]), json!(["y"])], vec![json!(["y"])]],
      Aggregation::MajorityVote,
    );
    assert_eq!(d.get("x"), Some(&1));
    assert_eq!(d.get("y"), Some(&1));
    assert_eq!(d.get(TIED), Some(&1));
  }

  fn strings(xs: &[&str]) -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() }

  #[test]
  fn kappa_reference_values() {
    let a = strings(&["y", "y", "n", "n", "y"]);
    let b = strings(&["y", "n", "n", "n", "y"]);
    // observed 0.8, expected 0.6*0.4 + 0.4*0.6 = 0.48
    assert_eq!(cohen_kappa(&a, &b), round4((0.8 - 0.48) / 0.52));
    assert_eq!(cohen_kappa(&a, &a), 1.0);
  }

  #[test]
  fn kappa_with_a_single_category() {
    let a = strings(&["y", "y"]);
    assert_eq!(cohen_kappa(&a, &a), 1.0);
  }

  #[test]
  fn agreements_fill_absent_judgments() {
    let r1 = Uuid::new_v4();
    let r2 = Uuid::new_v4();
    let rows = vec![
      (r1, "u1".to_string(), json!(["true"])),
      (r1, "u2".to_string(), json!(["true"])),
      (r2, "u1".to_string(), json!(["false"])),
    ];
    let agreements = pairwise_agreements(&rows);
    assert_eq!(agreements.len(), 4);
    assert_eq!(agreements["u1,u1"], 1.0);
    assert_eq!(agreements["u2,u2"], 1.0);
    // u2 is ABSENT on r2, which disagrees with u1's "false".
    assert!(agreements["u1,u2"] < 1.0);
    assert_eq!(agreements["u1,u2"], agreements["u2,u1"]);
  }

  #[test]
  fn cosine_similarity() {
    assert_eq!(cosine(&[1.0, 0.0], &[2.0, 0.0]), Some(1.0));
    assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
    assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), None);
    assert_eq!(cosine(&[1.0], &[1.0, 1.0]), None);
  }

  #[test]
  fn projection_follows_the_dominant_axis() {
    let vectors = vec![
      vec![0.0, 0.0, 1.0],
      vec![10.0, 0.1, 1.0],
      vec![20.0, -0.1, 1.0],
      vec![30.0, 0.0, 1.0],
    ];
    let points = project_2d(&vectors).unwrap();
    assert_eq!(points.len(), 4);
    // First component orders the points along x.
    assert!(points.windows(2).all(|w| w[0][0] < w[1][0]));
    assert!((points[3][0] - points[0][0] - 30.0).abs() < 1e-3);
    assert!(points.iter().all(|p| p[1].abs() < 1.0));
    assert_eq!(project_2d(&vectors).unwrap(), points);
  }

  #[test]
  fn projection_rejects_ragged_input() {
    let err = project_2d(&[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
    let Error::Validation(fields) = err else { panic!("expected validation") };
    assert!(fields.get("embeddings[1]").is_some());
  }

  #[test]
  fn projection_of_identical_points_is_the_origin() {
    let points = project_2d(&[vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap();
    assert_eq!(points, vec![[0.0, 0.0], [0.0, 0.0]]);
  }
}
