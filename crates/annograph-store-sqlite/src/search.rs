//! Compile a [`Predicate`] to SQL.
//!
//! Every user-supplied value, including validated names, is bound as a
//! parameter. Table aliases are generated here and never derived from
//! input.

use annograph_core::query::{
  AnnotationClause, Clause, Comparison, Predicate, PropertyTest, RecordClause,
};
use rusqlite::{Connection, types::Value as SqlValue};
use uuid::Uuid;

use crate::{
  Result,
  encode::{decode_uuid, encode_json, encode_str_list, encode_uuid_list},
};

/// A SQL fragment under construction with its positional parameters.
#[derive(Default)]
struct Compiler {
  params:  Vec<SqlValue>,
  aliases: usize,
}

impl Compiler {
  fn bind(&mut self, value: impl Into<SqlValue>) -> String {
    self.params.push(value.into());
    format!("?{}", self.params.len())
  }

  fn alias(&mut self, prefix: &str) -> String {
    self.aliases += 1;
    format!("{prefix}{}", self.aliases)
  }

  /// `<column>` compared per `comparison`; the caller has already pinned
  /// the property name.
  fn comparison(&mut self, column: &str, comparison: &Comparison) -> String {
    match comparison {
      Comparison::Eq(value) => format!("{column} = {}", self.bind(encode_json(value))),
      Comparison::Range(op, bound) => {
        format!("json_float({column}) {} {}", op.symbol(), self.bind(*bound))
      }
      Comparison::Exists => "1".to_owned(),
    }
  }

  fn record_clause(&mut self, clause: &RecordClause) -> String {
    match clause {
      RecordClause::UuidIn(uuids) => {
        format!("r.uuid IN (SELECT value FROM json_each({}))", self.bind(encode_uuid_list(uuids)))
      }
      RecordClause::ContentContains(keyword) => {
        format!("instr(r.content, {}) > 0", self.bind(keyword.clone()))
      }
      RecordClause::ContentMatches(pattern) => {
        format!("r.content REGEXP {}", self.bind(pattern.clone()))
      }
      RecordClause::Metadata(test) => {
        let m = self.alias("m");
        let cond = self.property(&m, "name", "value_json", test);
        format!("EXISTS (SELECT 1 FROM record_metadata {m} WHERE {m}.record_uuid = r.uuid AND {cond})")
      }
    }
  }

  fn property(&mut self, alias: &str, name_col: &str, value_col: &str, test: &PropertyTest) -> String {
    let name = self.bind(test.name.as_str().to_owned());
    let cmp = self.comparison(&format!("{alias}.{value_col}"), &test.comparison);
    format!("{alias}.{name_col} = {name} AND {cmp}")
  }

  /// A condition on the annotation aliased `a`.
  fn annotation_clause(&mut self, a: &str, clause: &AnnotationClause) -> String {
    match clause {
      AnnotationClause::AnnotatorIn(annotators) => format!(
        "{a}.annotator IN (SELECT value FROM json_each({}))",
        self.bind(encode_str_list(annotators))
      ),
      AnnotationClause::Label(test) => {
        let (al, l) = (self.alias("al"), self.alias("l"));
        let cond = self.property(&l, "name", "value_json", test);
        format!(
          "EXISTS (SELECT 1 FROM annotation_labels {al} JOIN labels {l} ON {l}.uuid = {al}.label_uuid \
           WHERE {al}.annotation_uuid = {a}.uuid AND {cond})"
        )
      }
      AnnotationClause::LabelMetadata { label_name, test } => {
        let (al, l, lm) = (self.alias("al"), self.alias("l"), self.alias("lm"));
        let label_name = self.bind(label_name.as_str().to_owned());
        let cond = self.property(&lm, "name", "value_json", test);
        format!(
          "EXISTS (SELECT 1 FROM annotation_labels {al} JOIN labels {l} ON {l}.uuid = {al}.label_uuid \
           JOIN label_metadata {lm} ON {lm}.label_uuid = {l}.uuid \
           WHERE {al}.annotation_uuid = {a}.uuid AND {l}.name = {label_name} AND {cond})"
        )
      }
      AnnotationClause::Verified { label_name, verified } => {
        let v = self.alias("v");
        let label_name = self.bind(label_name.as_str().to_owned());
        let negate = if *verified { "" } else { "NOT " };
        format!(
          "{negate}EXISTS (SELECT 1 FROM verifications {v} \
           WHERE {v}.annotation_uuid = {a}.uuid AND {v}.label_name = {label_name})"
        )
      }
    }
  }

  fn scope(&mut self, a: &str, scope: &[AnnotationClause]) -> String {
    scope
      .iter()
      .map(|c| format!(" AND {}", self.annotation_clause(a, c)))
      .collect()
  }

  fn clause(&mut self, clause: &Clause) -> String {
    match clause {
      Clause::Record(c) => self.record_clause(c),
      Clause::AnyAnnotation(scope) => {
        let a = self.alias("a");
        let conds = self.scope(&a, scope);
        format!("EXISTS (SELECT 1 FROM annotations {a} WHERE {a}.record_uuid = r.uuid{conds})")
      }
      Clause::Conflict { label_name, scope } => {
        let (a, al, l) = (self.alias("a"), self.alias("al"), self.alias("l"));
        let label_name = self.bind(label_name.as_str().to_owned());
        let conds = self.scope(&a, scope);
        format!(
          "(SELECT COUNT(DISTINCT {l}.value_json) FROM annotations {a} \
           JOIN annotation_labels {al} ON {al}.annotation_uuid = {a}.uuid \
           JOIN labels {l} ON {l}.uuid = {al}.label_uuid \
           WHERE {a}.record_uuid = r.uuid AND {l}.name = {label_name}{conds}) >= 2"
        )
      }
    }
  }

  fn compile(mut self, predicate: &Predicate) -> (String, Vec<SqlValue>) {
    let conds: Vec<String> = predicate.clauses.iter().map(|c| self.clause(c)).collect();
    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join("\n  AND "))
    };
    let limit = self.bind(predicate.limit as i64);
    let offset = self.bind(predicate.skip as i64);
    let sql = format!(
      "SELECT r.uuid FROM records r\n{where_clause}\n\
       ORDER BY r.dataset, r.record_id, r.uuid\nLIMIT {limit} OFFSET {offset}"
    );
    (sql, self.params)
  }
}

/// The SQL text and parameters for `predicate`.
pub fn to_sql(predicate: &Predicate) -> (String, Vec<SqlValue>) { Compiler::default().compile(predicate) }

pub fn run(conn: &Connection, predicate: &Predicate) -> Result<Vec<Uuid>> {
  let (sql, params) = to_sql(predicate);
  tracing::trace!(%sql, "search");
  let mut stmt = conn.prepare(&sql)?;
  let uuids = stmt
    .query_map(rusqlite::params_from_iter(params), |r| r.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  uuids.iter().map(|s| decode_uuid(s)).collect()
}
