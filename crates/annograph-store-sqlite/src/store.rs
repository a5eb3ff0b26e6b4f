//! [`SqliteStore`]: the SQLite implementation of [`AnnotationStore`].

use std::{collections::BTreeMap, path::Path};

use annograph_core::{
  Error as CoreError,
  agent::{Agent, AgentFilter, Job, JobFilterBy, NewAgent, NewJob, PersistedJob},
  annotation::{Annotation, BatchItem, BatchItemResult},
  assignment::Assignment,
  label::{Label, LabelEdit, LabelEditOutcome, LabelKey, LabelWrite, LabelsByLevel, NewLabel},
  project::Project,
  query::SearchQuery,
  record::{ColumnMapping, ExportRow, Metadata, Record, RecordMetadataUpdate, map_rows},
  schema::{SchemaDocument, SchemaVersion},
  stats::{Aggregation, LabelProgress},
  store::AnnotationStore,
  verification::{VerifyOutcome, VerifyRequest},
  view::{
    AnnotationViewFilter, ProjectedPoint, RecordAnnotations, RecordVerifications, RecordView,
    RecordViewOptions, Similar, VerificationViewFilter,
  },
};
use rusqlite::{Connection, TransactionBehavior};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  Result, agents, assignments, functions, labels, project, records, schema::SCHEMA, schemas,
  search, stats, verify, views,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An annotation graph for one project, backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  project: Project,
}

impl SqliteStore {
  /// Open (or create) a store at `path` holding the project `project_name`.
  ///
  /// The project is created on first open. A store file already holding a
  /// different project is refused.
  pub async fn open(
    path: impl AsRef<Path>,
    project_name: &str,
    description: &str,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, project_name, description).await
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, "default", "").await
  }

  async fn init(conn: tokio_rusqlite::Connection, name: &str, description: &str) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        functions::register(conn)?;
        Ok(())
      })
      .await?;
    let (name, description) = (name.to_owned(), description.to_owned());
    let project = conn
      .call(move |conn| Ok(in_transaction(conn, |tx| project::open(tx, &name, &description))))
      .await??;
    Ok(Self { conn, project })
  }

  /// Run `f` against the connection outside any explicit transaction.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` in one immediate transaction; any error rolls it back.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(in_transaction(conn, f))).await?
  }
}

fn in_transaction<T>(conn: &mut Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let out = f(&tx)?;
  tx.commit()?;
  Ok(out)
}

// ─── AnnotationStore impl ────────────────────────────────────────────────────

impl AnnotationStore for SqliteStore {
  type Error = crate::Error;

  // ── Project ───────────────────────────────────────────────────────────────

  async fn project(&self) -> Result<Project> { Ok(self.project.clone()) }

  async fn reset_project(&self) -> Result<()> {
    self.write(project::reset).await?;
    tracing::warn!(project = %self.project.name, "project reset");
    Ok(())
  }

  // ── Records ───────────────────────────────────────────────────────────────

  async fn import_records(
    &self,
    dataset: String,
    rows: Vec<Map<String, Value>>,
    mapping: ColumnMapping,
  ) -> Result<u64> {
    if dataset.trim().is_empty() {
      return Err(CoreError::invalid("dataset", "must not be empty").into());
    }
    let mapped = map_rows(&rows, &mapping)?;
    let written = self
      .write(move |tx| records::import(tx, &dataset, &mapped))
      .await?;
    tracing::info!(written, "imported records");
    Ok(written)
  }

  async fn get_record(&self, uuid: Uuid) -> Result<Record> {
    self.read(move |conn| records::get(conn, uuid)).await
  }

  async fn record_contents(&self, uuids: Vec<Uuid>) -> Result<Vec<Record>> {
    self.read(move |conn| records::contents(conn, &uuids)).await
  }

  async fn set_record_metadata(
    &self,
    name: String,
    updates: Vec<RecordMetadataUpdate>,
  ) -> Result<u64> {
    if name.trim().is_empty() {
      return Err(CoreError::invalid("metadata_name", "must not be empty").into());
    }
    self
      .write(move |tx| records::set_metadata(tx, &name, &updates))
      .await
  }

  async fn export(&self) -> Result<Vec<ExportRow>> { self.read(records::export).await }

  // ── Labels & annotations ──────────────────────────────────────────────────

  async fn upsert_label(&self, label: NewLabel) -> Result<Uuid> {
    label.validate()?;
    let (uuid, conflicts) = self
      .write(move |tx| labels::upsert_with_metadata(tx, &label))
      .await?;
    if conflicts.is_empty() {
      Ok(uuid)
    } else {
      tracing::warn!(label = %uuid, ?conflicts, "label metadata rejected");
      Err(CoreError::MetadataConflict { label_uuid: uuid, names: conflicts }.into())
    }
  }

  async fn add_label_metadata(&self, label_uuid: Uuid, metadata: Vec<Metadata>) -> Result<()> {
    let conflicts = self
      .write(move |tx| {
        labels::ensure(tx, label_uuid)?;
        labels::attach_metadata(tx, label_uuid, &metadata)
      })
      .await?;
    if conflicts.is_empty() {
      Ok(())
    } else {
      Err(CoreError::MetadataConflict { label_uuid, names: conflicts }.into())
    }
  }

  async fn get_label(&self, uuid: Uuid) -> Result<Label> {
    self.read(move |conn| labels::get(conn, uuid)).await
  }

  async fn remove_label(&self, key: LabelKey) -> Result<u64> {
    key.validate()?;
    self.write(move |tx| labels::remove(tx, &key)).await
  }

  async fn merge_annotation_labels(
    &self,
    record_uuid: Uuid,
    annotator: String,
    label_uuids: Vec<Uuid>,
    overwrite: bool,
  ) -> Result<Uuid> {
    self
      .write(move |tx| labels::merge(tx, record_uuid, &annotator, &label_uuids, overwrite))
      .await
  }

  async fn annotate(
    &self,
    record_uuid: Uuid,
    annotator: String,
    labels: LabelsByLevel,
  ) -> Result<Uuid> {
    let new_labels = labels.into_new_labels(record_uuid, &annotator)?;
    let annotation_uuid = self
      .write(move |tx| labels::annotate(tx, record_uuid, &annotator, &new_labels))
      .await?;
    tracing::debug!(record = %record_uuid, annotation = %annotation_uuid, "annotated");
    Ok(annotation_uuid)
  }

  async fn annotate_batch(
    &self,
    annotator: String,
    items: Vec<BatchItem>,
  ) -> Result<Vec<BatchItemResult>> {
    let mut results = Vec::with_capacity(items.len());
    for item in items {
      let record_uuid = item.record_uuid;
      match self.annotate(record_uuid, annotator.clone(), item.labels).await {
        Ok(annotation_uuid) => results.push(BatchItemResult::annotated(record_uuid, annotation_uuid)),
        Err(e) => {
          tracing::warn!(record = %record_uuid, error = %e, "batch item failed");
          results.push(BatchItemResult::failed(record_uuid, &e));
        }
      }
    }
    Ok(results)
  }

  async fn apply_label(
    &self,
    record_uuid: Uuid,
    annotator: String,
    edit: LabelEdit,
  ) -> Result<LabelEditOutcome> {
    match edit.into_write(record_uuid, &annotator)? {
      LabelWrite::Set(label) => {
        self
          .write(move |tx| {
            let (label_uuid, conflicts) = labels::upsert_with_metadata(tx, &label)?;
            if !conflicts.is_empty() {
              return Err(CoreError::MetadataConflict { label_uuid, names: conflicts }.into());
            }
            let annotation_uuid = labels::merge(tx, record_uuid, &annotator, &[label_uuid], false)?;
            Ok(LabelEditOutcome::Set { label_uuid, annotation_uuid })
          })
          .await
      }
      LabelWrite::Remove(key) => {
        let count = self.write(move |tx| labels::remove(tx, &key)).await?;
        Ok(LabelEditOutcome::Removed { count })
      }
    }
  }

  async fn get_annotation(&self, record_uuid: Uuid, annotator: String) -> Result<Annotation> {
    self
      .read(move |conn| labels::get_annotation(conn, record_uuid, &annotator))
      .await
  }

  // ── Verification ──────────────────────────────────────────────────────────

  async fn verify(&self, request: VerifyRequest) -> Result<VerifyOutcome> {
    request.submitted_value()?;
    self.write(move |tx| verify::verify(tx, &request)).await
  }

  // ── Search ────────────────────────────────────────────────────────────────

  async fn search(&self, query: &SearchQuery) -> Result<Vec<Uuid>> {
    let predicate = query.compile()?;
    tracing::debug!(clauses = predicate.clauses.len(), "search");
    self.read(move |conn| search::run(conn, &predicate)).await
  }

  // ── Schema registry ───────────────────────────────────────────────────────

  async fn get_schemas(&self, active: Option<bool>) -> Result<Vec<SchemaVersion>> {
    self.read(move |conn| schemas::list(conn, active)).await
  }

  async fn set_schema(&self, document: SchemaDocument) -> Result<SchemaVersion> {
    let project_uuid = self.project.uuid;
    self
      .write(move |tx| schemas::set(tx, project_uuid, document))
      .await
  }

  // ── Statistics ────────────────────────────────────────────────────────────

  async fn record_count(&self) -> Result<u64> { self.read(stats::record_count).await }

  async fn label_progress(&self) -> Result<LabelProgress> { self.read(stats::label_progress).await }

  async fn label_distributions(
    &self,
    label_name: String,
    annotators: Vec<String>,
    aggregation: Aggregation,
  ) -> Result<BTreeMap<String, u64>> {
    self
      .read(move |conn| stats::label_distributions(conn, &label_name, &annotators, aggregation))
      .await
  }

  async fn annotator_contributions(&self, label_name: Option<String>) -> Result<BTreeMap<String, u64>> {
    self
      .read(move |conn| stats::annotator_contributions(conn, label_name.as_deref()))
      .await
  }

  async fn annotator_agreements(&self, label_name: String) -> Result<BTreeMap<String, f64>> {
    self
      .read(move |conn| stats::annotator_agreements(conn, &label_name))
      .await
  }

  async fn embedding_projection(
    &self,
    label_name: String,
    embedding_name: String,
  ) -> Result<Vec<ProjectedPoint>> {
    self
      .read(move |conn| stats::embedding_projection(conn, &label_name, &embedding_name))
      .await
  }

  async fn suggest_similar(
    &self,
    uuids: Vec<Uuid>,
    meta_name: String,
    limit: usize,
  ) -> Result<Vec<Similar>> {
    self
      .read(move |conn| stats::suggest_similar(conn, &uuids, &meta_name, limit))
      .await
  }

  // ── Assignments ───────────────────────────────────────────────────────────

  async fn set_assignment(
    &self,
    record_uuids: Vec<Uuid>,
    annotator: String,
    assigned_by: String,
  ) -> Result<Assignment> {
    let project_uuid = self.project.uuid;
    self
      .write(move |tx| assignments::set(tx, project_uuid, record_uuids, &annotator, &assigned_by))
      .await
  }

  async fn get_assignments(&self, annotator: String, latest_only: bool) -> Result<Vec<Assignment>> {
    self
      .read(move |conn| assignments::get(conn, &annotator, latest_only))
      .await
  }

  // ── Views ─────────────────────────────────────────────────────────────────

  async fn record_view(&self, uuids: Vec<Uuid>, options: RecordViewOptions) -> Result<Vec<RecordView>> {
    self
      .read(move |conn| views::record_view(conn, &uuids, &options))
      .await
  }

  async fn annotation_view(
    &self,
    uuids: Vec<Uuid>,
    filter: AnnotationViewFilter,
  ) -> Result<Vec<RecordAnnotations>> {
    self
      .read(move |conn| views::annotation_view(conn, &uuids, &filter))
      .await
  }

  async fn verification_view(
    &self,
    uuids: Vec<Uuid>,
    filter: VerificationViewFilter,
  ) -> Result<Vec<RecordVerifications>> {
    self
      .read(move |conn| views::verification_view(conn, &uuids, &filter))
      .await
  }

  // ── Agents & jobs ─────────────────────────────────────────────────────────

  async fn register_agent(&self, agent: NewAgent) -> Result<Uuid> {
    let project_uuid = self.project.uuid;
    self
      .write(move |tx| agents::register(tx, project_uuid, &agent))
      .await
  }

  async fn list_agents(&self, filter: AgentFilter, show_job_list: bool) -> Result<Vec<Agent>> {
    self
      .read(move |conn| agents::list(conn, &filter, show_job_list))
      .await
  }

  async fn persist_job(&self, job: NewJob) -> Result<PersistedJob> {
    self.write(move |tx| agents::persist_job(tx, &job)).await
  }

  async fn list_jobs(
    &self,
    filter_by: Option<JobFilterBy>,
    values: Vec<String>,
    show_agent_details: bool,
  ) -> Result<Vec<Job>> {
    self
      .read(move |conn| agents::list_jobs(conn, filter_by, &values, show_agent_details))
      .await
  }
}
