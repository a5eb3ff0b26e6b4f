//! The `AnnotationStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `annograph-store-sqlite`). Callers such as `annograph-cli` depend on this
//! abstraction, not on any concrete backend.

use std::{collections::BTreeMap, future::Future};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  agent::{Agent, AgentFilter, Job, JobFilterBy, NewAgent, NewJob, PersistedJob},
  annotation::{Annotation, BatchItem, BatchItemResult},
  assignment::Assignment,
  error::Classify,
  label::{Label, LabelEdit, LabelEditOutcome, LabelKey, LabelsByLevel, NewLabel},
  project::Project,
  query::SearchQuery,
  record::{ColumnMapping, ExportRow, Metadata, Record, RecordMetadataUpdate},
  schema::{SchemaDocument, SchemaVersion},
  stats::{Aggregation, LabelProgress},
  verification::{VerifyOutcome, VerifyRequest},
  view::{
    AnnotationViewFilter, ProjectedPoint, RecordAnnotations, RecordVerifications, RecordView,
    RecordViewOptions, Similar, VerificationViewFilter,
  },
};

/// Abstraction over an annotation graph backend scoped to one project.
///
/// Every method runs as one bounded transaction (or a small fixed number of
/// them) and is all-or-nothing, except [`annotate_batch`], whose items
/// succeed or fail independently. Validation happens before any write.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
///
/// [`annotate_batch`]: AnnotationStore::annotate_batch
pub trait AnnotationStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Project ───────────────────────────────────────────────────────────

  fn project(&self) -> impl Future<Output = Result<Project, Self::Error>> + Send + '_;

  /// Delete every node of the project except the project itself.
  fn reset_project(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Records ───────────────────────────────────────────────────────────

  /// Map `rows` through `mapping` and merge them on `(record_id, dataset)`.
  /// Existing records keep their uuid and take the new content. Returns the
  /// number of rows written.
  fn import_records(
    &self,
    dataset: String,
    rows: Vec<Map<String, Value>>,
    mapping: ColumnMapping,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn get_record(&self, uuid: Uuid) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Records among `uuids`, ordered by `record_id`. Unknown uuids are
  /// skipped.
  fn record_contents(
    &self,
    uuids: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  /// Upsert record metadata `name` on each listed record. Unknown uuids are
  /// skipped; returns how many were written.
  fn set_record_metadata(
    &self,
    name: String,
    updates: Vec<RecordMetadataUpdate>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn export(&self) -> impl Future<Output = Result<Vec<ExportRow>, Self::Error>> + Send + '_;

  // ── Labels & annotations ──────────────────────────────────────────────

  /// Create or update the label at `label.key` and return its uuid.
  ///
  /// Metadata is attached after the label write. If any requested name is
  /// already present the whole metadata batch is rejected with a conflict,
  /// but the label write stands.
  fn upsert_label(
    &self,
    label: NewLabel,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + '_;

  /// Attach every entry of `metadata` to a label, or none of them.
  fn add_label_metadata(
    &self,
    label_uuid: Uuid,
    metadata: Vec<Metadata>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_label(&self, uuid: Uuid) -> impl Future<Output = Result<Label, Self::Error>> + Send + '_;

  /// Delete the label with exactly this key. Returns 0 or 1.
  fn remove_label(&self, key: LabelKey) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Link labels to the `(record, annotator)` annotation, creating it if
  /// absent. With `overwrite`, labels not in `label_uuids` are detached and
  /// deleted.
  fn merge_annotation_labels(
    &self,
    record_uuid: Uuid,
    annotator: String,
    label_uuids: Vec<Uuid>,
    overwrite: bool,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + '_;

  /// Replace the annotator's labels on a record with `labels`. An empty set
  /// clears the annotation.
  fn annotate(
    &self,
    record_uuid: Uuid,
    annotator: String,
    labels: LabelsByLevel,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + '_;

  /// [`annotate`](Self::annotate) each item independently.
  fn annotate_batch(
    &self,
    annotator: String,
    items: Vec<BatchItem>,
  ) -> impl Future<Output = Result<Vec<BatchItemResult>, Self::Error>> + Send + '_;

  /// Set or remove a single label without touching the annotator's others.
  fn apply_label(
    &self,
    record_uuid: Uuid,
    annotator: String,
    edit: LabelEdit,
  ) -> impl Future<Output = Result<LabelEditOutcome, Self::Error>> + Send + '_;

  fn get_annotation(
    &self,
    record_uuid: Uuid,
    annotator: String,
  ) -> impl Future<Output = Result<Annotation, Self::Error>> + Send + '_;

  // ── Verification ──────────────────────────────────────────────────────

  /// Confirm or correct the annotator's label with the verifier's value.
  fn verify(
    &self,
    request: VerifyRequest,
  ) -> impl Future<Output = Result<VerifyOutcome, Self::Error>> + Send + '_;

  // ── Search ────────────────────────────────────────────────────────────

  /// Uuids of the records matching `query`, ordered by
  /// `(dataset, record_id, uuid)` and paged by `skip`/`limit`.
  fn search<'a>(
    &'a self,
    query: &'a SearchQuery,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + 'a;

  // ── Schema registry ───────────────────────────────────────────────────

  /// Schema versions, newest first. `Some(true)` returns only the active
  /// one, `Some(false)` only retired ones.
  fn get_schemas(
    &self,
    active: Option<bool>,
  ) -> impl Future<Output = Result<Vec<SchemaVersion>, Self::Error>> + Send + '_;

  /// Validate `document` and make it the active version. Submitting the
  /// active document again is a no-op returning the current version.
  fn set_schema(
    &self,
    document: SchemaDocument,
  ) -> impl Future<Output = Result<SchemaVersion, Self::Error>> + Send + '_;

  // ── Statistics ────────────────────────────────────────────────────────

  fn record_count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn label_progress(&self) -> impl Future<Output = Result<LabelProgress, Self::Error>> + Send + '_;

  /// Aggregated value → number of records. A non-empty `annotators`
  /// restricts which annotations take part.
  fn label_distributions(
    &self,
    label_name: String,
    annotators: Vec<String>,
    aggregation: Aggregation,
  ) -> impl Future<Output = Result<BTreeMap<String, u64>, Self::Error>> + Send + '_;

  /// Annotator → number of linked labels, optionally of one name only.
  fn annotator_contributions(
    &self,
    label_name: Option<String>,
  ) -> impl Future<Output = Result<BTreeMap<String, u64>, Self::Error>> + Send + '_;

  /// `"a,b"` → Cohen's kappa for every ordered annotator pair.
  fn annotator_agreements(
    &self,
    label_name: String,
  ) -> impl Future<Output = Result<BTreeMap<String, f64>, Self::Error>> + Send + '_;

  /// Project the `embedding_name` record metadata of every record labelled
  /// `label_name` to two dimensions, paired with its majority vote.
  fn embedding_projection(
    &self,
    label_name: String,
    embedding_name: String,
  ) -> impl Future<Output = Result<Vec<ProjectedPoint>, Self::Error>> + Send + '_;

  fn suggest_similar(
    &self,
    uuids: Vec<Uuid>,
    meta_name: String,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Similar>, Self::Error>> + Send + '_;

  // ── Assignments ───────────────────────────────────────────────────────

  fn set_assignment(
    &self,
    record_uuids: Vec<Uuid>,
    annotator: String,
    assigned_by: String,
  ) -> impl Future<Output = Result<Assignment, Self::Error>> + Send + '_;

  /// Assignments of `annotator`, newest first.
  fn get_assignments(
    &self,
    annotator: String,
    latest_only: bool,
  ) -> impl Future<Output = Result<Vec<Assignment>, Self::Error>> + Send + '_;

  // ── Views ─────────────────────────────────────────────────────────────

  fn record_view(
    &self,
    uuids: Vec<Uuid>,
    options: RecordViewOptions,
  ) -> impl Future<Output = Result<Vec<RecordView>, Self::Error>> + Send + '_;

  fn annotation_view(
    &self,
    uuids: Vec<Uuid>,
    filter: AnnotationViewFilter,
  ) -> impl Future<Output = Result<Vec<RecordAnnotations>, Self::Error>> + Send + '_;

  fn verification_view(
    &self,
    uuids: Vec<Uuid>,
    filter: VerificationViewFilter,
  ) -> impl Future<Output = Result<Vec<RecordVerifications>, Self::Error>> + Send + '_;

  // ── Agents & jobs ─────────────────────────────────────────────────────

  fn register_agent(
    &self,
    agent: NewAgent,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + '_;

  fn list_agents(
    &self,
    filter: AgentFilter,
    show_job_list: bool,
  ) -> impl Future<Output = Result<Vec<Agent>, Self::Error>> + Send + '_;

  /// Record a job and link its annotations. Persisting an existing job only
  /// adds links.
  fn persist_job(
    &self,
    job: NewJob,
  ) -> impl Future<Output = Result<PersistedJob, Self::Error>> + Send + '_;

  fn list_jobs(
    &self,
    filter_by: Option<JobFilterBy>,
    values: Vec<String>,
    show_agent_details: bool,
  ) -> impl Future<Output = Result<Vec<Job>, Self::Error>> + Send + '_;
}
