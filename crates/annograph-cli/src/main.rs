//! `annograph`: command-line access to an annotation graph.
//!
//! Reads `annograph.toml` (or the path given with `--config`), opens the
//! SQLite store for the configured project, runs one operation as the
//! configured identity, and prints the result as JSON.

mod config;

use std::{
  fs,
  path::{Path, PathBuf},
};

use annograph_core::{
  agent::{AgentFilter, JobFilterBy, NewAgent, NewJob},
  annotation::BatchItem,
  label::{LabelEdit, LabelLevel, LabelsByLevel},
  project::{Identity, Role},
  query::SearchQuery,
  record::ColumnMapping,
  schema::SchemaDocument,
  stats::Aggregation,
  store::AnnotationStore,
  verification::{StatusFilter, VerifyLabel, VerifyRequest},
  view::{AnnotationViewFilter, RecordViewOptions, VerificationViewFilter},
};
use annograph_store_sqlite::SqliteStore;
use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(author, version, about = "Annotation graph store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "annograph.toml")]
  config: PathBuf,

  /// Act as this user instead of the configured one.
  #[arg(long, env = "ANNOGRAPH_USER")]
  user: Option<String>,

  /// Act with this role: administrator, contributor, or job.
  #[arg(long)]
  role: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Show the project this store holds.
  Project,
  /// Delete every record, label, schema, assignment, and agent.
  Reset,
  /// Merge rows from a JSON array file into a dataset.
  Import {
    #[arg(long)]
    dataset:         String,
    /// JSON file holding an array of objects.
    file:            PathBuf,
    #[arg(long, default_value = "id")]
    id_column:       String,
    #[arg(long, default_value = "content")]
    content_column:  String,
    /// Column imported as record metadata of the same name.
    #[arg(long)]
    metadata_column: Option<String>,
  },
  /// Print all linked labels as flat rows.
  Export,
  /// Replace your labels on a record with the `{labels_record, labels_span}`
  /// document in FILE.
  Annotate { record: Uuid, file: PathBuf },
  /// Annotate many records from a JSON array of `{record_uuid, labels}`.
  AnnotateBatch { file: PathBuf },
  /// Set or remove a single label from a JSON edit document.
  Label { record: Uuid, file: PathBuf },
  /// Confirm or correct another annotator's record-level label.
  Verify {
    record:    Uuid,
    #[arg(long)]
    annotator: String,
    #[arg(long)]
    label:     String,
    /// The label value as JSON.
    #[arg(long)]
    value:     String,
  },
  /// Find records. FILE holds a search query document; flags override it.
  Search {
    #[arg(long)]
    query:   Option<PathBuf>,
    #[arg(long)]
    keyword: Option<String>,
    #[arg(long)]
    regex:   Option<String>,
    #[arg(long)]
    limit:   Option<usize>,
    #[arg(long)]
    skip:    Option<usize>,
  },
  #[command(subcommand)]
  Schema(SchemaCommand),
  #[command(subcommand)]
  Stats(StatsCommand),
  #[command(subcommand)]
  View(ViewCommand),
  /// Assign records to an annotator.
  Assign {
    #[arg(long)]
    annotator: String,
    #[arg(required = true)]
    records:   Vec<Uuid>,
  },
  /// List assignments, newest first.
  Assignments {
    /// Defaults to the current user.
    #[arg(long)]
    annotator: Option<String>,
    #[arg(long)]
    latest:    bool,
  },
  #[command(subcommand)]
  Agents(AgentsCommand),
}

#[derive(Subcommand)]
enum SchemaCommand {
  /// List schema versions, newest first.
  Show {
    #[arg(long, conflicts_with = "retired")]
    active:  bool,
    #[arg(long)]
    retired: bool,
  },
  /// Activate the schema document in FILE.
  Set { file: PathBuf },
}

#[derive(Subcommand)]
enum StatsCommand {
  Count,
  Progress,
  Distribution {
    #[arg(long)]
    label:       String,
    #[arg(long = "annotator")]
    annotators:  Vec<String>,
    #[arg(long, default_value = "majority_vote")]
    aggregation: String,
  },
  Contributions {
    #[arg(long)]
    label: Option<String>,
  },
  Agreements {
    #[arg(long)]
    label: String,
  },
  Projection {
    #[arg(long)]
    label:     String,
    #[arg(long)]
    embedding: String,
  },
  Similar {
    #[arg(long)]
    meta:    String,
    #[arg(long, default_value_t = 5)]
    limit:   usize,
    #[arg(required = true)]
    records: Vec<Uuid>,
  },
}

#[derive(Subcommand)]
enum ViewCommand {
  Records {
    #[arg(long)]
    with_id:      bool,
    #[arg(long)]
    with_content: bool,
    #[arg(long = "meta")]
    meta_names:   Vec<String>,
    #[arg(required = true)]
    records:      Vec<Uuid>,
  },
  Annotations {
    #[arg(long = "annotator")]
    annotators:  Vec<String>,
    #[arg(long = "label")]
    label_names: Vec<String>,
    #[arg(long = "label-meta")]
    label_meta:  Vec<String>,
    #[arg(required = true)]
    records:     Vec<Uuid>,
  },
  Verifications {
    #[arg(long)]
    label:     String,
    #[arg(long)]
    annotator: String,
    #[arg(long = "verifier")]
    verifiers: Vec<String>,
    /// CONFIRMS, CORRECTS, or ALL.
    #[arg(long, default_value = "ALL")]
    status:    String,
    #[arg(required = true)]
    records:   Vec<Uuid>,
  },
}

#[derive(Subcommand)]
enum AgentsCommand {
  /// Register the agent described in FILE.
  Register { file: PathBuf },
  List {
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    api:      Option<String>,
    #[arg(long)]
    jobs:     bool,
  },
  /// Record the job described in FILE.
  PersistJob { file: PathBuf },
  Jobs {
    /// agent_uuid, issued_by, or uuid.
    #[arg(long, requires = "values")]
    filter_by: Option<String>,
    #[arg(long = "value")]
    values:    Vec<String>,
    #[arg(long)]
    details:   bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = AppConfig::load(&cli.config, cli.user, cli.role)?;
  let identity = cfg.identity();

  let store_path = cfg.store_path();
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path, &cfg.project_name, &cfg.project_description)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  tracing::debug!(user = %identity.user_id, role = ?identity.role, "opened store");

  run(&store, &identity, cli.command).await
}

async fn run(store: &SqliteStore, identity: &Identity, command: Command) -> anyhow::Result<()> {
  let me = identity.user_id.clone();
  match command {
    Command::Project => print(&store.project().await?),
    Command::Reset => {
      require_admin(identity)?;
      store.reset_project().await?;
      print(&"reset")
    }
    Command::Import { dataset, file, id_column, content_column, metadata_column } => {
      require_admin(identity)?;
      let rows: Vec<Map<String, Value>> = read_json(&file)?;
      let mut mapping = ColumnMapping::new(id_column, content_column);
      if let Some(column) = metadata_column {
        mapping = mapping.with_metadata(column);
      }
      print(&store.import_records(dataset, rows, mapping).await?)
    }
    Command::Export => print(&store.export().await?),
    Command::Annotate { record, file } => {
      let labels: LabelsByLevel = read_json(&file)?;
      print(&store.annotate(record, me, labels).await?)
    }
    Command::AnnotateBatch { file } => {
      let items: Vec<BatchItem> = read_json(&file)?;
      print(&store.annotate_batch(me, items).await?)
    }
    Command::Label { record, file } => {
      let edit: LabelEdit = read_json(&file)?;
      print(&store.apply_label(record, me, edit).await?)
    }
    Command::Verify { record, annotator, label, value } => {
      let label_value: Value =
        serde_json::from_str(&value).context("--value must be JSON")?;
      let request = VerifyRequest {
        record_uuid: record,
        annotator,
        verifier: me,
        label_name: label.clone(),
        label_level: LabelLevel::Record,
        labels: vec![VerifyLabel {
          label_name: label,
          label_level: LabelLevel::Record,
          label_value,
        }],
      };
      print(&store.verify(request).await?)
    }
    Command::Search { query, keyword, regex, limit, skip } => {
      let mut q = match query {
        Some(path) => read_json(&path)?,
        None => SearchQuery::default(),
      };
      q.keyword = keyword.or(q.keyword);
      q.regex = regex.or(q.regex);
      q.limit = limit.unwrap_or(q.limit);
      q.skip = skip.unwrap_or(q.skip);
      print(&store.search(&q).await?)
    }
    Command::Schema(SchemaCommand::Show { active, retired }) => {
      let filter = match (active, retired) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
      };
      print(&store.get_schemas(filter).await?)
    }
    Command::Schema(SchemaCommand::Set { file }) => {
      require_admin(identity)?;
      let document: SchemaDocument = read_json(&file)?;
      print(&store.set_schema(document).await?)
    }
    Command::Stats(stats) => run_stats(store, stats).await,
    Command::View(view) => run_view(store, view).await,
    Command::Assign { annotator, records } => {
      require_admin(identity)?;
      print(&store.set_assignment(records, annotator, me).await?)
    }
    Command::Assignments { annotator, latest } => {
      print(&store.get_assignments(annotator.unwrap_or(me), latest).await?)
    }
    Command::Agents(agents) => run_agents(store, identity, agents).await,
  }
}

async fn run_stats(store: &SqliteStore, command: StatsCommand) -> anyhow::Result<()> {
  match command {
    StatsCommand::Count => print(&store.record_count().await?),
    StatsCommand::Progress => print(&store.label_progress().await?),
    StatsCommand::Distribution { label, annotators, aggregation } => {
      let aggregation: Aggregation = aggregation.parse()?;
      print(&store.label_distributions(label, annotators, aggregation).await?)
    }
    StatsCommand::Contributions { label } => print(&store.annotator_contributions(label).await?),
    StatsCommand::Agreements { label } => print(&store.annotator_agreements(label).await?),
    StatsCommand::Projection { label, embedding } => {
      print(&store.embedding_projection(label, embedding).await?)
    }
    StatsCommand::Similar { meta, limit, records } => {
      print(&store.suggest_similar(records, meta, limit).await?)
    }
  }
}

async fn run_view(store: &SqliteStore, command: ViewCommand) -> anyhow::Result<()> {
  match command {
    ViewCommand::Records { with_id, with_content, meta_names, records } => {
      let options = RecordViewOptions {
        include_id:      with_id,
        include_content: with_content,
        meta_names:      non_empty(meta_names),
      };
      print(&store.record_view(records, options).await?)
    }
    ViewCommand::Annotations { annotators, label_names, label_meta, records } => {
      let filter = AnnotationViewFilter {
        annotators:       non_empty(annotators),
        label_names:      non_empty(label_names),
        label_meta_names: non_empty(label_meta),
      };
      print(&store.annotation_view(records, filter).await?)
    }
    ViewCommand::Verifications { label, annotator, verifiers, status, records } => {
      let status: StatusFilter = serde_json::from_value(Value::String(status.to_uppercase()))
        .context("--status must be one of CONFIRMS, CORRECTS, ALL")?;
      let filter = VerificationViewFilter {
        label_name: label,
        label_level: LabelLevel::Record,
        annotator,
        verifiers: non_empty(verifiers),
        status,
      };
      print(&store.verification_view(records, filter).await?)
    }
  }
}

async fn run_agents(
  store: &SqliteStore,
  identity: &Identity,
  command: AgentsCommand,
) -> anyhow::Result<()> {
  match command {
    AgentsCommand::Register { file } => {
      require_admin(identity)?;
      let agent: NewAgent = read_json(&file)?;
      print(&store.register_agent(agent).await?)
    }
    AgentsCommand::List { provider, api, jobs } => {
      let filter = AgentFilter { created_by: None, provider, api };
      print(&store.list_agents(filter, jobs).await?)
    }
    AgentsCommand::PersistJob { file } => {
      let job: NewJob = read_json(&file)?;
      print(&store.persist_job(job).await?)
    }
    AgentsCommand::Jobs { filter_by, values, details } => {
      let filter_by: Option<JobFilterBy> = filter_by.map(|f| f.parse()).transpose()?;
      print(&store.list_jobs(filter_by, values, details).await?)
    }
  }
}

fn require_admin(identity: &Identity) -> anyhow::Result<()> {
  if identity.role != Role::Administrator {
    bail!("{} is not an administrator", identity.user_id);
  }
  Ok(())
}

fn non_empty(items: Vec<String>) -> Option<Vec<String>> {
  if items.is_empty() { None } else { Some(items) }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let text = fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
  serde_json::from_str(&text).with_context(|| format!("failed to parse {path:?}"))
}

fn print<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
