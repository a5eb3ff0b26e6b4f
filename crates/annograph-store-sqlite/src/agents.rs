//! Agent registrations and the jobs they ran.

use annograph_core::{
  Error as CoreError,
  agent::{Agent, AgentFilter, Job, JobFilterBy, NewAgent, NewJob, PersistedJob},
};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    AGENT_COLUMNS, RawAgent, decode_dt, decode_uuid, encode_json, encode_str_list, encode_uuid,
    encode_uuid_list, now,
  },
};

pub fn register(conn: &Connection, project_uuid: Uuid, agent: &NewAgent) -> Result<Uuid> {
  agent.validate()?;
  let uuid = Uuid::new_v4();
  conn.execute(
    "INSERT INTO agents (uuid, project_uuid, created_by, created_on, model_config, prompt_template, provider_api)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      encode_uuid(uuid),
      encode_uuid(project_uuid),
      agent.created_by,
      now(),
      encode_json(&agent.model_config),
      agent.prompt_template,
      agent.provider_api,
    ],
  )?;
  tracing::info!(%uuid, provider_api = %agent.provider_api, "registered agent");
  Ok(uuid)
}

fn job_ids(conn: &Connection, agent_uuid: &str) -> Result<Vec<String>> {
  let mut stmt =
    conn.prepare_cached("SELECT uuid FROM jobs WHERE agent_uuid = ?1 ORDER BY created_on, uuid")?;
  let ids = stmt
    .query_map([agent_uuid], |r| r.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(ids)
}

/// Agents passing `filter`, oldest first.
pub fn list(conn: &Connection, filter: &AgentFilter, show_job_list: bool) -> Result<Vec<Agent>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {AGENT_COLUMNS} FROM agents ag ORDER BY ag.created_on, ag.uuid"
  ))?;
  let raws = stmt
    .query_map([], |r| RawAgent::from_row_at(r, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut agents = Vec::new();
  for raw in raws {
    let mut agent = raw.into_agent()?;
    if !filter.admits(&agent) {
      continue;
    }
    if show_job_list {
      agent.job_list = Some(job_ids(conn, &encode_uuid(agent.uuid))?);
    }
    agents.push(agent);
  }
  Ok(agents)
}

/// Record the job if new, then link its annotations. Unknown annotation
/// uuids are skipped.
pub fn persist_job(conn: &Connection, job: &NewJob) -> Result<PersistedJob> {
  job.validate()?;
  let agent = encode_uuid(job.agent_uuid);
  let known = conn
    .query_row("SELECT 1 FROM agents WHERE uuid = ?1", [&agent], |_| Ok(()))
    .optional()?;
  if known.is_none() {
    return Err(CoreError::AgentNotFound(job.agent_uuid).into());
  }

  let created = conn.execute(
    "INSERT OR IGNORE INTO jobs (uuid, agent_uuid, issued_by, label_name, created_on)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![job.job_uuid, agent, job.issued_by, job.label_name, now()],
  )?;
  let linked = conn.execute(
    "INSERT OR IGNORE INTO job_annotations (job_uuid, annotation_uuid)
     SELECT ?1, a.uuid FROM annotations a
     WHERE a.uuid IN (SELECT value FROM json_each(?2))",
    rusqlite::params![job.job_uuid, encode_uuid_list(&job.annotation_uuids)],
  )?;
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM job_annotations WHERE job_uuid = ?1",
    [&job.job_uuid],
    |r| r.get(0),
  )?;
  tracing::debug!(job = %job.job_uuid, created = created > 0, linked, "persisted job");
  Ok(PersistedJob { job_uuid: job.job_uuid.clone(), annotation_count: count as u64 })
}

/// Jobs, oldest first. With a filter, a job is kept when its field is one
/// of `values`.
pub fn list_jobs(
  conn: &Connection,
  filter_by: Option<JobFilterBy>,
  values: &[String],
  show_agent_details: bool,
) -> Result<Vec<Job>> {
  let column = match filter_by {
    None => None,
    Some(JobFilterBy::AgentUuid) => Some("j.agent_uuid"),
    Some(JobFilterBy::IssuedBy) => Some("j.issued_by"),
    Some(JobFilterBy::Uuid) => Some("j.uuid"),
  };
  let (condition, params) = match column {
    Some(column) => (
      format!("WHERE {column} IN (SELECT value FROM json_each(?1))"),
      vec![encode_str_list(values)],
    ),
    None => (String::new(), Vec::new()),
  };
  let mut stmt = conn.prepare(&format!(
    "SELECT j.uuid, j.issued_by, j.agent_uuid, j.label_name, j.created_on, {AGENT_COLUMNS}
     FROM jobs j JOIN agents ag ON ag.uuid = j.agent_uuid
     {condition}
     ORDER BY j.created_on, j.uuid"
  ))?;
  let raws = stmt
    .query_map(rusqlite::params_from_iter(params), |r| {
      Ok((
        r.get::<_, String>(0)?,
        r.get::<_, String>(1)?,
        r.get::<_, String>(2)?,
        r.get::<_, String>(3)?,
        r.get::<_, String>(4)?,
        RawAgent::from_row_at(r, 5)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws
    .into_iter()
    .map(|(job_uuid, issued_by, agent_uuid, label_name, created_on, agent)| {
      Ok(Job {
        job_uuid,
        issued_by,
        agent_uuid: decode_uuid(&agent_uuid)?,
        label_name,
        created_on: decode_dt(&created_on)?,
        agent: if show_agent_details { Some(agent.into_agent()?) } else { None },
      })
    })
    .collect()
}
