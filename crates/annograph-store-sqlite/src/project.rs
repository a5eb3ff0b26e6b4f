//! The project envelope: created or fetched at open, never renamed.

use annograph_core::project::Project;
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{decode_dt, decode_uuid, encode_dt, encode_uuid},
};

pub fn open(conn: &Connection, name: &str, description: &str) -> Result<Project> {
  let existing: Option<(String, String, String, String)> = conn
    .query_row(
      "SELECT uuid, name, description, created_on FROM projects LIMIT 1",
      [],
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )
    .optional()?;

  if let Some((uuid, found, description, created_on)) = existing {
    if found != name {
      return Err(Error::ProjectMismatch { requested: name.to_owned(), found });
    }
    return Ok(Project {
      uuid: decode_uuid(&uuid)?,
      name: found,
      description,
      created_on: decode_dt(&created_on)?,
    });
  }

  let project = Project {
    uuid:        Uuid::new_v4(),
    name:        name.to_owned(),
    description: description.to_owned(),
    created_on:  chrono::Utc::now(),
  };
  conn.execute(
    "INSERT INTO projects (uuid, name, description, created_on) VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![
      encode_uuid(project.uuid),
      project.name,
      project.description,
      encode_dt(project.created_on),
    ],
  )?;
  tracing::info!(project = %project.name, uuid = %project.uuid, "created project");
  Ok(project)
}

/// Delete every node except the project itself.
pub fn reset(conn: &Connection) -> Result<()> {
  // Children first where the foreign keys do not cascade.
  conn.execute_batch(
    "DELETE FROM job_annotations;
     DELETE FROM jobs;
     DELETE FROM agents;
     DELETE FROM subsets;
     DELETE FROM schemas;
     DELETE FROM verifications;
     DELETE FROM annotation_labels;
     DELETE FROM label_metadata;
     DELETE FROM labels;
     DELETE FROM annotations;
     DELETE FROM record_metadata;
     DELETE FROM records;",
  )?;
  Ok(())
}
