//! SQL schema for the annograph SQLite store.
//!
//! Node kinds are tables. Edge kinds are foreign-key columns (`annotates`,
//! `verifies`, `record_meta_of`, `label_meta_of`, `assigned_to`, `agent_of`,
//! `job_of`) or link tables (`label_of`, `contains`). The `confirms` and
//! `corrects` edges are the `status` and `label_uuid` columns of a
//! verification.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS projects (
    uuid        TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    created_on  TEXT NOT NULL
);

-- Merged on (record_id, dataset); uuid survives re-import.
CREATE TABLE IF NOT EXISTS records (
    uuid      TEXT PRIMARY KEY,
    dataset   TEXT NOT NULL,
    record_id INTEGER NOT NULL,
    content   TEXT NOT NULL,
    UNIQUE (record_id, dataset)
);

CREATE TABLE IF NOT EXISTS record_metadata (
    record_uuid TEXT NOT NULL REFERENCES records(uuid) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    PRIMARY KEY (record_uuid, name)
);

CREATE TABLE IF NOT EXISTS annotations (
    uuid        TEXT PRIMARY KEY,
    record_uuid TEXT NOT NULL REFERENCES records(uuid) ON DELETE CASCADE,
    annotator   TEXT NOT NULL,
    created_on  TEXT NOT NULL,
    UNIQUE (record_uuid, annotator)
);

-- span_key is '' for record-level labels and 'start:end' for span-level
-- labels, so one unique index covers both key shapes. Correction labels
-- (created by a CORRECTS verification) are owned by the verifier and are
-- never linked to an annotation.
CREATE TABLE IF NOT EXISTS labels (
    uuid        TEXT PRIMARY KEY,
    record_uuid TEXT NOT NULL REFERENCES records(uuid) ON DELETE CASCADE,
    annotator   TEXT NOT NULL,
    level       TEXT NOT NULL,                       -- 'record' | 'span'
    name        TEXT NOT NULL,
    span_key    TEXT NOT NULL DEFAULT '',
    start_idx   INTEGER,
    end_idx     INTEGER,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL DEFAULT 'annotation'   -- 'annotation' | 'correction'
);

CREATE UNIQUE INDEX IF NOT EXISTS labels_key_idx
    ON labels(record_uuid, annotator, level, name, span_key)
    WHERE source = 'annotation';
CREATE INDEX IF NOT EXISTS labels_name_idx ON labels(name);

CREATE TABLE IF NOT EXISTS annotation_labels (
    annotation_uuid TEXT NOT NULL REFERENCES annotations(uuid) ON DELETE CASCADE,
    label_uuid      TEXT NOT NULL REFERENCES labels(uuid) ON DELETE CASCADE,
    PRIMARY KEY (annotation_uuid, label_uuid)
);

CREATE INDEX IF NOT EXISTS annotation_labels_label_idx ON annotation_labels(label_uuid);

CREATE TABLE IF NOT EXISTS label_metadata (
    label_uuid TEXT NOT NULL REFERENCES labels(uuid) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    value_json TEXT NOT NULL,
    PRIMARY KEY (label_uuid, name)
);

CREATE TABLE IF NOT EXISTS verifications (
    uuid            TEXT PRIMARY KEY,
    annotation_uuid TEXT NOT NULL REFERENCES annotations(uuid) ON DELETE CASCADE,
    label_name      TEXT NOT NULL,
    verifier        TEXT NOT NULL,
    status          TEXT NOT NULL,                   -- 'CONFIRMS' | 'CORRECTS'
    label_uuid      TEXT NOT NULL REFERENCES labels(uuid) ON DELETE CASCADE,
    last_timestamp  TEXT NOT NULL,
    UNIQUE (annotation_uuid, label_name, verifier)
);

CREATE INDEX IF NOT EXISTS verifications_label_idx ON verifications(label_uuid);

-- Append-only history; at most one active row per project.
CREATE TABLE IF NOT EXISTS schemas (
    uuid         TEXT PRIMARY KEY,
    project_uuid TEXT NOT NULL REFERENCES projects(uuid),
    document     TEXT NOT NULL,
    created_on   TEXT NOT NULL,
    active       INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS schemas_active_idx
    ON schemas(project_uuid)
    WHERE active = 1;

-- Immutable once written.
CREATE TABLE IF NOT EXISTS subsets (
    uuid         TEXT PRIMARY KEY,
    project_uuid TEXT NOT NULL REFERENCES projects(uuid),
    annotator    TEXT NOT NULL,
    assigned_by  TEXT NOT NULL,
    created_on   TEXT NOT NULL,
    record_uuids TEXT NOT NULL                        -- JSON array
);

CREATE INDEX IF NOT EXISTS subsets_annotator_idx ON subsets(annotator, created_on);

CREATE TABLE IF NOT EXISTS agents (
    uuid            TEXT PRIMARY KEY,
    project_uuid    TEXT NOT NULL REFERENCES projects(uuid),
    created_by      TEXT NOT NULL,
    created_on      TEXT NOT NULL,
    model_config    TEXT NOT NULL,                    -- JSON object
    prompt_template TEXT NOT NULL,
    provider_api    TEXT NOT NULL
);

-- Job ids are chosen by the caller.
CREATE TABLE IF NOT EXISTS jobs (
    uuid       TEXT PRIMARY KEY,
    agent_uuid TEXT NOT NULL REFERENCES agents(uuid) ON DELETE CASCADE,
    issued_by  TEXT NOT NULL,
    label_name TEXT NOT NULL,
    created_on TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS job_annotations (
    job_uuid        TEXT NOT NULL REFERENCES jobs(uuid) ON DELETE CASCADE,
    annotation_uuid TEXT NOT NULL REFERENCES annotations(uuid) ON DELETE CASCADE,
    PRIMARY KEY (job_uuid, annotation_uuid)
);

PRAGMA user_version = 1;
";
