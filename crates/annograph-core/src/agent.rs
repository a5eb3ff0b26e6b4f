//! Automated agents and the jobs they run.
//!
//! The engine only records agent configuration and which annotations a job
//! produced; running agents happens elsewhere.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result, error::FieldErrors};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
  pub uuid:            Uuid,
  pub created_by:      String,
  pub created_on:      DateTime<Utc>,
  pub model_config:    Map<String, Value>,
  pub prompt_template: String,
  pub provider_api:    String,
  /// Present only when jobs were requested.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub job_list:        Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgent {
  pub created_by:      String,
  pub model_config:    Value,
  pub prompt_template: String,
  /// `provider:api`, e.g. `openai:chat`.
  pub provider_api:    String,
}

impl NewAgent {
  pub fn validate(&self) -> Result<()> {
    let mut errors = FieldErrors::new();
    if self.created_by.trim().is_empty() {
      errors.push("created_by", "must not be empty");
    }
    if !self.model_config.is_object() {
      errors.push("model_config", "must be a JSON object");
    }
    if self.prompt_template.is_empty() {
      errors.push("prompt_template", "must not be empty");
    }
    if ProviderApi::parse(&self.provider_api).is_none() {
      errors.push("provider_api", "expected the form provider:api");
    }
    errors.into_result()
  }
}

/// The two halves of a `provider:api` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderApi<'a> {
  pub provider: &'a str,
  pub api:      &'a str,
}

impl<'a> ProviderApi<'a> {
  pub fn parse(s: &'a str) -> Option<Self> {
    let (provider, api) = s.split_once(':')?;
    if provider.is_empty() || api.is_empty() || api.contains(':') {
      return None;
    }
    Some(Self { provider, api })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFilter {
  #[serde(default)]
  pub created_by: Option<Vec<String>>,
  #[serde(default)]
  pub provider:   Option<String>,
  #[serde(default)]
  pub api:        Option<String>,
}

impl AgentFilter {
  pub fn admits(&self, agent: &Agent) -> bool {
    if let Some(created_by) = &self.created_by
      && !created_by.contains(&agent.created_by)
    {
      return false;
    }
    let parts = ProviderApi::parse(&agent.provider_api);
    if let Some(provider) = &self.provider
      && parts.is_none_or(|p| p.provider != provider)
    {
      return false;
    }
    if let Some(api) = &self.api
      && parts.is_none_or(|p| p.api != api)
    {
      return false;
    }
    true
  }
}

// ─── Jobs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
  /// Caller-chosen job id, also the annotator name of the job's annotations.
  pub job_uuid:         String,
  pub issued_by:        String,
  pub agent_uuid:       Uuid,
  pub label_name:       String,
  pub annotation_uuids: Vec<Uuid>,
}

impl NewJob {
  pub fn validate(&self) -> Result<()> {
    let mut errors = FieldErrors::new();
    if self.job_uuid.trim().is_empty() {
      errors.push("job_uuid", "must not be empty");
    }
    if self.issued_by.trim().is_empty() {
      errors.push("issued_by", "must not be empty");
    }
    if self.label_name.trim().is_empty() {
      errors.push("label_name", "must not be empty");
    }
    errors.into_result()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedJob {
  pub job_uuid:         String,
  /// Annotations linked to the job after this call.
  pub annotation_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFilterBy {
  AgentUuid,
  IssuedBy,
  Uuid,
}

impl FromStr for JobFilterBy {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "agent_uuid" => Ok(Self::AgentUuid),
      "issued_by" => Ok(Self::IssuedBy),
      "uuid" => Ok(Self::Uuid),
      other => Err(Error::Unsupported(format!(
        "job filter {other:?}; supported filters are: agent_uuid, issued_by, uuid"
      ))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub job_uuid:   String,
  pub issued_by:  String,
  pub agent_uuid: Uuid,
  pub label_name: String,
  pub created_on: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub agent:      Option<Agent>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::error::{Classify as _, ErrorKind};

  fn agent(provider_api: &str, created_by: &str) -> Agent {
    Agent {
      uuid:            Uuid::new_v4(),
      created_by:      created_by.into(),
      created_on:      Utc::now(),
      model_config:    Map::new(),
      prompt_template: "{{content}}".into(),
      provider_api:    provider_api.into(),
      job_list:        None,
    }
  }

  #[test]
  fn provider_api_shape() {
    assert_eq!(
      ProviderApi::parse("openai:chat"),
      Some(ProviderApi { provider: "openai", api: "chat" })
    );
    assert!(ProviderApi::parse("openai").is_none());
    assert!(ProviderApi::parse(":chat").is_none());
    assert!(ProviderApi::parse("a:b:c").is_none());
  }

  #[test]
  fn new_agent_validation() {
    let ok = NewAgent {
      created_by:      "admin".into(),
      model_config:    json!({"provider": "openai", "model_name": "m"}),
      prompt_template: "Label: {{content}}".into(),
      provider_api:    "openai:chat".into(),
    };
    assert!(ok.validate().is_ok());

    let bad = NewAgent { model_config: json!("m"), provider_api: "openai".into(), ..ok };
    let Err(Error::Validation(fields)) = bad.validate() else { panic!("expected validation") };
    assert!(fields.get("model_config").is_some());
    assert!(fields.get("provider_api").is_some());
  }

  #[test]
  fn agent_filter() {
    let a = agent("openai:chat", "u1");
    assert!(AgentFilter::default().admits(&a));
    assert!(AgentFilter { provider: Some("openai".into()), ..Default::default() }.admits(&a));
    assert!(!AgentFilter { api: Some("completion".into()), ..Default::default() }.admits(&a));
    assert!(!AgentFilter { created_by: Some(vec!["u2".into()]), ..Default::default() }.admits(&a));
  }

  #[test]
  fn unknown_job_filter() {
    assert_eq!("uuid".parse::<JobFilterBy>().unwrap(), JobFilterBy::Uuid);
    assert_eq!("label".parse::<JobFilterBy>().unwrap_err().kind(), ErrorKind::Unsupported);
  }
}
