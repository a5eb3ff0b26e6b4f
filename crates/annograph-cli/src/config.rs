//! Layered configuration: an optional TOML file, then `ANNOGRAPH_*`
//! environment variables, then command-line overrides.

use std::path::{Path, PathBuf};

use annograph_core::project::{Identity, Role};
use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  #[serde(default = "default_project_name")]
  pub project_name:        String,
  #[serde(default)]
  pub project_description: String,
  #[serde(default = "default_user_id")]
  pub user_id:             String,
  #[serde(default)]
  pub role:                Role,
}

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/annograph/annograph.db") }

fn default_project_name() -> String { "default".to_owned() }

fn default_user_id() -> String { std::env::var("USER").unwrap_or_else(|_| "anonymous".to_owned()) }

impl AppConfig {
  pub fn load(path: &Path, user: Option<String>, role: Option<String>) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ANNOGRAPH"))
      .set_override_option("user_id", user)?
      .set_override_option("role", role)?
      .build()
      .context("failed to read configuration")?;
    settings
      .try_deserialize()
      .context("failed to deserialise AppConfig")
  }

  pub fn identity(&self) -> Identity { Identity::new(self.user_id.clone(), self.role) }

  /// `store_path` with a leading `~` expanded.
  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
