use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sources::TruncatePolicy;
use crate::store::DEFAULT_FILE_NAME;

pub const DEFAULT_BASE_URL: &str = "https://www.meetup.com/";
pub const DEFAULT_TARGET: &str = "./dist";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("invalid config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("no group slug configured; set GROUP_SLUG or pass --group-slug")]
    MissingGroup,
}

/// Which adapter acquires the events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Nested-object queries against the legacy `mu_api` endpoint.
    #[default]
    Api,
    /// GraphQL queries with server-side limits.
    Graphql,
    /// Scrapes the listing page and every event page.
    Browser,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarvestConfig {
    pub base_url: String,
    pub group_slug: Option<String>,
    pub source: SourceKind,
    pub limit_upcoming: Option<usize>,
    pub limit_past: Option<usize>,
    pub truncate: TruncatePolicy,
    /// Output file name; `{day}`, `{date}` and `{id}` are filled from the event.
    pub file_name: String,
    pub target: PathBuf,
    pub session_cookie: Option<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            group_slug: None,
            source: SourceKind::default(),
            limit_upcoming: None,
            limit_past: None,
            truncate: TruncatePolicy::default(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            target: PathBuf::from(DEFAULT_TARGET),
            session_cookie: None,
        }
    }
}

impl HarvestConfig {
    /// Reads a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    pub fn group(&self) -> Result<&str, ConfigError> {
        self.group_slug
            .as_deref()
            .map(str::trim)
            .filter(|slug| !slug.is_empty())
            .ok_or(ConfigError::MissingGroup)
    }
}
