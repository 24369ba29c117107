use std::io;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::models::EventData;

pub const DEFAULT_FILE_NAME: &str = "{day}-meetup.md";

const FENCE: &str = "---";
const BOM: char = '\u{feff}';

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to create target directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("unable to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("unable to parse front matter of {path}: {reason}")]
    FrontMatter { path: PathBuf, reason: String },
    #[error("unable to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Created,
    Overwritten,
    SkippedLocked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreReport {
    pub created: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StoreReport {
    pub fn written(&self) -> usize {
        self.created + self.overwritten
    }
}

/// Front matter of a persisted event file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub date: Option<String>,
    pub link: Option<String>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub locked: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LockFlag {
    #[serde(default)]
    locked: bool,
}

/// Doubles single quotes so the value survives inside a single-quoted
/// YAML scalar.
pub fn escape_front_matter(value: &str) -> String {
    value.replace('\'', "''")
}

pub fn render(event: &EventData) -> String {
    format!(
        "---\n\
         date: '{date}'\n\
         link: '{link}'\n\
         location: '{location}'\n\
         title: '{title}'\n\
         locked: false\n\
         ---\n\
         {description}\n",
        date = escape_front_matter(&event.date),
        link = escape_front_matter(&event.link),
        location = escape_front_matter(&event.location),
        title = escape_front_matter(&event.title),
        description = event.description,
    )
}

/// Fills `{day}`, `{date}` and `{id}` in the file name pattern.
pub fn file_name(pattern: &str, event: &EventData) -> String {
    pattern
        .replace("{day}", event.day())
        .replace("{date}", &event.date.replace(':', "-"))
        .replace("{id}", event.id.as_deref().unwrap_or("event"))
}

/// Text after the opening fence line, if `content` opens with one. A leading
/// byte order mark and whitespace around the fence are ignored.
fn after_opening_fence(content: &str) -> Option<&str> {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    let (first, rest) = content.split_once('\n')?;
    (first.trim() == FENCE).then_some(rest)
}

/// Splits `content` into its front matter block and body. Files without a
/// leading fence have no front matter.
pub fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = after_opening_fence(content)?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim() == FENCE {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

pub fn parse_front_matter(content: &str) -> Result<FrontMatter, String> {
    match split_front_matter(content) {
        Some((yaml, _)) if !yaml.trim().is_empty() => {
            serde_yaml::from_str(yaml).map_err(|err| err.to_string())
        }
        _ => Ok(FrontMatter::default()),
    }
}

fn is_locked(content: &str) -> Result<bool, String> {
    match split_front_matter(content) {
        Some((yaml, _)) if !yaml.trim().is_empty() => serde_yaml::from_str::<LockFlag>(yaml)
            .map(|flag| flag.locked)
            .map_err(|err| err.to_string()),
        Some(_) => Ok(false),
        None if after_opening_fence(content).is_some() => {
            Err("front matter has no closing fence".to_string())
        }
        None => Ok(false),
    }
}

/// Writes one event into `dir`, unless a file for it exists and is locked.
pub async fn store_event(
    event: &EventData,
    dir: &Path,
    pattern: &str,
) -> Result<StoreOutcome, StoreError> {
    let path = dir.join(file_name(pattern, event));

    let exists = fs::try_exists(&path)
        .await
        .map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;

    let outcome = if exists {
        let existing = fs::read_to_string(&path)
            .await
            .map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
        let locked = is_locked(&existing).map_err(|reason| StoreError::FrontMatter {
            path: path.clone(),
            reason,
        })?;
        if locked {
            return Ok(StoreOutcome::SkippedLocked);
        }
        StoreOutcome::Overwritten
    } else {
        StoreOutcome::Created
    };

    fs::write(&path, render(event))
        .await
        .map_err(|source| StoreError::Write { path, source })?;
    Ok(outcome)
}

/// Persists every event concurrently. Individual failures are logged and
/// counted; only a target directory that cannot be created is an error.
pub async fn store_events(
    events: &[EventData],
    target: &Path,
    pattern: &str,
) -> Result<StoreReport, StoreError> {
    fs::create_dir_all(target)
        .await
        .map_err(|source| StoreError::CreateDir {
            path: target.to_path_buf(),
            source,
        })?;

    let results = join_all(events.iter().map(|event| async move {
        let name = file_name(pattern, event);
        (name, store_event(event, target, pattern).await)
    }))
    .await;

    let mut report = StoreReport::default();
    for (name, result) in results {
        match result {
            Ok(StoreOutcome::Created) => {
                tracing::info!("> created {name}");
                report.created += 1;
            }
            Ok(StoreOutcome::Overwritten) => {
                tracing::info!("> overwritten {name}");
                report.overwritten += 1;
            }
            Ok(StoreOutcome::SkippedLocked) => {
                tracing::info!("> skipped {name} (locked)");
                report.skipped += 1;
            }
            Err(err) => {
                tracing::error!("> failed {name}: {err}");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}
