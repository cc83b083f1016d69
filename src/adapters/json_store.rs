//! JSON-file implementations of the persistence ports.
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous file intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::domain::models::{ExperimentId, TriggerSession, Variant};
use crate::domain::ports::{DurableAssignmentStore, SessionCache};

async fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

/// Confirmed-assignment storage in a single JSON file.
pub struct JsonFileAssignmentStore {
    path: PathBuf,
}

impl JsonFileAssignmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DurableAssignmentStore for JsonFileAssignmentStore {
    async fn load(&self) -> Result<HashMap<ExperimentId, Variant>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Corrupt assignment file {}", self.path.display())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(error) => Err(error)
                .with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn save(&self, assignments: &HashMap<ExperimentId, Variant>) -> Result<()> {
        let contents = serde_json::to_string_pretty(assignments)
            .context("Failed to serialize assignments")?;
        write_atomically(&self.path, &contents).await
    }
}

/// Recent-session cache in a single JSON file, cleared on read.
pub struct JsonFileSessionCache {
    path: PathBuf,
}

impl JsonFileSessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionCache for JsonFileSessionCache {
    async fn save_recent(&self, sessions: &[TriggerSession]) -> Result<()> {
        let contents =
            serde_json::to_string(sessions).context("Failed to serialize sessions")?;
        write_atomically(&self.path, &contents).await
    }

    async fn take_recent(&self) -> Result<Vec<TriggerSession>> {
        let sessions = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Corrupt session cache {}", self.path.display()))?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };
        if !sessions.is_empty() {
            tokio::fs::remove_file(&self.path)
                .await
                .with_context(|| format!("Failed to clear {}", self.path.display()))?;
        }
        Ok(sessions)
    }
}
