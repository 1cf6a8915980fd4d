//! Append-only store of versioned task specs.
//!
//! Layout: `<root>/<task key>/v0001.json`, one JSON document per version.
//! Files are created with `create_new`, so an existing version is never
//! overwritten.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SpecVersion, VersionComparison, Workspace};

/// Filesystem-backed spec version history.
#[derive(Debug, Clone)]
pub struct SpecStore {
    root: PathBuf,
}

impl SpecStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn task_dir(&self, task_id: &str) -> PathBuf {
        self.root.join(Workspace::task_key(task_id))
    }

    fn version_path(&self, task_id: &str, version: u32) -> PathBuf {
        self.task_dir(task_id).join(version_file_name(version))
    }

    /// Save a new version and return its number (max existing + 1).
    #[instrument(skip(self, content), fields(task_id = %task_id, size = content.len()))]
    pub async fn save_spec(&self, task_id: &str, content: &str, reason: &str) -> DomainResult<u32> {
        let dir = self.task_dir(task_id);
        tokio::fs::create_dir_all(&dir).await?;

        let version = self.list_versions(task_id).await?.last().copied().unwrap_or(0) + 1;
        let record = SpecVersion {
            task_id: task_id.to_string(),
            version,
            content: content.to_string(),
            created_at: Utc::now(),
            reason: reason.to_string(),
        };
        let json = serde_json::to_vec_pretty(&record)?;

        let path = self.version_path(task_id, version);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                DomainError::Storage(format!("cannot create {}: {e}", path.display()))
            })?;
        file.write_all(&json).await?;
        file.flush().await?;

        info!(version, reason, "Saved spec version");
        Ok(version)
    }

    /// Load one specific version.
    pub async fn load_spec(&self, task_id: &str, version: u32) -> DomainResult<SpecVersion> {
        let path = self.version_path(task_id, version);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DomainError::SpecVersionNotFound {
                    task_id: task_id.to_string(),
                    version,
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Highest version for a task, if any has been saved.
    pub async fn load_latest_spec(&self, task_id: &str) -> DomainResult<Option<SpecVersion>> {
        match self.list_versions(task_id).await?.last() {
            Some(&version) => Ok(Some(self.load_spec(task_id, version).await?)),
            None => Ok(None),
        }
    }

    /// Saved version numbers, ascending.
    pub async fn list_versions(&self, task_id: &str) -> DomainResult<Vec<u32>> {
        let dir = self.task_dir(task_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(version) = entry.file_name().to_str().and_then(parse_version_file_name) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        debug!(task_id, count = versions.len(), "Listed spec versions");
        Ok(versions)
    }

    /// Size and time deltas from version `a` to version `b`.
    pub async fn compare_versions(
        &self,
        task_id: &str,
        a: u32,
        b: u32,
    ) -> DomainResult<VersionComparison> {
        let from = self.load_spec(task_id, a).await?;
        let to = self.load_spec(task_id, b).await?;
        Ok(VersionComparison::between(&from, &to))
    }
}

fn version_file_name(version: u32) -> String {
    format!("v{version:04}.json")
}

fn parse_version_file_name(name: &str) -> Option<u32> {
    name.strip_prefix('v')?.strip_suffix(".json")?.parse().ok()
}
