//! JSON snapshot file for the queue.
//!
//! The whole queue state is small, so every save rewrites the file:
//! serialize, write `<path>.tmp`, then rename over `<path>`. A crash
//! mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use genrelay_core::Job;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Everything needed to rebuild the queue after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Waiting jobs, head first.
    #[serde(default)]
    pub pending: Vec<Job>,
    /// The job being processed when the snapshot was written.
    #[serde(default)]
    pub in_flight: Option<Job>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file is an empty queue.
    pub async fn load(&self) -> Result<QueueSnapshot, QueueError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(QueueSnapshot::default());
            }
            Err(source) => {
                return Err(QueueError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| QueueError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Atomically replace the snapshot file.
    pub async fn save(&self, snapshot: &QueueSnapshot) -> Result<(), QueueError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let io_err = |source: std::io::Error| QueueError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp_path = self.tmp_path();
        tokio::fs::write(&tmp_path, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(io_err)?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
