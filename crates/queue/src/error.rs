use std::path::PathBuf;

/// Failures of the queue snapshot store.
///
/// None of these stop the worker: the queue logs them and carries on
/// in memory.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Reading, writing or renaming the snapshot file failed.
    #[error("Snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file exists but is not a valid snapshot.
    #[error("Snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
