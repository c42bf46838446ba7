//! Queue snapshot persistence.
//!
//! The snapshot is a single JSON file holding the descriptors of jobs that
//! had not started when a shutdown was requested. It is written after the
//! shutdown drain, read on startup recovery, and deleted when the scheduler
//! observes a naturally empty queue. A missing file is the normal fresh
//! start; a malformed file is a fatal startup condition.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::job::JobDescriptor;

/// Default location of the snapshot file.
pub const DEFAULT_SNAPSHOT_PATH: &str = "queue.snapshot";

/// Errors that can occur reading or writing the snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Failed to read the snapshot file.
    #[error("failed to read snapshot '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the snapshot file.
    #[error("failed to write snapshot '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to remove the snapshot file.
    #[error("failed to remove snapshot '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file exists but does not parse.
    #[error("malformed snapshot '{path}': {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Flat-file store for pending job descriptors.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Create a store at the given path. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a snapshot file currently exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load all descriptors from the snapshot file.
    ///
    /// A missing file is equivalent to an empty list.
    pub fn load(&self) -> Result<Vec<JobDescriptor>, SnapshotError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SnapshotError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the given descriptors, replacing any previous snapshot.
    pub fn save(&self, descriptors: &[JobDescriptor]) -> Result<(), SnapshotError> {
        let bytes =
            serde_json::to_vec_pretty(descriptors).map_err(|source| SnapshotError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        std::fs::write(&self.path, bytes).map_err(|source| SnapshotError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Delete the snapshot file. A missing file is not an error.
    pub fn remove(&self) -> Result<(), SnapshotError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SnapshotError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_PATH)
    }
}
