// src/error.rs
//
// =============================================================================
// VASPLAB: ERROR TAXONOMY
// =============================================================================
//
// Every failure the core can raise, as a tagged enum.
// Callers match on variants (e.g. treat `MissingKey(Energy)` or
// `QueuedPending` as "not ready yet") instead of inspecting messages.

use crate::core::Property;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = VaspError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum VaspError {
    /// The setup overrides do not partition the structure.
    #[error("sorting error: {detail} (resort={resort:?})")]
    Sorting { detail: String, resort: Vec<usize> },

    /// Invalid request or configuration (unknown xc, bad kpts, no command...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// On-disk artifacts could not be turned back into a parameter set.
    #[error("failed to reconcile {dir}: {source}")]
    Reconcile {
        dir: PathBuf,
        #[source]
        source: Box<VaspError>,
    },

    /// A raw file exists but does not have the expected layout.
    #[error("malformed {file}: {detail}")]
    Malformed { file: PathBuf, detail: String },

    #[error("{engine} returned an error: {code}")]
    ProcessFailed { engine: String, code: i32 },

    #[error("calculation state in {0} could not be classified")]
    Unclassified(PathBuf),

    #[error("job {job_id} for {dir} is still in the queue")]
    QueuedPending { dir: PathBuf, job_id: String },

    #[error("job {job_id} for {dir} was submitted and has not started")]
    SubmittedPending { dir: PathBuf, job_id: String },

    #[error("property '{0}' is not available")]
    MissingKey(Property),

    #[error("{0} holds an NEB layout; use an NEB-aware runner")]
    NebLayout(PathBuf),

    #[error("{0} is locked by another process")]
    Locked(PathBuf),

    #[error("queue query failed: {0}")]
    Queue(String),

    #[error("I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl VaspError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(file: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            file: file.into(),
            detail: detail.into(),
        }
    }

    pub fn reconcile(dir: impl Into<PathBuf>, source: VaspError) -> Self {
        Self::Reconcile {
            dir: dir.into(),
            source: Box::new(source),
        }
    }

    /// True for the "come back later" family: the run exists but is not done.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            VaspError::QueuedPending { .. } | VaspError::SubmittedPending { .. }
        )
    }
}
