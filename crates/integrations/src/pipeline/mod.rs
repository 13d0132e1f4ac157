//! Bulk transfer of integration versions between the control plane and a local folder.
//!
//! Both directions push [`TransferJob`](crate::resource::TransferJob)s through one shared
//! [`WorkerPool`]. A failed job never stops its siblings; every failure ends up in the
//! returned [`TransferReport`].

use crate::resource::TransferJob;
use std::fmt;
use std::path::PathBuf;

pub mod export;
pub mod import;
pub mod pool;

pub use export::{Export, ExportBuilder};
pub use import::{Import, ImportBuilder};
pub use pool::{TransferHandler, WorkerPool};

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Errors that can occur during export or import.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("API call failed: {source}")]
    Client {
        #[source]
        source: crate::client::Error,
    },
    #[error("Enumeration failed: {source}")]
    Enumerate {
        #[source]
        source: crate::enumerate::Error,
    },
    #[error("IO operation failed on path {path}: {source}")]
    IO {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("File {path} is not valid JSON: {source}")]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON serialization failed: {source}")]
    SerdeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid folder pattern: {source}")]
    Pattern {
        #[source]
        source: glob::PatternError,
    },
    #[error("Failed to read folder entry: {source}")]
    Glob {
        #[source]
        source: glob::GlobError,
    },
    #[error("Missing required builder attribute: {}", _0)]
    MissingRequiredAttribute(String),
}

/// A job that failed.
#[derive(Debug)]
pub struct TransferFailure {
    pub job: TransferJob,
    pub error: Error,
}

/// Outcome of a bulk run.
#[derive(Debug, Default)]
pub struct TransferReport {
    /// Jobs that completed.
    pub completed: usize,
    /// Files written or uploaded.
    pub files: usize,
    pub failures: Vec<TransferFailure>,
    /// Jobs never started because a failure cancelled the run.
    pub cancelled: usize,
    /// Files ignored because their name does not follow the naming pattern.
    pub skipped: Vec<PathBuf>,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.cancelled == 0
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} job(s) completed, {} file(s) transferred, {} failed, {} cancelled, {} skipped",
            self.completed,
            self.files,
            self.failures.len(),
            self.cancelled,
            self.skipped.len()
        )
    }
}
