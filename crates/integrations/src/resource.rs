//! Resource descriptors and transfer jobs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Errors that can occur while reading a version resource.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Version resource has no name")]
    MissingName,
    #[error("Resource name {name} is not an integration version path")]
    InvalidName { name: String },
    #[error("Resource {name} has an invalid snapshot number {value}")]
    InvalidSnapshot { name: String, value: String },
}

/// One versioned resource instance as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Full resource path, `projects/../integrations/<name>/versions/<version>`.
    pub full_name: String,
    /// Integration short name.
    pub display_name: String,
    pub snapshot_number: u64,
    /// Version id, the last segment of `full_name`.
    pub version: String,
    pub state: Option<String>,
}

impl ResourceDescriptor {
    /// Builds a descriptor from a version resource body.
    pub fn from_version(body: &serde_json::Value) -> Result<Self, Error> {
        let full_name = body
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or(Error::MissingName)?
            .to_string();

        let display_name = integration_name(&full_name)
            .ok_or_else(|| Error::InvalidName {
                name: full_name.clone(),
            })?
            .to_string();

        let version = full_name
            .rsplit('/')
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidName {
                name: full_name.clone(),
            })?
            .to_string();

        // int64 fields are encoded as JSON strings.
        let snapshot_number = match body.get("snapshotNumber") {
            None | Some(serde_json::Value::Null) => 0,
            Some(serde_json::Value::String(s)) => {
                s.parse().map_err(|_| Error::InvalidSnapshot {
                    name: full_name.clone(),
                    value: s.clone(),
                })?
            }
            Some(serde_json::Value::Number(n)) => {
                n.as_u64().ok_or_else(|| Error::InvalidSnapshot {
                    name: full_name.clone(),
                    value: n.to_string(),
                })?
            }
            Some(other) => {
                return Err(Error::InvalidSnapshot {
                    name: full_name.clone(),
                    value: other.to_string(),
                })
            }
        };

        let state = body
            .get("state")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(Self {
            full_name,
            display_name,
            snapshot_number,
            version,
            state,
        })
    }
}

/// Returns the segment following `integrations/` in a resource path.
pub fn integration_name(full_name: &str) -> Option<&str> {
    let mut segments = full_name.split('/');
    while let Some(segment) = segments.next() {
        if segment == "integrations" {
            return segments.next().filter(|s| !s.is_empty());
        }
    }
    None
}

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Export,
    Import,
}

/// Unit of work processed once by the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub resource_name: String,
    /// Output folder for exports, source file for imports.
    pub local_path: PathBuf,
    pub direction: Direction,
}

impl TransferJob {
    pub fn export(resource_name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_name: resource_name.into(),
            local_path: output_dir.into(),
            direction: Direction::Export,
        }
    }

    pub fn import(resource_name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            resource_name: resource_name.into(),
            local_path: file.into(),
            direction: Direction::Import,
        }
    }
}
