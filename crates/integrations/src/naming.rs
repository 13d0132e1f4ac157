//! Versioned file naming: `<name><sep><snapshot><sep><version>.json`.
//!
//! Import relies on parsing back exactly what export writes, so both directions share
//! one pattern per separator.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PLUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_-]+)\+(\d+)\+([A-Za-z0-9-]+)\.json$").expect("valid file pattern")
});

static UNDERSCORE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_-]+)_(\d+)_([A-Za-z0-9-]+)\.json$").expect("valid file pattern")
});

/// Separator between file name components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Separator {
    #[default]
    Plus,
    /// Legacy mode. Names may contain `_`; the snapshot and version parts never do.
    Underscore,
}

impl Separator {
    pub const fn as_char(&self) -> char {
        match self {
            Separator::Plus => '+',
            Separator::Underscore => '_',
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            Separator::Plus => &PLUS_PATTERN,
            Separator::Underscore => &UNDERSCORE_PATTERN,
        }
    }
}

/// Components of a versioned file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFile {
    pub name: String,
    pub snapshot_number: u64,
    pub version: String,
}

impl VersionFile {
    pub fn new(name: impl Into<String>, snapshot_number: u64, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            snapshot_number,
            version: version.into(),
        }
    }

    /// Formats the file name.
    pub fn file_name(&self, separator: Separator) -> String {
        let sep = separator.as_char();
        format!(
            "{}{sep}{}{sep}{}.json",
            self.name, self.snapshot_number, self.version
        )
    }

    /// Parses a file name, returning `None` when it does not follow the pattern.
    pub fn parse(file_name: &str, separator: Separator) -> Option<Self> {
        let captures = separator.pattern().captures(file_name)?;
        let snapshot_number = captures.get(2)?.as_str().parse().ok()?;
        Some(Self {
            name: captures.get(1)?.as_str().to_string(),
            snapshot_number,
            version: captures.get(3)?.as_str().to_string(),
        })
    }
}
