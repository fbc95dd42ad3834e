//! JSON Summaries
//!
//! Summaries are stored as pretty-printed JSON so they can be committed as
//! baselines and diffed later.

use crate::report::{SCHEMA_VERSION, Summary};
use std::path::Path;
use thiserror::Error;

/// Failure reading or writing a summary file
#[derive(Debug, Error)]
pub enum ReportError {
    /// Filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Malformed JSON or a shape mismatch
    #[error("invalid summary JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Written by an incompatible version
    #[error("unsupported summary schema version {found} (expected {expected})")]
    SchemaVersion {
        /// Version in the file
        found: u32,
        /// Version this build reads
        expected: u32,
    },
}

impl Summary {
    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a summary, rejecting other schema versions
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let summary: Summary = serde_json::from_str(json)?;
        if summary.meta.schema_version != SCHEMA_VERSION {
            return Err(ReportError::SchemaVersion {
                found: summary.meta.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(summary)
    }

    /// Write to `path`, creating parent directories
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let io_err = |source| ReportError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_json()?).map_err(io_err)
    }

    /// Read a summary written by [`Summary::save_json`]
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}
