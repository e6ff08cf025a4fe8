//! # Context Sources
//!
//! Where the scheduler gets its `UserContext` snapshots from. The real
//! aggregation layer (frailty metrics, hydration logs, goals, mood entries)
//! lives outside this crate; a source only has to hand back one snapshot per
//! user.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::UserContext;

/// Errors raised while loading snapshots.
#[derive(Debug, Error)]
pub enum ContextSourceError {
    /// The backing file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file is not a valid snapshot list.
    #[error("failed to parse {path}: {source}")]
    Json {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// One user's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    /// Recipient of any resulting nudge.
    pub user_id: String,
    /// The user's current data.
    #[serde(default)]
    pub context: UserContext,
}

/// A provider of snapshots for every user the scheduler should consider.
pub trait ContextSource: Send + Sync {
    /// Loads the current snapshots.
    fn snapshots(&self) -> Result<Vec<UserSnapshot>, ContextSourceError>;
}

/// Reads a JSON array of [`UserSnapshot`]s from disk on every call, so edits to
/// the file are picked up by the next scheduler tick.
///
/// Only an unreadable file or a top level that is not an array is an error.
/// Entries that do not parse as a snapshot are logged and skipped.
#[derive(Debug, Clone)]
pub struct JsonFileContextSource {
    path: PathBuf,
}

impl JsonFileContextSource {
    /// Creates a source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContextSource for JsonFileContextSource {
    fn snapshots(&self) -> Result<Vec<UserSnapshot>, ContextSourceError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| ContextSourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        let entries: Vec<serde_json::Value> =
            serde_json::from_str(&raw).map_err(|source| ContextSourceError::Json {
                path: self.path.clone(),
                source,
            })?;

        // A malformed entry only costs that one user their tick.
        let mut snapshots = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<UserSnapshot>(entry) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => log::warn!("Skipping snapshot #{} in {}: {}", index, self.path.display(), e),
            }
        }
        log::debug!("Loaded {} snapshot(s) from {}", snapshots.len(), self.path.display());
        Ok(snapshots)
    }
}

/// A fixed list of snapshots, handy for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticContextSource {
    snapshots: Vec<UserSnapshot>,
}

impl StaticContextSource {
    /// Wraps `snapshots`.
    pub fn new(snapshots: Vec<UserSnapshot>) -> Self {
        Self { snapshots }
    }
}

impl ContextSource for StaticContextSource {
    fn snapshots(&self) -> Result<Vec<UserSnapshot>, ContextSourceError> {
        Ok(self.snapshots.clone())
    }
}
