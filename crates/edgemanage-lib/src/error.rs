//! Error type shared by the store, decision engine and reconciler

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EdgeManageError>;

#[derive(Debug, Error)]
pub enum EdgeManageError {
    /// Unregistered edge or unknown segment
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Another process holds the reconcile lock
    #[error("lock {path:?} is held by another reconciliation")]
    LockUnavailable { path: PathBuf },

    /// Reading or writing a durable file failed
    #[error("persistence failure on {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A store file could not be encoded or decoded
    #[error("malformed store file {path:?}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Edge or segment name that cannot be used as a file name
    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },

    /// Sample with a non-finite value or timestamp
    #[error("invalid sample for edge {edge}: value {value}, timestamp {timestamp}")]
    InvalidSample {
        edge: String,
        value: f64,
        timestamp: f64,
    },

    /// Average requested on an edge with no samples
    #[error("no samples recorded for edge {edge}")]
    InsufficientData { edge: String },

    /// One or more segments failed during a reconcile pass
    #[error("reconcile failed for segments: {}", failed.join(", "))]
    PartialReconcileFailure { failed: Vec<String> },

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl EdgeManageError {
    pub(crate) fn edge_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "edge",
            name: name.into(),
        }
    }

    pub(crate) fn segment_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "segment",
            name: name.into(),
        }
    }

    /// Reject names that would escape their directory or be hidden from a
    /// listing of it
    pub(crate) fn check_name(kind: &'static str, name: &str) -> Result<()> {
        let invalid = name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(Self::InvalidName {
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Returns true for lock contention, which callers report rather than retry
    pub fn is_lock_unavailable(&self) -> bool {
        matches!(self, Self::LockUnavailable { .. })
    }
}
