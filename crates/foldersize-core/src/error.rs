//! Error and issue types for scanning operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a whole scan call.
///
/// Only failures at the root of a scan surface here. Anything that goes wrong
/// deeper in a subtree is recorded as an [`AggregateIssue`] instead.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The requested path does not exist.
    #[error("Invalid path: {path}")]
    InvalidPath { path: PathBuf },

    /// The path exists but its contents cannot be listed.
    #[error("Unreadable path {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The path resolved to something that is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The scan was cancelled before it finished.
    #[error("Scan cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create a top-level error from an I/O failure on `path`.
    ///
    /// A missing path is an [`ScanError::InvalidPath`]; every other kind
    /// (permission denied included) makes the path unreadable.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::InvalidPath { path },
            _ => Self::Unreadable { path, source },
        }
    }
}

/// Errors that fail a single subtree aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AggregateError {
    /// Summed sizes no longer fit into 64 bits.
    #[error("Size overflow while aggregating {path}")]
    SizeOverflow { path: PathBuf },
}

/// Kind of non-fatal issue met while aggregating a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// Permission was denied.
    PermissionDenied,
    /// A directory could not be listed.
    ReadError,
    /// An entry could not be stat-ed.
    MetadataError,
    /// The entry leads back to a directory already on the current path.
    CycleDetected,
    /// The walk was stopped by its cancellation signal.
    Cancelled,
    /// The subtree size exceeded 64 bits.
    SizeOverflow,
}

/// Non-fatal issue recorded during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateIssue {
    /// Path where the issue occurred.
    pub path: PathBuf,
    /// Human-readable reason.
    pub reason: String,
    /// Kind of issue.
    pub kind: IssueKind,
}

impl AggregateIssue {
    /// Create a new issue.
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>, kind: IssueKind) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
            kind,
        }
    }

    /// Create an issue for a directory that could not be listed.
    pub fn read_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => IssueKind::PermissionDenied,
            _ => IssueKind::ReadError,
        };
        Self::new(path, format!("Read error: {error}"), kind)
    }

    /// Create an issue for an entry whose metadata could not be read.
    pub fn metadata_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => IssueKind::PermissionDenied,
            _ => IssueKind::MetadataError,
        };
        Self::new(path, format!("Metadata error: {error}"), kind)
    }

    /// Create a cycle issue for an entry that leads back to an ancestor.
    pub fn cycle(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            reason: format!("Cycle detected: {} leads back to an ancestor", path.display()),
            path,
            kind: IssueKind::CycleDetected,
        }
    }

    /// Create an issue marking where a walk was cancelled.
    pub fn cancelled(path: impl Into<PathBuf>) -> Self {
        Self::new(path, "Walk cancelled", IssueKind::Cancelled)
    }
}

impl From<AggregateError> for AggregateIssue {
    fn from(error: AggregateError) -> Self {
        match error {
            AggregateError::SizeOverflow { ref path } => {
                Self::new(path.clone(), error.to_string(), IssueKind::SizeOverflow)
            }
        }
    }
}
