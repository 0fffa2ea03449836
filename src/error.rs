//! Error types for the snaplink library
//!
//! This module defines all error types that can occur during backup,
//! indexing, rehardlink and verify operations. The variants follow the
//! engine's error taxonomy: precondition failures are fatal and abort
//! before any work, per-file failures are recoverable and counted, index
//! integrity problems degrade to warnings, and exhausted transient
//! retries escalate back to fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the snaplink library
pub type Result<T> = std::result::Result<T, SnaplinkError>;

/// Main error type for all snaplink operations
#[derive(Debug, Error)]
pub enum SnaplinkError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during sidecar serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A fingerprint string failed to parse
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// A glob pattern failed to compile or was rejected
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern text
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid arguments or mode conflict on the command line
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Today's snapshot directory already exists and deletion was not requested
    #[error("Snapshot directory already exists: {0:?} (pass --delete-existing to replace it)")]
    SnapshotExists(PathBuf),

    /// A sidecar file could not be read or parsed
    #[error("Sidecar {path:?} is unreadable: {reason}")]
    SidecarUnreadable {
        /// Path to the sidecar file
        path: PathBuf,
        /// Why it could not be imported
        reason: String,
    },

    /// Opening or reading a source file failed
    #[error("Source unreadable: {path:?}: {source}")]
    SourceUnreadable {
        /// Path that failed to open
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Copying or linking into the destination failed
    #[error("Destination unwritable: {path:?}: {source}")]
    DestinationUnwritable {
        /// Destination path that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Path shortening failed; the file must be skipped
    #[error("Path too long and could not be shortened: {0:?}")]
    PathTooLong(PathBuf),

    /// The rehardlink delete+link pair kept failing after bounded retries
    #[error("Transient failure persisted after {attempts} attempts: {path:?}")]
    TransientExhausted {
        /// Path being relinked
        path: PathBuf,
        /// Number of attempts made
        attempts: u32,
    },

    /// Run was cancelled between files
    #[error("Run cancelled")]
    Cancelled,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnaplinkError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SnaplinkError::Internal(msg.into())
    }

    /// Create an invalid-arguments error with a custom message
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        SnaplinkError::InvalidArguments(msg.into())
    }

    /// Check whether this error must abort the whole run
    ///
    /// Precondition failures and exhausted transient retries are fatal;
    /// everything else is handled per-file by the orchestrator, which logs
    /// the error, counts the file as failed and moves on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SnaplinkError::InvalidArguments(_)
                | SnaplinkError::SnapshotExists(_)
                | SnaplinkError::InvalidPattern { .. }
                | SnaplinkError::TransientExhausted { .. }
                | SnaplinkError::Cancelled
        )
    }

    /// Check whether this error is recoverable at the per-file level
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SnaplinkError::Io(_)
                | SnaplinkError::SourceUnreadable { .. }
                | SnaplinkError::DestinationUnwritable { .. }
                | SnaplinkError::PathTooLong(_)
        )
    }

    /// Process exit code for this error
    ///
    /// `1` is reserved for "snapshot directory already exists", matching
    /// the documented contract; every other fatal error exits `2`.
    pub fn exit_code(&self) -> i32 {
        match self {
            SnaplinkError::SnapshotExists(_) => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SnaplinkError::InvalidFingerprint("zz".to_string());
        assert_eq!(err.to_string(), "Invalid fingerprint: zz");
    }

    #[test]
    fn test_error_fatality() {
        assert!(SnaplinkError::SnapshotExists(PathBuf::from("/b/2024-01-01")).is_fatal());
        assert!(SnaplinkError::invalid_arguments("no mode").is_fatal());
        assert!(!SnaplinkError::PathTooLong(PathBuf::from("/x")).is_fatal());
        assert!(SnaplinkError::PathTooLong(PathBuf::from("/x")).is_recoverable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            SnaplinkError::SnapshotExists(PathBuf::from("/b/2024-01-01")).exit_code(),
            1
        );
        assert_eq!(SnaplinkError::internal("boom").exit_code(), 2);
    }
}
