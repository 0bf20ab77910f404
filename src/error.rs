//! Error types for the arbor library
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Errors carry
//! the offending digest or path so that a caller can report exactly what
//! went wrong without additional context.
//!
//! The verifier is the one place where integrity problems are *not* raised
//! as errors: it collects them as findings in a
//! [`VerificationReport`](crate::verification::VerificationReport) so that a
//! single audit lists every problem it can reach.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the arbor library
pub type Result<T> = std::result::Result<T, ArborError>;

/// Main error type for all arbor operations
#[derive(Debug, Error)]
pub enum ArborError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization of repository state
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Object not found in the content-addressed store
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Recomputed digest disagrees with the key the object is stored under
    #[error("Content mismatch - expected: {expected}, actual: {actual}")]
    ContentMismatch {
        /// Digest the object is stored under
        expected: String,
        /// Digest of the bytes actually found
        actual: String,
    },

    /// Stored bytes are not valid for the expected object kind
    #[error("Object {digest} could not be decoded: {reason}")]
    DecodeError {
        /// Digest of the undecodable object
        digest: String,
        /// Decoder message
        reason: String,
    },

    /// A structural cycle was found while walking the object graph
    #[error("Cycle detected at {0}")]
    CycleDetected(String),

    /// Materialization was refused because the commit is revoked
    #[error("Commit {0} is revoked and cannot be checked out")]
    RevokedCommit(String),

    /// Commit was requested with nothing staged
    #[error("No files staged")]
    EmptyStagingArea,

    /// HEAD is absent
    #[error("No commits yet")]
    NoCommitsYet,

    /// Commit object is absent from the store
    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    /// The directory does not contain an initialized repository
    #[error("Not an arbor repository: {0:?}")]
    NotARepository(PathBuf),

    /// `init` on a directory that already holds a repository
    #[error("Repository already exists at {0:?}")]
    RepositoryAlreadyExists(PathBuf),

    /// An abbreviated digest matches more than one object
    #[error("Ambiguous object id {prefix}: {matches} objects match")]
    AmbiguousDigest {
        /// Prefix given by the caller
        prefix: String,
        /// Number of matching objects
        matches: usize,
    },

    /// A path cannot be represented in a tree
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The rejected path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// A staged file could not be read while building a tree
    #[error("Failed to read {path:?}: {source}")]
    FileRead {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Lock acquisition timeout
    #[error("Lock acquisition timeout: {0:?}")]
    LockTimeout(PathBuf),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArborError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        ArborError::Internal(msg.into())
    }

    /// Create a decode error for `digest`
    pub fn decode(digest: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ArborError::DecodeError {
            digest: digest.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ArborError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates corruption or tampering
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ArborError::ContentMismatch { .. }
                | ArborError::DecodeError { .. }
                | ArborError::CycleDetected(_)
        )
    }

    /// Check if retrying the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ArborError::LockTimeout(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            ArborError::NotARepository(path) => {
                format!("Not an arbor repository: {:?}. Run 'arbor init' first.", path)
            }
            ArborError::EmptyStagingArea => {
                "No files staged. Use 'arbor add <paths>' to stage files.".to_string()
            }
            ArborError::CommitNotFound(id) => {
                format!("Commit {} not found. Use 'arbor log' to see available commits.", id)
            }
            ArborError::AmbiguousDigest { prefix, matches } => {
                format!(
                    "Object id '{}' is ambiguous ({} matches). Use more characters.",
                    prefix, matches
                )
            }
            ArborError::LockTimeout(path) => {
                format!(
                    "Timed out waiting for lock {:?}. Another arbor command may be running. Try again later.",
                    path
                )
            }
            _ => self.to_string(),
        }
    }
}
