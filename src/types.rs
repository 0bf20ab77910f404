//! Core data types shared across the arbor library
//!
//! ## Overview
//!
//! - **Configuration**: [`RepositoryConfig`], [`CheckoutOptions`]
//! - **Operation results**: [`CheckoutResult`], [`StageReport`], [`Status`]
//!
//! ## Examples
//!
//! ```rust
//! use arbor::types::CheckoutOptions;
//!
//! let options = CheckoutOptions {
//!     verify_hashes: true,
//! };
//! assert!(options.verify_hashes);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

/// Default lock wait in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Repository configuration, persisted as `.arbor/config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Version of the repository format
    pub format_version: u32,
    /// arbor version that created the repository
    pub arbor_version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Number of threads used to read and store files
    pub parallel_workers: usize,
    /// Whether checkout rehashes every object it reads
    pub verify_on_checkout: bool,
    /// How long to wait for the repository lock
    pub lock_timeout_ms: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            arbor_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            parallel_workers: num_cpus::get(),
            verify_on_checkout: false,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

/// Options for checkout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckoutOptions {
    /// Rehash every object before writing it out
    pub verify_hashes: bool,
}

/// Result of a checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResult {
    /// Commit that was materialized
    pub commit: String,
    /// Number of files written
    pub files_written: usize,
    /// Number of directories created or reused
    pub directories_created: usize,
    /// Total bytes written
    pub bytes_written: u64,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// A path that was not staged, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPath {
    /// Path as given by the caller
    pub path: PathBuf,
    /// Reason it was skipped
    pub reason: String,
}

/// Result of staging paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Newly staged paths, in tree form
    pub added: Vec<String>,
    /// Paths that were already staged
    pub already_staged: Vec<String>,
    /// Paths that could not be staged
    pub skipped: Vec<SkippedPath>,
}

impl StageReport {
    /// Record a skipped path
    pub fn skip(&mut self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.skipped.push(SkippedPath {
            path: path.into(),
            reason: reason.into(),
        });
    }
}

/// Snapshot of repository state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Current commit
    pub head: Option<String>,
    /// Staged paths, sorted
    pub staged: Vec<String>,
    /// Whether the staged files build the same tree as HEAD
    ///
    /// `None` when there is no HEAD, nothing is staged, or the comparison
    /// could not be made.
    pub head_tree_matches: Option<bool>,
}
