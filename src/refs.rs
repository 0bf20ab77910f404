//! Named references
//!
//! The only reference is `HEAD`, the digest of the most recent commit (or
//! the commit last checked out). Refs are read at the start of an operation
//! and written back at its end; nothing holds them between operations.

use crate::error::Result;
use crate::lock::RepoLock;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Contents of `.arbor/refs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refs {
    /// Current commit, absent until the first commit
    #[serde(rename = "HEAD", default)]
    pub head: Option<String>,
}

impl Refs {
    /// Load refs, treating a missing file as "no commits yet"
    pub fn load(path: &Path) -> Result<Self> {
        Ok(utils::read_json_opt(path)?.unwrap_or_default())
    }

    /// Replace the refs file atomically
    ///
    /// Takes the repository lock guard to tie the write to a held lock.
    pub fn persist(&self, path: &Path, _lock: &RepoLock) -> Result<()> {
        utils::write_json(path, self)?;
        debug!("HEAD is now {:?}", self.head);
        Ok(())
    }
}
