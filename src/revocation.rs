//! Revocation registry
//!
//! An append-only set of commit digests that must never be materialized
//! again. Revocation is a trust decision layered on top of the immutable
//! object graph: revoked commits stay in the store, remain verifiable and
//! keep appearing in the history (flagged), but checkout refuses them.

use crate::error::{ArborError, Result};
use crate::lock::RepoLock;
use crate::storage::ObjectStore;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Result of a revoke request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// The commit was added to the registry
    Revoked,
    /// The commit was already in the registry; nothing changed
    AlreadyRevoked,
}

/// Contents of `.arbor/revoked`, in revocation order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevocationRegistry {
    revoked: Vec<String>,
}

impl RevocationRegistry {
    /// Load the registry, treating a missing file as empty
    pub fn load(path: &Path) -> Result<Self> {
        Ok(utils::read_json_opt(path)?.unwrap_or_default())
    }

    /// Replace the registry file atomically
    pub fn persist(&self, path: &Path, _lock: &RepoLock) -> Result<()> {
        utils::write_json(path, self)?;
        debug!("Persisted {} revoked commits", self.revoked.len());
        Ok(())
    }

    /// Whether `digest` is revoked
    pub fn contains(&self, digest: &str) -> bool {
        self.revoked.iter().any(|d| d == digest)
    }

    /// Revoked digests in revocation order
    pub fn digests(&self) -> &[String] {
        &self.revoked
    }

    /// Number of revoked commits
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    /// Whether nothing is revoked
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }

    /// Add `digest` to the registry
    ///
    /// The object only has to exist; its bytes are not read, so a commit
    /// that no longer decodes can still be revoked. Revoking an already
    /// revoked commit is not an error. The caller persists the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ArborError::CommitNotFound`] if there is no such object.
    pub fn revoke(&mut self, store: &ObjectStore, digest: &str) -> Result<RevokeOutcome> {
        if !store.contains(digest)? {
            return Err(ArborError::CommitNotFound(digest.to_string()));
        }

        if self.contains(digest) {
            debug!("Commit {} already revoked", utils::short_id(digest));
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        self.revoked.push(digest.to_string());
        info!("Revoked commit {}", utils::short_id(digest));
        Ok(RevokeOutcome::Revoked)
    }
}
