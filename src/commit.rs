//! Commit objects and the parent chain
//!
//! A commit records a root tree, the previous HEAD as its parent, a message
//! and a creation time. Commits form a single-parent chain ending at the
//! first commit, whose parent is null.
//!
//! ## Encoding
//!
//! ```text
//! {"message":"init","parent":null,"revoked":false,"time":"2024-05-01T12:00:00Z","tree":"<digest>"}
//! ```
//!
//! The `revoked` field is always `false` when written. Revocation is tracked
//! separately in the revocation registry because a stored commit can never
//! change.

use crate::error::{ArborError, Result};
use crate::lock::RepoLock;
use crate::refs::Refs;
use crate::revocation::RevocationRegistry;
use crate::storage::ObjectStore;
use crate::utils::{self, canonical_json};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// A stored commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Root tree digest
    pub tree: String,
    /// Previous commit, `None` for the first commit
    pub parent: Option<String>,
    /// Commit message
    #[serde(default)]
    pub message: String,
    /// Creation time, whole seconds in UTC
    #[serde(with = "commit_time")]
    pub time: DateTime<Utc>,
    /// Revocation flag at creation time (always false)
    #[serde(default)]
    pub revoked: bool,
}

impl Commit {
    /// New commit stamped with the current time
    pub fn new(tree: String, parent: Option<String>, message: String) -> Self {
        Self {
            tree,
            parent,
            message,
            time: Utc::now().trunc_subsecs(0),
            revoked: false,
        }
    }

    /// Canonical encoding
    pub fn encode(&self) -> Result<Vec<u8>> {
        canonical_json(self)
    }

    /// Decode the commit stored under `digest`
    pub fn decode(digest: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ArborError::decode(digest, e))
    }

    /// Load and decode a commit from the store
    ///
    /// # Errors
    ///
    /// - [`ArborError::CommitNotFound`] if the object is absent
    /// - [`ArborError::DecodeError`] if the object is not a commit
    pub fn load(store: &ObjectStore, digest: &str) -> Result<Self> {
        let bytes = store.get(digest).map_err(|e| match e {
            ArborError::ObjectNotFound(d) => ArborError::CommitNotFound(d),
            other => other,
        })?;
        Self::decode(digest, &bytes)
    }
}

/// `YYYY-MM-DDTHH:MM:SSZ` timestamps
mod commit_time {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Record a commit of `tree` on top of HEAD and advance HEAD to it
///
/// Must be called with the repository lock held; the guard is taken as
/// proof. Returns the new commit's digest.
pub fn create_commit(
    store: &ObjectStore,
    refs_path: &Path,
    lock: &RepoLock,
    tree: &str,
    message: &str,
) -> Result<String> {
    let mut refs = Refs::load(refs_path)?;
    let commit = Commit::new(tree.to_string(), refs.head.clone(), message.to_string());
    let digest = store.put(&commit.encode()?)?;

    refs.head = Some(digest.clone());
    refs.persist(refs_path, lock)?;

    info!(
        "Created commit {} (tree {}, parent {:?})",
        utils::short_id(&digest),
        utils::short_id(tree),
        commit.parent.as_deref().map(utils::short_id)
    );
    Ok(digest)
}

/// One commit in the history
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Commit digest
    pub digest: String,
    /// Decoded commit
    pub commit: Commit,
    /// Whether the commit is currently revoked
    pub revoked: bool,
}

/// Why a history walk stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEnd {
    /// Reached a commit without a parent
    Root,
    /// A parent commit is not in the store
    MissingCommit(String),
    /// A parent object could not be decoded as a commit
    Undecodable {
        /// Digest of the object
        digest: String,
        /// Decoder message
        reason: String,
    },
    /// A parent was already visited in this walk
    Cycle(String),
}

/// Commit history, newest first
#[derive(Debug, Clone)]
pub struct History {
    /// Visited commits
    pub entries: Vec<LogEntry>,
    /// Terminal condition of the walk
    pub end: LogEnd,
}

/// Walk the parent chain starting at `start`
///
/// Problems along the chain end the walk and are reported in
/// [`History::end`] rather than failing.
pub fn log(store: &ObjectStore, revocations: &RevocationRegistry, start: &str) -> Result<History> {
    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(start.to_string());

    let end = loop {
        let Some(digest) = next.take() else {
            break LogEnd::Root;
        };
        if !visited.insert(digest.clone()) {
            warn!("History loops back to {}", utils::short_id(&digest));
            break LogEnd::Cycle(digest);
        }

        let commit = match Commit::load(store, &digest) {
            Ok(commit) => commit,
            Err(ArborError::CommitNotFound(d)) => break LogEnd::MissingCommit(d),
            Err(ArborError::DecodeError { digest, reason }) => {
                break LogEnd::Undecodable { digest, reason }
            }
            Err(e) => return Err(e),
        };

        next = commit.parent.clone();
        entries.push(LogEntry {
            revoked: revocations.contains(&digest),
            digest,
            commit,
        });
    };

    debug!("Walked {} commits, ended with {:?}", entries.len(), end);
    Ok(History { entries, end })
}
