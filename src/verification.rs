//! Integrity verification
//!
//! The verifier recomputes the digest of every object reachable from a
//! commit and compares it with the name the object is stored under. Any
//! disagreement means the object was modified after it was written.
//!
//! ## Accumulate and continue
//!
//! Problems are recorded as [`Finding`]s and the audit keeps going, so one
//! run lists every problem it can reach. Only failures of the audit itself
//! (an unreadable objects directory, for instance) are returned as errors.
//!
//! ## What is checked
//!
//! For a commit:
//! - the commit object exists and hashes to its digest
//! - it decodes as a commit
//! - its tree is verified (see below)
//! - its parent is verified in turn; a parent seen earlier in the same walk
//!   is reported as a cycle and ends the walk
//!
//! For a tree:
//! - the tree object exists, hashes to its digest and decodes
//! - every blob entry exists and hashes to its digest
//! - every tree entry is verified the same way
//! - entries of unknown kind are reported
//! - entry names must be single path segments, unique within the tree, and
//!   the root tree may not contain the repository directory
//!
//! Traversal uses explicit work stacks and visits entries depth first in
//! stored order. Each top-level call starts from empty visited sets; within
//! one call a tree or blob is audited at most once, which also bounds the
//! walk if a tampered tree refers to itself.
//!
//! Verification never writes and ignores revocation status.

use crate::commit::Commit;
use crate::error::{ArborError, Result};
use crate::object::{EntryKind, Tree};
use crate::storage::ObjectStore;
use crate::utils::{self, hash_data};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Category of an integrity problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingKind {
    /// A referenced object is absent from the store
    MissingObject,
    /// Stored bytes hash to a different digest
    ContentMismatch,
    /// Stored bytes do not decode as the expected kind
    DecodeError,
    /// A tree entry has a kind other than blob or tree
    UnknownEntryKind,
    /// A tree entry name is not a single unique path segment
    InvalidEntryName,
    /// The parent chain loops back on itself
    CycleDetected,
}

/// One integrity problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Problem category
    pub kind: FindingKind,
    /// Digest of the offending object
    pub digest: String,
    /// Human-readable description
    pub message: String,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of auditing a commit or tree
///
/// # Examples
///
/// ```rust,no_run
/// # use arbor::Repository;
/// # fn example(repo: &Repository) -> arbor::Result<()> {
/// let report = repo.verify(None)?;
/// if !report.is_clean() {
///     for message in report.messages() {
///         eprintln!(" - {}", message);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Digest the audit started from
    pub commit: String,
    /// Problems found, in traversal order
    pub findings: Vec<Finding>,
    /// Number of objects read and rehashed
    pub objects_checked: usize,
    /// Time taken in milliseconds
    pub verification_time_ms: u64,
}

impl VerificationReport {
    /// Whether no problems were found
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Ordered human-readable messages, one per finding
    pub fn messages(&self) -> Vec<String> {
        self.findings.iter().map(|f| f.message.clone()).collect()
    }

    /// Whether any finding refers to `digest`
    pub fn mentions(&self, digest: &str) -> bool {
        self.findings.iter().any(|f| f.digest == digest)
    }
}

/// Result of rehashing the whole object store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreAuditReport {
    /// Number of stored objects
    pub objects_checked: usize,
    /// Objects whose bytes do not hash to their name
    pub corrupt: Vec<Finding>,
    /// Objects not reachable from HEAD, sorted
    pub orphans: Vec<String>,
    /// Time taken in milliseconds
    pub verification_time_ms: u64,
}

impl StoreAuditReport {
    /// Whether every stored object is intact
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty()
    }
}

/// Pending work in a tree audit
enum Pending {
    Tree { digest: String, root: bool },
    Blob { digest: String, tree: String },
    Unknown { name: String, tree: String },
}

/// Per-call audit state
struct Audit<'s> {
    store: &'s ObjectStore,
    findings: Vec<Finding>,
    objects_checked: usize,
    seen_trees: HashSet<String>,
    seen_blobs: HashSet<String>,
}

impl<'s> Audit<'s> {
    fn new(store: &'s ObjectStore) -> Self {
        Self {
            store,
            findings: Vec::new(),
            objects_checked: 0,
            seen_trees: HashSet::new(),
            seen_blobs: HashSet::new(),
        }
    }

    fn record(&mut self, kind: FindingKind, digest: &str, message: String) {
        debug!("Finding: {}", message);
        self.findings.push(Finding {
            kind,
            digest: digest.to_string(),
            message,
        });
    }

    /// Read an object, `None` if it is absent
    fn fetch(&mut self, digest: &str) -> Result<Option<Vec<u8>>> {
        match self.store.get(digest) {
            Ok(bytes) => {
                self.objects_checked += 1;
                Ok(Some(bytes))
            }
            Err(ArborError::ObjectNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Record a mismatch if `bytes` do not hash to `digest`
    fn check_hash(&mut self, label: &str, digest: &str, bytes: &[u8]) {
        let computed = hash_data(bytes);
        if computed != digest {
            self.record(
                FindingKind::ContentMismatch,
                digest,
                format!(
                    "{} object {} content mismatch (hash recomputed {})",
                    label, digest, computed
                ),
            );
        }
    }

    fn commit_chain(&mut self, start: &str) -> Result<()> {
        let mut visited = HashSet::from([start.to_string()]);
        let mut current = start.to_string();

        loop {
            let Some(bytes) = self.fetch(&current)? else {
                self.record(
                    FindingKind::MissingObject,
                    &current,
                    format!("Missing commit object {}", current),
                );
                break;
            };
            self.check_hash("Commit", &current, &bytes);

            let commit = match Commit::decode(&current, &bytes) {
                Ok(commit) => commit,
                Err(e) => {
                    self.record(
                        FindingKind::DecodeError,
                        &current,
                        format!("Commit object {} could not be decoded: {}", current, reason(&e)),
                    );
                    break;
                }
            };

            self.tree(&commit.tree)?;

            let Some(parent) = commit.parent else {
                break;
            };
            if !visited.insert(parent.clone()) {
                warn!("Cycle in commit parents at {}", utils::short_id(&parent));
                self.record(
                    FindingKind::CycleDetected,
                    &parent,
                    format!("Cycle detected in commit parents at {}", parent),
                );
                break;
            }
            current = parent;
        }
        Ok(())
    }

    fn tree(&mut self, root: &str) -> Result<()> {
        let mut stack = vec![Pending::Tree {
            digest: root.to_string(),
            root: true,
        }];

        while let Some(item) = stack.pop() {
            match item {
                Pending::Tree { digest, root } => {
                    if !self.seen_trees.insert(digest.clone()) {
                        continue;
                    }
                    let Some(bytes) = self.fetch(&digest)? else {
                        self.record(
                            FindingKind::MissingObject,
                            &digest,
                            format!("Missing tree object {}", digest),
                        );
                        continue;
                    };
                    self.check_hash("Tree", &digest, &bytes);

                    let tree = match Tree::decode(&digest, &bytes) {
                        Ok(tree) => tree,
                        Err(e) => {
                            self.record(
                                FindingKind::DecodeError,
                                &digest,
                                format!("Tree object {} could not be decoded: {}", digest, reason(&e)),
                            );
                            continue;
                        }
                    };

                    for (entry, problem) in tree.invalid_entries(root) {
                        self.record(
                            FindingKind::InvalidEntryName,
                            &digest,
                            format!(
                                "Invalid entry name {:?} in tree {}: {}",
                                entry.name, digest, problem
                            ),
                        );
                    }

                    // Reversed so entries pop in stored order
                    for entry in tree.entries().iter().rev() {
                        stack.push(match entry.kind {
                            EntryKind::Blob => Pending::Blob {
                                digest: entry.digest.clone(),
                                tree: digest.clone(),
                            },
                            EntryKind::Tree => Pending::Tree {
                                digest: entry.digest.clone(),
                                root: false,
                            },
                            EntryKind::Unknown => Pending::Unknown {
                                name: entry.name.clone(),
                                tree: digest.clone(),
                            },
                        });
                    }
                }
                Pending::Blob { digest, tree } => {
                    if !self.seen_blobs.insert(digest.clone()) {
                        continue;
                    }
                    match self.fetch(&digest)? {
                        Some(bytes) => self.check_hash("Blob", &digest, &bytes),
                        None => self.record(
                            FindingKind::MissingObject,
                            &digest,
                            format!("Missing blob object {} (referenced by tree {})", digest, tree),
                        ),
                    }
                }
                Pending::Unknown { name, tree } => {
                    self.record(
                        FindingKind::UnknownEntryKind,
                        &tree,
                        format!("Unknown entry type for {:?} in tree {}", name, tree),
                    );
                }
            }
        }
        Ok(())
    }

    fn into_report(self, commit: &str, start: Instant) -> VerificationReport {
        VerificationReport {
            commit: commit.to_string(),
            findings: self.findings,
            objects_checked: self.objects_checked,
            verification_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}

fn reason(e: &ArborError) -> String {
    match e {
        ArborError::DecodeError { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

/// Audits the object graph in a store
#[derive(Debug)]
pub struct Verifier<'a> {
    store: &'a ObjectStore,
}

impl<'a> Verifier<'a> {
    /// Verifier over `store`
    pub fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    /// Audit a commit, its tree and its whole parent chain
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself cannot be read. Integrity
    /// problems are reported in the result.
    pub fn verify_commit(&self, digest: &str) -> Result<VerificationReport> {
        let start = Instant::now();
        let mut audit = Audit::new(self.store);
        audit.commit_chain(digest)?;

        let report = audit.into_report(digest, start);
        info!(
            "Verified commit {}: {} objects, {} findings",
            utils::short_id(digest),
            report.objects_checked,
            report.findings.len()
        );
        Ok(report)
    }

    /// Audit a tree and everything below it
    pub fn verify_tree(&self, digest: &str) -> Result<VerificationReport> {
        let start = Instant::now();
        let mut audit = Audit::new(self.store);
        audit.tree(digest)?;
        Ok(audit.into_report(digest, start))
    }

    /// Rehash every stored object and list those unreachable from `head`
    pub fn audit_store(&self, head: Option<&str>) -> Result<StoreAuditReport> {
        let start = Instant::now();
        let mut audit = Audit::new(self.store);
        let digests = self.store.list()?;

        for digest in &digests {
            if let Some(bytes) = audit.fetch(digest)? {
                audit.check_hash("Stored", digest, &bytes);
            }
        }

        let reachable = match head {
            Some(head) => self.reachable(head)?,
            None => HashSet::new(),
        };
        let orphans: Vec<String> = digests
            .iter()
            .filter(|d| !reachable.contains(*d))
            .cloned()
            .collect();

        info!(
            "Audited {} stored objects: {} corrupt, {} unreachable",
            digests.len(),
            audit.findings.len(),
            orphans.len()
        );
        Ok(StoreAuditReport {
            objects_checked: audit.objects_checked,
            corrupt: audit.findings,
            orphans,
            verification_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Digests reachable from `head` through parents, trees and entries
    ///
    /// Objects that are missing or undecodable end their branch of the
    /// walk; they are still counted as reachable when referenced.
    pub fn reachable(&self, head: &str) -> Result<HashSet<String>> {
        let mut reachable = HashSet::new();
        let mut trees = Vec::new();
        let mut next = Some(head.to_string());

        while let Some(digest) = next.take() {
            if !reachable.insert(digest.clone()) {
                break;
            }
            match self.store.get(&digest) {
                Ok(bytes) => {
                    if let Ok(commit) = Commit::decode(&digest, &bytes) {
                        trees.push(commit.tree);
                        next = commit.parent;
                    }
                }
                Err(ArborError::ObjectNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        while let Some(digest) = trees.pop() {
            if !reachable.insert(digest.clone()) {
                continue;
            }
            let bytes = match self.store.get(&digest) {
                Ok(bytes) => bytes,
                Err(ArborError::ObjectNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let Ok(tree) = Tree::decode(&digest, &bytes) else {
                continue;
            };
            for entry in tree.entries() {
                match entry.kind {
                    EntryKind::Tree => trees.push(entry.digest.clone()),
                    EntryKind::Blob => {
                        reachable.insert(entry.digest.clone());
                    }
                    EntryKind::Unknown => {}
                }
            }
        }

        Ok(reachable)
    }
}
