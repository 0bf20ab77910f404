//! Materializing commits onto the filesystem
//!
//! Checkout writes every file of a commit's tree below a target directory.
//! It is gated by the revocation registry: a revoked commit is refused
//! before anything is read or written.
//!
//! Checkout only adds and overwrites. Files in the target that are not in
//! the tree are left alone, existing files are replaced without backup, and
//! a failure part way through leaves the files written so far in place.
//!
//! Every tree is checked before any of its entries is written. A name that
//! is not a single path segment, a duplicate name, or a root entry naming
//! the repository directory fails the checkout with a decode error, so a
//! stored tree can never write outside the target or over repository state.

use crate::commit::Commit;
use crate::error::{ArborError, Result};
use crate::object::{EntryKind, Tree};
use crate::revocation::RevocationRegistry;
use crate::storage::ObjectStore;
use crate::types::{CheckoutOptions, CheckoutResult};
use crate::utils::{self, hash_data};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// A tree waiting to be written, with the trees above it
struct Frame {
    digest: String,
    dir: PathBuf,
    ancestors: Vec<String>,
}

/// Writes commit trees to a target directory
#[derive(Debug)]
pub struct CheckoutEngine<'a> {
    store: &'a ObjectStore,
    options: CheckoutOptions,
}

impl<'a> CheckoutEngine<'a> {
    /// Engine reading from `store`
    pub fn new(store: &'a ObjectStore, options: CheckoutOptions) -> Self {
        Self { store, options }
    }

    /// Materialize `commit` below `target_root`
    ///
    /// Does not touch refs; the caller advances HEAD on success.
    ///
    /// # Errors
    ///
    /// - [`ArborError::RevokedCommit`] if the commit is revoked (nothing is
    ///   written)
    /// - [`ArborError::CommitNotFound`] if the commit object is absent
    /// - [`ArborError::ObjectNotFound`] or [`ArborError::DecodeError`] for a
    ///   missing or malformed tree or blob
    /// - [`ArborError::DecodeError`] if a tree has an entry name that is not
    ///   a single path segment, a duplicate name, or (at the root) the
    ///   repository directory
    /// - [`ArborError::CycleDetected`] if a tree contains one of its own
    ///   ancestors
    /// - [`ArborError::ContentMismatch`] if hash verification is enabled and
    ///   an object does not match its digest
    pub fn checkout(
        &self,
        revocations: &RevocationRegistry,
        commit_digest: &str,
        target_root: &Path,
    ) -> Result<CheckoutResult> {
        let start = Instant::now();

        if revocations.contains(commit_digest) {
            return Err(ArborError::RevokedCommit(commit_digest.to_string()));
        }

        let commit = Commit::load(self.store, commit_digest)?;
        if self.options.verify_hashes {
            self.check(commit_digest, &commit.encode()?)?;
        }

        let mut result = CheckoutResult {
            commit: commit_digest.to_string(),
            files_written: 0,
            directories_created: 0,
            bytes_written: 0,
            duration_ms: 0,
        };

        fs::create_dir_all(target_root)?;
        let mut stack = vec![Frame {
            digest: commit.tree,
            dir: target_root.to_path_buf(),
            ancestors: Vec::new(),
        }];

        while let Some(frame) = stack.pop() {
            let tree = self.load_tree(&frame.digest)?;
            let invalid = tree.invalid_entries(frame.ancestors.is_empty());
            if let Some((entry, problem)) = invalid.first() {
                warn!(
                    "Refusing tree {}: entry {:?} {}",
                    utils::short_id(&frame.digest),
                    entry.name,
                    problem
                );
                return Err(ArborError::decode(
                    &frame.digest,
                    format!("entry {:?} {}", entry.name, problem),
                ));
            }
            debug!(
                "Writing tree {} to {:?} ({} entries)",
                utils::short_id(&frame.digest),
                frame.dir,
                tree.len()
            );

            let mut ancestors = frame.ancestors;
            ancestors.push(frame.digest.clone());

            for entry in tree.entries().iter().rev() {
                let path = frame.dir.join(&entry.name);
                match entry.kind {
                    EntryKind::Blob => {
                        let content = self.read(&entry.digest)?;
                        if let Some(parent) = path.parent() {
                            fs::create_dir_all(parent)?;
                        }
                        fs::write(&path, &content)?;
                        trace!("Wrote {:?} ({} bytes)", path, content.len());
                        result.files_written += 1;
                        result.bytes_written += content.len() as u64;
                    }
                    EntryKind::Tree => {
                        if ancestors.contains(&entry.digest) {
                            return Err(ArborError::CycleDetected(entry.digest.clone()));
                        }
                        fs::create_dir_all(&path)?;
                        result.directories_created += 1;
                        stack.push(Frame {
                            digest: entry.digest.clone(),
                            dir: path,
                            ancestors: ancestors.clone(),
                        });
                    }
                    EntryKind::Unknown => {
                        return Err(ArborError::decode(
                            &frame.digest,
                            format!("unknown entry type for {:?}", entry.name),
                        ));
                    }
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Checked out {} in {}ms ({} files, {})",
            utils::short_id(commit_digest),
            result.duration_ms,
            result.files_written,
            utils::format_bytes(result.bytes_written)
        );
        Ok(result)
    }

    fn read(&self, digest: &str) -> Result<Vec<u8>> {
        let bytes = self.store.get(digest)?;
        if self.options.verify_hashes {
            self.check(digest, &bytes)?;
        }
        Ok(bytes)
    }

    fn load_tree(&self, digest: &str) -> Result<Tree> {
        let bytes = self.read(digest)?;
        Tree::decode(digest, &bytes)
    }

    fn check(&self, digest: &str, bytes: &[u8]) -> Result<()> {
        let actual = hash_data(bytes);
        if actual != digest {
            return Err(ArborError::ContentMismatch {
                expected: digest.to_string(),
                actual,
            });
        }
        Ok(())
    }
}
