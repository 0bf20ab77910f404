//! Object model: blobs, trees and object classification
//!
//! Three kinds of object live in the store:
//!
//! - **Blob**: the raw bytes of one file. There is no wrapper type; a blob
//!   is exactly the `Vec<u8>` returned by the store.
//! - **Tree**: a directory listing, a sequence of [`TreeEntry`] sorted by
//!   name.
//! - **Commit**: a snapshot pointer, see [`crate::commit::Commit`].
//!
//! ## Tree encoding
//!
//! A tree is encoded as a compact JSON array with sorted keys:
//!
//! ```text
//! [{"hash":"<digest>","mode":"100644","name":"a.txt","type":"blob"},
//!  {"hash":"<digest>","mode":"40000","name":"src","type":"tree"}]
//! ```
//!
//! [`Tree::new`] sorts entries by name, so two trees holding the same
//! entries always encode to the same bytes regardless of insertion order.

use crate::commit::Commit;
use crate::error::{ArborError, Result};
use crate::utils::canonical_json;
use crate::REPO_DIR_NAME;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// File mode recorded for blob entries
pub const BLOB_MODE: &str = "100644";

/// File mode recorded for tree entries
pub const TREE_MODE: &str = "40000";

/// Kind of object a tree entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// File contents
    Blob,
    /// Sub-directory
    Tree,
    /// Any other `type` value found in a stored tree
    #[serde(other)]
    Unknown,
}

impl EntryKind {
    /// Mode string written for this kind
    pub fn mode(self) -> &'static str {
        match self {
            EntryKind::Blob => BLOB_MODE,
            EntryKind::Tree | EntryKind::Unknown => TREE_MODE,
        }
    }

    /// Name used in the encoding and in messages
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Blob => "blob",
            EntryKind::Tree => "tree",
            EntryKind::Unknown => "unknown",
        }
    }
}

/// One named entry of a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Single path segment
    pub name: String,
    /// Kind of the referenced object
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Digest of the referenced object
    #[serde(rename = "hash")]
    pub digest: String,
    /// Mode string, fixed per kind
    pub mode: String,
}

impl TreeEntry {
    /// Entry pointing at a blob
    pub fn blob(name: impl Into<String>, digest: impl Into<String>) -> Self {
        Self::new(name, EntryKind::Blob, digest)
    }

    /// Entry pointing at a sub-tree
    pub fn tree(name: impl Into<String>, digest: impl Into<String>) -> Self {
        Self::new(name, EntryKind::Tree, digest)
    }

    fn new(name: impl Into<String>, kind: EntryKind, digest: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            digest: digest.into(),
            mode: kind.mode().to_string(),
        }
    }

    /// Why this entry's name cannot be written below a directory, if it
    /// cannot
    ///
    /// A name must be a single non-empty path segment. The root tree of a
    /// commit may not contain the repository directory.
    pub fn name_problem(&self, at_root: bool) -> Option<&'static str> {
        let name = self.name.as_str();
        match name {
            "" => Some("empty name"),
            "." | ".." => Some("refers to a directory itself"),
            _ if name.contains(['/', '\\']) => Some("contains a path separator"),
            _ if name.contains('\0') => Some("contains a NUL byte"),
            _ if Path::new(name).is_absolute() || Path::new(name).has_root() => {
                Some("is an absolute path")
            }
            _ if at_root && name == REPO_DIR_NAME => Some("is the repository directory"),
            _ => None,
        }
    }
}

/// Directory listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree, sorting entries by name
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    /// Entries in stored order
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical encoding
    pub fn encode(&self) -> Result<Vec<u8>> {
        canonical_json(self)
    }

    /// Entries that cannot be materialized, with the reason for each
    ///
    /// Covers unsafe names (see [`TreeEntry::name_problem`]) and names that
    /// occur more than once.
    pub fn invalid_entries(&self, at_root: bool) -> Vec<(&TreeEntry, &'static str)> {
        let mut names = HashSet::new();
        let mut invalid = Vec::new();
        for entry in &self.entries {
            if let Some(problem) = entry.name_problem(at_root) {
                invalid.push((entry, problem));
            } else if !names.insert(entry.name.as_str()) {
                invalid.push((entry, "duplicate name"));
            }
        }
        invalid
    }

    /// Decode the tree stored under `digest`
    ///
    /// Entries are kept in stored order; a tampered tree is not re-sorted.
    pub fn decode(digest: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ArborError::decode(digest, e))
    }
}

/// A stored object classified by kind, as shown by `cat-file`
#[derive(Debug, Clone)]
pub enum ObjectView {
    /// Commit record
    Commit(Commit),
    /// Directory listing
    Tree(Tree),
    /// Raw file content
    Blob(Vec<u8>),
}

impl ObjectView {
    /// Classify raw object bytes
    ///
    /// Objects are untyped on disk, so the bytes are tried as a commit, then
    /// as a tree, and anything else is a blob. A file whose content happens
    /// to be a valid encoded tree (for example `[]`) is shown as a tree.
    pub fn classify(digest: &str, bytes: Vec<u8>) -> Self {
        if let Ok(commit) = Commit::decode(digest, &bytes) {
            return ObjectView::Commit(commit);
        }
        if let Ok(tree) = Tree::decode(digest, &bytes) {
            return ObjectView::Tree(tree);
        }
        ObjectView::Blob(bytes)
    }

    /// Kind name
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectView::Commit(_) => "commit",
            ObjectView::Tree(_) => "tree",
            ObjectView::Blob(_) => "blob",
        }
    }
}
