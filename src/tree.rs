//! Tree construction from staged paths
//!
//! Staged paths are relative, `/`-separated strings such as `src/lib.rs`.
//! The builder turns a set of them into a graph of tree objects:
//!
//! 1. Every path is validated and split into directory segments and a leaf.
//! 2. Leaf files are read and stored as blobs, in parallel.
//! 3. The paths are assembled into a nested [`TreeNode`] map.
//! 4. The map is lowered bottom-up: each directory becomes a [`Tree`] whose
//!    children are stored first, and the root tree's digest is returned.
//!
//! Because directory maps are ordered and [`Tree::new`] sorts entries, the
//! root digest depends only on the set of paths and their contents, never
//! on the order in which they were staged.

use crate::error::{ArborError, Result};
use crate::object::{Tree, TreeEntry};
use crate::storage::ObjectStore;
use crate::utils;
use crate::REPO_DIR_NAME;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Node of the in-memory directory structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    /// File, by blob digest
    Blob(String),
    /// Directory, children keyed by name
    Directory(BTreeMap<String, TreeNode>),
}

/// Builds and stores tree objects for a set of staged paths
#[derive(Debug)]
pub struct TreeBuilder<'a> {
    store: &'a ObjectStore,
    work_root: &'a Path,
    workers: usize,
}

impl<'a> TreeBuilder<'a> {
    /// Builder reading files below `work_root` and storing into `store`
    pub fn new(store: &'a ObjectStore, work_root: &'a Path) -> Self {
        Self {
            store,
            work_root,
            workers: num_cpus::get(),
        }
    }

    /// Number of threads used to read and store files
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Build the tree graph for `paths` and return the root tree digest
    ///
    /// # Errors
    ///
    /// - [`ArborError::InvalidPath`] for absolute paths, `..` segments, paths
    ///   inside the repository directory, or a path that is both a file and
    ///   a directory of another path
    /// - [`ArborError::FileRead`] if a staged file cannot be read
    pub fn build<S: AsRef<str> + Sync>(&self, paths: &[S]) -> Result<String> {
        let split = paths
            .iter()
            .map(|p| split_path(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        // Shape check before touching the filesystem
        let mut root = BTreeMap::new();
        for (path, segments) in paths.iter().zip(&split) {
            insert(&mut root, path.as_ref(), segments, String::new())?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| ArborError::internal(format!("failed to build thread pool: {}", e)))?;

        let digests = pool.install(|| {
            paths
                .par_iter()
                .map(|p| self.store_file(p.as_ref()))
                .collect::<Result<Vec<_>>>()
        })?;

        for ((path, segments), digest) in paths.iter().zip(&split).zip(digests) {
            insert(&mut root, path.as_ref(), segments, digest)?;
        }

        let digest = lower(self.store, &root)?;
        debug!(
            "Built tree {} from {} paths",
            utils::short_id(&digest),
            paths.len()
        );
        Ok(digest)
    }

    fn store_file(&self, path: &str) -> Result<String> {
        let full_path = self.work_root.join(path);
        let content = fs::read(&full_path).map_err(|source| ArborError::FileRead {
            path: full_path.clone(),
            source,
        })?;
        let digest = self.store.put(&content)?;
        trace!("Stored {} as {}", path, utils::short_id(&digest));
        Ok(digest)
    }
}

/// Validate a staged path and split it into segments
fn split_path(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() {
        return Err(ArborError::invalid_path(path, "empty path"));
    }
    if path.starts_with('/') {
        return Err(ArborError::invalid_path(path, "must be relative"));
    }

    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments {
        match *segment {
            "" | "." => return Err(ArborError::invalid_path(path, "empty path segment")),
            ".." => return Err(ArborError::invalid_path(path, "contains '..'")),
            _ if segment.contains(['\\', '\0']) => {
                return Err(ArborError::invalid_path(path, "unsupported character in name"))
            }
            _ => {}
        }
    }
    if segments[0] == REPO_DIR_NAME {
        return Err(ArborError::invalid_path(
            path,
            "inside the repository directory",
        ));
    }
    Ok(segments)
}

fn conflict(path: &str) -> ArborError {
    ArborError::invalid_path(path, "is both a file and a directory")
}

/// Insert one file into the directory structure
fn insert(
    root: &mut BTreeMap<String, TreeNode>,
    path: &str,
    segments: &[&str],
    digest: String,
) -> Result<()> {
    let (leaf, dirs) = segments
        .split_last()
        .ok_or_else(|| ArborError::invalid_path(path, "empty path"))?;

    let mut current = root;
    for dir in dirs {
        let node = current
            .entry((*dir).to_string())
            .or_insert_with(|| TreeNode::Directory(BTreeMap::new()));
        current = match node {
            TreeNode::Directory(children) => children,
            TreeNode::Blob(_) => return Err(conflict(path)),
        };
    }

    if let Some(TreeNode::Directory(_)) = current.get(*leaf) {
        return Err(conflict(path));
    }
    current.insert((*leaf).to_string(), TreeNode::Blob(digest));
    Ok(())
}

/// Store `dir` and everything below it, returning the tree digest
///
/// Recursion depth is bounded by the depth of the staged paths.
fn lower(store: &ObjectStore, dir: &BTreeMap<String, TreeNode>) -> Result<String> {
    let mut entries = Vec::with_capacity(dir.len());
    for (name, node) in dir {
        match node {
            TreeNode::Blob(digest) => entries.push(TreeEntry::blob(name, digest)),
            TreeNode::Directory(children) => {
                let digest = lower(store, children)?;
                entries.push(TreeEntry::tree(name, digest));
            }
        }
    }
    store.put(&Tree::new(entries).encode()?)
}
