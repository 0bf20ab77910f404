//! Content-addressed object storage for arbor
//!
//! The object store is the physical substrate of the Merkle DAG: every blob,
//! tree and commit lives in it as one file whose name is the SHA-256 of its
//! own bytes.
//!
//! ## Layout
//!
//! ```text
//! .arbor/
//! └── objects/
//!     ├── 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
//!     └── ...
//! ```
//!
//! Objects are stored flat (no shard prefixes), so the store stays readable
//! by anything that understands the `objects/<hex-digest>` convention.
//!
//! ## Guarantees
//!
//! - **Write once**: [`ObjectStore::put`] never overwrites an existing object.
//!   Storing the same bytes twice returns the same digest and leaves the
//!   file untouched.
//! - **Atomic visibility**: new objects are written to a temp file in the
//!   objects directory and linked into place, so a reader never sees a
//!   half-written object.
//! - **No update or delete**: there is no API for either.
//!
//! The in-memory index only remembers which digests exist and how large
//! they are. It never caches bytes, so [`ObjectStore::get`] always reads the
//! disk and a tampered object is visible to the verifier immediately.

use crate::error::{ArborError, Result};
use crate::utils::{self, hash_data};
use dashmap::DashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, trace};

/// Content-addressed, write-once object store
///
/// Cloning is cheap; clones share the same index of known objects.
///
/// # Example
///
/// ```rust,no_run
/// use arbor::ObjectStore;
/// use std::path::PathBuf;
///
/// # fn example() -> arbor::Result<()> {
/// let store = ObjectStore::init(PathBuf::from(".arbor/objects"))?;
/// let digest = store.put(b"hello")?;
/// assert_eq!(store.get(&digest)?, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ObjectStore {
    /// Directory holding one file per object
    root: PathBuf,
    /// Digests known to exist, with their size in bytes
    known: Arc<DashMap<String, u64>>,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("root", &self.root)
            .field("known_objects", &self.known.len())
            .finish()
    }
}

impl ObjectStore {
    /// Create the objects directory (if needed) and return a store over it
    pub fn init(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        info!("Initialized object store at {:?}", root);
        Ok(Self::new(root))
    }

    /// Open an existing objects directory
    ///
    /// # Errors
    ///
    /// - [`ArborError::NotARepository`] if the directory does not exist
    pub fn open(root: PathBuf) -> Result<Self> {
        if !root.is_dir() {
            return Err(ArborError::NotARepository(root));
        }
        debug!("Opened object store at {:?}", root);
        Ok(Self::new(root))
    }

    fn new(root: PathBuf) -> Self {
        Self {
            root,
            known: Arc::new(DashMap::with_capacity(256)),
        }
    }

    /// Store `content` and return its digest
    ///
    /// If an object with the same digest already exists nothing is written.
    /// Two writers racing on the same content are harmless: both produce the
    /// same bytes and only the first link succeeds.
    pub fn put(&self, content: &[u8]) -> Result<String> {
        let digest = hash_data(content);

        if self.contains(&digest)? {
            trace!("Object {} already exists", utils::short_id(&digest));
            return Ok(digest);
        }

        let mut temp = NamedTempFile::new_in(&self.root)?;
        temp.write_all(content)?;
        temp.as_file().sync_all()?;

        match temp.persist_noclobber(self.object_path(&digest)) {
            Ok(_) => {
                trace!("Stored object {} ({} bytes)", utils::short_id(&digest), content.len());
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!("Object {} appeared concurrently", utils::short_id(&digest));
            }
            Err(e) => return Err(ArborError::Io(e.error)),
        }

        self.known.insert(digest.clone(), content.len() as u64);
        Ok(digest)
    }

    /// Load the raw bytes stored under `digest`
    ///
    /// # Errors
    ///
    /// - [`ArborError::ObjectNotFound`] if no such object exists, including
    ///   when `digest` is not a well-formed hex digest
    pub fn get(&self, digest: &str) -> Result<Vec<u8>> {
        if !utils::is_digest(digest) {
            return Err(ArborError::ObjectNotFound(digest.to_string()));
        }

        match fs::read(self.object_path(digest)) {
            Ok(content) => {
                trace!("Loaded object {} ({} bytes)", utils::short_id(digest), content.len());
                Ok(content)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.known.remove(digest);
                Err(ArborError::ObjectNotFound(digest.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check if an object exists
    pub fn contains(&self, digest: &str) -> Result<bool> {
        if !utils::is_digest(digest) {
            return Ok(false);
        }
        if self.known.contains_key(digest) {
            return Ok(true);
        }

        match fs::metadata(self.object_path(digest)) {
            Ok(meta) => {
                self.known.insert(digest.to_string(), meta.len());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List every stored digest, sorted
    ///
    /// Stray files (leftover temp files, anything not named like a digest)
    /// are ignored.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut digests = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if utils::is_digest(&name) && entry.file_type()?.is_file() {
                digests.push(name);
            }
        }
        digests.sort();
        Ok(digests)
    }

    /// Expand an abbreviated digest to the unique stored digest it names
    ///
    /// # Errors
    ///
    /// - [`ArborError::ObjectNotFound`] if nothing matches
    /// - [`ArborError::AmbiguousDigest`] if more than one object matches
    pub fn resolve_prefix(&self, prefix: &str) -> Result<String> {
        if utils::is_digest(prefix) {
            return if self.contains(prefix)? {
                Ok(prefix.to_string())
            } else {
                Err(ArborError::ObjectNotFound(prefix.to_string()))
            };
        }
        if !utils::is_digest_prefix(prefix) {
            return Err(ArborError::ObjectNotFound(prefix.to_string()));
        }

        let mut matches: Vec<String> = self
            .list()?
            .into_iter()
            .filter(|d| d.starts_with(prefix))
            .collect();

        match matches.len() {
            0 => Err(ArborError::ObjectNotFound(prefix.to_string())),
            1 => Ok(matches.swap_remove(0)),
            n => Err(ArborError::AmbiguousDigest {
                prefix: prefix.to_string(),
                matches: n,
            }),
        }
    }

    /// Count stored objects and their total size on disk
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for digest in self.list()? {
            stats.object_count += 1;
            stats.total_size += fs::metadata(self.object_path(&digest))?.len();
        }
        Ok(stats)
    }

    /// Path of the file holding `digest`
    pub fn object_path(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }

    /// Objects directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Object store statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of objects stored
    pub object_count: usize,
    /// Total size of all objects in bytes
    pub total_size: u64,
}
