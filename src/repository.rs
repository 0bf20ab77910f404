//! Repository facade
//!
//! [`Repository`] ties the object store, refs, staging index, revocation
//! registry and configuration of one `.arbor` directory together and is the
//! entry point for every operation.
//!
//! ## Layout
//!
//! ```text
//! <work-root>/
//! └── .arbor/
//!     ├── objects/<digest>   one file per object
//!     ├── refs               {"HEAD": digest | null}
//!     ├── revoked            ["<digest>", ...]
//!     ├── index              ["path/one", "path/two", ...]
//!     ├── config.json        RepositoryConfig
//!     └── lock               advisory lock file
//! ```
//!
//! Refs, the index and the revocation list are read at the start of each
//! operation and written back at its end while holding the repository lock.
//! A `Repository` value holds no copy of them between calls.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use arbor::Repository;
//!
//! # fn main() -> arbor::Result<()> {
//! let repo = Repository::init("./project")?;
//! repo.stage(&["src", "README.md"])?;
//! let commit = repo.commit("first snapshot")?;
//!
//! let report = repo.verify(None)?;
//! assert!(report.is_clean());
//!
//! repo.checkout(Some(&commit))?;
//! # Ok(())
//! # }
//! ```

use crate::checkout::CheckoutEngine;
use crate::commit::{self, Commit, History};
use crate::error::{ArborError, Result};
use crate::lock::RepoLock;
use crate::object::ObjectView;
use crate::refs::Refs;
use crate::revocation::{RevocationRegistry, RevokeOutcome};
use crate::staging::StagingIndex;
use crate::storage::{ObjectStore, StoreStats};
use crate::tree::TreeBuilder;
use crate::types::*;
use crate::utils;
use crate::verification::{StoreAuditReport, VerificationReport, Verifier};
use crate::REPO_DIR_NAME;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const OBJECTS_DIR: &str = "objects";
const REFS_FILE: &str = "refs";
const REVOKED_FILE: &str = "revoked";
const INDEX_FILE: &str = "index";
const CONFIG_FILE: &str = "config.json";
const LOCK_FILE: &str = "lock";

/// An opened arbor repository
#[derive(Debug, Clone)]
pub struct Repository {
    /// Directory whose files are staged and checked out
    work_root: PathBuf,
    /// `<work_root>/.arbor`
    repo_dir: PathBuf,
    /// Object store
    store: ObjectStore,
    /// Configuration
    config: RepositoryConfig,
}

impl Repository {
    /// Create a repository in `work_root` with default configuration
    ///
    /// # Errors
    ///
    /// - [`ArborError::RepositoryAlreadyExists`] if `work_root` already
    ///   contains a repository
    pub fn init(work_root: impl AsRef<Path>) -> Result<Self> {
        RepositoryBuilder::new().init(work_root)
    }

    /// Open the repository in `work_root`
    ///
    /// A missing or unreadable `config.json` is replaced by defaults.
    ///
    /// # Errors
    ///
    /// - [`ArborError::NotARepository`] if there is no `.arbor` directory
    #[instrument(skip_all)]
    pub fn open(work_root: impl AsRef<Path>) -> Result<Self> {
        let work_root = work_root.as_ref();
        let work_root = work_root
            .canonicalize()
            .map_err(|_| ArborError::NotARepository(work_root.to_path_buf()))?;
        let repo_dir = work_root.join(REPO_DIR_NAME);
        if !repo_dir.is_dir() {
            return Err(ArborError::NotARepository(work_root));
        }

        let store = ObjectStore::open(repo_dir.join(OBJECTS_DIR))
            .map_err(|_| ArborError::NotARepository(work_root.clone()))?;

        let config_path = repo_dir.join(CONFIG_FILE);
        let config = match utils::read_json_opt::<RepositoryConfig>(&config_path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                warn!("No {} found, using default configuration", CONFIG_FILE);
                RepositoryConfig::default()
            }
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", CONFIG_FILE, e);
                RepositoryConfig::default()
            }
        };

        debug!("Opened repository at {:?}", work_root);
        Ok(Self {
            work_root,
            repo_dir,
            store,
            config,
        })
    }

    /// Directory whose files are staged and checked out
    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// The `.arbor` directory
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Object store
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Configuration
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn path(&self, name: &str) -> PathBuf {
        self.repo_dir.join(name)
    }

    fn lock(&self) -> Result<RepoLock> {
        RepoLock::acquire(
            &self.path(LOCK_FILE),
            Duration::from_millis(self.config.lock_timeout_ms),
        )
    }

    /// Stage files and directories for the next commit
    ///
    /// Per-path problems are returned in [`StageReport::skipped`].
    #[instrument(skip_all, fields(count = paths.len()))]
    pub fn stage<P: AsRef<Path>>(&self, paths: &[P]) -> Result<StageReport> {
        let lock = self.lock()?;
        let index_path = self.path(INDEX_FILE);

        let mut index = StagingIndex::load(&index_path)?;
        let report = index.stage(&self.work_root, paths);
        if !report.added.is_empty() {
            index.persist(&index_path, &lock)?;
        }

        info!("Staged {} new paths", report.added.len());
        Ok(report)
    }

    /// Staged paths, sorted
    pub fn staged(&self) -> Result<Vec<String>> {
        Ok(StagingIndex::load(&self.path(INDEX_FILE))?.paths())
    }

    /// Unstage everything, returning how many paths were staged
    #[instrument(skip(self))]
    pub fn clear_staging(&self) -> Result<usize> {
        let lock = self.lock()?;
        let index_path = self.path(INDEX_FILE);

        let mut index = StagingIndex::load(&index_path)?;
        let count = index.len();
        index.clear();
        index.persist(&index_path, &lock)?;

        info!("Cleared {} staged paths", count);
        Ok(count)
    }

    /// Snapshot the staged files and advance HEAD
    ///
    /// The staging index is left as it is.
    ///
    /// # Errors
    ///
    /// - [`ArborError::EmptyStagingArea`] if nothing is staged
    /// - [`ArborError::FileRead`] if a staged file cannot be read
    #[instrument(skip(self))]
    pub fn commit(&self, message: &str) -> Result<String> {
        let lock = self.lock()?;

        let index = StagingIndex::load(&self.path(INDEX_FILE))?;
        if index.is_empty() {
            return Err(ArborError::EmptyStagingArea);
        }

        let tree = self.tree_builder().build(&index.paths())?;
        commit::create_commit(&self.store, &self.path(REFS_FILE), &lock, &tree, message)
    }

    fn tree_builder(&self) -> TreeBuilder<'_> {
        TreeBuilder::new(&self.store, &self.work_root).with_workers(self.config.parallel_workers)
    }

    /// Current HEAD
    pub fn head(&self) -> Result<Option<String>> {
        Ok(Refs::load(&self.path(REFS_FILE))?.head)
    }

    /// History from HEAD, newest first
    ///
    /// # Errors
    ///
    /// - [`ArborError::NoCommitsYet`] if HEAD is absent
    #[instrument(skip(self))]
    pub fn log(&self) -> Result<History> {
        let head = self.head()?.ok_or(ArborError::NoCommitsYet)?;
        commit::log(&self.store, &self.revocations()?, &head)
    }

    /// HEAD, staged paths and whether the staged files match HEAD's tree
    ///
    /// The comparison builds the staged tree, which stores any new blobs
    /// and trees it produces.
    #[instrument(skip(self))]
    pub fn status(&self) -> Result<Status> {
        let head = self.head()?;
        let staged = self.staged()?;

        let head_tree_matches = match &head {
            Some(head) if !staged.is_empty() => {
                let compared = Commit::load(&self.store, head)
                    .and_then(|commit| Ok(self.tree_builder().build(&staged)? == commit.tree));
                match compared {
                    Ok(matches) => Some(matches),
                    Err(e) => {
                        warn!("Could not compare staged files to HEAD: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(Status {
            head,
            staged,
            head_tree_matches,
        })
    }

    /// Resolve a commit argument to a full digest
    ///
    /// `None` and `HEAD` (any case) mean the current HEAD. Abbreviated
    /// digests are expanded when they are unique.
    pub fn resolve_commit(&self, target: Option<&str>) -> Result<String> {
        match target {
            None => self.head()?.ok_or(ArborError::NoCommitsYet),
            Some(t) if t.eq_ignore_ascii_case("head") => {
                self.head()?.ok_or(ArborError::NoCommitsYet)
            }
            Some(t) if utils::is_digest(t) => Ok(t.to_string()),
            Some(t) => self.store.resolve_prefix(t).map_err(|e| match e {
                ArborError::ObjectNotFound(id) => ArborError::CommitNotFound(id),
                other => other,
            }),
        }
    }

    /// Materialize a commit into the work root and move HEAD to it
    pub fn checkout(&self, target: Option<&str>) -> Result<CheckoutResult> {
        let options = CheckoutOptions {
            verify_hashes: self.config.verify_on_checkout,
        };
        self.checkout_with_options(target, options)
    }

    /// Materialize a commit with explicit options
    ///
    /// HEAD only moves if every file was written. Files written before a
    /// failure are left in place.
    ///
    /// # Errors
    ///
    /// - [`ArborError::NoCommitsYet`] if the target is HEAD and HEAD is absent
    /// - [`ArborError::RevokedCommit`] if the commit is revoked
    /// - [`ArborError::CommitNotFound`] if the commit does not exist
    #[instrument(skip(self))]
    pub fn checkout_with_options(
        &self,
        target: Option<&str>,
        options: CheckoutOptions,
    ) -> Result<CheckoutResult> {
        let digest = self.resolve_commit(target)?;
        let lock = self.lock()?;
        let revocations = self.revocations()?;

        let result = CheckoutEngine::new(&self.store, options).checkout(
            &revocations,
            &digest,
            &self.work_root,
        )?;

        let refs_path = self.path(REFS_FILE);
        let mut refs = Refs::load(&refs_path)?;
        refs.head = Some(digest);
        refs.persist(&refs_path, &lock)?;
        Ok(result)
    }

    /// Audit a commit (HEAD by default) and its whole history
    ///
    /// Read-only and independent of revocation.
    #[instrument(skip(self))]
    pub fn verify(&self, target: Option<&str>) -> Result<VerificationReport> {
        let digest = self.resolve_commit(target)?;
        Verifier::new(&self.store).verify_commit(&digest)
    }

    /// Rehash every stored object and list objects unreachable from HEAD
    #[instrument(skip(self))]
    pub fn verify_store(&self) -> Result<StoreAuditReport> {
        let head = self.head()?;
        Verifier::new(&self.store).audit_store(head.as_deref())
    }

    /// Mark a commit as revoked
    ///
    /// Returns the full digest and whether it was newly revoked.
    ///
    /// # Errors
    ///
    /// Returns [`ArborError::CommitNotFound`] if there is no such object.
    /// The object is not decoded, so a tampered commit can still be revoked.
    #[instrument(skip(self))]
    pub fn revoke(&self, target: &str) -> Result<(String, RevokeOutcome)> {
        let digest = self.resolve_commit(Some(target))?;
        let lock = self.lock()?;
        let path = self.path(REVOKED_FILE);

        let mut registry = RevocationRegistry::load(&path)?;
        let outcome = registry.revoke(&self.store, &digest)?;
        if outcome == RevokeOutcome::Revoked {
            registry.persist(&path, &lock)?;
        }
        Ok((digest, outcome))
    }

    /// Whether a commit is revoked
    pub fn is_revoked(&self, digest: &str) -> Result<bool> {
        Ok(self.revocations()?.contains(digest))
    }

    /// Current revocation registry
    pub fn revocations(&self) -> Result<RevocationRegistry> {
        RevocationRegistry::load(&self.path(REVOKED_FILE))
    }

    /// Load and classify any object by full or abbreviated digest
    pub fn cat_file(&self, id: &str) -> Result<(String, ObjectView)> {
        let digest = self.store.resolve_prefix(id)?;
        let bytes = self.store.get(&digest)?;
        let view = ObjectView::classify(&digest, bytes);
        Ok((digest, view))
    }

    /// Object store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }
}

/// Builder for new repositories
///
/// # Examples
///
/// ```rust,no_run
/// use arbor::RepositoryBuilder;
///
/// # fn main() -> arbor::Result<()> {
/// let repo = RepositoryBuilder::new()
///     .parallel_workers(4)
///     .verify_on_checkout(true)
///     .init("./project")?;
/// # Ok(())
/// # }
/// ```
///
/// # Default Values
///
/// - `parallel_workers`: number of CPU cores
/// - `verify_on_checkout`: false
/// - `lock_timeout_ms`: 5000
#[derive(Debug, Clone)]
pub struct RepositoryBuilder {
    parallel_workers: usize,
    verify_on_checkout: bool,
    lock_timeout_ms: u64,
}

impl RepositoryBuilder {
    /// Builder with default settings
    pub fn new() -> Self {
        Self {
            parallel_workers: num_cpus::get(),
            verify_on_checkout: false,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// Threads used to read and store files (minimum 1)
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.parallel_workers = count.max(1);
        self
    }

    /// Rehash every object read during checkout
    pub fn verify_on_checkout(mut self, verify: bool) -> Self {
        self.verify_on_checkout = verify;
        self
    }

    /// Maximum wait for the repository lock
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Create the repository in `work_root`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// - [`ArborError::RepositoryAlreadyExists`] if `work_root` already
    ///   contains a `.arbor` directory
    #[instrument(skip_all)]
    pub fn init(self, work_root: impl AsRef<Path>) -> Result<Repository> {
        let work_root = work_root.as_ref();
        fs::create_dir_all(work_root)?;
        let work_root = work_root.canonicalize()?;
        let repo_dir = work_root.join(REPO_DIR_NAME);

        if repo_dir.exists() {
            return Err(ArborError::RepositoryAlreadyExists(repo_dir));
        }

        fs::create_dir_all(&repo_dir)?;
        let store = ObjectStore::init(repo_dir.join(OBJECTS_DIR))?;
        let config = RepositoryConfig {
            parallel_workers: self.parallel_workers,
            verify_on_checkout: self.verify_on_checkout,
            lock_timeout_ms: self.lock_timeout_ms,
            ..RepositoryConfig::default()
        };

        let repo = Repository {
            work_root,
            repo_dir,
            store,
            config,
        };

        let lock = repo.lock()?;
        Refs::default().persist(&repo.path(REFS_FILE), &lock)?;
        RevocationRegistry::default().persist(&repo.path(REVOKED_FILE), &lock)?;
        StagingIndex::default().persist(&repo.path(INDEX_FILE), &lock)?;
        utils::write_json(&repo.path(CONFIG_FILE), &repo.config)?;
        drop(lock);

        info!("Initialized empty arbor repository in {:?}", repo.repo_dir);
        Ok(repo)
    }
}

impl Default for RepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
