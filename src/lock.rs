//! Advisory repository lock
//!
//! Every read-modify-persist of the mutable repository files (`refs`,
//! `revoked`, `index`) happens while holding an exclusive advisory lock on
//! `.arbor/lock`. Object writes are idempotent and do not take the lock, and
//! neither does verification.

use crate::error::{ArborError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Interval between lock attempts while waiting
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// RAII guard for the exclusive repository lock
///
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Acquire the exclusive lock at `path`, waiting at most `timeout`
    ///
    /// # Errors
    ///
    /// - [`ArborError::LockTimeout`] if another holder keeps the lock longer
    ///   than `timeout`
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let start = Instant::now();
        while file.try_lock_exclusive().is_err() {
            if start.elapsed() >= timeout {
                warn!("Timed out after {:?} waiting for {:?}", start.elapsed(), path);
                return Err(ArborError::LockTimeout(path.to_path_buf()));
            }
            thread::sleep(RETRY_INTERVAL);
        }

        trace!("Acquired repository lock {:?}", path);
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        trace!("Released repository lock {:?}", self.path);
    }
}
