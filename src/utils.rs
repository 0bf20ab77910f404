//! Utility functions for arbor
//!
//! Hashing, canonical encoding, atomic file replacement and path helpers
//! shared by the store, the tree builder and the repository facade.
//!
//! ## Digests
//!
//! Every object identifier is the lower-case hex SHA-256 of the object's
//! exact bytes ([`hash_data`]). [`is_digest`] validates the full form and
//! [`is_digest_prefix`] the abbreviated form accepted on the command line.
//!
//! ## Canonical encoding
//!
//! Trees and commits are stored as compact JSON with object keys in sorted
//! order ([`canonical_json`]). Two values with the same content therefore
//! always encode to the same bytes, and so to the same digest.

use crate::error::{ArborError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::trace;

/// Length of a full hex digest
pub const DIGEST_LEN: usize = 64;

/// Hash arbitrary data using SHA-256
///
/// Returns the digest as a 64-character lower-case hexadecimal string. This
/// is the identity function of the whole object store.
///
/// # Example
///
/// ```rust
/// use arbor::utils::hash_data;
///
/// let hash = hash_data(b"hello");
/// assert_eq!(hash, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
/// ```
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Check that `s` is a full lower-case hex digest
pub fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_LEN && is_digest_prefix(s)
}

/// Check that `s` is a non-empty lower-case hex string no longer than a digest
pub fn is_digest_prefix(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= DIGEST_LEN
        && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// First eight characters of a digest, for log lines and terse output
pub fn short_id(digest: &str) -> &str {
    &digest[..8.min(digest.len())]
}

/// Serialize `value` as compact JSON with sorted object keys
///
/// Routing through [`serde_json::Value`] sorts map keys (the default
/// `serde_json` map is ordered), independently of struct field order.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Atomic file write (write to temp file then rename)
///
/// The temporary file is created next to `path` so the final rename never
/// crosses a filesystem boundary. Readers observe either the old content or
/// the new content, never a partial write. The temp file is removed if any
/// step fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| ArborError::invalid_path(path, "no parent directory"))?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| ArborError::Io(e.error))?;

    trace!("Atomically wrote {:?} ({} bytes)", path, content.len());
    Ok(())
}

/// Read a JSON document, returning `None` if the file does not exist
pub fn read_json_opt<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a JSON document atomically, pretty-printed
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first. If that fails (different spelling of the
/// same directory, symlinked components) both paths are canonicalized and
/// the strip is retried.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| ArborError::invalid_path(path, format!("not inside {:?}", base)))
}

/// Lexically normalize a relative path into `/`-separated tree form
///
/// `.` segments are dropped and `..` pops the previous segment. Absolute
/// paths, prefixes, paths escaping the base and empty results are rejected.
/// Non UTF-8 segments are rejected because tree entry names are strings.
pub fn to_tree_path(path: &Path) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(ArborError::invalid_path(path, "escapes the work root"));
                }
            }
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| ArborError::invalid_path(path, "not valid UTF-8"))?;
                segments.push(part);
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ArborError::invalid_path(path, "must be relative"));
            }
        }
    }

    if segments.is_empty() {
        return Err(ArborError::invalid_path(path, "empty path"));
    }
    Ok(segments.join("/"))
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
