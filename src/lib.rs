//! # arbor - content-addressed snapshots with tamper detection
//!
//! A minimal version-control storage engine. Snapshots of a file tree are
//! stored as a Merkle DAG of SHA-256 addressed objects, can be audited for
//! tampering at any time, and can be restored unless they were revoked.
//!
//! ## Overview
//!
//! - Record snapshots (commits) of staged files
//! - Restore any past snapshot into the work tree
//! - Detect modified, missing or malformed objects by recomputing digests
//! - Revoke commits so they can never be checked out again
//!
//! ## Architecture
//!
//! - **Object store** ([`storage`]): write-once files named by the SHA-256 of
//!   their bytes. Identical content is stored once.
//! - **Trees** ([`object`], [`tree`]): directory listings sorted by name and
//!   canonically encoded, so identical directories hash identically.
//! - **Commits** ([`commit`], [`refs`]): root tree plus parent, forming a
//!   single chain that ends at `HEAD`.
//! - **Verification** ([`verification`]): walks a commit's history and
//!   rehashes every reachable object, collecting all problems found.
//! - **Revocation** ([`revocation`]): an append-only list of commits that
//!   checkout refuses.
//! - **Checkout** ([`checkout`]): writes a commit's files into the work tree.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arbor::Repository;
//!
//! # fn main() -> arbor::Result<()> {
//! let repo = Repository::init("./my_project")?;
//!
//! let report = repo.stage(&["src"])?;
//! println!("Staged {} files", report.added.len());
//!
//! let first = repo.commit("Initial state")?;
//!
//! // Edit files, snapshot again
//! let second = repo.commit("Second state")?;
//!
//! // Tamper check of the whole history
//! let report = repo.verify(None)?;
//! for message in report.messages() {
//!     eprintln!("{}", message);
//! }
//!
//! // Block the second snapshot and go back to the first
//! repo.revoke(&second)?;
//! repo.checkout(Some(&first))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] with [`ArborError`]. Verification
//! is the exception: integrity problems are findings in a
//! [`VerificationReport`], not errors.

pub mod checkout;
pub mod commit;
pub mod error;
pub mod lock;
pub mod object;
pub mod refs;
pub mod repository;
pub mod revocation;
pub mod staging;
pub mod storage;
pub mod tree;
pub mod types;
pub mod utils;
pub mod verification;

/// Name of the repository directory inside the work root
pub const REPO_DIR_NAME: &str = ".arbor";

pub use checkout::CheckoutEngine;
pub use commit::{Commit, History, LogEnd, LogEntry};
pub use error::{ArborError, Result};
pub use object::{EntryKind, ObjectView, Tree, TreeEntry};
pub use repository::{Repository, RepositoryBuilder};
pub use revocation::{RevocationRegistry, RevokeOutcome};
pub use storage::{ObjectStore, StoreStats};
pub use tree::TreeBuilder;
pub use types::*;
pub use verification::{Finding, FindingKind, StoreAuditReport, VerificationReport, Verifier};
