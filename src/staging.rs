//! Staging index
//!
//! The index is the sorted set of paths the next commit will snapshot.
//! Paths are stored relative to the work root with `/` separators. Staging
//! only records paths; file contents are read when the commit is built, so
//! a file edited after `add` is committed in its edited form.
//!
//! Committing does not clear the index. Each commit snapshots every path
//! staged so far until [`StagingIndex::clear`] is called.

use crate::error::Result;
use crate::lock::RepoLock;
use crate::types::StageReport;
use crate::utils;
use crate::REPO_DIR_NAME;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Contents of `.arbor/index`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagingIndex {
    paths: BTreeSet<String>,
}

impl StagingIndex {
    /// Load the index, treating a missing file as empty
    pub fn load(path: &Path) -> Result<Self> {
        Ok(utils::read_json_opt(path)?.unwrap_or_default())
    }

    /// Replace the index file atomically
    pub fn persist(&self, path: &Path, _lock: &RepoLock) -> Result<()> {
        utils::write_json(path, self)?;
        debug!("Persisted index with {} paths", self.paths.len());
        Ok(())
    }

    /// Staged paths, sorted
    pub fn paths(&self) -> Vec<String> {
        self.paths.iter().cloned().collect()
    }

    /// Whether `path` is staged
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Number of staged paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Unstage everything
    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Stage `inputs`, resolving them against `work_root`
    ///
    /// Relative inputs are taken relative to `work_root`; absolute inputs
    /// must lie inside it. Directories are expanded to the regular files
    /// below them. Inputs that do not exist, lie outside the work root or
    /// inside the repository directory are reported as skipped and never
    /// abort the call.
    pub fn stage<P: AsRef<Path>>(&mut self, work_root: &Path, inputs: &[P]) -> StageReport {
        let mut report = StageReport::default();

        for input in inputs {
            let input = input.as_ref();
            let full = if input.is_absolute() {
                input.to_path_buf()
            } else {
                work_root.join(input)
            };

            if !full.exists() {
                warn!("{:?} does not exist, skipping", input);
                report.skip(input, "does not exist");
                continue;
            }

            let tree_path = match utils::make_relative(&full, work_root)
                .and_then(|relative| utils::to_tree_path(&relative))
            {
                Ok(p) => p,
                Err(_) if full.is_dir() && same_dir(&full, work_root) => {
                    self.stage_directory(work_root, &full, &mut report);
                    continue;
                }
                Err(_) => {
                    warn!("{:?} is outside the work root, skipping", input);
                    report.skip(input, "outside the work root");
                    continue;
                }
            };

            if in_repo_dir(&tree_path) {
                warn!("Cannot stage files inside {}, skipping {:?}", REPO_DIR_NAME, input);
                report.skip(input, format!("inside {}", REPO_DIR_NAME));
                continue;
            }

            if full.is_dir() {
                self.stage_directory(work_root, &full, &mut report);
            } else if full.is_file() {
                self.add(tree_path, &mut report);
            } else {
                report.skip(input, "not a regular file");
            }
        }

        debug!(
            "Staged {} new paths ({} already staged, {} skipped)",
            report.added.len(),
            report.already_staged.len(),
            report.skipped.len()
        );
        report
    }

    fn stage_directory(&mut self, work_root: &Path, dir: &Path, report: &mut StageReport) {
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != REPO_DIR_NAME);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Walk error: {}", e);
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                    report.skip(path, e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            match utils::make_relative(entry.path(), work_root)
                .and_then(|relative| utils::to_tree_path(&relative))
            {
                Ok(tree_path) if !in_repo_dir(&tree_path) => self.add(tree_path, report),
                Ok(_) => {}
                Err(e) => report.skip(entry.path(), e.to_string()),
            }
        }
    }

    fn add(&mut self, tree_path: String, report: &mut StageReport) {
        if self.paths.insert(tree_path.clone()) {
            report.added.push(tree_path);
        } else {
            report.already_staged.push(tree_path);
        }
    }
}

fn in_repo_dir(tree_path: &str) -> bool {
    tree_path.split('/').next() == Some(REPO_DIR_NAME)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
