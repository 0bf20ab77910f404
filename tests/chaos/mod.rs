//! Chaos testing for arbor
//!
//! Damages the repository directly on disk (flipped bytes, deleted objects,
//! garbage state files, concurrent writers) and checks that every problem
//! is detected and reported rather than panicking or silently passing.

use ::arbor::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};

/// Repository with a few commits, plus a seeded damage generator
pub struct ArborChaosTest {
    pub temp_dir: TempDir,
    pub repo: Repository,
    pub chaos_engine: ChaosEngine,
}

impl ArborChaosTest {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        Self {
            temp_dir,
            repo,
            chaos_engine: ChaosEngine::new(42),
        }
    }

    /// Create `count` commits, each changing one file
    pub fn create_test_commits(&mut self, count: usize) -> anyhow::Result<Vec<String>> {
        let mut commits = Vec::with_capacity(count);
        for i in 0..count {
            let rel = format!("dir_{}/file_{}.txt", i % 3, i);
            let path = self.temp_dir.path().join(&rel);
            fs::create_dir_all(path.parent().unwrap())?;
            fs::write(&path, format!("content {}", i))?;

            self.repo.stage(&[rel])?;
            commits.push(self.repo.commit(&format!("Commit {}", i))?);
        }
        Ok(commits)
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.repo.store().root().to_path_buf()
    }

    pub fn state_file(&self, name: &str) -> PathBuf {
        self.repo.repo_dir().join(name)
    }
}

/// Seeded source of on-disk damage
pub struct ChaosEngine {
    rng: StdRng,
}

impl ChaosEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Pick up to `count` distinct files in `dir`
    fn pick_files(&mut self, dir: &Path, count: usize) -> anyhow::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files.shuffle(&mut self.rng);
        files.truncate(count);
        Ok(files)
    }

    /// Flip one byte in each of up to `count` files (or append one to empty files)
    pub fn corrupt_random_files(&mut self, dir: &Path, count: usize) -> anyhow::Result<Vec<PathBuf>> {
        let files = self.pick_files(dir, count)?;
        for path in &files {
            let mut content = fs::read(path)?;
            if content.is_empty() {
                content.push(self.rng.random());
            } else {
                let idx = self.rng.random_range(0..content.len());
                content[idx] ^= self.rng.random_range(1..=255u8);
            }
            fs::write(path, content)?;
            info!("Corrupted {:?}", path.file_name());
        }
        Ok(files)
    }

    /// Delete up to `count` files from `dir`
    pub fn delete_random_files(&mut self, dir: &Path, count: usize) -> anyhow::Result<Vec<PathBuf>> {
        let files = self.pick_files(dir, count)?;
        for path in &files {
            fs::remove_file(path)?;
            info!("Deleted {:?}", path.file_name());
        }
        Ok(files)
    }

    /// Replace a JSON state file with bytes that do not parse
    pub fn corrupt_json_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let garbage: Vec<u8> = (0..32).map(|_| self.rng.random_range(b'!'..=b'~')).collect();
        let mut content = b"{".to_vec();
        content.extend(garbage);
        fs::write(path, content)?;
        Ok(())
    }
}

fn digest_of(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_store_corruption_detected() {
        let mut chaos_test = ArborChaosTest::new();
        chaos_test.create_test_commits(6).unwrap();

        let objects_dir = chaos_test.objects_dir();
        let corrupted = chaos_test
            .chaos_engine
            .corrupt_random_files(&objects_dir, 5)
            .unwrap();
        let mut expected: Vec<String> = corrupted.iter().map(|p| digest_of(p)).collect();
        expected.sort();

        let audit = chaos_test.repo.verify_store().unwrap();
        let mut found: Vec<String> = audit.corrupt.iter().map(|f| f.digest.clone()).collect();
        found.sort();
        assert_eq!(found, expected);
        assert!(logs_contain("Corrupted"));

        // A corrupt commit or tree can hide what lies below it, but the
        // history audit never comes back clean
        let report = chaos_test.repo.verify(None).unwrap();
        assert!(!report.is_clean());
        assert!(expected.iter().any(|d| report.mentions(d)));
    }

    #[test]
    fn test_deleted_objects_reported_as_missing() {
        let mut chaos_test = ArborChaosTest::new();
        chaos_test.create_test_commits(5).unwrap();

        let objects_dir = chaos_test.objects_dir();
        let deleted = chaos_test
            .chaos_engine
            .delete_random_files(&objects_dir, 3)
            .unwrap();

        // Deleting parents can hide later objects, so at least one is reported
        let report = chaos_test.repo.verify(None).unwrap();
        assert!(!report.is_clean());
        assert!(deleted.iter().any(|p| report.mentions(&digest_of(p))));
        assert!(report
            .findings
            .iter()
            .all(|f| f.kind == FindingKind::MissingObject));
    }

    #[test]
    fn test_undecodable_commit_ends_log() {
        let mut chaos_test = ArborChaosTest::new();
        let commits = chaos_test.create_test_commits(3).unwrap();

        fs::write(chaos_test.repo.store().object_path(&commits[1]), b"not json").unwrap();

        let history = chaos_test.repo.log().unwrap();
        assert_eq!(history.entries.len(), 1);
        assert!(matches!(history.end, LogEnd::Undecodable { ref digest, .. } if *digest == commits[1]));

        let report = chaos_test.repo.verify(None).unwrap();
        let kinds: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.digest == commits[1])
            .map(|f| f.kind)
            .collect();
        assert_eq!(kinds, vec![FindingKind::ContentMismatch, FindingKind::DecodeError]);

        // The root commit is unreachable through the broken link
        assert!(!report.mentions(&commits[0]));
    }

    #[test]
    fn test_unknown_entry_kind() {
        let chaos_test = ArborChaosTest::new();
        let store = chaos_test.repo.store();

        let blob = store.put(b"payload").unwrap();
        let raw = format!(
            r#"[{{"hash":"{}","mode":"120000","name":"link","type":"symlink"}}]"#,
            blob
        );
        let tree = store.put(raw.as_bytes()).unwrap();
        let commit = store
            .put(&Commit::new(tree.clone(), None, "odd".to_string()).encode().unwrap())
            .unwrap();

        let report = chaos_test.repo.verify(Some(&commit)).unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, FindingKind::UnknownEntryKind);
        assert_eq!(report.findings[0].digest, tree);

        let err = chaos_test.repo.checkout(Some(&commit)).unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(chaos_test.repo.head().unwrap(), None);
    }

    /// Store a commit whose root tree has a single entry `name` of `kind`
    fn forged_commit(repo: &Repository, name: &str, kind: &str, digest: &str) -> String {
        let mode = if kind == "tree" { "40000" } else { "100644" };
        let raw = format!(
            r#"[{{"hash":"{}","mode":"{}","name":{},"type":"{}"}}]"#,
            digest,
            mode,
            serde_json::to_string(name).unwrap(),
            kind
        );
        let tree = repo.store().put(raw.as_bytes()).unwrap();
        repo.store()
            .put(&Commit::new(tree, None, "forged".to_string()).encode().unwrap())
            .unwrap()
    }

    #[test]
    fn test_forged_tree_cannot_escape_work_root() {
        let mut chaos_test = ArborChaosTest::new();
        let commits = chaos_test.create_test_commits(2).unwrap();
        let root = chaos_test.temp_dir.path();
        let outside = format!(
            "{}.escaped",
            root.file_name().unwrap().to_string_lossy()
        );

        let blob = chaos_test.repo.store().put(b"escaped").unwrap();
        let forged = forged_commit(&chaos_test.repo, &format!("../{}", outside), "blob", &blob);

        let options = CheckoutOptions { verify_hashes: true };
        let err = chaos_test
            .repo
            .checkout_with_options(Some(&forged), options)
            .unwrap_err();
        assert!(err.is_corruption(), "{:?}", err);
        assert!(!root.parent().unwrap().join(&outside).exists());
        assert_eq!(chaos_test.repo.head().unwrap().as_deref(), Some(commits[1].as_str()));

        let report = chaos_test.repo.verify(Some(&forged)).unwrap();
        assert!(report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::InvalidEntryName));
    }

    #[test]
    fn test_forged_tree_cannot_overwrite_revocations() {
        let mut chaos_test = ArborChaosTest::new();
        let commits = chaos_test.create_test_commits(2).unwrap();
        chaos_test.repo.revoke(&commits[0]).unwrap();

        // A tree that would replace .arbor/revoked with an empty list
        let empty = chaos_test.repo.store().put(b"[]").unwrap();
        let inner = format!(
            r#"[{{"hash":"{}","mode":"100644","name":"revoked","type":"blob"}}]"#,
            empty
        );
        let inner = chaos_test.repo.store().put(inner.as_bytes()).unwrap();
        let forged = forged_commit(&chaos_test.repo, REPO_DIR_NAME, "tree", &inner);

        let err = chaos_test.repo.checkout(Some(&forged)).unwrap_err();
        assert!(err.is_corruption(), "{:?}", err);
        assert!(chaos_test.repo.is_revoked(&commits[0]).unwrap());
        assert!(matches!(
            chaos_test.repo.checkout(Some(&commits[0])).unwrap_err(),
            ArborError::RevokedCommit(_)
        ));
    }

    #[test]
    fn test_garbage_state_files_fail_cleanly() {
        let mut chaos_test = ArborChaosTest::new();
        chaos_test.create_test_commits(2).unwrap();

        let refs = chaos_test.state_file("refs");
        chaos_test.chaos_engine.corrupt_json_file(&refs).unwrap();
        assert!(matches!(chaos_test.repo.head().unwrap_err(), ArborError::Json(_)));
        assert!(matches!(chaos_test.repo.commit("x").unwrap_err(), ArborError::Json(_)));

        let revoked = chaos_test.state_file("revoked");
        chaos_test.chaos_engine.corrupt_json_file(&revoked).unwrap();
        assert!(chaos_test.repo.revocations().is_err());

        // Objects are untouched, so rehashing the store still passes
        let audit = Verifier::new(chaos_test.repo.store()).audit_store(None).unwrap();
        assert!(audit.is_clean());
    }

    #[test]
    fn test_concurrent_commits_keep_history_linear() {
        let chaos_test = ArborChaosTest::new();
        let root = chaos_test.temp_dir.path().to_path_buf();
        let writers = 4;
        let barrier = Arc::new(Barrier::new(writers));

        let handles: Vec<_> = (0..writers)
            .map(|i| {
                let root = root.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || -> Result<String> {
                    let repo = Repository::open(&root)?;
                    let rel = format!("writer_{}.txt", i);
                    fs::write(root.join(&rel), format!("writer {}", i))?;
                    repo.stage(&[rel])?;
                    barrier.wait();
                    repo.commit(&format!("writer {}", i))
                })
            })
            .collect();

        let mut commits = Vec::new();
        for handle in handles {
            match handle.join().unwrap() {
                Ok(digest) => commits.push(digest),
                Err(e) => warn!("Writer failed: {}", e),
            }
        }
        assert_eq!(commits.len(), writers);

        let history = chaos_test.repo.log().unwrap();
        assert_eq!(history.entries.len(), writers);
        assert_eq!(history.end, LogEnd::Root);
        assert!(chaos_test.repo.verify(None).unwrap().is_clean());
    }
}
