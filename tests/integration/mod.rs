//! Integration tests for arbor
//!
//! End-to-end scenarios: snapshot history, deduplication, tamper detection,
//! revocation-gated checkout and malformed parent chains.

use ::arbor::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::info;

/// Repository in a temporary work tree
pub struct ArborTestHarness {
    pub temp_dir: TempDir,
    pub repo: Repository,
}

impl ArborTestHarness {
    /// Create a harness with a freshly initialized repository
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let repo = RepositoryBuilder::new()
            .parallel_workers(2)
            .init(temp_dir.path())
            .unwrap();
        Self { temp_dir, repo }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `content` to `rel`, creating parent directories
    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        fs::read(self.root().join(rel)).unwrap()
    }

    /// Stage `paths` and commit
    pub fn commit(&self, paths: &[&str], message: &str) -> String {
        self.repo.stage(paths).unwrap();
        self.repo.commit(message).unwrap()
    }

    /// Overwrite a stored object without going through the store
    pub fn tamper(&self, digest: &str, content: &[u8]) {
        fs::write(self.repo.store().object_path(digest), content).unwrap();
    }

    /// Digest of the blob stored for `path` in `commit`
    pub fn blob_for(&self, commit: &str, path: &str) -> String {
        let commit = Commit::load(self.repo.store(), commit).unwrap();
        let mut digest = commit.tree;
        let parts: Vec<&str> = path.split('/').collect();
        for (i, part) in parts.iter().enumerate() {
            let tree = Tree::decode(&digest, &self.repo.store().get(&digest).unwrap()).unwrap();
            let entry = tree
                .entries()
                .iter()
                .find(|e| e.name == *part)
                .unwrap_or_else(|| panic!("{} not in tree", path));
            if i + 1 == parts.len() {
                assert_eq!(entry.kind, EntryKind::Blob);
            }
            digest = entry.digest.clone();
        }
        digest
    }
}

/// Generate a small project with random file contents
pub fn generate_project(harness: &ArborTestHarness, seed: u64, files: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut paths = Vec::with_capacity(files);
    for i in 0..files {
        let depth = rng.random_range(0..3);
        let mut path = String::new();
        for level in 0..depth {
            path.push_str(&format!("dir_{}_{}/", level, i % 3));
        }
        path.push_str(&format!("file_{}.txt", i));

        let len = rng.random_range(0..512);
        let content: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        harness.write(&path, content);
        paths.push(path);
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_two_commits_verify_clean() {
        let harness = ArborTestHarness::new();
        harness.write("a.txt", "hello");
        harness.write("dir/b.txt", "world");

        let first = harness.commit(&["a.txt", "dir/b.txt"], "first");
        harness.write("a.txt", "hello again");
        let second = harness.commit(&["a.txt"], "second");

        let report = harness.repo.verify(None).unwrap();
        assert_eq!(report.commit, second);
        assert!(report.is_clean(), "{:?}", report.messages());

        // 2 commits, 2 root trees, 1 subtree, 3 blobs
        assert_eq!(report.objects_checked, 8);

        let history = harness.repo.log().unwrap();
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.entries[1].digest, first);
    }

    #[test]
    fn test_identical_content_stored_once() {
        let harness = ArborTestHarness::new();
        harness.write("one.txt", "same bytes");
        harness.write("nested/two.txt", "same bytes");

        let commit = harness.commit(&["one.txt", "nested/two.txt"], "dup");
        let one = harness.blob_for(&commit, "one.txt");
        let two = harness.blob_for(&commit, "nested/two.txt");
        assert_eq!(one, two);

        // blob, subtree, root tree, commit
        assert_eq!(harness.repo.stats().unwrap().object_count, 4);
    }

    #[test]
    fn test_tampered_blob_is_reported() {
        let harness = ArborTestHarness::new();
        harness.write("a.txt", "original");
        harness.write("b.txt", "untouched");
        let commit = harness.commit(&["a.txt", "b.txt"], "snapshot");

        let blob = harness.blob_for(&commit, "a.txt");
        harness.tamper(&blob, b"tampered");

        let report = harness.repo.verify(None).unwrap();
        assert!(!report.is_clean());
        assert!(report.mentions(&blob));
        assert!(report.findings.iter().all(|f| f.digest == blob), "{:?}", report.messages());
        assert_eq!(report.findings[0].kind, FindingKind::ContentMismatch);

        let audit = harness.repo.verify_store().unwrap();
        assert_eq!(audit.corrupt.len(), 1);
        assert_eq!(audit.corrupt[0].digest, blob);
    }

    #[test]
    fn test_missing_blob_is_reported() {
        let harness = ArborTestHarness::new();
        harness.write("a.txt", "soon missing");
        let commit = harness.commit(&["a.txt"], "snapshot");

        let blob = harness.blob_for(&commit, "a.txt");
        fs::remove_file(harness.repo.store().object_path(&blob)).unwrap();

        let report = harness.repo.verify(None).unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, FindingKind::MissingObject);
        assert!(report.messages()[0].starts_with(&format!("Missing blob object {}", blob)));
    }

    #[test]
    fn test_revoked_commit_cannot_be_checked_out() {
        let harness = ArborTestHarness::new();
        harness.write("a.txt", "v1");
        let first = harness.commit(&["a.txt"], "v1");
        harness.write("a.txt", "v2");
        let second = harness.commit(&["a.txt"], "v2");

        harness.repo.checkout(Some(&first)).unwrap();
        assert_eq!(harness.read("a.txt"), b"v1");

        let (digest, outcome) = harness.repo.revoke(&second[..16]).unwrap();
        assert_eq!(digest, second);
        assert_eq!(outcome, RevokeOutcome::Revoked);

        let err = harness.repo.checkout(Some(&second)).unwrap_err();
        assert!(matches!(err, ArborError::RevokedCommit(ref d) if *d == second));
        assert_eq!(harness.read("a.txt"), b"v1");
        assert_eq!(harness.repo.head().unwrap().as_deref(), Some(first.as_str()));

        // Revoking again is a no-op
        let (_, outcome) = harness.repo.revoke(&second).unwrap();
        assert_eq!(outcome, RevokeOutcome::AlreadyRevoked);
        assert_eq!(harness.repo.revocations().unwrap().len(), 1);
    }

    #[test]
    fn test_revoked_head_blocks_checkout_via_head() {
        let harness = ArborTestHarness::new();
        harness.write("a.txt", "committed");
        let commit = harness.commit(&["a.txt"], "only");
        harness.write("a.txt", "local edit");

        harness.repo.revoke(&commit).unwrap();
        let err = harness.repo.checkout(None).unwrap_err();
        assert!(matches!(err, ArborError::RevokedCommit(_)));
        assert_eq!(harness.read("a.txt"), b"local edit");

        // Still listed and still verifiable
        let history = harness.repo.log().unwrap();
        assert!(history.entries[0].revoked);
        assert!(harness.repo.verify(None).unwrap().is_clean());
    }

    #[test]
    fn test_tampered_commit_can_be_revoked() {
        let harness = ArborTestHarness::new();
        harness.write("a.txt", "suspect");
        let commit = harness.commit(&["a.txt"], "suspect");
        harness.tamper(&commit, b"garbage");

        let (digest, outcome) = harness.repo.revoke(&commit).unwrap();
        assert_eq!(digest, commit);
        assert_eq!(outcome, RevokeOutcome::Revoked);
        assert!(harness.repo.is_revoked(&commit).unwrap());

        let err = harness.repo.checkout(Some(&commit)).unwrap_err();
        assert!(matches!(err, ArborError::RevokedCommit(_)));
    }

    #[test]
    fn test_parent_cycle_is_detected() {
        let harness = ArborTestHarness::new();
        harness.write("a.txt", "content");
        let real = harness.commit(&["a.txt"], "real");
        let tree = Commit::load(harness.repo.store(), &real).unwrap().tree;

        // Two commits naming each other as parent, stored under made-up digests
        let a = "a".repeat(64);
        let b = "b".repeat(64);
        let commit_a = Commit::new(tree.clone(), Some(b.clone()), "A".to_string());
        let commit_b = Commit::new(tree, Some(a.clone()), "B".to_string());
        harness.tamper(&a, &commit_a.encode().unwrap());
        harness.tamper(&b, &commit_b.encode().unwrap());

        let report = harness.repo.verify(Some(&a)).unwrap();
        let cycles: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::CycleDetected)
            .collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].digest, a);

        // Log stops at the repeat instead of looping
        let history = arbor::commit::log(harness.repo.store(), &RevocationRegistry::default(), &a).unwrap();
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.end, LogEnd::Cycle(a));
    }

    #[test]
    fn test_status_tracks_staged_changes() {
        let harness = ArborTestHarness::new();
        harness.write("a.txt", "v1");
        harness.commit(&["a.txt"], "v1");

        assert_eq!(harness.repo.status().unwrap().head_tree_matches, Some(true));

        harness.write("a.txt", "v2");
        let status = harness.repo.status().unwrap();
        assert_eq!(status.staged, vec!["a.txt"]);
        assert_eq!(status.head_tree_matches, Some(false));
    }

    #[test]
    fn test_orphans_listed_by_store_audit() {
        let harness = ArborTestHarness::new();
        harness.write("a.txt", "a");
        harness.commit(&["a.txt"], "a");
        let stray = harness.repo.store().put(b"never committed").unwrap();

        let audit = harness.repo.verify_store().unwrap();
        assert!(audit.is_clean());
        assert_eq!(audit.orphans, vec![stray]);
    }

    #[test]
    #[traced_test]
    fn test_random_project_round_trip() {
        let harness = ArborTestHarness::new();
        let paths = generate_project(&harness, 7, 40);
        let originals: Vec<Vec<u8>> = paths.iter().map(|p| harness.read(p)).collect();

        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let commit = harness.commit(&refs, "random project");
        info!("Committed {} files as {}", paths.len(), commit);

        // Scramble everything, then restore
        let mut rng = StdRng::seed_from_u64(99);
        for path in &paths {
            let junk: Vec<u8> = (0..16).map(|_| rng.random()).collect();
            harness.write(path, junk);
        }
        let result = harness.repo.checkout(Some(&commit)).unwrap();
        assert_eq!(result.files_written, paths.len());

        for (path, original) in paths.iter().zip(&originals) {
            assert_eq!(&harness.read(path), original, "{} differs", path);
        }
        assert!(harness.repo.verify(None).unwrap().is_clean());
        assert!(logs_contain("random project"));
    }
}
