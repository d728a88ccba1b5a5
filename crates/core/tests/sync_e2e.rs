//! End-to-end tests for pull, push, and local merge.
//!
//! These tests exercise the real orchestrators with:
//! - Real git2 working copies
//! - A local bare repository standing in for the hosting service's repo
//! - A hosting fake that hands out the bare repo's path as the remote URL
//!
//! No network I/O.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{BranchType, Repository, RepositoryInitOptions};
use serde_json::json;
use tempfile::TempDir;

use transync_core::errors::HostingError;
use transync_core::git::{GitClient, GitTranslationMerge};
use transync_core::models::{
    HostingSession, LocalMergeStatus, MergeStrategy, PullStatus, PushStatus, RemoteDescriptor,
    WorkingCopy, LICENSE_FILE, MANIFEST_FILE,
};
use transync_core::progress::NoProgress;
use transync_core::storage::{DirectoryQuarantine, FileSettingsCache};
use transync_core::sync::{
    EmptyOutbox, LocalTranslationMerger, PullOrchestrator, PushOrchestrator, RemoteHosting,
    VersionControl,
};

// ===========================================================================
// Helpers
// ===========================================================================

const DOC: &str = "en_mat_text_reg";

/// Hosting fake whose only repository is a local bare repo.
struct LocalHosting {
    url: String,
}

impl LocalHosting {
    fn descriptor(&self, name: &str) -> RemoteDescriptor {
        RemoteDescriptor {
            ssh_url: self.url.clone(),
            owner_name: "translator".into(),
            repo_name: name.into(),
        }
    }
}

impl RemoteHosting for LocalHosting {
    fn find_or_create_repository(
        &self,
        _session: &HostingSession,
        document_id: &str,
    ) -> Result<Option<RemoteDescriptor>, HostingError> {
        Ok(Some(self.descriptor(document_id)))
    }

    fn search_repositories(
        &self,
        _session: &HostingSession,
        _owner_id: u64,
        query: &str,
        _limit: usize,
    ) -> Result<Vec<RemoteDescriptor>, HostingError> {
        Ok(vec![self.descriptor(query)])
    }
}

struct World {
    root: TempDir,
    hosting: Arc<LocalHosting>,
}

impl World {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let origin = root.path().join("origin.git");
        let mut opts = RepositoryInitOptions::new();
        opts.bare(true).initial_head("master");
        Repository::init_opts(&origin, &opts).unwrap();
        let hosting = Arc::new(LocalHosting {
            url: origin.to_str().unwrap().to_string(),
        });
        Self { root, hosting }
    }

    fn session() -> Option<HostingSession> {
        Some(HostingSession {
            user_id: 1,
            username: "translator".into(),
            token: "token".into(),
        })
    }

    fn puller(&self) -> PullOrchestrator {
        PullOrchestrator::new(
            self.hosting.clone(),
            Arc::new(EmptyOutbox),
            Arc::new(NoProgress),
            Self::session(),
        )
    }

    fn pusher(&self) -> PushOrchestrator {
        PushOrchestrator::new(self.hosting.clone(), Arc::new(NoProgress), Self::session())
    }

    /// A new copy with the base document, pushed to origin.
    fn seed(&self, name: &str) -> (WorkingCopy, GitClient) {
        let dir = self.root.path().join(name).join(DOC);
        std::fs::create_dir_all(dir.join("01")).unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("master");
        Repository::init_opts(&dir, &opts).unwrap();
        write(&dir, MANIFEST_FILE, "{\"package_version\": 6}\n");
        write(&dir, LICENSE_FILE, "base license\n");
        write(&dir, "01/01.txt", "In the beginning\n");

        let copy = WorkingCopy::new(DOC, &dir);
        let client = open(&dir);
        let outcome = self.pusher().push(&copy, &client);
        assert_eq!(outcome.status, PushStatus::Ok, "{}", outcome.message);
        (copy, client)
    }

    /// A copy cloned from origin.
    fn clone_copy(&self, name: &str) -> (WorkingCopy, GitClient) {
        let dir = self.root.path().join(name).join(DOC);
        Repository::clone(&self.hosting.url, &dir).unwrap();
        (WorkingCopy::new(DOC, &dir), open(&dir))
    }
}

fn open(dir: &Path) -> GitClient {
    GitClient::new(dir)
        .unwrap()
        .with_author("Translator", "translator@example.org")
}

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

fn read(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name)).unwrap()
}

// ===========================================================================
// Pull / push
// ===========================================================================

#[test]
fn test_pull_after_push_is_up_to_date() {
    let world = World::new();
    let (_a, _a_client) = world.seed("a");
    let (b, b_client) = world.clone_copy("b");

    let outcome = world
        .puller()
        .pull(&b, &b_client, MergeStrategy::Recursive, None);
    assert_eq!(outcome.status, PullStatus::UpToDate);
    assert!(b_client
        .list_branches()
        .unwrap()
        .contains(&"backup-master".to_string()));
}

#[test]
fn test_first_pull_into_empty_copy() {
    let world = World::new();
    let (_a, a_client) = world.seed("a");

    let dir = world.root.path().join("empty").join(DOC);
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("master");
    Repository::init_opts(&dir, &opts).unwrap();
    let copy = WorkingCopy::new(DOC, &dir);
    let client = open(&dir);
    assert_eq!(client.head_sha().unwrap(), None);

    let outcome = world
        .puller()
        .pull(&copy, &client, MergeStrategy::Recursive, None);
    assert_eq!(outcome.status, PullStatus::UpToDate, "{:?}", outcome.message);
    assert_eq!(read(&dir, LICENSE_FILE), "base license\n");
    assert_eq!(read(&dir, "01/01.txt"), "In the beginning\n");
    assert_eq!(client.get_head_sha().unwrap(), a_client.get_head_sha().unwrap());
    assert!(!client
        .list_branches()
        .unwrap()
        .contains(&"backup-master".to_string()));
}

#[test]
fn test_conflicting_pull_applies_manifest_and_license_policy() {
    let world = World::new();
    let (a, a_client) = world.seed("a");
    let (b, b_client) = world.clone_copy("b");

    write(
        &a.path,
        MANIFEST_FILE,
        "{\"package_version\": 7, \"translators\": [\"ana\"]}\n",
    );
    write(&a.path, LICENSE_FILE, "license from a\n");
    assert_eq!(world.pusher().push(&a, &a_client).status, PushStatus::Ok);

    write(
        &b.path,
        MANIFEST_FILE,
        "{\"package_version\": 6, \"device\": {\"last\": \"01-01\"}}\n",
    );
    write(&b.path, LICENSE_FILE, "license from b\n");
    b_client.commit_synchronously().unwrap();
    let pre_pull = b_client.get_head_sha().unwrap();

    let outcome = world
        .puller()
        .pull(&b, &b_client, MergeStrategy::Recursive, None);
    assert_eq!(outcome.status, PullStatus::MergeConflicts);
    assert!(outcome.message.unwrap().contains(LICENSE_FILE));

    assert_eq!(read(&b.path, LICENSE_FILE), "license from b\n");
    let manifest: serde_json::Value = serde_json::from_str(&read(&b.path, MANIFEST_FILE)).unwrap();
    assert_eq!(
        manifest,
        json!({"package_version": 7, "translators": ["ana"], "device": {"last": "01-01"}})
    );

    let backup = b_client
        .repo()
        .find_branch("backup-master", BranchType::Local)
        .unwrap();
    assert_eq!(backup.get().target().unwrap().to_string(), pre_pull);

    // The resolved merge goes back up and fast-forwards the other copy.
    assert_eq!(world.pusher().push(&b, &b_client).status, PushStatus::Ok);
    let outcome = world
        .puller()
        .pull(&a, &a_client, MergeStrategy::Recursive, None);
    assert_eq!(outcome.status, PullStatus::UpToDate);
    assert_eq!(read(&a.path, LICENSE_FILE), "license from b\n");
}

#[test]
fn test_diverged_push_is_rejected() {
    let world = World::new();
    let (a, a_client) = world.seed("a");
    let (b, b_client) = world.clone_copy("b");

    write(&a.path, "01/01.txt", "In the beginning was the Word\n");
    assert_eq!(world.pusher().push(&a, &a_client).status, PushStatus::Ok);

    write(&b.path, "01/01.txt", "At the start\n");
    let outcome = world.pusher().push(&b, &b_client);
    assert_eq!(outcome.status, PushStatus::RejectedNonFastForward);
    assert!(outcome.status.is_rejected());
    assert!(outcome.message.contains("refs/heads/master"));
    assert!(outcome
        .message
        .ends_with(&format!("server details: {}", world.hosting.url)));
}

#[test]
fn test_nothing_new_to_push_is_ok() {
    let world = World::new();
    let (a, a_client) = world.seed("a");
    let outcome = world.pusher().push(&a, &a_client);
    assert_eq!(outcome.status, PushStatus::Ok);
}

// ===========================================================================
// Local merge
// ===========================================================================

fn merger(world: &World) -> (LocalTranslationMerger, PathBuf) {
    let quarantine_dir = world.root.path().join("quarantine");
    let merger = LocalTranslationMerger::new(
        Arc::new(GitTranslationMerge::new("Translator", "translator@example.org")),
        Arc::new(DirectoryQuarantine::new(&quarantine_dir)),
        Arc::new(FileSettingsCache::new(world.root.path().join("settings"))),
    );
    (merger, quarantine_dir)
}

#[test]
fn test_local_merge_brings_in_source_work() {
    let world = World::new();
    let (dest, _dest_client) = world.seed("dest");
    let (source, _source_client) = world.clone_copy("source");
    write(&source.path, "01/02.txt", "and the earth\n");

    let (merger, _) = merger(&world);
    let outcome = merger.merge(dest, source, true);
    assert!(outcome.success);
    assert_eq!(outcome.status, LocalMergeStatus::Success);
    assert_eq!(read(&outcome.destination.path, "01/02.txt"), "and the earth\n");
    assert!(!outcome.source.path.exists());
}

#[test]
fn test_local_merge_leaves_markers_on_conflict() {
    let world = World::new();
    let (dest, dest_client) = world.seed("dest");
    let (source, _source_client) = world.clone_copy("source");
    write(&dest.path, "01/01.txt", "dest text\n");
    dest_client.commit_synchronously().unwrap();
    write(&source.path, "01/01.txt", "source text\n");

    let (merger, _) = merger(&world);
    let outcome = merger.merge(dest, source, true);
    assert!(outcome.success);
    assert_eq!(outcome.status, LocalMergeStatus::MergeConflicts);
    let text = read(&outcome.destination.path, "01/01.txt");
    assert!(transync_core::MergeConflictExtractor::has_conflict_markers(&text));
    assert!(!outcome.source.path.exists());
}

fn backups(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn test_damaged_head_is_quarantined() {
    let world = World::new();
    let (dest, _dest_client) = world.seed("dest");
    let (source, _source_client) = world.clone_copy("source");
    write(&source.path, "01/01.txt", "unsaved work\n");
    write(&source.path, ".git/HEAD", "garbage\n");
    let source_dir = source.path.clone();

    let (merger, quarantine_dir) = merger(&world);
    let outcome = merger.merge(dest, source, false);
    assert!(!outcome.success);
    assert_eq!(outcome.status, LocalMergeStatus::MergeError);
    assert!(!source_dir.exists());

    let backups = backups(&quarantine_dir);
    assert_eq!(backups.len(), 1);
    assert_eq!(read(&backups[0], "01/01.txt"), "unsaved work\n");
}

#[test]
fn test_unparsable_manifest_is_quarantined() {
    let world = World::new();
    let (dest, _dest_client) = world.seed("dest");
    let (source, _source_client) = world.clone_copy("source");
    write(&source.path, MANIFEST_FILE, "{ \"package_version\": ");
    let source_dir = source.path.clone();

    let (merger, quarantine_dir) = merger(&world);
    let outcome = merger.merge(dest, source, true);
    assert_eq!(outcome.status, LocalMergeStatus::MergeError);
    assert!(!source_dir.exists());
    assert_eq!(backups(&quarantine_dir).len(), 1);
}

#[test]
fn test_locked_source_is_left_alone() {
    let world = World::new();
    let (dest, _dest_client) = world.seed("dest");
    let (source, _source_client) = world.clone_copy("source");
    write(&source.path, "01/01.txt", "unsaved work\n");
    write(&source.path, ".git/index.lock", "");

    let (merger, quarantine_dir) = merger(&world);
    let outcome = merger.merge(dest, source, true);
    assert!(!outcome.success);
    assert_eq!(outcome.status, LocalMergeStatus::MergeError);
    assert_eq!(read(&outcome.source.path, "01/01.txt"), "unsaved work\n");
    assert!(backups(&quarantine_dir).is_empty());
}

#[test]
fn test_plain_directory_source_is_left_alone() {
    let world = World::new();
    let (dest, _dest_client) = world.seed("dest");

    let source_dir = world.root.path().join("plain").join(DOC);
    std::fs::create_dir_all(&source_dir).unwrap();
    write(&source_dir, "01.txt", "orphaned text\n");
    let source = WorkingCopy::new(DOC, &source_dir);

    let (merger, quarantine_dir) = merger(&world);
    let outcome = merger.merge(dest, source, true);
    assert!(!outcome.success);
    assert_eq!(outcome.status, LocalMergeStatus::MergeError);
    assert_eq!(read(&source_dir, "01.txt"), "orphaned text\n");
    assert!(backups(&quarantine_dir).is_empty());
}
