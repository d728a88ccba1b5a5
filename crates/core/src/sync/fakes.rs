//! Recording fakes of the sync collaborators, for orchestrator tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::{CoreError, GitError, HostingError, ManifestError};
use crate::models::{
    CheckoutStage, ConflictSet, HostingSession, MergeStrategy, PullResult, RefUpdateOutcome,
    RemoteDescriptor, WorkingCopy,
};
use crate::progress::Progress;
use crate::sync::{
    MergeReport, Outbox, Quarantine, RemoteHosting, SettingsCache, TranslationMerge,
    VersionControl,
};

pub(crate) fn session() -> HostingSession {
    HostingSession {
        user_id: 42,
        username: "translator".into(),
        token: "secret".into(),
    }
}

pub(crate) fn descriptor(owner: &str, name: &str) -> RemoteDescriptor {
    RemoteDescriptor {
        ssh_url: format!("git@git.example.org:{}/{}.git", owner, name),
        owner_name: owner.into(),
        repo_name: name.into(),
    }
}

/// Builds a fresh error on demand; errors are not `Clone`.
pub(crate) type ErrorFactory = fn() -> GitError;

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeVcs {
    pub calls: RefCell<Vec<String>>,
    pub root: PathBuf,
    pub commit_error: Option<ErrorFactory>,
    pub branch_create_error: Option<ErrorFactory>,
    pub set_remote_error: Option<ErrorFactory>,
    pub pull_error: Option<ErrorFactory>,
    pub push_error: Option<ErrorFactory>,
    pub conflicts: Vec<String>,
    /// HEAD has no commit yet.
    pub unborn: bool,
    pub push_outcomes: Vec<RefUpdateOutcome>,
    /// File contents written by `checkout`, keyed by path.
    pub ours: HashMap<String, String>,
    pub theirs: HashMap<String, String>,
}

impl FakeVcs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

fn fail_or(factory: Option<ErrorFactory>) -> Result<(), GitError> {
    match factory {
        Some(make) => Err(make()),
        None => Ok(()),
    }
}

impl VersionControl for FakeVcs {
    fn commit_synchronously(&self) -> Result<Option<String>, GitError> {
        self.record("commit".into());
        fail_or(self.commit_error)?;
        Ok(Some("abc123".into()))
    }

    fn head_sha(&self) -> Result<Option<String>, GitError> {
        Ok((!self.unborn).then(|| "abc123".to_string()))
    }

    fn delete_remote(&self, name: &str) -> Result<(), GitError> {
        self.record(format!("delete_remote {}", name));
        Ok(())
    }

    fn set_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.record(format!("set_remote {} {}", name, url));
        fail_or(self.set_remote_error)
    }

    fn branch_delete(&self, name: &str, force: bool) -> Result<(), GitError> {
        self.record(format!("branch_delete {} {}", name, force));
        Ok(())
    }

    fn branch_create(&self, name: &str, force: bool) -> Result<(), GitError> {
        self.record(format!("branch_create {} {}", name, force));
        fail_or(self.branch_create_error)
    }

    fn pull(
        &self,
        remote: &str,
        strategy: MergeStrategy,
        branch: &str,
    ) -> Result<PullResult, GitError> {
        self.record(format!("pull {} {:?} {}", remote, strategy, branch));
        fail_or(self.pull_error)?;
        let conflicts: ConflictSet = self.conflicts.iter().cloned().collect();
        Ok(PullResult { conflicts })
    }

    fn push(
        &self,
        remote: &str,
        refspec: &str,
        force: bool,
    ) -> Result<Vec<RefUpdateOutcome>, GitError> {
        self.record(format!("push {} {} {}", remote, refspec, force));
        fail_or(self.push_error)?;
        Ok(self.push_outcomes.clone())
    }

    fn checkout(&self, stage: CheckoutStage, path: &str) -> Result<(), GitError> {
        self.record(format!("checkout {:?} {}", stage, path));
        let side = match stage {
            CheckoutStage::Ours => &self.ours,
            CheckoutStage::Theirs => &self.theirs,
        };
        if let Some(contents) = side.get(path) {
            std::fs::write(self.root.join(path), contents)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hosting
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeHosting {
    pub calls: RefCell<Vec<String>>,
    pub found: Option<RemoteDescriptor>,
    pub search_results: Vec<RemoteDescriptor>,
    pub auth_rejected: bool,
}

impl FakeHosting {
    pub fn with_repo(repo: RemoteDescriptor) -> Self {
        Self {
            found: Some(repo.clone()),
            search_results: vec![repo],
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl RemoteHosting for FakeHosting {
    fn find_or_create_repository(
        &self,
        _session: &HostingSession,
        document_id: &str,
    ) -> Result<Option<RemoteDescriptor>, HostingError> {
        self.calls
            .borrow_mut()
            .push(format!("find_or_create {}", document_id));
        if self.auth_rejected {
            return Err(HostingError::AuthenticationFailed("HTTP 401".into()));
        }
        Ok(self.found.clone())
    }

    fn search_repositories(
        &self,
        _session: &HostingSession,
        owner_id: u64,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RemoteDescriptor>, HostingError> {
        self.calls
            .borrow_mut()
            .push(format!("search {} {} {}", owner_id, query, limit));
        Ok(self.search_results.clone())
    }
}

// ---------------------------------------------------------------------------
// Side collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeOutbox {
    pub fail: bool,
    pub flushed: RefCell<usize>,
}

impl Outbox for FakeOutbox {
    fn flush(&self) -> Result<(), CoreError> {
        *self.flushed.borrow_mut() += 1;
        if self.fail {
            return Err(ManifestError::NotFound("queue".into()).into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingProgress {
    pub messages: RefCell<Vec<String>>,
}

impl Progress for RecordingProgress {
    fn on_progress(&self, _current: i64, _max: i64, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }

    fn on_indeterminate(&self) {}
}

/// What `FakeMerge::merge_from` does.
pub(crate) enum MergeBehavior {
    Clean,
    Conflicts(Vec<String>),
    Corrupt,
    Fail,
}

pub(crate) struct FakeMerge {
    pub behavior: MergeBehavior,
}

impl TranslationMerge for FakeMerge {
    fn merge_from(
        &self,
        _destination: &WorkingCopy,
        source: &WorkingCopy,
        on_corrupt: &mut dyn FnMut(&WorkingCopy),
    ) -> Result<MergeReport, GitError> {
        match &self.behavior {
            MergeBehavior::Clean => Ok(MergeReport::default()),
            MergeBehavior::Conflicts(paths) => Ok(MergeReport {
                conflicted: paths.iter().cloned().collect(),
            }),
            MergeBehavior::Corrupt => {
                on_corrupt(source);
                Err(GitError::CorruptCopy {
                    path: source.path.display().to_string(),
                    detail: "no HEAD".into(),
                })
            }
            MergeBehavior::Fail => Err(GitError::RefNotFound("HEAD".into())),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeQuarantine {
    pub fail: bool,
    pub backed_up: RefCell<Vec<String>>,
}

impl Quarantine for FakeQuarantine {
    fn backup(&self, copy: &WorkingCopy) -> std::io::Result<PathBuf> {
        self.backed_up.borrow_mut().push(copy.id.clone());
        if self.fail {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        }
        Ok(PathBuf::from("/quarantine").join(&copy.id))
    }
}

#[derive(Default)]
pub(crate) struct FakeSettings {
    pub removed: RefCell<Vec<String>>,
}

impl SettingsCache for FakeSettings {
    fn remove(&self, document_id: &str) -> std::io::Result<()> {
        self.removed.borrow_mut().push(document_id.to_string());
        Ok(())
    }
}
