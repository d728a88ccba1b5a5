//! Sync orchestration: pull, push, and local translation merge.
//!
//! The orchestrators own no I/O of their own. Everything they touch goes
//! through the collaborator traits declared here, so the git engine, the
//! hosting service, and the on-disk stores can be swapped or faked.

pub mod local_merge;
pub mod pull;
pub mod push;

#[cfg(test)]
pub(crate) mod fakes;

use std::path::PathBuf;

use crate::errors::{CoreError, GitError, HostingError};
use crate::models::{
    CheckoutStage, ConflictSet, HostingSession, MergeStrategy, PullResult, RefUpdateOutcome,
    RemoteDescriptor, WorkingCopy,
};

pub use local_merge::LocalTranslationMerger;
pub use pull::PullOrchestrator;
pub use push::PushOrchestrator;

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

/// Git primitives for one working copy.
pub trait VersionControl {
    /// Stage and commit every change. `None` when there was nothing to commit.
    fn commit_synchronously(&self) -> Result<Option<String>, GitError>;

    /// Commit HEAD points at. `None` while the branch is still unborn.
    fn head_sha(&self) -> Result<Option<String>, GitError>;

    /// Remove a remote. Removing a remote that does not exist is not an error.
    fn delete_remote(&self, name: &str) -> Result<(), GitError>;

    fn set_remote(&self, name: &str, url: &str) -> Result<(), GitError>;

    /// Delete a local branch. Deleting a branch that does not exist is not an error.
    fn branch_delete(&self, name: &str, force: bool) -> Result<(), GitError>;

    /// Create a local branch at HEAD, replacing an existing one when `force`.
    fn branch_create(&self, name: &str, force: bool) -> Result<(), GitError>;

    fn pull(
        &self,
        remote: &str,
        strategy: MergeStrategy,
        branch: &str,
    ) -> Result<PullResult, GitError>;

    fn push(
        &self,
        remote: &str,
        refspec: &str,
        force: bool,
    ) -> Result<Vec<RefUpdateOutcome>, GitError>;

    /// Replace a conflicted path with one side of the merge.
    fn checkout(&self, stage: CheckoutStage, path: &str) -> Result<(), GitError>;
}

// ---------------------------------------------------------------------------
// Hosting service
// ---------------------------------------------------------------------------

/// Repository lookup and creation on the hosting service.
pub trait RemoteHosting {
    /// Find the user's repository for `document_id`, creating it if absent.
    fn find_or_create_repository(
        &self,
        session: &HostingSession,
        document_id: &str,
    ) -> Result<Option<RemoteDescriptor>, HostingError>;

    fn search_repositories(
        &self,
        session: &HostingSession,
        owner_id: u64,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RemoteDescriptor>, HostingError>;
}

// ---------------------------------------------------------------------------
// Side collaborators
// ---------------------------------------------------------------------------

/// Queued registration side-requests, flushed before every pull.
pub trait Outbox {
    fn flush(&self) -> Result<(), CoreError>;
}

/// An outbox with nothing queued.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyOutbox;

impl Outbox for EmptyOutbox {
    fn flush(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// What a structural merge of two working copies left behind.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub conflicted: ConflictSet,
}

/// The destination copy's structural merge of a source copy.
pub trait TranslationMerge {
    /// Merge `source` into `destination`. `on_corrupt` runs when `source`
    /// cannot be merged at all; the merge then fails.
    fn merge_from(
        &self,
        destination: &WorkingCopy,
        source: &WorkingCopy,
        on_corrupt: &mut dyn FnMut(&WorkingCopy),
    ) -> Result<MergeReport, GitError>;
}

/// Per-document settings cached outside the working copy.
pub trait SettingsCache {
    fn remove(&self, document_id: &str) -> std::io::Result<()>;
}

/// Keeps a copy of a damaged working copy before it is discarded.
pub trait Quarantine {
    /// Returns where the backup was written.
    fn backup(&self, copy: &WorkingCopy) -> std::io::Result<PathBuf>;
}
