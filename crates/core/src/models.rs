//! Domain model types used throughout transync.
//!
//! These types bridge the orchestrators, the git engine adapter, and the
//! hosting client. Everything except [`WorkingCopy`] is transient and scoped
//! to a single sync call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::transport::TransportStatus;

/// File name of a document's manifest inside its working copy.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of a document's license inside its working copy.
pub const LICENSE_FILE: &str = "LICENSE.md";

// ---------------------------------------------------------------------------
// Working copy
// ---------------------------------------------------------------------------

/// A document's local versioned directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingCopy {
    /// Document identifier; also the hosting repository name.
    pub id: String,
    /// Root directory of the git working tree.
    pub path: PathBuf,
}

impl WorkingCopy {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Open a working copy, taking the identifier from the directory name.
    pub fn from_dir<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(id, path)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// SHA of the current HEAD commit, if the copy is a repository with one.
    pub fn commit_hash(&self) -> Option<String> {
        let repo = git2::Repository::open(&self.path).ok()?;
        let head = repo.head().ok()?;
        let commit = head.peel_to_commit().ok()?;
        Some(commit.id().to_string())
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }
}

// ---------------------------------------------------------------------------
// Hosting
// ---------------------------------------------------------------------------

/// An authenticated hosting-service user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingSession {
    pub user_id: u64,
    pub username: String,
    pub token: String,
}

/// Identifies one repository on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub ssh_url: String,
    pub owner_name: String,
    pub repo_name: String,
}

impl RemoteDescriptor {
    /// Exact owner + name match, case-sensitive.
    pub fn is_exactly(&self, owner: &str, name: &str) -> bool {
        self.owner_name == owner && self.repo_name == name
    }
}

// ---------------------------------------------------------------------------
// Pull / merge inputs and results
// ---------------------------------------------------------------------------

/// How a pull merges remote history into the working copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Ordinary three-way merge; overlapping edits become conflicts.
    #[default]
    Recursive,
    /// Overlapping hunks resolve to the local side.
    Ours,
    /// Overlapping hunks resolve to the remote side.
    Theirs,
}

impl std::str::FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recursive" => Ok(Self::Recursive),
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            other => Err(format!("unknown merge strategy '{}'", other)),
        }
    }
}

/// Which side of a conflicted path to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Ours,
    Theirs,
}

/// Line span (1-indexed, inclusive) of one conflict block in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRegion {
    pub start_line: usize,
    pub end_line: usize,
}

/// Conflicted paths produced by a pull, keyed by path relative to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictSet(BTreeMap<String, Vec<ConflictRegion>>);

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, regions: Vec<ConflictRegion>) {
        self.0.insert(path.into(), regions);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<String> for ConflictSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().map(|p| (p, Vec::new())).collect())
    }
}

/// Result of a version-control pull.
#[derive(Debug, Clone, Default)]
pub struct PullResult {
    pub conflicts: ConflictSet,
}

// ---------------------------------------------------------------------------
// Push results
// ---------------------------------------------------------------------------

/// Outcome kind for a single pushed reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefUpdateStatus {
    NotAttempted,
    UpToDate,
    RejectedNonFastForward,
    RejectedNoDelete,
    RejectedRemoteChanged,
    RejectedOtherReason,
    NonExisting,
    AwaitingReport,
    Ok,
}

impl RefUpdateStatus {
    /// Interpret the per-ref status message a server sends back.
    /// `None` means the server accepted the update.
    pub fn from_report(message: Option<&str>) -> Self {
        let Some(message) = message else {
            return Self::Ok;
        };
        let msg = message.to_lowercase();
        if msg.contains("non-fast-forward")
            || msg.contains("fetch first")
            || msg.contains("not fast-forward")
        {
            Self::RejectedNonFastForward
        } else if msg.contains("deletion") || msg.contains("cannot delete") {
            Self::RejectedNoDelete
        } else if msg.contains("stale info") || msg.contains("remote ref has changed") {
            Self::RejectedRemoteChanged
        } else {
            Self::RejectedOtherReason
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotAttempted => "not attempted",
            Self::UpToDate => "up to date",
            Self::RejectedNonFastForward => "rejected (non-fast-forward)",
            Self::RejectedNoDelete => "rejected (deletion not allowed)",
            Self::RejectedRemoteChanged => "rejected (remote changed)",
            Self::RejectedOtherReason => "rejected",
            Self::NonExisting => "remote ref does not exist",
            Self::AwaitingReport => "awaiting report",
            Self::Ok => "ok",
        }
    }
}

/// The outcome of pushing one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdateOutcome {
    pub remote_ref_name: String,
    pub status: RefUpdateStatus,
    pub message: Option<String>,
}

impl RefUpdateOutcome {
    pub fn new(remote_ref_name: impl Into<String>, status: RefUpdateStatus) -> Self {
        Self {
            remote_ref_name: remote_ref_name.into(),
            status,
            message: None,
        }
    }

    /// One-line human-readable report for this ref.
    pub fn report_line(&self) -> String {
        match &self.message {
            Some(msg) => format!("{}: {} ({})", self.remote_ref_name, self.status.label(), msg),
            None => format!("{}: {}", self.remote_ref_name, self.status.label()),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation statuses
// ---------------------------------------------------------------------------

/// Terminal status of a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullStatus {
    UpToDate,
    MergeConflicts,
    AuthFailure,
    NoRemoteRepo,
    OutOfMemory,
    Unknown,
}

impl PullStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::UpToDate)
    }

    /// User-facing remedy for this status, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UpToDate => None,
            Self::MergeConflicts => Some("resolve the conflicted files manually"),
            Self::AuthFailure => TransportStatus::AuthFailure.hint(),
            Self::NoRemoteRepo => TransportStatus::NoRemoteRepo.hint(),
            Self::OutOfMemory => TransportStatus::OutOfMemory.hint(),
            Self::Unknown => TransportStatus::Unknown.hint(),
        }
    }
}

impl From<TransportStatus> for PullStatus {
    fn from(status: TransportStatus) -> Self {
        match status {
            TransportStatus::AuthFailure => Self::AuthFailure,
            TransportStatus::NoRemoteRepo => Self::NoRemoteRepo,
            TransportStatus::OutOfMemory => Self::OutOfMemory,
            TransportStatus::Unknown => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PullStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up_to_date"),
            Self::MergeConflicts => write!(f, "merge_conflicts"),
            Self::AuthFailure => write!(f, "auth_failure"),
            Self::NoRemoteRepo => write!(f, "no_remote_repo"),
            Self::OutOfMemory => write!(f, "out_of_memory"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Terminal status of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    Ok,
    RejectedNonFastForward,
    RejectedNoDelete,
    RejectedRemoteChanged,
    RejectedOtherReason,
    AuthFailure,
    NoRemoteRepo,
    OutOfMemory,
    Unknown,
}

impl PushStatus {
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            Self::RejectedNonFastForward
                | Self::RejectedNoDelete
                | Self::RejectedRemoteChanged
                | Self::RejectedOtherReason
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Ok => None,
            Self::RejectedNonFastForward | Self::RejectedRemoteChanged => {
                Some("pull the latest changes before pushing again")
            }
            Self::RejectedNoDelete | Self::RejectedOtherReason => {
                Some("the server refused the update")
            }
            Self::AuthFailure => TransportStatus::AuthFailure.hint(),
            Self::NoRemoteRepo => TransportStatus::NoRemoteRepo.hint(),
            Self::OutOfMemory => TransportStatus::OutOfMemory.hint(),
            Self::Unknown => TransportStatus::Unknown.hint(),
        }
    }
}

impl From<TransportStatus> for PushStatus {
    fn from(status: TransportStatus) -> Self {
        match status {
            TransportStatus::AuthFailure => Self::AuthFailure,
            TransportStatus::NoRemoteRepo => Self::NoRemoteRepo,
            TransportStatus::OutOfMemory => Self::OutOfMemory,
            TransportStatus::Unknown => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PushStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::RejectedNonFastForward => write!(f, "rejected_non_fast_forward"),
            Self::RejectedNoDelete => write!(f, "rejected_nodelete"),
            Self::RejectedRemoteChanged => write!(f, "rejected_remote_changed"),
            Self::RejectedOtherReason => write!(f, "rejected_other_reason"),
            Self::AuthFailure => write!(f, "auth_failure"),
            Self::NoRemoteRepo => write!(f, "no_remote_repo"),
            Self::OutOfMemory => write!(f, "out_of_memory"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Terminal status of a local translation merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalMergeStatus {
    Success,
    MergeConflicts,
    MergeError,
}

impl LocalMergeStatus {
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Success => None,
            Self::MergeConflicts => Some("resolve the conflict markers left in the document"),
            Self::MergeError => Some("the copies could not be merged"),
        }
    }
}

impl std::fmt::Display for LocalMergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::MergeConflicts => write!(f, "merge_conflicts"),
            Self::MergeError => write!(f, "merge_error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation outcomes
// ---------------------------------------------------------------------------

/// What a pull returns: one status plus optional detail text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub status: PullStatus,
    pub message: Option<String>,
}

impl PullOutcome {
    pub fn new(status: PullStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(status: PullStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

/// What a push returns: one status plus the human-readable report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub status: PushStatus,
    pub message: String,
}

impl PushOutcome {
    pub fn new(status: PushStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// What a local merge returns. Both copies are handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMergeOutcome {
    pub success: bool,
    pub status: LocalMergeStatus,
    pub destination: WorkingCopy,
    pub source: WorkingCopy,
}
