//! Structural merge of one local working copy into another.
//!
//! The source copy is attached to the destination as a temporary remote,
//! fetched, and merged like any pull. Conflict markers stay in the
//! destination's files and are committed so the copy is never left mid-merge.

use git2::{ErrorCode, Repository};
use tracing::{info, instrument, warn};

use crate::errors::{GitError, ManifestError};
use crate::git::client::GitClient;
use crate::manifest::Manifest;
use crate::models::{MergeStrategy, WorkingCopy};
use crate::sync::{MergeReport, TranslationMerge, VersionControl};

/// Name of the remote the source copy is attached under during a merge.
const MERGE_REMOTE: &str = "transync-local-merge";

/// [`TranslationMerge`] backed by [`GitClient`].
#[derive(Debug, Clone)]
pub struct GitTranslationMerge {
    author_name: String,
    author_email: String,
}

impl GitTranslationMerge {
    pub fn new(author_name: impl Into<String>, author_email: impl Into<String>) -> Self {
        Self {
            author_name: author_name.into(),
            author_email: author_email.into(),
        }
    }

    fn open(&self, copy: &WorkingCopy) -> Result<GitClient, GitError> {
        Ok(GitClient::new(&copy.path)?.with_author(&self.author_name, &self.author_email))
    }

    /// Check that `source` is readable. Damage to its repository or manifest
    /// comes back as [`GitError::CorruptCopy`]; anything else is an ordinary
    /// error that leaves the copy alone.
    fn inspect_source(&self, source: &WorkingCopy) -> Result<(), GitError> {
        if !source.path.join(".git").exists() {
            return Err(GitError::RepositoryNotFound(source.path.display().to_string()));
        }
        let repo = Repository::open(&source.path)
            .map_err(|e| corrupt(source, "repository cannot be opened", &e))?;
        match repo.head() {
            Ok(head) => {
                head.peel_to_commit()
                    .map_err(|e| corrupt(source, "HEAD commit is unreadable", &e))?;
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch => {}
            Err(e) => return Err(corrupt(source, "HEAD is unreadable", &e)),
        }
        repo.index()
            .map_err(|e| corrupt(source, "index is unreadable", &e))?;

        match Manifest::generate(&source.path) {
            Ok(_) => Ok(()),
            Err(ManifestError::NotFound(path)) => {
                warn!(%path, "source copy has no manifest");
                Ok(())
            }
            Err(ManifestError::IoError(e)) => Err(GitError::IoError(e)),
            Err(e) => Err(GitError::CorruptCopy {
                path: source.path.display().to_string(),
                detail: e.to_string(),
            }),
        }
    }
}

fn corrupt(copy: &WorkingCopy, what: &str, err: &git2::Error) -> GitError {
    GitError::CorruptCopy {
        path: copy.path.display().to_string(),
        detail: format!("{}: {}", what, err.message()),
    }
}

impl Default for GitTranslationMerge {
    fn default() -> Self {
        Self::new("transync", "transync@localhost")
    }
}

impl TranslationMerge for GitTranslationMerge {
    #[instrument(skip(self, on_corrupt), fields(destination = %destination.id, source = %source.id))]
    fn merge_from(
        &self,
        destination: &WorkingCopy,
        source: &WorkingCopy,
        on_corrupt: &mut dyn FnMut(&WorkingCopy),
    ) -> Result<MergeReport, GitError> {
        if let Err(e) = self.inspect_source(source) {
            if matches!(e, GitError::CorruptCopy { .. }) {
                warn!(error = %e, "source copy is corrupt");
                on_corrupt(source);
            } else {
                warn!(error = %e, "source copy cannot be merged");
            }
            return Err(e);
        }
        let source_client = self.open(source)?;
        source_client.commit_synchronously()?;
        let branch = source_client.current_branch()?;

        let client = self.open(destination)?;
        client.commit_synchronously()?;

        let url = source.path.to_string_lossy();
        client.delete_remote(MERGE_REMOTE)?;
        client.set_remote(MERGE_REMOTE, &url)?;
        let pulled = client.pull(MERGE_REMOTE, MergeStrategy::Recursive, &branch);
        if let Err(e) = client.delete_remote(MERGE_REMOTE) {
            warn!(error = %e, "failed to detach source remote");
        }
        let result = pulled?;

        if !result.conflicts.is_empty() {
            client.commit_synchronously()?;
        }
        info!(conflicts = result.conflicts.len(), "local merge finished");
        Ok(MergeReport {
            conflicted: result.conflicts,
        })
    }
}
