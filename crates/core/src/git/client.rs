//! Working-copy git operations via `git2`.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::build::CheckoutBuilder;
use git2::{
    AnnotatedCommit, BranchType, Commit, Cred, ErrorClass, ErrorCode, FetchOptions, FileFavor,
    IndexAddOption, MergeOptions, PushOptions, RemoteCallbacks, Repository, RepositoryState,
    Signature,
};
use tracing::{debug, info, instrument, warn};

use crate::conflict::MergeConflictExtractor;
use crate::errors::GitError;
use crate::models::{
    CheckoutStage, ConflictSet, MergeStrategy, PullResult, RefUpdateOutcome, RefUpdateStatus,
};
use crate::progress::Progress;
use crate::sync::VersionControl;

/// Message recorded on commits made by [`GitClient::commit_synchronously`].
const AUTO_COMMIT_MESSAGE: &str = "auto-saved by transync";

/// Credentials offered to the remote when it asks for them.
#[derive(Debug, Clone, Default)]
pub struct GitCredentials {
    /// Private key for ssh remotes; the ssh agent is asked when unset.
    pub ssh_key_path: Option<PathBuf>,
    /// Username for https remotes.
    pub username: String,
    /// Access token for https remotes.
    pub token: Option<String>,
}

/// High-level Git client wrapping one working copy's `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
    author_name: String,
    author_email: String,
    credentials: GitCredentials,
    progress: Option<Arc<dyn Progress>>,
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        debug!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
            author_name: "transync".into(),
            author_email: "transync@localhost".into(),
            credentials: GitCredentials::default(),
            progress: None,
        })
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    pub fn with_credentials(mut self, credentials: GitCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Forward transfer progress (objects received, bytes pushed) to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Return the SHA of HEAD.
    pub fn get_head_sha(&self) -> Result<String, GitError> {
        Ok(self.head_commit()?.id().to_string())
    }

    /// Short name of the branch HEAD points at.
    pub fn current_branch(&self) -> Result<String, GitError> {
        let head = self.repo.head()?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| GitError::RefNotFound("HEAD".into()))
    }

    /// List all local branch names.
    pub fn list_branches(&self) -> Result<Vec<String>, GitError> {
        let mut names = Vec::new();
        for branch_result in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch_result?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn head_commit(&self) -> Result<Commit<'_>, GitError> {
        let head = self
            .repo
            .head()
            .map_err(|_| GitError::RefNotFound("HEAD".into()))?;
        Ok(head.peel_to_commit()?)
    }

    fn signature(&self) -> Result<Signature<'static>, GitError> {
        Ok(Signature::now(&self.author_name, &self.author_email)?)
    }

    /// Map an error from a network exchange onto the crate's error type.
    fn network_error(&self, remote: &str, err: git2::Error) -> GitError {
        if err.class() == ErrorClass::NoMemory {
            return GitError::OutOfMemory(err.message().to_string());
        }
        GitError::Transport {
            remote: remote.to_string(),
            source: Box::new(err),
        }
    }

    fn remote_callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let credentials = &self.credentials;
        let mut attempts = 0u32;
        callbacks.credentials(move |_url, username_from_url, allowed| {
            attempts += 1;
            if attempts > 3 {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Ssh,
                    "Auth fail",
                ));
            }
            let user = username_from_url.unwrap_or("git");
            if allowed.is_ssh_key() {
                return match &credentials.ssh_key_path {
                    Some(key) => Cred::ssh_key(user, None, key, None),
                    None => Cred::ssh_key_from_agent(user),
                };
            }
            if allowed.is_user_pass_plaintext() {
                if let Some(token) = &credentials.token {
                    return Cred::userpass_plaintext(&credentials.username, token);
                }
            }
            if allowed.is_username() {
                return Cred::username(user);
            }
            Cred::default()
        });

        if let Some(progress) = self.progress.clone() {
            let upload = Arc::clone(&progress);
            callbacks.transfer_progress(move |stats| {
                progress.on_progress(
                    stats.received_objects() as i64,
                    stats.total_objects() as i64,
                    "downloading",
                );
                true
            });
            callbacks.push_transfer_progress(move |current, total, _bytes| {
                upload.on_progress(current as i64, total as i64, "uploading");
            });
        }
        callbacks
    }

    fn fetch(&self, remote_name: &str) -> Result<(), GitError> {
        info!(remote = remote_name, "fetching");
        let mut remote = self.repo.find_remote(remote_name)?;
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(self.remote_callbacks());
        remote
            .fetch(&[] as &[&str], Some(&mut fetch_opts), None)
            .map_err(|e| self.network_error(remote_name, e))?;
        debug!("fetch completed");
        Ok(())
    }

    /// Conflicted paths in the index, with the marker spans found in each file.
    fn collect_conflicts(&self) -> Result<ConflictSet, GitError> {
        let index = self.repo.index()?;
        let mut conflicts = ConflictSet::new();
        if !index.has_conflicts() {
            return Ok(conflicts);
        }
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let Some(entry) = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref())
            else {
                continue;
            };
            let path = String::from_utf8_lossy(&entry.path).into_owned();
            let regions = std::fs::read(self.repo_path.join(&path))
                .map(|bytes| MergeConflictExtractor::marker_regions(&String::from_utf8_lossy(&bytes)))
                .unwrap_or_default();
            conflicts.insert(path, regions);
        }
        Ok(conflicts)
    }

    fn fast_forward(&self, target: &AnnotatedCommit<'_>) -> Result<(), GitError> {
        let commit = self.repo.find_commit(target.id())?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
        let mut head = self.repo.head()?;
        head.set_target(target.id(), "transync: fast-forward pull")?;
        info!(sha = %target.id(), "fast-forwarded");
        Ok(())
    }

    fn adopt_unborn(&self, target: &AnnotatedCommit<'_>) -> Result<(), GitError> {
        let head = self.repo.find_reference("HEAD")?;
        let branch_ref = head
            .symbolic_target()
            .ok_or_else(|| GitError::RefNotFound("HEAD".into()))?
            .to_string();
        self.repo
            .reference(&branch_ref, target.id(), true, "transync: initial pull")?;
        self.repo.set_head(&branch_ref)?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;
        info!(sha = %target.id(), "checked out remote history into empty copy");
        Ok(())
    }

    fn merge_commit(
        &self,
        target: &AnnotatedCommit<'_>,
        strategy: MergeStrategy,
        label: &str,
    ) -> Result<PullResult, GitError> {
        let mut merge_opts = MergeOptions::new();
        match strategy {
            MergeStrategy::Recursive => {}
            MergeStrategy::Ours => {
                merge_opts.file_favor(FileFavor::Ours);
            }
            MergeStrategy::Theirs => {
                merge_opts.file_favor(FileFavor::Theirs);
            }
        }
        let mut checkout = CheckoutBuilder::new();
        checkout
            .allow_conflicts(true)
            .conflict_style_merge(true)
            .our_label("HEAD")
            .their_label(label);
        self.repo
            .merge(&[target], Some(&mut merge_opts), Some(&mut checkout))?;

        let conflicts = self.collect_conflicts()?;
        if !conflicts.is_empty() {
            warn!(count = conflicts.len(), "merge left conflicts");
            return Ok(PullResult { conflicts });
        }

        let mut index = self.repo.index()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;
        let ours = self.head_commit()?;
        let theirs = self.repo.find_commit(target.id())?;
        let sig = self.signature()?;
        let message = format!("Merge {}", label);
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&ours, &theirs])?;
        self.repo.cleanup_state()?;
        info!(sha = %oid, "created merge commit");
        Ok(PullResult::default())
    }
}

/// Destination ref of a push refspec (`src:dst`, or `src` alone).
fn destination_ref(refspec: &str) -> String {
    let spec = refspec.trim_start_matches('+');
    spec.split_once(':')
        .map(|(_, dst)| dst)
        .unwrap_or(spec)
        .to_string()
}

impl VersionControl for GitClient {
    #[instrument(skip(self), fields(path = %self.repo_path.display()))]
    fn commit_synchronously(&self) -> Result<Option<String>, GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let merge_head = if self.repo.state() == RepositoryState::Merge {
            match self.repo.find_reference("MERGE_HEAD") {
                Ok(r) => Some(r.peel_to_commit()?),
                Err(_) => None,
            }
        } else {
            None
        };

        if merge_head.is_none() {
            match &parent {
                Some(p) if p.tree_id() == tree_oid => {
                    debug!("nothing to commit");
                    return Ok(None);
                }
                None if index.is_empty() => {
                    debug!("empty working copy, nothing to commit");
                    return Ok(None);
                }
                _ => {}
            }
        }

        let tree = self.repo.find_tree(tree_oid)?;
        let sig = self.signature()?;
        let parents: Vec<&Commit<'_>> = parent.iter().chain(merge_head.iter()).collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, AUTO_COMMIT_MESSAGE, &tree, &parents)?;
        if merge_head.is_some() {
            self.repo.cleanup_state()?;
        }
        info!(sha = %oid, "created commit");
        Ok(Some(oid.to_string()))
    }

    #[instrument(skip(self))]
    fn delete_remote(&self, name: &str) -> Result<(), GitError> {
        match self.repo.find_remote(name) {
            Ok(_) => {}
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(remote = name, "remote absent, nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.repo.remote_delete(name)?;
        debug!(remote = name, "deleted remote");
        Ok(())
    }

    #[instrument(skip(self))]
    fn set_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        if self.repo.find_remote(name).is_ok() {
            self.repo.remote_set_url(name, url)?;
        } else {
            self.repo.remote(name, url)?;
        }
        info!(remote = name, url, "configured remote");
        Ok(())
    }

    #[instrument(skip(self))]
    fn branch_delete(&self, name: &str, force: bool) -> Result<(), GitError> {
        let mut branch = match self.repo.find_branch(name, BranchType::Local) {
            Ok(b) => b,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !force {
            let tip = branch.get().peel_to_commit()?.id();
            let head = self.head_commit()?.id();
            if tip != head && !self.repo.graph_descendant_of(head, tip)? {
                return Err(GitError::Git2Error(git2::Error::from_str(&format!(
                    "branch '{}' is not fully merged",
                    name
                ))));
            }
        }
        branch.delete()?;
        info!(name, "deleted branch");
        Ok(())
    }

    #[instrument(skip(self))]
    fn head_sha(&self) -> Result<Option<String>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id().to_string())),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn branch_create(&self, name: &str, force: bool) -> Result<(), GitError> {
        let head = self.head_commit()?;
        self.repo.branch(name, &head, force)?;
        info!(name, sha = %head.id(), "created branch");
        Ok(())
    }

    #[instrument(skip(self))]
    fn pull(
        &self,
        remote: &str,
        strategy: MergeStrategy,
        branch: &str,
    ) -> Result<PullResult, GitError> {
        self.fetch(remote)?;

        let tracking = format!("refs/remotes/{}/{}", remote, branch);
        let remote_ref = match self.repo.find_reference(&tracking) {
            Ok(r) => r,
            Err(e) if e.code() == ErrorCode::NotFound => {
                info!(%tracking, "remote has no such branch yet");
                return Ok(PullResult::default());
            }
            Err(e) => return Err(e.into()),
        };
        let target = self.repo.reference_to_annotated_commit(&remote_ref)?;
        let (analysis, _) = self.repo.merge_analysis(&[&target])?;

        if analysis.is_up_to_date() {
            debug!("already up to date");
            return Ok(PullResult::default());
        }
        if analysis.is_unborn() {
            self.adopt_unborn(&target)?;
            return Ok(PullResult::default());
        }
        if analysis.is_fast_forward() {
            self.fast_forward(&target)?;
            return Ok(PullResult::default());
        }
        let label = format!("{}/{}", remote, branch);
        self.merge_commit(&target, strategy, &label)
    }

    #[instrument(skip(self))]
    fn push(
        &self,
        remote: &str,
        refspec: &str,
        force: bool,
    ) -> Result<Vec<RefUpdateOutcome>, GitError> {
        info!(remote, refspec, force, "pushing");
        let mut remote_handle = self.repo.find_remote(remote)?;
        let spec = if force && !refspec.starts_with('+') {
            format!("+{}", refspec)
        } else {
            refspec.to_string()
        };
        let destination = destination_ref(refspec);

        let reports: RefCell<Vec<RefUpdateOutcome>> = RefCell::new(Vec::new());
        let result = {
            let mut callbacks = self.remote_callbacks();
            callbacks.push_update_reference(|refname, status| {
                if let Some(msg) = status {
                    warn!(refname, msg, "push rejected");
                }
                let mut outcome =
                    RefUpdateOutcome::new(refname, RefUpdateStatus::from_report(status));
                outcome.message = status.map(str::to_string);
                reports.borrow_mut().push(outcome);
                Ok(())
            });
            let mut push_opts = PushOptions::new();
            push_opts.remote_callbacks(callbacks);
            remote_handle.push(&[spec.as_str()], Some(&mut push_opts))
        };

        match result {
            Ok(()) => {}
            Err(e) if e.code() == ErrorCode::NotFastForward => {
                warn!(refname = %destination, error = %e.message(), "push rejected");
                let mut outcome =
                    RefUpdateOutcome::new(destination, RefUpdateStatus::RejectedNonFastForward);
                outcome.message = Some(e.message().to_string());
                return Ok(vec![outcome]);
            }
            Err(e) => return Err(self.network_error(remote, e)),
        }

        let mut outcomes = reports.into_inner();
        if outcomes.is_empty() {
            outcomes.push(RefUpdateOutcome::new(destination, RefUpdateStatus::UpToDate));
        }
        info!(refs = outcomes.len(), "push completed");
        Ok(outcomes)
    }

    #[instrument(skip(self))]
    fn checkout(&self, stage: CheckoutStage, path: &str) -> Result<(), GitError> {
        let rel = Path::new(path);
        let mut index = self.repo.index()?;

        let mut from_conflict = None;
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let conflict_path = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref())
                .map(|e| e.path.clone());
            if conflict_path.as_deref() == Some(path.as_bytes()) {
                from_conflict = Some(match stage {
                    CheckoutStage::Ours => conflict.our.map(|e| e.id),
                    CheckoutStage::Theirs => conflict.their.map(|e| e.id),
                });
                break;
            }
        }

        let blob_id = match from_conflict {
            Some(id) => id,
            None => {
                let commit = match stage {
                    CheckoutStage::Ours => self.head_commit()?,
                    CheckoutStage::Theirs => self
                        .repo
                        .find_reference("MERGE_HEAD")
                        .map_err(|_| GitError::RefNotFound("MERGE_HEAD".into()))?
                        .peel_to_commit()?,
                };
                let tree = commit.tree()?;
                tree.get_path(rel).ok().map(|entry| entry.id())
            }
        };

        let full = self.repo_path.join(rel);
        match blob_id {
            Some(id) => {
                let blob = self.repo.find_blob(id)?;
                if let Some(parent) = full.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&full, blob.content())?;
                index.add_path(rel)?;
            }
            None => {
                if full.exists() {
                    std::fs::remove_file(&full)?;
                }
                index.remove_path(rel)?;
            }
        }
        index.write()?;
        info!(path, ?stage, "checked out one side of conflicted path");
        Ok(())
    }
}
