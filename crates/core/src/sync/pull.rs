//! Pull a document's working copy from its hosting-service repository.
//!
//! Sequence: commit, snapshot HEAD on the backup branch, point `origin` at
//! the resolved URL, pull, then apply the fixed conflict policy for the
//! manifest (remote structure, local-only fields kept) and the license
//! (local text wins). Other conflicted files are left for the user.

use std::error::Error;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::SyncSection;
use crate::errors::CoreError;
use crate::manifest::Manifest;
use crate::models::{
    CheckoutStage, ConflictSet, HostingSession, MergeStrategy, PullOutcome, PullStatus,
    WorkingCopy, LICENSE_FILE, MANIFEST_FILE,
};
use crate::progress::Progress;
use crate::sync::{Outbox, RemoteHosting, VersionControl};
use crate::transport::classify_with_message;

pub struct PullOrchestrator {
    hosting: Arc<dyn RemoteHosting>,
    outbox: Arc<dyn Outbox>,
    progress: Arc<dyn Progress>,
    session: Option<HostingSession>,
    settings: SyncSection,
}

impl PullOrchestrator {
    /// `session` is `None` when the user is not signed in to the hosting service.
    pub fn new(
        hosting: Arc<dyn RemoteHosting>,
        outbox: Arc<dyn Outbox>,
        progress: Arc<dyn Progress>,
        session: Option<HostingSession>,
    ) -> Self {
        Self {
            hosting,
            outbox,
            progress,
            session,
            settings: SyncSection::default(),
        }
    }

    pub fn with_settings(mut self, settings: SyncSection) -> Self {
        self.settings = settings;
        self
    }

    /// Pull `copy` through `vcs`. `remote_url` overrides the hosting lookup.
    #[instrument(skip_all, fields(document_id = %copy.id))]
    pub fn pull(
        &self,
        copy: &WorkingCopy,
        vcs: &dyn VersionControl,
        strategy: MergeStrategy,
        remote_url: Option<&str>,
    ) -> PullOutcome {
        let Some(session) = &self.session else {
            warn!("pull requested without a hosting session");
            return PullOutcome::new(PullStatus::AuthFailure);
        };
        self.progress.on_indeterminate();

        if let Err(e) = self.outbox.flush() {
            warn!(error = %e, "outbox flush failed");
        }
        if let Err(e) = vcs.commit_synchronously() {
            warn!(error = %e, "commit before pull failed, pulling last good commit");
        }
        let local_manifest = match Manifest::generate(&copy.path) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "no usable local manifest before pull");
                None
            }
        };

        let backup = &self.settings.backup_branch;
        let snapshot = vcs.head_sha().and_then(|head| match head {
            Some(_) => vcs
                .branch_delete(backup, true)
                .and_then(|_| vcs.branch_create(backup, true)),
            None => {
                info!(branch = %backup, "HEAD is unborn, nothing to back up");
                Ok(())
            }
        });
        if let Err(e) = snapshot {
            error!(error = %e, branch = %backup, "could not snapshot HEAD before pull");
            return PullOutcome::with_message(PullStatus::Unknown, e.to_string());
        }

        self.progress.on_progress(-1, -1, "resolving repository");
        let url = match remote_url {
            Some(url) => url.to_string(),
            None => match self.hosting.find_or_create_repository(session, &copy.id) {
                Ok(Some(repo)) => repo.ssh_url,
                Ok(None) => {
                    warn!("hosting service returned no repository");
                    return PullOutcome::new(PullStatus::Unknown);
                }
                Err(e) => return classified(&e),
            },
        };

        let remote = &self.settings.remote_name;
        if let Err(e) = vcs
            .delete_remote(remote)
            .and_then(|_| vcs.set_remote(remote, &url))
        {
            error!(error = %e, %remote, "could not configure remote");
            return PullOutcome::with_message(PullStatus::Unknown, e.to_string());
        }

        self.progress.on_progress(-1, -1, "downloading");
        let result = match vcs.pull(remote, strategy, &self.settings.branch) {
            Ok(result) => result,
            Err(e) => return classified(&e),
        };

        if result.conflicts.is_empty() {
            info!(%url, "pull finished, up to date");
            return PullOutcome::new(PullStatus::UpToDate);
        }

        self.progress.on_progress(-1, -1, "resolving conflicts");
        if let Err(e) = resolve_conflicts(copy, vcs, &result.conflicts, local_manifest.as_ref()) {
            return classified(&e);
        }
        let paths: Vec<&str> = result.conflicts.paths().collect();
        warn!(conflicts = ?paths, "pull finished with conflicts");
        PullOutcome::with_message(
            PullStatus::MergeConflicts,
            format!("conflicts in: {}", paths.join(", ")),
        )
    }
}

/// Apply the manifest and license policies to a conflicted pull.
fn resolve_conflicts(
    copy: &WorkingCopy,
    vcs: &dyn VersionControl,
    conflicts: &ConflictSet,
    local_manifest: Option<&Manifest>,
) -> Result<(), CoreError> {
    if conflicts.contains(MANIFEST_FILE) {
        vcs.checkout(CheckoutStage::Theirs, MANIFEST_FILE)?;
        let remote = Manifest::generate(&copy.path)?;
        match local_manifest {
            Some(local) => {
                Manifest::merge(local, &remote).save()?;
                info!("merged local manifest fields into remote manifest");
            }
            None => info!("kept remote manifest"),
        }
    }
    if conflicts.contains(LICENSE_FILE) {
        vcs.checkout(CheckoutStage::Ours, LICENSE_FILE)?;
        info!("kept local license");
    }
    Ok(())
}

fn classified(err: &(dyn Error + 'static)) -> PullOutcome {
    let (status, message) = classify_with_message(err);
    error!(%status, error = %message, "pull failed");
    PullOutcome::with_message(PullStatus::from(status), message)
}
