//! Push a document's working copy to its hosting-service repository.

use std::error::Error;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::SyncSection;
use crate::models::{
    HostingSession, PushOutcome, PushStatus, RefUpdateOutcome, RefUpdateStatus, WorkingCopy,
};
use crate::progress::Progress;
use crate::sync::{RemoteHosting, VersionControl};
use crate::transport::classify_with_message;

pub struct PushOrchestrator {
    hosting: Arc<dyn RemoteHosting>,
    progress: Arc<dyn Progress>,
    session: Option<HostingSession>,
    settings: SyncSection,
}

impl PushOrchestrator {
    /// `session` is `None` when the user is not signed in to the hosting service.
    pub fn new(
        hosting: Arc<dyn RemoteHosting>,
        progress: Arc<dyn Progress>,
        session: Option<HostingSession>,
    ) -> Self {
        Self {
            hosting,
            progress,
            session,
            settings: SyncSection::default(),
        }
    }

    pub fn with_settings(mut self, settings: SyncSection) -> Self {
        self.settings = settings;
        self
    }

    #[instrument(skip_all, fields(document_id = %copy.id))]
    pub fn push(&self, copy: &WorkingCopy, vcs: &dyn VersionControl) -> PushOutcome {
        let Some(session) = &self.session else {
            warn!("push requested without a hosting session");
            return PushOutcome::new(PushStatus::AuthFailure, "not signed in");
        };

        self.progress.on_progress(-1, -1, "resolving repository");
        if let Err(e) = self.hosting.find_or_create_repository(session, &copy.id) {
            return classified(&e);
        }
        let candidates = match self.hosting.search_repositories(
            session,
            session.user_id,
            &copy.id,
            self.settings.search_limit,
        ) {
            Ok(found) => found,
            Err(e) => return classified(&e),
        };
        let Some(repo) = candidates
            .into_iter()
            .find(|r| r.is_exactly(&session.username, &copy.id))
        else {
            error!(owner = %session.username, "repository not found after creation");
            return PushOutcome::new(
                PushStatus::Unknown,
                format!("no repository {}/{} on the hosting service", session.username, copy.id),
            );
        };

        if let Err(e) = vcs.commit_synchronously() {
            error!(error = %e, "commit before push failed");
            return PushOutcome::new(PushStatus::Unknown, e.to_string());
        }

        let remote = &self.settings.remote_name;
        if let Err(e) = vcs
            .delete_remote(remote)
            .and_then(|_| vcs.set_remote(remote, &repo.ssh_url))
        {
            error!(error = %e, %remote, "could not configure remote");
            return PushOutcome::new(PushStatus::Unknown, e.to_string());
        }

        self.progress.on_progress(-1, -1, "uploading");
        let refspec = format!("refs/heads/{}", self.settings.branch);
        let outcomes = match vcs.push(remote, &refspec, false) {
            Ok(outcomes) => outcomes,
            Err(e) => return classified(&e),
        };

        let status = aggregate(&outcomes);
        let message = report(&outcomes, &repo.ssh_url);
        info!(%status, refs = outcomes.len(), "push finished");
        PushOutcome::new(status, message)
    }
}

/// Fold per-ref outcomes into one status. Accepted and up-to-date refs leave
/// it unchanged; every other outcome overwrites it, so the last one wins.
/// This keeps the positional "last seen wins" order rather than ranking
/// rejections by severity; only one ref is pushed in practice.
pub fn aggregate(outcomes: &[RefUpdateOutcome]) -> PushStatus {
    let mut status = PushStatus::Ok;
    let mut last: Option<RefUpdateStatus> = None;
    for outcome in outcomes {
        let next = match outcome.status {
            RefUpdateStatus::Ok | RefUpdateStatus::UpToDate => continue,
            RefUpdateStatus::RejectedNonFastForward => PushStatus::RejectedNonFastForward,
            RefUpdateStatus::RejectedNoDelete => PushStatus::RejectedNoDelete,
            RefUpdateStatus::RejectedRemoteChanged => PushStatus::RejectedRemoteChanged,
            RefUpdateStatus::RejectedOtherReason => PushStatus::RejectedOtherReason,
            _ => PushStatus::Unknown,
        };
        if let Some(previous) = last {
            if previous != outcome.status {
                warn!(
                    previous = ?previous,
                    current = ?outcome.status,
                    "refs were refused for different reasons, reporting the last"
                );
            }
        }
        last = Some(outcome.status);
        status = next;
    }
    status
}

/// One line per ref, then the server the push went to.
pub fn report(outcomes: &[RefUpdateOutcome], remote_url: &str) -> String {
    let mut message = String::new();
    for outcome in outcomes {
        message.push_str(&outcome.report_line());
        message.push('\n');
    }
    message.push_str(&format!("server details: {}", remote_url));
    message
}

fn classified(err: &(dyn Error + 'static)) -> PushOutcome {
    let (status, message) = classify_with_message(err);
    error!(%status, error = %message, "push failed");
    PushOutcome::new(PushStatus::from(status), message)
}
