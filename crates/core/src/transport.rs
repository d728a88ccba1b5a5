//! Classification of transport failures into a closed status vocabulary.
//!
//! The git engine and the hosting client do not expose a stable typed error
//! for "bad credentials" or "repository does not exist", so the rules below
//! mix typed checks with message inspection. All of that fragility lives in
//! this module: [`classify`] is the only place that looks inside an error.
//!
//! Rules, first match wins:
//!
//! | Signal anywhere in the cause chain | Status |
//! |-----------------------------------|--------|
//! | memory exhaustion | `OutOfMemory` |
//! | transport failure, innermost message is exactly `Auth fail` | `AuthFailure` |
//! | transport failure, a cause mentions `not permitted` | `AuthFailure` |
//! | transport failure with an engine auth code, hosting 401/403 | `AuthFailure` |
//! | transport failure denoting a missing remote repository | `NoRemoteRepo` |
//! | anything else | `Unknown` |

use std::collections::TryReserveError;
use std::error::Error;

use serde::{Deserialize, Serialize};

use crate::errors::{GitError, HostingError};

/// Innermost message the ssh layer produces for rejected credentials.
const AUTH_FAIL: &str = "Auth fail";

/// Substring servers use when refusing a push or clone to a private repo.
const NOT_PERMITTED: &str = "not permitted";

/// Messages that mean the remote repository does not exist.
const MISSING_REPO_MESSAGES: &[&str] = &[
    "repository not found",
    "could not find repository",
    "does not appear to be a git repository",
    "not a git repository",
];

/// Status vocabulary shared by push and pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportStatus {
    AuthFailure,
    NoRemoteRepo,
    OutOfMemory,
    Unknown,
}

impl TransportStatus {
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AuthFailure => Some("sign in to the hosting service again"),
            Self::NoRemoteRepo => Some("create the repository on the hosting service"),
            Self::OutOfMemory => Some("retry with less data in flight"),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthFailure => write!(f, "auth_failure"),
            Self::NoRemoteRepo => write!(f, "no_remote_repo"),
            Self::OutOfMemory => write!(f, "out_of_memory"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify a caught failure by walking its cause chain.
pub fn classify(error: &(dyn Error + 'static)) -> TransportStatus {
    let chain: Vec<&(dyn Error + 'static)> =
        std::iter::successors(Some(error), |&e| e.source()).collect();

    if chain.iter().any(|e| is_out_of_memory(*e)) {
        return TransportStatus::OutOfMemory;
    }

    if chain.iter().any(|e| is_hosting_auth_failure(*e)) {
        return TransportStatus::AuthFailure;
    }

    if !chain.iter().any(|e| is_transport(*e)) {
        return TransportStatus::Unknown;
    }

    let innermost = chain.last().map(|e| message_of(*e)).unwrap_or_default();
    if innermost == AUTH_FAIL {
        return TransportStatus::AuthFailure;
    }

    // The outermost error is our own wrapper; only causes are inspected.
    let causes = &chain[1..];
    if causes
        .iter()
        .any(|e| message_of(*e).contains(NOT_PERMITTED) || is_engine_auth_error(*e))
    {
        return TransportStatus::AuthFailure;
    }

    if chain.iter().any(|e| is_missing_repository(*e)) {
        return TransportStatus::NoRemoteRepo;
    }

    TransportStatus::Unknown
}

/// The classifier's verdict plus the innermost message, for status reports.
pub fn classify_with_message(error: &(dyn Error + 'static)) -> (TransportStatus, String) {
    let status = classify(error);
    let message = std::iter::successors(Some(error), |&e| e.source())
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ");
    (status, message)
}

/// The bare message of an error. `git2::Error`'s `Display` appends its
/// class and code, which would defeat exact matching.
fn message_of(error: &(dyn Error + 'static)) -> String {
    match error.downcast_ref::<git2::Error>() {
        Some(git2) => git2.message().to_string(),
        None => error.to_string(),
    }
}

fn is_out_of_memory(error: &(dyn Error + 'static)) -> bool {
    if let Some(git) = error.downcast_ref::<GitError>() {
        return matches!(git, GitError::OutOfMemory(_));
    }
    if let Some(git2) = error.downcast_ref::<git2::Error>() {
        return git2.class() == git2::ErrorClass::NoMemory;
    }
    error.downcast_ref::<TryReserveError>().is_some()
}

fn is_transport(error: &(dyn Error + 'static)) -> bool {
    if let Some(git) = error.downcast_ref::<GitError>() {
        return matches!(
            git,
            GitError::Transport { .. } | GitError::RemoteRepositoryMissing(_)
        );
    }
    if let Some(git2) = error.downcast_ref::<git2::Error>() {
        return matches!(
            git2.class(),
            git2::ErrorClass::Net
                | git2::ErrorClass::Ssh
                | git2::ErrorClass::Http
                | git2::ErrorClass::Ssl
                | git2::ErrorClass::Callback
        );
    }
    error.downcast_ref::<HostingError>().is_some()
}

fn is_engine_auth_error(error: &(dyn Error + 'static)) -> bool {
    error
        .downcast_ref::<git2::Error>()
        .map(|e| e.code() == git2::ErrorCode::Auth)
        .unwrap_or(false)
}

fn is_hosting_auth_failure(error: &(dyn Error + 'static)) -> bool {
    matches!(
        error.downcast_ref::<HostingError>(),
        Some(HostingError::AuthenticationFailed(_))
    )
}

fn is_missing_repository(error: &(dyn Error + 'static)) -> bool {
    if let Some(GitError::RemoteRepositoryMissing(_)) = error.downcast_ref::<GitError>() {
        return true;
    }
    if let Some(HostingError::ApiError { status: 404, .. }) = error.downcast_ref::<HostingError>()
    {
        return true;
    }
    let message = message_of(error).to_lowercase();
    MISSING_REPO_MESSAGES.iter().any(|m| message.contains(m))
}
