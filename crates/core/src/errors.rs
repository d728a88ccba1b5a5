//! Error types for the transync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type. The sync orchestrators never surface these directly:
//! they fold them into status values (see [`crate::transport`]).

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Hosting(#[from] HostingError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from working-copy (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// A network exchange with a remote failed. The engine's own error is
    /// kept as the source so the transport classifier can inspect it.
    #[error("transport failure talking to remote '{remote}'")]
    Transport {
        remote: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The remote repository does not exist on the server.
    #[error("no such remote repository: {0}")]
    RemoteRepositoryMissing(String),

    /// The engine ran out of memory (large pack or diff).
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// A working copy is damaged beyond a structural merge.
    #[error("working copy at '{path}' is corrupt: {detail}")]
    CorruptCopy { path: String, detail: String },

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Hosting API errors
// ---------------------------------------------------------------------------

/// Errors from the repository-hosting REST API.
#[derive(Debug, Error)]
pub enum HostingError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("hosting HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("hosting API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Authentication token is missing or invalid.
    #[error("hosting authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("hosting rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    /// JSON deserialization failure.
    #[error("hosting response parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Manifest errors
// ---------------------------------------------------------------------------

/// Errors from reading or writing a document manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No `manifest.json` in the working copy.
    #[error("manifest not found at '{0}'")]
    NotFound(String),

    /// The manifest is not valid JSON (or not a JSON object).
    #[error("manifest at '{path}' is invalid: {detail}")]
    Invalid { path: String, detail: String },

    /// Generic I/O wrapper.
    #[error("manifest I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
