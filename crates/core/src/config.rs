//! TOML-based configuration for transync.
//!
//! Sensitive values (the hosting token) are stored as `_env` fields that
//! reference environment variable names. The actual secrets are resolved at
//! runtime via [`SyncConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Repository-hosting service settings.
    pub hosting: HostingConfig,

    /// Sync behaviour settings.
    #[serde(default)]
    pub sync: SyncSection,

    /// Where quarantined copies and per-document settings live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Identity recorded on sync commits.
    #[serde(default)]
    pub author: AuthorConfig,
}

fn default_log_level() -> String {
    "info".into()
}

// ---------------------------------------------------------------------------
// Hosting
// ---------------------------------------------------------------------------

/// Repository-hosting REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingConfig {
    /// REST API base URL (e.g. `https://git.door43.org/api/v1`).
    pub api_url: String,

    /// Account that owns the document repositories.
    pub username: String,

    /// Environment variable holding the API access token.
    pub token_env: String,

    /// Private key used for ssh transport. The ssh agent is used when unset.
    #[serde(default)]
    pub ssh_key_path: Option<PathBuf>,

    /// Whether newly created repositories are private.
    #[serde(default)]
    pub private: bool,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_remote_name")]
    pub remote_name: String,

    /// Branch pulled from and pushed to.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Branch force-created at HEAD before every pull.
    #[serde(default = "default_backup_branch")]
    pub backup_branch: String,

    /// Maximum results requested from a repository search.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_remote_name() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "master".into()
}
fn default_backup_branch() -> String {
    "backup-master".into()
}
fn default_search_limit() -> usize {
    50
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            remote_name: default_remote_name(),
            branch: default_branch(),
            backup_branch: default_backup_branch(),
            search_limit: default_search_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: PathBuf,

    #[serde(default = "default_settings_dir")]
    pub settings_dir: PathBuf,
}

fn default_quarantine_dir() -> PathBuf {
    PathBuf::from("~/.local/share/transync/quarantine")
}
fn default_settings_dir() -> PathBuf {
    PathBuf::from("~/.local/share/transync/settings")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            quarantine_dir: default_quarantine_dir(),
            settings_dir: default_settings_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Author
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorConfig {
    #[serde(default = "default_author_name")]
    pub name: String,
    #[serde(default = "default_author_email")]
    pub email: String,
}

fn default_author_name() -> String {
    "transync".into()
}
fn default_author_email() -> String {
    "transync@localhost".into()
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: default_author_name(),
            email: default_author_email(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Load a [`SyncConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: SyncConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.storage.quarantine_dir = expand_home(&config.storage.quarantine_dir);
        config.storage.settings_dir = expand_home(&config.storage.settings_dir);
        config.hosting.ssh_key_path = config.hosting.ssh_key_path.as_deref().map(expand_home);

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        let var = &self.hosting.token_env;
        match std::env::var(var) {
            Ok(val) if !val.is_empty() => {
                debug!(env_name = %var, "resolved hosting token");
                self.hosting.token = Some(val);
                Ok(())
            }
            Ok(_) => {
                warn!(env_name = %var, "hosting token env var is set but empty");
                Err(ConfigError::EnvVarMissing {
                    var: var.clone(),
                    field: "hosting.token_env".into(),
                })
            }
            Err(_) => Err(ConfigError::EnvVarMissing {
                var: var.clone(),
                field: "hosting.token_env".into(),
            }),
        }
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosting.api_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "hosting.api_url".into(),
                detail: "API URL must not be empty".into(),
            });
        }
        if self.hosting.username.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "hosting.username".into(),
                detail: "username must not be empty".into(),
            });
        }
        if self.sync.remote_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.remote_name".into(),
                detail: "remote name must not be empty".into(),
            });
        }
        if self.sync.branch.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.branch".into(),
                detail: "branch must not be empty".into(),
            });
        }
        if self.sync.backup_branch.is_empty() || self.sync.backup_branch == self.sync.branch {
            return Err(ConfigError::InvalidValue {
                field: "sync.backup_branch".into(),
                detail: "backup branch must be set and differ from the sync branch".into(),
            });
        }
        if self.sync.search_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.search_limit".into(),
                detail: "search limit must be > 0".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# transync configuration
log_level = "info"

[hosting]
api_url = "https://git.door43.org/api/v1"
username = "your_username"
token_env = "TRANSYNC_HOSTING_TOKEN"
# ssh_key_path = "~/.ssh/id_ed25519"  # ssh agent is used when unset
private = false

[sync]
remote_name = "origin"
branch = "master"
backup_branch = "backup-master"
search_limit = 50

[storage]
quarantine_dir = "~/.local/share/transync/quarantine"
settings_dir = "~/.local/share/transync/settings"

[author]
name = "transync"
email = "transync@localhost"
"#
    }
}

/// Replace a leading `~` with the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
