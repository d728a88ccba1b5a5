//! transync command-line tool.
//!
//! Pulls and pushes translation documents against the configured hosting
//! service, merges two local copies of one document, and lists the
//! candidate resolutions of a conflict-marked file.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use transync_core::config::SyncConfig;
use transync_core::git::{GitClient, GitCredentials, GitTranslationMerge, HostingClient};
use transync_core::models::{HostingSession, MergeStrategy, WorkingCopy};
use transync_core::progress::TracingProgress;
use transync_core::storage::{DirectoryQuarantine, FileSettingsCache};
use transync_core::sync::{
    EmptyOutbox, LocalTranslationMerger, PullOrchestrator, PushOrchestrator,
};
use transync_core::MergeConflictExtractor;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// transync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "transync",
    version,
    about = "Synchronize translation documents with a git hosting service"
)]
struct Cli {
    /// Path to the TOML configuration file.
    /// Defaults to `<config dir>/transync/config.toml`.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./transync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Pull remote changes into a working copy.
    Pull {
        /// Working copy directory; its name is the document id.
        dir: PathBuf,

        /// Merge strategy for overlapping edits.
        #[arg(short, long, value_enum, default_value_t = StrategyArg::Recursive)]
        strategy: StrategyArg,

        /// Pull from this URL instead of the hosting service's repository.
        #[arg(long)]
        remote_url: Option<String>,
    },

    /// Push a working copy to the hosting service.
    Push {
        /// Working copy directory; its name is the document id.
        dir: PathBuf,
    },

    /// Merge one local copy of a document into another.
    Merge {
        /// Copy that receives the changes.
        destination: PathBuf,

        /// Copy whose changes are merged in.
        source: PathBuf,

        /// Delete the source copy and its cached settings after a merge.
        #[arg(long)]
        delete_source: bool,
    },

    /// List the texts a conflict-marked file could resolve to.
    Candidates {
        /// File containing conflict markers.
        file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StrategyArg {
    Recursive,
    Ours,
    Theirs,
}

impl From<StrategyArg> for MergeStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Recursive => MergeStrategy::Recursive,
            StrategyArg::Ours => MergeStrategy::Ours,
            StrategyArg::Theirs => MergeStrategy::Theirs,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    let level = SyncConfig::load_from_file(&config_path)
        .map(|c| c.log_level)
        .unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .with_target(false)
        .without_time()
        .init();

    match run(cli.command, &config_path) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// Run one subcommand; `Ok(false)` means it completed with a failure status.
fn run(command: Commands, config_path: &Path) -> Result<bool> {
    match command {
        Commands::Init { output } => cmd_init(&output).map(|()| true),
        Commands::Validate => cmd_validate(config_path).map(|()| true),
        Commands::Candidates { file } => cmd_candidates(&file).map(|()| true),
        Commands::Merge {
            destination,
            source,
            delete_source,
        } => {
            let config = load_config(config_path)?;
            cmd_merge(&config, &destination, &source, delete_source)
        }
        Commands::Pull {
            dir,
            strategy,
            remote_url,
        } => {
            let config = load_config(config_path)?;
            cmd_pull(&config, &dir, strategy.into(), remote_url.as_deref())
        }
        Commands::Push { dir } => {
            let config = load_config(config_path)?;
            cmd_push(&config, &dir)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("transync")
        .join("config.toml")
}

fn load_config(path: &Path) -> Result<SyncConfig> {
    let mut config = SyncConfig::load_from_file(path).context("failed to load configuration file")?;
    if let Err(e) = config.resolve_env_vars() {
        warn!(error = %e, "hosting token not available");
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Sign in with the configured token. No session means the orchestrators
/// report an authentication failure.
fn sign_in(config: &SyncConfig, hosting: &HostingClient) -> Option<HostingSession> {
    let token = config.hosting.token.as_deref()?;
    match hosting.authenticate(token) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(error = %e, "could not sign in to the hosting service");
            None
        }
    }
}

fn hosting_client(config: &SyncConfig) -> Result<HostingClient> {
    Ok(HostingClient::new(&config.hosting.api_url)
        .context("failed to build hosting client")?
        .with_private_repos(config.hosting.private))
}

fn open_copy(config: &SyncConfig, dir: &Path) -> Result<(WorkingCopy, GitClient)> {
    let copy = WorkingCopy::from_dir(dir);
    let client = GitClient::new(dir)
        .with_context(|| format!("failed to open working copy {}", dir.display()))?
        .with_author(&config.author.name, &config.author.email)
        .with_credentials(GitCredentials {
            ssh_key_path: config.hosting.ssh_key_path.clone(),
            username: config.hosting.username.clone(),
            token: config.hosting.token.clone(),
        })
        .with_progress(Arc::new(TracingProgress));
    Ok((copy, client))
}

fn print_outcome(label: &str, success: bool, message: Option<&str>, hint: Option<&str>) {
    if success {
        println!("{}", style::success(label));
    } else {
        println!("{}", style::error(label));
    }
    if let Some(message) = message.filter(|m| !m.is_empty()) {
        for line in message.lines() {
            println!("  {}", style::dim(line));
        }
    }
    if let Some(hint) = hint {
        println!("{}", style::warn(hint));
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, SyncConfig::default_template())
        .context("failed to write config file")?;

    println!("{}", style::success(&format!("configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your hosting service details");
    println!("  2. Set the token environment variable (TRANSYNC_HOSTING_TOKEN)");
    println!("  3. Validate with: transync validate --config {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        SyncConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.resolve_env_vars() {
        Ok(()) => println!("  [OK] Hosting token resolved"),
        Err(e) => println!("  [WARN] {}", e),
    }

    if let Err(e) = config.validate() {
        println!("  [FAIL] Validation error: {}", e);
        anyhow::bail!("configuration validation failed");
    }
    println!("  [OK] All required fields are valid");

    println!();
    println!("{}", style::header("Configuration summary:"));
    println!("  API URL        : {}", config.hosting.api_url);
    println!("  Username       : {}", config.hosting.username);
    println!(
        "  Token          : {}",
        if config.hosting.token.is_some() {
            "set"
        } else {
            "NOT SET"
        }
    );
    println!(
        "  SSH key        : {}",
        config
            .hosting
            .ssh_key_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "ssh agent".to_string())
    );
    println!("  Remote / branch: {} / {}", config.sync.remote_name, config.sync.branch);
    println!("  Backup branch  : {}", config.sync.backup_branch);
    println!("  Quarantine dir : {}", config.storage.quarantine_dir.display());
    println!();
    println!("Configuration is valid.");
    Ok(())
}

fn cmd_pull(
    config: &SyncConfig,
    dir: &Path,
    strategy: MergeStrategy,
    remote_url: Option<&str>,
) -> Result<bool> {
    let hosting = hosting_client(config)?;
    let session = sign_in(config, &hosting);
    let (copy, client) = open_copy(config, dir)?;

    let orchestrator = PullOrchestrator::new(
        Arc::new(hosting),
        Arc::new(EmptyOutbox),
        Arc::new(TracingProgress),
        session,
    )
    .with_settings(config.sync.clone());
    let outcome = orchestrator.pull(&copy, &client, strategy, remote_url);

    print_outcome(
        &format!("pull {}: {}", copy.id, outcome.status),
        outcome.status.is_success(),
        outcome.message.as_deref(),
        outcome.status.hint(),
    );
    Ok(outcome.status.is_success())
}

fn cmd_push(config: &SyncConfig, dir: &Path) -> Result<bool> {
    let hosting = hosting_client(config)?;
    let session = sign_in(config, &hosting);
    let (copy, client) = open_copy(config, dir)?;

    let orchestrator = PushOrchestrator::new(Arc::new(hosting), Arc::new(TracingProgress), session)
        .with_settings(config.sync.clone());
    let outcome = orchestrator.push(&copy, &client);

    print_outcome(
        &format!("push {}: {}", copy.id, outcome.status),
        outcome.status.is_success(),
        Some(&outcome.message),
        outcome.status.hint(),
    );
    Ok(outcome.status.is_success())
}

fn cmd_merge(
    config: &SyncConfig,
    destination: &Path,
    source: &Path,
    delete_source: bool,
) -> Result<bool> {
    let merger = LocalTranslationMerger::new(
        Arc::new(GitTranslationMerge::new(
            &config.author.name,
            &config.author.email,
        )),
        Arc::new(DirectoryQuarantine::new(&config.storage.quarantine_dir)),
        Arc::new(FileSettingsCache::new(&config.storage.settings_dir)),
    );
    let outcome = merger.merge(
        WorkingCopy::from_dir(destination),
        WorkingCopy::from_dir(source),
        delete_source,
    );

    print_outcome(
        &format!(
            "merge {} into {}: {}",
            outcome.source.id, outcome.destination.id, outcome.status
        ),
        outcome.success,
        None,
        outcome.status.hint(),
    );
    Ok(outcome.success)
}

fn cmd_candidates(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    if !MergeConflictExtractor::has_conflict_markers(&text) {
        println!("{}", style::dim("no conflict markers found"));
    }
    let candidates = MergeConflictExtractor::extract(&text);
    for (i, candidate) in candidates.iter().enumerate() {
        println!("{}", style::header(&format!("--- candidate {} ---", i + 1)));
        print!("{}", candidate);
        if !candidate.ends_with('\n') {
            println!();
        }
    }
    println!();
    println!("{} candidate(s)", candidates.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_pull_defaults_to_recursive() {
        let cli = Cli::try_parse_from(["transync", "pull", "/tmp/doc"]).unwrap();
        match cli.command {
            Commands::Pull {
                strategy,
                remote_url,
                ..
            } => {
                assert_eq!(MergeStrategy::from(strategy), MergeStrategy::Recursive);
                assert!(remote_url.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_merge_flags() {
        let cli = Cli::try_parse_from([
            "transync",
            "--config",
            "/tmp/c.toml",
            "merge",
            "/tmp/a",
            "/tmp/b",
            "--delete-source",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(
            cli.command,
            Commands::Merge {
                delete_source: true,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!(Cli::try_parse_from(["transync", "pull", "/tmp/doc", "-s", "octopus"]).is_err());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("transync.toml");
        cmd_init(&output).unwrap();
        assert!(SyncConfig::load_from_file(&output).is_ok());
        assert!(cmd_init(&output).is_err());
    }
}
