//! transync core library.
//!
//! Synchronizes translation documents, each versioned as its own git
//! repository, with a repository-hosting service: pull and push with a fixed
//! conflict policy, classification of transport failures, decomposition of
//! conflict-marked text into candidate resolutions, and merging of two local
//! copies of one document.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod manifest;
pub mod models;
pub mod progress;
pub mod storage;
pub mod sync;
pub mod transport;

// Re-exports for convenience.
pub use config::SyncConfig;
pub use conflict::MergeConflictExtractor;
pub use git::{GitClient, GitTranslationMerge, HostingClient};
pub use manifest::Manifest;
pub use storage::{DirectoryQuarantine, FileSettingsCache};
pub use sync::{LocalTranslationMerger, PullOrchestrator, PushOrchestrator};
pub use transport::{classify, TransportStatus};
