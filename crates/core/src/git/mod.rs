//! Git engine and hosting-service adapters.

pub mod client;
pub mod hosting;
pub mod remote_url;
pub mod translation_merge;

pub use client::{GitClient, GitCredentials};
pub use hosting::HostingClient;
pub use translation_merge::GitTranslationMerge;
