//! On-disk stores that live beside the working copies: the quarantine for
//! damaged copies and the per-document settings cache.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::models::WorkingCopy;
use crate::sync::{Quarantine, SettingsCache};

// ---------------------------------------------------------------------------
// Quarantine
// ---------------------------------------------------------------------------

/// Copies damaged working copies into timestamped directories under `root`.
#[derive(Debug, Clone)]
pub struct DirectoryQuarantine {
    root: PathBuf,
}

impl DirectoryQuarantine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Quarantine for DirectoryQuarantine {
    fn backup(&self, copy: &WorkingCopy) -> io::Result<PathBuf> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let target = self.root.join(format!("{}-{}", copy.id, stamp));
        std::fs::create_dir_all(&target)?;

        let mut files = 0usize;
        for entry in WalkDir::new(&copy.path) {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(&copy.path)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let dest = target.join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&dest)?;
            } else if entry.file_type().is_file() {
                std::fs::copy(entry.path(), &dest)?;
                files += 1;
            }
        }
        info!(document_id = %copy.id, path = %target.display(), files, "quarantined working copy");
        Ok(target)
    }
}

// ---------------------------------------------------------------------------
// Settings cache
// ---------------------------------------------------------------------------

/// Per-document settings kept as `<dir>/<document id>.json`.
#[derive(Debug, Clone)]
pub struct FileSettingsCache {
    dir: PathBuf,
}

impl FileSettingsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, document_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", document_id))
    }
}

impl SettingsCache for FileSettingsCache {
    fn remove(&self, document_id: &str) -> io::Result<()> {
        let path = self.path_for(document_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(document_id, "removed cached settings");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
