//! Merge two local working copies of the same document.
//!
//! A source copy the merge cannot read is quarantined and removed; the
//! destination keeps any conflict markers for the user to resolve.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::models::{LocalMergeOutcome, LocalMergeStatus, WorkingCopy};
use crate::sync::{Quarantine, SettingsCache, TranslationMerge};

pub struct LocalTranslationMerger {
    merger: Arc<dyn TranslationMerge>,
    quarantine: Arc<dyn Quarantine>,
    settings: Arc<dyn SettingsCache>,
}

impl LocalTranslationMerger {
    pub fn new(
        merger: Arc<dyn TranslationMerge>,
        quarantine: Arc<dyn Quarantine>,
        settings: Arc<dyn SettingsCache>,
    ) -> Self {
        Self {
            merger,
            quarantine,
            settings,
        }
    }

    #[instrument(skip_all, fields(destination = %destination.id, source = %source.id))]
    pub fn merge(
        &self,
        destination: WorkingCopy,
        source: WorkingCopy,
        delete_source_on_success: bool,
    ) -> LocalMergeOutcome {
        let quarantine = &self.quarantine;
        let mut on_corrupt = |copy: &WorkingCopy| {
            match quarantine.backup(copy) {
                Ok(path) => info!(backup = %path.display(), "backed up corrupt copy"),
                Err(e) => warn!(error = %e, "could not back up corrupt copy"),
            }
            if let Err(e) = std::fs::remove_dir_all(&copy.path) {
                warn!(error = %e, path = %copy.path.display(), "could not remove corrupt copy");
            }
        };

        let (success, status) = match self.merger.merge_from(&destination, &source, &mut on_corrupt)
        {
            Ok(report) if report.conflicted.is_empty() => (true, LocalMergeStatus::Success),
            Ok(report) => {
                warn!(conflicts = report.conflicted.len(), "merge left conflict markers");
                (true, LocalMergeStatus::MergeConflicts)
            }
            Err(e) => {
                error!(error = %e, "local merge failed");
                (false, LocalMergeStatus::MergeError)
            }
        };

        if success && delete_source_on_success {
            if let Err(e) = std::fs::remove_dir_all(&source.path) {
                warn!(error = %e, path = %source.path.display(), "could not delete source copy");
            }
            if let Err(e) = self.settings.remove(&source.id) {
                warn!(error = %e, "could not delete cached settings");
            }
            info!("deleted merged source copy");
        }

        LocalMergeOutcome {
            success,
            status,
            destination,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::fakes::*;

    struct Fixture {
        root: tempfile::TempDir,
        quarantine: Arc<FakeQuarantine>,
        settings: Arc<FakeSettings>,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            std::fs::create_dir(root.path().join("dest")).unwrap();
            std::fs::create_dir(root.path().join("src")).unwrap();
            std::fs::write(root.path().join("src/manifest.json"), "{}").unwrap();
            Self {
                root,
                quarantine: Arc::new(FakeQuarantine::default()),
                settings: Arc::new(FakeSettings::default()),
            }
        }

        fn run(&self, behavior: MergeBehavior, delete_source: bool) -> LocalMergeOutcome {
            let merger = LocalTranslationMerger::new(
                Arc::new(FakeMerge { behavior }),
                self.quarantine.clone(),
                self.settings.clone(),
            );
            merger.merge(
                WorkingCopy::new("dest", self.root.path().join("dest")),
                WorkingCopy::new("src", self.root.path().join("src")),
                delete_source,
            )
        }
    }

    #[test]
    fn test_clean_merge_keeps_source_by_default() {
        let fx = Fixture::new();
        let outcome = fx.run(MergeBehavior::Clean, false);
        assert!(outcome.success);
        assert_eq!(outcome.status, LocalMergeStatus::Success);
        assert!(outcome.source.path.exists());
        assert!(fx.settings.removed.borrow().is_empty());
    }

    #[test]
    fn test_conflicts_are_still_success() {
        let fx = Fixture::new();
        let outcome = fx.run(MergeBehavior::Conflicts(vec!["01/01.txt".into()]), false);
        assert!(outcome.success);
        assert_eq!(outcome.status, LocalMergeStatus::MergeConflicts);
    }

    #[test]
    fn test_delete_source_on_success() {
        let fx = Fixture::new();
        let outcome = fx.run(MergeBehavior::Clean, true);
        assert!(outcome.success);
        assert!(!outcome.source.path.exists());
        assert_eq!(*fx.settings.removed.borrow(), vec!["src".to_string()]);
    }

    #[test]
    fn test_failure_never_deletes_source() {
        let fx = Fixture::new();
        let outcome = fx.run(MergeBehavior::Fail, true);
        assert!(!outcome.success);
        assert_eq!(outcome.status, LocalMergeStatus::MergeError);
        assert!(outcome.source.path.exists());
        assert!(fx.settings.removed.borrow().is_empty());
    }

    #[test]
    fn test_corrupt_source_is_quarantined_and_removed() {
        let fx = Fixture::new();
        let outcome = fx.run(MergeBehavior::Corrupt, false);
        assert_eq!(outcome.status, LocalMergeStatus::MergeError);
        assert_eq!(*fx.quarantine.backed_up.borrow(), vec!["src".to_string()]);
        assert!(!outcome.source.path.exists());
    }

    #[test]
    fn test_corrupt_source_removed_even_if_backup_fails() {
        let mut fx = Fixture::new();
        fx.quarantine = Arc::new(FakeQuarantine {
            fail: true,
            ..FakeQuarantine::default()
        });
        let outcome = fx.run(MergeBehavior::Corrupt, false);
        assert!(!outcome.success);
        assert!(!outcome.source.path.exists());
    }
}
