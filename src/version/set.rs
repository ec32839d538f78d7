// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{FileRegistry, Version, VersionEdit};
use crate::{
    compaction::{manual::compact_range, Compaction, CompactionState, CompactionStrategy, Strategy},
    config::Config,
    file::{FileId, FileRef},
    SequenceNumberCounter,
};
use std::sync::{Arc, Mutex, MutexGuard};

struct Inner {
    current: Version,
    state: CompactionState,
}

/// Owns the current version and the bookkeeping of running compactions
///
/// All changes go through a single lock, which is only held briefly:
/// while picking a compaction (to mark its inputs) and while installing
/// its results. Merging itself runs without holding the lock, against
/// the version the compaction was picked from.
pub struct VersionSet {
    config: Config,
    registry: Arc<FileRegistry>,
    file_ids: SequenceNumberCounter,
    version_ids: SequenceNumberCounter,
    inner: Mutex<Inner>,
}

impl VersionSet {
    /// Creates a version set with an empty initial version.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(FileRegistry::default());
        let version_ids = SequenceNumberCounter::default();

        let current = Version::new_tracked(
            version_ids.next(),
            usize::from(config.level_count),
            registry.clone(),
        );

        Self {
            config,
            registry,
            file_ids: SequenceNumberCounter::new(1),
            version_ids,
            inner: Mutex::new(Inner {
                current,
                state: CompactionState::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("lock is poisoned")
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the file reference counts.
    #[must_use]
    pub fn registry(&self) -> &Arc<FileRegistry> {
        &self.registry
    }

    /// Returns the current version.
    #[must_use]
    pub fn current(&self) -> Version {
        self.lock().current.clone()
    }

    /// Allocates a new file ID.
    #[must_use]
    pub fn next_file_id(&self) -> FileId {
        self.file_ids.next()
    }

    fn apply_locked(&self, inner: &mut Inner, edit: &VersionEdit) -> crate::Result<Version> {
        let next = inner.current.apply(self.version_ids.get(), edit)?;

        // NOTE: Only consume the ID if the edit was valid
        let _ = self.version_ids.next();

        if let Some(max_id) = edit.new_files().iter().map(|(_, f)| f.id).max() {
            self.file_ids.fetch_max(max_id + 1);
        }

        log::debug!("Installed version {}: {edit}", next.id());

        inner.current = next.clone();

        Ok(next)
    }

    /// Applies an edit to the current version, installing the result as the new current version.
    ///
    /// # Errors
    ///
    /// Returns error if the edit is invalid, in which case the current version is unchanged.
    pub fn log_and_apply(&self, edit: &VersionEdit) -> crate::Result<Version> {
        let mut inner = self.lock();
        self.apply_locked(&mut inner, edit)
    }

    /// Asks the strategy for the next compaction.
    ///
    /// The inputs of the returned compaction are marked as being compacted,
    /// so the compaction must be handed back through
    /// [`VersionSet::install_compaction_results`].
    pub fn pick_compaction(&self, strategy: &Strategy) -> Option<Compaction> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        log::trace!("Consulting compaction strategy {:?}", strategy.get_name());

        strategy.pick(&inner.current, &self.config, &mut inner.state)
    }

    /// Plans a manual compaction of a key range, see [`compact_range`].
    ///
    /// # Errors
    ///
    /// Returns error if a file in the range is already being compacted,
    /// or the levels are invalid.
    pub fn compact_range(
        &self,
        strategy: &Strategy,
        input_level: usize,
        output_level: usize,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> crate::Result<Option<Compaction>> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        compact_range(
            &inner.current,
            &self.config,
            &mut inner.state,
            strategy,
            input_level,
            output_level,
            begin,
            end,
        )
    }

    /// Finishes a compaction.
    ///
    /// If `status` is `Ok`, the compaction's edit is applied. Either way, the compaction's
    /// input version and files are released, so the files can be picked again.
    ///
    /// # Errors
    ///
    /// Returns the compaction's error, or an error if its edit could not be applied.
    pub fn install_compaction_results(
        &self,
        compaction: &mut Compaction,
        status: crate::Result<()>,
    ) -> crate::Result<()> {
        let mut inner = self.lock();

        let status = status.and_then(|()| {
            let edit = compaction.take_edit();
            self.apply_locked(&mut inner, &edit).map(|_| ())
        });

        compaction.release_inputs();
        compaction.release_compaction_files(&mut inner.state, &status);

        if let Err(e) = &status {
            log::warn!("Compaction {compaction} was not installed: {e:?}");
        }

        status
    }

    /// Charges a seek miss against a file.
    ///
    /// Once a file absorbed too many seeks, it is compacted by the leveled strategy.
    ///
    /// Returns `true` if the file became a seek compaction candidate.
    pub fn record_seek_miss(&self, level: usize, id: FileId) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let Some(size) = inner
            .current
            .level(level)
            .and_then(|files| files.iter().find(|f| f.id == id))
            .map(|f| f.file_size)
        else {
            return false;
        };

        inner.state.charge_seek(level, id, size)
    }

    /// Returns `true` if the file is being compacted.
    #[must_use]
    pub fn is_being_compacted(&self, id: FileId) -> bool {
        self.lock().state.hidden_set().is_hidden(id)
    }

    /// Returns the number of running compactions.
    #[must_use]
    pub fn compactions_in_progress(&self) -> usize {
        self.lock().state.total_in_progress()
    }

    /// Drains files that are no longer referenced by any live version.
    #[must_use]
    pub fn take_obsolete_files(&self) -> Vec<FileRef> {
        self.registry.take_obsolete()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{compaction::Leveled, file::FileMetaData, key::InternalKey, ValueType};
    use test_log::test;

    fn f(id: FileId, min: &str, max: &str, size: u64) -> FileMetaData {
        FileMetaData::new(
            id,
            InternalKey::new(min, id, ValueType::Value),
            InternalKey::new(max, id, ValueType::Value),
            size,
        )
    }

    fn populated() -> crate::Result<VersionSet> {
        let set = VersionSet::new(Config::default().level_count(4));

        let mut edit = VersionEdit::new();
        edit.add_file(1, f(1, "a", "m", 500_000_000));
        edit.add_file(2, f(2, "a", "g", 10));
        edit.add_file(2, f(3, "h", "z", 10));
        set.log_and_apply(&edit)?;

        Ok(set)
    }

    #[test]
    fn version_set_log_and_apply() -> crate::Result<()> {
        let set = populated()?;

        let current = set.current();
        assert_eq!(1, current.id());
        assert_eq!(3, current.file_count());
        assert_eq!(4, set.next_file_id());

        // Invalid edits leave the current version untouched
        let mut edit = VersionEdit::new();
        edit.delete_file(0, 1);
        assert!(set.log_and_apply(&edit).is_err());
        assert_eq!(1, set.current().id());

        let mut edit = VersionEdit::new();
        edit.delete_file(1, 1);
        assert_eq!(2, set.log_and_apply(&edit)?.id());

        Ok(())
    }

    #[test]
    fn version_set_install_success() -> crate::Result<()> {
        let set = populated()?;
        let strategy = Strategy::Leveled(Leveled::default());

        let mut compaction = set.pick_compaction(&strategy).expect("should compact");
        assert_eq!(1, compaction.base_level());
        assert!(set.is_being_compacted(1));
        assert!(set.is_being_compacted(2));
        assert_eq!(1, set.compactions_in_progress());

        // Nothing else to do while the level is being compacted
        assert!(set.pick_compaction(&strategy).is_none());

        let input_version = set.current();

        let mut edit = VersionEdit::new();
        compaction.add_input_deletions(&mut edit);
        edit.add_file(2, f(4, "a", "z", 100));
        *compaction.edit_mut() = edit;

        set.install_compaction_results(&mut compaction, Ok(()))?;

        assert!(!set.is_being_compacted(1));
        assert_eq!(0, set.compactions_in_progress());
        assert!(compaction.input_version().is_none());

        let current = set.current();
        assert_eq!(1, current.file_count());
        assert_eq!(Some(2), current.get_file(4).map(|(lvl, _)| lvl));

        // Input files are still pinned by the old version
        assert!(set.take_obsolete_files().is_empty());
        drop(input_version);

        let mut obsolete = set
            .take_obsolete_files()
            .iter()
            .map(|f| f.id)
            .collect::<Vec<_>>();
        obsolete.sort_unstable();
        assert_eq!(vec![1, 2, 3], obsolete);

        Ok(())
    }

    #[test]
    fn version_set_install_failure() -> crate::Result<()> {
        let set = populated()?;
        let strategy = Strategy::Leveled(Leveled::default());

        let mut compaction = set.pick_compaction(&strategy).expect("should compact");
        compaction.edit_mut().add_file(2, f(4, "a", "z", 100));

        let result = set.install_compaction_results(&mut compaction, Err(crate::Error::Stopped));
        assert!(matches!(result, Err(crate::Error::Stopped)));

        assert!(!set.is_being_compacted(1));
        assert_eq!(0, set.compactions_in_progress());
        assert_eq!(1, set.current().id());
        assert_eq!(3, set.current().file_count());

        // Files can be picked again
        let mut compaction = set.pick_compaction(&strategy).expect("should compact");
        set.install_compaction_results(&mut compaction, Err(crate::Error::Stopped))
            .ok();

        Ok(())
    }

    #[test]
    fn version_set_invalid_edit_releases_files() -> crate::Result<()> {
        let set = populated()?;
        let strategy = Strategy::Leveled(Leveled::default());

        let mut compaction = set.pick_compaction(&strategy).expect("should compact");

        // Collides with the L2 files that are not deleted
        compaction.edit_mut().delete_file(1, 1);
        compaction.edit_mut().add_file(2, f(9, "a", "z", 100));

        let result = set.install_compaction_results(&mut compaction, Ok(()));
        assert!(matches!(result, Err(crate::Error::InvalidVersionEdit(_))));
        assert!(!set.is_being_compacted(1));
        assert_eq!(3, set.current().file_count());

        Ok(())
    }

    #[test]
    fn version_set_seek_miss() -> crate::Result<()> {
        let set = populated()?;

        assert!(!set.record_seek_miss(1, 99));

        let mut triggered = false;
        for _ in 0..100_000 {
            if set.record_seek_miss(2, 2) {
                triggered = true;
                break;
            }
        }
        assert!(triggered);

        Ok(())
    }
}
