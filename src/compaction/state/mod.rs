// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod hidden_set;

pub use hidden_set::HiddenSet;

use crate::{file::FileId, HashMap};

/// Lowest number of seeks a file can absorb before it is compacted
const MIN_ALLOWED_SEEKS: i64 = 100;

/// One seek is considered as expensive as compacting this many bytes
const BYTES_PER_SEEK: u64 = 16 * 1_024;

/// Bookkeeping of running compactions
///
/// Only accessed under the version set's lock, so marking files
/// is atomic with respect to other pickers.
#[derive(Debug, Default)]
pub struct CompactionState {
    /// Set of file IDs that are being compacted.
    hidden_set: HiddenSet,

    /// Number of running compactions, by base level.
    in_progress: HashMap<usize, usize>,

    /// Per-level picker cursor, see leveled compaction.
    next_compaction_index: HashMap<usize, usize>,

    /// Remaining seek budget per file.
    allowed_seeks: HashMap<FileId, i64>,

    /// File whose seek budget ran out, as (level, file ID).
    file_to_compact: Option<(usize, FileId)>,
}

impl CompactionState {
    /// Returns the set of files being compacted.
    #[must_use]
    pub fn hidden_set(&self) -> &HiddenSet {
        &self.hidden_set
    }

    pub(crate) fn hidden_set_mut(&mut self) -> &mut HiddenSet {
        &mut self.hidden_set
    }

    /// Returns the number of running compactions that start in `level`.
    #[must_use]
    pub fn in_progress(&self, level: usize) -> usize {
        self.in_progress.get(&level).copied().unwrap_or_default()
    }

    /// Returns the number of running compactions.
    #[must_use]
    pub fn total_in_progress(&self) -> usize {
        self.in_progress.values().sum()
    }

    pub(crate) fn register_in_progress(&mut self, level: usize) {
        *self.in_progress.entry(level).or_default() += 1;
    }

    pub(crate) fn unregister_in_progress(&mut self, level: usize) {
        if let Some(count) = self.in_progress.get_mut(&level) {
            *count = count.saturating_sub(1);

            if *count == 0 {
                self.in_progress.remove(&level);
            }
        }
    }

    /// Returns the position the leveled picker continues from in `level`.
    #[must_use]
    pub fn next_compaction_index(&self, level: usize) -> usize {
        self.next_compaction_index
            .get(&level)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn set_next_compaction_index(&mut self, level: usize, idx: usize) {
        self.next_compaction_index.insert(level, idx);
    }

    /// Makes the picker re-evaluate `level` from the start.
    pub fn reset_next_compaction_index(&mut self, level: usize) {
        self.next_compaction_index.remove(&level);
    }

    /// Charges a seek against a file's budget.
    ///
    /// Returns `true` if the budget ran out and the file became
    /// a seek compaction candidate.
    pub(crate) fn charge_seek(&mut self, level: usize, id: FileId, file_size: u64) -> bool {
        let budget = self.allowed_seeks.entry(id).or_insert_with(|| {
            let allowed = i64::try_from(file_size / BYTES_PER_SEEK).unwrap_or(i64::MAX);
            allowed.max(MIN_ALLOWED_SEEKS)
        });

        *budget -= 1;

        if *budget <= 0 && self.file_to_compact.is_none() {
            self.file_to_compact = Some((level, id));
            return true;
        }

        false
    }

    /// Returns the seek compaction candidate, if any.
    #[must_use]
    pub fn file_to_compact(&self) -> Option<(usize, FileId)> {
        self.file_to_compact
    }

    pub(crate) fn clear_file_to_compact(&mut self, id: FileId) {
        self.allowed_seeks.remove(&id);

        if self.file_to_compact.is_some_and(|(_, x)| x == id) {
            self.file_to_compact = None;
        }
    }

    /// Drops the seek budgets of files that were compacted.
    pub(crate) fn forget_seeks(&mut self, ids: impl IntoIterator<Item = FileId>) {
        for id in ids {
            self.clear_file_to_compact(id);
        }
    }

    /// Returns the number of files with a seek budget.
    #[must_use]
    pub fn tracked_seek_count(&self) -> usize {
        self.allowed_seeks.len()
    }
}
