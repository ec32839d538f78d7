// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::file::FileId;

/// The hidden set keeps track of which files are currently being compacted
///
/// When a file is hidden (being compacted), no other compaction can include that
/// file, or it will be declined to be run.
///
/// When a compaction finishes or fails, its files are shown again (removed from the hidden set).
#[derive(Clone, Debug, Default)]
pub struct HiddenSet {
    set: crate::HashSet<FileId>,
}

impl HiddenSet {
    pub(crate) fn hide<T: IntoIterator<Item = FileId>>(&mut self, ids: T) {
        self.set.extend(ids);
    }

    pub(crate) fn show<T: IntoIterator<Item = FileId>>(&mut self, ids: T) {
        for id in ids {
            self.set.remove(&id);
        }
    }

    /// Returns `true` if any of the files is hidden.
    pub fn is_blocked<T: IntoIterator<Item = FileId>>(&self, ids: T) -> bool {
        ids.into_iter().any(|id| self.is_hidden(id))
    }

    /// Returns `true` if the file is being compacted.
    #[must_use]
    pub fn is_hidden(&self, id: FileId) -> bool {
        self.set.contains(&id)
    }

    /// Returns the number of hidden files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if no file is being compacted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
