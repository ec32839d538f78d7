// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{file::FileRef, key::InternalKey, version::Version};

/// Cursors that advance while a compaction's merge pass runs
///
/// Owned by the single executor driving the job. Keys must be
/// fed in ascending order, which keeps all cursors monotonic.
#[derive(Clone, Debug)]
pub struct ScanState {
    /// Index of the grandparent the current key falls into (or before)
    grandparent_index: usize,

    /// Whether some key has been checked since the last output cut
    seen_key: bool,

    /// Bytes of grandparent files overlapped by the current output file
    overlapped_bytes: u64,

    /// Bytes written to the current output file
    output_bytes: u64,

    /// Per level cursor into the files below the output level
    level_ptrs: Vec<usize>,
}

impl ScanState {
    pub(crate) fn new(level_count: usize) -> Self {
        Self {
            grandparent_index: 0,
            seen_key: false,
            overlapped_bytes: 0,
            output_bytes: 0,
            level_ptrs: vec![0; level_count],
        }
    }

    /// Rewinds all cursors for a new pass.
    pub(crate) fn reset(&mut self) {
        self.grandparent_index = 0;
        self.seen_key = false;
        self.overlapped_bytes = 0;
        self.output_bytes = 0;
        self.level_ptrs.fill(0);
    }

    pub(crate) fn record_output_bytes(&mut self, bytes: u64) {
        self.output_bytes += bytes;
    }

    /// Advances past all grandparents that end before `key`, then checks
    /// whether the current output file needs to be cut.
    pub(crate) fn should_stop_before(
        &mut self,
        key: &InternalKey,
        grandparents: &[FileRef],
        max_output_file_size: u64,
        max_grandparent_overlap_bytes: u64,
    ) -> bool {
        while let Some(grandparent) = grandparents.get(self.grandparent_index) {
            if *key <= grandparent.largest {
                break;
            }

            if self.seen_key {
                self.overlapped_bytes += grandparent.file_size;
            }

            self.grandparent_index += 1;
        }

        self.seen_key = true;

        let too_much_overlap = self.overlapped_bytes > max_grandparent_overlap_bytes;
        let file_full = self.output_bytes > 0 && self.output_bytes >= max_output_file_size;

        if too_much_overlap || file_full {
            self.overlapped_bytes = 0;
            self.output_bytes = 0;
            return true;
        }

        false
    }

    /// Checks whether any level below `output_level` may contain the user key.
    pub(crate) fn key_not_exists_beyond(
        &mut self,
        user_key: &[u8],
        version: &Version,
        output_level: usize,
    ) -> bool {
        for (lvl, level) in version.iter_levels().enumerate().skip(output_level + 1) {
            let Some(ptr) = self.level_ptrs.get_mut(lvl) else {
                break;
            };

            while let Some(file) = level.get(*ptr) {
                if user_key <= file.largest.user_key.as_ref() {
                    if user_key >= file.smallest.user_key.as_ref() {
                        // Key falls into this file's range
                        return false;
                    }
                    break;
                }

                *ptr += 1;
            }
        }

        true
    }

    /// Index of the current grandparent file.
    #[must_use]
    pub fn grandparent_index(&self) -> usize {
        self.grandparent_index
    }

    /// Returns `true` if a key has been checked since the last cut.
    #[must_use]
    pub fn seen_key(&self) -> bool {
        self.seen_key
    }

    /// Grandparent bytes overlapped by the current output file.
    #[must_use]
    pub fn overlapped_bytes(&self) -> u64 {
        self.overlapped_bytes
    }

    /// Bytes written to the current output file.
    #[must_use]
    pub fn output_bytes(&self) -> u64 {
        self.output_bytes
    }

    /// Cursor position in the given level.
    #[must_use]
    pub fn level_ptr(&self, level: usize) -> usize {
        self.level_ptrs.get(level).copied().unwrap_or_default()
    }
}
