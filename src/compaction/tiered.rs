// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    job::Options, state::CompactionState, Compaction, CompactionStrategy, CompactionStyle,
};
use crate::{
    config::Config,
    file::{total_file_size, FileRef},
    version::Version,
};

#[doc(hidden)]
pub const NAME: &str = "SizeTieredCompaction";

/// Size-tiered compaction strategy (STCS), also known as universal compaction
///
/// All files live in L0 as sorted runs, ordered from newest to oldest.
/// Once enough runs exist, the newest run of files with similar sizes is merged
/// into a single file.
///
/// If no such run exists, all of L0 is merged, which turns into a full
/// compaction into the last level.
///
/// STCS suffers from high read and temporary doubled space amplification, but has good write amplification.
#[derive(Clone, Debug)]
pub struct Strategy {
    /// Number of files in L0 that triggers a compaction
    pub l0_threshold: u8,

    /// Percentage a file may be larger than the files merged so far
    /// to still be considered similar in size
    pub size_ratio: u64,

    /// Minimum number of files to merge
    pub min_merge_width: usize,

    /// Maximum number of files to merge
    pub max_merge_width: usize,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            l0_threshold: 4,
            size_ratio: 1,
            min_merge_width: 2,
            max_merge_width: usize::MAX,
        }
    }
}

impl Strategy {
    /// Creates a new STCS strategy with a custom L0 threshold and size ratio.
    #[must_use]
    pub fn new(l0_threshold: u8, size_ratio: u64) -> Self {
        Self {
            l0_threshold,
            size_ratio,
            ..Default::default()
        }
    }

    /// Sets the number of files merged at once.
    ///
    /// Same as `min_merge_width` and `max_merge_width` in `RocksDB`.
    ///
    /// Default = 2..=unbounded
    ///
    /// # Panics
    ///
    /// Panics if `min` is larger than `max`.
    #[must_use]
    pub fn with_merge_width(mut self, min: usize, max: usize) -> Self {
        assert!(min <= max, "invalid merge width");

        self.min_merge_width = min.max(2);
        self.max_merge_width = max.max(2);
        self
    }

    /// Finds the newest window of similarly sized files.
    ///
    /// `files` is ordered from newest to oldest.
    fn pick_similar_sized<'a>(&self, files: &'a [FileRef], state: &CompactionState) -> Option<&'a [FileRef]> {
        let hidden_set = state.hidden_set();

        for start in 0..files.len() {
            let Some(first) = files.get(start) else {
                break;
            };

            if hidden_set.is_hidden(first.id) {
                continue;
            }

            let mut candidate_size = first.file_size;
            let mut end = start + 1;

            while let Some(next) = files.get(end) {
                if end - start >= self.max_merge_width || hidden_set.is_hidden(next.id) {
                    break;
                }

                // NOTE: Stop at the first file that is much bigger than what we have so far
                let limit = candidate_size.saturating_mul(100 + self.size_ratio) / 100;
                if limit < next.file_size {
                    break;
                }

                candidate_size += next.file_size;
                end += 1;
            }

            if end - start >= self.min_merge_width {
                return files.get(start..end);
            }
        }

        None
    }
}

impl CompactionStrategy for Strategy {
    fn get_name(&self) -> &'static str {
        NAME
    }

    fn style(&self) -> CompactionStyle {
        CompactionStyle::Universal
    }

    fn pick(
        &self,
        version: &Version,
        config: &Config,
        state: &mut CompactionState,
    ) -> Option<Compaction> {
        // NOTE: Sorted runs are merged by age, so only one job can run at a time
        if state.in_progress(0) > 0 {
            return None;
        }

        let first_level = version.level(0)?;

        if first_level.len() < usize::from(self.l0_threshold) {
            return None;
        }

        let files = self
            .pick_similar_sized(first_level, state)
            .map(<[FileRef]>::to_vec)
            .or_else(|| {
                if state.hidden_set().is_blocked(first_level.iter().map(|f| f.id)) {
                    None
                } else {
                    Some(first_level.to_vec())
                }
            })?;

        let merges_all_of_l0 = files.len() == first_level.len();

        let output_level = if merges_all_of_l0 {
            version.level_count() - 1
        } else {
            0
        };

        let input_size = total_file_size(&files);

        let opts = Options {
            max_output_file_size: u64::MAX,
            max_grandparent_overlap_bytes: u64::MAX,
            output_path_id: config.path_id_for_size(input_size),
            compression: config.compression_for_level(output_level),
            style: CompactionStyle::Universal,
            seek_compaction: false,
            deletion_compaction: false,
        };

        let result = Compaction::new(version.clone(), 0, output_level, files, opts)
            .and_then(|compaction| compaction.register(state));

        match result {
            Ok(mut compaction) => {
                #[allow(clippy::cast_precision_loss)]
                let score = first_level.len() as f64 / f64::from(self.l0_threshold.max(1));
                compaction.set_score(score);

                log::debug!(
                    "Universal: merging {} file(s) into L{output_level}: {compaction}",
                    compaction.num_input_files(0),
                );

                Some(compaction)
            }
            Err(crate::Error::CompactionConflict) => None,
            Err(e) => {
                log::error!("Failed to plan universal compaction: {e:?}");
                None
            }
        }
    }
}
