// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

#[cfg(test)]
#[allow(clippy::expect_used)]
mod test;

use super::{
    job::Options, state::CompactionState, Compaction, CompactionStrategy, CompactionStyle,
};
use crate::{config::Config, file::FileRef, version::Version};

#[doc(hidden)]
pub const NAME: &str = "LeveledCompaction";

/// Leveled compaction strategy (LCS)
///
/// When a level reaches some threshold size, a file of it is merged into overlapping files in the next level.
///
/// Each level Ln for n >= 2 can have up to `level_base_size * ratio^(n - 1)` bytes.
///
/// LCS suffers from comparatively high write amplification, but has decent read amplification and great space amplification (~1.1x).
///
/// LCS is the recommended compaction strategy to use.
#[derive(Clone, Debug)]
pub struct Strategy {
    l0_threshold: u8,

    /// The target file size as disk (possibly compressed).
    target_size: u64,

    /// Target size of L1, defaults to `target_size * l0_threshold`.
    level_base_size: Option<u64>,

    /// Size ratio between levels of the LSM tree (a.k.a fanout, growth rate)
    level_ratio_policy: Vec<f32>,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            l0_threshold: 4,
            target_size:/* 64 MiB */ 64 * 1_024 * 1_024,
            level_base_size: None,
            level_ratio_policy: vec![10.0],
        }
    }
}

impl Strategy {
    /// Sets the growth ratio between levels.
    ///
    /// The n-th entry is the ratio between L(n+2) and L(n+1),
    /// the last entry is repeated for deeper levels.
    ///
    /// Same as `set_max_bytes_for_level_multiplier` in `RocksDB`.
    ///
    /// Default = [10.0]
    #[must_use]
    pub fn with_level_ratio_policy(mut self, policy: Vec<f32>) -> Self {
        self.level_ratio_policy = policy;
        self
    }

    /// Sets the L0 threshold.
    ///
    /// When the number of files in L0 reaches this threshold,
    /// they are merged into L1.
    ///
    /// Same as `level0_file_num_compaction_trigger` in `RocksDB`.
    ///
    /// Default = 4
    #[must_use]
    pub fn with_l0_threshold(mut self, threshold: u8) -> Self {
        self.l0_threshold = threshold.max(1);
        self
    }

    /// Sets the file target size on disk (possibly compressed).
    ///
    /// Same as `target_file_size_base` in `RocksDB`.
    ///
    /// Default = 64 MiB
    #[must_use]
    pub fn with_table_target_size(mut self, bytes: u64) -> Self {
        self.target_size = bytes;
        self
    }

    /// Sets the target size of L1.
    ///
    /// Same as `max_bytes_for_level_base` in `RocksDB`.
    ///
    /// Default = `target_size * l0_threshold`
    #[must_use]
    pub fn with_level_base_size(mut self, bytes: u64) -> Self {
        self.level_base_size = Some(bytes);
        self
    }

    /// Calculates the size of L1.
    fn level_base_size(&self) -> u64 {
        self.level_base_size
            .unwrap_or_else(|| self.target_size.saturating_mul(u64::from(self.l0_threshold)))
    }

    /// Calculates the level target size.
    ///
    /// L1 = `level_base_size`
    ///
    /// L2 = `level_base_size * ratio`
    ///
    /// L3 = `level_base_size * ratio * ratio`
    ///
    /// ...
    pub(crate) fn level_target_size(&self, level_idx: usize) -> u64 {
        assert!(level_idx >= 1, "level_target_size does not apply to L0");

        #[allow(clippy::cast_precision_loss)]
        let mut size = self.level_base_size() as f64;

        // NOTE: L1 is the base, so L(n) is scaled n - 1 times
        for idx in 0..(level_idx - 1) {
            let ratio = self
                .level_ratio_policy
                .get(idx)
                .copied()
                .unwrap_or_else(|| self.level_ratio_policy.last().copied().unwrap_or(10.0));

            size *= f64::from(ratio);
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            size.min(u64::MAX as f64) as u64
        }
    }

    /// Computes the score of every level, except the last one.
    ///
    /// Files that are already being compacted are not taken into account,
    /// otherwise we may be overcompensating.
    pub(crate) fn level_scores(&self, version: &Version, state: &CompactionState) -> Vec<f64> {
        let hidden_set = state.hidden_set();
        let last_level = version.level_count().saturating_sub(1);

        version
            .iter_levels()
            .enumerate()
            .map(|(idx, level)| {
                if idx == last_level {
                    // NOTE: Never score Lmax
                    return 0.0;
                }

                if idx == 0 {
                    let count = level.iter().filter(|f| !hidden_set.is_hidden(f.id)).count();

                    #[allow(clippy::cast_precision_loss)]
                    return count as f64 / f64::from(self.l0_threshold);
                }

                let level_size = level
                    .iter()
                    .filter(|f| !hidden_set.is_hidden(f.id))
                    .map(|f| f.file_size)
                    .sum::<u64>();

                #[allow(clippy::cast_precision_loss)]
                {
                    level_size as f64 / self.level_target_size(idx).max(1) as f64
                }
            })
            .collect()
    }

    /// Picks the data path to write `level`'s output files to.
    ///
    /// Levels are laid out over the data paths from top to bottom,
    /// moving on to the next path once a level does not fit anymore.
    fn output_path_id(&self, config: &Config, level: usize) -> u32 {
        let paths = &config.data_paths;
        let last = paths.len().saturating_sub(1);

        let mut path_idx = 0;
        let mut cur_level = 0;
        let mut remaining = paths.first().map(|p| p.target_size).unwrap_or_default();

        while path_idx < last {
            let level_size = self.level_target_size(cur_level.max(1));

            if level_size <= remaining {
                if cur_level == level {
                    break;
                }

                remaining -= level_size;
                cur_level += 1;
                continue;
            }

            path_idx += 1;
            remaining = paths.get(path_idx).map(|p| p.target_size).unwrap_or_default();
        }

        u32::try_from(path_idx).unwrap_or(u32::MAX)
    }

    pub(super) fn job_options(
        &self,
        config: &Config,
        output_level: usize,
        seek_compaction: bool,
    ) -> Options {
        Options {
            max_output_file_size: self.target_size,
            max_grandparent_overlap_bytes: config.max_grandparent_overlap_bytes(self.target_size),
            output_path_id: self.output_path_id(config, output_level),
            compression: config.compression_for_level(output_level),
            style: CompactionStyle::Level,
            seek_compaction,
            deletion_compaction: false,
        }
    }

    /// Tries to plan and register a compaction of `file` into the next level.
    fn try_compact(
        &self,
        version: &Version,
        config: &Config,
        state: &mut CompactionState,
        level: usize,
        file: FileRef,
        seek_compaction: bool,
    ) -> crate::Result<Compaction> {
        let output_level = level + 1;
        let opts = self.job_options(config, output_level, seek_compaction);

        Compaction::new(version.clone(), level, output_level, vec![file], opts)?.register(state)
    }

    fn pick_from_level(
        &self,
        version: &Version,
        config: &Config,
        state: &mut CompactionState,
        level_idx: usize,
    ) -> Option<Compaction> {
        let level = version.level(level_idx)?;

        if level_idx == 0 {
            // NOTE: Start at the oldest file, overlapping files are pulled in anyway
            for file in level.iter().rev() {
                if state.hidden_set().is_hidden(file.id) {
                    continue;
                }

                match self.try_compact(version, config, state, 0, file.clone(), false) {
                    Ok(compaction) => return Some(compaction),
                    Err(crate::Error::CompactionConflict) => {}
                    Err(e) => {
                        log::error!("Failed to plan L0 compaction: {e:?}");
                        return None;
                    }
                }
            }

            return None;
        }

        // NOTE: Compact the largest files first, continuing where the last round stopped
        let mut candidates = level.iter().enumerate().collect::<Vec<_>>();
        candidates.sort_by(|(a_idx, a), (b_idx, b)| {
            b.file_size.cmp(&a.file_size).then(a_idx.cmp(b_idx))
        });

        let cursor = state.next_compaction_index(level_idx);
        let len = candidates.len();

        for candidate_idx in (0..len).map(|offset| (cursor + offset) % len) {
            let Some((_, file)) = candidates.get(candidate_idx) else {
                continue;
            };

            if state.hidden_set().is_hidden(file.id) {
                continue;
            }

            match self.try_compact(version, config, state, level_idx, (*file).clone(), false) {
                Ok(mut compaction) => {
                    let parent_index = version
                        .level(level_idx + 1)
                        .and_then(|next| next.first_overlapping_index(compaction.key_range()));

                    compaction.set_picker_indexes(candidate_idx, parent_index);
                    state.set_next_compaction_index(level_idx, candidate_idx + 1);

                    return Some(compaction);
                }
                Err(crate::Error::CompactionConflict) => {
                    log::trace!("Skipping {file} in L{level_idx}, overlapping files are busy");
                }
                Err(e) => {
                    log::error!("Failed to plan L{level_idx} compaction: {e:?}");
                    return None;
                }
            }
        }

        None
    }

    fn pick_seek_compaction(
        &self,
        version: &Version,
        config: &Config,
        state: &mut CompactionState,
    ) -> Option<Compaction> {
        let (level, id) = state.file_to_compact()?;

        let candidate = version
            .get_file(id)
            .filter(|(lvl, _)| *lvl == level && level + 1 < version.level_count())
            .map(|(_, file)| file.clone());

        let Some(file) = candidate else {
            // NOTE: File was compacted away in the meantime
            state.clear_file_to_compact(id);
            return None;
        };

        match self.try_compact(version, config, state, level, file, true) {
            Ok(compaction) => {
                state.clear_file_to_compact(id);
                Some(compaction)
            }
            Err(crate::Error::CompactionConflict) => None,
            Err(e) => {
                log::error!("Failed to plan seek compaction: {e:?}");
                state.clear_file_to_compact(id);
                None
            }
        }
    }
}

impl CompactionStrategy for Strategy {
    fn get_name(&self) -> &'static str {
        NAME
    }

    fn style(&self) -> CompactionStyle {
        CompactionStyle::Level
    }

    fn pick(
        &self,
        version: &Version,
        config: &Config,
        state: &mut CompactionState,
    ) -> Option<Compaction> {
        let scores = self.level_scores(version, state);

        let mut levels = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, score)| *score >= 1.0)
            .collect::<Vec<_>>();

        levels.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        for (level_idx, score) in levels {
            // NOTE: L0 files overlap, so only one L0 compaction can run at a time
            if level_idx == 0 && state.in_progress(0) > 0 {
                continue;
            }

            if let Some(mut compaction) = self.pick_from_level(version, config, state, level_idx) {
                log::debug!("Leveled: picked L{level_idx} (score={score:.2}): {compaction}");
                compaction.set_score(score);
                return Some(compaction);
            }
        }

        let compaction = self.pick_seek_compaction(version, config, state)?;
        log::debug!("Leveled: picked seek compaction: {compaction}");

        Some(compaction)
    }
}
