// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    job::Options, state::CompactionState, Compaction, CompactionStrategy, CompactionStyle,
    Strategy,
};
use crate::{config::Config, file::FileRef, version::Version};

/// Plans a user-requested compaction of the key range `[begin, end]`.
///
/// Unbounded ends are expressed as `None`.
///
/// - Leveled: compacts the files of `input_level` overlapping the range into `output_level`,
///   which must be the next level (or the same level, if it is the last one).
/// - Universal: compacts all files into the last level, ignoring the range.
/// - FIFO: runs a regular pick, as there is nothing to rewrite.
///
/// Returns `None` if there is nothing to compact.
///
/// # Errors
///
/// Returns [`Error::CompactionConflict`](crate::Error::CompactionConflict) if a file
/// that would be compacted is already being compacted, or an error if the levels are invalid.
#[allow(clippy::too_many_arguments)]
pub fn compact_range(
    version: &Version,
    config: &Config,
    state: &mut CompactionState,
    strategy: &Strategy,
    input_level: usize,
    output_level: usize,
    begin: Option<&[u8]>,
    end: Option<&[u8]>,
) -> crate::Result<Option<Compaction>> {
    let level_count = version.level_count();

    if input_level >= level_count {
        return Err(crate::Error::LevelOutOfRange(input_level));
    }
    if output_level >= level_count {
        return Err(crate::Error::LevelOutOfRange(output_level));
    }

    let mut compaction = match strategy {
        Strategy::Leveled(leveled) => {
            let last_level = level_count - 1;

            let valid = output_level == input_level + 1
                || (input_level == last_level && output_level == last_level);

            if !valid {
                return Err(crate::Error::InvalidCompaction(
                    "manual compaction must target the next level",
                ));
            }

            let Some(level) = version.level(input_level) else {
                return Ok(None);
            };

            let files = level
                .iter()
                .filter(|f| f.key_range().overlaps_with_bounds(begin, end))
                .cloned()
                .collect::<Vec<_>>();

            if files.is_empty() {
                return Ok(None);
            }

            let opts = leveled.job_options(config, output_level, false);
            Compaction::new(version.clone(), input_level, output_level, files, opts)?
        }
        Strategy::SizeTiered(_) => {
            let Some((base_level, files)) = first_non_empty_level(version) else {
                return Ok(None);
            };

            let output_level = level_count - 1;
            let input_size = version.total_size();

            let opts = Options {
                max_output_file_size: u64::MAX,
                max_grandparent_overlap_bytes: u64::MAX,
                output_path_id: config.path_id_for_size(input_size),
                compression: config.compression_for_level(output_level),
                style: CompactionStyle::Universal,
                seek_compaction: false,
                deletion_compaction: false,
            };

            Compaction::new(version.clone(), base_level, output_level, files, opts)?
        }
        Strategy::Fifo(fifo) => {
            let Some(mut compaction) = fifo.pick(version, config, state) else {
                return Ok(None);
            };

            compaction.set_manual();
            return Ok(Some(compaction));
        }
    };

    compaction.set_manual();

    let compaction = compaction.register(state)?;

    log::debug!("Manual {} compaction: {compaction}", strategy.style());

    Ok(Some(compaction))
}

fn first_non_empty_level(version: &Version) -> Option<(usize, Vec<FileRef>)> {
    version
        .iter_levels()
        .enumerate()
        .find(|(_, level)| !level.is_empty())
        .map(|(idx, level)| (idx, level.to_vec()))
}
