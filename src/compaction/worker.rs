// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Runs compactions: picks a job, drops, moves or merges its input files,
//! and installs the result as a new version.

use super::{
    stream::{Decision, MvccFilter},
    Compaction, Strategy,
};
use crate::{
    file::FileRef,
    merge::{BoxedIterator, Merger},
    stop_signal::StopSignal,
    table::{BuilderOptions, TableBuilder, TableFactory},
    version::VersionSet,
    CompressionType, InternalValue, SeqNo,
};
use std::{sync::Arc, time::Instant};

/// Compaction options
pub struct Options {
    /// Versions to compact
    pub version_set: Arc<VersionSet>,

    /// Reads input tables and writes output tables
    pub table_factory: Arc<dyn TableFactory>,

    /// Compaction strategy
    pub strategy: Strategy,

    /// Stop signal
    pub stop_signal: StopSignal,

    /// Sequence number of the oldest snapshot still in use
    ///
    /// Versions shadowed by a newer version that is at or below this seqno
    /// are garbage collected.
    pub smallest_snapshot: SeqNo,
}

/// What a compaction run did
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompactionOutcome {
    /// No compaction was needed
    DoNothing,

    /// Files were deleted without being read
    Dropped {
        /// Number of deleted files
        deleted: usize,
    },

    /// A single file was moved to the output level
    Moved,

    /// Files were merged into new files
    Merged {
        /// Number of files written
        created: usize,
    },
}

/// Picks and runs a compaction task.
///
/// This will block until the compactor is fully finished.
///
/// # Errors
///
/// Will return `Err` if an IO error occurs, or the stop signal was sent.
/// In that case, the version is unchanged and the input files can be picked again.
pub fn do_compaction(opts: &Options) -> crate::Result<CompactionOutcome> {
    log::trace!("compactor: consulting compaction strategy");

    let Some(compaction) = opts.version_set.pick_compaction(&opts.strategy) else {
        log::trace!("Compactor chose to do nothing");
        return Ok(CompactionOutcome::DoNothing);
    };

    run_compaction(opts, compaction)
}

/// Runs an already picked compaction, e.g. one created by
/// [`VersionSet::compact_range`].
///
/// # Errors
///
/// Will return `Err` if an IO error occurs, or the stop signal was sent.
pub fn run_compaction(opts: &Options, compaction: Compaction) -> crate::Result<CompactionOutcome> {
    log::debug!("compactor: running {compaction}");

    if compaction.is_deletion_compaction() {
        drop_files(opts, compaction)
    } else if compaction.is_trivial_move() {
        move_file(opts, compaction)
    } else {
        merge_files(opts, compaction)
    }
}

fn drop_files(opts: &Options, mut compaction: Compaction) -> crate::Result<CompactionOutcome> {
    let mut edit = compaction.take_edit();
    compaction.add_input_deletions(&mut edit);

    let deleted = edit.deletion_count();
    *compaction.edit_mut() = edit;

    opts.version_set
        .install_compaction_results(&mut compaction, Ok(()))?;

    log::debug!("compactor: dropped {deleted} file(s)");

    Ok(CompactionOutcome::Dropped { deleted })
}

fn move_file(opts: &Options, mut compaction: Compaction) -> crate::Result<CompactionOutcome> {
    let mut edit = compaction.take_edit();
    compaction.add_input_deletions(&mut edit);

    let file = compaction.input(0, 0).clone();

    log::debug!(
        "compactor: moving {file} from L{} to L{}",
        compaction.base_level(),
        compaction.output_level(),
    );

    edit.add_file(compaction.output_level(), file);
    *compaction.edit_mut() = edit;

    opts.version_set
        .install_compaction_results(&mut compaction, Ok(()))?;

    Ok(CompactionOutcome::Moved)
}

fn merge_files(opts: &Options, mut compaction: Compaction) -> crate::Result<CompactionOutcome> {
    let start = Instant::now();

    let mut outputs = OutputFiles {
        table_factory: &*opts.table_factory,
        version_set: &opts.version_set,
        level: compaction.output_level(),
        path_id: compaction.output_path_id(),
        compression: compaction.output_compression_type(),
        builder: None,
        created: Vec::new(),
    };

    let status = merge_inputs(opts, &mut compaction, &mut outputs)
        .and_then(|()| outputs.finish_current());

    let created = outputs.into_created();

    let status = status.map(|()| {
        let mut edit = compaction.take_edit();
        compaction.add_input_deletions(&mut edit);

        for file in &created {
            edit.add_file(compaction.output_level(), file.clone());
        }

        *compaction.edit_mut() = edit;
    });

    if let Err(e) = opts
        .version_set
        .install_compaction_results(&mut compaction, status)
    {
        log::error!("Compaction failed: {e:?}");

        // IMPORTANT: Outputs are not referenced by any version, so delete them again
        for file in &created {
            if let Err(e) = opts.table_factory.delete_table(file) {
                log::warn!("Failed to delete orphaned output {file}: {e:?}");
            }
        }

        return Err(e);
    }

    log::debug!(
        "Compacted in {}ms ({} files created)",
        start.elapsed().as_millis(),
        created.len(),
    );

    Ok(CompactionOutcome::Merged {
        created: created.len(),
    })
}

fn merge_inputs(
    opts: &Options,
    compaction: &mut Compaction,
    outputs: &mut OutputFiles<'_>,
) -> crate::Result<()> {
    if opts.stop_signal.is_stopped() {
        log::debug!("compactor: stopping before compaction because of stop signal");
        return Err(crate::Error::Stopped);
    }

    let mut readers: Vec<BoxedIterator<'static>> = Vec::with_capacity(compaction.num_input_files(0));

    for which in 0..compaction.input_levels() {
        for file in compaction.inputs(which) {
            readers.push(opts.table_factory.open_table(file)?.scan());
        }
    }

    // NOTE: Only rewrite seqnos when no older version can exist below
    let mut filter =
        MvccFilter::new(opts.smallest_snapshot).zero_seqnos(compaction.bottommost_level());

    for (idx, item) in Merger::new(readers).enumerate() {
        let mut item = item?;

        let decision = filter.filter(&mut item, |user_key| {
            compaction.key_not_exists_beyond_output_level(user_key)
        });

        let Decision::Keep { new_key } = decision else {
            continue;
        };

        // NOTE: Versions of the same user key must stay in one file
        if new_key && compaction.should_stop_before(&item.key) && outputs.is_open() {
            outputs.finish_current()?;
        }

        let bytes = outputs.add(&item)?;
        compaction.record_output_bytes(bytes);

        if idx % 100_000 == 0 && opts.stop_signal.is_stopped() {
            log::debug!("compactor: stopping amidst compaction because of stop signal");
            return Err(crate::Error::Stopped);
        }
    }

    log::debug!(
        "compactor: garbage collected {} item(s)",
        filter.dropped_count()
    );

    Ok(())
}

/// Output files of a running merge
struct OutputFiles<'a> {
    table_factory: &'a dyn TableFactory,
    version_set: &'a VersionSet,
    level: usize,
    path_id: u32,
    compression: CompressionType,

    builder: Option<Box<dyn TableBuilder>>,
    created: Vec<FileRef>,
}

impl OutputFiles<'_> {
    fn is_open(&self) -> bool {
        self.builder.is_some()
    }

    /// Writes an item, starting a new file if needed.
    ///
    /// Returns the number of bytes the current file grew by.
    fn add(&mut self, item: &InternalValue) -> crate::Result<u64> {
        let mut builder = match self.builder.take() {
            Some(builder) => builder,
            None => self.table_factory.new_builder(BuilderOptions {
                file_id: self.version_set.next_file_id(),
                level: self.level,
                path_id: self.path_id,
                compression: self.compression,
            })?,
        };

        let size_before = builder.file_size();
        let result = builder.add(item);
        let size_after = builder.file_size();

        self.builder = Some(builder);
        result?;

        Ok(match size_after.saturating_sub(size_before) {
            0 => item.size() as u64,
            n => n,
        })
    }

    fn finish_current(&mut self) -> crate::Result<()> {
        let Some(builder) = self.builder.take() else {
            return Ok(());
        };

        if let Some(meta) = builder.finish()? {
            log::trace!("compactor: finished output {meta}");
            self.created.push(Arc::new(meta));
        }

        Ok(())
    }

    /// Returns all finished files, discarding an unfinished one.
    fn into_created(mut self) -> Vec<FileRef> {
        if let Some(builder) = self.builder.take() {
            builder.abandon();
        }

        self.created
    }
}

/// Physically deletes files that are no longer referenced by any version.
///
/// Returns the number of deleted files.
///
/// # Errors
///
/// Will return `Err` if an IO error occurs. Files that could not be deleted are retried
/// on the next call.
pub fn delete_obsolete_files(
    version_set: &VersionSet,
    table_factory: &dyn TableFactory,
) -> crate::Result<usize> {
    let obsolete = version_set.take_obsolete_files();
    let mut deleted = 0;

    for (idx, file) in obsolete.iter().enumerate() {
        if let Err(e) = table_factory.delete_table(file) {
            log::error!("Failed to delete obsolete file {file}: {e:?}");
            version_set.registry().requeue_obsolete(obsolete.get(idx..).unwrap_or_default());
            return Err(e);
        }

        log::trace!("Deleted obsolete file {file}");
        deleted += 1;
    }

    Ok(deleted)
}
