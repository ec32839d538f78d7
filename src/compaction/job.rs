// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    scan::ScanState, state::CompactionState, summary::TruncatingWriter, CompactionStyle,
};
use crate::{
    file::{total_file_size, FileId, FileRef},
    key::InternalKey,
    version::{Version, VersionEdit, VersionId},
    CompressionType, HashSet, KeyRange,
};

/// Lifecycle of a [`Compaction`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Planned, inputs not marked yet
    Created,

    /// Inputs are marked as being compacted
    InputsMarked,

    /// The merge pass has started
    Executing,

    /// Input files were released, the job is finished
    Released,
}

/// Per-job limits and flags handed over by a picker
#[derive(Clone, Debug)]
pub(super) struct Options {
    pub max_output_file_size: u64,
    pub max_grandparent_overlap_bytes: u64,
    pub output_path_id: u32,
    pub compression: CompressionType,
    pub style: CompactionStyle,
    pub seek_compaction: bool,
    pub deletion_compaction: bool,
}

/// A compaction job
///
/// Describes input files across the contiguous levels `[base_level, output_level]`,
/// the level to write to, and the limits output files are subject to.
///
/// Compactions are created by compaction strategies (see [`CompactionStrategy`](super::CompactionStrategy)).
/// While alive, all input files are marked as being compacted, so no other
/// compaction can pick them. Call [`Compaction::release_compaction_files`]
/// when the job is done (or failed) to make the files pickable again.
pub struct Compaction {
    base_level: usize,
    output_level: usize,
    input_levels: usize,

    input_version: Option<Version>,
    input_version_id: VersionId,

    /// Files per input level, in key order
    inputs: Vec<Vec<FileRef>>,

    /// Files in `output_level + 1` that overlap the inputs
    grandparents: Vec<FileRef>,

    /// Key range of all inputs
    key_range: KeyRange,

    edit: VersionEdit,
    scan: ScanState,
    phase: Phase,

    max_output_file_size: u64,
    max_grandparent_overlap_bytes: u64,
    output_path_id: u32,
    output_compression: CompressionType,
    style: CompactionStyle,

    seek_compaction: bool,
    deletion_compaction: bool,
    bottommost_level: bool,
    is_full_compaction: bool,
    is_manual_compaction: bool,
    score: f64,

    /// Position of the picked file in the picker's candidate order
    base_index: Option<usize>,

    /// Position of the first overlapping file in the output level
    parent_index: Option<usize>,
}

impl Compaction {
    /// Plans a compaction of `base_inputs` (all living in `base_level`) into `output_level`.
    ///
    /// Overlapping files of every level in `(base_level, output_level]` are pulled in,
    /// widening the key range as files are added. In leveled compaction, overlapping
    /// L0 files are always compacted together.
    ///
    /// Nothing is marked yet, see [`Compaction::register`].
    pub(super) fn new(
        input_version: Version,
        base_level: usize,
        output_level: usize,
        mut base_inputs: Vec<FileRef>,
        opts: Options,
    ) -> crate::Result<Self> {
        let level_count = input_version.level_count();

        if output_level < base_level || output_level >= level_count {
            return Err(crate::Error::InvalidCompaction("invalid level span"));
        }

        if opts.deletion_compaction && base_level != output_level {
            return Err(crate::Error::InvalidCompaction(
                "deletion compaction cannot span levels",
            ));
        }

        let Some(level) = input_version.level(base_level) else {
            return Err(crate::Error::InvalidCompaction("invalid level span"));
        };

        if base_inputs.iter().any(|f| !level.contains_id(f.id)) {
            return Err(crate::Error::InvalidCompaction(
                "input file not found in base level",
            ));
        }

        let Some(mut key_range) = KeyRange::aggregate(base_inputs.iter().map(|f| f.key_range()))
        else {
            return Err(crate::Error::InvalidCompaction("no input files"));
        };

        // Sorted runs of universal compaction are picked by age, never widened
        if base_level == 0 && opts.style == CompactionStyle::Level && !opts.deletion_compaction {
            base_inputs = input_version.get_overlapping_inputs(0, &key_range);

            if let Some(widened) = KeyRange::aggregate(base_inputs.iter().map(|f| f.key_range())) {
                key_range = widened;
            }
        }

        base_inputs.sort_by(|a, b| a.smallest.cmp(&b.smallest));
        base_inputs.dedup_by_key(|f| f.id);

        let input_levels = output_level - base_level + 1;
        let mut inputs = Vec::with_capacity(input_levels);
        inputs.push(base_inputs);

        for lvl in (base_level + 1)..=output_level {
            let files = input_version.get_overlapping_inputs(lvl, &key_range);

            for file in &files {
                key_range = key_range.merge(file.key_range());
            }

            inputs.push(files);
        }

        let grandparents = if opts.deletion_compaction {
            vec![]
        } else {
            input_version.get_overlapping_inputs(output_level + 1, &key_range)
        };

        let input_count = inputs.iter().map(Vec::len).sum::<usize>();
        let is_full_compaction = input_count == input_version.file_count();

        let mut compaction = Self {
            base_level,
            output_level,
            input_levels,
            input_version_id: input_version.id(),
            input_version: Some(input_version),
            inputs,
            grandparents,
            key_range,
            edit: VersionEdit::new(),
            scan: ScanState::new(level_count),
            phase: Phase::Created,
            max_output_file_size: opts.max_output_file_size,
            max_grandparent_overlap_bytes: opts.max_grandparent_overlap_bytes,
            output_path_id: opts.output_path_id,
            output_compression: opts.compression,
            style: opts.style,
            seek_compaction: opts.seek_compaction,
            deletion_compaction: opts.deletion_compaction,
            bottommost_level: false,
            is_full_compaction,
            is_manual_compaction: false,
            score: 0.0,
            base_index: None,
            parent_index: None,
        };

        compaction.setup_bottommost_level(false);

        Ok(compaction)
    }

    /// Checks that no input is being compacted, then marks all inputs
    /// and registers the job as running.
    ///
    /// Must be called under the version set's lock.
    pub(super) fn register(mut self, state: &mut CompactionState) -> crate::Result<Self> {
        if state.hidden_set().is_blocked(self.input_ids()) {
            return Err(crate::Error::CompactionConflict);
        }

        self.mark_files_being_compacted(state, true);
        state.register_in_progress(self.base_level);

        log::debug!("Registered compaction: {self}");

        Ok(self)
    }

    pub(super) fn set_score(&mut self, score: f64) {
        self.score = score;
    }

    pub(super) fn set_picker_indexes(&mut self, base_index: usize, parent_index: Option<usize>) {
        self.base_index = Some(base_index);
        self.parent_index = parent_index;
    }

    pub(super) fn set_manual(&mut self) {
        self.is_manual_compaction = true;
        self.setup_bottommost_level(true);
    }

    /// Marks or unmarks all input files as being compacted.
    ///
    /// Must be called under the version set's lock.
    pub(crate) fn mark_files_being_compacted(&mut self, state: &mut CompactionState, mark: bool) {
        let ids = self.input_ids().collect::<Vec<_>>();

        if mark {
            debug_assert!(
                !state.hidden_set().is_blocked(ids.iter().copied()),
                "file is already being compacted",
            );
            state.hidden_set_mut().hide(ids);
            self.phase = Phase::InputsMarked;
        } else {
            state.hidden_set_mut().show(ids);
        }
    }

    /// Returns the IDs of all input files.
    pub fn input_ids(&self) -> impl Iterator<Item = FileId> + '_ {
        self.inputs.iter().flatten().map(|f| f.id)
    }

    /// Level the inputs start at.
    #[must_use]
    pub fn base_level(&self) -> usize {
        self.base_level
    }

    /// Level the outputs are written to.
    #[must_use]
    pub fn output_level(&self) -> usize {
        self.output_level
    }

    /// Number of levels spanned, `output_level - base_level + 1`.
    #[must_use]
    pub fn input_levels(&self) -> usize {
        self.input_levels
    }

    /// Returns the level of the given input level index.
    #[must_use]
    pub fn level(&self, which: usize) -> usize {
        self.base_level + which
    }

    /// Number of input files in `base_level + which`.
    ///
    /// Returns 0 for indexes outside of `[0, input_levels)`.
    #[must_use]
    pub fn num_input_files(&self, which: usize) -> usize {
        self.inputs.get(which).map_or(0, Vec::len)
    }

    /// Returns the input files of `base_level + which`, in key order.
    ///
    /// # Panics
    ///
    /// Panics if `which >= input_levels`.
    #[must_use]
    pub fn inputs(&self, which: usize) -> &[FileRef] {
        assert!(
            which < self.input_levels,
            "input level index {which} out of range"
        );

        // NOTE: Asserted above
        #[allow(clippy::indexing_slicing)]
        &self.inputs[which]
    }

    /// Returns the i-th input file of `base_level + which`.
    ///
    /// # Panics
    ///
    /// Panics if `which >= input_levels` or `i` is out of range.
    #[must_use]
    pub fn input(&self, which: usize, i: usize) -> &FileRef {
        let files = self.inputs(which);

        assert!(i < files.len(), "input file index {i} out of range");

        // NOTE: Asserted above
        #[allow(clippy::indexing_slicing)]
        &files[i]
    }

    /// Files one level below the output level that overlap the inputs.
    #[must_use]
    pub fn grandparents(&self) -> &[FileRef] {
        &self.grandparents
    }

    /// Key range covered by all inputs.
    #[must_use]
    pub fn key_range(&self) -> &KeyRange {
        &self.key_range
    }

    /// The version the inputs were picked from.
    ///
    /// `None` after [`Compaction::release_inputs`].
    #[must_use]
    pub fn input_version(&self) -> Option<&Version> {
        self.input_version.as_ref()
    }

    /// The edit this job populates.
    #[must_use]
    pub fn edit(&self) -> &VersionEdit {
        &self.edit
    }

    /// The edit this job populates.
    pub fn edit_mut(&mut self) -> &mut VersionEdit {
        &mut self.edit
    }

    pub(crate) fn take_edit(&mut self) -> VersionEdit {
        std::mem::take(&mut self.edit)
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Scan cursors of the merge pass.
    #[must_use]
    pub fn scan_state(&self) -> &ScanState {
        &self.scan
    }

    /// Size at which an output file is cut.
    #[must_use]
    pub fn max_output_file_size(&self) -> u64 {
        self.max_output_file_size
    }

    /// Bytes an output file may overlap in the grandparent level.
    #[must_use]
    pub fn max_grandparent_overlap_bytes(&self) -> u64 {
        self.max_grandparent_overlap_bytes
    }

    /// Compression to write output files with.
    #[must_use]
    pub fn output_compression_type(&self) -> CompressionType {
        self.output_compression
    }

    /// Data path output files are placed in.
    #[must_use]
    pub fn output_path_id(&self) -> u32 {
        self.output_path_id
    }

    /// Compaction style of the strategy that created the job.
    #[must_use]
    pub fn style(&self) -> CompactionStyle {
        self.style
    }

    /// Whether the job was triggered by too many seeks into a file.
    #[must_use]
    pub fn is_seek_compaction(&self) -> bool {
        self.seek_compaction
    }

    /// Priority the picker assigned to the job.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Whether no level below the output level overlaps the inputs.
    #[must_use]
    pub fn bottommost_level(&self) -> bool {
        self.bottommost_level
    }

    /// Whether the job consumes every file of the input version.
    #[must_use]
    pub fn is_full_compaction(&self) -> bool {
        self.is_full_compaction
    }

    /// Whether the job was requested manually.
    #[must_use]
    pub fn is_manual_compaction(&self) -> bool {
        self.is_manual_compaction
    }

    /// Whether the job only drops its inputs, without rewriting anything.
    #[must_use]
    pub fn is_deletion_compaction(&self) -> bool {
        self.deletion_compaction
    }

    /// Position of the picked file in the picker's candidate order.
    #[must_use]
    pub fn base_index(&self) -> Option<usize> {
        self.base_index
    }

    /// Position of the first overlapping output level file.
    #[must_use]
    pub fn parent_index(&self) -> Option<usize> {
        self.parent_index
    }

    /// Returns `true` if the job can be done by moving its single input
    /// file to the output level, without rewriting it.
    ///
    /// This requires exactly one input file in `base_level`, no overlapping
    /// file in any level down to `output_level`, and limited overlap with
    /// the grandparent level (or the moved file would make a future
    /// compaction too expensive).
    #[must_use]
    pub fn is_trivial_move(&self) -> bool {
        self.base_level != self.output_level
            && !self.deletion_compaction
            && self.num_input_files(0) == 1
            && (1..self.input_levels).all(|which| self.num_input_files(which) == 0)
            && total_file_size(&self.grandparents) <= self.max_grandparent_overlap_bytes
    }

    /// Adds a deletion for every input file to the edit.
    pub fn add_input_deletions(&self, edit: &mut VersionEdit) {
        for (which, files) in self.inputs.iter().enumerate() {
            for file in files {
                edit.delete_file(self.level(which), file.id);
            }
        }
    }

    fn enter_scan(&mut self) {
        assert!(
            self.phase != Phase::Released,
            "compaction was already released"
        );

        if self.phase != Phase::Executing {
            self.scan.reset();
            self.phase = Phase::Executing;
        }
    }

    /// Returns `true` if no level below the output level can contain `user_key`.
    ///
    /// Keys must be passed in ascending order, so each level is scanned only once
    /// over the whole compaction.
    ///
    /// # Panics
    ///
    /// Panics if the inputs or files were already released.
    pub fn key_not_exists_beyond_output_level(&mut self, user_key: &[u8]) -> bool {
        self.enter_scan();

        // Other L0 files may hold older versions of the key
        if self.output_level == 0 {
            return self.bottommost_level;
        }

        let Some(version) = &self.input_version else {
            panic!("compaction inputs were already released");
        };

        self.scan
            .key_not_exists_beyond(user_key, version, self.output_level)
    }

    /// Returns `true` if the current output file should be finished before `key` is written.
    ///
    /// This is the case if the output file reached its maximum size, or it overlaps
    /// too many bytes in the grandparent level.
    ///
    /// # Panics
    ///
    /// Panics if the compaction was already released.
    pub fn should_stop_before(&mut self, key: &InternalKey) -> bool {
        self.enter_scan();

        self.scan.should_stop_before(
            key,
            &self.grandparents,
            self.max_output_file_size,
            self.max_grandparent_overlap_bytes,
        )
    }

    /// Accounts for bytes written to the current output file.
    pub fn record_output_bytes(&mut self, bytes: u64) {
        self.scan.record_output_bytes(bytes);
    }

    /// Determines whether the output level is the last level holding data
    /// for the compaction's key range.
    ///
    /// Only then can tombstones and shadowed versions be dropped for good.
    pub fn setup_bottommost_level(&mut self, is_manual: bool) {
        // A manual universal compaction always includes all files
        if self.style == CompactionStyle::Universal && is_manual {
            self.bottommost_level = true;
            return;
        }

        let Some(version) = &self.input_version else {
            self.bottommost_level = false;
            return;
        };

        let input_ids = self.input_ids().collect::<HashSet<_>>();

        // In L0, files that are not part of the compaction may hold older data
        if self.output_level == 0 && version.level_overlaps(0, &self.key_range, &input_ids) {
            self.bottommost_level = false;
            return;
        }

        let no_excludes = HashSet::default();

        self.bottommost_level = ((self.output_level + 1)..version.level_count())
            .all(|lvl| !version.level_overlaps(lvl, &self.key_range, &no_excludes));
    }

    /// Returns how many bytes to preallocate for an output file.
    ///
    /// Leveled compaction cuts outputs at the maximum file size,
    /// other styles write one big output file.
    #[must_use]
    pub fn output_file_preallocation_size(&self) -> u64 {
        match self.style {
            CompactionStyle::Level => self.max_output_file_size,
            _ => total_file_size(self.inputs.iter().flatten()),
        }
    }

    /// Drops the job's reference to its input version.
    pub fn release_inputs(&mut self) {
        if let Some(version) = self.input_version.take() {
            log::trace!(
                "Compaction {}->{} released version {}",
                self.base_level,
                self.output_level,
                version.id(),
            );
        }
    }

    /// Unmarks all input files, so they can be picked again.
    ///
    /// If the job succeeded, the seek budgets of its inputs are dropped.
    /// If it failed, the picker cursor of the base level is reset,
    /// so the next round re-evaluates the level from the start.
    ///
    /// Calling this more than once has no further effect.
    ///
    /// Must be called under the version set's lock.
    pub fn release_compaction_files(&mut self, state: &mut CompactionState, status: &crate::Result<()>) {
        if self.phase == Phase::Released {
            return;
        }

        if self.phase != Phase::Created {
            self.mark_files_being_compacted(state, false);
            state.unregister_in_progress(self.base_level);
        }

        match status {
            Ok(()) => state.forget_seeks(self.input_ids()),
            Err(e) => {
                log::debug!("Compaction {self} failed: {e}, resetting picker cursor");
                state.reset_next_compaction_index(self.base_level);
            }
        }

        self.phase = Phase::Released;
    }

    fn write_summary<W: std::fmt::Write>(&self, w: &mut W) -> std::fmt::Result {
        write!(
            w,
            "Base version {} Base level {}, output level {}, seek compaction:{}, inputs: [",
            self.input_version_id,
            self.base_level,
            self.output_level,
            u8::from(self.seek_compaction),
        )?;

        for (which, files) in self.inputs.iter().enumerate() {
            if which > 0 {
                write!(w, "],[")?;
            }

            for (idx, file) in files.iter().enumerate() {
                if idx > 0 {
                    write!(w, " ")?;
                }
                write!(w, "#{}({}B)", file.id, file.file_size)?;
            }
        }

        write!(w, "]")
    }

    /// Writes a human-readable description of the job into `buf`.
    ///
    /// Output that does not fit is cut off. Returns the number of bytes written.
    pub fn summary(&self, buf: &mut [u8]) -> usize {
        let mut writer = TruncatingWriter::new(buf);

        // NOTE: TruncatingWriter never fails
        let _ = self.write_summary(&mut writer);

        writer.len()
    }
}

impl std::fmt::Display for Compaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_summary(f)
    }
}

impl std::fmt::Debug for Compaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Compaction({self}, phase={:?})", self.phase)
    }
}

impl Drop for Compaction {
    fn drop(&mut self) {
        if matches!(self.phase, Phase::InputsMarked | Phase::Executing) {
            log::warn!("Compaction dropped without releasing its files: {self}");
        }
    }
}
