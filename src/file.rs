// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{key::InternalKey, table::TableFormat, time::unix_timestamp, KeyRange, SeqNo};
use std::sync::Arc;

/// Unique file ID
pub type FileId = u64;

/// Shared handle to a file descriptor
///
/// The descriptor itself is immutable; liveness across versions is tracked
/// by the [`FileRegistry`](crate::version::FileRegistry).
pub type FileRef = Arc<FileMetaData>;

/// Describes one sorted table file
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct FileMetaData {
    /// File ID
    pub id: FileId,

    /// Smallest internal key in the file
    pub smallest: InternalKey,

    /// Largest internal key in the file
    pub largest: InternalKey,

    /// User key range, derived from `smallest` and `largest`
    pub key_range: KeyRange,

    /// File size in bytes
    pub file_size: u64,

    /// Lowest and highest sequence number in the file
    pub seqnos: (SeqNo, SeqNo),

    /// Number of items
    pub item_count: u64,

    /// Number of tombstones
    pub tombstone_count: u64,

    /// Index of the data path the file lives in
    pub path_id: u32,

    /// Table format the file was written in
    pub format: TableFormat,

    /// Creation time as unix timestamp (in µs)
    pub created_at: u128,
}

impl FileMetaData {
    /// Creates a file descriptor from its boundary keys.
    ///
    /// The sequence number range is derived from the boundary keys,
    /// and can be refined using [`FileMetaData::with_seqnos`].
    #[must_use]
    pub fn new(id: FileId, smallest: InternalKey, largest: InternalKey, file_size: u64) -> Self {
        let key_range = KeyRange::new((smallest.user_key.clone(), largest.user_key.clone()));
        let seqnos = (
            smallest.seqno.min(largest.seqno),
            smallest.seqno.max(largest.seqno),
        );

        Self {
            id,
            smallest,
            largest,
            key_range,
            file_size,
            seqnos,
            item_count: 0,
            tombstone_count: 0,
            path_id: 0,
            format: TableFormat::default(),
            created_at: unix_timestamp().as_micros(),
        }
    }

    /// Sets the sequence number range.
    #[must_use]
    pub fn with_seqnos(mut self, lo: SeqNo, hi: SeqNo) -> Self {
        self.seqnos = (lo, hi);
        self
    }

    /// Sets the item and tombstone counts.
    #[must_use]
    pub fn with_counts(mut self, item_count: u64, tombstone_count: u64) -> Self {
        self.item_count = item_count;
        self.tombstone_count = tombstone_count;
        self
    }

    /// Sets the data path index.
    #[must_use]
    pub fn with_path_id(mut self, path_id: u32) -> Self {
        self.path_id = path_id;
        self
    }

    /// Sets the table format.
    #[must_use]
    pub fn with_format(mut self, format: TableFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the creation time (unix timestamp in µs).
    #[must_use]
    pub fn with_created_at(mut self, created_at: u128) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns the user key range.
    #[must_use]
    pub fn key_range(&self) -> &KeyRange {
        &self.key_range
    }

    /// Returns the highest sequence number in the file.
    #[must_use]
    pub fn max_seqno(&self) -> SeqNo {
        self.seqnos.1
    }

    /// Returns the age of the file in seconds.
    #[must_use]
    pub fn age_secs(&self) -> u64 {
        let now = unix_timestamp().as_micros();
        let age = now.saturating_sub(self.created_at) / 1_000_000;
        u64::try_from(age).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Display for FileMetaData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}({}B,{})", self.id, self.file_size, self.key_range)
    }
}

/// Sums up the sizes of the given files
pub fn total_file_size<'a>(files: impl IntoIterator<Item = &'a FileRef>) -> u64 {
    files.into_iter().map(|f| f.file_size).sum()
}
