// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    file::{total_file_size, FileId, FileRef},
    HashSet, KeyRange,
};

/// Files of a single level
///
/// L0 may contain overlapping files and is ordered newest first.
/// Every other level is a disjoint run of files, sorted by key.
#[derive(Clone, Debug, Default)]
pub struct Level {
    files: Vec<FileRef>,
    disjoint: bool,
}

impl std::ops::Deref for Level {
    type Target = [FileRef];

    fn deref(&self) -> &Self::Target {
        &self.files
    }
}

impl Level {
    /// Creates an empty level.
    #[must_use]
    pub fn empty(disjoint: bool) -> Self {
        Self {
            files: Vec::new(),
            disjoint,
        }
    }

    /// Creates a level from files in any order.
    ///
    /// Disjointness is not checked, see [`Level::has_overlapping_files`].
    #[must_use]
    pub fn new(mut files: Vec<FileRef>, disjoint: bool) -> Self {
        if disjoint {
            files.sort_by(|a, b| a.smallest.cmp(&b.smallest));
        } else {
            // Newest first
            files.sort_by(|a, b| {
                (b.max_seqno(), b.id).cmp(&(a.max_seqno(), a.id))
            });
        }

        Self { files, disjoint }
    }

    /// Returns `true` if the level is a sorted, disjoint run.
    #[must_use]
    pub fn is_disjoint(&self) -> bool {
        self.disjoint
    }

    /// Returns the sum of all file sizes.
    #[must_use]
    pub fn size(&self) -> u64 {
        total_file_size(&self.files)
    }

    /// Returns the IDs of all files.
    #[must_use]
    pub fn list_ids(&self) -> HashSet<FileId> {
        self.files.iter().map(|f| f.id).collect()
    }

    /// Returns `true` if the level contains the file.
    #[must_use]
    pub fn contains_id(&self, id: FileId) -> bool {
        self.files.iter().any(|f| f.id == id)
    }

    /// Returns the key range covered by the level.
    #[must_use]
    pub fn aggregate_key_range(&self) -> Option<KeyRange> {
        KeyRange::aggregate(self.files.iter().map(|f| f.key_range()))
    }

    /// Returns `true` if any two neighbouring files share a user key.
    ///
    /// Only meaningful for disjoint levels.
    #[must_use]
    pub fn has_overlapping_files(&self) -> bool {
        self.files.windows(2).any(|pair| match pair {
            [a, b] => a.largest.user_key >= b.smallest.user_key,
            _ => false,
        })
    }

    /// Returns the indexes of the interval [lo, hi] of files that overlap with a given range.
    ///
    /// Only valid for disjoint levels.
    fn range_overlap_indexes(&self, key_range: &KeyRange) -> Option<(usize, usize)> {
        let files = &self.files;

        let lo = files.partition_point(|f| f.key_range().max() < key_range.min());

        let hi = files.partition_point(|f| f.key_range().min() <= key_range.max());

        if lo >= hi {
            return None;
        }

        Some((lo, hi - 1))
    }

    /// Returns all files overlapping the given key range, in level order.
    #[must_use]
    pub fn get_overlapping(&self, key_range: &KeyRange) -> Vec<FileRef> {
        if self.disjoint {
            self.range_overlap_indexes(key_range)
                .and_then(|(lo, hi)| self.files.get(lo..=hi))
                .map(<[FileRef]>::to_vec)
                .unwrap_or_default()
        } else {
            self.files
                .iter()
                .filter(|f| f.key_range().overlaps_with_key_range(key_range))
                .cloned()
                .collect()
        }
    }

    /// Returns the position of the first file that overlaps the key range.
    #[must_use]
    pub fn first_overlapping_index(&self, key_range: &KeyRange) -> Option<usize> {
        if self.disjoint {
            self.range_overlap_indexes(key_range).map(|(lo, _)| lo)
        } else {
            self.files
                .iter()
                .position(|f| f.key_range().overlaps_with_key_range(key_range))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{file::FileMetaData, key::InternalKey, ValueType};
    use std::sync::Arc;
    use test_log::test;

    fn f(id: FileId, min: &str, max: &str, seqno: u64) -> FileRef {
        Arc::new(FileMetaData::new(
            id,
            InternalKey::new(min, seqno, ValueType::Value),
            InternalKey::new(max, seqno, ValueType::Value),
            100,
        ))
    }

    fn ids(files: &[FileRef]) -> Vec<FileId> {
        files.iter().map(|f| f.id).collect()
    }

    fn kr(min: &str, max: &str) -> KeyRange {
        KeyRange::new((min.into(), max.into()))
    }

    fn run() -> Level {
        Level::new(
            vec![
                f(3, "p", "z", 0),
                f(0, "a", "d", 0),
                f(2, "k", "o", 0),
                f(1, "e", "j", 0),
            ],
            true,
        )
    }

    #[test]
    fn level_sorted_by_key() {
        assert_eq!(vec![0, 1, 2, 3], ids(&run()));
        assert!(!run().has_overlapping_files());
        assert_eq!(400, run().size());
    }

    #[test]
    fn level_l0_newest_first() {
        let level = Level::new(vec![f(1, "a", "z", 1), f(2, "a", "z", 5), f(3, "a", "z", 3)], false);
        assert_eq!(vec![2, 3, 1], ids(&level));
    }

    #[test]
    fn level_range_overlaps() {
        let level = run();

        assert_eq!(vec![0], ids(&level.get_overlapping(&kr("a", "a"))));
        assert_eq!(vec![0], ids(&level.get_overlapping(&kr("d", "d"))));
        assert_eq!(vec![0, 1], ids(&level.get_overlapping(&kr("a", "f"))));
        assert_eq!(vec![1], ids(&level.get_overlapping(&kr("j", "j"))));
        assert_eq!(vec![0, 1, 2, 3], ids(&level.get_overlapping(&kr("a", "zzz"))));
        assert_eq!(vec![3], ids(&level.get_overlapping(&kr("z", "zzz"))));
        assert!(level.get_overlapping(&kr("zzz", "zzzz")).is_empty());
        assert!(level.get_overlapping(&kr("0", "1")).is_empty());

        assert_eq!(Some(2), level.first_overlapping_index(&kr("l", "q")));
        assert_eq!(None, level.first_overlapping_index(&kr("zz", "zzz")));
    }

    #[test]
    fn level_detects_overlap() {
        let level = Level::new(vec![f(0, "a", "d", 0), f(1, "d", "j", 0)], true);
        assert!(level.has_overlapping_files());
    }

    #[test]
    fn level_aggregate_key_range() {
        assert_eq!(Some(kr("a", "z")), run().aggregate_key_range());
        assert_eq!(None, Level::empty(true).aggregate_key_range());
    }

    #[test]
    fn level_overlapping_l0() {
        let level = Level::new(vec![f(1, "a", "c", 1), f(2, "x", "z", 2), f(3, "b", "y", 3)], false);
        assert_eq!(vec![3, 1], ids(&level.get_overlapping(&kr("a", "b"))));
    }
}
