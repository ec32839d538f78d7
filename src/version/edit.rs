// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::file::{FileId, FileRef};
use std::collections::BTreeSet;

/// A diff between two versions: files added and files deleted
///
/// Edits are applied atomically using [`Version::apply`](super::Version::apply).
#[derive(Clone, Debug, Default)]
pub struct VersionEdit {
    deleted_files: BTreeSet<(usize, FileId)>,
    new_files: Vec<(usize, FileRef)>,
}

impl VersionEdit {
    /// Creates an empty edit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the deletion of a file.
    pub fn delete_file(&mut self, level: usize, id: FileId) {
        self.deleted_files.insert((level, id));
    }

    /// Records the addition of a file.
    pub fn add_file<F: Into<FileRef>>(&mut self, level: usize, file: F) {
        self.new_files.push((level, file.into()));
    }

    /// Returns the deleted files as (level, file ID).
    pub fn deleted_files(&self) -> impl Iterator<Item = (usize, FileId)> + '_ {
        self.deleted_files.iter().copied()
    }

    /// Returns the added files as (level, file).
    #[must_use]
    pub fn new_files(&self) -> &[(usize, FileRef)] {
        &self.new_files
    }

    /// Returns the number of deletions.
    #[must_use]
    pub fn deletion_count(&self) -> usize {
        self.deleted_files.len()
    }

    /// Returns the number of additions.
    #[must_use]
    pub fn addition_count(&self) -> usize {
        self.new_files.len()
    }

    /// Returns `true` if the edit does not change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted_files.is_empty() && self.new_files.is_empty()
    }

    pub(crate) fn max_level(&self) -> Option<usize> {
        self.deleted_files
            .iter()
            .map(|(level, _)| *level)
            .chain(self.new_files.iter().map(|(level, _)| *level))
            .max()
    }
}

impl std::fmt::Display for VersionEdit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VersionEdit {{ deleted: [")?;
        for (level, id) in &self.deleted_files {
            write!(f, " L{level}:#{id}")?;
        }
        write!(f, " ], added: [")?;
        for (level, file) in &self.new_files {
            write!(f, " L{level}:#{}", file.id)?;
        }
        write!(f, " ] }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file::FileMetaData, key::InternalKey, ValueType};
    use test_log::test;

    #[test]
    fn version_edit_dedups_deletions() {
        let mut edit = VersionEdit::new();
        assert!(edit.is_empty());

        edit.delete_file(1, 5);
        edit.delete_file(1, 5);
        edit.delete_file(2, 6);

        assert_eq!(2, edit.deletion_count());
        assert_eq!(Some(2), edit.max_level());
    }

    #[test]
    fn version_edit_display() {
        let mut edit = VersionEdit::new();
        edit.delete_file(0, 1);
        edit.add_file(
            1,
            FileMetaData::new(
                2,
                InternalKey::new("a", 0, ValueType::Value),
                InternalKey::new("b", 0, ValueType::Value),
                10,
            ),
        );

        assert_eq!(1, edit.addition_count());
        assert_eq!(
            "VersionEdit { deleted: [ L0:#1 ], added: [ L1:#2 ] }",
            edit.to_string()
        );
    }
}
