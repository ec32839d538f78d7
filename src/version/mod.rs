// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod edit;
mod level;
mod registry;
mod set;

pub use edit::VersionEdit;
pub use level::Level;
pub use registry::FileRegistry;
pub use set::VersionSet;

use crate::{
    file::{FileId, FileRef},
    HashSet, KeyRange,
};
use std::sync::Arc;

/// Monotonically increasing ID of a version.
pub type VersionId = u64;

#[doc(hidden)]
pub struct VersionInner {
    /// The version's ID
    id: VersionId,

    /// The individual LSM-tree levels
    levels: Vec<Level>,

    /// Reference counting of files, if the version is tracked
    registry: Option<Arc<FileRegistry>>,
}

impl Drop for VersionInner {
    fn drop(&mut self) {
        if let Some(registry) = &self.registry {
            log::trace!("Dropping version {}", self.id);
            registry.unref_files(self.levels.iter().flat_map(|level| level.iter()));
        }
    }
}

/// A version is an immutable, point-in-time view of which files live in which level
///
/// Any time files are added or deleted, a new version is created
/// by applying a [`VersionEdit`].
///
/// Cloning a version is cheap; readers and running compactions
/// hold on to the version they started with.
#[derive(Clone)]
pub struct Version {
    inner: Arc<VersionInner>,
}

impl std::ops::Deref for Version {
    type Target = VersionInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Version {}", self.id)?;

        for (idx, level) in self.levels.iter().enumerate() {
            write!(f, "L{idx}:")?;
            for file in level.iter() {
                write!(f, " {file}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

impl Version {
    fn build(id: VersionId, levels: Vec<Level>, registry: Option<Arc<FileRegistry>>) -> Self {
        if let Some(registry) = &registry {
            registry.ref_files(levels.iter().flat_map(|level| level.iter()));
        }

        Self {
            inner: Arc::new(VersionInner {
                id,
                levels,
                registry,
            }),
        }
    }

    /// Creates a new empty version.
    #[must_use]
    pub fn new(id: VersionId, level_count: usize) -> Self {
        let levels = (0..level_count).map(|idx| Level::empty(idx > 0)).collect();
        Self::build(id, levels, None)
    }

    pub(crate) fn new_tracked(id: VersionId, level_count: usize, registry: Arc<FileRegistry>) -> Self {
        let levels = (0..level_count).map(|idx| Level::empty(idx > 0)).collect();
        Self::build(id, levels, Some(registry))
    }

    /// Creates a new pre-populated version.
    ///
    /// # Errors
    ///
    /// Returns error if a level beyond L0 contains overlapping files,
    /// or a file ID appears twice.
    pub fn from_levels(id: VersionId, levels: Vec<Vec<FileRef>>) -> crate::Result<Self> {
        let levels = levels
            .into_iter()
            .enumerate()
            .map(|(idx, files)| Level::new(files, idx > 0))
            .collect::<Vec<_>>();

        Self::validate(&levels)?;

        Ok(Self::build(id, levels, None))
    }

    fn validate(levels: &[Level]) -> crate::Result<()> {
        if levels.iter().skip(1).any(Level::has_overlapping_files) {
            return Err(crate::Error::InvalidVersionEdit(
                "overlapping files in sorted level",
            ));
        }

        let mut seen = HashSet::default();
        for file in levels.iter().flat_map(|level| level.iter()) {
            if !seen.insert(file.id) {
                return Err(crate::Error::InvalidVersionEdit("duplicate file ID"));
            }
        }

        Ok(())
    }

    /// Returns the version ID.
    #[must_use]
    pub fn id(&self) -> VersionId {
        self.id
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Returns an iterator through all levels.
    pub fn iter_levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter()
    }

    /// Gets the n-th level.
    #[must_use]
    pub fn level(&self, n: usize) -> Option<&Level> {
        self.levels.get(n)
    }

    /// Returns an iterator over all files.
    pub fn iter_files(&self) -> impl Iterator<Item = &FileRef> {
        self.levels.iter().flat_map(|level| level.iter())
    }

    /// Returns the number of files in all levels.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.levels.iter().map(|level| level.len()).sum()
    }

    /// Returns the size of all files in all levels.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.levels.iter().map(Level::size).sum()
    }

    /// Finds a file and the level it lives in.
    #[must_use]
    pub fn get_file(&self, id: FileId) -> Option<(usize, &FileRef)> {
        self.levels.iter().enumerate().find_map(|(idx, level)| {
            level.iter().find(|f| f.id == id).map(|f| (idx, f))
        })
    }

    /// Returns the files in `level` that overlap the key range.
    ///
    /// In L0, the range is widened by every overlapping file until it is stable,
    /// because overlapping L0 files must be compacted together.
    #[must_use]
    pub fn get_overlapping_inputs(&self, level: usize, key_range: &KeyRange) -> Vec<FileRef> {
        let Some(files) = self.level(level) else {
            return vec![];
        };

        if files.is_disjoint() {
            return files.get_overlapping(key_range);
        }

        let mut key_range = key_range.clone();

        loop {
            let overlapping = files.get_overlapping(&key_range);

            let widened = overlapping
                .iter()
                .fold(key_range.clone(), |acc, f| acc.merge(f.key_range()));

            if widened == key_range {
                return overlapping;
            }

            key_range = widened;
        }
    }

    /// Returns `true` if some file in the level overlaps the key range,
    /// ignoring the excluded files.
    #[must_use]
    pub fn level_overlaps(&self, level: usize, key_range: &KeyRange, exclude: &HashSet<FileId>) -> bool {
        self.level(level).is_some_and(|files| {
            files
                .get_overlapping(key_range)
                .iter()
                .any(|f| !exclude.contains(&f.id))
        })
    }

    /// Applies an edit, returning the resulting version.
    ///
    /// The edit is applied completely or not at all.
    ///
    /// # Errors
    ///
    /// Returns error if the edit deletes a file that does not exist,
    /// adds a file that already exists, or would make a sorted level overlap.
    pub fn apply(&self, id: VersionId, edit: &VersionEdit) -> crate::Result<Self> {
        if let Some(level) = edit.max_level() {
            if level >= self.level_count() {
                return Err(crate::Error::LevelOutOfRange(level));
            }
        }

        let mut deleted = HashSet::default();

        for (level, file_id) in edit.deleted_files() {
            let exists = self
                .level(level)
                .is_some_and(|files| files.contains_id(file_id));

            if !exists {
                return Err(crate::Error::InvalidVersionEdit("deleted file not found"));
            }

            deleted.insert(file_id);
        }

        for (_, file) in edit.new_files() {
            if self.get_file(file.id).is_some() && !deleted.contains(&file.id) {
                return Err(crate::Error::InvalidVersionEdit("added file already exists"));
            }
        }

        let levels = self
            .levels
            .iter()
            .enumerate()
            .map(|(idx, level)| {
                let mut files = level
                    .iter()
                    .filter(|f| !deleted.contains(&f.id))
                    .cloned()
                    .collect::<Vec<_>>();

                files.extend(
                    edit.new_files()
                        .iter()
                        .filter(|(lvl, _)| *lvl == idx)
                        .map(|(_, f)| f.clone()),
                );

                Level::new(files, level.is_disjoint())
            })
            .collect::<Vec<_>>();

        Self::validate(&levels)?;

        Ok(Self::build(id, levels, self.registry.clone()))
    }
}
