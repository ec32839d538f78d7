// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    file::{FileId, FileRef},
    HashMap,
};
use std::sync::Mutex;

struct Entry {
    file: FileRef,
    refs: usize,
}

#[derive(Default)]
struct Inner {
    files: HashMap<FileId, Entry>,
    obsolete: Vec<FileRef>,
}

/// Counts how many live versions reference each file
///
/// A file whose count drops to zero is moved to the obsolete list,
/// from where it can be physically deleted.
#[derive(Default)]
pub struct FileRegistry(Mutex<Inner>);

impl FileRegistry {
    pub(crate) fn ref_files<'a>(&self, files: impl Iterator<Item = &'a FileRef>) {
        let mut inner = self.0.lock().expect("lock is poisoned");

        for file in files {
            inner
                .files
                .entry(file.id)
                .and_modify(|e| e.refs += 1)
                .or_insert_with(|| Entry {
                    file: file.clone(),
                    refs: 1,
                });
        }
    }

    pub(crate) fn unref_files<'a>(&self, files: impl Iterator<Item = &'a FileRef>) {
        let mut inner = self.0.lock().expect("lock is poisoned");

        for file in files {
            let Some(entry) = inner.files.get_mut(&file.id) else {
                log::error!("Unref of untracked file #{}", file.id);
                continue;
            };

            entry.refs -= 1;

            if entry.refs == 0 {
                if let Some(entry) = inner.files.remove(&file.id) {
                    log::trace!("File #{} is now obsolete", file.id);
                    inner.obsolete.push(entry.file);
                }
            }
        }
    }

    pub(crate) fn requeue_obsolete(&self, files: &[FileRef]) {
        self.0
            .lock()
            .expect("lock is poisoned")
            .obsolete
            .extend(files.iter().cloned());
    }

    /// Returns the number of live versions referencing the file.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn ref_count(&self, id: FileId) -> usize {
        self.0
            .lock()
            .expect("lock is poisoned")
            .files
            .get(&id)
            .map_or(0, |e| e.refs)
    }

    /// Returns the number of files referenced by at least one version.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn live_file_count(&self) -> usize {
        self.0.lock().expect("lock is poisoned").files.len()
    }

    /// Takes all files that are no longer referenced by any version.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn take_obsolete(&self) -> Vec<FileRef> {
        std::mem::take(&mut self.0.lock().expect("lock is poisoned").obsolete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file::FileMetaData, key::InternalKey, ValueType};
    use std::sync::Arc;
    use test_log::test;

    fn file(id: FileId) -> FileRef {
        Arc::new(FileMetaData::new(
            id,
            InternalKey::new("a", 0, ValueType::Value),
            InternalKey::new("b", 0, ValueType::Value),
            1,
        ))
    }

    #[test]
    fn registry_counts() {
        let registry = FileRegistry::default();
        let a = file(1);
        let b = file(2);

        registry.ref_files([&a, &b].into_iter());
        registry.ref_files([&a].into_iter());
        assert_eq!(2, registry.ref_count(1));
        assert_eq!(1, registry.ref_count(2));

        registry.unref_files([&a, &b].into_iter());
        assert_eq!(1, registry.ref_count(1));
        assert_eq!(0, registry.ref_count(2));
        assert_eq!(1, registry.live_file_count());

        let obsolete = registry.take_obsolete();
        assert_eq!(vec![2], obsolete.iter().map(|f| f.id).collect::<Vec<_>>());
        assert!(registry.take_obsolete().is_empty());

        registry.unref_files([&a].into_iter());
        assert_eq!(1, registry.take_obsolete().len());
        assert_eq!(0, registry.live_file_count());
    }
}
