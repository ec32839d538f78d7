// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::path::PathBuf;

/// A storage location for table files, with a target size
///
/// Compaction output is placed in the first path whose
/// budget can hold it; the last path takes everything else.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataPath {
    /// Folder the files live in
    pub path: PathBuf,

    /// Amount of data (in bytes) this path should hold
    pub target_size: u64,
}

impl DataPath {
    /// Creates a data path.
    pub fn new<P: Into<PathBuf>>(path: P, target_size: u64) -> Self {
        Self {
            path: path.into(),
            target_size,
        }
    }
}
