// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{file::FileId, table::TableFormat};

/// Represents errors that can occur while planning or running compactions
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// A compaction was requested with an impossible plan
    /// (bad level span, empty or unknown input files)
    InvalidCompaction(&'static str),

    /// Some requested input is already being compacted by another job
    CompactionConflict,

    /// A version edit cannot be applied to the current version
    InvalidVersionEdit(&'static str),

    /// Level index is not below the configured level count
    LevelOutOfRange(usize),

    /// The table factory has no table for the given file
    TableNotFound(FileId),

    /// No reader is registered for the table format
    UnsupportedTableFormat(TableFormat),

    /// Compaction was abandoned because the stop signal was sent
    Stopped,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompactionError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Compaction result
pub type Result<T> = std::result::Result<T, Error>;
