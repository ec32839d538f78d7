// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Table format abstraction
//!
//! Compaction reads its inputs through a [`TableReader`] and writes its
//! outputs through a [`TableBuilder`], both handed out by a [`TableFactory`].
//! The on-disk layout of a table is up to the factory.

mod adaptive;
mod memory;

pub use adaptive::AdaptiveTableFactory;
pub use memory::MemoryTableFactory;

use crate::{
    file::{FileId, FileMetaData},
    merge::BoxedIterator,
    CompressionType, InternalValue,
};

/// Physical layout of a table file
///
/// The format is recorded per file, so tables of different formats
/// can coexist in the same level.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum TableFormat {
    /// Block-indexed table
    #[default]
    BlockBased,

    /// Hash-prefix-indexed plain table
    Plain,
}

impl std::fmt::Display for TableFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::BlockBased => "BlockBasedTable",
                Self::Plain => "PlainTable",
            }
        )
    }
}

/// Parameters for writing a new table
#[derive(Clone, Debug)]
pub struct BuilderOptions {
    /// ID of the new file
    pub file_id: FileId,

    /// Level the file is written to
    pub level: usize,

    /// Data path the file is placed in
    pub path_id: u32,

    /// Compression of the file's data
    pub compression: CompressionType,
}

/// Streams sorted items into a new table
pub trait TableBuilder: Send {
    /// Appends an item.
    ///
    /// Items must be added in internal key order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn add(&mut self, item: &InternalValue) -> crate::Result<()>;

    /// Returns the (estimated) size of the table written so far.
    fn file_size(&self) -> u64;

    /// Returns the number of items written so far.
    fn item_count(&self) -> u64;

    /// Seals the table and returns its descriptor.
    ///
    /// Returns `None` if no item was written.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn finish(self: Box<Self>) -> crate::Result<Option<FileMetaData>>;

    /// Discards everything written so far.
    fn abandon(self: Box<Self>);
}

/// Reads an existing table
pub trait TableReader: Send + Sync {
    /// Returns an iterator over all items in the table, in internal key order.
    fn scan(&self) -> BoxedIterator<'static>;
}

/// Produces readers and builders for one table format
pub trait TableFactory: Send + Sync {
    /// Name of the table type.
    fn name(&self) -> &'static str;

    /// Format new tables are written in.
    fn format(&self) -> TableFormat;

    /// Opens a reader over an existing table.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the table cannot be read in this format, or an IO error occurs.
    fn open_table(&self, meta: &FileMetaData) -> crate::Result<Box<dyn TableReader>>;

    /// Creates a builder for a new table.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn new_builder(&self, opts: BuilderOptions) -> crate::Result<Box<dyn TableBuilder>>;

    /// Physically deletes a table that is no longer referenced.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn delete_table(&self, meta: &FileMetaData) -> crate::Result<()>;
}
