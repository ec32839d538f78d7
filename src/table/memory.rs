// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BuilderOptions, TableBuilder, TableFactory, TableFormat, TableReader};
use crate::{
    file::{FileId, FileMetaData},
    merge::BoxedIterator,
    CompressionType, HashMap, InternalValue, SeqNo,
};
use std::sync::{
    atomic::{AtomicU64, Ordering::Relaxed},
    Arc, RwLock,
};

const NEVER: u64 = u64::MAX;

struct StoredTable {
    format: TableFormat,
    items: Arc<[InternalValue]>,
}

type Storage = Arc<RwLock<HashMap<FileId, StoredTable>>>;

/// Keeps tables in memory
///
/// Mostly useful for testing compaction logic without touching disk.
/// Factories created through [`MemoryTableFactory::with_format`] share
/// their storage, so they can be combined in an
/// [`AdaptiveTableFactory`](super::AdaptiveTableFactory).
#[derive(Clone)]
pub struct MemoryTableFactory {
    format: TableFormat,
    storage: Storage,
    writes_until_failure: Arc<AtomicU64>,
    open_count: Arc<AtomicU64>,
}

impl Default for MemoryTableFactory {
    fn default() -> Self {
        Self::new(TableFormat::default())
    }
}

impl MemoryTableFactory {
    /// Creates an empty factory writing the given format.
    #[must_use]
    pub fn new(format: TableFormat) -> Self {
        Self {
            format,
            storage: Arc::default(),
            writes_until_failure: Arc::new(AtomicU64::new(NEVER)),
            open_count: Arc::default(),
        }
    }

    /// Creates a factory writing another format, sharing storage with `self`.
    #[must_use]
    pub fn with_format(&self, format: TableFormat) -> Self {
        Self {
            format,
            ..self.clone()
        }
    }

    /// Makes writes fail with an I/O error after `n` more items were written.
    pub fn fail_writes_after(&self, n: u64) {
        self.writes_until_failure.store(n, Relaxed);
    }

    /// Returns the number of tables currently stored.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn table_count(&self) -> usize {
        self.storage.read().expect("lock is poisoned").len()
    }

    /// Returns `true` if a table with the given ID is stored.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn contains(&self, id: FileId) -> bool {
        self.storage
            .read()
            .expect("lock is poisoned")
            .contains_key(&id)
    }

    /// Returns how many tables have been opened for reading.
    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.open_count.load(Relaxed)
    }

    /// Writes the given items (in any order) into a new table.
    ///
    /// # Errors
    ///
    /// Will return `Err` if writing fails.
    pub fn write_table(
        &self,
        file_id: FileId,
        level: usize,
        mut items: Vec<InternalValue>,
    ) -> crate::Result<Option<FileMetaData>> {
        items.sort();

        let mut builder = self.new_builder(BuilderOptions {
            file_id,
            level,
            path_id: 0,
            compression: CompressionType::None,
        })?;

        for item in &items {
            builder.add(item)?;
        }

        builder.finish()
    }
}

impl TableFactory for MemoryTableFactory {
    fn name(&self) -> &'static str {
        match self.format {
            TableFormat::BlockBased => "MemoryBlockBasedTable",
            TableFormat::Plain => "MemoryPlainTable",
        }
    }

    fn format(&self) -> TableFormat {
        self.format
    }

    fn open_table(&self, meta: &FileMetaData) -> crate::Result<Box<dyn TableReader>> {
        let storage = self.storage.read().expect("lock is poisoned");

        let Some(table) = storage.get(&meta.id) else {
            return Err(crate::Error::TableNotFound(meta.id));
        };

        if table.format != self.format {
            return Err(crate::Error::UnsupportedTableFormat(table.format));
        }

        self.open_count.fetch_add(1, Relaxed);

        Ok(Box::new(MemoryTableReader {
            items: table.items.clone(),
        }))
    }

    fn new_builder(&self, opts: BuilderOptions) -> crate::Result<Box<dyn TableBuilder>> {
        log::trace!(
            "Creating {} #{} in L{} (path={}, compression={})",
            self.format,
            opts.file_id,
            opts.level,
            opts.path_id,
            opts.compression,
        );

        Ok(Box::new(MemoryTableBuilder {
            opts,
            format: self.format,
            storage: self.storage.clone(),
            writes_until_failure: self.writes_until_failure.clone(),
            items: Vec::new(),
            file_size: 0,
            tombstone_count: 0,
            seqnos: (SeqNo::MAX, 0),
        }))
    }

    fn delete_table(&self, meta: &FileMetaData) -> crate::Result<()> {
        self.storage
            .write()
            .expect("lock is poisoned")
            .remove(&meta.id);

        Ok(())
    }
}

struct MemoryTableReader {
    items: Arc<[InternalValue]>,
}

impl TableReader for MemoryTableReader {
    fn scan(&self) -> BoxedIterator<'static> {
        let items = self.items.clone();
        Box::new((0..items.len()).filter_map(move |idx| items.get(idx).cloned().map(Ok)))
    }
}

struct MemoryTableBuilder {
    opts: BuilderOptions,
    format: TableFormat,
    storage: Storage,
    writes_until_failure: Arc<AtomicU64>,

    items: Vec<InternalValue>,
    file_size: u64,
    tombstone_count: u64,
    seqnos: (SeqNo, SeqNo),
}

impl MemoryTableBuilder {
    fn consume_write(&self) -> crate::Result<()> {
        let remaining = self.writes_until_failure.load(Relaxed);

        if remaining == 0 {
            return Err(crate::Error::Io(std::io::Error::other(
                "injected write failure",
            )));
        }

        if remaining != NEVER {
            self.writes_until_failure.fetch_sub(1, Relaxed);
        }

        Ok(())
    }
}

impl TableBuilder for MemoryTableBuilder {
    fn add(&mut self, item: &InternalValue) -> crate::Result<()> {
        self.consume_write()?;

        debug_assert!(
            self.items.last().is_none_or(|last| last.key < item.key),
            "items must be added in order",
        );

        let value_len = self.opts.compression.compressed_len(&item.value);
        self.file_size += (item.size() - item.value.len() + value_len) as u64;

        if item.is_tombstone() {
            self.tombstone_count += 1;
        }

        self.seqnos.0 = self.seqnos.0.min(item.key.seqno);
        self.seqnos.1 = self.seqnos.1.max(item.key.seqno);

        self.items.push(item.clone());

        Ok(())
    }

    fn file_size(&self) -> u64 {
        self.file_size
    }

    fn item_count(&self) -> u64 {
        self.items.len() as u64
    }

    fn finish(self: Box<Self>) -> crate::Result<Option<FileMetaData>> {
        let (Some(first), Some(last)) = (self.items.first(), self.items.last()) else {
            return Ok(None);
        };

        let meta = FileMetaData::new(
            self.opts.file_id,
            first.key.clone(),
            last.key.clone(),
            self.file_size,
        )
        .with_seqnos(self.seqnos.0, self.seqnos.1)
        .with_counts(self.items.len() as u64, self.tombstone_count)
        .with_path_id(self.opts.path_id)
        .with_format(self.format);

        self.storage.write().expect("lock is poisoned").insert(
            self.opts.file_id,
            StoredTable {
                format: self.format,
                items: self.items.into(),
            },
        );

        Ok(Some(meta))
    }

    fn abandon(self: Box<Self>) {
        log::trace!("Abandoning table #{}", self.opts.file_id);
    }
}
