// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BuilderOptions, TableBuilder, TableFactory, TableFormat, TableReader};
use crate::{file::FileMetaData, HashMap};
use std::sync::Arc;

/// Reads tables of any registered format, writes tables in one format
///
/// The reader is chosen by the format recorded in each file's
/// descriptor, which allows migrating a store from one table format
/// to another through compaction.
pub struct AdaptiveTableFactory {
    write_factory: Arc<dyn TableFactory>,
    read_factories: HashMap<TableFormat, Arc<dyn TableFactory>>,
}

impl AdaptiveTableFactory {
    /// Creates a factory that writes through `write_factory`.
    ///
    /// `write_factory` is also used to read its own format.
    #[must_use]
    pub fn new(write_factory: Arc<dyn TableFactory>) -> Self {
        let mut read_factories = HashMap::default();
        read_factories.insert(write_factory.format(), write_factory.clone());

        Self {
            write_factory,
            read_factories,
        }
    }

    /// Registers a factory for reading its format.
    #[must_use]
    pub fn with_reader(mut self, factory: Arc<dyn TableFactory>) -> Self {
        self.read_factories.insert(factory.format(), factory);
        self
    }

    fn factory_for(&self, format: TableFormat) -> crate::Result<&Arc<dyn TableFactory>> {
        self.read_factories
            .get(&format)
            .ok_or(crate::Error::UnsupportedTableFormat(format))
    }
}

impl TableFactory for AdaptiveTableFactory {
    fn name(&self) -> &'static str {
        "AdaptiveTableFactory"
    }

    fn format(&self) -> TableFormat {
        self.write_factory.format()
    }

    fn open_table(&self, meta: &FileMetaData) -> crate::Result<Box<dyn TableReader>> {
        self.factory_for(meta.format)?.open_table(meta)
    }

    fn new_builder(&self, opts: BuilderOptions) -> crate::Result<Box<dyn TableBuilder>> {
        self.write_factory.new_builder(opts)
    }

    fn delete_table(&self, meta: &FileMetaData) -> crate::Result<()> {
        self.factory_for(meta.format)?.delete_table(meta)
    }
}
