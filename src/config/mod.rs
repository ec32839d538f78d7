// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod compression;
mod data_path;

pub use compression::CompressionPolicy;
pub use data_path::DataPath;

use crate::CompressionType;

/// Default number of levels
pub const DEFAULT_LEVEL_COUNT: u8 = 7;

/// Compaction configuration shared by all strategies
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of levels of the LSM tree (depth of tree)
    pub level_count: u8,

    /// Factor of the output file size that an output file
    /// may overlap in the grandparent level
    pub max_grandparent_overlap_factor: u64,

    /// Compression to use per output level
    pub compression: CompressionPolicy,

    /// Storage locations for table files
    pub data_paths: Vec<DataPath>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level_count: DEFAULT_LEVEL_COUNT,
            max_grandparent_overlap_factor: 10,
            compression: CompressionPolicy::default(),
            data_paths: vec![DataPath::new(".lsm.data", u64::MAX)],
        }
    }
}

impl Config {
    /// Initializes a new config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of levels of the LSM tree (depth of tree).
    ///
    /// Default = 7, like `LevelDB` and `RocksDB`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0.
    #[must_use]
    pub fn level_count(mut self, n: u8) -> Self {
        assert!(n > 0);

        self.level_count = n;
        self
    }

    /// Sets how many output file sizes an output file may overlap
    /// in the level below the compaction's output level.
    ///
    /// Lower values produce smaller files that are cheaper to compact later.
    ///
    /// Default = 10
    #[must_use]
    pub fn max_grandparent_overlap_factor(mut self, factor: u64) -> Self {
        self.max_grandparent_overlap_factor = factor;
        self
    }

    /// Sets the compression policy for compaction output.
    ///
    /// Default = no compression
    #[must_use]
    pub fn compression(mut self, policy: CompressionPolicy) -> Self {
        self.compression = policy;
        self
    }

    /// Sets the storage locations for table files.
    ///
    /// Default = one unbounded path
    ///
    /// # Panics
    ///
    /// Panics if `paths` is empty.
    #[must_use]
    pub fn data_paths(mut self, paths: Vec<DataPath>) -> Self {
        assert!(!paths.is_empty(), "need at least one data path");

        self.data_paths = paths;
        self
    }

    /// Returns the compression type for output files in the given level.
    #[must_use]
    pub fn compression_for_level(&self, level: usize) -> CompressionType {
        self.compression.get(level)
    }

    /// Returns how many bytes an output file may overlap in its grandparent level.
    #[must_use]
    pub fn max_grandparent_overlap_bytes(&self, max_output_file_size: u64) -> u64 {
        max_output_file_size.saturating_mul(self.max_grandparent_overlap_factor)
    }

    /// Returns the index of the first data path that fits `size` bytes.
    ///
    /// Falls back to the last path.
    #[must_use]
    pub fn path_id_for_size(&self, size: u64) -> u32 {
        let last = self.data_paths.len().saturating_sub(1);

        let idx = self
            .data_paths
            .iter()
            .position(|p| size <= p.target_size)
            .unwrap_or(last);

        u32::try_from(idx).unwrap_or(u32::MAX)
    }
}
