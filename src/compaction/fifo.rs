// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    job::Options, state::CompactionState, Compaction, CompactionStrategy, CompactionStyle,
};
use crate::{config::Config, version::Version};

#[doc(hidden)]
pub const NAME: &str = "FifoCompaction";

/// FIFO-style compaction
///
/// Limits the tree size to roughly `limit` bytes, deleting the oldest table(s)
/// when the threshold is reached.
///
/// Additionally, a (lazy) TTL can be configured to drop old tables.
///
/// Tables are dropped without being rewritten.
///
/// ###### Caution
///
/// Only use it for specific workloads where:
///
/// 1) You only want to store recent data (unimportant logs, ...)
/// 2) Your keyspace grows monotonically (e.g. time series)
/// 3) You only insert new data (no updates)
#[derive(Clone, Debug)]
pub struct Strategy {
    /// Data set size limit in bytes
    pub limit: u64,

    /// TTL in seconds, will be disabled if 0 or None
    pub ttl_seconds: Option<u64>,
}

impl Strategy {
    /// Configures a new `Fifo` compaction strategy
    #[must_use]
    pub fn new(limit: u64, ttl_seconds: Option<u64>) -> Self {
        Self { limit, ttl_seconds }
    }
}

impl CompactionStrategy for Strategy {
    fn get_name(&self) -> &'static str {
        NAME
    }

    fn style(&self) -> CompactionStyle {
        CompactionStyle::Fifo
    }

    fn pick(
        &self,
        version: &Version,
        config: &Config,
        state: &mut CompactionState,
    ) -> Option<Compaction> {
        let first_level = version.level(0)?;

        if first_level.is_empty() || state.in_progress(0) > 0 {
            return None;
        }

        let hidden_set = state.hidden_set();
        let ttl = self.ttl_seconds.filter(|&s| s > 0);

        let mut to_drop = vec![];
        let mut remaining_size = 0u64;
        let mut alive = vec![];

        // NOTE: L0 is ordered newest first, so walk it backwards
        for file in first_level.iter().rev() {
            if hidden_set.is_hidden(file.id) {
                continue;
            }

            if ttl.is_some_and(|ttl| file.age_secs() >= ttl) {
                to_drop.push(file.clone());
            } else {
                remaining_size += file.file_size;
                alive.push(file);
            }
        }

        // If we still exceed the limit, drop additional oldest tables until within the limit
        for file in alive {
            if remaining_size <= self.limit {
                break;
            }

            remaining_size -= file.file_size;
            to_drop.push(file.clone());
        }

        if to_drop.is_empty() {
            return None;
        }

        let opts = Options {
            max_output_file_size: 0,
            max_grandparent_overlap_bytes: 0,
            output_path_id: 0,
            compression: config.compression_for_level(0),
            style: CompactionStyle::Fifo,
            seek_compaction: false,
            deletion_compaction: true,
        };

        let result = Compaction::new(version.clone(), 0, 0, to_drop, opts)
            .and_then(|compaction| compaction.register(state));

        match result {
            Ok(compaction) => {
                log::debug!("FIFO: dropping {} file(s): {compaction}", compaction.num_input_files(0));
                Some(compaction)
            }
            Err(crate::Error::CompactionConflict) => None,
            Err(e) => {
                log::error!("Failed to plan FIFO compaction: {e:?}");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::Strategy;
    use crate::{
        compaction::{state::CompactionState, CompactionStrategy},
        file::{FileMetaData, FileRef},
        key::InternalKey,
        version::Version,
        Config, ValueType,
    };
    use std::sync::Arc;
    use test_log::test;

    fn f(id: u64, size: u64) -> FileRef {
        Arc::new(FileMetaData::new(
            id,
            InternalKey::new([b'k', id as u8], id, ValueType::Value),
            InternalKey::new([b'k', id as u8], id, ValueType::Value),
            size,
        ))
    }

    fn ids(compaction: &crate::compaction::Compaction) -> Vec<u64> {
        let mut ids = compaction.input_ids().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn fifo_empty_levels() -> crate::Result<()> {
        let version = Version::new(0, 7);
        let mut state = CompactionState::default();

        assert!(Strategy::new(1, None)
            .pick(&version, &Config::default(), &mut state)
            .is_none());

        Ok(())
    }

    #[test]
    fn fifo_below_limit() -> crate::Result<()> {
        let version = Version::from_levels(0, vec![(1..=4).map(|id| f(id, 10)).collect()])?;
        let mut state = CompactionState::default();

        assert!(Strategy::new(40, None)
            .pick(&version, &Config::default(), &mut state)
            .is_none());

        Ok(())
    }

    #[test]
    fn fifo_more_than_limit() -> crate::Result<()> {
        let version = Version::from_levels(0, vec![(1..=4).map(|id| f(id, 10)).collect(), vec![]])?;
        let mut state = CompactionState::default();

        let compaction = Strategy::new(25, None)
            .pick(&version, &Config::default(), &mut state)
            .expect("should drop");

        assert!(compaction.is_deletion_compaction());
        assert_eq!(vec![1, 2], ids(&compaction));
        assert_eq!(0, compaction.output_level());

        // Only one FIFO job at a time
        assert!(Strategy::new(1, None)
            .pick(&version, &Config::default(), &mut state)
            .is_none());

        Ok(())
    }

    #[test]
    fn fifo_ttl() -> crate::Result<()> {
        let old = Arc::new((*f(1, 10)).clone().with_created_at(0));
        let version = Version::from_levels(0, vec![vec![old, f(2, 10)]])?;
        let mut state = CompactionState::default();

        let compaction = Strategy::new(u64::MAX, Some(60))
            .pick(&version, &Config::default(), &mut state)
            .expect("should drop");

        assert_eq!(vec![1], ids(&compaction));

        Ok(())
    }

    #[test]
    fn fifo_ttl_disabled_by_zero() -> crate::Result<()> {
        let old = Arc::new((*f(1, 10)).clone().with_created_at(0));
        let version = Version::from_levels(0, vec![vec![old]])?;
        let mut state = CompactionState::default();

        assert!(Strategy::new(u64::MAX, Some(0))
            .pick(&version, &Config::default(), &mut state)
            .is_none());

        Ok(())
    }
}
