// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Compaction machinery for log-structured merge trees (LSM-trees/LSMTs).
//!
//! ##### NOTE
//!
//! > This crate only provides the compaction layer of an LSM-tree, not a storage engine.
//! > It does not ship with a memtable, write-ahead log or read path.
//! > Table files are read and written through a pluggable [`TableFactory`](table::TableFactory).
//!
//! ##### About
//!
//! Amassing many tables on disk will degrade read performance and waste disk space, so tables
//! are periodically merged into larger tables in a process called `Compaction`.
//!
//! This crate models the state of an LSM-tree as immutable [`Version`]s, each holding a
//! number of levels of table files. A [`VersionSet`] owns the current version and
//! keeps track of which files are being compacted.
//!
//! A compaction strategy ([`Leveled`](compaction::Leveled), [`SizeTiered`](compaction::SizeTiered)
//! or [`Fifo`](compaction::Fifo)) looks at the current version and picks a [`Compaction`](compaction::Compaction):
//! which files to merge, and which level to write the result to.
//! The [compaction worker](compaction::worker) then either drops the input files, moves a single file
//! one level down, or merges the inputs, garbage collecting shadowed versions and tombstones.
//! Finally, the result is installed as a new version.
//!
//! Different compaction strategies have different advantages and drawbacks, and should be chosen based
//! on the workload characteristics.
//!
//! # Example usage
//!
//! ```
//! use lsm_compaction::{
//!     compaction::{worker, Leveled, Strategy},
//!     table::MemoryTableFactory,
//!     Config, InternalValue, StopSignal, ValueType, VersionEdit, VersionSet,
//! };
//! use std::sync::Arc;
//!
//! let version_set = Arc::new(VersionSet::new(Config::default()));
//! let factory = Arc::new(MemoryTableFactory::default());
//!
//! // Pretend some memtables were flushed into L0
//! let mut edit = VersionEdit::new();
//!
//! for batch in 0..4u64 {
//!     let items = vec![
//!         InternalValue::from_components("a", "old", batch, ValueType::Value),
//!         InternalValue::from_components("b", "old", batch, ValueType::Value),
//!     ];
//!
//!     if let Some(file) = factory.write_table(version_set.next_file_id(), 0, items)? {
//!         edit.add_file(0, file);
//!     }
//! }
//!
//! version_set.log_and_apply(&edit)?;
//!
//! let opts = worker::Options {
//!     version_set: version_set.clone(),
//!     table_factory: factory.clone(),
//!     strategy: Strategy::Leveled(Leveled::default()),
//!     stop_signal: StopSignal::default(),
//!     smallest_snapshot: u64::MAX,
//! };
//!
//! // L0 reached its file limit, so it is merged into L1
//! let outcome = worker::do_compaction(&opts)?;
//! assert_eq!(worker::CompactionOutcome::Merged { created: 1 }, outcome);
//!
//! let current = version_set.current();
//! assert_eq!(1, current.file_count());
//!
//! // Physically delete the input files
//! assert_eq!(4, worker::delete_obsolete_files(&version_set, &*factory)?);
//! #
//! # Ok::<(), lsm_compaction::Error>(())
//! ```

#![doc(html_logo_url = "https://raw.githubusercontent.com/fjall-rs/lsm-tree/main/logo.png")]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/fjall-rs/lsm-tree/main/logo.png")]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
#![warn(clippy::redundant_feature_names)]

#[doc(hidden)]
pub type HashMap<K, V> = std::collections::HashMap<K, V, rustc_hash::FxBuildHasher>;

pub(crate) type HashSet<K> = std::collections::HashSet<K, rustc_hash::FxBuildHasher>;

macro_rules! fail_iter {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Some(Err(e.into())),
        }
    };
}

pub mod compaction;
mod compression;

/// Configuration
pub mod config;

mod error;

#[doc(hidden)]
pub mod file;

mod key;
mod key_range;

#[doc(hidden)]
pub mod merge;

mod seqno;
mod slice;

#[doc(hidden)]
pub mod stop_signal;

pub mod table;

mod time;
mod value;
mod value_type;
mod version;

#[doc(hidden)]
pub use {key::InternalKey, merge::BoxedIterator, value::InternalValue};

pub use {
    compression::CompressionType,
    config::Config,
    error::{Error, Result},
    file::{FileId, FileMetaData, FileRef},
    key_range::KeyRange,
    seqno::SequenceNumberCounter,
    slice::Slice,
    stop_signal::StopSignal,
    value::{SeqNo, UserKey, UserValue},
    value_type::ValueType,
    version::{FileRegistry, Level, Version, VersionEdit, VersionId, VersionSet},
};
