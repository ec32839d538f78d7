// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Contains the compaction job and compaction strategies

pub(crate) mod fifo;
mod job;
pub(crate) mod leveled;
pub(crate) mod manual;
mod scan;
pub(crate) mod state;
pub(crate) mod stream;
mod summary;
pub(crate) mod tiered;
pub mod worker;

pub use fifo::Strategy as Fifo;
pub use job::{Compaction, Phase};
pub use leveled::Strategy as Leveled;
pub use manual::compact_range;
pub use scan::ScanState;
pub use state::{CompactionState, HiddenSet};
pub use stream::{Decision, MvccFilter};
pub use tiered::Strategy as SizeTiered;

use crate::{config::Config, version::Version};
use enum_dispatch::enum_dispatch;

/// Alias for `Leveled`
pub type Levelled = Leveled;

/// Alias for `SizeTiered`
pub type Universal = SizeTiered;

/// Shape of the LSM tree a strategy maintains
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompactionStyle {
    /// Sorted, disjoint levels of growing size
    Level,

    /// Sorted runs in L0, merged by size similarity
    Universal,

    /// Oldest files are dropped
    Fifo,
}

impl std::fmt::Display for CompactionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Level => "level",
                Self::Universal => "universal",
                Self::Fifo => "fifo",
            }
        )
    }
}

/// Trait for a compaction strategy
///
/// The strategy receives the current version as argument
/// and emits the compaction to run next, if any.
///
/// The returned compaction has its input files marked as being
/// compacted in `state`.
#[enum_dispatch]
#[allow(clippy::module_name_repetitions)]
pub trait CompactionStrategy {
    /// Gets the compaction strategy name.
    fn get_name(&self) -> &'static str;

    /// Gets the compaction style the strategy maintains.
    fn style(&self) -> CompactionStyle;

    /// Picks the next compaction, or `None` if nothing needs to be done.
    fn pick(
        &self,
        version: &Version,
        config: &Config,
        state: &mut CompactionState,
    ) -> Option<Compaction>;
}

/// The set of available compaction strategies
#[enum_dispatch(CompactionStrategy)]
#[derive(Clone, Debug)]
pub enum Strategy {
    /// Leveled compaction
    Leveled(Leveled),

    /// Size-tiered (universal) compaction
    SizeTiered(SizeTiered),

    /// FIFO compaction
    Fifo(Fifo),
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Leveled(Leveled::default())
    }
}
