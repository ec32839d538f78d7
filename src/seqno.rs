// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::SeqNo;
use std::sync::{
    atomic::{
        AtomicU64,
        Ordering::{AcqRel, Acquire, Release},
    },
    Arc,
};

/// Thread-safe monotonic counter
///
/// Hands out sequence numbers for writes, and is also
/// used to allocate file and version IDs.
///
/// # Examples
///
/// ```
/// # use lsm_compaction::SequenceNumberCounter;
/// let counter = SequenceNumberCounter::default();
/// assert_eq!(0, counter.next());
/// assert_eq!(1, counter.next());
/// assert_eq!(2, counter.get());
/// ```
#[derive(Clone, Default, Debug)]
pub struct SequenceNumberCounter(Arc<AtomicU64>);

impl SequenceNumberCounter {
    /// Creates a new counter, setting it to some previous value
    #[must_use]
    pub fn new(prev: SeqNo) -> Self {
        Self(Arc::new(AtomicU64::new(prev)))
    }

    /// Gets the would-be-next number, without incrementing the counter.
    #[must_use]
    pub fn get(&self) -> SeqNo {
        self.0.load(Acquire)
    }

    /// Gets the next number.
    #[must_use]
    #[allow(clippy::missing_panics_doc, reason = "we should never run out of u64s")]
    pub fn next(&self) -> SeqNo {
        let seqno = self.0.fetch_add(1, Release);

        // The MSB is reserved
        assert!(seqno < 0x8000_0000_0000_0000, "Ran out of sequence numbers");

        seqno
    }

    /// Maximizes the counter.
    pub fn fetch_max(&self, seqno: SeqNo) {
        self.0.fetch_max(seqno, AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::SequenceNumberCounter;
    use test_log::test;

    #[test]
    fn seqno_counter_fetch_max() {
        let counter = SequenceNumberCounter::new(5);
        counter.fetch_max(3);
        assert_eq!(5, counter.get());
        counter.fetch_max(10);
        assert_eq!(10, counter.next());
        assert_eq!(11, counter.get());
    }

    #[test]
    #[should_panic = "Ran out of sequence numbers"]
    fn seqno_counter_overflow() {
        let counter = SequenceNumberCounter::new(0x8000_0000_0000_0000);
        let _ = counter.next();
    }
}
