// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{InternalValue, SeqNo, UserKey};

/// What to do with an item of the merged compaction stream
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Write the item to the output
    ///
    /// `new_key` is set for the newest version of a user key, which is
    /// the only place an output file may be cut.
    Keep {
        /// Whether this is the first version of its user key
        new_key: bool,
    },

    /// The item is invisible to every reader, skip it
    Drop,
}

/// Applies garbage collection rules to the merged compaction stream
///
/// Items must be fed in internal key order, so all versions of a user key
/// arrive newest first.
///
/// An item is dropped if:
///
/// - a newer version of the same key is visible to every snapshot (shadowed), or
/// - it is a tombstone visible to every snapshot, and no level below the
///   compaction's output can contain the key
pub struct MvccFilter {
    /// Sequence number of the oldest snapshot still in use
    smallest_snapshot: SeqNo,

    /// Rewrite sequence numbers of old items to 0
    zero_seqnos: bool,

    current_user_key: Option<UserKey>,

    /// Sequence number of the previous version of the current key
    last_seqno_for_key: Option<SeqNo>,

    dropped_count: u64,
}

impl MvccFilter {
    /// Creates a filter that keeps everything newer than the oldest snapshot.
    #[must_use]
    pub fn new(smallest_snapshot: SeqNo) -> Self {
        Self {
            smallest_snapshot,
            zero_seqnos: false,
            current_user_key: None,
            last_seqno_for_key: None,
            dropped_count: 0,
        }
    }

    /// Converts sequence numbers to zero if they are visible to every snapshot.
    ///
    /// Only correct in the bottommost level, where no older version
    /// of the key can exist.
    #[must_use]
    pub fn zero_seqnos(mut self, b: bool) -> Self {
        self.zero_seqnos = b;
        self
    }

    /// Number of items dropped so far.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Decides whether to keep `item`.
    ///
    /// `key_not_exists_beyond` is only consulted for tombstones that could be dropped.
    pub fn filter<F: FnOnce(&[u8]) -> bool>(
        &mut self,
        item: &mut InternalValue,
        key_not_exists_beyond: F,
    ) -> Decision {
        let new_key = self
            .current_user_key
            .as_ref()
            .is_none_or(|key| *key != item.key.user_key);

        if new_key {
            self.current_user_key = Some(item.key.user_key.clone());
            self.last_seqno_for_key = None;
        }

        let seqno = item.key.seqno;
        let visible_to_all = seqno <= self.smallest_snapshot;

        let shadowed = self
            .last_seqno_for_key
            .is_some_and(|newer| newer <= self.smallest_snapshot);

        let drop = if shadowed {
            // NOTE: A newer version is visible to every snapshot
            true
        } else {
            item.is_tombstone() && visible_to_all && key_not_exists_beyond(&item.key.user_key)
        };

        self.last_seqno_for_key = Some(seqno);

        if drop {
            self.dropped_count += 1;
            return Decision::Drop;
        }

        if self.zero_seqnos && visible_to_all && !item.is_tombstone() {
            item.key.seqno = 0;
        }

        Decision::Keep { new_key }
    }
}
