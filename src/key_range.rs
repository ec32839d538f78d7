// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::UserKey;

/// A closed key range `[min, max]` over user keys
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyRange((UserKey, UserKey));

impl std::ops::Deref for KeyRange {
    type Target = (UserKey, UserKey);

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for KeyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}<=>{}]",
            String::from_utf8_lossy(self.min()),
            String::from_utf8_lossy(self.max())
        )
    }
}

impl KeyRange {
    /// Creates a new key range.
    #[must_use]
    pub fn new(range: (UserKey, UserKey)) -> Self {
        Self(range)
    }

    /// Lower bound (inclusive).
    #[must_use]
    pub fn min(&self) -> &UserKey {
        &self.0 .0
    }

    /// Upper bound (inclusive).
    #[must_use]
    pub fn max(&self) -> &UserKey {
        &self.0 .1
    }

    /// Returns `true` if the key falls into this range.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.min().as_ref() && key <= self.max().as_ref()
    }

    /// Returns `true` if `other` lies fully inside this range.
    #[must_use]
    pub fn contains_range(&self, other: &Self) -> bool {
        self.min() <= other.min() && other.max() <= self.max()
    }

    /// Returns `true` if the ranges share at least one key.
    ///
    /// Touching bounds count as overlap.
    #[must_use]
    pub fn overlaps_with_key_range(&self, other: &Self) -> bool {
        self.min() <= other.max() && other.min() <= self.max()
    }

    /// Returns `true` if the range intersects `[lo, hi]`, with `None` meaning unbounded.
    #[must_use]
    pub fn overlaps_with_bounds(&self, lo: Option<&[u8]>, hi: Option<&[u8]>) -> bool {
        let lo_ok = lo.is_none_or(|lo| lo <= self.max().as_ref());
        let hi_ok = hi.is_none_or(|hi| hi >= self.min().as_ref());
        lo_ok && hi_ok
    }

    /// Returns the smallest range covering both ranges.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let min = if other.min() < self.min() {
            other.min()
        } else {
            self.min()
        };

        let max = if other.max() > self.max() {
            other.max()
        } else {
            self.max()
        };

        Self((min.clone(), max.clone()))
    }

    /// Aggregates a key range.
    ///
    /// Returns `None` for an empty iterator.
    pub fn aggregate<'a>(mut iter: impl Iterator<Item = &'a Self>) -> Option<Self> {
        let first = iter.next()?;

        let mut min = first.min();
        let mut max = first.max();

        for other in iter {
            if other.min() < min {
                min = other.min();
            }
            if other.max() > max {
                max = other.max();
            }
        }

        Some(Self((min.clone(), max.clone())))
    }
}
