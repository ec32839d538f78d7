// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::CompressionType;

/// Compression policy
///
/// Maps each output level of a compaction to a compression type.
/// Levels past the end of the policy use the last entry.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompressionPolicy(Vec<CompressionType>);

impl std::ops::Deref for CompressionPolicy {
    type Target = [CompressionType];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

impl CompressionPolicy {
    /// Returns the compression type for output files in the given level.
    #[must_use]
    pub fn get(&self, level: usize) -> CompressionType {
        self.0
            .get(level)
            .or_else(|| self.0.last())
            .copied()
            .unwrap_or(CompressionType::None)
    }

    /// Disables all compression.
    #[must_use]
    pub fn disabled() -> Self {
        Self::all(CompressionType::None)
    }

    /// Uses the same compression in every level.
    #[must_use]
    pub fn all(c: CompressionType) -> Self {
        Self(vec![c])
    }

    /// Constructs a custom compression policy.
    ///
    /// # Panics
    ///
    /// Panics if the policy is empty or contains more than 255 elements.
    #[must_use]
    pub fn new(policy: impl Into<Vec<CompressionType>>) -> Self {
        let policy = policy.into();
        assert!(!policy.is_empty(), "compression policy may not be empty");
        assert!(policy.len() <= 255, "compression policy is too large");
        Self(policy)
    }
}
