// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::{
    atomic::{AtomicBool, Ordering::Relaxed},
    Arc,
};

/// Cancels running compactions, e.g. on shutdown
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Asks all jobs sharing this signal to stop.
    pub fn send(&self) {
        self.0.store(true, Relaxed);
    }

    /// Returns `true` if the stop signal was sent.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Relaxed)
    }
}
