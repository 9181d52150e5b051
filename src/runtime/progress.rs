use std::sync::atomic::{AtomicU64, Ordering};

const UNINITIALIZED: u64 = u64::MAX;

/// Tracks the number of the last block a stream's consumer received.
#[derive(Debug)]
pub struct ProgressTracker {
    last_delivered: AtomicU64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            last_delivered: AtomicU64::new(UNINITIALIZED),
        }
    }

    pub fn mark_delivered(&self, block_num: u64) {
        self.last_delivered.store(block_num, Ordering::SeqCst);
    }

    /// Returns `None` until the first block is delivered.
    pub fn last_delivered(&self) -> Option<u64> {
        match self.last_delivered.load(Ordering::SeqCst) {
            UNINITIALIZED => None,
            value => Some(value),
        }
    }

    /// The block a restarted stream should begin at to continue without gaps.
    pub fn resume_from(&self) -> Option<u64> {
        self.last_delivered().map(|block_num| block_num.saturating_add(1))
    }
}
