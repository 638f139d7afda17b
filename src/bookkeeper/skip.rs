//! Batching of durable commits for skipped offsets

use parking_lot::Mutex;

/// Skipped offsets between two durable commits
pub const COMMIT_AFTER_NUM_SKIPPED: u32 = 10;

/// Counts consecutive skips and tells when one must be committed
///
/// After a crash up to `COMMIT_AFTER_NUM_SKIPPED - 1` skipped offsets are
/// delivered again.
#[derive(Debug, Default)]
pub struct SkipCounter {
    skipped: Mutex<u32>,
}

impl SkipCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True on every call that exceeds the threshold, which resets the count to 1
    pub fn should_commit(&self) -> bool {
        let mut skipped = self.skipped.lock();
        *skipped += 1;
        if *skipped > COMMIT_AFTER_NUM_SKIPPED {
            *skipped = 1;
            true
        } else {
            false
        }
    }
}
