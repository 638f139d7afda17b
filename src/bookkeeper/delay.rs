//! Interruptible retry delays

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Delay between two attempts to send the stored status
pub const RETRY_SEND_DELAY: Duration = Duration::from_millis(1000);

/// Outcome of a retry delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Interrupted,
}

/// Shared interrupt flag that wakes every waiting thread
///
/// Once triggered the flag stays set, so later waits return immediately
/// and loops can check [`Interrupt::is_triggered`] to stop.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock() = true;
        condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block for `delay` unless interrupted first
    pub fn wait(&self, delay: Duration) -> WaitOutcome {
        let (flag, condvar) = &*self.inner;
        let deadline = Instant::now() + delay;
        let mut triggered = flag.lock();
        while !*triggered {
            if condvar.wait_until(&mut triggered, deadline).timed_out() {
                return if *triggered {
                    WaitOutcome::Interrupted
                } else {
                    WaitOutcome::Elapsed
                };
            }
        }
        WaitOutcome::Interrupted
    }
}
