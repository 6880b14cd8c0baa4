//! Trailing-edge debouncing for bursts of zoom requests
//!
//! Every call to [`Debouncer::settle`] waits for the quiet period and then
//! reports whether it was the last trigger in the burst. Only the winner
//! should go on to do the expensive work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    generation: AtomicU64,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self { quiet, generation: AtomicU64::new(0) }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Wait out the quiet period
    ///
    /// Returns `true` if no other trigger arrived in the meantime.
    pub async fn settle(&self) -> bool {
        let ticket = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        if !self.quiet.is_zero() {
            tokio::time::sleep(self.quiet).await;
        }

        self.generation.load(Ordering::Acquire) == ticket
    }

    /// Make every pending `settle` lose
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(80))
    }
}
