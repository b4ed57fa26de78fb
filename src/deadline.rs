use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

/// Single timer armed at session start. Once a verdict exists nobody polls
/// it again, so it needs no cancellation of its own.
pub struct DeadlineGuard {
    sleep: Pin<Box<Sleep>>,
}

impl DeadlineGuard {
    pub fn arm(timeout: Duration) -> Self {
        Self {
            sleep: Box::pin(sleep_until(Instant::now() + timeout)),
        }
    }

    /// Resolves when the deadline passes. Safe to use as a `select!` branch
    /// repeatedly: the timer keeps its place between polls.
    pub async fn fired(&mut self) {
        self.sleep.as_mut().await
    }
}
