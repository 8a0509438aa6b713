//! Reconnect delay policy.
//!
//! The specification calls for a fixed `RECONNECT_DELAY` between attempts
//! rather than a growing one, so this wraps [`backoff::backoff::Constant`]
//! instead of hand-rolling a delay loop.

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};

pub struct ReconnectDelayer(Constant);

impl ReconnectDelayer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self(Constant::new(delay))
    }

    /// Waits out the configured delay before the caller retries connecting.
    pub async fn wait(&mut self) {
        if let Some(delay) = self.0.next_backoff() {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn reset(&mut self) {
        self.0.reset();
    }
}
