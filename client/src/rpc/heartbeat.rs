//! Ping/pong watchdog for the signaling connection.

use std::time::{Duration, Instant};

/// Tracks the last ping seen from the server and answers whether the
/// connection has gone quiet for longer than `ping_timeout` allows.
pub struct Heartbeat {
    ping_timeout: Duration,
    last_ping: Instant,
}

impl Heartbeat {
    #[must_use]
    pub fn new(ping_timeout: Duration) -> Self {
        Self {
            ping_timeout,
            last_ping: Instant::now(),
        }
    }

    pub fn record_ping(&mut self) {
        self.last_ping = Instant::now();
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.last_ping.elapsed() >= self.ping_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_heartbeat_is_not_stale() {
        let hb = Heartbeat::new(Duration::from_secs(60));
        assert!(!hb.is_stale());
    }

    #[test]
    fn zero_timeout_is_immediately_stale() {
        let hb = Heartbeat::new(Duration::from_secs(0));
        assert!(hb.is_stale());
    }
}
