//! Reactor clock.

use std::time::{Duration, Instant};

/// Monotonic clock owned by the reactor.
///
/// Readings go through tokio's time source, so they follow the runtime's
/// clock rather than the wall clock.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    started: Instant,
}

impl Clock {
    /// Creates a clock starting now.
    pub fn new() -> Self {
        Self {
            started: tokio::time::Instant::now().into_std(),
        }
    }

    /// Returns the current instant.
    pub fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    /// Returns the time elapsed since the clock was created.
    pub fn uptime(&self) -> Duration {
        self.now().saturating_duration_since(self.started)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
