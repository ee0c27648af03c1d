//! Wall-clock timer for one evaluation.

use std::time::{Duration, Instant};

/// Measures time elapsed since a fixed origin.
///
/// The origin never moves: `elapsed()` can be called any number of times and
/// always measures from the same instant.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    origin: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Start from an instant captured earlier, e.g. when the request arrived.
    pub fn starting_at(origin: Instant) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    pub fn elapsed_duration(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Seconds since the origin.
    pub fn elapsed(&self) -> f64 {
        self.elapsed_duration().as_secs_f64()
    }

    pub fn is_slow(&self, threshold_seconds: f64) -> bool {
        self.elapsed() > threshold_seconds
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
