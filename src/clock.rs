//! Time source for window and duration arithmetic.
//!
//! Backed by `tokio::time` so a paused tokio runtime can drive the pacers
//! deterministically.

use tokio::time::{self, Instant, Sleep};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Sleeps until `deadline` on this clock.
    fn sleep_until(&self, deadline: Instant) -> Sleep {
        time::sleep_until(deadline)
    }
}

/// The tokio runtime clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
