//! One-second accounting windows.
//!
//! A window opens with a budget of `rate` dispatches. The window rolls over
//! once a full second has passed since it opened, never earlier, so a slow
//! or uneven window is reported exactly once and the next one opens right
//! away.

use std::str::FromStr;

use tokio::time::{Duration, Instant};

/// Length of one accounting window.
pub const WINDOW: Duration = Duration::from_secs(1);

/// Default bounded idle sleep between loop evaluations.
pub const DEFAULT_IDLE_TICK: Duration = Duration::from_millis(100);

/// How dispatches are spread inside a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacingMode {
    /// Up to `rate` calls back to back as soon as the window opens.
    #[default]
    Burst,

    /// Slot `k` of a window opens at `window_start + k / rate`.
    Smooth,
}

impl FromStr for PacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "burst" => Ok(PacingMode::Burst),
            "smooth" => Ok(PacingMode::Smooth),
            other => Err(format!(
                "Unknown pacing mode: '{}'. Use 'burst' or 'smooth'.",
                other
            )),
        }
    }
}

/// What the pacer loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    Dispatch,
    Rollover,
    /// Nothing to do before the given instant.
    Idle(Instant),
}

/// Per-pacer window state. Owned and mutated only by its pacer's loop.
#[derive(Debug, Clone)]
pub struct IntervalWindow {
    pub count: u32,
    pub failures: u32,
    pub capacity_units: f64,
    pub window_start: Instant,
    pub last_operation_time: Instant,
}

impl IntervalWindow {
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            failures: 0,
            capacity_units: 0.0,
            window_start: now,
            last_operation_time: now,
        }
    }

    pub fn since_window_start(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.window_start)
    }

    pub fn since_last_operation(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_operation_time)
    }

    pub fn window_end(&self) -> Instant {
        self.window_start + WINDOW
    }

    fn slot_opens_at(&self, rate: u32) -> Instant {
        self.window_start + WINDOW.mul_f64(self.count as f64 / rate as f64)
    }

    pub fn decide(&self, now: Instant, rate: u32, pacing: PacingMode, idle_tick: Duration) -> WindowAction {
        if self.since_window_start(now) >= WINDOW {
            return WindowAction::Rollover;
        }

        let window_end = self.window_end();
        let mut wake = now
            .checked_add(idle_tick)
            .map_or(window_end, |tick| tick.min(window_end));

        if self.count < rate {
            match pacing {
                PacingMode::Burst => return WindowAction::Dispatch,
                PacingMode::Smooth => {
                    let slot = self.slot_opens_at(rate);
                    if now >= slot {
                        return WindowAction::Dispatch;
                    }
                    wake = wake.min(slot);
                }
            }
        }

        WindowAction::Idle(wake)
    }

    /// Books one dispatched call, successful or not.
    pub fn record(&mut self, dispatched_at: Instant, outcome_units: Option<f64>) {
        self.count += 1;
        self.last_operation_time = dispatched_at;
        match outcome_units {
            Some(units) => self.capacity_units += units,
            None => self.failures += 1,
        }
    }

    /// Starts a fresh window at `now`.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }
}
