//! The per-direction pacing loop.
//!
//! A pacer dispatches calls in one direction at `rate` calls per one-second
//! window until `duration` has elapsed, reporting each window as it closes.
//! Failed calls are logged and still consume their dispatch slot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::errors::ErrorCategory;
use crate::clock::{Clock, TokioClock};
use crate::metrics::{
    CAPACITY_UNITS_CONSUMED, OPERATIONS_TOTAL, OPERATION_DURATION_SECONDS,
    OPERATION_ERRORS_BY_CATEGORY, TARGET_RATE, WINDOW_OPERATIONS,
};
use crate::percentiles::LatencyRecorder;
use crate::provider::{invoke, Direction, OperationProvider};
use crate::report::{IntervalReport, PacerSummary};
use crate::window::{IntervalWindow, PacingMode, WindowAction, DEFAULT_IDLE_TICK};

/// Configuration for one pacer.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    pub direction: Direction,
    /// Operations per one-second window, at least 1.
    pub rate: u32,
    pub duration: Duration,
    pub key: String,
    pub pacing: PacingMode,
    pub idle_tick: Duration,
}

impl PacerConfig {
    pub fn new(direction: Direction, rate: u32, duration: Duration, key: impl Into<String>) -> Self {
        Self {
            direction,
            rate,
            duration,
            key: key.into(),
            pacing: PacingMode::default(),
            idle_tick: DEFAULT_IDLE_TICK,
        }
    }

    pub fn with_pacing(mut self, pacing: PacingMode) -> Self {
        self.pacing = pacing;
        self
    }
}

/// Stand-in end for durations past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Running totals across all windows of one pacer.
#[derive(Default)]
struct Totals {
    dispatched: u64,
    failures: u64,
    by_category: HashMap<ErrorCategory, u64>,
    capacity_units: f64,
}

pub struct Pacer<C: Clock = TokioClock> {
    config: PacerConfig,
    clock: C,
}

impl Pacer<TokioClock> {
    pub fn new(config: PacerConfig) -> Self {
        Self::with_clock(config, TokioClock)
    }
}

impl<C: Clock> Pacer<C> {
    pub fn with_clock(config: PacerConfig, clock: C) -> Self {
        Self { config, clock }
    }

    /// Runs until the configured duration expires or `cancel` fires.
    pub async fn run(
        &self,
        provider: Arc<dyn OperationProvider>,
        mut cancel: CancelSignal,
    ) -> PacerSummary {
        let config = &self.config;
        let label = config.direction.label();

        let run_start = self.clock.now();
        let run_end = run_start
            .checked_add(config.duration)
            .unwrap_or_else(|| run_start + FAR_FUTURE);
        let mut window = IntervalWindow::new(run_start);
        let mut windows = Vec::new();
        let mut totals = Totals::default();
        let mut latency = LatencyRecorder::new();
        let mut cancelled = false;

        TARGET_RATE.with_label_values(&[label]).set(config.rate as f64);

        info!(
            direction = label,
            key = %config.key,
            rate = config.rate,
            duration_secs = config.duration.as_secs_f64(),
            pacing = ?config.pacing,
            "Pacer starting"
        );

        loop {
            let now = self.clock.now();
            if now >= run_end {
                break;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match window.decide(now, config.rate, config.pacing, config.idle_tick) {
                WindowAction::Dispatch => {
                    OPERATIONS_TOTAL.with_label_values(&[label]).inc();

                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        result = invoke(&provider, config.direction, &config.key) => Some(result),
                    };
                    let Some(result) = outcome else {
                        debug!(direction = label, "In-flight operation abandoned on cancel");
                        cancelled = true;
                        break;
                    };

                    let elapsed = self.clock.now().saturating_duration_since(now);
                    latency.record(elapsed);
                    OPERATION_DURATION_SECONDS
                        .with_label_values(&[label])
                        .observe(elapsed.as_secs_f64());
                    totals.dispatched += 1;

                    match result {
                        Ok(units) => {
                            CAPACITY_UNITS_CONSUMED
                                .with_label_values(&[label])
                                .inc_by(units.max(0.0));
                            totals.capacity_units += units;
                            window.record(now, Some(units));
                        }
                        Err(e) => {
                            let category = e.category();
                            OPERATION_ERRORS_BY_CATEGORY
                                .with_label_values(&[label, category.label()])
                                .inc();
                            warn!(
                                direction = label,
                                key = %config.key,
                                error = %e,
                                error_category = category.label(),
                                "Operation failed"
                            );
                            totals.failures += 1;
                            *totals.by_category.entry(category).or_default() += 1;
                            window.record(now, None);
                        }
                    }
                }
                WindowAction::Rollover => {
                    debug!(
                        direction = label,
                        idle_ms = window.since_last_operation(now).as_millis() as u64,
                        "Window rollover"
                    );
                    windows.push(self.close_window(&window, now, false));
                    window.reset(now);
                }
                WindowAction::Idle(wake) => {
                    let wake = wake.min(run_end);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            cancelled = true;
                            break;
                        }
                        _ = self.clock.sleep_until(wake) => {}
                    }
                }
            }
        }

        let end = self.clock.now();
        if window.count > 0 || window.since_window_start(end) > Duration::ZERO {
            windows.push(self.close_window(&window, end, true));
        }

        let elapsed = end.saturating_duration_since(run_start);
        info!(
            direction = label,
            dispatched = totals.dispatched,
            failures = totals.failures,
            capacity_units = totals.capacity_units,
            elapsed_secs = elapsed.as_secs_f64(),
            cancelled = cancelled,
            "Stress test ended"
        );

        PacerSummary {
            direction: config.direction,
            target: config.rate,
            windows,
            dispatched: totals.dispatched,
            failures: totals.failures,
            failures_by_category: totals.by_category,
            capacity_units: totals.capacity_units,
            elapsed,
            cancelled,
            latency: latency.stats(),
        }
    }

    fn close_window(&self, window: &IntervalWindow, now: Instant, final_window: bool) -> IntervalReport {
        let report = IntervalReport {
            direction: self.config.direction,
            count: window.count,
            failures: window.failures,
            target: self.config.rate,
            window: window.since_window_start(now),
            capacity_units: window.capacity_units,
            final_window,
        };

        WINDOW_OPERATIONS
            .with_label_values(&[self.config.direction.label()])
            .set(report.count as i64);

        info!(
            direction = self.config.direction.label(),
            count = report.count,
            target = report.target,
            failures = report.failures,
            capacity_units = report.capacity_units,
            final_window = final_window,
            "{}",
            report
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedProvider;
    use std::sync::Mutex;
    use tokio::time::{self, Sleep};

    #[tokio::test(start_paused = true)]
    async fn test_single_window_run() {
        let provider = Arc::new(SimulatedProvider::new());
        let pacer = Pacer::new(PacerConfig::new(
            Direction::Write,
            5,
            Duration::from_secs(1),
            "MyKey",
        ));

        let start = Instant::now();
        let summary = pacer.run(provider.clone(), CancelSignal::never()).await;

        assert_eq!(summary.window_counts(), vec![5]);
        assert!(summary.windows[0].final_window);
        assert_eq!(summary.dispatched, 5);
        assert_eq!(provider.write_calls(), 5);
        assert_eq!(provider.read_calls(), 0);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    /// Tokio clock that remembers how long each idle sleep was asked to last.
    #[derive(Default)]
    struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Clock for RecordingClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep_until(&self, deadline: Instant) -> Sleep {
            self.sleeps
                .lock()
                .unwrap()
                .push(deadline.saturating_duration_since(Instant::now()));
            time::sleep_until(deadline)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sleeps_are_bounded_by_idle_tick() {
        let provider = Arc::new(SimulatedProvider::new());
        let mut config = PacerConfig::new(Direction::Read, 1, Duration::from_secs(2), "MyKey");
        config.idle_tick = Duration::from_millis(100);
        let pacer = Pacer::with_clock(config, RecordingClock::default());

        let summary = pacer.run(provider, CancelSignal::never()).await;
        assert_eq!(summary.window_counts(), vec![1, 1]);

        let sleeps = pacer.clock.sleeps.lock().unwrap();
        // two windows of ~1s idled out in 100ms steps
        assert!(sleeps.len() >= 18, "only {} sleeps", sleeps.len());
        assert!(sleeps.iter().all(|d| *d <= Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_duration_runs_until_cancelled() {
        let provider = Arc::new(SimulatedProvider::new());
        let (handle, signal) = crate::cancel::channel();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(1500)).await;
            handle.cancel();
        });

        let pacer = Pacer::new(PacerConfig::new(
            Direction::Read,
            5,
            Duration::from_secs(u64::MAX),
            "MyKey",
        ));
        let summary = pacer.run(provider, signal).await;

        assert!(summary.cancelled);
        assert_eq!(summary.window_counts(), vec![5, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_units_are_summed() {
        let provider = Arc::new(SimulatedProvider::new().with_cost(0.5));
        let pacer = Pacer::new(PacerConfig::new(
            Direction::Read,
            4,
            Duration::from_secs(2),
            "MyKey",
        ));

        let summary = pacer.run(provider, CancelSignal::never()).await;
        assert_eq!(summary.dispatched, 8);
        assert!((summary.capacity_units - 4.0).abs() < 1e-9);
        assert!(summary.windows.iter().all(|w| (w.capacity_units - 2.0).abs() < 1e-9));
        assert!(summary.latency.is_some());
    }
}
