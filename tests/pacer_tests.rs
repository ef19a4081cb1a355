//! Integration tests for the per-direction pacing loop.
//!
//! All tests run on a paused tokio clock, so window boundaries land exactly
//! and the assertions on counts are deterministic.

use std::sync::Arc;
use std::time::Duration;

use ddb_stress::cancel::{self, CancelSignal};
use ddb_stress::errors::ErrorCategory;
use ddb_stress::pacer::{Pacer, PacerConfig};
use ddb_stress::provider::{Direction, SimulatedProvider};
use ddb_stress::window::PacingMode;
use tokio::time::Instant;

fn pacer(direction: Direction, rate: u32, secs: u64) -> Pacer {
    Pacer::new(PacerConfig::new(
        direction,
        rate,
        Duration::from_secs(secs),
        "MyKey",
    ))
}

#[tokio::test(start_paused = true)]
async fn test_three_second_run_reports_three_full_windows() {
    let provider = Arc::new(SimulatedProvider::new());
    let summary = pacer(Direction::Read, 5, 3)
        .run(provider.clone(), CancelSignal::never())
        .await;

    assert_eq!(summary.window_counts(), vec![5, 5, 5]);
    assert_eq!(summary.dispatched, 15);
    assert_eq!(provider.read_calls(), 15);
    assert!(summary.windows.iter().all(|w| w.target == 5));
    assert!(summary.windows.last().unwrap().final_window);
    assert!(!summary.cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_still_consumes_its_slot() {
    let provider = Arc::new(SimulatedProvider::new().fail_writes_on([3]));
    let summary = pacer(Direction::Write, 5, 2)
        .run(provider.clone(), CancelSignal::never())
        .await;

    assert_eq!(summary.window_counts(), vec![5, 5]);
    assert_eq!(summary.windows[0].failures, 1);
    assert_eq!(summary.windows[1].failures, 0);
    assert_eq!(summary.failures, 1);
    assert_eq!(
        summary.failures_by_category.get(&ErrorCategory::Service),
        Some(&1)
    );
    assert_eq!(provider.write_calls(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_provider_runs_to_duration() {
    let provider = Arc::new(SimulatedProvider::new().fail_every(1));
    let start = Instant::now();
    let summary = pacer(Direction::Read, 4, 3)
        .run(provider.clone(), CancelSignal::never())
        .await;

    assert_eq!(summary.dispatched, 12);
    assert_eq!(summary.failures, 12);
    assert_eq!(summary.capacity_units, 0.0);
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_slow_operations_never_exceed_quota() {
    let latency = Duration::from_millis(150);
    let provider = Arc::new(SimulatedProvider::new().with_latency(latency));
    let start = Instant::now();
    let summary = pacer(Direction::Write, 10, 3)
        .run(provider, CancelSignal::never())
        .await;
    let elapsed = start.elapsed();

    assert!(summary.windows.iter().all(|w| w.count <= 10));
    assert!(summary.window_counts().iter().all(|&c| c > 0));
    assert!(elapsed >= Duration::from_secs(3));
    assert!(
        elapsed <= Duration::from_secs(3) + latency,
        "overran by {:?}",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn test_total_within_one_window_of_target() {
    let provider = Arc::new(SimulatedProvider::new().with_latency(Duration::from_millis(20)));
    let (rate, secs) = (8u32, 5u64);
    let summary = pacer(Direction::Read, rate, secs)
        .run(provider, CancelSignal::never())
        .await;

    let expected = rate as u64 * secs;
    assert!(summary.dispatched <= expected);
    assert!(
        summary.dispatched + rate as u64 >= expected,
        "dispatched {} of {}",
        summary.dispatched,
        expected
    );
}

#[tokio::test(start_paused = true)]
async fn test_smooth_pacing_spreads_calls() {
    let provider = Arc::new(SimulatedProvider::new());
    let config = PacerConfig::new(Direction::Write, 4, Duration::from_secs(2), "MyKey")
        .with_pacing(PacingMode::Smooth);

    let start = Instant::now();
    let summary = Pacer::new(config)
        .run(provider.clone(), CancelSignal::never())
        .await;

    assert_eq!(summary.window_counts(), vec![4, 4]);
    assert_eq!(provider.write_calls(), 8);
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_within_one_idle_tick() {
    let provider = Arc::new(SimulatedProvider::new());
    let (handle, signal) = cancel::channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.cancel();
    });

    let start = Instant::now();
    let summary = pacer(Direction::Read, 5, 60).run(provider, signal).await;
    let elapsed = start.elapsed();

    assert!(summary.cancelled);
    assert!(elapsed >= Duration::from_millis(1500));
    assert!(elapsed <= Duration::from_millis(1600), "stopped after {:?}", elapsed);
    // one full window plus the partial one closed by the cancel
    assert_eq!(summary.window_counts(), vec![5, 5]);
    assert!(summary.windows[1].final_window);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_abandons_in_flight_operation() {
    let provider = Arc::new(SimulatedProvider::new().with_latency(Duration::from_secs(30)));
    let (handle, signal) = cancel::channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.cancel();
    });

    let start = Instant::now();
    let summary = pacer(Direction::Write, 1, 60).run(provider, signal).await;

    assert!(summary.cancelled);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(summary.dispatched, 0);
}
