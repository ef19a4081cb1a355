//! Interval reports, per-direction summaries and the run result.

use std::collections::HashMap;
use std::fmt;

use tokio::time::Duration;

use crate::errors::{ErrorCategory, RunError};
use crate::percentiles::PercentileStats;
use crate::provider::Direction;

/// Outcome of one accounting window.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalReport {
    pub direction: Direction,

    /// Dispatches in the window, failed ones included
    pub count: u32,

    pub failures: u32,

    /// Configured rate
    pub target: u32,

    /// Measured window length
    pub window: Duration,

    pub capacity_units: f64,

    /// True for the trailing window closed by duration expiry or cancellation
    pub final_window: bool,
}

impl fmt::Display for IntervalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Completed {} {} in {:.2} seconds. Target is {}.",
            self.count,
            self.direction.noun(),
            self.window.as_secs_f64(),
            self.target
        )
    }
}

/// Everything one pacer observed over its run.
#[derive(Debug, Clone)]
pub struct PacerSummary {
    pub direction: Direction,
    pub target: u32,
    pub windows: Vec<IntervalReport>,
    pub dispatched: u64,
    pub failures: u64,
    pub failures_by_category: HashMap<ErrorCategory, u64>,
    pub capacity_units: f64,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub latency: Option<PercentileStats>,
}

impl PacerSummary {
    pub fn window_counts(&self) -> Vec<u32> {
        self.windows.iter().map(|w| w.count).collect()
    }

    pub fn achieved_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.dispatched as f64 / secs
        } else {
            0.0
        }
    }

    /// Format as a table row.
    pub fn format_table_row(&self) -> String {
        format!(
            "{:<8} {:>8} {:>10} {:>10.2} {:>10} {:>12.1}",
            self.direction.label(),
            self.target,
            self.dispatched,
            self.achieved_rate(),
            self.failures,
            self.capacity_units
        )
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub success: bool,
    pub error: Option<RunError>,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub directions: Vec<PacerSummary>,
}

impl RunResult {
    pub fn failed(error: impl Into<RunError>, elapsed: Duration) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            elapsed,
            cancelled: false,
            directions: Vec::new(),
        }
    }

    /// Cancelled before any pacer started.
    pub fn cancelled(elapsed: Duration) -> Self {
        Self {
            success: false,
            error: None,
            elapsed,
            cancelled: true,
            directions: Vec::new(),
        }
    }

    pub fn direction(&self, direction: Direction) -> Option<&PacerSummary> {
        self.directions.iter().find(|s| s.direction == direction)
    }
}

/// Format the per-direction summaries plus their window history as a table.
pub fn format_summary_table(result: &RunResult) -> String {
    let mut output = String::new();
    let status = match (&result.error, result.cancelled) {
        (Some(e), _) => format!("FAILED: {}", e),
        (None, true) => "CANCELLED".to_string(),
        (None, false) => "OK".to_string(),
    };
    output.push_str(&format!(
        "\nRun {} after {:.1}s\n",
        status,
        result.elapsed.as_secs_f64()
    ));

    if result.directions.is_empty() {
        return output;
    }

    output.push_str(&format!(
        "\n{:<8} {:>8} {:>10} {:>10} {:>10} {:>12}\n",
        "Type", "Target", "Ops", "Ops/s", "Failed", "Units"
    ));
    output.push_str(&"-".repeat(63));
    output.push('\n');

    for summary in &result.directions {
        output.push_str(&summary.format_table_row());
        output.push('\n');
    }

    for summary in &result.directions {
        let counts: Vec<String> = summary.window_counts().iter().map(|c| c.to_string()).collect();
        output.push_str(&format!(
            "\n{} windows (target {}): [{}]\n",
            summary.direction.noun(),
            summary.target,
            counts.join(", ")
        ));
        if let Some(latency) = &summary.latency {
            output.push_str(&format!("{} latency: {}\n", summary.direction.noun(), latency.format()));
        }
        for category in ErrorCategory::all() {
            if let Some(count) = summary.failures_by_category.get(&category) {
                output.push_str(&format!("  {}: {}\n", category, count));
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigurationError;

    fn summary(direction: Direction, counts: &[u32]) -> PacerSummary {
        let windows = counts
            .iter()
            .map(|&count| IntervalReport {
                direction,
                count,
                failures: 0,
                target: 5,
                window: Duration::from_secs(1),
                capacity_units: count as f64,
                final_window: false,
            })
            .collect();
        PacerSummary {
            direction,
            target: 5,
            windows,
            dispatched: counts.iter().map(|&c| c as u64).sum(),
            failures: 0,
            failures_by_category: HashMap::new(),
            capacity_units: 0.0,
            elapsed: Duration::from_secs(counts.len() as u64),
            cancelled: false,
            latency: None,
        }
    }

    #[test]
    fn test_interval_report_display() {
        let report = IntervalReport {
            direction: Direction::Write,
            count: 5,
            failures: 1,
            target: 5,
            window: Duration::from_secs(1),
            capacity_units: 4.0,
            final_window: false,
        };
        assert_eq!(
            report.to_string(),
            "Completed 5 writes in 1.00 seconds. Target is 5."
        );
    }

    #[test]
    fn test_achieved_rate() {
        let s = summary(Direction::Read, &[5, 5, 5]);
        assert_eq!(s.dispatched, 15);
        assert!((s.achieved_rate() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_table_lists_windows() {
        let result = RunResult {
            success: true,
            error: None,
            elapsed: Duration::from_secs(3),
            cancelled: false,
            directions: vec![
                summary(Direction::Read, &[5, 5, 5]),
                summary(Direction::Write, &[4, 5]),
            ],
        };

        let table = format_summary_table(&result);
        assert!(table.contains("Run OK"));
        assert!(table.contains("reads windows (target 5): [5, 5, 5]"));
        assert!(table.contains("writes windows (target 5): [4, 5]"));
        assert!(result.direction(Direction::Write).is_some());
    }

    #[test]
    fn test_table_breaks_failures_down_by_category() {
        let mut reads = summary(Direction::Read, &[5, 5]);
        reads.failures = 3;
        reads.failures_by_category.insert(ErrorCategory::Throttling, 2);
        reads.failures_by_category.insert(ErrorCategory::Network, 1);
        let result = RunResult {
            success: true,
            error: None,
            elapsed: Duration::from_secs(2),
            cancelled: false,
            directions: vec![reads],
        };

        let table = format_summary_table(&result);
        let throttled = table.find("  Throughput Exceeded / Throttled: 2").unwrap();
        let network = table.find("  Network/Connection Errors: 1").unwrap();
        assert!(throttled < network);
        assert!(!table.contains("Timeout"));
    }

    #[test]
    fn test_failed_result_table() {
        let result = RunResult::failed(ConfigurationError::NoDirection, Duration::ZERO);
        assert!(!result.success);
        let table = format_summary_table(&result);
        assert!(table.contains("FAILED"));
        assert!(!table.contains("Type"));
    }
}
