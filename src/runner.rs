//! Run orchestration: validate the requested directions, start one pacer per
//! direction, and wait for all of them.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{error, info};

use crate::cancel::CancelSignal;
use crate::errors::{ConfigurationError, RunError};
use crate::pacer::{Pacer, PacerConfig};
use crate::provider::{Direction, OperationProvider};
use crate::report::{PacerSummary, RunResult};
use crate::window::{PacingMode, DEFAULT_IDLE_TICK};

/// Immutable parameters for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub stress_read: bool,
    pub stress_write: bool,
    pub read_capacity: i64,
    pub write_capacity: i64,
    pub duration: Duration,
    /// Hash key attribute name of the target table
    pub key: String,
    pub pacing: PacingMode,
    pub idle_tick: Duration,
}

impl RunConfig {
    pub fn new(key: impl Into<String>, duration: Duration) -> Self {
        Self {
            stress_read: false,
            stress_write: false,
            read_capacity: 0,
            write_capacity: 0,
            duration,
            key: key.into(),
            pacing: PacingMode::default(),
            idle_tick: DEFAULT_IDLE_TICK,
        }
    }

    pub fn with_read(mut self, rcu: i64) -> Self {
        self.stress_read = true;
        self.read_capacity = rcu;
        self
    }

    pub fn with_write(mut self, wcu: i64) -> Self {
        self.stress_write = true;
        self.write_capacity = wcu;
        self
    }

    /// One pacer configuration per requested direction, read first.
    pub fn validate(&self) -> Result<Vec<PacerConfig>, ConfigurationError> {
        if !self.stress_read && !self.stress_write {
            return Err(ConfigurationError::NoDirection);
        }
        if self.duration < Duration::from_secs(1) {
            return Err(ConfigurationError::InvalidDuration(self.duration));
        }
        if self.key.trim().is_empty() {
            return Err(ConfigurationError::MissingField {
                field: "hash-key".to_string(),
            });
        }

        let requested = [
            (self.stress_read, Direction::Read, self.read_capacity),
            (self.stress_write, Direction::Write, self.write_capacity),
        ];

        let mut pacers = Vec::with_capacity(2);
        for (wanted, direction, rate) in requested {
            if !wanted {
                continue;
            }
            if rate <= 0 {
                return Err(ConfigurationError::NonPositiveRate { direction, rate });
            }
            let rate = u32::try_from(rate).map_err(|_| ConfigurationError::InvalidField {
                field: format!("{}-capacity", direction),
                message: format!("{} exceeds the maximum of {}", rate, u32::MAX),
            })?;

            let mut pacer = PacerConfig::new(direction, rate, self.duration, self.key.clone())
                .with_pacing(self.pacing);
            pacer.idle_tick = self.idle_tick;
            pacers.push(pacer);
        }
        Ok(pacers)
    }
}

/// Owns the pacers of one run.
pub struct Runner {
    pacers: Vec<PacerConfig>,
    provider: Arc<dyn OperationProvider>,
}

impl Runner {
    pub fn new(
        config: &RunConfig,
        provider: Arc<dyn OperationProvider>,
    ) -> Result<Self, ConfigurationError> {
        let pacers = config.validate()?;
        Ok(Self { pacers, provider })
    }

    pub fn directions(&self) -> Vec<Direction> {
        self.pacers.iter().map(|p| p.direction).collect()
    }

    /// Runs every pacer concurrently and waits for all of them.
    pub async fn run(self, mut cancel: CancelSignal) -> RunResult {
        let start = Instant::now();

        let preflight = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.provider.preflight() => Some(result),
        };
        let Some(preflight) = preflight else {
            info!(provider = self.provider.name(), "Cancelled during provider preflight");
            return RunResult::cancelled(start.elapsed());
        };

        if let Err(source) = preflight {
            error!(provider = self.provider.name(), error = %source, "Provider preflight failed");
            return RunResult::failed(
                RunError::ProviderUnreachable {
                    provider: self.provider.name().to_string(),
                    source,
                },
                start.elapsed(),
            );
        }

        info!(
            provider = self.provider.name(),
            directions = ?self.directions(),
            "Starting pacers"
        );

        let handles: Vec<(Direction, JoinHandle<PacerSummary>)> = self
            .pacers
            .into_iter()
            .map(|config| {
                let direction = config.direction;
                let provider = self.provider.clone();
                let cancel = cancel.clone();
                let handle = tokio::spawn(async move {
                    Pacer::new(config).run(provider, cancel).await
                });
                (direction, handle)
            })
            .collect();

        let mut directions = Vec::with_capacity(handles.len());
        let mut failure = None;
        for (direction, handle) in handles {
            match handle.await {
                Ok(summary) => directions.push(summary),
                Err(e) => {
                    error!(direction = %direction, error = %e, "Pacer task failed");
                    if failure.is_none() {
                        failure = Some(RunError::TaskFailed {
                            direction,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        let cancelled = cancel.is_cancelled() || directions.iter().any(|s| s.cancelled);
        let elapsed = start.elapsed();
        info!(
            elapsed_secs = elapsed.as_secs_f64(),
            cancelled = cancelled,
            "All pacers finished"
        );

        RunResult {
            success: failure.is_none() && !cancelled,
            error: failure,
            elapsed,
            cancelled,
            directions,
        }
    }
}

/// Validates `config` and runs it; configuration errors become a failed
/// result without starting any pacer.
pub async fn run(
    config: &RunConfig,
    provider: Arc<dyn OperationProvider>,
    cancel: CancelSignal,
) -> RunResult {
    match Runner::new(config, provider) {
        Ok(runner) => runner.run(cancel).await,
        Err(e) => {
            error!(error = %e, "Invalid run configuration");
            RunResult::failed(e, Duration::ZERO)
        }
    }
}
