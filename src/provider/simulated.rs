//! In-process provider with simulated latency and failure injection.
//!
//! Used by `--dry-run` and by the tests. Calls are numbered per direction
//! starting at 1, so "fail the 3rd write" is `fail_writes_on([3])`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::time::Duration;
use tracing::debug;

use super::{Direction, OperationProvider};
use crate::errors::OperationError;

#[derive(Debug, Default)]
pub struct SimulatedProvider {
    latency: Duration,
    preflight_latency: Duration,
    cost: f64,
    fail_every: Option<u64>,
    failing_reads: HashSet<u64>,
    failing_writes: HashSet<u64>,
    unreachable: bool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl SimulatedProvider {
    /// Instant, always-successful provider costing one unit per call.
    pub fn new() -> Self {
        Self {
            cost: 1.0,
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay `preflight` by `latency`, as a slow or stalled endpoint would.
    pub fn with_preflight_latency(mut self, latency: Duration) -> Self {
        self.preflight_latency = latency;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Fail every `n`th call in either direction.
    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    pub fn fail_reads_on(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.failing_reads.extend(calls);
        self
    }

    pub fn fail_writes_on(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.failing_writes.extend(calls);
        self
    }

    /// Make `preflight` fail, as if the service could not be reached.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn read_calls(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn write_calls(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    async fn call(&self, direction: Direction, key: &str) -> Result<f64, OperationError> {
        let (counter, failing) = match direction {
            Direction::Read => (&self.reads, &self.failing_reads),
            Direction::Write => (&self.writes, &self.failing_writes),
        };
        let call = counter.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let injected = failing.contains(&call) || self.fail_every.is_some_and(|n| call % n == 0);
        if injected {
            return Err(OperationError::Service(format!(
                "injected failure on {} #{} for key '{}'",
                direction, call, key
            )));
        }

        debug!(direction = %direction, key = key, call = call, "Simulated operation");
        Ok(self.cost)
    }
}

#[async_trait]
impl OperationProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn read(&self, key: &str) -> Result<f64, OperationError> {
        self.call(Direction::Read, key).await
    }

    async fn write(&self, key: &str) -> Result<f64, OperationError> {
        self.call(Direction::Write, key).await
    }

    async fn preflight(&self) -> Result<(), OperationError> {
        if !self.preflight_latency.is_zero() {
            tokio::time::sleep(self.preflight_latency).await;
        }
        if self.unreachable {
            return Err(OperationError::Network("simulated endpoint unreachable".into()));
        }
        Ok(())
    }
}
