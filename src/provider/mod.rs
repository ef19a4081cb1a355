//! Operation providers: the read/write capability the pacers drive.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::OperationError;

pub mod dynamodb;
pub mod simulated;

pub use dynamodb::DynamoDbProvider;
pub use simulated::SimulatedProvider;

/// An independently paced workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
        }
    }

    /// Plural noun used in interval reports ("Completed 5 reads ...").
    pub fn noun(&self) -> &'static str {
        match self {
            Direction::Read => "reads",
            Direction::Write => "writes",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read/write access to the storage service under test.
///
/// Both operations return the capacity units the call consumed. Both may be
/// invoked concurrently from the read and write pacers, so implementations
/// must be `Send + Sync`.
#[async_trait]
pub trait OperationProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn read(&self, key: &str) -> Result<f64, OperationError>;

    async fn write(&self, key: &str) -> Result<f64, OperationError>;

    /// Checked once before any pacer starts. An error here fails the run.
    async fn preflight(&self) -> Result<(), OperationError> {
        Ok(())
    }
}

/// Dispatches one call in the given direction.
pub async fn invoke(
    provider: &Arc<dyn OperationProvider>,
    direction: Direction,
    key: &str,
) -> Result<f64, OperationError> {
    match direction {
        Direction::Read => provider.read(key).await,
        Direction::Write => provider.write(key).await,
    }
}
