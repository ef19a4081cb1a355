//! Error taxonomy for stress runs.
//!
//! Configuration and launch errors are fatal to their scope and surface
//! synchronously. Operation errors are contained inside the owning pacer and
//! only classified here so they can be logged and counted per category.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::provider::Direction;

/// Invalid run or launch parameters. Always reported before any pacer starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Task does not read or write to the table: enable stress-read and/or stress-write")]
    NoDirection,

    #[error("{direction} capacity must be greater than 0 (got {rate})")]
    NonPositiveRate { direction: Direction, rate: i64 },

    #[error("test duration must be at least 1 second (got {0:?})")]
    InvalidDuration(Duration),

    #[error("Field '{field}' is required but not provided")]
    MissingField { field: String },

    #[error("Field '{field}': {message}")]
    InvalidField { field: String, message: String },
}

/// Categories of operation failures, used as metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Provisioned throughput exceeded or request rate limited
    Throttling,

    /// Client side or service side timeout
    Timeout,

    /// Connection, DNS or dispatch failures
    Network,

    /// Any other error returned by the storage service
    Service,

    /// Anything unclassified
    Other,
}

impl ErrorCategory {
    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Throttling => "throttling_error",
            ErrorCategory::Timeout => "timeout_error",
            ErrorCategory::Network => "network_error",
            ErrorCategory::Service => "service_error",
            ErrorCategory::Other => "other_error",
        }
    }

    /// Get a human-readable description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::Throttling => "Throughput Exceeded / Throttled",
            ErrorCategory::Timeout => "Request Timeout Errors",
            ErrorCategory::Network => "Network/Connection Errors",
            ErrorCategory::Service => "Storage Service Errors",
            ErrorCategory::Other => "Other/Unknown Errors",
        }
    }

    /// Get all error categories in a consistent order.
    pub fn all() -> Vec<ErrorCategory> {
        vec![
            ErrorCategory::Throttling,
            ErrorCategory::Timeout,
            ErrorCategory::Network,
            ErrorCategory::Service,
            ErrorCategory::Other,
        ]
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A single read or write call against the storage service failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("throttled: {0}")]
    Throttled(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("{0}")]
    Other(String),
}

impl OperationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OperationError::Throttled(_) => ErrorCategory::Throttling,
            OperationError::Timeout(_) => ErrorCategory::Timeout,
            OperationError::Network(_) => ErrorCategory::Network,
            OperationError::Service(_) => ErrorCategory::Service,
            OperationError::Other(_) => ErrorCategory::Other,
        }
    }
}

/// Errors that fail a whole run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("operation provider '{provider}' is unreachable: {source}")]
    ProviderUnreachable {
        provider: String,
        source: OperationError,
    },

    #[error("{direction} pacer task failed: {message}")]
    TaskFailed { direction: Direction, message: String },
}

/// The run trigger could not start a remote run.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Error starting task: {0}")]
    Request(String),

    #[error("task launch rejected: {0}")]
    Rejected(String),
}
