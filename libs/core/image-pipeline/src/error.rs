//! Pipeline error types and failure categorization
//!
//! Failures are categorized to determine routing:
//! - **Transient**: may succeed later, retried until the attempt limit
//! - **Permanent**: will never succeed, dead-lettered immediately

use core_config::ConfigError;
use thiserror::Error;

/// Category of a failure for determining retry eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure, retried via the retry queue
    Transient,
    /// Unrecoverable failure, dead-lettered without retry
    Permanent,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

/// A message body that cannot be turned into a [`WorkItem`](crate::WorkItem).
///
/// Always terminal: a malformed body will not become decodable by retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed work item: {0}")]
    Malformed(String),

    #[error("work item has an empty payload")]
    EmptyPayload,
}

impl DecodeError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Permanent
    }
}

/// Typed failure returned by a [`Processor`](crate::Processor)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// The transformation itself failed
    #[error("processing failed: {0}")]
    Transient(String),

    /// Persisting the derived artifact failed
    #[error("store error: {0}")]
    Store(String),

    /// The input can never be processed
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ProcessingError {
    pub fn transient(message: impl Into<String>) -> Self {
        ProcessingError::Transient(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        ProcessingError::Store(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        ProcessingError::Permanent(message.into())
    }

    /// Store errors share the transient channel with transformation errors.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProcessingError::Transient(_) | ProcessingError::Store(_) => ErrorCategory::Transient,
            ProcessingError::Permanent(_) => ErrorCategory::Permanent,
        }
    }
}

/// Broker, configuration and infrastructure errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// AMQP connection, channel or protocol error
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Publish was rejected or a broker-side invariant failed
    #[error("Broker error: {0}")]
    Broker(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Metrics recorder could not be installed
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl WorkerError {
    pub fn broker(message: impl Into<String>) -> Self {
        WorkerError::Broker(message.into())
    }
}
