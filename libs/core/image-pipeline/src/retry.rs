//! Retry routing for failed work items
//!
//! The router decides where a failed delivery goes next. The broker enforces
//! the delay: the retry queue is declared with a message TTL equal to
//! [`RetryRouter::retry_delay`] and dead-letters expired messages back to the
//! main queue.

use crate::envelope::WorkItem;
use crate::error::{ErrorCategory, ProcessingError};
use std::time::Duration;

/// Destination of a failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Republish to the retry queue with an incremented attempt count
    Retry,
    /// Give up; the delivery goes to the dead-letter queue
    DeadLetter,
}

/// Bounded retry policy with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRouter {
    max_attempts: u32,
    retry_delay: Duration,
}

impl RetryRouter {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }

    /// Decide the route for an item that failed after `attempt` prior attempts.
    ///
    /// Permanent failures are dead-lettered at once. Transient failures are
    /// retried while `attempt < max_attempts`.
    pub fn route(&self, attempt: u32, failure: &ProcessingError) -> Route {
        if failure.category() == ErrorCategory::Permanent {
            return Route::DeadLetter;
        }

        if attempt < self.max_attempts {
            Route::Retry
        } else {
            Route::DeadLetter
        }
    }

    /// The item to republish on the retry queue.
    pub fn next_attempt(&self, item: &WorkItem) -> WorkItem {
        WorkItem {
            attempt: item.attempt.saturating_add(1),
            ..item.clone()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Retry delay as an AMQP `x-message-ttl` value, saturating at `u32::MAX`
    pub fn retry_ttl_ms(&self) -> u32 {
        u32::try_from(self.retry_delay.as_millis()).unwrap_or(u32::MAX)
    }
}

impl Default for RetryRouter {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(crate::config::DEFAULT_RETRY_DELAY_MS),
        )
    }
}
