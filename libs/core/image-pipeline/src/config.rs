//! Pipeline configuration
//!
//! Queue names, retry policy and consumer settings, loadable from the
//! environment through [`FromEnv`].

use crate::retry::RetryRouter;
use core_config::{env_or_default, env_parse_or, ConfigError, FromEnv};
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_MAIN_QUEUE: &str = "image_processing";
pub const DEFAULT_RETRY_QUEUE: &str = "image_processing_retry";
pub const DEFAULT_DEAD_LETTER_QUEUE: &str = "image_processing_dlx";
pub const DEFAULT_RETRY_DELAY_MS: u64 = 10_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Names of the three durable queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    /// Receives fresh and retried work items
    pub main_queue: String,

    /// Holds failed items for the retry delay, then routes them back to main
    pub retry_queue: String,

    /// Terminal destination for exhausted or malformed items
    pub dead_letter_queue: String,
}

impl QueueTopology {
    pub fn new(
        main_queue: impl Into<String>,
        retry_queue: impl Into<String>,
        dead_letter_queue: impl Into<String>,
    ) -> Self {
        Self {
            main_queue: main_queue.into(),
            retry_queue: retry_queue.into(),
            dead_letter_queue: dead_letter_queue.into(),
        }
    }
}

impl Default for QueueTopology {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAIN_QUEUE,
            DEFAULT_RETRY_QUEUE,
            DEFAULT_DEAD_LETTER_QUEUE,
        )
    }
}

/// Configuration for the image pipeline consumer
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub topology: QueueTopology,

    /// How long a failed item waits in the retry queue
    pub retry_delay: Duration,

    /// Retry cycles allowed before an item is dead-lettered
    pub max_attempts: u32,

    /// Unacknowledged deliveries the broker may push to one consumer
    pub prefetch: u16,

    /// Independent consumer tasks sharing the main queue
    pub concurrency: usize,

    /// Consumer tag prefix (auto-generated if not provided)
    pub consumer_tag: String,
}

impl PipelineConfig {
    pub fn new(topology: QueueTopology) -> Self {
        Self {
            topology,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            prefetch: 1,
            concurrency: 1,
            consumer_tag: format!("image-worker-{}", Uuid::new_v4()),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    /// Retry router matching this configuration
    pub fn retry_router(&self) -> RetryRouter {
        RetryRouter::new(self.max_attempts, self.retry_delay)
    }

    /// Consumer tag for the n-th consumer task
    pub fn consumer_tag_for(&self, index: usize) -> String {
        format!("{}-{}", self.consumer_tag, index)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(QueueTopology::default())
    }
}

impl FromEnv for PipelineConfig {
    /// Environment variables (all optional):
    /// - `IMAGE_QUEUE`, `IMAGE_RETRY_QUEUE`, `IMAGE_DEAD_LETTER_QUEUE`
    /// - `IMAGE_RETRY_DELAY_MS` (default 10000)
    /// - `IMAGE_MAX_ATTEMPTS` (default 3)
    /// - `WORKER_PREFETCH` (default 1), `WORKER_CONCURRENCY` (default 1)
    fn from_env() -> Result<Self, ConfigError> {
        let topology = QueueTopology::new(
            env_or_default("IMAGE_QUEUE", DEFAULT_MAIN_QUEUE),
            env_or_default("IMAGE_RETRY_QUEUE", DEFAULT_RETRY_QUEUE),
            env_or_default("IMAGE_DEAD_LETTER_QUEUE", DEFAULT_DEAD_LETTER_QUEUE),
        );

        let retry_delay_ms = env_parse_or("IMAGE_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?;
        if retry_delay_ms > u64::from(u32::MAX) {
            return Err(ConfigError::ParseError {
                key: "IMAGE_RETRY_DELAY_MS".to_string(),
                details: "retry delay does not fit a 32-bit message TTL".to_string(),
            });
        }

        Ok(Self::new(topology)
            .with_retry_delay(Duration::from_millis(retry_delay_ms))
            .with_max_attempts(env_parse_or("IMAGE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?)
            .with_prefetch(env_parse_or("WORKER_PREFETCH", 1u16)?)
            .with_concurrency(env_parse_or("WORKER_CONCURRENCY", 1usize)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 7] = [
        "IMAGE_QUEUE",
        "IMAGE_RETRY_QUEUE",
        "IMAGE_DEAD_LETTER_QUEUE",
        "IMAGE_RETRY_DELAY_MS",
        "IMAGE_MAX_ATTEMPTS",
        "WORKER_PREFETCH",
        "WORKER_CONCURRENCY",
    ];

    #[test]
    fn test_defaults_from_env() {
        temp_env::with_vars(VARS.map(|k| (k, None::<&str>)), || {
            let config = PipelineConfig::from_env().unwrap();
            assert_eq!(config.topology, QueueTopology::default());
            assert_eq!(config.retry_delay, Duration::from_secs(10));
            assert_eq!(config.max_attempts, 3);
            assert_eq!(config.prefetch, 1);
            assert_eq!(config.concurrency, 1);
            assert!(config.consumer_tag.starts_with("image-worker-"));
        });
    }

    #[test]
    fn test_overrides_from_env() {
        temp_env::with_vars(
            [
                ("IMAGE_QUEUE", Some("thumbs")),
                ("IMAGE_RETRY_QUEUE", Some("thumbs_retry")),
                ("IMAGE_DEAD_LETTER_QUEUE", Some("thumbs_dead")),
                ("IMAGE_RETRY_DELAY_MS", Some("250")),
                ("IMAGE_MAX_ATTEMPTS", Some("5")),
                ("WORKER_PREFETCH", Some("4")),
                ("WORKER_CONCURRENCY", Some("0")),
            ],
            || {
                let config = PipelineConfig::from_env().unwrap();
                assert_eq!(config.topology.main_queue, "thumbs");
                assert_eq!(config.topology.retry_queue, "thumbs_retry");
                assert_eq!(config.topology.dead_letter_queue, "thumbs_dead");
                assert_eq!(config.retry_delay, Duration::from_millis(250));
                assert_eq!(config.max_attempts, 5);
                assert_eq!(config.prefetch, 4);
                // Clamped to at least one consumer
                assert_eq!(config.concurrency, 1);
            },
        );
    }

    #[test]
    fn test_invalid_max_attempts() {
        temp_env::with_var("IMAGE_MAX_ATTEMPTS", Some("many"), || {
            let err = PipelineConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("IMAGE_MAX_ATTEMPTS"));
        });
    }

    #[test]
    fn test_retry_delay_must_fit_ttl() {
        temp_env::with_var("IMAGE_RETRY_DELAY_MS", Some("5000000000"), || {
            let err = PipelineConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("IMAGE_RETRY_DELAY_MS"));
        });
    }

    #[test]
    fn test_builder_pattern() {
        let config = PipelineConfig::default()
            .with_consumer_tag("worker-a")
            .with_max_attempts(1)
            .with_retry_delay(Duration::from_secs(1));

        assert_eq!(config.consumer_tag_for(2), "worker-a-2");
        let router = config.retry_router();
        assert_eq!(router.max_attempts(), 1);
        assert_eq!(router.retry_delay(), Duration::from_secs(1));
    }
}
