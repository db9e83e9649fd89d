//! Image Pipeline
//!
//! Queue consumer for image work items with bounded, broker-delayed retry
//! and dead-letter routing.
//!
//! ## Features
//!
//! - **Durable topology**: main, retry (TTL) and dead-letter queues
//! - **Bounded retry**: attempt count travels in the envelope
//! - **Exactly-once settlement**: every delivery is acked, retried or
//!   dead-lettered once
//! - **Graceful shutdown**: in-flight deliveries finish before exit
//! - **Prometheus metrics**: per-queue settlement counters
//!
//! ## Example
//!
//! ```ignore
//! use image_pipeline::{amqp, AmqpDeliverySource, AmqpPublisher, Consumer, PipelineConfig};
//!
//! let config = PipelineConfig::from_env()?;
//! let connection = amqp::connect(&amqp_url, "image-worker").await?;
//! amqp::declare(&connection, &config).await?;
//!
//! let publisher = Arc::new(AmqpPublisher::new(&connection, &config).await?);
//! let source = AmqpDeliverySource::subscribe(&connection, &config, &config.consumer_tag_for(0)).await?;
//! let summary = Consumer::new(source, processor, publisher, &config).run(shutdown_rx).await?;
//! ```

pub mod amqp;
mod config;
mod delivery;
mod envelope;
mod error;
pub mod memory;
pub mod metrics;
mod processor;
mod retry;
mod topology;
mod worker;

pub use amqp::{AmqpDeliverySource, AmqpPublisher};
pub use config::{
    PipelineConfig, QueueTopology, DEFAULT_DEAD_LETTER_QUEUE, DEFAULT_MAIN_QUEUE,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS, DEFAULT_RETRY_QUEUE,
};
pub use delivery::{Acker, Delivery, DeliverySource, Publisher, Settlement};
pub use envelope::WorkItem;
pub use error::{DecodeError, ErrorCategory, ProcessingError, WorkerError};
pub use memory::{InMemoryBroker, InMemorySource};
pub use processor::{ProcessingResult, Processor};
pub use retry::{Route, RetryRouter};
pub use topology::{declare_topology, queue_specs, QueueSpec};
pub use worker::{Consumer, ConsumerSummary, DeliveryHandler, DeliveryState};
