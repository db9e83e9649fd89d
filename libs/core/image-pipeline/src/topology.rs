//! Durable queue topology
//!
//! ```text
//!  publish ──▶ main ──(nack, no requeue)──▶ dead-letter
//!               ▲
//!               └──(TTL expiry)── retry ◀── consumer republish
//! ```
//!
//! All three queues are bound to the default exchange, so dead-letter routing
//! uses the target queue name as routing key.

use crate::config::QueueTopology;
use crate::error::WorkerError;
use crate::retry::RetryRouter;
use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
    Channel,
};
use tracing::info;

pub const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";
pub const DEAD_LETTER_ROUTING_KEY_ARG: &str = "x-dead-letter-routing-key";
pub const MESSAGE_TTL_ARG: &str = "x-message-ttl";

/// Declaration of one durable queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,

    /// Queue that expired or rejected messages are routed to, via the
    /// default exchange
    pub dead_letter_routing_key: Option<String>,

    /// Per-queue message TTL in milliseconds
    pub message_ttl_ms: Option<u32>,
}

impl QueueSpec {
    /// Look up the declaration for `queue`. Queues outside the topology are
    /// declared plain.
    pub fn for_queue(queue: &str, topology: &QueueTopology, router: &RetryRouter) -> Self {
        queue_specs(topology, router)
            .into_iter()
            .find(|spec| spec.name == queue)
            .unwrap_or_else(|| QueueSpec {
                name: queue.to_string(),
                dead_letter_routing_key: None,
                message_ttl_ms: None,
            })
    }

    /// Queue arguments. Redeclaring an existing queue with different
    /// arguments is a broker error, so every declaration must go through here.
    pub fn to_field_table(&self) -> FieldTable {
        let mut args = FieldTable::default();

        if let Some(routing_key) = &self.dead_letter_routing_key {
            args.insert(
                ShortString::from(DEAD_LETTER_EXCHANGE_ARG),
                AMQPValue::LongString(LongString::from("")),
            );
            args.insert(
                ShortString::from(DEAD_LETTER_ROUTING_KEY_ARG),
                AMQPValue::LongString(LongString::from(routing_key.as_str())),
            );
        }

        if let Some(ttl) = self.message_ttl_ms {
            args.insert(ShortString::from(MESSAGE_TTL_ARG), AMQPValue::LongUInt(ttl));
        }

        args
    }

    pub async fn declare(&self, channel: &Channel) -> Result<(), WorkerError> {
        channel
            .queue_declare(
                &self.name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                self.to_field_table(),
            )
            .await?;
        Ok(())
    }
}

/// The three queue declarations, in dependency order: dead-letter, retry,
/// main.
pub fn queue_specs(topology: &QueueTopology, router: &RetryRouter) -> [QueueSpec; 3] {
    [
        QueueSpec {
            name: topology.dead_letter_queue.clone(),
            dead_letter_routing_key: None,
            message_ttl_ms: None,
        },
        QueueSpec {
            name: topology.retry_queue.clone(),
            dead_letter_routing_key: Some(topology.main_queue.clone()),
            message_ttl_ms: Some(router.retry_ttl_ms()),
        },
        QueueSpec {
            name: topology.main_queue.clone(),
            dead_letter_routing_key: Some(topology.dead_letter_queue.clone()),
            message_ttl_ms: None,
        },
    ]
}

/// Declare the topology. Idempotent for an unchanged configuration.
pub async fn declare_topology(
    channel: &Channel,
    topology: &QueueTopology,
    router: &RetryRouter,
) -> Result<(), WorkerError> {
    for spec in queue_specs(topology, router) {
        spec.declare(channel).await?;
        info!(
            queue = %spec.name,
            dead_letter_to = ?spec.dead_letter_routing_key,
            ttl_ms = ?spec.message_ttl_ms,
            "Queue declared"
        );
    }
    Ok(())
}
