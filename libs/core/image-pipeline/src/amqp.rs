//! AMQP binding for the broker seams

use crate::config::{PipelineConfig, QueueTopology};
use crate::delivery::{Acker, Delivery, DeliverySource, Publisher, Settlement};
use crate::error::WorkerError;
use crate::retry::RetryRouter;
use crate::topology::{declare_topology, QueueSpec};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions,
    },
    types::{FieldTable, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, info};

const PERSISTENT: u8 = 2;

/// Open a broker connection
pub async fn connect(url: &str, connection_name: &str) -> Result<Connection, WorkerError> {
    let properties =
        ConnectionProperties::default().with_connection_name(connection_name.into());
    let connection = Connection::connect(url, properties).await?;
    info!(connection = connection_name, "Connected to AMQP broker");
    Ok(connection)
}

/// Declare the configured topology on a short-lived channel
pub async fn declare(connection: &Connection, config: &PipelineConfig) -> Result<(), WorkerError> {
    let channel = connection.create_channel().await?;
    declare_topology(&channel, &config.topology, &config.retry_router()).await?;
    channel.close(200, "topology declared").await?;
    Ok(())
}

/// Publishes persistent JSON messages through the default exchange and
/// waits for the broker's confirm.
///
/// The target queue is declared on first use, with the same arguments the
/// topology uses for it.
pub struct AmqpPublisher {
    channel: Channel,
    topology: QueueTopology,
    router: RetryRouter,
    declared: Mutex<HashSet<String>>,
}

impl AmqpPublisher {
    pub async fn new(connection: &Connection, config: &PipelineConfig) -> Result<Self, WorkerError> {
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        Ok(Self {
            channel,
            topology: config.topology.clone(),
            router: config.retry_router(),
            declared: Mutex::new(HashSet::new()),
        })
    }

    async fn ensure_declared(&self, queue: &str) -> Result<(), WorkerError> {
        let mut declared = self.declared.lock().await;
        if declared.contains(queue) {
            return Ok(());
        }

        QueueSpec::for_queue(queue, &self.topology, &self.router)
            .declare(&self.channel)
            .await?;
        declared.insert(queue.to_string());
        Ok(())
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), WorkerError> {
        self.ensure_declared(queue).await?;

        let properties = BasicProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_delivery_mode(PERSISTENT);

        let confirmation = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(WorkerError::broker(format!(
                "publish to '{}' was nacked by the broker",
                queue
            )));
        }

        debug!(queue, bytes = payload.len(), "Message published");
        Ok(())
    }
}

/// Subscription to the main queue
pub struct AmqpDeliverySource {
    consumer: lapin::Consumer,
    // Keeps the consuming channel open for the lifetime of the source
    _channel: Channel,
}

impl AmqpDeliverySource {
    pub async fn subscribe(
        connection: &Connection,
        config: &PipelineConfig,
        consumer_tag: &str,
    ) -> Result<Self, WorkerError> {
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;

        let consumer = channel
            .basic_consume(
                &config.topology.main_queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(
            queue = %config.topology.main_queue,
            consumer_tag,
            prefetch = config.prefetch,
            "Subscribed to queue"
        );

        Ok(Self {
            consumer,
            _channel: channel,
        })
    }
}

#[async_trait]
impl DeliverySource for AmqpDeliverySource {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, WorkerError>> {
        let next = self.consumer.next().await?;

        Some(next.map_err(WorkerError::from).map(|delivery| {
            let lapin::message::Delivery {
                data,
                redelivered,
                acker,
                ..
            } = delivery;
            Delivery::new(data, redelivered, Box::new(AmqpAcker { acker }))
        }))
    }
}

struct AmqpAcker {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl Acker for AmqpAcker {
    async fn settle(self: Box<Self>, settlement: Settlement) -> Result<(), WorkerError> {
        match settlement {
            // A retry copy is already confirmed on the retry queue; removing
            // the original must not trigger the main queue's dead-letter route.
            Settlement::Ack | Settlement::Retry => {
                self.acker.ack(BasicAckOptions::default()).await?;
            }
            Settlement::DeadLetter => {
                self.acker
                    .nack(BasicNackOptions {
                        requeue: false,
                        multiple: false,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}
