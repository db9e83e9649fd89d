//! Queue consumer
//!
//! Drives each delivery through `Received -> Processing -> {Acked, Retrying,
//! DeadLettered}` and settles it exactly once.

use crate::config::{PipelineConfig, QueueTopology};
use crate::delivery::{Delivery, DeliverySource, Publisher, Settlement};
use crate::envelope::WorkItem;
use crate::error::WorkerError;
use crate::metrics::PipelineMetrics;
use crate::processor::Processor;
use crate::retry::{Route, RetryRouter};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Lifecycle of one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Received,
    Processing,
    Acked,
    Retrying,
    DeadLettered,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryState::Acked | DeliveryState::Retrying | DeliveryState::DeadLettered
        )
    }

    /// Broker settlement for a terminal state
    pub fn settlement(&self) -> Option<Settlement> {
        match self {
            DeliveryState::Acked => Some(Settlement::Ack),
            DeliveryState::Retrying => Some(Settlement::Retry),
            DeliveryState::DeadLettered => Some(Settlement::DeadLetter),
            DeliveryState::Received | DeliveryState::Processing => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Received => "received",
            DeliveryState::Processing => "processing",
            DeliveryState::Acked => "acked",
            DeliveryState::Retrying => "retrying",
            DeliveryState::DeadLettered => "dead_lettered",
        }
    }
}

/// Terminal-state counts for one consumer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub acked: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

impl ConsumerSummary {
    fn record(&mut self, state: DeliveryState) {
        match state {
            DeliveryState::Acked => self.acked += 1,
            DeliveryState::Retrying => self.retried += 1,
            DeliveryState::DeadLettered => self.dead_lettered += 1,
            DeliveryState::Received | DeliveryState::Processing => {}
        }
    }

    pub fn total(&self) -> u64 {
        self.acked + self.retried + self.dead_lettered
    }
}

/// Decodes, processes, routes and settles single deliveries.
///
/// Holds no broker subscription, so it can be shared by reference while a
/// [`Consumer`] owns its delivery source.
pub struct DeliveryHandler<P, Pub>
where
    P: Processor,
    Pub: Publisher,
{
    processor: Arc<P>,
    publisher: Arc<Pub>,
    router: RetryRouter,
    topology: QueueTopology,
    metrics: PipelineMetrics,
}

/// Consumes the main queue, one delivery at a time.
///
/// Run several consumers against the same queue for parallelism; each
/// delivery is owned by exactly one of them.
pub struct Consumer<S, P, Pub>
where
    S: DeliverySource,
    P: Processor,
    Pub: Publisher,
{
    source: S,
    handler: DeliveryHandler<P, Pub>,
}

impl<S, P, Pub> Consumer<S, P, Pub>
where
    S: DeliverySource,
    P: Processor,
    Pub: Publisher,
{
    pub fn new(source: S, processor: Arc<P>, publisher: Arc<Pub>, config: &PipelineConfig) -> Self {
        Self {
            source,
            handler: DeliveryHandler::new(processor, publisher, config),
        }
    }

    /// Consume until shutdown is signalled or the subscription ends.
    ///
    /// Shutdown is only observed between deliveries: a delivery that has
    /// been received is always processed and settled before returning.
    /// A dropped shutdown sender counts as a shutdown signal.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ConsumerSummary, WorkerError> {
        info!(
            queue = %self.handler.topology.main_queue,
            processor = self.handler.processor.name(),
            max_attempts = self.handler.router.max_attempts(),
            "Starting consumer"
        );

        let mut summary = ConsumerSummary::default();

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping consumer");
                break;
            }

            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Received shutdown signal, stopping consumer");
                        break;
                    }
                    continue;
                }
                next = self.source.next_delivery() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    let state = self.handler.handle(delivery).await;
                    summary.record(state);
                }
                Some(Err(e)) => {
                    error!(error = %e, "Delivery stream failed");
                    return Err(e);
                }
                None => {
                    info!("Subscription ended");
                    break;
                }
            }
        }

        info!(
            acked = summary.acked,
            retried = summary.retried,
            dead_lettered = summary.dead_lettered,
            "Consumer stopped"
        );
        Ok(summary)
    }
}

impl<P, Pub> DeliveryHandler<P, Pub>
where
    P: Processor,
    Pub: Publisher,
{
    pub fn new(processor: Arc<P>, publisher: Arc<Pub>, config: &PipelineConfig) -> Self {
        let metrics = PipelineMetrics::new(&config.topology.main_queue, processor.name());
        Self {
            processor,
            publisher,
            router: config.retry_router(),
            topology: config.topology.clone(),
            metrics,
        }
    }

    /// Process and settle a single delivery, returning its terminal state.
    pub async fn handle(&self, delivery: Delivery) -> DeliveryState {
        self.metrics.delivery_received();
        let state = DeliveryState::Received;
        debug!(
            state = state.as_str(),
            redelivered = delivery.is_redelivery(),
            "Delivery received"
        );

        let item = match WorkItem::decode(delivery.body()) {
            Ok(item) => item,
            Err(e) => {
                warn!(
                    error = %e,
                    category = e.category().as_str(),
                    "Dead-lettering undecodable delivery"
                );
                self.metrics.dead_lettered("decode");
                return self.finish(delivery, DeliveryState::DeadLettered).await;
            }
        };

        let state = DeliveryState::Processing;
        debug!(
            state = state.as_str(),
            resource_id = item.resource_id,
            attempt = item.attempt,
            "Processing work item"
        );

        let started = Instant::now();
        let state = match self.processor.process(&item).await {
            Ok(artifact) => {
                info!(
                    resource_id = item.resource_id,
                    attempt = item.attempt,
                    artifact = %artifact,
                    "Work item processed"
                );
                self.metrics.acked(started.elapsed());
                DeliveryState::Acked
            }
            Err(failure) => match self.router.route(item.attempt, &failure) {
                Route::Retry => self.schedule_retry(&item).await,
                Route::DeadLetter => {
                    warn!(
                        resource_id = item.resource_id,
                        attempt = item.attempt,
                        error = %failure,
                        category = failure.category().as_str(),
                        "Dead-lettering work item"
                    );
                    self.metrics.dead_lettered(failure.category().as_str());
                    DeliveryState::DeadLettered
                }
            },
        };

        self.finish(delivery, state).await
    }

    /// Publish the next attempt to the retry queue. If the broker does not
    /// confirm it, the original is dead-lettered instead so it is never lost.
    async fn schedule_retry(&self, item: &WorkItem) -> DeliveryState {
        let next = self.router.next_attempt(item);

        match self
            .publisher
            .publish(&self.topology.retry_queue, &next.encode())
            .await
        {
            Ok(()) => {
                warn!(
                    resource_id = item.resource_id,
                    attempt = next.attempt,
                    max_attempts = self.router.max_attempts(),
                    delay_ms = self.router.retry_ttl_ms(),
                    "Work item failed, scheduled for retry"
                );
                self.metrics.retried(next.attempt);
                DeliveryState::Retrying
            }
            Err(e) => {
                error!(
                    resource_id = item.resource_id,
                    error = %e,
                    "Failed to publish retry, dead-lettering instead"
                );
                self.metrics.retry_publish_failed();
                self.metrics.dead_lettered("retry_publish");
                DeliveryState::DeadLettered
            }
        }
    }

    async fn finish(&self, delivery: Delivery, state: DeliveryState) -> DeliveryState {
        let Some(settlement) = state.settlement() else {
            return state;
        };

        if let Err(e) = delivery.settle(settlement).await {
            // The broker redelivers unsettled messages; processing is idempotent.
            error!(
                error = %e,
                settlement = settlement.as_str(),
                "Failed to settle delivery"
            );
            self.metrics.settle_failed();
        }

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!DeliveryState::Received.is_terminal());
        assert!(!DeliveryState::Processing.is_terminal());
        assert!(DeliveryState::Acked.is_terminal());
        assert!(DeliveryState::Retrying.is_terminal());
        assert!(DeliveryState::DeadLettered.is_terminal());
    }

    #[test]
    fn test_settlement_mapping() {
        assert_eq!(DeliveryState::Acked.settlement(), Some(Settlement::Ack));
        assert_eq!(DeliveryState::Retrying.settlement(), Some(Settlement::Retry));
        assert_eq!(
            DeliveryState::DeadLettered.settlement(),
            Some(Settlement::DeadLetter)
        );
        assert_eq!(DeliveryState::Processing.settlement(), None);
    }

    #[test]
    fn test_summary_counts_terminal_states() {
        let mut summary = ConsumerSummary::default();
        summary.record(DeliveryState::Acked);
        summary.record(DeliveryState::Retrying);
        summary.record(DeliveryState::DeadLettered);
        summary.record(DeliveryState::DeadLettered);
        summary.record(DeliveryState::Processing);

        assert_eq!(summary.acked, 1);
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.dead_lettered, 2);
        assert_eq!(summary.total(), 4);
    }
}
