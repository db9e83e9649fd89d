//! In-process broker with the same topology semantics as the AMQP binding.
//!
//! Dead-letter settlements land on the dead-letter queue; retry TTL expiry is
//! driven explicitly with [`InMemoryBroker::expire_retries`]. Used by tests
//! and local runs without a broker.

use crate::config::QueueTopology;
use crate::delivery::{Acker, Delivery, DeliverySource, Publisher, Settlement};
use crate::error::WorkerError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    unsettled: HashSet<u64>,
    settlements: Vec<(u64, Settlement)>,
    next_tag: u64,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    topology: QueueTopology,
    state: Mutex<State>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to one in-memory broker
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new(topology: QueueTopology) -> Self {
        Self {
            shared: Arc::new(Shared {
                topology,
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// A subscription to the main queue
    pub fn consumer(&self) -> InMemorySource {
        InMemorySource {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Move every retry-queue message back to the main queue, as if its TTL
    /// had expired. Returns how many moved.
    pub fn expire_retries(&self) -> usize {
        let topology = &self.shared.topology;
        let moved = {
            let mut state = self.shared.lock();
            let expired: Vec<_> = state
                .queues
                .get_mut(&topology.retry_queue)
                .map(|q| q.drain(..).collect())
                .unwrap_or_default();
            let moved = expired.len();
            state
                .queues
                .entry(topology.main_queue.clone())
                .or_default()
                .extend(expired);
            moved
        };

        if moved > 0 {
            self.shared.notify.notify_waiters();
        }
        moved
    }

    /// End all subscriptions once the main queue is drained
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.shared.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Snapshot of the bodies waiting on `queue`
    pub fn messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every settlement so far, in order, keyed by delivery tag
    pub fn settlements(&self) -> Vec<(u64, Settlement)> {
        self.shared.lock().settlements.clone()
    }

    /// Deliveries handed out but not yet settled
    pub fn pending_settlements(&self) -> usize {
        self.shared.lock().unsettled.len()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(QueueTopology::default())
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), WorkerError> {
        self.shared
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_vec());
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

/// Subscription handed out by [`InMemoryBroker::consumer`]
pub struct InMemorySource {
    shared: Arc<Shared>,
}

impl InMemorySource {
    /// `None` when nothing is ready, `Some(None)` once closed and drained
    fn try_pop(&self) -> Option<Option<Delivery>> {
        let mut state = self.shared.lock();
        let main = &self.shared.topology.main_queue;

        if let Some(body) = state.queues.get_mut(main).and_then(VecDeque::pop_front) {
            state.next_tag += 1;
            let tag = state.next_tag;
            state.unsettled.insert(tag);
            let acker = InMemoryAcker {
                shared: Arc::clone(&self.shared),
                tag,
                body: body.clone(),
            };
            return Some(Some(Delivery::new(body, false, Box::new(acker))));
        }

        if state.closed { Some(None) } else { None }
    }
}

#[async_trait]
impl DeliverySource for InMemorySource {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, WorkerError>> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a publish in between is not missed
            notified.as_mut().enable();

            if let Some(next) = self.try_pop() {
                return next.map(Ok);
            }

            notified.await;
        }
    }
}

struct InMemoryAcker {
    shared: Arc<Shared>,
    tag: u64,
    body: Vec<u8>,
}

#[async_trait]
impl Acker for InMemoryAcker {
    async fn settle(self: Box<Self>, settlement: Settlement) -> Result<(), WorkerError> {
        let mut state = self.shared.lock();
        if !state.unsettled.remove(&self.tag) {
            return Err(WorkerError::broker(format!(
                "delivery {} settled twice",
                self.tag
            )));
        }
        state.settlements.push((self.tag, settlement));

        // Rejected deliveries follow the main queue's dead-letter route
        if settlement == Settlement::DeadLetter {
            let dead_letter_queue = self.shared.topology.dead_letter_queue.clone();
            state
                .queues
                .entry(dead_letter_queue)
                .or_default()
                .push_back(self.body.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_consume() {
        let broker = InMemoryBroker::default();
        broker.publish("image_processing", b"one").await.unwrap();

        let mut source = broker.consumer();
        let delivery = source.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.body(), b"one");
        assert_eq!(broker.pending_settlements(), 1);

        delivery.settle(Settlement::Ack).await.unwrap();
        assert_eq!(broker.pending_settlements(), 0);
        assert_eq!(broker.settlements(), vec![(1, Settlement::Ack)]);
    }

    #[tokio::test]
    async fn test_dead_letter_routes_to_dlq() {
        let broker = InMemoryBroker::default();
        broker.publish("image_processing", b"bad").await.unwrap();

        let delivery = broker.consumer().next_delivery().await.unwrap().unwrap();
        delivery.settle(Settlement::DeadLetter).await.unwrap();

        assert_eq!(broker.queue_len("image_processing"), 0);
        assert_eq!(broker.messages("image_processing_dlx"), vec![b"bad".to_vec()]);
    }

    #[tokio::test]
    async fn test_expire_retries_moves_to_main() {
        let broker = InMemoryBroker::default();
        broker.publish("image_processing_retry", b"r1").await.unwrap();
        broker.publish("image_processing_retry", b"r2").await.unwrap();

        assert_eq!(broker.expire_retries(), 2);
        assert_eq!(broker.queue_len("image_processing_retry"), 0);
        assert_eq!(broker.queue_len("image_processing"), 2);
    }

    #[tokio::test]
    async fn test_close_ends_subscription() {
        let broker = InMemoryBroker::default();
        let mut source = broker.consumer();

        let waiter = tokio::spawn(async move { source.next_delivery().await.is_none() });
        tokio::task::yield_now().await;
        broker.close();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_waiting_consumer_wakes_on_publish() {
        let broker = InMemoryBroker::default();
        let mut source = broker.consumer();

        let waiter = tokio::spawn(async move {
            source
                .next_delivery()
                .await
                .map(|d| d.map(|d| d.body().to_vec()))
        });
        tokio::task::yield_now().await;
        broker.publish("image_processing", b"late").await.unwrap();

        let body = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(body, b"late");
    }
}
