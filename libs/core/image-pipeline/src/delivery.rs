//! Broker seams: deliveries, settlement and publishing
//!
//! The consumer only talks to the broker through these traits, so the AMQP
//! binding and the in-memory broker used by tests are interchangeable.

use crate::error::WorkerError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Final disposition of a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processing succeeded; remove the message
    Ack,
    /// A copy was already published to the retry queue; remove the original
    /// without dead-lettering it
    Retry,
    /// Reject without requeue; the queue's dead-letter route takes it
    DeadLetter,
}

impl Settlement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Settlement::Ack => "ack",
            Settlement::Retry => "retry",
            Settlement::DeadLetter => "dead_letter",
        }
    }
}

/// Settles a single delivery with the broker.
///
/// Takes `self` by value: a delivery can be settled once.
#[async_trait]
pub trait Acker: Send {
    async fn settle(self: Box<Self>, settlement: Settlement) -> Result<(), WorkerError>;
}

/// A message received from the main queue
pub struct Delivery {
    body: Vec<u8>,
    redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, redelivered: bool, acker: Box<dyn Acker>) -> Self {
        Self {
            body,
            redelivered,
            acker,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the broker delivered this message before without settlement
    pub fn is_redelivery(&self) -> bool {
        self.redelivered
    }

    /// Settle the delivery, consuming it
    pub async fn settle(self, settlement: Settlement) -> Result<(), WorkerError> {
        self.acker.settle(settlement).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries from the main queue.
///
/// `next_delivery` must be cancel-safe: if the future is dropped before it
/// resolves, no message may be lost.
#[async_trait]
pub trait DeliverySource: Send {
    /// Next delivery, or `None` once the subscription has ended
    async fn next_delivery(&mut self) -> Option<Result<Delivery, WorkerError>>;
}

/// Publishes raw message bodies to a named queue.
///
/// Returns only after the broker has taken responsibility for the message.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), WorkerError>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), WorkerError> {
        (**self).publish(queue, payload).await
    }
}
