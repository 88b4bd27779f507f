//! Message broker boundary.
//!
//! The ingestion router only needs a [`QueueProducer`]; queue workers need a
//! [`QueueConsumer`] and a [`DeadLetterSink`]. The in-memory broker in
//! [`memory`](crate::memory) and the Kafka backend in `kafka` (feature
//! `kafka`) implement them.

use std::future::Future;
use std::time::Duration;

use graphwarden_core::error::BrokerError;

use crate::message::{BrokerHealth, DeadLetterRecord, Delivery, DeliveryReceipt, QueueMessage};

/// Trait abstracting the enqueue side of the broker.
pub trait QueueProducer: Send + Sync + 'static {
    /// Enqueues a message and returns where the broker stored it.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Unavailable` when the broker cannot accept the message.
    fn enqueue(
        &self,
        message: QueueMessage,
    ) -> impl Future<Output = Result<DeliveryReceipt, BrokerError>> + Send;

    /// Reports broker connectivity.
    fn health(&self) -> impl Future<Output = BrokerHealth> + Send;
}

/// Trait abstracting one consumer in a consumer group.
///
/// A consumer owns a fixed set of partitions. Within a partition, deliveries
/// arrive in offset order and a released message is delivered again before
/// anything after it.
pub trait QueueConsumer: Send + 'static {
    /// Waits up to `wait` for the next delivery. `Ok(None)` means nothing arrived.
    fn poll(
        &mut self,
        wait: Duration,
    ) -> impl Future<Output = Result<Option<Delivery>, BrokerError>> + Send;

    /// Commits the delivery's offset for the consumer group.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Commit` when the offset could not be stored.
    fn commit(
        &mut self,
        delivery: &Delivery,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Releases the delivery uncommitted so the broker redelivers it.
    fn nack(&mut self, delivery: &Delivery)
    -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// Trait abstracting the dead-letter destination.
pub trait DeadLetterSink: Send + Sync + 'static {
    /// Publishes a terminal failure record.
    fn publish(
        &self,
        record: DeadLetterRecord,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;
}
