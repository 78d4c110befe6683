//! The wire-client seam.
//!
//! The factory and template talk to the broker only through [`PulsarClient`]
//! and [`Producer`]. The `pulsar` feature provides an implementation over the
//! `pulsar` crate; tests use in-memory spies.
//!
//! # Preconditions on implementors
//!
//! A [`Producer`] is shared by every send to its topic once created, so it must
//! be safe to call from many tasks at once. Ordering between concurrent sends
//! on one producer is whatever the implementation provides. Timeouts waiting
//! for a receipt are the implementation's business and are reported as
//! [`ClientError::Timeout`].

use crate::message::MessageSpec;
use crate::schema::Schema;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by a wire client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    /// The producer's pending-message queue is full.
    #[error("Producer queue is full: {0}")]
    QueueFull(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// The broker refused the message or the producer registration.
    #[error("Rejected by broker: {0}")]
    Rejected(String),

    #[error("Producer already closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Broker-assigned identifier of a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    pub ledger_id: u64,
    pub entry_id: u64,
    pub partition: i32,
    pub batch_index: i32,
}

impl MessageId {
    pub fn new(ledger_id: u64, entry_id: u64) -> Self {
        Self {
            ledger_id,
            entry_id,
            partition: -1,
            batch_index: -1,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.ledger_id, self.entry_id, self.partition, self.batch_index
        )
    }
}

/// Resolves once the broker acknowledges (or fails) an enqueued message.
pub type ReceiptFuture = BoxFuture<'static, Result<MessageId, ClientError>>;

/// How a producer dispatches asynchronously, declared once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Only [`Producer::send`] is available; the template runs it on a task.
    #[default]
    Sequential,
    /// [`Producer::send_async`] enqueues and returns a receipt future.
    Pipelined,
}

/// A broker-connected publish channel bound to one topic.
#[async_trait]
pub trait Producer: Send + Sync {
    fn topic(&self) -> &str;

    fn dispatch_mode(&self) -> DispatchMode {
        DispatchMode::Sequential
    }

    /// Sends one message and waits for the broker receipt.
    async fn send(&self, message: MessageSpec) -> Result<MessageId, ClientError>;

    /// Enqueues one message, returning a future for its receipt.
    ///
    /// Only called on producers declaring [`DispatchMode::Pipelined`].
    async fn send_async(&self, _message: MessageSpec) -> Result<ReceiptFuture, ClientError> {
        Err(ClientError::Other(format!(
            "producer for '{}' does not support pipelined dispatch",
            self.topic()
        )))
    }

    /// Physically closes the producer.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Creates producers against a broker.
#[async_trait]
pub trait PulsarClient: Send + Sync {
    async fn new_producer(
        &self,
        topic: &str,
        schema: &Schema,
    ) -> Result<Arc<dyn Producer>, ClientError>;
}
