//! Error types and result handling for pulsar-template.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate. Synchronous sends return
//! these errors directly; asynchronous sends reject their [`SendFuture`]
//! with the same variants, so both paths share one classification.
//!
//! # Example
//!
//! ```rust
//! use pulsar_template::{ClientError, Error, PublishFailureKind};
//!
//! let err = Error::publish("persistent://public/default/orders", ClientError::QueueFull("128 pending".into()));
//!
//! match err {
//!     Error::Publish { kind: PublishFailureKind::QueueFull, .. } => println!("back off and retry"),
//!     Error::Publish { .. } => eprintln!("publish failed"),
//!     e => eprintln!("Other error: {}", e),
//! }
//! ```
//!
//! [`SendFuture`]: crate::template::SendFuture

use crate::client::ClientError;
use thiserror::Error;

/// The main error type for pulsar-template operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A default-topic send was attempted but no default topic is configured.
    ///
    /// Raised before any cache or network interaction.
    #[error("Send failed, no default topic provided")]
    NoDefaultTopic,

    /// The wire client could not create a producer for the topic.
    ///
    /// Creation failures are not cached; the next send to the same topic
    /// attempts creation again.
    #[error("Could not create producer for topic '{topic}': {source}")]
    ProducerCreation {
        /// Canonical topic the producer was requested for
        topic: String,
        #[source]
        source: ClientError,
    },

    /// Dispatching a message failed after the producer was acquired.
    #[error("Send message to '{topic}' failed ({kind}): {source}")]
    Publish {
        /// Canonical topic of the producer that failed the send
        topic: String,
        /// Classification of the failure
        kind: PublishFailureKind,
        #[source]
        source: ClientError,
    },

    /// The producer factory has been shut down.
    #[error("Producer factory is closed")]
    FactoryClosed,

    /// An envelope header was present but is not a text value.
    #[error("Header '{header}' must be text or UTF-8 binary, not {found}")]
    MalformedHeader {
        /// Name of the offending header
        header: String,
        /// Description of the value that was found
        found: String,
    },

    /// JSON serialization error when encoding a payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error, typically from an invalid file or environment variable.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Sub-kinds of [`Error::Publish`].
///
/// `QueueFull` is kept apart from the other kinds so callers can apply
/// backoff when the producer's pending queue is saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFailureKind {
    /// The producer's local pending-message queue is full.
    QueueFull,
    /// The wire client gave up waiting for the broker receipt.
    Timeout,
    /// The broker rejected the message.
    Rejected,
    /// Any other dispatch failure (connection loss, closed producer, ...).
    Other,
}

impl PublishFailureKind {
    pub fn classify(error: &ClientError) -> Self {
        match error {
            ClientError::QueueFull(_) => Self::QueueFull,
            ClientError::Timeout(_) => Self::Timeout,
            ClientError::Rejected(_) => Self::Rejected,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for PublishFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::QueueFull => "queue full",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Wrap a dispatch-time wire error, classifying it.
    pub fn publish(topic: impl Into<String>, source: ClientError) -> Self {
        Error::Publish {
            topic: topic.into(),
            kind: PublishFailureKind::classify(&source),
            source,
        }
    }

    pub fn creation(topic: impl Into<String>, source: ClientError) -> Self {
        Error::ProducerCreation {
            topic: topic.into(),
            source,
        }
    }

    /// Returns `true` when the producer queue was saturated.
    pub fn is_queue_full(&self) -> bool {
        matches!(
            self,
            Error::Publish {
                kind: PublishFailureKind::QueueFull,
                ..
            }
        )
    }

    /// Returns `true` for failures a caller may reasonably retry.
    ///
    /// Local contract violations and a closed factory are never retriable.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::ProducerCreation { .. } => true,
            Error::Publish { kind, .. } => matches!(
                kind,
                PublishFailureKind::QueueFull | PublishFailureKind::Timeout | PublishFailureKind::Other
            ),
            _ => false,
        }
    }
}

/// A convenient Result type alias for pulsar-template operations.
///
/// This is equivalent to `std::result::Result<T, pulsar_template::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
