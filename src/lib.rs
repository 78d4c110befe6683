pub mod cache;
pub mod client;
pub mod config;
pub mod converter;
pub mod envelope;
pub mod error;
pub mod factory;
pub mod message;
pub mod producer;
pub mod schema;
pub mod template;
pub mod topic;

#[cfg(feature = "pulsar")]
pub mod pulsar_client;

#[cfg(test)]
pub(crate) mod test_utils;

pub use client::{ClientError, MessageId};
pub use config::Config;
pub use envelope::{Envelope, HeaderValue};
pub use error::{Error, PublishFailureKind, Result};
pub use factory::ProducerFactory;
pub use message::{MessageSpec, OutboundMessage};
pub use schema::{Schema, SchemaType};
pub use template::{PulsarTemplate, SendFuture};
pub use topic::canonicalize;
