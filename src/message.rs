use crate::schema::Schema;
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known keys a wire client may honour in [`MessageConf`].
pub mod conf_keys {
    pub const KEY: &str = "key";
    pub const PROPERTIES: &str = "properties";
    pub const EVENT_TIME: &str = "eventTime";
    pub const DELIVER_AT_TIME: &str = "deliverAtTime";
    pub const DELIVER_AFTER_MS: &str = "deliverAfterMs";
}

/// Per-message configuration applied verbatim by the wire client
/// (routing key, delivery delay, properties, ...).
pub type MessageConf = BTreeMap<String, Value>;

/// Everything the producer needs to build and dispatch one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageSpec {
    pub payload: Bytes,
    /// Replaces the producer's schema for this message only.
    pub schema: Option<Schema>,
    pub conf: MessageConf,
}

impl MessageSpec {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_conf(mut self, conf: MessageConf) -> Self {
        self.conf = conf;
        self
    }

    pub fn with_conf_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conf.insert(key.into(), value.into());
        self
    }
}

/// A message bound for a topic, as produced by a converter.
///
/// The topic is not yet canonicalized; the factory does that on lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub spec: MessageSpec,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, spec: MessageSpec) -> Self {
        Self {
            topic: topic.into(),
            spec,
        }
    }
}
