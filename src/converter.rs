use crate::envelope::{headers, Envelope, HeaderValue};
use crate::message::{conf_keys, MessageConf, MessageSpec, OutboundMessage};
use crate::{Error, Result};
use serde_json::Value;
use tracing::debug;

/// Turns an [`Envelope`] into an [`OutboundMessage`].
pub trait MessageConverter: Send + Sync {
    /// Resolves the destination topic and builds the message spec.
    ///
    /// `default_topic` is used when the envelope carries no topic header.
    fn convert(&self, envelope: &Envelope, default_topic: Option<&str>) -> Result<OutboundMessage>;
}

/// Default converter: topic from the `pulsar_topic` header or the default
/// topic, routing key from `pulsar_key`, payload passed through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagingMessageConverter;

impl MessageConverter for MessagingMessageConverter {
    fn convert(&self, envelope: &Envelope, default_topic: Option<&str>) -> Result<OutboundMessage> {
        let topic = match text_header(envelope, headers::TOPIC)? {
            Some(topic) => topic,
            None => default_topic.ok_or(Error::NoDefaultTopic)?.to_string(),
        };

        let mut conf = MessageConf::new();
        if let Some(key) = text_header(envelope, headers::KEY)? {
            conf.insert(conf_keys::KEY.to_string(), Value::String(key));
        }

        debug!(topic = %topic, conf_entries = conf.len(), "Converted envelope");

        Ok(OutboundMessage::new(
            topic,
            MessageSpec::new(envelope.payload.clone()).with_conf(conf),
        ))
    }
}

fn text_header(envelope: &Envelope, name: &str) -> Result<Option<String>> {
    match envelope.header(name) {
        None => Ok(None),
        Some(HeaderValue::Text(s)) => Ok(Some(s.clone())),
        Some(HeaderValue::Binary(b)) => match std::str::from_utf8(b) {
            Ok(s) => Ok(Some(s.to_string())),
            Err(_) => Err(Error::MalformedHeader {
                header: name.to_string(),
                found: "non-UTF-8 binary".to_string(),
            }),
        },
        Some(other) => Err(Error::MalformedHeader {
            header: name.to_string(),
            found: other.type_name().to_string(),
        }),
    }
}
