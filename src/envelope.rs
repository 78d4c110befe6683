use bytes::Bytes;
use std::collections::HashMap;

/// Header names with a meaning to the default converter.
pub mod headers {
    /// Destination topic, text or UTF-8 binary.
    pub const TOPIC: &str = "pulsar_topic";
    /// Routing key, text or UTF-8 binary.
    pub const KEY: &str = "pulsar_key";
}

/// A header value carried by an [`Envelope`].
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Text(String),
    Binary(Bytes),
    Integer(i64),
    Boolean(bool),
}

impl HeaderValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HeaderValue::Text(_) => "text",
            HeaderValue::Binary(_) => "binary",
            HeaderValue::Integer(_) => "integer",
            HeaderValue::Boolean(_) => "boolean",
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(value: Vec<u8>) -> Self {
        HeaderValue::Binary(Bytes::from(value))
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Integer(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Boolean(value)
    }
}

/// A generic message: headers plus an opaque payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub headers: HashMap<String, HeaderValue>,
    pub payload: Bytes,
}

impl Envelope {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            headers: HashMap::new(),
            payload: payload.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }
}
