//! Wire client over the `pulsar` crate.
//!
//! Each producer bounds its in-flight messages with a semaphore sized by
//! `max_pending_messages`; a send that finds no permit fails immediately with
//! [`ClientError::QueueFull`] instead of blocking. Receipts not acknowledged
//! within `send_timeout_ms` fail with [`ClientError::Timeout`].

use crate::client::{ClientError, DispatchMode, MessageId, Producer, PulsarClient, ReceiptFuture};
use crate::config::{ClientConfig, ProducerConfig};
use crate::message::{conf_keys, MessageSpec};
use crate::schema::{Schema, SchemaType};
use ::pulsar::error::ConnectionError;
use ::pulsar::{producer, proto, OperationRetryOptions, Pulsar, TokioExecutor};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

pub struct PulsarWireClient {
    pulsar: Pulsar<TokioExecutor>,
    send_timeout: Duration,
    max_pending_messages: usize,
}

impl PulsarWireClient {
    pub async fn connect(client: &ClientConfig, producer: &ProducerConfig) -> Result<Self, ClientError> {
        info!("Connecting to Pulsar at {}", client.service_url);

        let retry = OperationRetryOptions {
            operation_timeout: Duration::from_secs(client.operation_timeout_secs),
            ..Default::default()
        };
        let pulsar = Pulsar::builder(client.service_url.clone(), TokioExecutor)
            .with_operation_retry_options(retry)
            .build()
            .await
            .map_err(classify)?;

        Ok(Self {
            pulsar,
            send_timeout: Duration::from_millis(producer.send_timeout_ms),
            max_pending_messages: producer.max_pending_messages.max(1),
        })
    }
}

#[async_trait]
impl PulsarClient for PulsarWireClient {
    async fn new_producer(
        &self,
        topic: &str,
        schema: &Schema,
    ) -> Result<Arc<dyn Producer>, ClientError> {
        let options = producer::ProducerOptions {
            schema: Some(proto_schema(schema)),
            ..Default::default()
        };

        let inner = self
            .pulsar
            .producer()
            .with_topic(topic)
            .with_options(options)
            .build()
            .await
            .map_err(classify)?;

        Ok(Arc::new(PulsarProducer {
            topic: topic.to_string(),
            inner: Mutex::new(inner),
            pending: Arc::new(Semaphore::new(self.max_pending_messages)),
            max_pending: self.max_pending_messages,
            send_timeout: self.send_timeout,
        }))
    }
}

struct PulsarProducer {
    topic: String,
    inner: Mutex<producer::Producer<TokioExecutor>>,
    pending: Arc<Semaphore>,
    max_pending: usize,
    send_timeout: Duration,
}

#[async_trait]
impl Producer for PulsarProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn dispatch_mode(&self) -> DispatchMode {
        DispatchMode::Pipelined
    }

    async fn send(&self, message: MessageSpec) -> Result<MessageId, ClientError> {
        self.send_async(message).await?.await
    }

    async fn send_async(&self, message: MessageSpec) -> Result<ReceiptFuture, ClientError> {
        let permit = self.pending.clone().try_acquire_owned().map_err(|_| {
            ClientError::QueueFull(format!(
                "{} messages pending on '{}'",
                self.max_pending, self.topic
            ))
        })?;

        let message = build_message(message)?;
        let receipt = {
            let mut inner = self.inner.lock().await;
            inner.send_non_blocking(message).await.map_err(classify)?
        };

        let send_timeout = self.send_timeout;
        Ok(Box::pin(async move {
            let _permit = permit;
            let receipt = tokio::time::timeout(send_timeout, receipt)
                .await
                .map_err(|_| ClientError::Timeout(format!("no receipt within {:?}", send_timeout)))?
                .map_err(classify)?;

            let id = receipt
                .message_id
                .ok_or_else(|| ClientError::Other("receipt without message id".to_string()))?;
            Ok(MessageId {
                ledger_id: id.ledger_id,
                entry_id: id.entry_id,
                partition: id.partition.unwrap_or(-1),
                batch_index: id.batch_index.unwrap_or(-1),
            })
        }))
    }

    async fn close(&self) -> Result<(), ClientError> {
        debug!("Closing Pulsar producer for '{}'", self.topic);
        self.inner.lock().await.close().await.map_err(classify)
    }
}

fn proto_schema(schema: &Schema) -> proto::Schema {
    let schema_type = match schema.schema_type {
        SchemaType::Bytes => proto::schema::Type::None,
        SchemaType::String => proto::schema::Type::String,
        SchemaType::Json => proto::schema::Type::Json,
        SchemaType::Avro => proto::schema::Type::Avro,
        SchemaType::Protobuf => proto::schema::Type::Protobuf,
    };
    proto::Schema {
        r#type: schema_type as i32,
        schema_data: schema
            .definition
            .as_deref()
            .unwrap_or_default()
            .as_bytes()
            .to_vec(),
        ..Default::default()
    }
}

/// Applies the conf entries this client understands; others are ignored.
fn build_message(spec: MessageSpec) -> Result<producer::Message, ClientError> {
    if spec.schema.is_some() {
        debug!("Per-message schema override sent with the producer schema");
    }

    let mut message = producer::Message {
        payload: spec.payload.to_vec(),
        ..Default::default()
    };

    for (key, value) in &spec.conf {
        match key.as_str() {
            conf_keys::KEY => message.partition_key = Some(conf_string(key, value)?),
            conf_keys::EVENT_TIME => message.event_time = Some(conf_u64(key, value)?),
            conf_keys::DELIVER_AT_TIME => {
                message.deliver_at_time = Some(conf_i64(key, value)?)
            }
            conf_keys::DELIVER_AFTER_MS => {
                message.deliver_at_time = Some(deliver_after(key, value, now_millis())?)
            }
            conf_keys::PROPERTIES => message.properties = conf_properties(key, value)?,
            _ => debug!("Ignoring unsupported message conf '{}'", key),
        }
    }

    Ok(message)
}

fn conf_string(key: &str, value: &Value) -> Result<String, ClientError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(invalid_conf(key, other)),
    }
}

fn conf_u64(key: &str, value: &Value) -> Result<u64, ClientError> {
    value.as_u64().ok_or_else(|| invalid_conf(key, value))
}

fn conf_i64(key: &str, value: &Value) -> Result<i64, ClientError> {
    i64::try_from(conf_u64(key, value)?).map_err(|_| invalid_conf(key, value))
}

/// Absolute delivery time `delay` milliseconds after `now`.
fn deliver_after(key: &str, delay: &Value, now: u64) -> Result<i64, ClientError> {
    conf_u64(key, delay)?
        .checked_add(now)
        .and_then(|at| i64::try_from(at).ok())
        .ok_or_else(|| invalid_conf(key, delay))
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn conf_properties(key: &str, value: &Value) -> Result<HashMap<String, String>, ClientError> {
    let object = value.as_object().ok_or_else(|| invalid_conf(key, value))?;
    Ok(object
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k.clone(), s.clone()),
            other => (k.clone(), other.to_string()),
        })
        .collect())
}

fn invalid_conf(key: &str, value: &Value) -> ClientError {
    ClientError::Rejected(format!("invalid value for message conf '{}': {}", key, value))
}

fn classify(error: ::pulsar::Error) -> ClientError {
    use ::pulsar::error::ProducerError;

    let connection = match &error {
        ::pulsar::Error::Connection(e) => Some(e),
        ::pulsar::Error::Producer(ProducerError::Connection(e)) => Some(e),
        _ => None,
    };

    match connection {
        Some(ConnectionError::PulsarError(..)) => ClientError::Rejected(error.to_string()),
        Some(_) => ClientError::Connection(error.to_string()),
        None => ClientError::Other(error.to_string()),
    }
}
