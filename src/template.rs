//! The publish façade.
//!
//! Every send follows the same steps: resolve the topic, borrow the cached
//! producer through the factory, dispatch, classify any failure, and drop the
//! lease. The `send*` methods resolve once the broker acknowledges. The
//! `send*_async` methods return a [`SendFuture`] as soon as the message is
//! handed to the producer. The receipt is awaited on a spawned task that
//! releases the lease before publishing the outcome, whether or not the
//! future is still being polled.
//!
//! # Example
//!
//! ```rust,no_run
//! # use pulsar_template::{ProducerFactory, PulsarTemplate, Schema};
//! # use pulsar_template::client::PulsarClient;
//! # use std::sync::Arc;
//! # async fn example(client: Arc<dyn PulsarClient>) -> pulsar_template::Result<()> {
//! let factory = Arc::new(ProducerFactory::new(client, Schema::bytes()));
//! let template = PulsarTemplate::new(factory.clone()).with_default_topic("orders");
//!
//! let id = template.send_default("order-1").await?;
//! println!("published as {}", id);
//!
//! let pending = template.send_async("audit", "order-1 placed").await?;
//! let id = pending.await?;
//! println!("audit record {}", id);
//!
//! factory.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::client::{ClientError, DispatchMode, MessageId};
use crate::config::TemplateConfig;
use crate::converter::{MessageConverter, MessagingMessageConverter};
use crate::envelope::Envelope;
use crate::factory::ProducerFactory;
use crate::message::{MessageConf, MessageSpec};
use crate::producer::ProducerLease;
use crate::schema::Schema;
use crate::{Error, Result};
use bytes::Bytes;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Pending outcome of an asynchronous send.
///
/// The producer has already been released by the time this resolves.
/// Dropping it does not cancel the send.
#[must_use = "dropping a SendFuture discards the send outcome"]
#[derive(Debug)]
pub struct SendFuture {
    topic: String,
    outcome: oneshot::Receiver<Result<MessageId>>,
}

impl SendFuture {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn ready(topic: String, outcome: Result<MessageId>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { topic, outcome: rx }
    }
}

impl Future for SendFuture {
    type Output = Result<MessageId>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let polled = Pin::new(&mut self.outcome).poll(cx);
        match polled {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::publish(
                self.topic.clone(),
                ClientError::Other("send task ended without an outcome".to_string()),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Sends payloads to topics through cached producers.
pub struct PulsarTemplate {
    factory: Arc<ProducerFactory>,
    converter: Arc<dyn MessageConverter>,
    default_topic: Option<String>,
}

impl PulsarTemplate {
    pub fn new(factory: Arc<ProducerFactory>) -> Self {
        Self {
            factory,
            converter: Arc::new(MessagingMessageConverter),
            default_topic: None,
        }
    }

    pub fn from_config(factory: Arc<ProducerFactory>, config: &TemplateConfig) -> Self {
        let template = Self::new(factory);
        match &config.default_topic {
            Some(topic) => template.with_default_topic(topic.clone()),
            None => template,
        }
    }

    pub fn with_default_topic(mut self, topic: impl Into<String>) -> Self {
        self.default_topic = Some(topic.into());
        self
    }

    /// Replaces the converter used by [`send_envelope`](Self::send_envelope).
    pub fn with_converter(mut self, converter: impl MessageConverter + 'static) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    pub fn default_topic(&self) -> Option<&str> {
        self.default_topic.as_deref()
    }

    pub fn factory(&self) -> &Arc<ProducerFactory> {
        &self.factory
    }

    fn require_default_topic(&self) -> Result<&str> {
        self.default_topic.as_deref().ok_or(Error::NoDefaultTopic)
    }

    // -- Acknowledged sends --

    pub async fn send(&self, topic: &str, payload: impl Into<Bytes>) -> Result<MessageId> {
        self.send_message(topic, MessageSpec::new(payload)).await
    }

    /// Sends with `schema` in place of the producer's schema for this message.
    pub async fn send_with_schema(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        schema: Schema,
    ) -> Result<MessageId> {
        self.send_message(topic, MessageSpec::new(payload).with_schema(schema))
            .await
    }

    /// Sends with per-message configuration (key, properties, delivery time, ...).
    pub async fn send_with_conf(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        conf: MessageConf,
    ) -> Result<MessageId> {
        self.send_message(topic, MessageSpec::new(payload).with_conf(conf))
            .await
    }

    /// Serializes `value` as JSON and sends it with the JSON schema.
    pub async fn send_json<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> Result<MessageId> {
        let payload = serde_json::to_vec(value)?;
        self.send_with_schema(topic, payload, Schema::json()).await
    }

    pub async fn send_default(&self, payload: impl Into<Bytes>) -> Result<MessageId> {
        let topic = self.require_default_topic()?;
        self.send(topic, payload).await
    }

    pub async fn send_default_with_schema(
        &self,
        payload: impl Into<Bytes>,
        schema: Schema,
    ) -> Result<MessageId> {
        let topic = self.require_default_topic()?;
        self.send_with_schema(topic, payload, schema).await
    }

    /// Sends an envelope, taking the topic from its headers or the default topic.
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<MessageId> {
        let message = self
            .converter
            .convert(envelope, self.default_topic())?;
        self.send_message(&message.topic, message.spec).await
    }

    /// Borrows the producer for `topic`, sends `spec` and waits for the receipt.
    pub async fn send_message(&self, topic: &str, spec: MessageSpec) -> Result<MessageId> {
        let lease = self.factory.acquire(topic).await?;
        let canonical = lease.topic().to_string();

        let result = lease.producer().send(spec).await;
        drop(lease);

        match result {
            Ok(id) => {
                debug!(topic = %canonical, message_id = %id, "Message acknowledged");
                Ok(id)
            }
            Err(e) => {
                warn!(topic = %canonical, error = %e, "Send message failed");
                Err(Error::publish(canonical, e))
            }
        }
    }

    // -- Pipelined sends --

    pub async fn send_async(&self, topic: &str, payload: impl Into<Bytes>) -> Result<SendFuture> {
        self.send_message_async(topic, MessageSpec::new(payload)).await
    }

    pub async fn send_with_schema_async(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        schema: Schema,
    ) -> Result<SendFuture> {
        self.send_message_async(topic, MessageSpec::new(payload).with_schema(schema))
            .await
    }

    pub async fn send_with_conf_async(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        conf: MessageConf,
    ) -> Result<SendFuture> {
        self.send_message_async(topic, MessageSpec::new(payload).with_conf(conf))
            .await
    }

    pub async fn send_default_async(&self, payload: impl Into<Bytes>) -> Result<SendFuture> {
        let topic = self.require_default_topic()?;
        self.send_async(topic, payload).await
    }

    pub async fn send_default_with_schema_async(
        &self,
        payload: impl Into<Bytes>,
        schema: Schema,
    ) -> Result<SendFuture> {
        let topic = self.require_default_topic()?;
        self.send_with_schema_async(topic, payload, schema).await
    }

    pub async fn send_envelope_async(&self, envelope: &Envelope) -> Result<SendFuture> {
        let message = self
            .converter
            .convert(envelope, self.default_topic())?;
        self.send_message_async(&message.topic, message.spec).await
    }

    /// Borrows the producer for `topic` and dispatches `spec` without waiting
    /// for the receipt.
    ///
    /// Errors returned here happen before dispatch (closed factory, producer
    /// creation). Dispatch failures, including a full producer queue, reject
    /// the returned future instead.
    pub async fn send_message_async(&self, topic: &str, spec: MessageSpec) -> Result<SendFuture> {
        let lease = self.factory.acquire(topic).await?;
        let canonical = lease.topic().to_string();
        let (tx, rx) = oneshot::channel();

        match lease.handle().dispatch_mode() {
            DispatchMode::Pipelined => {
                let receipt = match lease.producer().send_async(spec).await {
                    Ok(receipt) => receipt,
                    Err(e) => {
                        drop(lease);
                        warn!(topic = %canonical, error = %e, "Enqueue message failed");
                        return Ok(SendFuture::ready(canonical.clone(), Err(Error::publish(canonical, e))));
                    }
                };
                tokio::spawn(complete(lease, tx, receipt));
            }
            DispatchMode::Sequential => {
                tokio::spawn(async move {
                    let result = lease.producer().send(spec).await;
                    complete(lease, tx, async move { result }).await
                });
            }
        }

        Ok(SendFuture {
            topic: canonical,
            outcome: rx,
        })
    }
}

/// Awaits a receipt, releases the lease, then publishes the outcome.
async fn complete<F>(lease: ProducerLease, tx: oneshot::Sender<Result<MessageId>>, receipt: F)
where
    F: Future<Output = std::result::Result<MessageId, ClientError>>,
{
    let result = receipt.await;
    let canonical = lease.topic().to_string();
    drop(lease);

    let outcome = match result {
        Ok(id) => {
            debug!(topic = %canonical, message_id = %id, "Message acknowledged");
            Ok(id)
        }
        Err(e) => {
            warn!(topic = %canonical, error = %e, "Send message failed");
            Err(Error::publish(canonical, e))
        }
    };

    if tx.send(outcome).is_err() {
        debug!("Send outcome dropped, caller no longer waiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::headers;
    use crate::test_utils::RecordingClient;
    use serde_json::json;

    fn template(client: &Arc<RecordingClient>) -> PulsarTemplate {
        let factory = Arc::new(ProducerFactory::new(client.clone(), Schema::bytes()));
        PulsarTemplate::new(factory)
    }

    #[tokio::test]
    async fn test_send_reuses_producer() {
        let client = Arc::new(RecordingClient::default());
        let template = template(&client);

        let first = template.send("foo", "one").await.unwrap();
        let second = template.send("persistent://public/default/foo", "two").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(client.creations(), 1);

        let producer = client.created()[0].2.clone();
        assert_eq!(producer.sent().len(), 2);
        assert_eq!(producer.close_count(), 0);
        assert_eq!(template.factory().cached_producers()[0].active_borrows(), 0);
    }

    #[tokio::test]
    async fn test_send_default_without_topic_fails_early() {
        let client = Arc::new(RecordingClient::default());
        let template = template(&client);

        assert!(matches!(template.send_default("x").await, Err(Error::NoDefaultTopic)));
        assert!(matches!(template.send_default_async("x").await, Err(Error::NoDefaultTopic)));
        assert!(matches!(
            template.send_default_with_schema("x", Schema::string()).await,
            Err(Error::NoDefaultTopic)
        ));
        assert_eq!(client.creations(), 0);
    }

    #[tokio::test]
    async fn test_send_async_sequential_producer() {
        let client = Arc::new(RecordingClient::default());
        let template = template(&client).with_default_topic("orders");

        let pending = template.send_default_async("payload").await.unwrap();
        assert_eq!(pending.topic(), "persistent://public/default/orders");
        let id = pending.await.unwrap();

        assert_eq!(id.entry_id, 0);
        assert_eq!(template.factory().cached_producers()[0].active_borrows(), 0);
    }

    #[tokio::test]
    async fn test_send_json_sets_schema_override() {
        let client = Arc::new(RecordingClient::default());
        let template = template(&client);

        template
            .send_json("events", &json!({"kind": "created", "id": 7}))
            .await
            .unwrap();

        let sent = client.created()[0].2.sent();
        assert_eq!(sent[0].schema, Some(Schema::json()));
        let decoded: serde_json::Value = serde_json::from_slice(&sent[0].payload).unwrap();
        assert_eq!(decoded["id"], 7);
    }

    #[tokio::test]
    async fn test_send_envelope_uses_header_topic_and_conf() {
        let client = Arc::new(RecordingClient::default());
        let template = template(&client).with_default_topic("fallback");

        let envelope = Envelope::new("body")
            .with_header(headers::TOPIC, "gold/silver/bar")
            .with_header(headers::KEY, "k1");
        template.send_envelope(&envelope).await.unwrap();

        let (topic, _, producer) = client.created().remove(0);
        assert_eq!(topic, "persistent://gold/silver/bar");
        assert_eq!(producer.sent()[0].conf["key"], json!("k1"));
    }

    #[tokio::test]
    async fn test_malformed_envelope_touches_nothing() {
        let client = Arc::new(RecordingClient::default());
        let template = template(&client).with_default_topic("fallback");

        let envelope = Envelope::new("body").with_header(headers::TOPIC, false);
        assert!(matches!(
            template.send_envelope_async(&envelope).await,
            Err(Error::MalformedHeader { .. })
        ));
        assert_eq!(client.creations(), 0);
    }

    #[tokio::test]
    async fn test_from_config_default_topic() {
        let client = Arc::new(RecordingClient::default());
        let factory = Arc::new(ProducerFactory::new(client.clone(), Schema::bytes()));
        let config = TemplateConfig {
            default_topic: Some("orders".to_string()),
        };

        let template = PulsarTemplate::from_config(factory, &config);
        assert_eq!(template.default_topic(), Some("orders"));
    }
}
