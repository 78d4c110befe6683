use crate::client::{ClientError, MessageId, Producer, PulsarClient};
use crate::message::MessageSpec;
use crate::schema::Schema;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Producer that acknowledges every message with an increasing entry id.
pub struct RecordingProducer {
    topic: String,
    next_entry: AtomicU64,
    sent: Mutex<Vec<MessageSpec>>,
    closes: AtomicUsize,
}

impl RecordingProducer {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            next_entry: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<MessageSpec> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Producer for RecordingProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, message: MessageSpec) -> Result<MessageId, ClientError> {
        self.sent.lock().unwrap().push(message);
        Ok(MessageId::new(1, self.next_entry.fetch_add(1, Ordering::SeqCst)))
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Client creating [`RecordingProducer`]s, optionally failing the first creations.
#[derive(Default)]
pub struct RecordingClient {
    created: Mutex<Vec<(String, Schema, Arc<RecordingProducer>)>>,
    failures_left: AtomicUsize,
}

impl RecordingClient {
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    pub fn creations(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn created(&self) -> Vec<(String, Schema, Arc<RecordingProducer>)> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PulsarClient for RecordingClient {
    async fn new_producer(
        &self,
        topic: &str,
        schema: &Schema,
    ) -> Result<Arc<dyn Producer>, ClientError> {
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(ClientError::Connection("broker unavailable".to_string()));
        }

        let producer = Arc::new(RecordingProducer::new(topic));
        self.created
            .lock()
            .unwrap()
            .push((topic.to_string(), schema.clone(), producer.clone()));
        Ok(producer)
    }
}
