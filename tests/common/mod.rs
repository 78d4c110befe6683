#![allow(dead_code)]

use async_trait::async_trait;
use pulsar_template::client::{DispatchMode, Producer, PulsarClient, ReceiptFuture};
use pulsar_template::{ClientError, MessageId, MessageSpec, Schema};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// A latch that holds waiters until opened.
#[derive(Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn closed() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[derive(Default)]
pub struct Counters {
    pub creations: AtomicUsize,
    pub sends: AtomicUsize,
    pub closes: AtomicUsize,
    next_entry: AtomicU64,
}

#[derive(Default)]
struct Script {
    creation_failures: usize,
    send_failures: VecDeque<ClientError>,
    creation_gates: HashMap<String, Gate>,
    send_gate: Option<Gate>,
}

/// Wire client spy recording every interaction.
pub struct SpyClient {
    mode: DispatchMode,
    counters: Arc<Counters>,
    script: Arc<Mutex<Script>>,
    created: Mutex<Vec<(String, Schema)>>,
}

impl SpyClient {
    pub fn new() -> Arc<Self> {
        Self::with_mode(DispatchMode::Sequential)
    }

    pub fn pipelined() -> Arc<Self> {
        Self::with_mode(DispatchMode::Pipelined)
    }

    pub fn with_mode(mode: DispatchMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            counters: Arc::new(Counters::default()),
            script: Arc::new(Mutex::new(Script::default())),
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn creations(&self) -> usize {
        self.counters.creations.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.counters.sends.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn interactions(&self) -> usize {
        self.creations() + self.sends() + self.closes()
    }

    pub fn created_topics(&self) -> Vec<String> {
        self.created.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn fail_next_creations(&self, times: usize) {
        self.script.lock().unwrap().creation_failures = times;
    }

    pub fn fail_next_send(&self, error: ClientError) {
        self.script.lock().unwrap().send_failures.push_back(error);
    }

    /// Holds creation of producers for `topic` (canonical) until the gate opens.
    pub fn hold_creation(&self, topic: &str) -> Gate {
        let gate = Gate::closed();
        self.script
            .lock()
            .unwrap()
            .creation_gates
            .insert(topic.to_string(), gate.clone());
        gate
    }

    /// Holds every broker receipt until the gate opens.
    pub fn hold_receipts(&self) -> Gate {
        let gate = Gate::closed();
        self.script.lock().unwrap().send_gate = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl PulsarClient for SpyClient {
    async fn new_producer(
        &self,
        topic: &str,
        schema: &Schema,
    ) -> Result<Arc<dyn Producer>, ClientError> {
        self.counters.creations.fetch_add(1, Ordering::SeqCst);
        self.created
            .lock()
            .unwrap()
            .push((topic.to_string(), schema.clone()));

        let gate = self.script.lock().unwrap().creation_gates.get(topic).cloned();
        if let Some(gate) = gate {
            gate.wait().await;
        }

        {
            let mut script = self.script.lock().unwrap();
            if script.creation_failures > 0 {
                script.creation_failures -= 1;
                return Err(ClientError::Connection(format!("cannot reach broker for {}", topic)));
            }
        }

        Ok(Arc::new(SpyProducer {
            topic: topic.to_string(),
            mode: self.mode,
            counters: self.counters.clone(),
            script: self.script.clone(),
        }))
    }
}

struct SpyProducer {
    topic: String,
    mode: DispatchMode,
    counters: Arc<Counters>,
    script: Arc<Mutex<Script>>,
}

impl SpyProducer {
    /// Enqueue step: counts the send and pops a scripted failure, if any.
    fn enqueue(&self) -> (Option<ClientError>, Option<Gate>) {
        self.counters.sends.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        (script.send_failures.pop_front(), script.send_gate.clone())
    }

    fn receipt(counters: Arc<Counters>, gate: Option<Gate>, failure: Option<ClientError>) -> ReceiptFuture {
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.wait().await;
            }
            match failure {
                Some(e) => Err(e),
                None => Ok(MessageId::new(7, counters.next_entry.fetch_add(1, Ordering::SeqCst))),
            }
        })
    }
}

#[async_trait]
impl Producer for SpyProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn dispatch_mode(&self) -> DispatchMode {
        self.mode
    }

    async fn send(&self, _message: MessageSpec) -> Result<MessageId, ClientError> {
        let (failure, gate) = self.enqueue();
        Self::receipt(self.counters.clone(), gate, failure).await
    }

    async fn send_async(&self, _message: MessageSpec) -> Result<ReceiptFuture, ClientError> {
        let (failure, gate) = self.enqueue();
        // Queue saturation is detected at enqueue time.
        if let Some(ClientError::QueueFull(reason)) = &failure {
            return Err(ClientError::QueueFull(reason.clone()));
        }
        Ok(Self::receipt(self.counters.clone(), gate, failure))
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Polls `condition` until it holds or a second passes.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
