use crate::cache::ProducerCache;
use crate::client::PulsarClient;
use crate::config::ProducerConfig;
use crate::producer::{ProducerHandle, ProducerLease};
use crate::schema::Schema;
use crate::topic::canonicalize;
use crate::{Error, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Creates producers on first use of a topic and keeps them for reuse.
///
/// Producers stay open until [`reset`](Self::reset) or
/// [`shutdown`](Self::shutdown); nothing else closes them.
pub struct ProducerFactory {
    client: Arc<dyn PulsarClient>,
    schema: Schema,
    cache: ProducerCache,
}

impl ProducerFactory {
    pub fn new(client: Arc<dyn PulsarClient>, schema: Schema) -> Self {
        Self::with_cache(client, schema, ProducerCache::new())
    }

    pub fn with_cache(client: Arc<dyn PulsarClient>, schema: Schema, cache: ProducerCache) -> Self {
        Self {
            client,
            schema,
            cache,
        }
    }

    pub fn from_config(client: Arc<dyn PulsarClient>, config: &ProducerConfig) -> Self {
        Self::new(client, config.schema.clone())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the cached producer for `topic`, creating it if none exists.
    ///
    /// The topic is canonicalized first, so `foo` and
    /// `persistent://public/default/foo` share one producer. Creation errors
    /// are returned as [`Error::ProducerCreation`] and not cached.
    #[instrument(skip(self), fields(canonical = tracing::field::Empty))]
    pub async fn create_producer(&self, topic: &str) -> Result<ProducerHandle> {
        let canonical = canonicalize(topic);
        tracing::Span::current().record("canonical", canonical.as_str());

        loop {
            let handle = self
                .cache
                .get_or_create(&canonical, || self.do_create_producer(&canonical))
                .await?;
            if !handle.is_retiring() {
                return Ok(handle);
            }
            // A concurrent reset drained it before it could be cached.
            debug!(topic = %canonical, "Producer drained during creation, retrying");
        }
    }

    async fn do_create_producer(&self, canonical: &str) -> Result<ProducerHandle> {
        debug!("Creating producer for '{}'", canonical);
        let producer = self
            .client
            .new_producer(canonical, &self.schema)
            .await
            .map_err(|e| {
                error!("Could not create producer for '{}': {}", canonical, e);
                Error::creation(canonical, e)
            })?;

        info!(
            topic = %canonical,
            dispatch_mode = ?producer.dispatch_mode(),
            "Created producer"
        );
        Ok(ProducerHandle::new(canonical, producer))
    }

    /// Looks up the producer for `topic` and borrows it for one send.
    pub async fn acquire(&self, topic: &str) -> Result<ProducerLease> {
        loop {
            let handle = self.create_producer(topic).await?;
            if let Some(lease) = handle.try_lease() {
                return Ok(lease);
            }
            // Retired between lookup and lease; the cache no longer holds it.
            debug!(topic = %handle.topic(), "Producer retired during lookup, retrying");
        }
    }

    /// Point-in-time snapshot of the cached producers.
    pub fn cached_producers(&self) -> Vec<ProducerHandle> {
        self.cache.get_all()
    }

    pub fn is_closed(&self) -> bool {
        self.cache.is_closed()
    }

    /// Empties the cache and closes every producer it held.
    ///
    /// Later lookups create fresh producers. Sends already holding a producer
    /// finish before it is closed. Returns the number of producers closed.
    pub async fn reset(&self) -> usize {
        let handles = self.cache.drain();
        info!("Resetting producer factory, closing {} producers", handles.len());
        close_all(handles).await
    }

    /// Closes every cached producer and rejects all later requests with
    /// [`Error::FactoryClosed`]. Safe to call more than once.
    pub async fn shutdown(&self) -> usize {
        let handles = self.cache.close();
        info!("Shutting down producer factory, closing {} producers", handles.len());
        close_all(handles).await
    }
}

async fn close_all(handles: Vec<ProducerHandle>) -> usize {
    let results = join_all(handles.iter().map(|handle| handle.retire())).await;

    let mut closed = 0;
    for (handle, result) in handles.iter().zip(results) {
        match result {
            Ok(true) => closed += 1,
            Ok(false) => {}
            Err(e) => error!(topic = %handle.topic(), error = %e, "Could not close producer"),
        }
    }
    closed
}
