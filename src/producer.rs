//! Cache-owned producer handles and the leases callers borrow them through.
//!
//! A [`ProducerHandle`] is owned by the [`ProducerCache`](crate::cache::ProducerCache)
//! and is only ever physically closed by a factory reset or shutdown. Sends
//! borrow it through a [`ProducerLease`]; dropping the lease ends the borrow
//! and never closes anything.
//!
//! Retiring a handle (reset, shutdown) first stops new leases from being
//! granted, then waits for outstanding leases to drop before closing, so a
//! send that already holds a lease completes on an open producer.

use crate::client::{ClientError, DispatchMode, Producer};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

struct HandleInner {
    topic: String,
    producer: Arc<dyn Producer>,
    dispatch_mode: DispatchMode,
    borrows: AtomicUsize,
    retiring: AtomicBool,
    closed: AtomicBool,
    released: Notify,
}

/// Shared reference to one live producer. Clones refer to the same producer.
#[derive(Clone)]
pub struct ProducerHandle {
    inner: Arc<HandleInner>,
}

impl ProducerHandle {
    /// Wraps a freshly created producer.
    ///
    /// The producer's dispatch mode is read here, once.
    pub fn new(topic: impl Into<String>, producer: Arc<dyn Producer>) -> Self {
        let dispatch_mode = producer.dispatch_mode();
        Self {
            inner: Arc::new(HandleInner {
                topic: topic.into(),
                producer,
                dispatch_mode,
                borrows: AtomicUsize::new(0),
                retiring: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                released: Notify::new(),
            }),
        }
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.inner.dispatch_mode
    }

    /// Returns `true` if both handles refer to the same producer.
    pub fn ptr_eq(&self, other: &ProducerHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn active_borrows(&self) -> usize {
        self.inner.borrows.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Borrows the producer for one send.
    ///
    /// Returns `None` once the handle is being retired; the caller should look
    /// the topic up again.
    pub fn try_lease(&self) -> Option<ProducerLease> {
        self.inner.borrows.fetch_add(1, Ordering::SeqCst);
        if self.inner.retiring.load(Ordering::SeqCst) {
            self.end_borrow();
            return None;
        }
        trace!(topic = %self.inner.topic, "Leased producer");
        Some(ProducerLease {
            handle: self.clone(),
        })
    }

    fn end_borrow(&self) {
        if self.inner.borrows.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.released.notify_waiters();
        }
    }

    /// Stops granting new leases. Outstanding leases are unaffected.
    pub(crate) fn stop_leasing(&self) {
        self.inner.retiring.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_retiring(&self) -> bool {
        self.inner.retiring.load(Ordering::SeqCst)
    }

    /// Stops granting leases, waits for outstanding ones, then closes the producer.
    ///
    /// Returns `Ok(false)` if another caller already closed it.
    pub(crate) async fn retire(&self) -> Result<bool, ClientError> {
        self.stop_leasing();

        loop {
            let released = self.inner.released.notified();
            if self.inner.borrows.load(Ordering::SeqCst) == 0 {
                break;
            }
            released.await;
        }

        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.producer.close().await.map(|_| true)
    }
}

impl fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("topic", &self.inner.topic)
            .field("dispatch_mode", &self.inner.dispatch_mode)
            .field("borrows", &self.active_borrows())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A borrowed producer. Dropping it is the release step of a send.
pub struct ProducerLease {
    handle: ProducerHandle,
}

impl ProducerLease {
    pub fn handle(&self) -> &ProducerHandle {
        &self.handle
    }

    pub fn topic(&self) -> &str {
        self.handle.topic()
    }

    pub fn producer(&self) -> &Arc<dyn Producer> {
        &self.handle.inner.producer
    }
}

impl Drop for ProducerLease {
    fn drop(&mut self) {
        trace!(topic = %self.handle.topic(), "Released producer");
        self.handle.end_borrow();
    }
}

impl fmt::Debug for ProducerLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProducerLease").field(&self.handle).finish()
    }
}
