//! Non-evicting producer cache with single-flight creation.
//!
//! Each canonical topic maps to a slot (`Arc<OnceCell<ProducerHandle>>`). The
//! map lock is held only to find or insert a slot, never while a producer is
//! being created, so slow creations for one topic do not hold up others.
//! Concurrent first requests for one topic share a slot, and the cell runs a
//! single creation that all of them observe. A failed creation leaves the
//! cell empty, so the next request tries again.
//!
//! Entries only leave the cache through [`ProducerCache::drain`] and
//! [`ProducerCache::close`].

use crate::producer::ProducerHandle;
use crate::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

type Slot = Arc<OnceCell<ProducerHandle>>;

#[derive(Default)]
struct CacheState {
    slots: HashMap<String, Slot>,
    closed: bool,
}

/// What to do with a handle whose creation finished.
enum Placement {
    /// The handle is the one the cache holds for its topic.
    Cached(ProducerHandle),
    /// Another handle for the topic won; ours must be retired.
    Superseded {
        winner: ProducerHandle,
        loser: ProducerHandle,
    },
    /// The cache was closed while the handle was being created.
    Closed(ProducerHandle),
    /// A drain took the handle before it could be placed. It no longer
    /// grants leases, so callers look the topic up again.
    Retired(ProducerHandle),
}

#[derive(Default)]
pub struct ProducerCache {
    state: Mutex<CacheState>,
}

impl ProducerCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // The state stays consistent across a panic: every mutation is a
        // single map operation.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the handle cached for `topic`, running `create` on a miss.
    ///
    /// `topic` must already be canonical. Concurrent callers for the same topic
    /// share one `create` invocation and receive the same handle.
    pub async fn get_or_create<F, Fut>(&self, topic: &str, create: F) -> Result<ProducerHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProducerHandle>>,
    {
        let slot = self.slot(topic)?;

        if let Some(handle) = slot.get() {
            debug!(topic = %topic, "Producer cache hit");
            return Ok(handle.clone());
        }

        let handle = slot.get_or_try_init(create).await?.clone();

        match self.place(topic, &slot, handle) {
            Placement::Cached(handle) => Ok(handle),
            Placement::Superseded { winner, loser } => {
                debug!(topic = %topic, "Producer created across a reset was superseded");
                retire_logged(&loser).await;
                Ok(winner)
            }
            Placement::Closed(handle) => {
                retire_logged(&handle).await;
                Err(Error::FactoryClosed)
            }
            Placement::Retired(handle) => {
                debug!(topic = %topic, "Producer drained before placement");
                Ok(handle)
            }
        }
    }

    fn slot(&self, topic: &str) -> Result<Slot> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::FactoryClosed);
        }
        Ok(state
            .slots
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone())
    }

    /// Re-checks a finished creation against the current map.
    ///
    /// A drain may have detached the slot while creation was in flight. The
    /// handle is then adopted into the current map unless another handle for
    /// the topic is already there.
    fn place(&self, topic: &str, slot: &Slot, handle: ProducerHandle) -> Placement {
        let mut state = self.lock();
        if state.closed {
            return Placement::Closed(handle);
        }
        if handle.is_retiring() {
            if state.slots.get(topic).is_some_and(|current| Arc::ptr_eq(current, slot)) {
                state.slots.remove(topic);
            }
            return Placement::Retired(handle);
        }

        if let Some(current) = state.slots.get(topic) {
            if Arc::ptr_eq(current, slot) {
                return Placement::Cached(handle);
            }
            if let Some(existing) = current.get() {
                if existing.ptr_eq(&handle) {
                    return Placement::Cached(handle);
                }
                return Placement::Superseded {
                    winner: existing.clone(),
                    loser: handle,
                };
            }
        }

        state
            .slots
            .insert(topic.to_string(), Arc::new(OnceCell::new_with(Some(handle.clone()))));
        Placement::Cached(handle)
    }

    /// Point-in-time snapshot of every created handle.
    pub fn get_all(&self) -> Vec<ProducerHandle> {
        self.lock()
            .slots
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect()
    }

    pub fn get(&self, topic: &str) -> Option<ProducerHandle> {
        self.lock().slots.get(topic).and_then(|slot| slot.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.get_all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Swaps in an empty map and returns the handles that were cached.
    ///
    /// The returned handles stop granting leases before the lock is released.
    pub fn drain(&self) -> Vec<ProducerHandle> {
        let mut state = self.lock();
        take_handles(&mut state)
    }

    /// Like [`drain`](Self::drain), and rejects every later lookup.
    pub fn close(&self) -> Vec<ProducerHandle> {
        let mut state = self.lock();
        state.closed = true;
        take_handles(&mut state)
    }
}

fn take_handles(state: &mut CacheState) -> Vec<ProducerHandle> {
    let handles: Vec<ProducerHandle> = std::mem::take(&mut state.slots)
        .into_values()
        .filter_map(|slot| slot.get().cloned())
        .collect();
    for handle in &handles {
        handle.stop_leasing();
    }
    handles
}

async fn retire_logged(handle: &ProducerHandle) {
    if let Err(e) = handle.retire().await {
        warn!(topic = %handle.topic(), error = %e, "Could not close producer");
    }
}
