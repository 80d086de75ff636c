//! Change hub: fan-out of `ChangeEvent`s to per-owner subscriptions.
//!
//! DESIGN
//! ======
//! Subscribers are keyed by owner, then by handle. Publishing never awaits:
//! each subscriber has a bounded queue fed with `try_send`. A full queue
//! already holds a change the receiver has not seen, so dropping the new
//! event only coalesces re-fetches.
//!
//! `publish_resync` covers gaps in the upstream feed (a dropped database
//! connection): every subscriber gets a `Resync` event and re-fetches.
//!
//! Dropping a `Subscription` unregisters it, so a view that goes away
//! without an explicit unsubscribe still stops receiving events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ChangeEvent, ChangeKind, EventMask};

const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Opaque identifier for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub owner_id: Uuid,
    id: u64,
}

struct Subscriber {
    mask: EventMask,
    tx: mpsc::Sender<ChangeEvent>,
}

type Registry = HashMap<Uuid, HashMap<u64, Subscriber>>;

struct HubInner {
    subscribers: Mutex<Registry>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

/// In-process change fan-out. Clone is cheap; clones share subscribers.
#[derive(Clone)]
pub struct ChangeHub {
    inner: Arc<HubInner>,
}

impl ChangeHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a hub whose per-subscriber queues hold `queue_capacity` events.
    #[must_use]
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    /// Register a subscription for `owner_id` events matching `mask`.
    #[must_use]
    pub fn subscribe(&self, owner_id: Uuid, mask: EventMask) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
        self.lock()
            .entry(owner_id)
            .or_default()
            .insert(id, Subscriber { mask, tx });

        debug!(%owner_id, subscription = id, "change subscription opened");
        Subscription { handle: SubscriptionHandle { owner_id, id }, rx, hub: self.clone() }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = self.lock();
        let Some(owner_subs) = subscribers.get_mut(&handle.owner_id) else {
            return false;
        };
        let removed = owner_subs.remove(&handle.id).is_some();
        if owner_subs.is_empty() {
            subscribers.remove(&handle.owner_id);
        }
        if removed {
            debug!(owner_id = %handle.owner_id, subscription = handle.id, "change subscription closed");
        }
        removed
    }

    /// Deliver `event` to every matching subscription. Returns the number reached.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let subscribers = self.lock();
        let Some(owner_subs) = subscribers.get(&event.owner_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, sub) in owner_subs {
            if !sub.mask.contains(event.kind) {
                continue;
            }
            match sub.tx.try_send(event) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(owner_id = %event.owner_id, subscription = id, "change queue full; coalescing event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(owner_id = %event.owner_id, subscription = id, "change receiver closed");
                }
            }
        }
        delivered
    }

    /// Tell every subscription, of every owner, to re-read its list.
    /// Returns the number reached.
    pub fn publish_resync(&self) -> usize {
        let owners: Vec<Uuid> = self.lock().keys().copied().collect();
        let delivered = owners
            .into_iter()
            .map(|owner_id| self.publish(ChangeEvent { kind: ChangeKind::Resync, id: Uuid::nil(), owner_id }))
            .sum();
        info!(delivered, "change resync published");
        delivered
    }

    /// Number of live subscriptions for `owner_id`.
    #[cfg(test)]
    #[must_use]
    pub fn subscriber_count(&self, owner_id: Uuid) -> usize {
        self.lock().get(&owner_id).map_or(0, HashMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live change subscription. Unregisters itself on drop.
pub struct Subscription {
    handle: SubscriptionHandle,
    rx: mpsc::Receiver<ChangeEvent>,
    hub: ChangeHub,
}

impl Subscription {
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Wait for the next event. `None` once the subscription is torn down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.handle);
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
