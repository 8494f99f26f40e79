//! Publish/subscribe registry for inbound packets.
//!
//! Handlers run synchronously on the serve loop task, in registration order.
//! A handler that panics is logged and skipped; the remaining handlers still
//! run. Handlers must not block: use [`EventBus::subscribe_channel`] to hand
//! packets to an async consumer instead.
//!
//! # Thread Safety
//!
//! The registry sits behind a `RwLock`. `publish` works on a snapshot, so
//! handlers may subscribe or unsubscribe without deadlocking.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::identifiers::{OwnerId, SubscriptionId};
use crate::protocol::Packet;

use super::pattern::{Pattern, any_matches};

// ============================================================================
// Types
// ============================================================================

/// Packet handler callback.
pub type Handler = Arc<dyn Fn(&Packet) + Send + Sync>;

// ============================================================================
// Subscription
// ============================================================================

/// A registered (patterns, handler) pair.
struct Subscription {
    id: SubscriptionId,
    owner: Option<OwnerId>,
    patterns: Vec<Pattern>,
    handler: Handler,
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Returned by `subscribe`; pass to [`EventBus::unsubscribe`] to remove.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    owner: Option<OwnerId>,
}

impl SubscriptionHandle {
    /// The subscription's ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The owner given at subscribe time.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Fans inbound packets out to matching handlers.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("size", &self.size())
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for packets matching any of `patterns`.
    ///
    /// An empty pattern matches every packet; an empty pattern list matches
    /// none.
    pub fn subscribe<P, F>(
        &self,
        patterns: P,
        handler: F,
        owner: Option<OwnerId>,
    ) -> SubscriptionHandle
    where
        P: IntoIterator<Item = Pattern>,
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        let subscription = Subscription {
            id: SubscriptionId::generate(),
            owner,
            patterns: patterns.into_iter().collect(),
            handler: Arc::new(handler),
        };
        let handle = SubscriptionHandle {
            id: subscription.id,
            owner: subscription.owner.clone(),
        };

        debug!(
            id = %handle.id,
            owner = ?handle.owner,
            patterns = subscription.patterns.len(),
            "Subscription added"
        );

        self.subscriptions.write().push(Arc::new(subscription));
        handle
    }

    /// Registers a subscription that forwards matching packets into a channel.
    ///
    /// Packets are dropped silently once the receiver is gone; unsubscribe
    /// with the returned handle to release the slot.
    pub fn subscribe_channel<P>(
        &self,
        patterns: P,
        owner: Option<OwnerId>,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<Packet>)
    where
        P: IntoIterator<Item = Pattern>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(
            patterns,
            move |packet: &Packet| {
                let _ = tx.send(packet.clone());
            },
            owner,
        );
        (handle, rx)
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != handle.id);
        let removed = subscriptions.len() != before;

        if removed {
            debug!(id = %handle.id, "Subscription removed");
        }
        removed
    }

    /// Removes every subscription registered by `owner`.
    ///
    /// Returns the number removed.
    pub fn unsubscribe_owner(&self, owner: &OwnerId) -> usize {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.owner.as_ref() != Some(owner));
        let removed = before - subscriptions.len();

        debug!(%owner, removed, "Owner subscriptions removed");
        removed
    }

    /// Number of registered subscriptions.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Calls every matching handler with `packet`.
    ///
    /// Returns how many handlers ran (including ones that panicked).
    pub fn publish(&self, packet: &Packet) -> usize {
        let snapshot: Vec<Arc<Subscription>> = self.subscriptions.read().clone();
        let mut fired = 0;

        for subscription in snapshot
            .iter()
            .filter(|s| any_matches(&s.patterns, packet))
        {
            fired += 1;
            let handler = &subscription.handler;

            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(packet))) {
                error!(
                    id = %subscription.id,
                    panic = panic_message(&*payload),
                    "Event handler panicked"
                );
            }
        }

        trace!(fired, "Packet published");
        fired
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic>"
    }
}

// ============================================================================
// Tests
// ============================================================================
