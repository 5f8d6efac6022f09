// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Change notifications for the subscription registry.
//!
//! Observers subscribe explicitly and receive every event published after
//! they subscribed. Delivery is best-effort: events are not persisted, and a
//! subscription that has been dropped or unsubscribed receives nothing.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// A subscription registry mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryEvent {
    Created {
        user_id: String,
        subscription_id: String,
    },
    Updated {
        user_id: String,
        subscription_id: String,
    },
    Deleted {
        user_id: String,
        subscription_id: String,
    },
}

impl RegistryEvent {
    pub fn user_id(&self) -> &str {
        match self {
            RegistryEvent::Created { user_id, .. }
            | RegistryEvent::Updated { user_id, .. }
            | RegistryEvent::Deleted { user_id, .. } => user_id,
        }
    }

    pub fn subscription_id(&self) -> &str {
        match self {
            RegistryEvent::Created {
                subscription_id, ..
            }
            | RegistryEvent::Updated {
                subscription_id, ..
            }
            | RegistryEvent::Deleted {
                subscription_id, ..
            } => subscription_id,
        }
    }
}

/// Handle identifying one observer.
pub type SubscriberId = u64;

struct Subscriber {
    /// `None` observes every user
    user_id: Option<String>,
    tx: mpsc::UnboundedSender<RegistryEvent>,
}

#[derive(Default)]
struct Hub {
    next_id: AtomicU64,
    subscribers: DashMap<SubscriberId, Subscriber>,
}

/// Publish/subscribe hub shared by the registry and its observers.
#[derive(Clone, Default)]
pub struct RegistryEvents {
    hub: Arc<Hub>,
}

impl RegistryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe events for every user.
    pub fn subscribe(&self) -> EventSubscription {
        self.register(None)
    }

    /// Observe events for a single user.
    pub fn subscribe_user(&self, user_id: &str) -> EventSubscription {
        self.register(Some(user_id.to_string()))
    }

    fn register(&self, user_id: Option<String>) -> EventSubscription {
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub.subscribers.insert(id, Subscriber { user_id, tx });
        tracing::debug!(subscriber = id, "Registry observer subscribed");

        EventSubscription {
            id,
            receiver: rx,
            hub: Arc::downgrade(&self.hub),
        }
    }

    /// Stop delivering to `id`. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.hub.subscribers.remove(&id).is_some()
    }

    /// Deliver an event to every matching observer. Returns the delivery count.
    pub fn publish(&self, event: RegistryEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.hub.subscribers.iter() {
            let sub = entry.value();
            if sub
                .user_id
                .as_deref()
                .is_some_and(|uid| uid != event.user_id())
            {
                continue;
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(*entry.key()),
            }
        }

        // Removal happens after iteration; removing while holding a shard guard deadlocks.
        for id in closed {
            self.hub.subscribers.remove(&id);
        }

        tracing::debug!(?event, delivered, "Published registry event");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscribers.len()
    }
}

/// Receiving end of an observer registration. Dropping it unsubscribes.
pub struct EventSubscription {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<RegistryEvent>,
    hub: Weak<Hub>,
}

impl EventSubscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<RegistryEvent> {
        self.receiver.recv().await
    }

    /// Next already-delivered event, if any.
    pub fn try_recv(&mut self) -> Option<RegistryEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.subscribers.remove(&self.id);
        }
    }
}
