//! Fan-out of live board events to connected subscribers.
//!
//! Every subscriber owns a bounded queue. [`BroadcastHub::publish`] never
//! waits: an event is pushed with `try_send`, a subscriber whose queue is
//! closed is pruned, and a subscriber whose queue is full is dropped as
//! saturated so one slow connection cannot stall the rest. Dropping the
//! sender side closes that subscriber's stream, which ends its connection
//! task.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

/// Default number of queued events per subscriber before it is dropped.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// An event pushed to every live subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BoardEvent {
    /// A placement was accepted.
    Pixel {
        /// Column of the changed cell.
        x: u32,
        /// Row of the changed cell.
        y: u32,
        /// New color id of the cell.
        color: u8,
    },
    /// An operator-issued message.
    Alert {
        /// Text shown to every client.
        message: String,
    },
}

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<BoardEvent>,
}

impl Subscription {
    /// The id to pass to [`BroadcastHub::unsubscribe`].
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. `None` once the hub has dropped this
    /// subscriber.
    pub async fn recv(&mut self) -> Option<BoardEvent> {
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<BoardEvent> {
        self.rx.try_recv().ok()
    }
}

/// Registry of live subscribers.
#[derive(Debug)]
pub struct BroadcastHub {
    buffer: usize,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<BoardEvent>>>,
}

impl BroadcastHub {
    /// Create a hub whose subscribers may queue up to `buffer` events.
    ///
    /// A zero buffer is raised to one.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = SubscriberId::new();
        self.lock().insert(id, tx);
        debug!(subscriber = %id, "subscriber registered");
        Subscription { id, rx }
    }

    /// Remove a subscriber. Removing an unknown id is a no-op.
    ///
    /// Returns whether the id was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, "subscriber removed");
        }
        removed
    }

    /// Deliver `event` to every registered subscriber.
    ///
    /// Closed subscribers are pruned silently and saturated ones are
    /// dropped. Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: &BoardEvent) -> usize {
        let mut subscribers = self.lock();
        let mut delivered = 0usize;
        subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered = delivered.saturating_add(1);
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = %id, "pruned closed subscriber");
                false
            }
            Err(TrySendError::Full(_)) => {
                debug!(subscriber = %id, "dropped saturated subscriber");
                false
            }
        });
        delivered
    }

    /// Broadcast an operator alert through the same fan-out path.
    pub fn alert(&self, message: impl Into<String>) -> usize {
        self.publish(&BoardEvent::Alert {
            message: message.into(),
        })
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<BoardEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}
