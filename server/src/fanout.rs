use std::collections::HashMap;
use std::sync::Arc;

use dcs_protocol::SubscribeMode;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::model::{diff_merge_patch, filter_top_level};

/// Per-subscriber delivery state: what was last actually sent, and a
/// single-entry latest-wins pending slot. Recomputing the outgoing frame
/// against `last_delivered` at drain time (rather than merging frames as
/// they arrive) is what makes "keep only the latest" correct: a pending
/// snapshot already reflects every update since the last delivery, so
/// overwriting it on each publish never drops a key.
pub struct Subscriber {
    mode: SubscribeMode,
    filter: Option<Vec<String>>,
    last_delivered: Mutex<Value>,
    pending: Mutex<Option<Value>>,
    notify: Notify,
}

impl Subscriber {
    fn new(mode: SubscribeMode, filter: Option<Vec<String>>, initial_snapshot: Value) -> Self {
        Self {
            mode,
            filter,
            last_delivered: Mutex::new(initial_snapshot),
            pending: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Record a new global snapshot as this subscriber's next thing to
    /// send, overwriting whatever was already pending.
    pub async fn publish(&self, snapshot: Value) {
        *self.pending.lock().await = Some(snapshot);
        self.notify.notify_one();
    }

    /// Block until a snapshot has been published since the last delivery,
    /// then return the frame to send (full snapshot or merge-patch,
    /// per this subscriber's mode) and mark it delivered. Returns `None`
    /// if `cancellation` fires first (the connection is shutting down).
    ///
    /// Callers must only call this again after the corresponding
    /// acknowledge has been received; that serialization is what gives
    /// per-subscriber backpressure, not anything in this type.
    pub async fn next_frame(&self, cancellation: &CancellationToken) -> Option<Value> {
        loop {
            let snapshot = self.pending.lock().await.take();
            if let Some(snapshot) = snapshot {
                let frame = {
                    let last = self.last_delivered.lock().await;
                    match self.mode {
                        SubscribeMode::Full => snapshot.clone(),
                        SubscribeMode::Patch => {
                            let patch = diff_merge_patch(&last, &snapshot);
                            filter_top_level(patch, self.filter.as_deref())
                        }
                    }
                };
                *self.last_delivered.lock().await = snapshot;
                return Some(frame);
            }
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }
}

/// Registry of live subscribers, keyed by connection id. `publish` fans a
/// new global snapshot out to every registered subscriber's pending slot.
pub struct Fanout {
    subscribers: RwLock<HashMap<u32, Arc<Subscriber>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self { subscribers: RwLock::new(HashMap::new()) }
    }

    pub async fn register(
        &self,
        connection_id: u32,
        mode: SubscribeMode,
        filter: Option<Vec<String>>,
        initial_snapshot: Value,
    ) -> Arc<Subscriber> {
        let subscriber = Arc::new(Subscriber::new(mode, filter, initial_snapshot));
        self.subscribers.write().await.insert(connection_id, subscriber.clone());
        subscriber
    }

    pub async fn unregister(&self, connection_id: u32) {
        self.subscribers.write().await.remove(&connection_id);
    }

    pub async fn publish(&self, snapshot: Value) {
        let subscribers: Vec<Arc<Subscriber>> =
            self.subscribers.read().await.values().cloned().collect();
        for subscriber in subscribers {
            subscriber.publish(snapshot.clone()).await;
        }
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}
