//! Routing of gateway notifications to per-registration streams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chainevents_core::Category;
use futures::channel::mpsc;
use serde_json::Value;

struct SubscriptionEntry {
    category: Category,
    sender: mpsc::UnboundedSender<Value>,
}

/// Maps gateway subscription IDs to the channel feeding their stream.
///
/// Notifications for an ID that is not (or no longer) registered are dropped.
#[derive(Clone, Default)]
pub struct SubscriptionManager {
    entries: Arc<Mutex<HashMap<String, SubscriptionEntry>>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, SubscriptionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start routing notifications for `id`.
    pub fn register(&self, id: String, category: Category) -> mpsc::UnboundedReceiver<Value> {
        let (sender, rx) = mpsc::unbounded();
        self.entries()
            .insert(id, SubscriptionEntry { category, sender });
        rx
    }

    /// Forward a notification. Returns `false` if nobody receives it.
    pub fn dispatch(&self, id: &str, message: Value) -> bool {
        match self.entries().get(id) {
            Some(entry) => entry.sender.unbounded_send(message).is_ok(),
            None => {
                tracing::debug!(subscription = id, "notification for unknown subscription");
                false
            }
        }
    }

    /// Stop routing for `id`, which ends its stream.
    pub fn remove(&self, id: &str) -> Option<Category> {
        self.entries().remove(id).map(|e| e.category)
    }

    /// Drop every entry, ending all streams. Used when the connection goes away.
    pub fn close_all(&self) -> usize {
        let mut entries = self.entries();
        let n = entries.len();
        entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
