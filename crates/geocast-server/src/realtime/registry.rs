//! In-memory set of known client identifiers.
//!
//! Entries keep first-registration order and a last-seen instant. Without a
//! max-idle age the set only grows for the life of the process.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

#[derive(Default)]
struct Entries {
    order: Vec<String>,
    last_seen: HashMap<String, Instant>,
}

/// Insertion-ordered, de-duplicated registry of client ids.
pub struct SessionRegistry {
    entries: RwLock<Entries>,
    max_idle: Option<Duration>,
}

impl SessionRegistry {
    /// Registry that never expires entries.
    pub fn new() -> Self {
        Self::with_max_idle(None)
    }

    /// Registry whose snapshots leave out clients idle longer than
    /// `max_idle`.
    pub fn with_max_idle(max_idle: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            max_idle,
        }
    }

    /// Configured max-idle age.
    pub fn max_idle(&self) -> Option<Duration> {
        self.max_idle
    }

    /// Add `client_id` if absent and refresh its last-seen time.
    ///
    /// Returns `true` when the id was not known before.
    pub fn register(&self, client_id: &str) -> bool {
        self.register_at(client_id, Instant::now())
    }

    /// [`register`](Self::register) with an explicit clock reading.
    pub fn register_at(&self, client_id: &str, now: Instant) -> bool {
        let mut entries = self.entries.write();
        if let Some(seen) = entries.last_seen.get_mut(client_id) {
            *seen = now;
            return false;
        }
        entries.order.push(client_id.to_string());
        let _ = entries.last_seen.insert(client_id.to_string(), now);
        debug!(client_id, known = entries.order.len(), "client registered");
        true
    }

    /// Copy of every known id in registration order.
    pub fn list_all(&self) -> Vec<String> {
        self.entries.read().order.clone()
    }

    /// Copy of the ids seen within the max-idle age, in registration order.
    /// Equal to [`list_all`](Self::list_all) when no max-idle is set.
    pub fn list_active(&self, now: Instant) -> Vec<String> {
        let Some(max_idle) = self.max_idle else {
            return self.list_all();
        };
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter(|id| {
                entries
                    .last_seen
                    .get(*id)
                    .is_some_and(|seen| now.saturating_duration_since(*seen) <= max_idle)
            })
            .cloned()
            .collect()
    }

    /// Remove entries idle longer than the max-idle age. Returns how many
    /// were removed; always 0 when no max-idle is set.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// [`sweep_expired`](Self::sweep_expired) with an explicit clock reading.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let Some(max_idle) = self.max_idle else {
            return 0;
        };
        let mut entries = self.entries.write();
        let Entries { order, last_seen } = &mut *entries;
        let before = order.len();
        order.retain(|id| {
            let keep = last_seen
                .get(id)
                .is_some_and(|seen| now.saturating_duration_since(*seen) <= max_idle);
            if !keep {
                let _ = last_seen.remove(id);
            }
            keep
        });
        let removed = before - order.len();
        if removed > 0 {
            debug!(removed, remaining = order.len(), "swept idle clients");
        }
        removed
    }

    /// Whether `client_id` is known.
    pub fn contains(&self, client_id: &str) -> bool {
        self.entries.read().last_seen.contains_key(client_id)
    }

    /// Number of known ids.
    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    /// Whether no id is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
