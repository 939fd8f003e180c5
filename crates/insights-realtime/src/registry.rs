//! Channel registrations keyed by channel key.

use crate::{ChangeEvent, ChangeHandler, ChannelSpec};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

struct Registration {
    id: u64,
    spec: ChannelSpec,
    handler: ChangeHandler,
}

/// Holds at most one handler per channel key and routes events to them.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Registration>>,
    next_id: AtomicU64,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Returns the registration id and whether an
    /// earlier registration under the same key was superseded.
    pub fn register(&self, spec: ChannelSpec, handler: ChangeHandler) -> (u64, bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let key = spec.key.clone();
        let previous = self
            .channels
            .write()
            .insert(key.clone(), Registration { id, spec, handler });
        if previous.is_some() {
            debug!(key = %key, "Superseded channel registration");
        }
        (id, previous.is_some())
    }

    /// Remove the registration if `id` is still the current one for `key`.
    pub fn remove(&self, key: &str, id: u64) -> bool {
        let mut channels = self.channels.write();
        match channels.get(key) {
            Some(reg) if reg.id == id => {
                channels.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Whether `id` is the live registration for `key`.
    pub fn is_current(&self, key: &str, id: u64) -> bool {
        self.channels.read().get(key).is_some_and(|reg| reg.id == id)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.channels.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Specs of every live registration.
    pub fn specs(&self) -> Vec<ChannelSpec> {
        self.channels
            .read()
            .values()
            .map(|reg| reg.spec.clone())
            .collect()
    }

    /// Deliver to the registration for `key`. Returns false when none exists.
    pub fn dispatch_to(&self, key: &str, event: &ChangeEvent) -> bool {
        let handler = self
            .channels
            .read()
            .get(key)
            .map(|reg| reg.handler.clone());
        match handler {
            Some(handler) => {
                handler(event.clone());
                true
            }
            None => false,
        }
    }

    /// Deliver to every registration whose table and filter match the event.
    /// Returns the number of handlers invoked.
    pub fn dispatch_matching(&self, event: &ChangeEvent) -> usize {
        // Handlers run outside the lock so they may subscribe or close.
        let handlers: Vec<ChangeHandler> = self
            .channels
            .read()
            .values()
            .filter(|reg| spec_matches(&reg.spec, event))
            .map(|reg| reg.handler.clone())
            .collect();

        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.channels.read().keys().cloned().collect();
        f.debug_struct("ChannelRegistry").field("keys", &keys).finish()
    }
}

fn spec_matches(spec: &ChannelSpec, event: &ChangeEvent) -> bool {
    if spec.table != event.table {
        return false;
    }
    match &spec.filter {
        None => true,
        Some(filter) => [event.new.as_ref(), event.old.as_ref()]
            .into_iter()
            .flatten()
            .any(|row| filter.matches_row(row)),
    }
}
