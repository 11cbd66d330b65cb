//! The connection registry: one optional broadcaster slot plus the set of
//! listener connections keyed by generated identity.
//!
//! The registry is a plain structure with no interior locking; the router
//! owns it behind a single mutex so every mutation is serialized. The
//! router's role state machine guarantees a handle appears in at most one
//! of {broadcaster slot, listener map} by always vacating the previous
//! role before assigning a new one.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::connection::{ConnectionHandle, ListenerId};

/// Role state for the session: who broadcasts, who listens.
#[derive(Default)]
pub struct Registry {
    broadcaster: Option<ConnectionHandle>,
    listeners: HashMap<ListenerId, ConnectionHandle>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally occupy the broadcaster slot.
    ///
    /// Returns the displaced occupant, if any. The displaced connection is
    /// not closed: it is orphaned and will be reaped by its own
    /// disconnect or heartbeat timeout.
    pub fn set_broadcaster(&mut self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let displaced = self.broadcaster.replace(handle);
        if let Some(prev) = &displaced {
            info!(connection = %prev.id(), "Broadcaster slot supplanted");
        } else {
            info!("Broadcaster registered");
        }
        displaced
    }

    /// Vacate the broadcaster slot.
    pub fn clear_broadcaster(&mut self) -> Option<ConnectionHandle> {
        let cleared = self.broadcaster.take();
        if cleared.is_some() {
            info!("Broadcaster offline");
        }
        cleared
    }

    /// The current broadcaster, if present.
    #[must_use]
    pub fn broadcaster(&self) -> Option<&ConnectionHandle> {
        self.broadcaster.as_ref()
    }

    /// Whether a broadcaster currently occupies the slot.
    #[must_use]
    pub fn is_broadcasting(&self) -> bool {
        self.broadcaster.is_some()
    }

    /// Insert a listener under a freshly generated identity.
    pub fn insert_listener(&mut self, handle: ConnectionHandle) -> ListenerId {
        let id = ListenerId::generate();
        debug!(connection = %handle.id(), identity = %id, "Listener registered");
        self.listeners.insert(id.clone(), handle);
        id
    }

    /// Resolve a listener by identity. Absence is not an error; the caller
    /// treats it as a no-op delivery.
    #[must_use]
    pub fn lookup_listener(&self, id: &ListenerId) -> Option<&ConnectionHandle> {
        self.listeners.get(id)
    }

    /// Remove a listener by identity.
    pub fn remove_listener(&mut self, id: &ListenerId) -> Option<ConnectionHandle> {
        let removed = self.listeners.remove(id);
        if removed.is_some() {
            debug!(identity = %id, "Listener removed");
        }
        removed
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// All registered listeners.
    pub fn listeners(&self) -> impl Iterator<Item = (&ListenerId, &ConnectionHandle)> {
        self.listeners.iter()
    }
}
