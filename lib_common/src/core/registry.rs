//! # Presence Registry
//!
//! Tracks which users currently have a live push channel and provides
//! best-effort, non-blocking delivery to them.
//!
//! ## Model:
//!
//! - A connection task (e.g. one WebSocket session) opens a [`ConnectionHandle`]
//!   and keeps the receiving half of its channel.
//! - When the client announces who it is, the task calls `register`. A user has
//!   at most one active handle; registering again replaces the old one
//!   (last-registration-wins).
//! - When the connection drops, the task only knows its own handle, so
//!   `unregister` works by connection id. A reverse index keeps that O(1).
//! - `dispatch` pushes a frame into the user's channel and returns immediately.
//!
//! Both indexes live behind one `Mutex`, so every operation is atomic to
//! concurrent callers. No critical section awaits or performs I/O.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// # Push Frame
///
/// One event pushed to a client: an event name and a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushFrame {
    /// Event name the client listens for, e.g. `"nudge"`.
    pub event: String,
    /// Arbitrary event payload.
    pub payload: Value,
}

/// # Connection Handle
///
/// Opaque handle to one open bidirectional channel. Cloning the handle does not
/// open a new channel; clones compare equal by [`ConnectionId`].
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<PushFrame>,
}

impl ConnectionHandle {
    /// Opens a new push channel.
    ///
    /// # Returns
    /// The handle to hand to the registry, and the receiver the connection task
    /// drains to forward frames to its client.
    pub fn open() -> (Self, mpsc::UnboundedReceiver<PushFrame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { id: ConnectionId::next(), sender }, receiver)
    }

    /// This handle's connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn push(&self, frame: PushFrame) -> bool {
        self.sender.send(frame).is_ok()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Outcome of a [`PresenceRegistry::dispatch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// The frame was handed to the user's live channel.
    Delivered,
    /// The user has no live channel; the caller should store the notification.
    Offline,
}

impl Delivery {
    /// `true` for [`Delivery::Delivered`].
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

#[derive(Default)]
struct Entries {
    by_user: HashMap<String, ConnectionHandle>,
    by_connection: HashMap<ConnectionId, String>,
}

impl Entries {
    /// Removes `user_id` only if it is still bound to `connection`.
    fn remove_if_bound(&mut self, user_id: &str, connection: ConnectionId) -> bool {
        let bound = self.by_user.get(user_id).map(ConnectionHandle::id) == Some(connection);
        if bound {
            self.by_user.remove(user_id);
        }
        bound
    }
}

/// # Presence Registry
///
/// Owned, lockable `userId -> ConnectionHandle` map. Clones share the same
/// underlying state.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Register
    ///
    /// Binds `user_id` to `handle`, replacing any previous handle for that user.
    ///
    /// If this same handle was earlier registered under a different user, that
    /// older binding is dropped, so one connection never speaks for two users.
    /// Empty user ids are ignored.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) {
        if user_id.is_empty() {
            log::warn!("Ignoring registration with an empty user id on {}", handle.id());
            return;
        }

        let connection = handle.id();
        let mut entries = self.lock();

        if let Some(previous_user) = entries.by_connection.get(&connection).cloned() {
            if previous_user != user_id && entries.remove_if_bound(&previous_user, connection) {
                log::info!("{} re-registered from '{}' to '{}'", connection, previous_user, user_id);
            }
        }

        if let Some(replaced) = entries.by_user.insert(user_id.to_string(), handle) {
            if replaced.id() != connection {
                entries.by_connection.remove(&replaced.id());
                log::info!("User '{}' moved from {} to {}", user_id, replaced.id(), connection);
            }
        }
        entries.by_connection.insert(connection, user_id.to_string());
        log::debug!("User '{}' registered on {}", user_id, connection);
    }

    /// # Unregister
    ///
    /// Removes whichever user is bound to `connection`. Unknown or stale
    /// connections are a no-op, so calling this twice is safe.
    ///
    /// # Returns
    /// The user id that went offline, if any.
    pub fn unregister(&self, connection: ConnectionId) -> Option<String> {
        let mut entries = self.lock();
        let user_id = entries.by_connection.remove(&connection)?;
        if entries.remove_if_bound(&user_id, connection) {
            log::debug!("User '{}' unregistered from {}", user_id, connection);
            Some(user_id)
        } else {
            None
        }
    }

    /// # Dispatch
    ///
    /// Pushes `(event, payload)` to the user's live channel, if there is one.
    ///
    /// Never blocks and never fails loudly. When the channel turns out to be
    /// closed (its connection task ended without unregistering) the stale entry
    /// is pruned and the call reports [`Delivery::Offline`].
    pub fn dispatch(&self, user_id: &str, event: &str, payload: Value) -> Delivery {
        let mut entries = self.lock();
        let Some(handle) = entries.by_user.get(user_id) else {
            log::debug!("User '{}' is offline; '{}' not pushed", user_id, event);
            return Delivery::Offline;
        };

        let frame = PushFrame { event: event.to_string(), payload };
        if handle.push(frame) {
            return Delivery::Delivered;
        }

        let connection = handle.id();
        entries.by_user.remove(user_id);
        entries.by_connection.remove(&connection);
        log::warn!("Dropped stale {} for user '{}'", connection, user_id);
        Delivery::Offline
    }

    /// Ids of every registered user, sorted. Diagnostic only.
    pub fn list_active(&self) -> Vec<String> {
        let mut users: Vec<String> = self.lock().by_user.keys().cloned().collect();
        users.sort();
        users
    }

    /// `true` when `user_id` has a registered channel.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.lock().by_user.contains_key(user_id)
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.lock().by_user.len()
    }

    /// `true` when nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Shutdown
    ///
    /// Drops every entry together with the senders stored for them. A channel
    /// whose only sender lived here is closed; a connection task that keeps its
    /// own handle (to re-register later) is not, and must stop on its own
    /// shutdown signal.
    ///
    /// # Returns
    /// The number of connections released.
    pub fn shutdown(&self) -> usize {
        let mut entries = self.lock();
        let released = entries.by_user.len();
        entries.by_user.clear();
        entries.by_connection.clear();
        log::info!("Presence registry shut down; released {} connection(s)", released);
        released
    }
}

impl fmt::Debug for PresenceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceRegistry").field("active", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use tokio::sync::mpsc::error::TryRecvError;

    #[test]
    fn test_register_then_dispatch_delivers_once() {
        let registry = PresenceRegistry::new();
        let (handle, mut rx) = ConnectionHandle::open();
        registry.register("alice", handle);

        let outcome = registry.dispatch("alice", "nudge", json!({"message": "drink water"}));
        assert_eq!(outcome, Delivery::Delivered);

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.event, "nudge");
        assert_eq!(frame.payload, json!({"message": "drink water"}));
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn test_reregister_routes_only_to_newest_handle() {
        let registry = PresenceRegistry::new();
        let (first, mut first_rx) = ConnectionHandle::open();
        let (second, mut second_rx) = ConnectionHandle::open();
        registry.register("bob", first);
        registry.register("bob", second);

        assert!(registry.dispatch("bob", "nudge", json!(1)).is_delivered());
        assert!(second_rx.try_recv().is_ok());
        assert!(first_rx.try_recv().is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_unregister_keeps_newer_entry() {
        let registry = PresenceRegistry::new();
        let (first, _first_rx) = ConnectionHandle::open();
        let (second, mut second_rx) = ConnectionHandle::open();
        let stale = first.id();
        registry.register("bob", first);
        registry.register("bob", second);

        assert_eq!(registry.unregister(stale), None);
        assert!(registry.dispatch("bob", "nudge", json!(null)).is_delivered());
        assert!(second_rx.try_recv().is_ok());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = PresenceRegistry::new();
        let (handle, _rx) = ConnectionHandle::open();
        let id = handle.id();
        registry.register("carol", handle);

        assert_eq!(registry.unregister(id), Some("carol".to_string()));
        assert_eq!(registry.unregister(id), None);
        assert!(registry.is_empty());
        assert_eq!(registry.dispatch("carol", "nudge", json!({})), Delivery::Offline);
    }

    #[test]
    fn test_dispatch_to_unknown_user_is_offline() {
        let registry = PresenceRegistry::new();
        assert_eq!(registry.dispatch("nobody", "nudge", json!({})), Delivery::Offline);
    }

    #[test]
    fn test_closed_channel_is_pruned() {
        let registry = PresenceRegistry::new();
        let (handle, rx) = ConnectionHandle::open();
        registry.register("dave", handle);
        drop(rx);

        assert_eq!(registry.dispatch("dave", "nudge", json!({})), Delivery::Offline);
        assert!(!registry.is_online("dave"));
    }

    #[test]
    fn test_handle_moving_to_another_user() {
        let registry = PresenceRegistry::new();
        let (handle, mut rx) = ConnectionHandle::open();
        registry.register("erin", handle.clone());
        registry.register("frank", handle);

        assert_eq!(registry.list_active(), vec!["frank".to_string()]);
        assert!(registry.dispatch("frank", "nudge", json!({})).is_delivered());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_empty_user_id_is_ignored() {
        let registry = PresenceRegistry::new();
        let (handle, _rx) = ConnectionHandle::open();
        registry.register("", handle);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_active_and_shutdown() {
        let registry = PresenceRegistry::new();
        let (a, mut a_rx) = ConnectionHandle::open();
        let (b, _b_rx) = ConnectionHandle::open();
        registry.register("zoe", a);
        registry.register("adam", b);
        assert_eq!(registry.list_active(), vec!["adam".to_string(), "zoe".to_string()]);

        assert_eq!(registry.shutdown(), 2);
        assert!(registry.is_empty());
        // Dropping the registry's sender closes the client's channel.
        assert_eq!(a_rx.try_recv().unwrap_err(), TryRecvError::Disconnected);
    }

    #[test]
    fn test_shutdown_leaves_channels_with_other_senders_open() {
        let registry = PresenceRegistry::new();
        let (handle, mut rx) = ConnectionHandle::open();
        let kept = handle.clone();
        registry.register("gina", handle);

        assert_eq!(registry.shutdown(), 1);
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        drop(kept);
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Disconnected);
    }

    #[test]
    fn test_concurrent_register_and_unregister() {
        let registry = PresenceRegistry::new();
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let mut receivers = Vec::new();
                    for i in 0..50 {
                        let (handle, rx) = ConnectionHandle::open();
                        let id = handle.id();
                        let user = format!("user-{}-{}", worker, i);
                        registry.register(&user, handle);
                        if i % 2 == 0 {
                            registry.unregister(id);
                        } else {
                            receivers.push(rx);
                        }
                    }
                    receivers
                })
            })
            .collect();

        let receivers: Vec<_> = workers.into_iter().flat_map(|w| w.join().unwrap()).collect();
        assert_eq!(registry.len(), 8 * 25);
        assert_eq!(receivers.len(), 8 * 25);
    }
}
