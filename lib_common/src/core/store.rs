//! # Missed Notification Store
//!
//! When a nudge cannot be pushed live, the dispatcher hands it here so the
//! client can fetch it later through the read path. The trait is the seam for a
//! durable backend; `MemoryNotificationStore` keeps everything in process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::rules::Frequency;

/// Default number of notifications kept per user.
pub const DEFAULT_PER_USER_CAPACITY: usize = 100;

/// A nudge that missed its live delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNotification {
    /// Recipient.
    pub user_id: String,
    /// Rule that produced the nudge.
    pub rule_id: String,
    /// The rule's advisory frequency.
    pub frequency: Frequency,
    /// Message text.
    pub message: String,
    /// When the dispatch was attempted.
    pub created_at: DateTime<FixedOffset>,
}

/// Storage for missed notifications.
pub trait NotificationStore: Send + Sync {
    /// Appends a notification.
    fn save(&self, notification: StoredNotification);
    /// Every stored notification for `user_id`, oldest first.
    fn list(&self, user_id: &str) -> Vec<StoredNotification>;
    /// Deletes every stored notification for `user_id` and returns how many there were.
    fn clear(&self, user_id: &str) -> usize;
}

/// In-process store, capped per user. When a user's list is full the oldest
/// notification is dropped.
#[derive(Debug)]
pub struct MemoryNotificationStore {
    per_user_capacity: usize,
    inner: Mutex<HashMap<String, Vec<StoredNotification>>>,
}

impl MemoryNotificationStore {
    /// Creates a store keeping at most `per_user_capacity` notifications per user.
    pub fn new(per_user_capacity: usize) -> Self {
        Self {
            per_user_capacity: per_user_capacity.max(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<StoredNotification>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_PER_USER_CAPACITY)
    }
}

impl NotificationStore for MemoryNotificationStore {
    fn save(&self, notification: StoredNotification) {
        let mut inner = self.lock();
        let pending = inner.entry(notification.user_id.clone()).or_default();
        if pending.len() >= self.per_user_capacity {
            let overflow = pending.len() + 1 - self.per_user_capacity;
            pending.drain(..overflow);
            log::debug!("Store full for '{}'; dropped {} oldest", notification.user_id, overflow);
        }
        pending.push(notification);
    }

    fn list(&self, user_id: &str) -> Vec<StoredNotification> {
        self.lock().get(user_id).cloned().unwrap_or_default()
    }

    fn clear(&self, user_id: &str) -> usize {
        self.lock().remove(user_id).map(|pending| pending.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(user: &str, message: &str) -> StoredNotification {
        StoredNotification {
            user_id: user.to_string(),
            rule_id: "goal_reminder".to_string(),
            frequency: Frequency::Daily,
            message: message.to_string(),
            created_at: DateTime::parse_from_rfc3339("2026-06-01T10:00:00+00:00").unwrap(),
        }
    }

    #[test]
    fn test_save_list_clear() {
        let store = MemoryNotificationStore::default();
        store.save(note("u1", "first"));
        store.save(note("u1", "second"));
        store.save(note("u2", "other"));

        let messages: Vec<_> = store.list("u1").into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(store.clear("u1"), 2);
        assert!(store.list("u1").is_empty());
        assert_eq!(store.clear("u1"), 0);
        assert_eq!(store.list("u2").len(), 1);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let store = MemoryNotificationStore::new(2);
        store.save(note("u1", "a"));
        store.save(note("u1", "b"));
        store.save(note("u1", "c"));
        let messages: Vec<_> = store.list("u1").into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["b", "c"]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(note("u1", "hi")).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["ruleId"], "goal_reminder");
        assert_eq!(value["frequency"], "daily");
    }
}
