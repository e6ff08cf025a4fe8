//! # Core Engine Module
//!
//! The stateful half of the nudge engine. Everything here is owned by one
//! long-lived service instance, constructed at startup and shared through
//! `Arc`s or cheap clones.
//!
//! ## Core Components:
//!
//! - **`registry`**: the presence registry. Maps each registered user to the one
//!   live push channel that currently represents them, and delivers frames to it
//!   without ever blocking.
//! - **`ledger`**: remembers when each (user, rule) pair was last sent so hourly
//!   and daily nudges are not repeated inside their period.
//! - **`store`**: keeps the nudges that could not be pushed live, for the
//!   "missed notifications" read path.
//! - **`sources`**: where `UserContext` snapshots come from.
//! - **`dispatcher`**: composes all of the above with the rule engine.

#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Live user-to-connection mapping with best-effort delivery.
pub mod registry;
/// Last-sent bookkeeping for hourly and daily nudges.
pub mod ledger;
/// Storage for notifications that missed their live delivery.
pub mod store;
/// Providers of `UserContext` snapshots.
pub mod sources;
/// Evaluate, deduplicate, deliver or store.
pub mod dispatcher;

// --- Public API Re-exports ---
pub use dispatcher::{DispatchSummary, NotificationDispatcher, NUDGE_EVENT};
pub use ledger::DeliveryLedger;
pub use registry::{ConnectionHandle, ConnectionId, Delivery, PresenceRegistry, PushFrame};
pub use sources::{ContextSource, ContextSourceError, JsonFileContextSource, StaticContextSource, UserSnapshot};
pub use store::{MemoryNotificationStore, NotificationStore, StoredNotification};
