//! # lib_common
//!
//! Shared engine for the wellness companion backend. The crate is split in two
//! feature-gated halves:
//!
//! - **`rules`**: the pure nudge rule engine. Takes a `UserContext` snapshot and
//!   produces the nudges that should be sent, with no I/O of its own.
//! - **`core`**: the stateful side. Tracks which users have a live push channel,
//!   remembers when each nudge was last sent, stores missed notifications and
//!   ties everything together in the `NotificationDispatcher`.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

#[cfg(feature = "rules")]
pub mod rules;

#[cfg(feature = "core")]
pub mod core;

// Re-export the types most callers reach for.
#[cfg(feature = "rules")]
pub use rules::{builtin_rules, evaluate, Frequency, Nudge, NudgeRule, RuleError, RuleSet, UserContext};

#[cfg(feature = "core")]
pub use core::{
    ConnectionHandle, ConnectionId, Delivery, NotificationDispatcher, PresenceRegistry, PushFrame,
};
