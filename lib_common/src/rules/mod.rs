//! # Nudge Rule Engine
//!
//! Turns a point-in-time snapshot of a user's health data into zero or more
//! proactive "nudge" messages.
//!
//! ## Components:
//!
//! - **`context`**: the `UserContext` snapshot. Every field is optional because
//!   the aggregation layer that builds it rarely has the full picture.
//! - **`catalog`**: the built-in rules (steps, movement, hydration, goals, mood)
//!   and the `RuleSet` container that keeps rule ids unique.
//! - **`evaluator`**: the `evaluate` loop. Rules run in order, independently,
//!   and a failing rule is logged and skipped.
//!
//! Nothing in this module performs I/O or touches shared state.

pub mod catalog;
pub mod context;
pub mod evaluator;

pub use catalog::{builtin_rules, RuleSet};
pub use context::{Frailty, Goal, HydrationLog, MoodEntry, Preferences, Profile, UserContext};
pub use evaluator::{evaluate, Frequency, Nudge, NudgeRule, RuleError};
