//! # Rule Evaluator
//!
//! A nudge rule is plain data: an id, an advisory delivery frequency, and two
//! pure functions over a [`UserContext`]. `evaluate` walks a rule list in order
//! and collects one [`Nudge`] per rule whose condition holds.
//!
//! ## Guarantees:
//!
//! - **Ordered output**: nudges come out in rule-list order.
//! - **Independence**: no rule can suppress another; there is no cross-rule state.
//! - **Determinism**: the same `(context, rules)` always yields the same output.
//! - **Isolation**: a rule that returns an error, or panics, is logged and
//!   skipped. The rest of the list is still evaluated.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::UserContext;

/// Errors a rule can raise while reading a snapshot, plus rule-set construction errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("rule panicked: {0}")]
    Panicked(String),

    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),
}

/// # Delivery Frequency
///
/// Advisory metadata for the dispatcher: how often the same rule may reach the
/// same user. The evaluator itself never enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Hourly => write!(f, "hourly"),
            Frequency::Daily => write!(f, "daily"),
        }
    }
}

/// Predicate half of a rule.
pub type ConditionFn = fn(&UserContext) -> Result<bool, RuleError>;
/// Message half of a rule. Only called after the condition returned `true`.
pub type MessageFn = fn(&UserContext) -> Result<String, RuleError>;

/// # Nudge Rule
///
/// `condition` and `build_message` must be side-effect free and must tolerate
/// missing fields in the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct NudgeRule {
    /// Stable identifier, unique within a rule set.
    pub id: &'static str,
    pub frequency: Frequency,
    pub condition: ConditionFn,
    pub build_message: MessageFn,
}

/// One triggered rule: what to say, and how often it may be said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nudge {
    pub rule_id: String,
    pub frequency: Frequency,
    pub message: String,
}

impl NudgeRule {
    /// Runs this rule alone against `context`.
    ///
    /// Returns `Ok(None)` when the condition does not hold. Errors raised by
    /// either function, and panics inside them, come back as `Err`.
    pub fn apply(&self, context: &UserContext) -> Result<Option<Nudge>, RuleError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Option<String>, RuleError> {
            if !(self.condition)(context)? {
                return Ok(None);
            }
            (self.build_message)(context).map(Some)
        }));

        let message = match outcome {
            Ok(result) => result?,
            Err(payload) => return Err(RuleError::Panicked(panic_reason(payload.as_ref()))),
        };

        Ok(message.map(|message| Nudge {
            rule_id: self.id.to_string(),
            frequency: self.frequency,
            message,
        }))
    }
}

/// # Evaluate
///
/// Evaluates every rule in `rules`, in order, against `context` and returns
/// the triggered nudges in the same order.
///
/// A failing rule is logged at `warn` and contributes nothing; it never aborts
/// the evaluation of the rules after it.
pub fn evaluate(context: &UserContext, rules: &[NudgeRule]) -> Vec<Nudge> {
    rules
        .iter()
        .filter_map(|rule| match rule.apply(context) {
            Ok(nudge) => nudge,
            Err(e) => {
                log::warn!("Nudge rule '{}' skipped: {}", rule.id, e);
                None
            }
        })
        .collect()
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
