//! # Notification Dispatcher
//!
//! Composes the rule engine with the presence registry. For every user
//! snapshot it:
//!
//! 1.  Evaluates the rule set.
//! 2.  Drops nudges already sent in their hourly/daily period (`DeliveryLedger`).
//! 3.  Pushes each remaining nudge through the registry.
//! 4.  Hands nudges that found no live channel to the `NotificationStore`.
//!
//! Nothing here returns an error. A failed push or a broken rule is logged
//! and never aborts the rest of the run.

use std::ops::AddAssign;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::json;

use crate::core::ledger::DeliveryLedger;
use crate::core::registry::{Delivery, PresenceRegistry};
use crate::core::sources::UserSnapshot;
use crate::core::store::{NotificationStore, StoredNotification};
use crate::rules::{Nudge, RuleSet, UserContext};

/// Event name used for nudge pushes.
pub const NUDGE_EVENT: &str = "nudge";

/// Counters for one dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Snapshots evaluated.
    pub users: usize,
    /// Nudges produced by the rules.
    pub triggered: usize,
    /// Nudges held back by the ledger.
    pub suppressed: usize,
    /// Nudges pushed to a live channel.
    pub delivered: usize,
    /// Nudges written to the store.
    pub stored: usize,
}

impl AddAssign for DispatchSummary {
    fn add_assign(&mut self, other: Self) {
        self.users += other.users;
        self.triggered += other.triggered;
        self.suppressed += other.suppressed;
        self.delivered += other.delivered;
        self.stored += other.stored;
    }
}

/// # Notification Dispatcher
///
/// Owns the ledger; shares the registry (cheap clone) and the store (`Arc`)
/// with the rest of the service.
pub struct NotificationDispatcher {
    registry: PresenceRegistry,
    rules: RuleSet,
    ledger: DeliveryLedger,
    store: Arc<dyn NotificationStore>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher over the given registry, rule set and store.
    pub fn new(registry: PresenceRegistry, rules: RuleSet, store: Arc<dyn NotificationStore>) -> Self {
        Self {
            registry,
            rules,
            ledger: DeliveryLedger::new(),
            store,
        }
    }

    /// The registry nudges are pushed through.
    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// The active rule set.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The store missed nudges go to.
    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// # Run For User
    ///
    /// Evaluates, deduplicates and delivers for a single user.
    ///
    /// `now` is the evaluation time. It stamps the context when the snapshot
    /// carries no time of its own; otherwise the snapshot's time wins and is
    /// also what the ledger uses.
    pub fn run_for_user(&self, user_id: &str, context: &UserContext, now: DateTime<FixedOffset>) -> DispatchSummary {
        let effective_now = context.now.unwrap_or(now);
        let nudges = if context.now.is_some() {
            self.rules.evaluate(context)
        } else {
            self.rules.evaluate(&context.clone().at(now))
        };

        let mut summary = DispatchSummary {
            users: 1,
            triggered: nudges.len(),
            ..Default::default()
        };

        for nudge in nudges {
            if !self.ledger.try_claim(user_id, &nudge.rule_id, nudge.frequency, effective_now) {
                log::debug!("'{}' for '{}' already sent this {}", nudge.rule_id, user_id, nudge.frequency);
                summary.suppressed += 1;
                continue;
            }

            match self.registry.dispatch(user_id, NUDGE_EVENT, nudge_payload(&nudge)) {
                Delivery::Delivered => {
                    log::info!("Pushed '{}' to '{}'", nudge.rule_id, user_id);
                    summary.delivered += 1;
                }
                Delivery::Offline => {
                    self.store.save(StoredNotification {
                        user_id: user_id.to_string(),
                        rule_id: nudge.rule_id,
                        frequency: nudge.frequency,
                        message: nudge.message,
                        created_at: effective_now,
                    });
                    summary.stored += 1;
                }
            }
        }

        summary
    }

    /// Runs [`run_for_user`](Self::run_for_user) over every snapshot and sums the results.
    pub fn run_all(&self, snapshots: &[UserSnapshot], now: DateTime<FixedOffset>) -> DispatchSummary {
        let mut total = DispatchSummary::default();
        for snapshot in snapshots {
            total += self.run_for_user(&snapshot.user_id, &snapshot.context, now);
        }
        total
    }
}

fn nudge_payload(nudge: &Nudge) -> serde_json::Value {
    json!({
        "ruleId": nudge.rule_id,
        "frequency": nudge.frequency.to_string(),
        "message": nudge.message,
    })
}
