//! # Delivery Ledger
//!
//! Last-sent bookkeeping that gives a rule's advisory [`Frequency`] its
//! meaning. Periods are calendar buckets in the evaluation time's offset:
//!
//! - `daily`: at most once per local calendar day.
//! - `hourly`: at most once per local clock hour.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};

use crate::rules::Frequency;

type LedgerKey = (String, String);

/// Mutex-guarded map of `(user, rule) -> last sent time`.
#[derive(Debug, Default)]
pub struct DeliveryLedger {
    last_sent: Mutex<HashMap<LedgerKey, DateTime<FixedOffset>>>,
}

/// The calendar bucket `at` falls into for `frequency`, seen from `offset`.
fn period(frequency: Frequency, at: DateTime<FixedOffset>, offset: &FixedOffset) -> (NaiveDate, Option<u32>) {
    let local = at.with_timezone(offset);
    match frequency {
        Frequency::Daily => (local.date_naive(), None),
        Frequency::Hourly => (local.date_naive(), Some(local.hour())),
    }
}

impl DeliveryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<LedgerKey, DateTime<FixedOffset>>> {
        self.last_sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Try Claim
    ///
    /// Checks whether `rule_id` was already sent to `user_id` in the period
    /// containing `now` and, if not, records the send. Both steps run under one lock.
    ///
    /// # Returns
    /// `true` when the caller may send now.
    pub fn try_claim(&self, user_id: &str, rule_id: &str, frequency: Frequency, now: DateTime<FixedOffset>) -> bool {
        let key = (user_id.to_string(), rule_id.to_string());
        let mut last_sent = self.lock();
        if let Some(last) = last_sent.get(&key) {
            if period(frequency, *last, now.offset()) == period(frequency, now, now.offset()) {
                return false;
            }
        }
        last_sent.insert(key, now);
        true
    }
}
