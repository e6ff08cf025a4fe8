//! # User Context Snapshot
//!
//! The read-only input of the rule engine. An external aggregation layer pulls
//! frailty metrics, hydration logs, goals and mood entries from wherever they
//! live and assembles one `UserContext` per user. The wire shape is camelCase
//! JSON, matching what the app's frontend and API already speak.

use chrono::{DateTime, FixedOffset, Timelike};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Hydration target used when the user never set one (or set it to zero).
pub const DEFAULT_HYDRATION_TARGET: u32 = 6;

/// Reads a count that the app may have stored as any JSON number.
/// Fractions are truncated; negative or out-of-range values are rejected.
fn whole_count<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let Some(raw) = Option::<f64>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if !raw.is_finite() || raw < 0.0 {
        return Err(D::Error::custom(format!("expected a non-negative count, got {}", raw)));
    }
    T::try_from(raw.trunc() as u64)
        .map(Some)
        .map_err(|_| D::Error::custom(format!("count {} is out of range", raw)))
}

/// Fitness/frailty metrics for the current day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frailty {
    /// Steps walked so far today.
    #[serde(default, deserialize_with = "whole_count")]
    pub steps: Option<u64>,
    /// Hours spent sitting since the last recorded movement.
    pub sedentary_hours: Option<f64>,
}

/// Today's hydration log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationLog {
    /// Glasses of water logged today.
    #[serde(default, deserialize_with = "whole_count")]
    pub hydration: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default, deserialize_with = "whole_count")]
    pub hydration_target: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub preferences: Option<Preferences>,
}

/// A personal goal, as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub title: Option<String>,
}

/// The most recent mood check-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    /// Free text, e.g. "Feeling a bit low today".
    pub value: Option<String>,
}

/// # User Context
///
/// A point-in-time snapshot of one user's health and engagement data.
///
/// Every section is optional. Rules read it through the accessor methods
/// below, which flatten the nested `Option`s and apply the documented
/// fallbacks, so a rule never has to walk the structure itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub frailty: Option<Frailty>,
    pub hydration_log: Option<HydrationLog>,
    pub profile: Option<Profile>,
    /// Goals in the order the user created them.
    #[serde(default)]
    pub goals: Vec<Goal>,
    pub last_mood: Option<MoodEntry>,
    /// Evaluation time, in the user's local offset. Used for time-of-day gating.
    pub now: Option<DateTime<FixedOffset>>,
}

impl UserContext {
    /// Returns a copy of this snapshot stamped with the given evaluation time.
    pub fn at(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn steps(&self) -> Option<u64> {
        self.frailty.as_ref()?.steps
    }

    pub fn sedentary_hours(&self) -> Option<f64> {
        self.frailty.as_ref()?.sedentary_hours
    }

    /// Glasses logged today. A missing log counts as zero.
    pub fn hydration_glasses(&self) -> u32 {
        self.hydration_log
            .as_ref()
            .and_then(|log| log.hydration)
            .unwrap_or(0)
    }

    /// The user's daily hydration target, falling back to
    /// [`DEFAULT_HYDRATION_TARGET`] when unset or zero.
    pub fn hydration_target(&self) -> u32 {
        self.profile
            .as_ref()
            .and_then(|p| p.preferences.as_ref())
            .and_then(|prefs| prefs.hydration_target)
            .filter(|target| *target > 0)
            .unwrap_or(DEFAULT_HYDRATION_TARGET)
    }

    pub fn first_goal(&self) -> Option<&Goal> {
        self.goals.first()
    }

    pub fn mood(&self) -> Option<&str> {
        self.last_mood.as_ref()?.value.as_deref()
    }

    /// Hour of day (0-23) of `now` in its own offset.
    pub fn local_hour(&self) -> Option<u32> {
        self.now.map(|now| now.hour())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case_snapshot() {
        let json = serde_json::json!({
            "frailty": { "steps": 4200, "sedentaryHours": 1.5 },
            "hydrationLog": { "hydration": 3 },
            "profile": { "preferences": { "hydrationTarget": 8 } },
            "goals": [{ "title": "Walk to the park" }],
            "lastMood": { "value": "Happy" },
            "now": "2026-03-02T19:15:00+01:00"
        });
        let ctx: UserContext = serde_json::from_value(json).unwrap();

        assert_eq!(ctx.steps(), Some(4200));
        assert_eq!(ctx.sedentary_hours(), Some(1.5));
        assert_eq!(ctx.hydration_glasses(), 3);
        assert_eq!(ctx.hydration_target(), 8);
        assert_eq!(ctx.first_goal().and_then(|g| g.title.as_deref()), Some("Walk to the park"));
        assert_eq!(ctx.mood(), Some("Happy"));
        // Hour is taken in the snapshot's own offset, not UTC.
        assert_eq!(ctx.local_hour(), Some(19));
    }

    #[test]
    fn test_empty_snapshot_uses_fallbacks() {
        let ctx: UserContext = serde_json::from_str("{}").unwrap();
        assert!(ctx.goals.is_empty());
        assert_eq!(ctx.steps(), None);
        assert_eq!(ctx.hydration_glasses(), 0);
        assert_eq!(ctx.hydration_target(), DEFAULT_HYDRATION_TARGET);
        assert_eq!(ctx.mood(), None);
        assert_eq!(ctx.local_hour(), None);
    }

    #[test]
    fn test_zero_hydration_target_falls_back() {
        let ctx = UserContext {
            profile: Some(Profile {
                preferences: Some(Preferences { hydration_target: Some(0) }),
            }),
            ..Default::default()
        };
        assert_eq!(ctx.hydration_target(), DEFAULT_HYDRATION_TARGET);
    }

    #[test]
    fn test_counts_accept_any_json_number() {
        let ctx: UserContext = serde_json::from_str(
            r#"{ "frailty": { "steps": 3000.7 }, "hydrationLog": { "hydration": 4.0 },
                 "profile": { "preferences": { "hydrationTarget": null } } }"#,
        )
        .unwrap();
        assert_eq!(ctx.steps(), Some(3000));
        assert_eq!(ctx.hydration_glasses(), 4);
        assert_eq!(ctx.hydration_target(), DEFAULT_HYDRATION_TARGET);

        assert!(serde_json::from_str::<UserContext>(r#"{ "frailty": { "steps": -5 } }"#).is_err());
        assert!(serde_json::from_str::<UserContext>(r#"{ "hydrationLog": { "hydration": 1e12 } }"#).is_err());
    }
}
