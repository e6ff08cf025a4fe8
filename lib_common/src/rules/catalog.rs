//! # Built-in Rule Catalog
//!
//! The five nudges the companion app sends today, expressed as a table of pure
//! functions keyed by rule id, and the `RuleSet` container used to hold them.

use std::collections::HashSet;

use super::context::UserContext;
use super::evaluator::{evaluate, Frequency, Nudge, NudgeRule, RuleError};

/// Daily step goal the steps reminder measures against.
pub const DAILY_STEP_GOAL: u64 = 6000;
/// Local hour from which the steps reminder may fire.
pub const EVENING_HOUR: u32 = 18;
/// Hours of sitting that trigger a movement break.
pub const SEDENTARY_LIMIT_HOURS: f64 = 2.0;

pub const STEPS_REMINDER: &str = "steps_reminder";
pub const MOVEMENT_BREAK: &str = "movement_break";
pub const HYDRATION_REMINDER: &str = "hydration_reminder";
pub const GOAL_REMINDER: &str = "goal_reminder";
pub const MOOD_CHECKIN: &str = "mood_checkin";

/// The built-in rules, in catalog order.
pub fn builtin_rules() -> Vec<NudgeRule> {
    vec![
        NudgeRule {
            id: STEPS_REMINDER,
            frequency: Frequency::Daily,
            condition: steps_condition,
            build_message: steps_message,
        },
        NudgeRule {
            id: MOVEMENT_BREAK,
            frequency: Frequency::Hourly,
            condition: movement_condition,
            build_message: movement_message,
        },
        NudgeRule {
            id: HYDRATION_REMINDER,
            frequency: Frequency::Daily,
            condition: hydration_condition,
            build_message: hydration_message,
        },
        NudgeRule {
            id: GOAL_REMINDER,
            frequency: Frequency::Daily,
            condition: goal_condition,
            build_message: goal_message,
        },
        NudgeRule {
            id: MOOD_CHECKIN,
            frequency: Frequency::Daily,
            condition: mood_condition,
            build_message: mood_message,
        },
    ]
}

// --- steps_reminder ---

fn steps_condition(ctx: &UserContext) -> Result<bool, RuleError> {
    let (Some(steps), Some(hour)) = (ctx.steps(), ctx.local_hour()) else {
        return Ok(false);
    };
    Ok(steps < DAILY_STEP_GOAL && hour >= EVENING_HOUR)
}

fn steps_message(ctx: &UserContext) -> Result<String, RuleError> {
    let steps = ctx.steps().ok_or(RuleError::MissingField("frailty.steps"))?;
    let remaining = DAILY_STEP_GOAL.saturating_sub(steps);
    Ok(format!(
        "You've taken {} steps today. Just {} more to reach {}!",
        steps, remaining, DAILY_STEP_GOAL
    ))
}

// --- movement_break ---

fn movement_condition(ctx: &UserContext) -> Result<bool, RuleError> {
    match ctx.sedentary_hours() {
        Some(hours) if hours.is_nan() => Err(RuleError::InvalidValue {
            field: "frailty.sedentaryHours",
            reason: "not a number".to_string(),
        }),
        Some(hours) => Ok(hours >= SEDENTARY_LIMIT_HOURS),
        None => Ok(false),
    }
}

fn movement_message(_: &UserContext) -> Result<String, RuleError> {
    Ok("You've been sitting for a while. How about a short walk or a gentle stretch?".to_string())
}

// --- hydration_reminder ---

fn hydration_condition(ctx: &UserContext) -> Result<bool, RuleError> {
    Ok(ctx.hydration_glasses() < ctx.hydration_target())
}

fn hydration_message(ctx: &UserContext) -> Result<String, RuleError> {
    Ok(format!(
        "You've had {} glasses of water so far. Keep going, you're close to hitting {}!",
        ctx.hydration_glasses(),
        ctx.hydration_target()
    ))
}

// --- goal_reminder ---

fn goal_condition(ctx: &UserContext) -> Result<bool, RuleError> {
    Ok(ctx.first_goal().is_some())
}

fn goal_message(ctx: &UserContext) -> Result<String, RuleError> {
    let title = ctx
        .first_goal()
        .and_then(|goal| goal.title.as_deref())
        .ok_or(RuleError::MissingField("goals[0].title"))?;
    Ok(format!("Don't forget your goal: \"{}\". Every small step counts!", title))
}

// --- mood_checkin ---

fn mood_condition(ctx: &UserContext) -> Result<bool, RuleError> {
    Ok(ctx
        .mood()
        .map(|mood| {
            let mood = mood.to_lowercase();
            mood.contains("low") || mood.contains("sad")
        })
        .unwrap_or(false))
}

fn mood_message(_: &UserContext) -> Result<String, RuleError> {
    Ok("We noticed you've been feeling down. Would you like to chat or try a calming activity?"
        .to_string())
}

/// # Rule Set
///
/// An ordered list of rules with unique ids.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<NudgeRule>,
}

impl RuleSet {
    /// Builds a rule set, rejecting duplicate ids.
    pub fn new(rules: Vec<NudgeRule>) -> Result<Self, RuleError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id) {
                return Err(RuleError::DuplicateRule(rule.id.to_string()));
            }
        }
        Ok(Self { rules })
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self { rules: builtin_rules() }
    }

    /// Returns a copy without the rules whose ids appear in `disabled`.
    /// Unknown ids are ignored.
    pub fn without<S: AsRef<str>>(&self, disabled: &[S]) -> Self {
        let rules = self
            .rules
            .iter()
            .filter(|rule| !disabled.iter().any(|id| id.as_ref() == rule.id))
            .copied()
            .collect();
        Self { rules }
    }

    pub fn get(&self, id: &str) -> Option<&NudgeRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn rules(&self) -> &[NudgeRule] {
        &self.rules
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.id).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Shorthand for [`evaluate`] over this set.
    pub fn evaluate(&self, context: &UserContext) -> Vec<Nudge> {
        evaluate(context, &self.rules)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::context::{Frailty, Goal, HydrationLog, MoodEntry};
    use chrono::{DateTime, FixedOffset};

    fn at(ts: &str) -> Option<DateTime<FixedOffset>> {
        Some(DateTime::parse_from_rfc3339(ts).unwrap())
    }

    /// A context in which no built-in rule fires.
    fn quiet() -> UserContext {
        UserContext {
            frailty: Some(Frailty { steps: Some(8000), sedentary_hours: Some(0.5) }),
            hydration_log: Some(HydrationLog { hydration: Some(6) }),
            now: at("2026-05-04T10:00:00+00:00"),
            ..Default::default()
        }
    }

    fn fired(ctx: &UserContext) -> Vec<String> {
        RuleSet::builtin().evaluate(ctx).into_iter().map(|n| n.rule_id).collect()
    }

    fn message_for(ctx: &UserContext, id: &str) -> Option<String> {
        RuleSet::builtin()
            .evaluate(ctx)
            .into_iter()
            .find(|n| n.rule_id == id)
            .map(|n| n.message)
    }

    #[test]
    fn test_quiet_context_fires_nothing() {
        assert!(fired(&quiet()).is_empty());
    }

    #[test]
    fn test_steps_reminder_in_the_evening() {
        let ctx = UserContext {
            frailty: Some(Frailty { steps: Some(3000), sedentary_hours: None }),
            now: at("2026-05-04T19:00:00+02:00"),
            ..quiet()
        };
        let message = message_for(&ctx, STEPS_REMINDER).expect("steps_reminder should fire");
        assert!(message.contains("3000 steps"));
        assert!(message.contains("3000 more"));
    }

    #[test]
    fn test_steps_reminder_silent_before_evening() {
        let ctx = UserContext {
            frailty: Some(Frailty { steps: Some(3000), sedentary_hours: None }),
            now: at("2026-05-04T17:59:00+02:00"),
            ..quiet()
        };
        assert!(message_for(&ctx, STEPS_REMINDER).is_none());
    }

    #[test]
    fn test_movement_break_ignores_other_fields() {
        let ctx = UserContext {
            frailty: Some(Frailty { steps: None, sedentary_hours: Some(2.5) }),
            ..Default::default()
        };
        assert!(fired(&ctx).contains(&MOVEMENT_BREAK.to_string()));

        let exactly_two = UserContext {
            frailty: Some(Frailty { steps: Some(9000), sedentary_hours: Some(2.0) }),
            ..quiet()
        };
        assert_eq!(fired(&exactly_two), vec![MOVEMENT_BREAK.to_string()]);
    }

    #[test]
    fn test_hydration_against_default_target() {
        let ctx = UserContext {
            hydration_log: Some(HydrationLog { hydration: Some(4) }),
            ..quiet()
        };
        let message = message_for(&ctx, HYDRATION_REMINDER).expect("hydration_reminder should fire");
        assert!(message.contains("4 glasses"));
        assert!(message.contains("hitting 6"));
    }

    #[test]
    fn test_goal_reminder_needs_a_goal() {
        assert!(message_for(&quiet(), GOAL_REMINDER).is_none());

        let ctx = UserContext {
            goals: vec![
                Goal { title: Some("Garden twice a week".to_string()) },
                Goal { title: Some("Call Maria".to_string()) },
            ],
            ..quiet()
        };
        let message = message_for(&ctx, GOAL_REMINDER).unwrap();
        assert!(message.contains("Garden twice a week"));
        assert!(!message.contains("Call Maria"));
    }

    #[test]
    fn test_untitled_goal_is_skipped_not_fatal() {
        let ctx = UserContext {
            goals: vec![Goal { title: None }],
            last_mood: Some(MoodEntry { value: Some("sad".to_string()) }),
            ..quiet()
        };
        // goal_reminder errors out, mood_checkin after it still fires.
        assert_eq!(fired(&ctx), vec![MOOD_CHECKIN.to_string()]);
    }

    #[test]
    fn test_mood_checkin_case_insensitive() {
        let ctx = UserContext {
            last_mood: Some(MoodEntry { value: Some("Feeling really LOW today".to_string()) }),
            ..quiet()
        };
        assert_eq!(fired(&ctx), vec![MOOD_CHECKIN.to_string()]);

        let happy = UserContext {
            last_mood: Some(MoodEntry { value: Some("Great!".to_string()) }),
            ..quiet()
        };
        assert!(fired(&happy).is_empty());
    }

    #[test]
    fn test_nan_sedentary_hours_skips_only_that_rule() {
        let ctx = UserContext {
            frailty: Some(Frailty { steps: Some(9000), sedentary_hours: Some(f64::NAN) }),
            hydration_log: Some(HydrationLog { hydration: Some(1) }),
            ..quiet()
        };
        assert_eq!(fired(&ctx), vec![HYDRATION_REMINDER.to_string()]);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let ctx = UserContext {
            frailty: Some(Frailty { steps: Some(1200), sedentary_hours: Some(3.0) }),
            hydration_log: Some(HydrationLog { hydration: Some(2) }),
            goals: vec![Goal { title: Some("Stretch".to_string()) }],
            last_mood: Some(MoodEntry { value: Some("a bit sad".to_string()) }),
            now: at("2026-05-04T20:30:00-05:00"),
            ..Default::default()
        };
        let first = serde_json::to_vec(&RuleSet::builtin().evaluate(&ctx)).unwrap();
        let second = serde_json::to_vec(&RuleSet::builtin().evaluate(&ctx)).unwrap();
        assert_eq!(first, second);
        assert_eq!(RuleSet::builtin().evaluate(&ctx).len(), 5);
    }

    #[test]
    fn test_rules_are_independent() {
        let ctx = UserContext {
            frailty: Some(Frailty { steps: Some(9000), sedentary_hours: Some(4.0) }),
            hydration_log: Some(HydrationLog { hydration: Some(1) }),
            last_mood: Some(MoodEntry { value: Some("low".to_string()) }),
            ..quiet()
        };
        let rules = builtin_rules();
        let mut together = evaluate(&ctx, &rules);
        let mut one_by_one: Vec<Nudge> = rules
            .iter()
            .flat_map(|rule| evaluate(&ctx, std::slice::from_ref(rule)))
            .collect();
        together.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        one_by_one.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        assert_eq!(together, one_by_one);
        assert_eq!(together.len(), 3);
    }

    #[test]
    fn test_rule_set_rejects_duplicates() {
        let mut rules = builtin_rules();
        rules.push(rules[0]);
        assert_eq!(
            RuleSet::new(rules).unwrap_err(),
            RuleError::DuplicateRule(STEPS_REMINDER.to_string())
        );
    }

    #[test]
    fn test_rule_set_lookup_and_disable() {
        let set = RuleSet::builtin();
        assert_eq!(set.len(), 5);
        assert_eq!(set.get(MOVEMENT_BREAK).map(|r| r.frequency), Some(Frequency::Hourly));
        assert!(set.get("unknown").is_none());

        let trimmed = set.without(&["mood_checkin", "not_a_rule"]);
        assert_eq!(
            trimmed.ids(),
            vec![STEPS_REMINDER, MOVEMENT_BREAK, HYDRATION_REMINDER, GOAL_REMINDER]
        );
    }
}
