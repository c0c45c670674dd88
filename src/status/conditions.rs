//! Condition management helpers following Kubernetes API conventions

use chrono::{SecondsFormat, Utc};

use crate::crd::{Condition, ConditionStatus};

/// Condition types published on the status records
pub const CONDITION_TYPE_DEGRADED: &str = "Degraded";
pub const CONDITION_TYPE_PROGRESSING: &str = "Progressing";
pub const CONDITION_TYPE_AVAILABLE: &str = "Available";
pub const CONDITION_TYPE_UPGRADEABLE: &str = "Upgradeable";

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Update or add a condition to the conditions list
///
/// The transition time is only touched when the status actually changes (or
/// when the condition is new), so rewriting an identical condition leaves the
/// list byte-for-byte unchanged.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status != condition.status || existing.last_transition_time.is_none() {
            existing.last_transition_time = Some(
                condition
                    .last_transition_time
                    .clone()
                    .unwrap_or_else(now_rfc3339),
            );
        }
        existing.status = condition.status;
        existing.reason = condition.reason;
        existing.message = condition.message;
    } else {
        let mut condition = condition;
        if condition.last_transition_time.is_none() {
            condition.last_transition_time = Some(now_rfc3339());
        }
        conditions.push(condition);
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is true
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false)
}

/// Available=True
pub fn available_condition() -> Condition {
    Condition::new(CONDITION_TYPE_AVAILABLE, ConditionStatus::True, "", "")
}

/// Available=False
pub fn unavailable_condition(reason: &str, message: &str) -> Condition {
    Condition::new(
        CONDITION_TYPE_AVAILABLE,
        ConditionStatus::False,
        reason,
        message,
    )
}

/// Upgradeable=True
pub fn upgradeable_condition() -> Condition {
    Condition::new(CONDITION_TYPE_UPGRADEABLE, ConditionStatus::True, "", "")
}
