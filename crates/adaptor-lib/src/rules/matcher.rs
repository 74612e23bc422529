//! Rule matching
//!
//! A rule is a pure predicate over an event and the current wall-clock time.
//! Checks run cheapest-first and stop at the first failure.

use super::FiringCriteria;
use crate::event::Event;
use chrono::{DateTime, Datelike, Local};

/// Evaluate a rule against an event at the current local time
pub fn should_fire(rule: &FiringCriteria, event: &Event) -> bool {
    should_fire_at(rule, event, &Local::now())
}

/// Evaluate a rule against an event at the given local time.
///
/// Time-of-day and day-of-week filters compare against `now`, not against
/// the event's own timestamp.
pub fn should_fire_at(rule: &FiringCriteria, event: &Event, now: &DateTime<Local>) -> bool {
    let magnitude = event.magnitude();
    if let Some(min) = rule.min_magnitude {
        if magnitude < min {
            return false;
        }
    }
    if let Some(max) = rule.max_magnitude {
        if magnitude > max {
            return false;
        }
    }

    if let Some(event_type) = rule.event_type {
        if event_type != event.event_type {
            return false;
        }
    }

    if let Some(window) = rule.time_window() {
        if !window.contains(now.time()) {
            return false;
        }
    }

    if let Some(days) = rule.days() {
        if !days.allows(now.weekday()) {
            return false;
        }
    }

    if event.is_application_event() {
        if let Some(application) = rule.application() {
            if event.application_id() != Some(application) {
                return false;
            }
        }
    }

    rule.agreement_term == event.agreement_term && rule.operator == event.operator
}

/// First rule in catalog order that fires for the event
pub fn first_matching<'a>(
    rules: &'a [FiringCriteria],
    event: &Event,
    now: &DateTime<Local>,
) -> Option<&'a FiringCriteria> {
    rules.iter().find(|rule| should_fire_at(rule, event, now))
}

/// Every rule that fires for the event, in catalog order
pub fn all_matching<'a>(
    rules: &'a [FiringCriteria],
    event: &Event,
    now: &DateTime<Local>,
) -> Vec<&'a FiringCriteria> {
    rules
        .iter()
        .filter(|rule| should_fire_at(rule, event, now))
        .collect()
}
