//! Firing criteria
//!
//! A [`FiringCriteria`] is one row of the rule catalog: which agreement term
//! and comparator it reacts to, optional type and magnitude filters, the
//! response action to propose, and free-form parameters. Temporal parameters
//! (`START_TIME`, `END_TIME`, `DAY_OF_WEEK`) are parsed once at construction.

use crate::error::{AdaptError, Result};
use crate::event::{EventType, Operator};
use crate::params::Parameters;
use crate::response::ActionType;
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub const PARAM_APPLICATION: &str = "application";
pub const PARAM_START_TIME: &str = "START_TIME";
pub const PARAM_END_TIME: &str = "END_TIME";
pub const PARAM_DAY_OF_WEEK: &str = "DAY_OF_WEEK";

/// Time-of-day window, inclusive at both ends.
///
/// A window whose start is later than its end wraps over midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

impl TimeWindow {
    pub fn contains(&self, now: NaiveTime) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start <= end => now >= start && now <= end,
            (Some(start), Some(end)) => now >= start || now <= end,
            (Some(start), None) => now >= start,
            (None, Some(end)) => now <= end,
            (None, None) => true,
        }
    }
}

/// Seven-bit day mask, Monday first (`"1111100"` = weekdays)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayMask([bool; 7]);

impl DayMask {
    pub fn parse(mask: &str) -> Result<Self> {
        let chars: Vec<char> = mask.trim().chars().collect();
        if chars.len() != 7 {
            return Err(AdaptError::CatalogParse {
                line: 0,
                message: format!("DAY_OF_WEEK must have 7 characters, got {:?}", mask),
            });
        }
        let mut days = [false; 7];
        for (i, c) in chars.iter().enumerate() {
            days[i] = match c {
                '1' => true,
                '0' => false,
                other => {
                    return Err(AdaptError::CatalogParse {
                        line: 0,
                        message: format!("DAY_OF_WEEK may only contain 0 and 1, got {:?}", other),
                    })
                }
            };
        }
        Ok(Self(days))
    }

    pub fn allows(&self, day: Weekday) -> bool {
        self.0[day.num_days_from_monday() as usize]
    }
}

/// One rule of the catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiringCriteria {
    pub agreement_term: String,
    pub operator: Operator,
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_magnitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_magnitude: Option<f64>,
    pub parameters: Parameters,
    #[serde(skip)]
    time_window: Option<TimeWindow>,
    #[serde(skip)]
    days: Option<DayMask>,
}

impl FiringCriteria {
    /// Create a rule without optional filters
    pub fn new(agreement_term: impl Into<String>, operator: Operator, action_type: ActionType) -> Self {
        Self {
            agreement_term: agreement_term.into(),
            operator,
            action_type,
            event_type: None,
            min_magnitude: None,
            max_magnitude: None,
            parameters: Parameters::new(),
            time_window: None,
            days: None,
        }
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_magnitude(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_magnitude = min;
        self.max_magnitude = max;
        self
    }

    /// Attach parameters, validating the temporal keys
    pub fn with_parameters(mut self, parameters: Parameters) -> Result<Self> {
        self.time_window = parse_time_window(&parameters)?;
        self.days = parameters
            .get(PARAM_DAY_OF_WEEK)
            .filter(|m| !m.is_empty())
            .map(DayMask::parse)
            .transpose()?;
        self.parameters = parameters;
        Ok(self)
    }

    pub fn time_window(&self) -> Option<&TimeWindow> {
        self.time_window.as_ref()
    }

    pub fn days(&self) -> Option<&DayMask> {
        self.days.as_ref()
    }

    /// Application this rule is restricted to
    pub fn application(&self) -> Option<&str> {
        self.parameters
            .get(PARAM_APPLICATION)
            .filter(|a| !a.is_empty())
    }

    /// Parameters handed on to the response, without the matching-only keys
    pub fn response_parameters(&self) -> Parameters {
        let mut params = self.parameters.clone();
        for key in [PARAM_APPLICATION, PARAM_START_TIME, PARAM_END_TIME, PARAM_DAY_OF_WEEK] {
            params.remove(key);
        }
        params
    }
}

fn parse_time_window(parameters: &Parameters) -> Result<Option<TimeWindow>> {
    let start = parameters
        .get(PARAM_START_TIME)
        .filter(|s| !s.is_empty())
        .map(parse_time)
        .transpose()?;
    let end = parameters
        .get(PARAM_END_TIME)
        .filter(|s| !s.is_empty())
        .map(parse_time)
        .transpose()?;

    if start.is_none() && end.is_none() {
        Ok(None)
    } else {
        Ok(Some(TimeWindow { start, end }))
    }
}

/// Accepts `HH:MM` and `HH:MM:SS`
fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| AdaptError::CatalogParse {
            line: 0,
            message: format!("invalid time of day {:?}", value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_time_window_plain() {
        let window = TimeWindow {
            start: Some(t(8, 0)),
            end: Some(t(18, 0)),
        };
        assert!(window.contains(t(8, 0)));
        assert!(window.contains(t(12, 30)));
        assert!(window.contains(t(18, 0)));
        assert!(!window.contains(t(19, 0)));
    }

    #[test]
    fn test_time_window_wraps_midnight() {
        let window = TimeWindow {
            start: Some(t(22, 0)),
            end: Some(t(6, 0)),
        };
        assert!(window.contains(t(23, 0)));
        assert!(window.contains(t(3, 0)));
        assert!(!window.contains(t(12, 0)));
    }

    #[test]
    fn test_day_mask() {
        let weekdays = DayMask::parse("1111100").unwrap();
        assert!(weekdays.allows(Weekday::Mon));
        assert!(weekdays.allows(Weekday::Fri));
        assert!(!weekdays.allows(Weekday::Sat));
        assert!(!weekdays.allows(Weekday::Sun));

        assert!(DayMask::parse("11111").is_err());
        assert!(DayMask::parse("11111x0").is_err());
    }

    #[test]
    fn test_with_parameters_parses_temporal_keys() {
        let rule = FiringCriteria::new("power", Operator::Gt, ActionType::RemoveTask)
            .with_parameters(Parameters::parse(
                "START_TIME=09:00;END_TIME=17:30;DAY_OF_WEEK=1111100;application=lammps;TASK_TYPE=worker",
            ))
            .unwrap();

        let window = rule.time_window().unwrap();
        assert_eq!(window.start, Some(t(9, 0)));
        assert_eq!(window.end, Some(t(17, 30)));
        assert!(rule.days().is_some());
        assert_eq!(rule.application(), Some("lammps"));
        assert_eq!(rule.response_parameters().to_string(), "TASK_TYPE=worker");
    }

    #[test]
    fn test_invalid_time_is_rejected() {
        let result = FiringCriteria::new("power", Operator::Gt, ActionType::RemoveTask)
            .with_parameters(Parameters::parse("START_TIME=25:99"));
        assert!(result.is_err());
    }
}
