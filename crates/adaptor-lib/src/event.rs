//! Quality-of-service events
//!
//! An [`Event`] is an immutable signal from a telemetry adapter: an SLA breach
//! or warning for a guarantee, an idle host notification, an application
//! finishing, or a timer firing. Where it came from is carried by the closed
//! [`EventOrigin`] enum so that code which behaves differently per origin has
//! to match on it exhaustively.

use crate::error::AdaptError;
use crate::models::ApplicationDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Severity classification of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Breach,
    Warning,
    Other,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Breach => write!(f, "SLA_BREACH"),
            EventType::Warning => write!(f, "WARNING"),
            EventType::Other => write!(f, "OTHER"),
        }
    }
}

impl FromStr for EventType {
    type Err = AdaptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SLA_BREACH" | "BREACH" | "VIOLATION" => Ok(EventType::Breach),
            "WARNING" => Ok(EventType::Warning),
            "OTHER" => Ok(EventType::Other),
            _ => Err(AdaptError::UnknownEventType(s.to_string())),
        }
    }
}

/// Comparison operator of a guarantee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Lt,
    Lte,
    Eq,
    Gt,
    Gte,
}

impl Operator {
    /// Apply the operator to `lhs OP rhs`
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::Lt => lhs < rhs,
            Operator::Lte => lhs <= rhs,
            Operator::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Operator::Gt => lhs > rhs,
            Operator::Gte => lhs >= rhs,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Eq => "EQ",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Operator {
    type Err = AdaptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LT" | "<" => Ok(Operator::Lt),
            "LTE" | "LE" | "<=" => Ok(Operator::Lte),
            "EQ" | "==" | "=" => Ok(Operator::Eq),
            "GT" | ">" => Ok(Operator::Gt),
            "GTE" | "GE" | ">=" => Ok(Operator::Gte),
            _ => Err(AdaptError::UnknownOperator(s.to_string())),
        }
    }
}

/// Application scope of an application-level event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationScope {
    pub application_id: String,
    pub deployment_id: String,
    /// Resolved lazily by the assessor through the actuator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Arc<ApplicationDefinition>>,
}

/// Where an event originated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventOrigin {
    Generic,
    Application(ApplicationScope),
    Host {
        host_name: String,
    },
    Clock {
        #[serde(default)]
        settings: BTreeMap<String, String>,
    },
}

/// An incoming quality-of-service signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unix seconds
    pub time: i64,
    pub raw_value: f64,
    /// The SLA threshold the raw value was compared against
    pub guaranteed_value: f64,
    pub event_type: EventType,
    pub operator: Operator,
    pub guarantee_id: String,
    pub agreement_term: String,
    /// A single occurrence is enough to trigger a rule
    pub significant_on_own: bool,
    pub origin: EventOrigin,
}

impl Event {
    /// Create a generic event
    pub fn new(
        guarantee_id: impl Into<String>,
        agreement_term: impl Into<String>,
        time: i64,
        raw_value: f64,
        guaranteed_value: f64,
        event_type: EventType,
        operator: Operator,
    ) -> Self {
        Self {
            time,
            raw_value,
            guaranteed_value,
            event_type,
            operator,
            guarantee_id: guarantee_id.into(),
            agreement_term: agreement_term.into(),
            significant_on_own: false,
            origin: EventOrigin::Generic,
        }
    }

    /// Create a timer event. Clock events are always significant on their own.
    pub fn clock(
        guarantee_id: impl Into<String>,
        agreement_term: impl Into<String>,
        time: i64,
        settings: BTreeMap<String, String>,
    ) -> Self {
        Self {
            time,
            raw_value: 0.0,
            guaranteed_value: 0.0,
            event_type: EventType::Other,
            operator: Operator::Eq,
            guarantee_id: guarantee_id.into(),
            agreement_term: agreement_term.into(),
            significant_on_own: true,
            origin: EventOrigin::Clock { settings },
        }
    }

    /// Scope the event to an application deployment
    pub fn for_application(
        mut self,
        application_id: impl Into<String>,
        deployment_id: impl Into<String>,
    ) -> Self {
        self.origin = EventOrigin::Application(ApplicationScope {
            application_id: application_id.into(),
            deployment_id: deployment_id.into(),
            definition: None,
        });
        self
    }

    /// Scope the event to a host
    pub fn for_host(mut self, host_name: impl Into<String>) -> Self {
        self.origin = EventOrigin::Host {
            host_name: host_name.into(),
        };
        self
    }

    pub fn significant(mut self) -> Self {
        self.significant_on_own = true;
        self
    }

    /// Return a copy with the application definition attached.
    /// Non-application events are returned unchanged.
    pub fn with_definition(mut self, definition: ApplicationDefinition) -> Self {
        if let EventOrigin::Application(ref mut scope) = self.origin {
            scope.definition = Some(Arc::new(definition));
        }
        self
    }

    /// Distance between the observed and the guaranteed value
    pub fn magnitude(&self) -> f64 {
        (self.raw_value - self.guaranteed_value).abs()
    }

    pub fn is_application_event(&self) -> bool {
        matches!(self.origin, EventOrigin::Application(_))
    }

    /// The application this event is attributed to, if any.
    /// Clock events may name one through their `application` setting.
    pub fn application_id(&self) -> Option<&str> {
        match &self.origin {
            EventOrigin::Application(scope) => Some(scope.application_id.as_str()),
            EventOrigin::Clock { settings } => settings.get("application").map(String::as_str),
            EventOrigin::Generic | EventOrigin::Host { .. } => None,
        }
    }

    pub fn deployment_id(&self) -> Option<&str> {
        match &self.origin {
            EventOrigin::Application(scope) => Some(scope.deployment_id.as_str()),
            EventOrigin::Clock { settings } => settings.get("deployment").map(String::as_str),
            EventOrigin::Generic | EventOrigin::Host { .. } => None,
        }
    }

    pub fn host_name(&self) -> Option<&str> {
        match &self.origin {
            EventOrigin::Host { host_name } => Some(host_name.as_str()),
            EventOrigin::Clock { settings } => settings.get("host").map(String::as_str),
            EventOrigin::Generic | EventOrigin::Application(_) => None,
        }
    }

    pub fn definition(&self) -> Option<&ApplicationDefinition> {
        match &self.origin {
            EventOrigin::Application(scope) => scope.definition.as_deref(),
            _ => None,
        }
    }

    /// Clock settings, empty for other origins
    pub fn setting(&self, key: &str) -> Option<&str> {
        match &self.origin {
            EventOrigin::Clock { settings } => settings.get(key).map(String::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breach() -> Event {
        Event::new(
            "g-1",
            "power_usage_per_app",
            1_000,
            120.0,
            100.0,
            EventType::Breach,
            Operator::Gt,
        )
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("lt".parse::<Operator>().unwrap(), Operator::Lt);
        assert_eq!("GTE".parse::<Operator>().unwrap(), Operator::Gte);
        assert_eq!(">=".parse::<Operator>().unwrap(), Operator::Gte);
        assert!("between".parse::<Operator>().is_err());
    }

    #[test]
    fn test_operator_holds() {
        assert!(Operator::Gt.holds(2.0, 1.0));
        assert!(!Operator::Lt.holds(2.0, 1.0));
        assert!(Operator::Lte.holds(1.0, 1.0));
        assert!(Operator::Eq.holds(1.0, 1.0));
    }

    #[test]
    fn test_event_type_parsing() {
        assert_eq!("SLA_BREACH".parse::<EventType>().unwrap(), EventType::Breach);
        assert_eq!("warning".parse::<EventType>().unwrap(), EventType::Warning);
        assert!("fatal".parse::<EventType>().is_err());
    }

    #[test]
    fn test_magnitude() {
        assert!((breach().magnitude() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clock_event_is_significant() {
        let mut settings = BTreeMap::new();
        settings.insert("application".to_string(), "lammps".to_string());
        let event = Event::clock("g-clock", "clock", 1_000, settings);

        assert!(event.significant_on_own);
        assert_eq!(event.application_id(), Some("lammps"));
        assert_eq!(event.deployment_id(), None);
    }

    #[test]
    fn test_definition_only_attaches_to_application_events() {
        let def = ApplicationDefinition::new("lammps", "7");

        let generic = breach().with_definition(def.clone());
        assert!(generic.definition().is_none());

        let app = breach().for_application("lammps", "7").with_definition(def);
        assert_eq!(app.definition().map(|d| d.name.as_str()), Some("lammps"));
        assert!(app.is_application_event());
    }

    #[test]
    fn test_host_event() {
        let event = breach().for_host("node-3");
        assert_eq!(event.host_name(), Some("node-3"));
        assert_eq!(event.application_id(), None);
    }
}
