//! Adaptation core for HPC quality-of-service management
//!
//! This crate provides the core functionality for:
//! - Sliding-window event and adaptation histories
//! - Rule matching with magnitude, temporal and per-application filters
//! - Event assessment with threshold counting and cooldown
//! - Pluggable decision engines that pick concrete adaptation targets
//! - Fault-isolated actuation dispatch
//! - Health checks, audit trail and observability

pub mod actuator;
pub mod assessor;
pub mod audit;
pub mod clock;
pub mod decision;
pub mod error;
pub mod event;
pub mod health;
pub mod history;
pub mod listener;
pub mod models;
pub mod observability;
pub mod params;
pub mod response;
pub mod rules;

pub use actuator::{Actuator, ActuatorInvoker, DispatcherConfig, SimulatedActuator};
pub use assessor::{AssessorConfig, EventAssessor, HistoryPruner};
pub use audit::{AuditLog, AuditRecord, AuditStage};
pub use clock::{ManualClock, SystemClock, TimeSource};
pub use decision::{create_engine, DecisionEngine, DEFAULT_ENGINE, ENGINE_NAMES};
pub use error::{AdaptError, Result};
pub use event::{Event, EventOrigin, EventType, Operator};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use listener::{ChannelListener, ClockListener, ClockTrigger, EventListener};
pub use models::*;
pub use observability::{AdaptorMetrics, StructuredLogger};
pub use params::Parameters;
pub use response::{ActionType, Response};
pub use rules::{FiringCriteria, RuleCatalog};
