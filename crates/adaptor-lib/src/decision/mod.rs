//! Decision engines
//!
//! A decision engine turns a coarse response ("add a task to this
//! application") into a concrete, bounded target. All engines share the
//! feasibility rules in [`base`]; they differ only in how they order
//! feasible candidates. Engines are picked by name from a static registry.

pub mod base;
mod power;
mod priority;
mod random;

pub use base::{decide_with, rank_hosts, TargetSelector, TaskCandidate, TypeCandidate};
pub use power::PowerSelector;
pub use priority::PrioritySelector;
pub use random::RandomSelector;

use crate::actuator::ActuatorInvoker;
use crate::response::Response;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Name of the engine used when the configured one is unknown
pub const DEFAULT_ENGINE: &str = "random";

/// Canonical names of the registered engines
pub const ENGINE_NAMES: &[&str] = &["random", "priority", "power"];

/// Converts a response into a concrete target or marks it infeasible.
///
/// Never fails: "no candidate" is reported through
/// [`Response::mark_infeasible`].
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, response: Response) -> Response;
}

/// A decision engine built from a [`TargetSelector`]
pub struct StrategyEngine<S> {
    name: &'static str,
    selector: S,
    actuator: Option<Arc<dyn ActuatorInvoker>>,
}

pub type RandomDecisionEngine = StrategyEngine<RandomSelector>;
pub type PriorityDecisionEngine = StrategyEngine<PrioritySelector>;
pub type PowerRankedDecisionEngine = StrategyEngine<PowerSelector>;

impl<S: TargetSelector> StrategyEngine<S> {
    pub fn new(name: &'static str, selector: S, actuator: Option<Arc<dyn ActuatorInvoker>>) -> Self {
        Self {
            name,
            selector,
            actuator,
        }
    }

    pub fn selector(&self) -> &S {
        &self.selector
    }
}

impl RandomDecisionEngine {
    pub fn random(actuator: Option<Arc<dyn ActuatorInvoker>>) -> Self {
        Self::new("random", RandomSelector::new(), actuator)
    }
}

impl PriorityDecisionEngine {
    pub fn priority(actuator: Option<Arc<dyn ActuatorInvoker>>) -> Self {
        Self::new("priority", PrioritySelector, actuator)
    }
}

impl PowerRankedDecisionEngine {
    pub fn power(actuator: Option<Arc<dyn ActuatorInvoker>>) -> Self {
        Self::new("power", PowerSelector, actuator)
    }
}

#[async_trait]
impl<S: TargetSelector> DecisionEngine for StrategyEngine<S> {
    fn name(&self) -> &str {
        self.name
    }

    async fn decide(&self, response: Response) -> Response {
        decide_with(&self.selector, self.actuator.as_deref(), response).await
    }
}

/// Canonical engine name for a configured name, if it is registered
pub fn resolve_engine_name(name: &str) -> Option<&'static str> {
    let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
    match normalized.as_str() {
        "random" | "randomdecisionengine" => Some("random"),
        "priority" | "last-task-created" | "lasttaskcreateddecisionengine" => Some("priority"),
        "power" | "power-ranked" | "powerrankeddecisionengine" => Some("power"),
        _ => None,
    }
}

/// Build the engine registered under `name`, falling back to
/// [`DEFAULT_ENGINE`] for unknown names
pub fn create_engine(name: &str, actuator: Option<Arc<dyn ActuatorInvoker>>) -> Arc<dyn DecisionEngine> {
    let canonical = resolve_engine_name(name).unwrap_or_else(|| {
        warn!(
            requested = %name,
            fallback = DEFAULT_ENGINE,
            "Unknown decision engine, using default"
        );
        DEFAULT_ENGINE
    });

    match canonical {
        "priority" => Arc::new(PriorityDecisionEngine::priority(actuator)),
        "power" => Arc::new(PowerRankedDecisionEngine::power(actuator)),
        _ => Arc::new(RandomDecisionEngine::random(actuator)),
    }
}
