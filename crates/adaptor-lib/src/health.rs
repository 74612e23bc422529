//! Component health for liveness and readiness checks
//!
//! Each long-running part of the adaptor reports its own state: the
//! dispatcher worker degrades while a backlog builds and turns unhealthy once
//! it exits, the pruner degrades when a pass overruns its interval, and the
//! listeners report whether they are bound to an assessor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Long-running parts of the adaptor that report health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    Assessor,
    Pruner,
    Dispatcher,
    Listener,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Assessor,
        Component::Pruner,
        Component::Dispatcher,
        Component::Listener,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Assessor => "assessor",
            Component::Pruner => "pruner",
            Component::Dispatcher => "dispatcher",
            Component::Listener => "listener",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still acting, but behind or slow
    Degraded,
    /// No longer acting
    Unhealthy,
}

/// Last reported state of one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }

    /// Health of a queue holding `pending` items; degraded above `limit`
    pub fn for_backlog(pending: usize, limit: usize) -> Self {
        if pending > limit {
            Self::degraded(format!("{} responses pending, limit {}", pending, limit))
        } else {
            Self::healthy()
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status over all components
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    components: BTreeMap<Component, ComponentHealth>,
    initialized: bool,
}

/// Shared registry the components report into
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a component as healthy
    pub async fn register(&self, component: Component) {
        self.report(component, ComponentHealth::healthy()).await;
    }

    pub async fn report(&self, component: Component, health: ComponentHealth) {
        self.state.write().await.components.insert(component, health);
    }

    pub async fn set_healthy(&self, component: Component) {
        self.report(component, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.report(component, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.report(component, ComponentHealth::unhealthy(message)).await;
    }

    /// Last report of a component, if it was ever registered
    pub async fn status(&self, component: Component) -> Option<ComponentHealth> {
        self.state.read().await.components.get(&component).cloned()
    }

    /// Mark the adaptor as fully wired (or as shutting down)
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.initialized = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        let components = state
            .components
            .iter()
            .map(|(c, h)| (c.as_str().to_string(), h.clone()))
            .collect();
        HealthResponse { status, components }
    }

    /// Ready once initialized and while no component has stopped acting
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.initialized {
            return ReadinessResponse {
                ready: false,
                reason: Some("Adaptor not yet initialized".to_string()),
            };
        }

        let down = state
            .components
            .iter()
            .find(|(_, h)| h.status == ComponentStatus::Unhealthy);
        match down {
            Some((component, health)) => ReadinessResponse {
                ready: false,
                reason: Some(match &health.message {
                    Some(message) => format!("{} unhealthy: {}", component, message),
                    None => format!("{} unhealthy", component),
                }),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Adaptor not yet initialized"));
    }

    #[tokio::test]
    async fn test_overall_status_is_worst_component() {
        let registry = HealthRegistry::new();
        for component in Component::ALL {
            registry.register(component).await;
        }
        registry.set_degraded(Component::Dispatcher, "backlog").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry.set_unhealthy(Component::Listener, "channel closed").await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert_eq!(health.components.len(), 4);
        assert_eq!(health.components["listener"].status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_readiness_names_stopped_component() {
        let registry = HealthRegistry::new();
        registry.register(Component::Dispatcher).await;
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry.set_unhealthy(Component::Dispatcher, "actuation worker stopped").await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("dispatcher unhealthy: actuation worker stopped")
        );
    }

    #[tokio::test]
    async fn test_degraded_component_stays_ready() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry.set_degraded(Component::Pruner, "slow pass").await;

        assert!(registry.readiness().await.ready);
        assert_eq!(
            registry.status(Component::Pruner).await.map(|h| h.status),
            Some(ComponentStatus::Degraded)
        );
    }

    #[test]
    fn test_backlog_health() {
        assert_eq!(ComponentHealth::for_backlog(10, 10).status, ComponentStatus::Healthy);
        let over = ComponentHealth::for_backlog(11, 10);
        assert_eq!(over.status, ComponentStatus::Degraded);
        assert_eq!(over.message.as_deref(), Some("11 responses pending, limit 10"));
    }

    #[test]
    fn test_component_health_serialization() {
        let json = serde_json::to_value(ComponentHealth::healthy()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json.get("message").is_none());
    }
}
