//! Actuator capability and actuation pipeline
//!
//! This module provides:
//! - [`ActuatorInvoker`]: capability queries and command primitives of a backend
//! - [`ActionHandler`]: executes one finalized response
//! - [`ActuationDispatcher`]: queue plus single worker with per-item isolation
//! - [`Actuator`]: invoker and dispatcher bundled behind `actuate()`
//! - [`SimulatedActuator`]: in-memory backend for dry runs and tests

mod dispatcher;
mod handler;
mod simulated;

pub use dispatcher::{ActuationDispatcher, DispatchWorker, DispatcherConfig};
pub use handler::{ActionHandler, InvokerActionHandler};
pub use simulated::SimulatedActuator;

use crate::error::{AdaptError, Result};
use crate::models::{ApplicationDefinition, HostInfo, Task, TaskFilter};
use crate::response::Response;
use async_trait::async_trait;
use std::sync::Arc;

/// Resource kinds adjusted by the CPU and memory actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Cpu,
    Memory,
}

/// Capability surface of an actuation backend (job scheduler, REST
/// orchestrator, programming-model runtime).
///
/// Queries are used by decision engines; primitives by the action handler.
/// Primitives a backend cannot perform keep the default `Unsupported` body.
#[async_trait]
pub trait ActuatorInvoker: Send + Sync {
    fn name(&self) -> &str;

    async fn tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    async fn application_definition(
        &self,
        application_id: &str,
        deployment_id: &str,
    ) -> Result<Option<ApplicationDefinition>>;

    /// Measured power of one task in watts, 0 when unknown
    async fn task_power_usage(&self, task: &Task) -> Result<f64>;

    /// Mean measured power of the tasks of one type in watts, 0 when unknown
    async fn average_power_usage(
        &self,
        application_id: &str,
        deployment_id: &str,
        task_type: &str,
    ) -> Result<f64>;

    async fn total_power_usage(&self, application_id: &str, deployment_id: &str) -> Result<f64>;

    /// SLA power ceiling in watts, 0 when unset
    async fn power_limit(&self, application_id: &str, deployment_id: &str) -> Result<f64>;

    async fn hosts(&self) -> Result<Vec<HostInfo>>;

    async fn add_task(&self, application_id: &str, deployment_id: &str, task_type: &str) -> Result<()>;

    async fn delete_task(&self, application_id: &str, deployment_id: &str, task_id: &str) -> Result<()>;

    async fn scale_to(
        &self,
        application_id: &str,
        deployment_id: &str,
        task_type: &str,
        count: u32,
    ) -> Result<()>;

    async fn hard_kill(&self, application_id: &str, deployment_id: &str) -> Result<()>;

    async fn pause(&self, _application_id: &str, _deployment_id: &str) -> Result<()> {
        Err(AdaptError::Unsupported("pause".to_string()))
    }

    async fn unpause(&self, _application_id: &str, _deployment_id: &str) -> Result<()> {
        Err(AdaptError::Unsupported("unpause".to_string()))
    }

    /// Multiply the wall-time limit by `factor`
    async fn adjust_wall_time(&self, _application_id: &str, _deployment_id: &str, _factor: f64) -> Result<()> {
        Err(AdaptError::Unsupported("wall time adjustment".to_string()))
    }

    /// Change the cluster power cap by `delta_watts`
    async fn adjust_power_cap(&self, _delta_watts: f64) -> Result<()> {
        Err(AdaptError::Unsupported("power cap adjustment".to_string()))
    }

    async fn set_host_power(&self, _host_name: &str, _on: bool) -> Result<()> {
        Err(AdaptError::Unsupported("host power control".to_string()))
    }

    async fn reselect_accelerators(&self, _application_id: &str, _deployment_id: &str) -> Result<()> {
        Err(AdaptError::Unsupported("accelerator reselection".to_string()))
    }

    async fn adjust_resources(
        &self,
        _application_id: &str,
        _deployment_id: &str,
        _task_id: Option<&str>,
        _resource: ResourceKind,
        _delta: f64,
    ) -> Result<()> {
        Err(AdaptError::Unsupported("resource adjustment".to_string()))
    }

    async fn redeploy(&self, _application_id: &str, _deployment_id: &str) -> Result<()> {
        Err(AdaptError::Unsupported("redeploy".to_string()))
    }

    async fn set_exclusive(&self, _application_id: &str, _deployment_id: &str, _exclusive: bool) -> Result<()> {
        Err(AdaptError::Unsupported("exclusivity change".to_string()))
    }
}

/// A backend's capabilities together with its actuation queue
pub struct Actuator {
    invoker: Arc<dyn ActuatorInvoker>,
    dispatcher: ActuationDispatcher,
}

impl Actuator {
    pub fn new(invoker: Arc<dyn ActuatorInvoker>, dispatcher: ActuationDispatcher) -> Self {
        Self { invoker, dispatcher }
    }

    /// Wire an invoker to a dispatcher driving an [`InvokerActionHandler`].
    ///
    /// The returned worker must be spawned for queued responses to execute.
    pub fn with_invoker_handler(
        invoker: Arc<dyn ActuatorInvoker>,
        config: DispatcherConfig,
    ) -> (Self, DispatchWorker) {
        let handler = Arc::new(InvokerActionHandler::new(invoker.clone()));
        let (dispatcher, worker) = ActuationDispatcher::new(handler, config);
        (Self::new(invoker, dispatcher), worker)
    }

    pub fn invoker(&self) -> &Arc<dyn ActuatorInvoker> {
        &self.invoker
    }

    pub fn dispatcher(&self) -> &ActuationDispatcher {
        &self.dispatcher
    }

    /// Enqueue a finalized response; never blocks
    pub fn actuate(&self, response: Response) -> Result<()> {
        self.dispatcher.enqueue(response)
    }

    /// Ask the worker to finish the queued work and exit
    pub fn stop(&self) {
        self.dispatcher.stop();
    }
}

impl std::fmt::Debug for Actuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actuator")
            .field("invoker", &self.invoker.name())
            .field("queued", &self.dispatcher.queue_depth())
            .finish()
    }
}
