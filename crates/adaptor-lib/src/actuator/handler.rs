//! Execution of finalized responses against an actuator backend

use super::{ActuatorInvoker, ResourceKind};
use crate::decision::base::{POWER_INCREMENT, SLACK_FACTOR, TASK_COUNT, TASK_IDS, TASK_TYPE};
use crate::error::{AdaptError, Result};
use crate::models::TaskFilter;
use crate::response::{ActionType, Response};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Resource detail keys, only read at execution time
const CPU_INCREMENT: &str = "CPU_INCREMENT";
const MEMORY_INCREMENT: &str = "MEMORY_INCREMENT";

/// Executes one response. Errors are turned into response state by the dispatcher.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, response: &mut Response) -> Result<()>;
}

/// Maps each [`ActionType`] onto [`ActuatorInvoker`] primitives
pub struct InvokerActionHandler {
    invoker: Arc<dyn ActuatorInvoker>,
}

impl InvokerActionHandler {
    pub fn new(invoker: Arc<dyn ActuatorInvoker>) -> Self {
        Self { invoker }
    }

    /// Every deployment currently running tasks of the response's application
    async fn similar_deployments(&self, response: &Response) -> Result<Vec<(String, String)>> {
        let (application, _) = app_target(response)?;
        let tasks = self.invoker.tasks(&TaskFilter::for_application(application)).await?;
        let deployments: BTreeSet<String> = tasks.into_iter().map(|t| t.deployment_id).collect();
        Ok(deployments
            .into_iter()
            .map(|d| (application.to_string(), d))
            .collect())
    }
}

#[async_trait]
impl ActionHandler for InvokerActionHandler {
    async fn execute(&self, response: &mut Response) -> Result<()> {
        let inv = &self.invoker;
        debug!(
            response_id = response.id,
            action_type = %response.action_type,
            invoker = inv.name(),
            "Executing response"
        );

        match response.action_type {
            ActionType::AddTask => {
                let (app, dep) = app_target(response)?;
                let task_type = required(response, TASK_TYPE)?;
                inv.add_task(app, dep, &task_type).await
            }
            ActionType::RemoveTask => {
                let (app, dep) = app_target(response)?;
                let task_id = response
                    .task_id
                    .as_deref()
                    .ok_or_else(|| AdaptError::CommandFailed("no task selected for removal".to_string()))?;
                inv.delete_task(app, dep, task_id).await
            }
            ActionType::ScaleToNTasks => {
                let (app, dep) = app_target(response)?;
                // Shrinking removes exactly the tasks the decision engine chose
                let selected = selected_tasks(response);
                if !selected.is_empty() {
                    for task_id in &selected {
                        inv.delete_task(app, dep, task_id).await?;
                    }
                    return Ok(());
                }
                let task_type = required(response, TASK_TYPE)?;
                let count: u32 = required(response, TASK_COUNT)?
                    .parse()
                    .map_err(|_| AdaptError::CommandFailed("TASK_COUNT is not a count".to_string()))?;
                inv.scale_to(app, dep, &task_type, count).await
            }
            ActionType::AddCpu | ActionType::RemoveCpu => {
                let (app, dep) = app_target(response)?;
                let step = number(response, CPU_INCREMENT, 1.0);
                let delta = if response.action_type == ActionType::AddCpu { step } else { -step };
                inv.adjust_resources(app, dep, response.task_id.as_deref(), ResourceKind::Cpu, delta)
                    .await
            }
            ActionType::AddMemory | ActionType::RemoveMemory => {
                let (app, dep) = app_target(response)?;
                let step = number(response, MEMORY_INCREMENT, 1.0);
                let delta = if response.action_type == ActionType::AddMemory { step } else { -step };
                inv.adjust_resources(app, dep, response.task_id.as_deref(), ResourceKind::Memory, delta)
                    .await
            }
            ActionType::PauseApp => {
                let (app, dep) = app_target(response)?;
                inv.pause(app, dep).await
            }
            ActionType::UnpauseApp => {
                let (app, dep) = app_target(response)?;
                inv.unpause(app, dep).await
            }
            ActionType::HardKillApp => {
                let (app, dep) = app_target(response)?;
                inv.hard_kill(app, dep).await
            }
            ActionType::PauseSimilarApps => {
                for (app, dep) in self.similar_deployments(response).await? {
                    inv.pause(&app, &dep).await?;
                }
                Ok(())
            }
            ActionType::UnpauseSimilarApps => {
                for (app, dep) in self.similar_deployments(response).await? {
                    inv.unpause(&app, &dep).await?;
                }
                Ok(())
            }
            ActionType::KillSimilarApps => {
                for (app, dep) in self.similar_deployments(response).await? {
                    inv.hard_kill(&app, &dep).await?;
                }
                Ok(())
            }
            ActionType::IncreaseWallTime | ActionType::ReduceWallTime => {
                let (app, dep) = app_target(response)?;
                let factor = number(response, SLACK_FACTOR, 1.0);
                inv.adjust_wall_time(app, dep, factor).await
            }
            ActionType::IncreaseWallTimeSimilarApps | ActionType::ReduceWallTimeSimilarApps => {
                let factor = number(response, SLACK_FACTOR, 1.0);
                for (app, dep) in self.similar_deployments(response).await? {
                    inv.adjust_wall_time(&app, &dep, factor).await?;
                }
                Ok(())
            }
            ActionType::OversubscribeApp => {
                let (app, dep) = app_target(response)?;
                inv.set_exclusive(app, dep, false).await
            }
            ActionType::ExclusiveApp => {
                let (app, dep) = app_target(response)?;
                inv.set_exclusive(app, dep, true).await
            }
            ActionType::IncreaseClusterPowerCap => {
                inv.adjust_power_cap(number(response, POWER_INCREMENT, 0.0)).await
            }
            ActionType::ReduceClusterPowerCap => {
                inv.adjust_power_cap(-number(response, POWER_INCREMENT, 0.0)).await
            }
            ActionType::ShutdownHost | ActionType::StartupHost => {
                let host = response
                    .host_name
                    .as_deref()
                    .ok_or_else(|| AdaptError::CommandFailed("no host selected".to_string()))?;
                inv.set_host_power(host, response.action_type == ActionType::StartupHost)
                    .await
            }
            ActionType::ReselectAccelerators => {
                let (app, dep) = app_target(response)?;
                inv.reselect_accelerators(app, dep).await
            }
            ActionType::RedeployApp => {
                let (app, dep) = app_target(response)?;
                inv.redeploy(app, dep).await
            }
        }
    }
}

/// Application and deployment the response targets; deployment may be empty
fn app_target(response: &Response) -> Result<(&str, &str)> {
    let app = response
        .application_id
        .as_deref()
        .ok_or_else(|| AdaptError::CommandFailed("response has no target application".to_string()))?;
    Ok((app, response.deployment_id.as_deref().unwrap_or("")))
}

fn required(response: &Response, key: &str) -> Result<String> {
    response
        .detail(key)
        .ok_or_else(|| AdaptError::CommandFailed(format!("missing {} in adaptation details", key)))
}

/// Task ids listed in `TASK_IDS`, in selection order
fn selected_tasks(response: &Response) -> Vec<String> {
    response
        .detail(TASK_IDS)
        .map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn number(response: &Response, key: &str, default: f64) -> f64 {
    response.details().get_f64(key).unwrap_or(default)
}
