//! Feasibility logic shared by every decision strategy
//!
//! [`decide_with`] resolves the target of a response: which task type to
//! grow, which task to remove, how many tasks to scale to, which host to
//! power. It gathers candidates from the actuator, vetoes the ones that would
//! break an instance bound or the SLA power limit, and lets a
//! [`TargetSelector`] order the survivors. The verdict (feasible or not)
//! never depends on the selector, only the choice among feasible targets.

use crate::actuator::ActuatorInvoker;
use crate::models::{ApplicationDefinition, HostInfo, HostState, Task, TaskFilter};
use crate::response::{ActionType, Response};
use std::collections::BTreeMap;
use tracing::debug;

pub const TASK_TYPE: &str = "TASK_TYPE";
pub const TASK_COUNT: &str = "TASK_COUNT";
pub const TASK_IDS: &str = "TASK_IDS";
pub const SLACK_FACTOR: &str = "SLACK_FACTOR";
pub const POWER_INCREMENT: &str = "POWER_INCREMENT";

pub const DEFAULT_POWER_INCREMENT: f64 = 100.0;
pub const DEFAULT_INCREASE_SLACK: f64 = 1.25;
pub const DEFAULT_REDUCE_SLACK: f64 = 0.8;

/// A task type that could receive one more instance
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCandidate {
    pub name: String,
    pub priority: i32,
    pub running: u32,
    /// Mean measured power of one instance, 0 when unknown
    pub average_power: f64,
    /// Creation time of the oldest running instance
    pub oldest_created: Option<i64>,
}

/// A running task that could be removed
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCandidate {
    pub task: Task,
    /// Measured power, 0 when unknown
    pub power: f64,
}

/// Ordering policy of a decision strategy
///
/// Each method reorders feasible candidates in place; the caller takes
/// candidates from the front.
pub trait TargetSelector: Send + Sync {
    /// First entry is grown
    fn order_types(&self, candidates: &mut [TypeCandidate]);

    /// First entries are removed
    fn order_removals(&self, candidates: &mut [TaskCandidate]);

    /// Startup takes the first powered-off host, shutdown the last idle one.
    ///
    /// Defaults to least flexible workload first, then longest queue, then
    /// cheapest idle power.
    fn order_hosts(&self, hosts: &mut [HostInfo]) {
        rank_hosts(hosts);
    }
}

/// Least flexible workload first, then longest queue, then lowest idle power
pub fn rank_hosts(hosts: &mut [HostInfo]) {
    hosts.sort_by(|a, b| {
        a.workload_class
            .cmp(&b.workload_class)
            .then(b.queue_length.cmp(&a.queue_length))
            .then(a.idle_power_watts.total_cmp(&b.idle_power_watts))
    });
}

/// Outcome of target resolution; `Err` carries the infeasibility reason
type Decision = std::result::Result<(), String>;

/// Resolve the target of `response` using `selector` for ordering
pub async fn decide_with(
    selector: &dyn TargetSelector,
    actuator: Option<&dyn ActuatorInvoker>,
    mut response: Response,
) -> Response {
    let Some(actuator) = actuator else {
        response.mark_infeasible("no actuator bound");
        return response;
    };

    if let Err(reason) = resolve(selector, actuator, &mut response).await {
        debug!(
            response_id = response.id,
            action_type = %response.action_type,
            reason = %reason,
            "No feasible target"
        );
        response.mark_infeasible(reason);
    }
    response
}

async fn resolve(
    selector: &dyn TargetSelector,
    actuator: &dyn ActuatorInvoker,
    response: &mut Response,
) -> Decision {
    match response.action_type {
        ActionType::AddTask => add_task(selector, actuator, response).await,
        ActionType::RemoveTask => remove_task(selector, actuator, response).await,
        ActionType::ScaleToNTasks => scale_to(selector, actuator, response).await,
        ActionType::ShutdownHost => shutdown_host(selector, actuator, response).await,
        ActionType::StartupHost => startup_host(selector, actuator, response).await,
        ActionType::IncreaseClusterPowerCap | ActionType::ReduceClusterPowerCap => {
            default_number(response, POWER_INCREMENT, DEFAULT_POWER_INCREMENT)
        }
        ActionType::IncreaseWallTime | ActionType::IncreaseWallTimeSimilarApps => {
            application(response)?;
            default_number(response, SLACK_FACTOR, DEFAULT_INCREASE_SLACK)
        }
        ActionType::ReduceWallTime | ActionType::ReduceWallTimeSimilarApps => {
            application(response)?;
            default_number(response, SLACK_FACTOR, DEFAULT_REDUCE_SLACK)
        }
        ActionType::AddCpu
        | ActionType::RemoveCpu
        | ActionType::AddMemory
        | ActionType::RemoveMemory
        | ActionType::PauseApp
        | ActionType::UnpauseApp
        | ActionType::PauseSimilarApps
        | ActionType::UnpauseSimilarApps
        | ActionType::HardKillApp
        | ActionType::KillSimilarApps
        | ActionType::OversubscribeApp
        | ActionType::ExclusiveApp
        | ActionType::ReselectAccelerators
        | ActionType::RedeployApp => application(response).map(|_| ()),
    }
}

/// Target application and deployment; an unknown deployment is empty and
/// matches any deployment of the application
fn application(response: &Response) -> std::result::Result<(String, String), String> {
    let app = response
        .application_id
        .clone()
        .ok_or_else(|| "no application to adapt".to_string())?;
    Ok((app, response.deployment_id.clone().unwrap_or_default()))
}

fn query_failed(e: crate::error::AdaptError) -> String {
    format!("capability query failed: {}", e)
}

/// The attached definition, else a lookup through the actuator
async fn definition(
    actuator: &dyn ActuatorInvoker,
    response: &Response,
    app: &str,
    dep: &str,
) -> Option<ApplicationDefinition> {
    if let Some(def) = response.cause.definition() {
        return Some(def.clone());
    }
    actuator.application_definition(app, dep).await.ok().flatten()
}

/// Instance bounds of a task type, unbounded when not defined
fn bounds(definition: Option<&ApplicationDefinition>, task_type: &str) -> (u32, u32) {
    definition
        .and_then(|d| d.task_type(task_type))
        .map(|t| (t.min_instances, t.max_instances))
        .unwrap_or((0, u32::MAX))
}

fn count_by_type(tasks: &[Task]) -> BTreeMap<&str, u32> {
    let mut counts = BTreeMap::new();
    for task in tasks {
        *counts.entry(task.task_type.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Power the deployment may still draw; `None` when the check is skipped
async fn power_headroom(actuator: &dyn ActuatorInvoker, app: &str, dep: &str) -> Option<f64> {
    let limit = actuator.power_limit(app, dep).await.unwrap_or(0.0);
    let total = actuator.total_power_usage(app, dep).await.unwrap_or(0.0);
    if limit <= 0.0 || total <= 0.0 {
        return None;
    }
    Some(limit - total)
}

async fn add_task(
    selector: &dyn TargetSelector,
    actuator: &dyn ActuatorInvoker,
    response: &mut Response,
) -> Decision {
    let (app, dep) = application(response)?;
    let def = definition(actuator, response, &app, &dep).await;
    let running = actuator
        .tasks(&TaskFilter::for_deployment(&app, &dep))
        .await
        .map_err(query_failed)?;
    let counts = count_by_type(&running);

    let names: Vec<String> = if let Some(requested) = response.detail(TASK_TYPE) {
        vec![requested]
    } else if let Some(d) = def.as_ref().filter(|d| !d.task_types.is_empty()) {
        d.task_types.iter().map(|t| t.name.clone()).collect()
    } else {
        counts.keys().map(|k| k.to_string()).collect()
    };
    if names.is_empty() {
        return Err(format!("no task type known for {}", app));
    }

    let headroom = power_headroom(actuator, &app, &dep).await;
    let mut candidates = Vec::new();
    for name in names {
        let running_now = counts.get(name.as_str()).copied().unwrap_or(0);
        let (_, max) = bounds(def.as_ref(), &name);
        if running_now >= max {
            continue;
        }
        let average_power = actuator
            .average_power_usage(&app, &dep, &name)
            .await
            .unwrap_or(0.0);
        if let Some(headroom) = headroom {
            if average_power > headroom {
                continue;
            }
        }
        candidates.push(TypeCandidate {
            priority: def
                .as_ref()
                .and_then(|d| d.task_type(&name))
                .map(|t| t.priority)
                .unwrap_or_default(),
            oldest_created: running
                .iter()
                .filter(|t| t.task_type == name)
                .map(|t| t.created_at)
                .min(),
            name,
            running: running_now,
            average_power,
        });
    }

    if candidates.is_empty() {
        return Err("every task type is at its maximum or would exceed the power limit".to_string());
    }
    selector.order_types(&mut candidates);
    response.set_detail(TASK_TYPE, candidates[0].name.clone());
    Ok(())
}

/// Running tasks above their type's minimum, with power readings
async fn removal_candidates(
    actuator: &dyn ActuatorInvoker,
    def: Option<&ApplicationDefinition>,
    running: &[Task],
    task_type: Option<&str>,
) -> Vec<TaskCandidate> {
    let counts = count_by_type(running);
    let mut candidates = Vec::new();
    for task in running {
        if task_type.is_some_and(|t| t != task.task_type) {
            continue;
        }
        let (min, _) = bounds(def, &task.task_type);
        if counts.get(task.task_type.as_str()).copied().unwrap_or(0) <= min {
            continue;
        }
        let power = actuator.task_power_usage(task).await.unwrap_or(0.0);
        candidates.push(TaskCandidate {
            task: task.clone(),
            power,
        });
    }
    candidates
}

async fn remove_task(
    selector: &dyn TargetSelector,
    actuator: &dyn ActuatorInvoker,
    response: &mut Response,
) -> Decision {
    let (app, dep) = application(response)?;
    let def = definition(actuator, response, &app, &dep).await;
    let running = actuator
        .tasks(&TaskFilter::for_deployment(&app, &dep))
        .await
        .map_err(query_failed)?;
    let task_type = response.detail(TASK_TYPE);

    let mut candidates = removal_candidates(actuator, def.as_ref(), &running, task_type.as_deref()).await;
    if candidates.is_empty() {
        return Err("no task can be removed without going below the minimum".to_string());
    }
    selector.order_removals(&mut candidates);

    let chosen = &candidates[0].task;
    response.task_id = Some(chosen.task_id.clone());
    response.deployment_id = Some(chosen.deployment_id.clone());
    response.set_detail(TASK_TYPE, chosen.task_type.clone());
    Ok(())
}

async fn scale_to(
    selector: &dyn TargetSelector,
    actuator: &dyn ActuatorInvoker,
    response: &mut Response,
) -> Decision {
    let (app, dep) = application(response)?;
    let requested = response
        .details()
        .get_u32(TASK_COUNT)
        .ok_or_else(|| "TASK_COUNT is missing or not a count".to_string())?;
    let def = definition(actuator, response, &app, &dep).await;
    let running = actuator
        .tasks(&TaskFilter::for_deployment(&app, &dep))
        .await
        .map_err(query_failed)?;

    let task_type = response
        .detail(TASK_TYPE)
        .or_else(|| def.as_ref().and_then(|d| d.task_types.first()).map(|t| t.name.clone()))
        .or_else(|| running.first().map(|t| t.task_type.clone()))
        .ok_or_else(|| format!("no task type known for {}", app))?;

    let (min, max) = bounds(def.as_ref(), &task_type);
    let target = requested.clamp(min, max.max(min));
    let current = running.iter().filter(|t| t.task_type == task_type).count() as u32;

    response.set_detail(TASK_TYPE, task_type.clone());
    if target != requested {
        response.set_detail(TASK_COUNT, target.to_string());
    }

    if target == current {
        return Err(format!("already at target of {} {} tasks", target, task_type));
    }

    if target > current {
        let delta = (target - current) as f64;
        if let Some(headroom) = power_headroom(actuator, &app, &dep).await {
            let average = actuator
                .average_power_usage(&app, &dep, &task_type)
                .await
                .unwrap_or(0.0);
            if average * delta > headroom {
                return Err(format!(
                    "adding {} {} tasks would exceed the power limit",
                    delta, task_type
                ));
            }
        }
        return Ok(());
    }

    let excess = (current - target) as usize;
    let mut candidates: Vec<TaskCandidate> = Vec::new();
    for task in running.iter().filter(|t| t.task_type == task_type) {
        let power = actuator.task_power_usage(task).await.unwrap_or(0.0);
        candidates.push(TaskCandidate {
            task: task.clone(),
            power,
        });
    }
    selector.order_removals(&mut candidates);
    let ids: Vec<String> = candidates
        .iter()
        .take(excess)
        .map(|c| c.task.task_id.clone())
        .collect();
    response.set_detail(TASK_IDS, ids.join(","));
    Ok(())
}

async fn shutdown_host(
    selector: &dyn TargetSelector,
    actuator: &dyn ActuatorInvoker,
    response: &mut Response,
) -> Decision {
    if response.host_name.is_some() {
        return Ok(());
    }
    let mut idle: Vec<HostInfo> = actuator
        .hosts()
        .await
        .map_err(query_failed)?
        .into_iter()
        .filter(|h| h.state == HostState::Idle)
        .collect();
    selector.order_hosts(&mut idle);
    let host = idle.pop().ok_or_else(|| "no idle host to shut down".to_string())?;
    response.host_name = Some(host.name);
    Ok(())
}

async fn startup_host(
    selector: &dyn TargetSelector,
    actuator: &dyn ActuatorInvoker,
    response: &mut Response,
) -> Decision {
    let mut off: Vec<HostInfo> = actuator
        .hosts()
        .await
        .map_err(query_failed)?
        .into_iter()
        .filter(|h| h.state == HostState::Off)
        .collect();
    if off.is_empty() {
        return Err("no powered-off host to start".to_string());
    }
    selector.order_hosts(&mut off);
    response.host_name = Some(off.swap_remove(0).name);
    Ok(())
}

/// Fill in a numeric detail if unset; reject it if it is not a number
fn default_number(response: &mut Response, key: &str, default: f64) -> Decision {
    match response.detail(key) {
        None => {
            response.set_detail(key, default.to_string());
            Ok(())
        }
        Some(v) if v.parse::<f64>().is_ok() => Ok(()),
        Some(v) => Err(format!("{} is not a number: {}", key, v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SimulatedActuator;
    use crate::event::{Event, EventType, Operator};
    use crate::models::{FlexibilityClass, TaskTypeDefinition};
    use std::sync::Arc;

    /// Keeps discovery order
    struct InOrder;

    impl TargetSelector for InOrder {
        fn order_types(&self, _: &mut [TypeCandidate]) {}
        fn order_removals(&self, _: &mut [TaskCandidate]) {}
    }

    fn response(action: ActionType, details: &str) -> Response {
        let cause = Arc::new(
            Event::new("g-1", "power", 100, 5.0, 3.0, EventType::Breach, Operator::Gt)
                .for_application("lammps", "7"),
        );
        Response::new(cause, action, details, 100)
    }

    fn sim_with_workers(workers: usize, max: u32) -> SimulatedActuator {
        let sim = SimulatedActuator::new();
        sim.add_application(
            ApplicationDefinition::new("lammps", "7")
                .with_task_type(TaskTypeDefinition::new("worker", 1, max)),
        );
        for _ in 0..workers {
            let id = sim.spawn_task("lammps", "7", "worker", "node-1");
            sim.set_task_power(&id, 100.0);
        }
        sim
    }

    fn host(name: &str, state: HostState, class: FlexibilityClass, queue: u32, idle: f64) -> HostInfo {
        HostInfo {
            name: name.to_string(),
            state,
            workload_class: class,
            queue_length: queue,
            idle_power_watts: idle,
        }
    }

    #[tokio::test]
    async fn test_no_actuator_is_infeasible() {
        let r = decide_with(&InOrder, None, response(ActionType::AddTask, "")).await;
        assert!(!r.possible_to_adapt);
        assert_eq!(r.reason.as_deref(), Some("no actuator bound"));
    }

    #[tokio::test]
    async fn test_add_task_picks_type_from_definition() {
        let sim = sim_with_workers(1, 4);
        let r = decide_with(&InOrder, Some(&sim), response(ActionType::AddTask, "")).await;
        assert!(r.possible_to_adapt);
        assert_eq!(r.detail(TASK_TYPE).as_deref(), Some("worker"));
    }

    #[tokio::test]
    async fn test_add_task_at_max_is_infeasible() {
        let sim = sim_with_workers(2, 2);
        let r = decide_with(&InOrder, Some(&sim), response(ActionType::AddTask, "")).await;
        assert!(!r.possible_to_adapt);
        assert!(r.reason.is_some());
    }

    #[tokio::test]
    async fn test_add_task_vetoed_by_power_limit() {
        let sim = sim_with_workers(2, 10);
        // 200 W drawn, 100 W per task, limit 250 W
        sim.set_power_limit("lammps", "7", 250.0);
        let r = decide_with(&InOrder, Some(&sim), response(ActionType::AddTask, "")).await;
        assert!(!r.possible_to_adapt);

        sim.set_power_limit("lammps", "7", 300.0);
        let r = decide_with(&InOrder, Some(&sim), response(ActionType::AddTask, "")).await;
        assert!(r.possible_to_adapt);
    }

    #[tokio::test]
    async fn test_power_check_skipped_without_measurements() {
        let sim = SimulatedActuator::new();
        sim.add_application(
            ApplicationDefinition::new("lammps", "7")
                .with_task_type(TaskTypeDefinition::new("worker", 0, 10)),
        );
        sim.spawn_task("lammps", "7", "worker", "node-1");
        // Limit set but no power telemetry at all
        sim.set_power_limit("lammps", "7", 1.0);

        let r = decide_with(&InOrder, Some(&sim), response(ActionType::AddTask, "")).await;
        assert!(r.possible_to_adapt);
    }

    #[tokio::test]
    async fn test_remove_task_respects_minimum() {
        let sim = sim_with_workers(1, 4);
        let r = decide_with(&InOrder, Some(&sim), response(ActionType::RemoveTask, "")).await;
        assert!(!r.possible_to_adapt);

        let sim = sim_with_workers(2, 4);
        let r = decide_with(&InOrder, Some(&sim), response(ActionType::RemoveTask, "")).await;
        assert!(r.possible_to_adapt);
        assert!(r.task_id.is_some());
    }

    #[tokio::test]
    async fn test_missing_application_is_infeasible() {
        let sim = sim_with_workers(2, 4);
        let cause = Arc::new(Event::new("g-1", "power", 100, 5.0, 3.0, EventType::Breach, Operator::Gt));
        let r = Response::new(cause, ActionType::PauseApp, "", 100);

        let r = decide_with(&InOrder, Some(&sim), r).await;
        assert!(!r.possible_to_adapt);
        assert_eq!(r.reason.as_deref(), Some("no application to adapt"));
    }

    #[tokio::test]
    async fn test_scale_to_clamps_and_selects_removals() {
        let sim = sim_with_workers(4, 6);

        let r = decide_with(&InOrder, Some(&sim), response(ActionType::ScaleToNTasks, "TASK_COUNT=2")).await;
        assert!(r.possible_to_adapt);
        let ids = r.detail(TASK_IDS).unwrap();
        assert_eq!(ids.split(',').count(), 2);

        // Clamped to the minimum of 1
        let r = decide_with(&InOrder, Some(&sim), response(ActionType::ScaleToNTasks, "TASK_COUNT=0")).await;
        assert_eq!(r.detail(TASK_COUNT).as_deref(), Some("1"));
        assert_eq!(r.detail(TASK_IDS).unwrap().split(',').count(), 3);

        let r = decide_with(&InOrder, Some(&sim), response(ActionType::ScaleToNTasks, "TASK_COUNT=4")).await;
        assert!(!r.possible_to_adapt);

        let r = decide_with(&InOrder, Some(&sim), response(ActionType::ScaleToNTasks, "")).await;
        assert!(!r.possible_to_adapt);
    }

    #[tokio::test]
    async fn test_host_selection() {
        let sim = SimulatedActuator::new();
        sim.add_host(host("rigid-idle", HostState::Idle, FlexibilityClass::Rigid, 0, 100.0));
        sim.add_host(host("malleable-idle", HostState::Idle, FlexibilityClass::Malleable, 0, 100.0));
        sim.add_host(host("off-cheap", HostState::Off, FlexibilityClass::Rigid, 0, 50.0));
        sim.add_host(host("off-queued", HostState::Off, FlexibilityClass::Rigid, 5, 200.0));

        let cause = Arc::new(Event::new("g-h", "idle", 100, 1.0, 0.0, EventType::Other, Operator::Eq));
        let down = decide_with(&InOrder, Some(&sim), Response::new(cause.clone(), ActionType::ShutdownHost, "", 100)).await;
        assert_eq!(down.host_name.as_deref(), Some("malleable-idle"));

        let up = decide_with(&InOrder, Some(&sim), Response::new(cause, ActionType::StartupHost, "", 100)).await;
        assert_eq!(up.host_name.as_deref(), Some("off-queued"));
    }

    #[tokio::test]
    async fn test_shutdown_keeps_event_host() {
        let sim = SimulatedActuator::new();
        let cause = Arc::new(
            Event::new("g-h", "idle", 100, 1.0, 0.0, EventType::Other, Operator::Eq).for_host("node-9"),
        );
        let r = decide_with(&InOrder, Some(&sim), Response::new(cause, ActionType::ShutdownHost, "", 100)).await;
        assert!(r.possible_to_adapt);
        assert_eq!(r.host_name.as_deref(), Some("node-9"));
    }

    #[tokio::test]
    async fn test_defaults_for_power_cap_and_wall_time() {
        let sim = SimulatedActuator::new();
        let r = decide_with(&InOrder, Some(&sim), response(ActionType::ReduceClusterPowerCap, "")).await;
        assert_eq!(r.detail(POWER_INCREMENT).as_deref(), Some("100"));

        let r = decide_with(&InOrder, Some(&sim), response(ActionType::IncreaseWallTime, "")).await;
        assert_eq!(r.detail(SLACK_FACTOR).as_deref(), Some("1.25"));

        let r = decide_with(&InOrder, Some(&sim), response(ActionType::ReduceWallTime, "SLACK_FACTOR=fast")).await;
        assert!(!r.possible_to_adapt);
    }
}
