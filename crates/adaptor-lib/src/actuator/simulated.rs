//! In-memory actuator backend
//!
//! Keeps a task, host and application inventory in memory and applies
//! commands to it. The daemon uses it for dry runs; tests use it as a
//! deterministic backend.

use super::{ActuatorInvoker, ResourceKind};
use crate::error::{AdaptError, Result};
use crate::models::{ApplicationDefinition, HostInfo, HostState, Task, TaskFilter};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use tracing::info;

type DeploymentKey = (String, String);

#[derive(Debug, Default)]
struct Inventory {
    tasks: Vec<Task>,
    hosts: Vec<HostInfo>,
    applications: Vec<ApplicationDefinition>,
    task_power: HashMap<String, f64>,
    power_limits: HashMap<DeploymentKey, f64>,
    default_power_limit: f64,
    power_cap: f64,
    paused: BTreeSet<DeploymentKey>,
    exclusive: BTreeSet<DeploymentKey>,
    wall_time_factors: HashMap<DeploymentKey, f64>,
    resource_deltas: HashMap<(String, &'static str), f64>,
    commands: Vec<String>,
    next_task_id: u64,
    clock: i64,
}

impl Inventory {
    fn deployment_tasks<'a>(&'a self, app: &'a str, dep: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        let filter = TaskFilter::for_deployment(app, dep);
        self.tasks.iter().filter(move |t| filter.matches(t))
    }

    fn spawn(&mut self, app: &str, dep: &str, task_type: &str, host: Option<&str>) -> String {
        self.next_task_id += 1;
        self.clock += 1;
        let task_id = format!("{}-{}-{}", app, task_type, self.next_task_id);

        let host_name = match host {
            Some(h) => h.to_string(),
            None => self
                .hosts
                .iter()
                .find(|h| h.state != HostState::Off)
                .map(|h| h.name.clone())
                .unwrap_or_else(|| "localhost".to_string()),
        };
        if let Some(h) = self.hosts.iter_mut().find(|h| h.name == host_name) {
            h.state = HostState::Busy;
        }

        // A new task draws what its siblings draw on average
        let siblings: Vec<f64> = self
            .deployment_tasks(app, dep)
            .filter(|t| t.task_type == task_type)
            .filter_map(|t| self.task_power.get(&t.task_id).copied())
            .collect();
        if !siblings.is_empty() {
            let avg = siblings.iter().sum::<f64>() / siblings.len() as f64;
            self.task_power.insert(task_id.clone(), avg);
        }

        let priority = self
            .applications
            .iter()
            .find(|a| a.name == app && a.deployment_id == dep)
            .and_then(|a| a.task_type(task_type))
            .map(|t| t.priority)
            .unwrap_or_default();

        self.tasks.push(Task {
            task_id: task_id.clone(),
            task_type: task_type.to_string(),
            application_id: app.to_string(),
            deployment_id: dep.to_string(),
            host_name,
            created_at: self.clock,
            priority,
        });
        task_id
    }

    fn remove(&mut self, task_id: &str) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.task_id == task_id)?;
        self.task_power.remove(task_id);
        let task = self.tasks.remove(idx);
        self.settle_host(&task.host_name);
        Some(task)
    }

    /// A host with no tasks left goes back to idle
    fn settle_host(&mut self, host_name: &str) {
        let busy = self.tasks.iter().any(|t| t.host_name == host_name);
        if let Some(h) = self.hosts.iter_mut().find(|h| h.name == host_name) {
            if !busy && h.state == HostState::Busy {
                h.state = HostState::Idle;
            }
        }
    }

    fn log(&mut self, command: String) {
        info!(command = %command, "Simulated actuation");
        self.commands.push(command);
    }
}

/// In-memory [`ActuatorInvoker`]
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    inventory: RwLock<Inventory>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a static inventory
    pub fn from_inventory(
        hosts: Vec<HostInfo>,
        applications: Vec<ApplicationDefinition>,
        tasks: Vec<Task>,
        power_limit_watts: f64,
    ) -> Self {
        let clock = tasks.iter().map(|t| t.created_at).max().unwrap_or_default();
        Self {
            inventory: RwLock::new(Inventory {
                hosts,
                applications,
                tasks,
                default_power_limit: power_limit_watts,
                clock,
                ..Default::default()
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inventory> {
        self.inventory.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inventory> {
        self.inventory.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_application(&self, definition: ApplicationDefinition) {
        self.write().applications.push(definition);
    }

    pub fn add_host(&self, host: HostInfo) {
        self.write().hosts.push(host);
    }

    /// Start a task directly, bypassing the command log. Returns its id.
    pub fn spawn_task(&self, app: &str, dep: &str, task_type: &str, host: &str) -> String {
        self.write().spawn(app, dep, task_type, Some(host))
    }

    pub fn set_task_power(&self, task_id: &str, watts: f64) {
        self.write().task_power.insert(task_id.to_string(), watts);
    }

    pub fn set_power_limit(&self, app: &str, dep: &str, watts: f64) {
        self.write()
            .power_limits
            .insert((app.to_string(), dep.to_string()), watts);
    }

    pub fn set_power_cap(&self, watts: f64) {
        self.write().power_cap = watts;
    }

    pub fn power_cap(&self) -> f64 {
        self.read().power_cap
    }

    pub fn is_paused(&self, app: &str, dep: &str) -> bool {
        self.read()
            .paused
            .contains(&(app.to_string(), dep.to_string()))
    }

    pub fn is_exclusive(&self, app: &str, dep: &str) -> bool {
        self.read()
            .exclusive
            .contains(&(app.to_string(), dep.to_string()))
    }

    /// Accumulated wall-time multiplier, 1.0 when never adjusted
    pub fn wall_time_factor(&self, app: &str, dep: &str) -> f64 {
        self.read()
            .wall_time_factors
            .get(&(app.to_string(), dep.to_string()))
            .copied()
            .unwrap_or(1.0)
    }

    /// Commands applied so far, oldest first
    pub fn commands(&self) -> Vec<String> {
        self.read().commands.clone()
    }
}

fn key(app: &str, dep: &str) -> DeploymentKey {
    (app.to_string(), dep.to_string())
}

#[async_trait]
impl ActuatorInvoker for SimulatedActuator {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self
            .read()
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn application_definition(
        &self,
        application_id: &str,
        deployment_id: &str,
    ) -> Result<Option<ApplicationDefinition>> {
        let inv = self.read();
        let exact = inv
            .applications
            .iter()
            .find(|a| a.name == application_id && a.deployment_id == deployment_id);
        let by_name = || inv.applications.iter().find(|a| a.name == application_id);
        Ok(exact.or_else(by_name).cloned())
    }

    async fn task_power_usage(&self, task: &Task) -> Result<f64> {
        Ok(self.read().task_power.get(&task.task_id).copied().unwrap_or(0.0))
    }

    async fn average_power_usage(
        &self,
        application_id: &str,
        deployment_id: &str,
        task_type: &str,
    ) -> Result<f64> {
        let inv = self.read();
        let readings: Vec<f64> = inv
            .deployment_tasks(application_id, deployment_id)
            .filter(|t| t.task_type == task_type)
            .filter_map(|t| inv.task_power.get(&t.task_id).copied())
            .collect();
        if readings.is_empty() {
            return Ok(0.0);
        }
        Ok(readings.iter().sum::<f64>() / readings.len() as f64)
    }

    async fn total_power_usage(&self, application_id: &str, deployment_id: &str) -> Result<f64> {
        let inv = self.read();
        Ok(inv
            .deployment_tasks(application_id, deployment_id)
            .filter_map(|t| inv.task_power.get(&t.task_id))
            .sum())
    }

    async fn power_limit(&self, application_id: &str, deployment_id: &str) -> Result<f64> {
        let inv = self.read();
        Ok(inv
            .power_limits
            .get(&key(application_id, deployment_id))
            .copied()
            .unwrap_or(inv.default_power_limit))
    }

    async fn hosts(&self) -> Result<Vec<HostInfo>> {
        Ok(self.read().hosts.clone())
    }

    async fn add_task(&self, application_id: &str, deployment_id: &str, task_type: &str) -> Result<()> {
        let mut inv = self.write();
        let task_id = inv.spawn(application_id, deployment_id, task_type, None);
        inv.log(format!("add_task {} {} {} -> {}", application_id, deployment_id, task_type, task_id));
        Ok(())
    }

    async fn delete_task(&self, application_id: &str, deployment_id: &str, task_id: &str) -> Result<()> {
        let mut inv = self.write();
        inv.remove(task_id)
            .ok_or_else(|| AdaptError::CommandFailed(format!("no such task: {}", task_id)))?;
        inv.log(format!("delete_task {} {} {}", application_id, deployment_id, task_id));
        Ok(())
    }

    async fn scale_to(
        &self,
        application_id: &str,
        deployment_id: &str,
        task_type: &str,
        count: u32,
    ) -> Result<()> {
        let mut inv = self.write();
        let mut current: Vec<(i64, String)> = inv
            .deployment_tasks(application_id, deployment_id)
            .filter(|t| t.task_type == task_type)
            .map(|t| (t.created_at, t.task_id.clone()))
            .collect();
        let target = count as usize;

        if current.len() < target {
            for _ in current.len()..target {
                inv.spawn(application_id, deployment_id, task_type, None);
            }
        } else {
            // Newest first
            let excess = current.len() - target;
            current.sort_by(|a, b| b.0.cmp(&a.0));
            for (_, task_id) in current.into_iter().take(excess) {
                inv.remove(&task_id);
            }
        }
        inv.log(format!("scale_to {} {} {} {}", application_id, deployment_id, task_type, count));
        Ok(())
    }

    async fn hard_kill(&self, application_id: &str, deployment_id: &str) -> Result<()> {
        let mut inv = self.write();
        let ids: Vec<String> = inv
            .deployment_tasks(application_id, deployment_id)
            .map(|t| t.task_id.clone())
            .collect();
        for id in ids {
            inv.remove(&id);
        }
        inv.paused.remove(&key(application_id, deployment_id));
        inv.log(format!("hard_kill {} {}", application_id, deployment_id));
        Ok(())
    }

    async fn pause(&self, application_id: &str, deployment_id: &str) -> Result<()> {
        let mut inv = self.write();
        inv.paused.insert(key(application_id, deployment_id));
        inv.log(format!("pause {} {}", application_id, deployment_id));
        Ok(())
    }

    async fn unpause(&self, application_id: &str, deployment_id: &str) -> Result<()> {
        let mut inv = self.write();
        inv.paused.remove(&key(application_id, deployment_id));
        inv.log(format!("unpause {} {}", application_id, deployment_id));
        Ok(())
    }

    async fn adjust_wall_time(&self, application_id: &str, deployment_id: &str, factor: f64) -> Result<()> {
        if factor <= 0.0 {
            return Err(AdaptError::CommandFailed(format!("invalid wall time factor {}", factor)));
        }
        let mut inv = self.write();
        *inv.wall_time_factors
            .entry(key(application_id, deployment_id))
            .or_insert(1.0) *= factor;
        inv.log(format!("adjust_wall_time {} {} x{}", application_id, deployment_id, factor));
        Ok(())
    }

    async fn adjust_power_cap(&self, delta_watts: f64) -> Result<()> {
        let mut inv = self.write();
        inv.power_cap = (inv.power_cap + delta_watts).max(0.0);
        let cap = inv.power_cap;
        inv.log(format!("adjust_power_cap {:+} -> {}", delta_watts, cap));
        Ok(())
    }

    async fn set_host_power(&self, host_name: &str, on: bool) -> Result<()> {
        let mut inv = self.write();
        let occupied = inv.tasks.iter().any(|t| t.host_name == host_name);
        let host = inv
            .hosts
            .iter_mut()
            .find(|h| h.name == host_name)
            .ok_or_else(|| AdaptError::CommandFailed(format!("no such host: {}", host_name)))?;

        if on {
            if host.state == HostState::Off {
                host.state = HostState::Idle;
            }
        } else {
            if occupied {
                return Err(AdaptError::CommandFailed(format!("host {} still runs tasks", host_name)));
            }
            host.state = HostState::Off;
        }
        inv.log(format!("set_host_power {} {}", host_name, if on { "on" } else { "off" }));
        Ok(())
    }

    async fn reselect_accelerators(&self, application_id: &str, deployment_id: &str) -> Result<()> {
        self.write()
            .log(format!("reselect_accelerators {} {}", application_id, deployment_id));
        Ok(())
    }

    async fn adjust_resources(
        &self,
        application_id: &str,
        deployment_id: &str,
        task_id: Option<&str>,
        resource: ResourceKind,
        delta: f64,
    ) -> Result<()> {
        let name = match resource {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        };
        let target = task_id.unwrap_or(deployment_id).to_string();
        let mut inv = self.write();
        *inv.resource_deltas.entry((target.clone(), name)).or_insert(0.0) += delta;
        inv.log(format!(
            "adjust_resources {} {} {} {} {:+}",
            application_id, deployment_id, target, name, delta
        ));
        Ok(())
    }

    async fn redeploy(&self, application_id: &str, deployment_id: &str) -> Result<()> {
        self.write()
            .log(format!("redeploy {} {}", application_id, deployment_id));
        Ok(())
    }

    async fn set_exclusive(&self, application_id: &str, deployment_id: &str, exclusive: bool) -> Result<()> {
        let mut inv = self.write();
        if exclusive {
            inv.exclusive.insert(key(application_id, deployment_id));
        } else {
            inv.exclusive.remove(&key(application_id, deployment_id));
        }
        inv.log(format!("set_exclusive {} {} {}", application_id, deployment_id, exclusive));
        Ok(())
    }
}
