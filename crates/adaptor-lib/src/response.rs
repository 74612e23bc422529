//! Adaptation responses
//!
//! A [`Response`] is created by the assessor when a rule fires, has its target
//! filled in by a decision engine, and reaches a terminal state exactly once in
//! the actuation dispatcher.

use crate::error::AdaptError;
use crate::event::Event;
use crate::params::Parameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_RESPONSE_ID: AtomicU64 = AtomicU64::new(1);

/// Kinds of adaptation that can be requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    AddTask,
    RemoveTask,
    ScaleToNTasks,
    AddCpu,
    RemoveCpu,
    AddMemory,
    RemoveMemory,
    PauseApp,
    UnpauseApp,
    PauseSimilarApps,
    UnpauseSimilarApps,
    HardKillApp,
    KillSimilarApps,
    IncreaseWallTime,
    ReduceWallTime,
    IncreaseWallTimeSimilarApps,
    ReduceWallTimeSimilarApps,
    OversubscribeApp,
    ExclusiveApp,
    IncreaseClusterPowerCap,
    ReduceClusterPowerCap,
    ShutdownHost,
    StartupHost,
    ReselectAccelerators,
    RedeployApp,
}

impl ActionType {
    pub const ALL: [ActionType; 25] = [
        ActionType::AddTask,
        ActionType::RemoveTask,
        ActionType::ScaleToNTasks,
        ActionType::AddCpu,
        ActionType::RemoveCpu,
        ActionType::AddMemory,
        ActionType::RemoveMemory,
        ActionType::PauseApp,
        ActionType::UnpauseApp,
        ActionType::PauseSimilarApps,
        ActionType::UnpauseSimilarApps,
        ActionType::HardKillApp,
        ActionType::KillSimilarApps,
        ActionType::IncreaseWallTime,
        ActionType::ReduceWallTime,
        ActionType::IncreaseWallTimeSimilarApps,
        ActionType::ReduceWallTimeSimilarApps,
        ActionType::OversubscribeApp,
        ActionType::ExclusiveApp,
        ActionType::IncreaseClusterPowerCap,
        ActionType::ReduceClusterPowerCap,
        ActionType::ShutdownHost,
        ActionType::StartupHost,
        ActionType::ReselectAccelerators,
        ActionType::RedeployApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AddTask => "ADD_TASK",
            ActionType::RemoveTask => "REMOVE_TASK",
            ActionType::ScaleToNTasks => "SCALE_TO_N_TASKS",
            ActionType::AddCpu => "ADD_CPU",
            ActionType::RemoveCpu => "REMOVE_CPU",
            ActionType::AddMemory => "ADD_MEMORY",
            ActionType::RemoveMemory => "REMOVE_MEMORY",
            ActionType::PauseApp => "PAUSE_APP",
            ActionType::UnpauseApp => "UNPAUSE_APP",
            ActionType::PauseSimilarApps => "PAUSE_SIMILAR_APPS",
            ActionType::UnpauseSimilarApps => "UNPAUSE_SIMILAR_APPS",
            ActionType::HardKillApp => "HARD_KILL_APP",
            ActionType::KillSimilarApps => "KILL_SIMILAR_APPS",
            ActionType::IncreaseWallTime => "INCREASE_WALL_TIME",
            ActionType::ReduceWallTime => "REDUCE_WALL_TIME",
            ActionType::IncreaseWallTimeSimilarApps => "INCREASE_WALL_TIME_SIMILAR_APPS",
            ActionType::ReduceWallTimeSimilarApps => "REDUCE_WALL_TIME_SIMILAR_APPS",
            ActionType::OversubscribeApp => "OVERSUBSCRIBE_APP",
            ActionType::ExclusiveApp => "EXCLUSIVE_APP",
            ActionType::IncreaseClusterPowerCap => "INCREASE_CLUSTER_POWER_CAP",
            ActionType::ReduceClusterPowerCap => "REDUCE_CLUSTER_POWER_CAP",
            ActionType::ShutdownHost => "SHUTDOWN_HOST",
            ActionType::StartupHost => "STARTUP_HOST",
            ActionType::ReselectAccelerators => "RESELECT_ACCELERATORS",
            ActionType::RedeployApp => "REDEPLOY_APP",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = AdaptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        // Names used by older rule catalogs that targeted VM-based deployments
        let normalized = match normalized.as_str() {
            "ADD_VM" => "ADD_TASK",
            "REMOVE_VM" => "REMOVE_TASK",
            "SCALE_TO_N_VMS" => "SCALE_TO_N_TASKS",
            other => other,
        };
        ActionType::ALL
            .iter()
            .find(|a| a.as_str() == normalized)
            .copied()
            .ok_or_else(|| AdaptError::UnknownActionType(s.to_string()))
    }
}

/// A proposed, then finalized, adaptation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    /// Creation time, Unix seconds
    pub time: i64,
    pub cause: Arc<Event>,
    pub action_type: ActionType,
    /// `KEY=VALUE;...` parameters, mutable until dispatch
    pub adaptation_details: String,
    pub application_id: Option<String>,
    pub deployment_id: Option<String>,
    pub task_id: Option<String>,
    pub host_name: Option<String>,
    pub performed: bool,
    pub possible_to_adapt: bool,
    /// Why the response could not be acted upon
    pub reason: Option<String>,
}

impl Response {
    pub fn new(cause: Arc<Event>, action_type: ActionType, adaptation_details: impl Into<String>, time: i64) -> Self {
        let application_id = cause.application_id().map(str::to_string);
        let deployment_id = cause.deployment_id().map(str::to_string);
        let host_name = cause.host_name().map(str::to_string);

        Self {
            id: NEXT_RESPONSE_ID.fetch_add(1, Ordering::Relaxed),
            time,
            cause,
            action_type,
            adaptation_details: adaptation_details.into(),
            application_id,
            deployment_id,
            task_id: None,
            host_name,
            performed: false,
            possible_to_adapt: true,
            reason: None,
        }
    }

    pub fn guarantee_id(&self) -> &str {
        &self.cause.guarantee_id
    }

    pub fn agreement_term(&self) -> &str {
        &self.cause.agreement_term
    }

    /// Terminal: performed, or known to be impossible
    pub fn is_complete(&self) -> bool {
        self.performed || !self.possible_to_adapt
    }

    pub fn details(&self) -> Parameters {
        Parameters::parse(&self.adaptation_details)
    }

    pub fn detail(&self, key: &str) -> Option<String> {
        self.details().get(key).map(str::to_string)
    }

    pub fn set_detail(&mut self, key: &str, value: impl Into<String>) {
        let mut params = self.details();
        params.set(key, value);
        self.adaptation_details = params.to_string();
    }

    pub fn mark_infeasible(&mut self, reason: impl Into<String>) {
        self.possible_to_adapt = false;
        self.reason = Some(reason.into());
    }

    pub fn mark_performed(&mut self) {
        self.performed = true;
    }

    /// Outcome of a failed actuation: done with, but not adapted
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.performed = true;
        self.mark_infeasible(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, Operator};

    fn cause() -> Arc<Event> {
        Arc::new(
            Event::new("g-1", "energy", 100, 5.0, 3.0, EventType::Breach, Operator::Gt)
                .for_application("lammps", "7"),
        )
    }

    #[test]
    fn test_action_type_round_trip_names() {
        for action in ActionType::ALL {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
    }

    #[test]
    fn test_action_type_legacy_aliases() {
        assert_eq!("ADD_VM".parse::<ActionType>().unwrap(), ActionType::AddTask);
        assert_eq!("remove_vm".parse::<ActionType>().unwrap(), ActionType::RemoveTask);
        assert_eq!("scale-to-n-vms".parse::<ActionType>().unwrap(), ActionType::ScaleToNTasks);
        assert!("DO_SOMETHING".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_new_response_takes_target_from_cause() {
        let response = Response::new(cause(), ActionType::AddTask, "TASK_TYPE=worker", 100);
        assert_eq!(response.application_id.as_deref(), Some("lammps"));
        assert_eq!(response.deployment_id.as_deref(), Some("7"));
        assert!(response.possible_to_adapt);
        assert!(!response.performed);
        assert!(!response.is_complete());
    }

    #[test]
    fn test_completion_invariant() {
        let mut performed = Response::new(cause(), ActionType::AddTask, "", 100);
        performed.mark_performed();
        assert!(performed.is_complete());

        let mut infeasible = Response::new(cause(), ActionType::AddTask, "", 100);
        infeasible.mark_infeasible("no candidate");
        assert!(infeasible.is_complete());
        assert_eq!(infeasible.reason.as_deref(), Some("no candidate"));
    }

    #[test]
    fn test_set_detail() {
        let mut response = Response::new(cause(), ActionType::ScaleToNTasks, "TASK_COUNT=3", 100);
        response.set_detail("TASK_TYPE", "worker");
        assert_eq!(response.adaptation_details, "TASK_COUNT=3;TASK_TYPE=worker");
        assert_eq!(response.detail("TASK_COUNT").as_deref(), Some("3"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Response::new(cause(), ActionType::AddTask, "", 100);
        let b = Response::new(cause(), ActionType::AddTask, "", 100);
        assert_ne!(a.id, b.id);
    }
}
