//! Inventory data models returned by actuator capability queries

use serde::{Deserialize, Serialize};

/// A running task (job step, worker, VM) belonging to an application deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub task_type: String,
    pub application_id: String,
    pub deployment_id: String,
    pub host_name: String,
    /// Creation time, Unix seconds
    pub created_at: i64,
    /// Application-supplied priority tag; higher is more important
    #[serde(default)]
    pub priority: i32,
}

/// Filter for task list queries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub application_id: Option<String>,
    pub deployment_id: Option<String>,
    pub host_name: Option<String>,
}

impl TaskFilter {
    pub fn for_deployment(application_id: &str, deployment_id: &str) -> Self {
        Self {
            application_id: Some(application_id.to_string()),
            deployment_id: Some(deployment_id.to_string()),
            host_name: None,
        }
    }

    pub fn for_application(application_id: &str) -> Self {
        Self {
            application_id: Some(application_id.to_string()),
            ..Default::default()
        }
    }

    pub fn for_host(host_name: &str) -> Self {
        Self {
            host_name: Some(host_name.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.application_id
            .as_deref()
            .map_or(true, |a| a == task.application_id)
            && self
                .deployment_id
                .as_deref()
                .map_or(true, |d| d.is_empty() || d == task.deployment_id)
            && self
                .host_name
                .as_deref()
                .map_or(true, |h| h == task.host_name)
    }
}

/// How flexible a workload is about its resource allocation.
///
/// Ordered from least to most flexible, so `Rigid` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlexibilityClass {
    Rigid,
    Mouldable,
    Checkpointable,
    Malleable,
}

impl Default for FlexibilityClass {
    fn default() -> Self {
        FlexibilityClass::Rigid
    }
}

/// Power state of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Idle,
    Busy,
    Off,
}

/// Host inventory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub name: String,
    pub state: HostState,
    /// Least flexible class among the workloads on (or queued for) the host
    #[serde(default)]
    pub workload_class: FlexibilityClass,
    #[serde(default)]
    pub queue_length: u32,
    #[serde(default)]
    pub idle_power_watts: f64,
}

/// Per task-type limits inside an application definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTypeDefinition {
    pub name: String,
    #[serde(default)]
    pub min_instances: u32,
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,
    #[serde(default)]
    pub priority: i32,
}

fn default_max_instances() -> u32 {
    u32::MAX
}

impl TaskTypeDefinition {
    pub fn new(name: impl Into<String>, min_instances: u32, max_instances: u32) -> Self {
        Self {
            name: name.into(),
            min_instances,
            max_instances,
            priority: 0,
        }
    }
}

/// Description of an application as known to the actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDefinition {
    pub name: String,
    pub deployment_id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub flexibility: FlexibilityClass,
    #[serde(default)]
    pub task_types: Vec<TaskTypeDefinition>,
}

impl ApplicationDefinition {
    pub fn new(name: impl Into<String>, deployment_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deployment_id: deployment_id.into(),
            priority: 0,
            flexibility: FlexibilityClass::default(),
            task_types: Vec::new(),
        }
    }

    pub fn with_task_type(mut self, task_type: TaskTypeDefinition) -> Self {
        self.task_types.push(task_type);
        self
    }

    pub fn task_type(&self, name: &str) -> Option<&TaskTypeDefinition> {
        self.task_types.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(app: &str, deployment: &str, host: &str) -> Task {
        Task {
            task_id: "1".to_string(),
            task_type: "worker".to_string(),
            application_id: app.to_string(),
            deployment_id: deployment.to_string(),
            host_name: host.to_string(),
            created_at: 0,
            priority: 0,
        }
    }

    #[test]
    fn test_task_filter() {
        let t = task("lammps", "7", "node-1");

        assert!(TaskFilter::default().matches(&t));
        assert!(TaskFilter::for_deployment("lammps", "7").matches(&t));
        assert!(!TaskFilter::for_deployment("lammps", "8").matches(&t));
        assert!(TaskFilter::for_application("lammps").matches(&t));
        assert!(!TaskFilter::for_host("node-2").matches(&t));
    }

    #[test]
    fn test_flexibility_ordering() {
        assert!(FlexibilityClass::Rigid < FlexibilityClass::Mouldable);
        assert!(FlexibilityClass::Mouldable < FlexibilityClass::Checkpointable);
        assert!(FlexibilityClass::Checkpointable < FlexibilityClass::Malleable);
    }

    #[test]
    fn test_definition_deserializes_with_defaults() {
        let json = r#"{"name":"lammps","deployment_id":"7","task_types":[{"name":"worker"}]}"#;
        let def: ApplicationDefinition = serde_json::from_str(json).unwrap();

        assert_eq!(def.flexibility, FlexibilityClass::Rigid);
        let worker = def.task_type("worker").unwrap();
        assert_eq!(worker.min_instances, 0);
        assert_eq!(worker.max_instances, u32::MAX);
    }
}
