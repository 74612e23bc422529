//! Adaptor configuration

use adaptor_lib::{ApplicationDefinition, ClockTrigger, HostInfo, Task};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Adaptor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdaptorConfig {
    /// Instance identity in logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Rule catalog file
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    /// Event and adaptation retention window in seconds
    #[serde(default = "default_history_length")]
    pub history_length_secs: u64,

    /// History pruning interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Qualifying events needed before a rule fires
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Decision engine name
    #[serde(default = "default_decision_engine")]
    pub decision_engine: String,

    /// Fire every matching rule instead of the first
    #[serde(default)]
    pub multi_action: bool,

    /// Decision attempts per response
    #[serde(default = "default_max_decision_attempts")]
    pub max_decision_attempts: u32,

    /// Audit trail on/off
    #[serde(default = "default_logging")]
    pub logging: bool,

    /// Optional JSON-lines audit file
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,

    /// Longest the dispatcher blocks waiting for work, in seconds
    #[serde(default = "default_dispatcher_poll")]
    pub dispatcher_poll_secs: u64,

    /// Pending actuations above which the dispatcher reports degraded
    #[serde(default = "default_dispatcher_backlog")]
    pub dispatcher_backlog_limit: usize,

    /// Capacity of the in-process event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,

    #[serde(default)]
    pub clock_triggers: Vec<ClockTrigger>,

    /// Inventory of the simulated actuator
    #[serde(default)]
    pub simulated_hosts: Vec<HostInfo>,

    #[serde(default)]
    pub simulated_applications: Vec<ApplicationDefinition>,

    #[serde(default)]
    pub simulated_tasks: Vec<Task>,

    /// SLA power ceiling applied to every simulated deployment (0 = none)
    #[serde(default)]
    pub power_limit_watts: f64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("rules.csv")
}

fn default_history_length() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    5
}

fn default_threshold() -> usize {
    2
}

fn default_decision_engine() -> String {
    adaptor_lib::DEFAULT_ENGINE.to_string()
}

fn default_max_decision_attempts() -> u32 {
    1
}

fn default_logging() -> bool {
    true
}

fn default_dispatcher_poll() -> u64 {
    30
}

fn default_dispatcher_backlog() -> usize {
    1000
}

fn default_event_buffer() -> usize {
    1024
}

impl AdaptorConfig {
    /// Load configuration from an optional file and the environment.
    ///
    /// The file is `$ADAPTOR_CONFIG` if set, otherwise `adaptor.{toml,yaml,json}`
    /// in the working directory when present.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os("ADAPTOR_CONFIG").map(PathBuf::from);
        Self::load_from(explicit.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("adaptor").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("ADAPTOR").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid adaptor configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
history_length_secs = 120
decision_engine = "power"
multi_action = true

[[clock_triggers]]
guarantee_id = "g-night"
agreement_term = "nightly"
interval_secs = 3600

[[simulated_hosts]]
name = "node-1"
state = "idle"
"#
        )
        .unwrap();

        let config = AdaptorConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.history_length_secs, 120);
        assert_eq!(config.decision_engine, "power");
        assert!(config.multi_action);
        assert_eq!(config.threshold, 2);
        assert_eq!(config.clock_triggers.len(), 1);
        assert_eq!(config.simulated_hosts[0].name, "node-1");
        assert!(config.logging);
        assert_eq!(config.dispatcher_backlog_limit, 1000);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = AdaptorConfig::load_from(Some(Path::new("/nonexistent/adaptor.toml")));
        assert!(result.is_err());
    }
}
