//! Audit trail of adaptation decisions
//!
//! Every fired response and every actuation outcome is written as an
//! [`AuditRecord`]. Records always go to `tracing`; when a path is configured
//! they are also appended to a JSON-lines file.

use crate::response::{ActionType, Response};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Point in the response lifecycle an audit record was taken at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    /// A rule fired and the decision engine resolved a target
    Decided,
    /// The dispatcher finished with the response
    Actuated,
}

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: i64,
    pub stage: AuditStage,
    pub response_id: u64,
    pub guarantee_id: String,
    pub agreement_term: String,
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    pub details: String,
    pub performed: bool,
    pub possible_to_adapt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditRecord {
    pub fn from_response(stage: AuditStage, response: &Response, timestamp: i64) -> Self {
        Self {
            timestamp,
            stage,
            response_id: response.id,
            guarantee_id: response.guarantee_id().to_string(),
            agreement_term: response.agreement_term().to_string(),
            action_type: response.action_type,
            application_id: response.application_id.clone(),
            deployment_id: response.deployment_id.clone(),
            task_id: response.task_id.clone(),
            host_name: response.host_name.clone(),
            details: response.adaptation_details.clone(),
            performed: response.performed,
            possible_to_adapt: response.possible_to_adapt,
            reason: response.reason.clone(),
        }
    }
}

/// Audit sink shared by the assessor and the dispatcher
#[derive(Debug)]
pub struct AuditLog {
    enabled: bool,
    path: Option<PathBuf>,
    file: Option<Mutex<File>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::tracing_only()
    }
}

impl AuditLog {
    /// Audit disabled entirely
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: None,
            file: None,
        }
    }

    /// Audit records go to tracing only
    pub fn tracing_only() -> Self {
        Self {
            enabled: true,
            path: None,
            file: None,
        }
    }

    /// Audit records go to tracing and are appended to `path`
    pub fn with_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;

        info!(path = %path.display(), "Audit log opened");

        Ok(Self {
            enabled: true,
            path: Some(path),
            file: Some(Mutex::new(file)),
        })
    }

    /// Build from the `logging` flag and optional file path
    pub fn from_settings(enabled: bool, path: Option<&Path>) -> Result<Self> {
        match (enabled, path) {
            (false, _) => Ok(Self::disabled()),
            (true, Some(path)) => Self::with_file(path),
            (true, None) => Ok(Self::tracing_only()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a response. Write failures are logged, never propagated.
    pub fn record(&self, stage: AuditStage, response: &Response, timestamp: i64) {
        if !self.enabled {
            return;
        }
        let record = AuditRecord::from_response(stage, response, timestamp);

        info!(
            event = "audit",
            stage = ?record.stage,
            response_id = record.response_id,
            guarantee_id = %record.guarantee_id,
            agreement_term = %record.agreement_term,
            action_type = %record.action_type,
            performed = record.performed,
            possible_to_adapt = record.possible_to_adapt,
            reason = record.reason.as_deref().unwrap_or(""),
            "Adaptation audit record"
        );

        if let Some(file) = &self.file {
            if let Err(e) = append_line(file, &record) {
                warn!(error = %e, "Failed to write audit record");
            }
        }
    }
}

fn append_line(file: &Mutex<File>, record: &AuditRecord) -> Result<()> {
    let mut line = serde_json::to_string(record).context("Failed to serialize audit record")?;
    line.push('\n');
    let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
    file.write_all(line.as_bytes())
        .context("Failed to append audit record")?;
    file.flush().context("Failed to flush audit log")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventType, Operator};
    use std::sync::Arc;

    fn response() -> Response {
        let cause = Arc::new(
            Event::new("g-1", "energy", 100, 5.0, 3.0, EventType::Breach, Operator::Gt)
                .for_application("lammps", "7"),
        );
        Response::new(cause, ActionType::RemoveTask, "TASK_TYPE=worker", 100)
    }

    #[test]
    fn test_file_audit_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("adaptations.jsonl");

        let log = AuditLog::with_file(&path).unwrap();
        let mut r = response();
        log.record(AuditStage::Decided, &r, 100);
        r.mark_performed();
        log.record(AuditStage::Actuated, &r, 101);

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<AuditRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].stage, AuditStage::Decided);
        assert!(!records[0].performed);
        assert_eq!(records[1].stage, AuditStage::Actuated);
        assert!(records[1].performed);
        assert_eq!(records[1].application_id.as_deref(), Some("lammps"));
    }

    #[test]
    fn test_disabled_audit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = AuditLog::from_settings(false, Some(&path)).unwrap();
        assert!(!log.is_enabled());
        log.record(AuditStage::Decided, &response(), 100);

        assert!(!path.exists());
    }
}
