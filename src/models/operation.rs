use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored lifecycle state of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    NotInstalled,
    Installing,
    Completed,
    Installed,
    Uninstalling,
    Restarting,
    Error,
}

impl OperationState {
    /// States that block any new operation for the same component
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            OperationState::Installing | OperationState::Uninstalling | OperationState::Restarting
        )
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::NotInstalled => write!(f, "not_installed"),
            OperationState::Installing => write!(f, "installing"),
            OperationState::Completed => write!(f, "completed"),
            OperationState::Installed => write!(f, "installed"),
            OperationState::Uninstalling => write!(f, "uninstalling"),
            OperationState::Restarting => write!(f, "restarting"),
            OperationState::Error => write!(f, "error"),
        }
    }
}

/// Kind of operation a request starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Install,
    Uninstall,
    Restart,
}

impl OperationKind {
    /// State stored while an operation of this kind runs
    pub fn active_state(self) -> OperationState {
        match self {
            OperationKind::Install => OperationState::Installing,
            OperationKind::Uninstall => OperationState::Uninstalling,
            OperationKind::Restart => OperationState::Restarting,
        }
    }
}

/// One entry of the status table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStatus {
    pub component: String,
    pub status: OperationState,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once the deployer call and the follow-up readiness wait are over
    #[serde(skip)]
    pub task_finished: bool,
}

impl OperationStatus {
    /// Fresh entry for an operation that is about to be scheduled
    pub fn started(component: &str, kind: OperationKind, message: String) -> Self {
        Self {
            component: component.to_string(),
            status: kind.active_state(),
            progress: 0,
            message,
            operation_id: Some(Uuid::new_v4()),
            started_at: Some(Utc::now()),
            completed_at: None,
            task_finished: false,
        }
    }

    /// Synthesized entry that was never stored
    pub fn observed(component: &str, status: OperationState, progress: u8, message: String) -> Self {
        Self {
            component: component.to_string(),
            status,
            progress,
            message,
            operation_id: None,
            started_at: None,
            completed_at: None,
            task_finished: true,
        }
    }
}

/// Pod counts observed at read time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodCounts {
    pub pods_running: usize,
    pub total_pods: usize,
}

/// Status as returned to polling clients
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub operation: OperationStatus,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub pods: Option<PodCounts>,
}

impl StatusView {
    pub fn new(operation: OperationStatus, pods: Option<PodCounts>) -> Self {
        Self { operation, pods }
    }
}

/// Immediate acknowledgement of an operation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Started,
    AlreadyInstalling,
    AlreadyProcessing,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse {
    pub status: RequestOutcome,
    pub message: String,
    pub component: String,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllStatusResponse {
    pub installations: HashMap<String, OperationStatus>,
    pub count: usize,
}
