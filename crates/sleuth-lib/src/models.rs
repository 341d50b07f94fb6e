//! Core data models for unit status and investigation output

use serde::{Deserialize, Serialize};

use crate::diagnosis::Diagnosis;

/// Lifecycle phase reported for a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl UnitPhase {
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => UnitPhase::Pending,
            "Running" => UnitPhase::Running,
            "Succeeded" => UnitPhase::Succeeded,
            "Failed" => UnitPhase::Failed,
            _ => UnitPhase::Unknown,
        }
    }
}

impl std::fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitPhase::Pending => write!(f, "Pending"),
            UnitPhase::Running => write!(f, "Running"),
            UnitPhase::Succeeded => write!(f, "Succeeded"),
            UnitPhase::Failed => write!(f, "Failed"),
            UnitPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Waiting state detail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingState {
    pub reason: String,
    pub message: String,
}

/// Terminated state detail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminatedState {
    pub reason: String,
    pub message: String,
    pub exit_code: i32,
}

/// Current or last state of a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Waiting(WaitingState),
    Terminated(TerminatedState),
    Running,
}

/// Runtime status of a single container as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub restart_count: u32,
    /// `None` when the runtime has not reported a state yet
    pub state: Option<ContainerState>,
    pub last_terminated: Option<TerminatedState>,
}

impl ContainerStatus {
    /// Waiting or terminated
    pub fn is_error_state(&self) -> bool {
        matches!(
            self.state,
            Some(ContainerState::Waiting(_)) | Some(ContainerState::Terminated(_))
        )
    }
}

/// Tri-state condition status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }
}

/// Structured condition reported by a unit (`Ready`, `PodScheduled`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCondition {
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Resolved controller owning a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

/// Point-in-time snapshot of a unit handed to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub phase: UnitPhase,
    /// Container names in declaration order
    pub declared_containers: Vec<String>,
    pub container_statuses: Vec<ContainerStatus>,
    pub init_container_statuses: Vec<ContainerStatus>,
    pub conditions: Vec<UnitCondition>,
    pub owner: Option<OwnerRef>,
}

impl UnitSnapshot {
    /// `namespace/name`, the form used by unit-targeted refresh requests
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// True when the `Ready` condition reports `True`
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .find(|c| c.condition_type == "Ready")
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }

    /// Highest restart count across containers and init containers
    pub fn generation(&self) -> u32 {
        self.container_statuses
            .iter()
            .chain(self.init_container_statuses.iter())
            .map(|c| c.restart_count)
            .max()
            .unwrap_or(0)
    }
}

/// Container or init container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    #[serde(rename = "container")]
    Primary,
    #[serde(rename = "initContainer")]
    Init,
}

/// Reported container state in a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingState {
    Waiting,
    Terminated,
    Running,
    /// No state reported yet
    Unknown,
}

/// Container-level root cause produced by the investigator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFinding {
    pub container_name: String,
    #[serde(rename = "type")]
    pub kind: ContainerKind,
    pub state: FindingState,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub restart_count: u32,
    pub ready: bool,
}

/// Verbatim copy of a unit condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSnapshot {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-unit entry published by the status layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitReport {
    pub name: String,
    pub namespace: String,
    pub phase: UnitPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    pub reason: String,
    pub message: String,
    pub container_errors: Vec<ContainerFinding>,
    pub pod_conditions: Vec<ConditionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_analysis: Option<Diagnosis>,
}

impl UnitReport {
    /// Attach a diagnosis and append its root cause to the message
    pub fn with_diagnosis(mut self, diagnosis: Diagnosis) -> Self {
        if !diagnosis.root_cause.is_empty() {
            self.message = if self.message.is_empty() {
                format!("Log analysis: {}", diagnosis.root_cause)
            } else {
                format!("{}. Log analysis: {}", self.message, diagnosis.root_cause)
            };
        }
        self.log_analysis = Some(diagnosis);
        self
    }
}
