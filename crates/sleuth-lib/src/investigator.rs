//! Status investigation for non-ready units
//!
//! Walks container and init container statuses to find container-level
//! root causes. Pure and deterministic: no I/O and no error path.

use serde::{Deserialize, Serialize};

use crate::models::{
    ConditionSnapshot, ConditionStatus, ContainerFinding, ContainerKind, ContainerState,
    ContainerStatus, FindingState, UnitReport, UnitSnapshot,
};

const READINESS_PROBE_FAILED: &str = "ReadinessProbeFailed";
const CRASH_LOOP_BACK_OFF: &str = "CrashLoopBackOff";

/// Result of investigating a unit's structured status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigation {
    pub reason: String,
    pub message: String,
    pub findings: Vec<ContainerFinding>,
    pub conditions: Vec<ConditionSnapshot>,
}

impl Investigation {
    /// Build the status report for `unit` from this investigation
    pub fn into_report(self, unit: &UnitSnapshot) -> UnitReport {
        UnitReport {
            name: unit.name.clone(),
            namespace: unit.namespace.clone(),
            phase: unit.phase,
            owner_kind: unit.owner.as_ref().map(|o| o.kind.clone()),
            owner_name: unit.owner.as_ref().map(|o| o.name.clone()),
            reason: self.reason,
            message: self.message,
            container_errors: self.findings,
            pod_conditions: self.conditions,
            log_analysis: None,
        }
    }
}

/// Investigate why a unit is not ready
pub fn investigate(unit: &UnitSnapshot) -> Investigation {
    let mut findings = Vec::new();
    let mut primary: Option<(String, String)> = None;

    for status in &unit.container_statuses {
        let failed_termination = matches!(
            &status.state,
            Some(ContainerState::Terminated(t)) if t.exit_code != 0 || t.reason == "Error"
        );
        if status.ready && !failed_termination {
            continue;
        }

        let finding = investigate_container(status, ContainerKind::Primary);

        // Waiting errors (image pulls, crash loops) beat everything;
        // terminations only beat a bare readiness failure.
        let replace = match &primary {
            None => true,
            Some((current, _)) => {
                finding.state != FindingState::Running
                    && !finding.reason.is_empty()
                    && (finding.state == FindingState::Waiting
                        || (finding.state == FindingState::Terminated
                            && current == READINESS_PROBE_FAILED))
            }
        };
        if replace {
            primary = Some((finding.reason.clone(), finding.message.clone()));
        }

        findings.push(finding);
    }

    for status in &unit.init_container_statuses {
        if status.ready {
            continue;
        }
        let finding = investigate_container(status, ContainerKind::Init);
        if primary.is_none() {
            primary = Some((finding.reason.clone(), finding.message.clone()));
        }
        findings.push(finding);
    }

    let conditions: Vec<ConditionSnapshot> = unit
        .conditions
        .iter()
        .map(|c| ConditionSnapshot {
            condition_type: c.condition_type.clone(),
            status: c.status,
            reason: c.reason.clone(),
            message: c.message.clone(),
        })
        .collect();

    let (mut reason, mut message) = primary.unwrap_or_default();

    if reason.is_empty() {
        if let Some(ready) = unit
            .conditions
            .iter()
            .find(|c| c.condition_type == "Ready" && c.status == ConditionStatus::False)
        {
            reason = ready.reason.clone().unwrap_or_default();
            message = ready.message.clone().unwrap_or_default();
        }
    }

    Investigation {
        reason,
        message,
        findings,
        conditions,
    }
}

fn investigate_container(status: &ContainerStatus, kind: ContainerKind) -> ContainerFinding {
    let mut finding = ContainerFinding {
        container_name: status.name.clone(),
        kind,
        state: FindingState::Unknown,
        reason: String::new(),
        message: String::new(),
        exit_code: None,
        restart_count: status.restart_count,
        ready: status.ready,
    };

    match &status.state {
        Some(ContainerState::Waiting(waiting)) => {
            finding.state = FindingState::Waiting;
            finding.reason = waiting.reason.clone();
            finding.message = waiting.message.clone();
        }
        Some(ContainerState::Terminated(terminated)) => {
            finding.state = FindingState::Terminated;
            finding.reason = terminated.reason.clone();
            finding.message = terminated.message.clone();
            finding.exit_code = Some(terminated.exit_code);
            if finding.message.is_empty() {
                finding.message = format!(
                    "Container terminated with reason '{}' (exit code: {})",
                    terminated.reason, terminated.exit_code
                );
            }
        }
        Some(ContainerState::Running) => {
            finding.state = FindingState::Running;
            if !status.ready {
                finding.reason = READINESS_PROBE_FAILED.to_string();
                finding.message = "Container is running but readiness probe is failing".to_string();
            }
        }
        None => {}
    }

    // Crash loops report the interesting detail on the previous termination
    if let Some(last) = &status.last_terminated {
        if finding.reason.is_empty() || finding.reason == CRASH_LOOP_BACK_OFF {
            if finding.message.is_empty() {
                finding.message =
                    format!("Container exited with code {}: {}", last.exit_code, last.reason);
            }
            if finding.exit_code.is_none() {
                finding.exit_code = Some(last.exit_code);
            }
        }
    }

    if finding.reason.is_empty() {
        match (finding.state, finding.exit_code) {
            (FindingState::Terminated, Some(code)) => {
                finding.reason = "ContainerTerminated".to_string();
                if finding.message.is_empty() {
                    finding.message = format!("Container terminated with exit code {}", code);
                }
            }
            (FindingState::Waiting, _) => {
                finding.reason = "ContainerWaiting".to_string();
                if finding.message.is_empty() {
                    finding.message = "Container is waiting to start".to_string();
                }
            }
            _ if !finding.ready => {
                finding.reason = "ContainerNotReady".to_string();
                if finding.message.is_empty() {
                    finding.message = "Container is not ready".to_string();
                }
            }
            _ => {}
        }
    }

    finding
}
