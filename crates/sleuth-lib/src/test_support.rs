//! In-memory sources and unit builders shared by unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::{
    ConditionStatus, ContainerState, ContainerStatus, TerminatedState, UnitCondition, UnitPhase,
    UnitSnapshot, WaitingState,
};
use crate::sources::{LogSource, SecretSource, SourceError};

/// Log source returning canned lines per container
#[derive(Default)]
pub struct FakeLogSource {
    lines: Mutex<HashMap<String, Result<Vec<String>, SourceError>>>,
    calls: AtomicUsize,
}

impl FakeLogSource {
    pub fn with_lines(container: &str, lines: &[&str]) -> Self {
        let source = Self::default();
        source.set(container, Ok(lines.iter().map(|l| l.to_string()).collect()));
        source
    }

    pub fn failing(container: &str, err: SourceError) -> Self {
        let source = Self::default();
        source.set(container, Err(err));
        source
    }

    pub fn set(&self, container: &str, result: Result<Vec<String>, SourceError>) {
        self.lines.lock().unwrap().insert(container.to_string(), result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSource for FakeLogSource {
    async fn fetch_tail_lines(
        &self,
        _namespace: &str,
        _unit: &str,
        container: &str,
        max_lines: u32,
    ) -> Result<Vec<String>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.lines.lock().unwrap().get(container) {
            Some(Ok(lines)) => {
                let skip = lines.len().saturating_sub(max_lines as usize);
                Ok(lines[skip..].to_vec())
            }
            Some(Err(e)) => Err(e.clone()),
            None => Err(SourceError::NotFound(container.to_string())),
        }
    }
}

/// Log source whose fetch never completes
pub struct StalledLogSource;

#[async_trait]
impl LogSource for StalledLogSource {
    async fn fetch_tail_lines(
        &self,
        _namespace: &str,
        _unit: &str,
        _container: &str,
        _max_lines: u32,
    ) -> Result<Vec<String>, SourceError> {
        std::future::pending().await
    }
}

/// Secret source backed by a map of `namespace/name/key`
#[derive(Default)]
pub struct FakeSecretSource {
    values: HashMap<String, Result<String, SourceError>>,
}

impl FakeSecretSource {
    pub fn with(namespace: &str, name: &str, key: &str, value: Result<String, SourceError>) -> Self {
        let mut values = HashMap::new();
        values.insert(format!("{}/{}/{}", namespace, name, key), value);
        Self { values }
    }
}

#[async_trait]
impl SecretSource for FakeSecretSource {
    async fn fetch_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<String, SourceError> {
        self.values
            .get(&format!("{}/{}/{}", namespace, name, key))
            .cloned()
            .unwrap_or_else(|| Err(SourceError::NotFound(format!("{}/{}", namespace, name))))
    }
}

/// Not-ready running unit with one container in CrashLoopBackOff
pub fn crashing_unit(restarts: u32) -> UnitSnapshot {
    UnitSnapshot {
        namespace: "shop".to_string(),
        name: "checkout-6f9c".to_string(),
        uid: "uid-1".to_string(),
        phase: UnitPhase::Running,
        declared_containers: vec!["app".to_string(), "proxy".to_string()],
        container_statuses: vec![
            ContainerStatus {
                name: "proxy".to_string(),
                ready: true,
                restart_count: 0,
                state: Some(ContainerState::Running),
                last_terminated: None,
            },
            ContainerStatus {
                name: "app".to_string(),
                ready: false,
                restart_count: restarts,
                state: Some(ContainerState::Waiting(WaitingState {
                    reason: "CrashLoopBackOff".to_string(),
                    message: "back-off 5m0s restarting failed container".to_string(),
                })),
                last_terminated: Some(TerminatedState {
                    reason: "Error".to_string(),
                    message: String::new(),
                    exit_code: 1,
                }),
            },
        ],
        init_container_statuses: vec![],
        conditions: vec![UnitCondition {
            condition_type: "Ready".to_string(),
            status: ConditionStatus::False,
            reason: Some("ContainersNotReady".to_string()),
            message: None,
        }],
        owner: None,
    }
}
