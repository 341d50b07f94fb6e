//! Kubernetes adapters for pods, logs and secrets

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::{
    ContainerState as K8sContainerState, ContainerStatus as K8sContainerStatus, Pod, Secret,
};
use kube::api::{Api, LogParams};
use kube::Client;
use tracing::{debug, warn};

use super::{LogSource, SecretSource, SourceError};
use crate::models::{
    ConditionStatus, ContainerState, ContainerStatus, OwnerRef, TerminatedState, UnitCondition,
    UnitPhase, UnitSnapshot, WaitingState,
};

fn map_kube_error(err: kube::Error, what: &str) -> SourceError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => SourceError::NotFound(what.to_string()),
        kube::Error::Api(resp) if resp.code == 403 => {
            SourceError::AccessDenied(format!("{}: {}", what, resp.message))
        }
        other => SourceError::Transport(format!("{}: {}", what, other)),
    }
}

/// Pod log tail through the Kubernetes API
#[derive(Clone)]
pub struct KubeLogSource {
    client: Client,
}

impl KubeLogSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogSource for KubeLogSource {
    async fn fetch_tail_lines(
        &self,
        namespace: &str,
        unit: &str,
        container: &str,
        max_lines: u32,
    ) -> Result<Vec<String>, SourceError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            tail_lines: Some(i64::from(max_lines)),
            ..Default::default()
        };

        let raw = pods
            .logs(unit, &params)
            .await
            .map_err(|e| map_kube_error(e, &format!("logs {}/{}[{}]", namespace, unit, container)))?;

        let lines: Vec<String> = raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();

        debug!(
            namespace = %namespace,
            pod = %unit,
            container = %container,
            lines = lines.len(),
            "Fetched container logs"
        );

        Ok(lines)
    }
}

/// Secret lookup through the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretSource {
    client: Client,
}

impl KubeSecretSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretSource for KubeSecretSource {
    async fn fetch_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<String, SourceError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, &format!("secret {}/{}", namespace, name)))?;

        secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|bytes| String::from_utf8_lossy(&bytes.0).trim().to_string())
            .ok_or_else(|| SourceError::NotFound(format!("key {} in secret {}/{}", key, namespace, name)))
    }
}

fn convert_state(state: Option<&K8sContainerState>) -> Option<ContainerState> {
    let state = state?;
    if let Some(waiting) = &state.waiting {
        return Some(ContainerState::Waiting(WaitingState {
            reason: waiting.reason.clone().unwrap_or_default(),
            message: waiting.message.clone().unwrap_or_default(),
        }));
    }
    if let Some(terminated) = &state.terminated {
        return Some(ContainerState::Terminated(TerminatedState {
            reason: terminated.reason.clone().unwrap_or_default(),
            message: terminated.message.clone().unwrap_or_default(),
            exit_code: terminated.exit_code,
        }));
    }
    state.running.as_ref().map(|_| ContainerState::Running)
}

fn convert_status(status: &K8sContainerStatus) -> ContainerStatus {
    let last_terminated = status
        .last_state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .map(|t| TerminatedState {
            reason: t.reason.clone().unwrap_or_default(),
            message: t.message.clone().unwrap_or_default(),
            exit_code: t.exit_code,
        });

    ContainerStatus {
        name: status.name.clone(),
        ready: status.ready,
        restart_count: u32::try_from(status.restart_count).unwrap_or(0),
        state: convert_state(status.state.as_ref()),
        last_terminated,
    }
}

/// Snapshot a pod for the engine
pub fn unit_from_pod(pod: &Pod, owner: Option<OwnerRef>) -> UnitSnapshot {
    let meta = &pod.metadata;
    let status = pod.status.as_ref();

    let declared_containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();

    let container_statuses = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| statuses.iter().map(convert_status).collect())
        .unwrap_or_default();

    let init_container_statuses = status
        .and_then(|s| s.init_container_statuses.as_ref())
        .map(|statuses| statuses.iter().map(convert_status).collect())
        .unwrap_or_default();

    let conditions = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| UnitCondition {
                    condition_type: c.type_.clone(),
                    status: ConditionStatus::parse(&c.status),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    UnitSnapshot {
        namespace: meta.namespace.clone().unwrap_or_else(|| "default".to_string()),
        name: meta.name.clone().unwrap_or_default(),
        uid: meta.uid.clone().unwrap_or_default(),
        phase: status
            .and_then(|s| s.phase.as_deref())
            .map(UnitPhase::parse)
            .unwrap_or(UnitPhase::Unknown),
        declared_containers,
        container_statuses,
        init_container_statuses,
        conditions,
        owner,
    }
}

/// Resolve the controller owning a pod.
///
/// ReplicaSets are followed up to their Deployment; StatefulSets, DaemonSets,
/// Jobs and direct Deployments are returned as-is.
pub async fn resolve_owner(client: &Client, pod: &Pod) -> Option<OwnerRef> {
    let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
    let owner = pod.metadata.owner_references.as_ref()?.first()?;

    if owner.kind != "ReplicaSet" {
        return Some(OwnerRef {
            kind: owner.kind.clone(),
            name: owner.name.clone(),
        });
    }

    let replica_sets: Api<ReplicaSet> = Api::namespaced(client.clone(), namespace);
    match replica_sets.get(&owner.name).await {
        Ok(rs) => {
            let deployment = rs
                .metadata
                .owner_references
                .as_ref()
                .and_then(|refs| refs.iter().find(|r| r.kind == "Deployment"));
            Some(match deployment {
                Some(d) => OwnerRef {
                    kind: d.kind.clone(),
                    name: d.name.clone(),
                },
                None => OwnerRef {
                    kind: owner.kind.clone(),
                    name: owner.name.clone(),
                },
            })
        }
        Err(e) => {
            warn!(
                namespace = %namespace,
                replica_set = %owner.name,
                error = %e,
                "Failed to resolve ReplicaSet owner"
            );
            Some(OwnerRef {
                kind: owner.kind.clone(),
                name: owner.name.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn crashing_pod() -> Pod {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "api-5c8f7",
                "namespace": "shop",
                "uid": "0b6e",
                "ownerReferences": [{
                    "apiVersion": "apps/v1",
                    "kind": "StatefulSet",
                    "name": "api",
                    "uid": "x"
                }]
            },
            "spec": {
                "containers": [{"name": "app"}, {"name": "sidecar"}]
            },
            "status": {
                "phase": "Running",
                "conditions": [
                    {"type": "Ready", "status": "False", "reason": "ContainersNotReady"}
                ],
                "containerStatuses": [
                    {
                        "name": "app",
                        "ready": false,
                        "restartCount": 4,
                        "image": "app:1",
                        "imageID": "",
                        "state": {"waiting": {"reason": "CrashLoopBackOff"}},
                        "lastState": {"terminated": {"exitCode": 137, "reason": "OOMKilled"}}
                    },
                    {
                        "name": "sidecar",
                        "ready": true,
                        "restartCount": 0,
                        "image": "proxy:1",
                        "imageID": "",
                        "state": {"running": {}}
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_unit_from_pod_maps_status() {
        let owner = Some(OwnerRef {
            kind: "StatefulSet".to_string(),
            name: "api".to_string(),
        });

        let unit = unit_from_pod(&crashing_pod(), owner.clone());

        assert_eq!(unit.qualified_name(), "shop/api-5c8f7");
        assert_eq!(unit.uid, "0b6e");
        assert_eq!(unit.phase, UnitPhase::Running);
        assert_eq!(unit.declared_containers, vec!["app", "sidecar"]);
        assert_eq!(unit.generation(), 4);
        assert!(!unit.is_ready());
        assert_eq!(unit.owner, owner);

        let app = &unit.container_statuses[0];
        assert!(matches!(
            &app.state,
            Some(ContainerState::Waiting(w)) if w.reason == "CrashLoopBackOff"
        ));
        assert_eq!(app.last_terminated.as_ref().unwrap().exit_code, 137);
        assert_eq!(unit.container_statuses[1].state, Some(ContainerState::Running));
    }

    #[test]
    fn test_unit_from_pod_tolerates_missing_status() {
        let pod: Pod = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "bare"}
        }))
        .unwrap();

        let unit = unit_from_pod(&pod, None);

        assert_eq!(unit.namespace, "default");
        assert_eq!(unit.phase, UnitPhase::Unknown);
        assert!(unit.container_statuses.is_empty());
        assert!(unit.declared_containers.is_empty());
    }

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code,
        })
    }

    #[test]
    fn test_api_errors_are_classified() {
        assert!(matches!(
            map_kube_error(api_error(404), "secret shop/ai"),
            SourceError::NotFound(_)
        ));
        assert!(matches!(
            map_kube_error(api_error(403), "secret shop/ai"),
            SourceError::AccessDenied(_)
        ));
        assert!(matches!(
            map_kube_error(api_error(500), "secret shop/ai"),
            SourceError::Transport(_)
        ));
    }
}
