//! External data sources consumed by the diagnosis pipeline
//!
//! This module provides:
//! - `LogSource` for tailing container logs
//! - `SecretSource` for resolving AI credentials
//! - Kubernetes-backed implementations of both

mod kubernetes;

pub use kubernetes::{resolve_owner, unit_from_pod, KubeLogSource, KubeSecretSource};

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a log or secret source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Tails the logs of one container of a unit
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Last `max_lines` lines, oldest first
    async fn fetch_tail_lines(
        &self,
        namespace: &str,
        unit: &str,
        container: &str,
        max_lines: u32,
    ) -> Result<Vec<String>, SourceError>;
}

/// Reads one key of a named secret
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<String, SourceError>;
}
