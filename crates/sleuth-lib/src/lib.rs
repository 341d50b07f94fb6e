//! Diagnosis engine for unhealthy pods
//!
//! This crate provides the core functionality for:
//! - Investigating container and condition status
//! - Log analysis through pattern matching and AI endpoints
//! - Merging method verdicts into a single diagnosis
//! - Generation-fenced TTL caching of diagnoses
//! - Kubernetes log and secret sources
//! - Health checks and observability

pub mod analysis;
pub mod cache;
pub mod diagnosis;
pub mod error;
pub mod health;
pub mod investigator;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod refresh;
pub mod sources;

#[cfg(test)]
mod test_support;

pub use cache::{AnalysisCache, CacheEntry, CacheKey};
pub use diagnosis::{AiVerdict, Diagnosis, PatternVerdict};
pub use error::DiagnosisError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use investigator::{investigate, Investigation};
pub use models::*;
pub use observability::{SleuthMetrics, StructuredLogger};
pub use pipeline::DiagnosisPipeline;
pub use refresh::RefreshSignal;
