//! HTTP API for health checks, Prometheus metrics and diagnosis status

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use sleuth_lib::{
    health::{ComponentStatus, HealthRegistry},
    AnalysisCache, CacheEntry, RefreshSignal, SleuthMetrics, UnitReport,
};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};

use crate::scan::ReportStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: SleuthMetrics,
    pub cache: Arc<AnalysisCache>,
    pub refresh: Arc<RefreshSignal>,
    pub reports: Arc<ReportStore>,
    /// Wakes the scan loop after a refresh request
    pub scan_trigger: Arc<Notify>,
}

/// Health check response - returns 200 if operational, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitsResponse {
    pub non_ready_pods: Vec<UnitReport>,
    pub count: usize,
}

/// Reports from the latest scan
async fn units(State(state): State<Arc<AppState>>) -> Json<UnitsResponse> {
    let non_ready_pods = state.reports.all().await;
    Json(UnitsResponse {
        count: non_ready_pods.len(),
        non_ready_pods,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheResponse {
    pub entries: Vec<CacheEntry>,
    pub count: usize,
}

async fn cache(State(state): State<Arc<AppState>>) -> Json<CacheResponse> {
    let entries = state.cache.snapshot();
    Json(CacheResponse {
        count: entries.len(),
        entries,
    })
}

/// Optional target of a refresh request; both fields are needed to target one pod
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRefreshRequest {
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub pod_namespace: String,
}

impl ForceRefreshRequest {
    /// `namespace/name` when both are set
    fn target(&self) -> Option<(&str, &str)> {
        let name = self.pod_name.trim();
        let namespace = self.pod_namespace.trim();
        (!name.is_empty() && !namespace.is_empty()).then_some((namespace, name))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRefreshResponse {
    pub success: bool,
    pub message: String,
    pub target_pod: String,
}

/// Bypass the cache on the next scan, for one pod or for all of them
async fn force_refresh(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    // an empty or malformed body means a global refresh
    let request: ForceRefreshRequest = serde_json::from_slice(&body).unwrap_or_default();

    let (target_pod, message) = match request.target() {
        Some((namespace, name)) => {
            state.refresh.request_unit(namespace, name);
            let target = format!("{}/{}", namespace, name);
            let message = format!("Force refresh triggered for pod {}", target);
            (target, message)
        }
        None => {
            state.refresh.request_all();
            (String::new(), "Force refresh triggered for all pods".to_string())
        }
    };

    info!(target_pod = %target_pod, "Force refresh requested");
    state.scan_trigger.notify_one();

    (
        StatusCode::OK,
        Json(ForceRefreshResponse {
            success: true,
            message,
            target_pod,
        }),
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/units", get(units))
        .route("/api/cache", get(cache))
        .route("/api/force-refresh", post(force_refresh))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
