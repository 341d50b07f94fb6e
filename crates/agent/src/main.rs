//! Pod sleuth agent - explains why pods are not ready
//!
//! This binary runs as a Deployment in the cluster, periodically scanning
//! pods, diagnosing the unhealthy ones from status and logs, and serving the
//! results over HTTP.

use anyhow::{Context, Result};
use sleuth_agent::{
    api::{self, AppState},
    config::AgentConfig,
    scan::{KubeUnitLister, ReportStore, Scanner},
};
use sleuth_lib::{
    analysis::{configured_method_names, AiAnalyzer},
    health::{components, HealthRegistry},
    sources::{KubeLogSource, KubeSecretSource},
    AnalysisCache, DiagnosisPipeline, RefreshSignal, SleuthMetrics, StructuredLogger,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pod-sleuth agent");

    let config = AgentConfig::load()?;
    info!(
        instance = %config.instance,
        scan_interval_secs = config.scan_interval_secs,
        analysis_enabled = config.analysis.enabled,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::KUBE_API).await;
    health_registry.register(components::LOG_SOURCE).await;
    health_registry.register(components::PIPELINE).await;

    let metrics = SleuthMetrics::new();
    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(AGENT_VERSION, &configured_method_names(&config.analysis));

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let cache = Arc::new(AnalysisCache::new());
    let refresh = Arc::new(RefreshSignal::new());
    let reports = Arc::new(ReportStore::new());

    let ai = AiAnalyzer::new(Arc::new(KubeSecretSource::new(client.clone())))
        .context("Failed to create AI HTTP client")?;
    let pipeline = Arc::new(
        DiagnosisPipeline::new(
            cache.clone(),
            Arc::new(KubeLogSource::new(client.clone())),
            ai,
            refresh.clone(),
        )
        .with_logger(logger.clone()),
    );

    let scanner = Scanner::new(
        Arc::new(KubeUnitLister::new(
            client,
            config.namespace.clone(),
            config.label_selector.clone(),
        )),
        pipeline,
        refresh.clone(),
        reports.clone(),
        health_registry.clone(),
        logger.clone(),
        config.analysis.clone(),
        config.scan_interval(),
    );

    let app_state = Arc::new(AppState {
        health_registry: health_registry.clone(),
        metrics,
        cache,
        refresh,
        reports,
        scan_trigger: scanner.trigger(),
    });

    health_registry.set_ready(true).await;

    let shutdown = CancellationToken::new();
    let scan_handle = tokio::spawn(scanner.run(shutdown.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
    }

    shutdown.cancel();
    if let Err(e) = scan_handle.await {
        error!(error = %e, "Scan loop task panicked");
    }

    info!("Shutting down");
    Ok(())
}
