//! Periodic pod scan
//!
//! Lists pods, investigates and diagnoses the ones that are not ready,
//! publishes the resulting reports and sweeps the diagnosis cache.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use sleuth_lib::analysis::AnalysisConfig;
use sleuth_lib::health::{components, HealthRegistry};
use sleuth_lib::sources::{resolve_owner, unit_from_pod};
use sleuth_lib::{
    investigate, CacheKey, Diagnosis, DiagnosisError, DiagnosisPipeline, RefreshSignal,
    SleuthMetrics, StructuredLogger, UnitReport, UnitSnapshot,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Source of unit snapshots for a scan
#[async_trait]
pub trait UnitLister: Send + Sync {
    async fn list_units(&self) -> Result<Vec<UnitSnapshot>>;
}

/// Lists pods through the Kubernetes API
pub struct KubeUnitLister {
    client: Client,
    namespace: Option<String>,
    label_selector: Option<String>,
}

impl KubeUnitLister {
    pub fn new(client: Client, namespace: Option<String>, label_selector: Option<String>) -> Self {
        Self {
            client,
            namespace,
            label_selector,
        }
    }
}

#[async_trait]
impl UnitLister for KubeUnitLister {
    async fn list_units(&self) -> Result<Vec<UnitSnapshot>> {
        let pods: Api<Pod> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut params = ListParams::default();
        if let Some(selector) = &self.label_selector {
            params = params.labels(selector);
        }

        let list = pods.list(&params).await.context("Failed to list pods")?;

        let mut units = Vec::with_capacity(list.items.len());
        for pod in &list.items {
            let mut unit = unit_from_pod(pod, None);
            // owner lookups cost an API call, only resolve them for reported pods
            if !unit.is_ready() {
                unit.owner = resolve_owner(&self.client, pod).await;
            }
            units.push(unit);
        }

        Ok(units)
    }
}

/// Latest published reports, served by the status API
#[derive(Debug, Default)]
pub struct ReportStore {
    reports: RwLock<Vec<UnitReport>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, reports: Vec<UnitReport>) {
        *self.reports.write().await = reports;
    }

    pub async fn all(&self) -> Vec<UnitReport> {
        self.reports.read().await.clone()
    }
}

/// Result of one scan pass
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub total: usize,
    pub not_ready: usize,
    pub diagnosed: usize,
    pub failed: usize,
    pub swept: usize,
}

/// Periodic scanner driving the diagnosis pipeline
pub struct Scanner {
    lister: Arc<dyn UnitLister>,
    pipeline: Arc<DiagnosisPipeline>,
    refresh: Arc<RefreshSignal>,
    reports: Arc<ReportStore>,
    health: HealthRegistry,
    metrics: SleuthMetrics,
    logger: StructuredLogger,
    analysis: AnalysisConfig,
    interval: Duration,
    trigger: Arc<Notify>,
}

impl Scanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lister: Arc<dyn UnitLister>,
        pipeline: Arc<DiagnosisPipeline>,
        refresh: Arc<RefreshSignal>,
        reports: Arc<ReportStore>,
        health: HealthRegistry,
        logger: StructuredLogger,
        analysis: AnalysisConfig,
        interval: Duration,
    ) -> Self {
        Self {
            lister,
            pipeline,
            refresh,
            reports,
            health,
            metrics: SleuthMetrics::new(),
            logger,
            analysis,
            interval,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Notified to run a scan ahead of the next tick
    pub fn trigger(&self) -> Arc<Notify> {
        self.trigger.clone()
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Starting pod scan loop");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {
                    debug!("Scan triggered ahead of schedule");
                }
                _ = shutdown.cancelled() => {
                    info!("Shutting down pod scan loop");
                    break;
                }
            }

            let start = Instant::now();
            match self.scan_once(&shutdown).await {
                Ok(outcome) => {
                    debug!(
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        not_ready = outcome.not_ready,
                        "Scan cycle complete"
                    );
                }
                Err(e) if shutdown.is_cancelled() => {
                    debug!(error = %e, "Scan interrupted by shutdown");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Scan failed");
                }
            }
        }
    }

    /// List units and process them
    pub async fn scan_once(&self, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let units = match self.lister.list_units().await {
            Ok(units) => {
                self.health.set_healthy(components::KUBE_API).await;
                units
            }
            Err(e) => {
                self.health
                    .set_unhealthy(components::KUBE_API, format!("{:#}", e))
                    .await;
                return Err(e);
            }
        };

        self.process_units(cancel, &units).await
    }

    /// Investigate and diagnose every not-ready unit, publish reports and
    /// sweep cache entries of units no longer observed
    pub async fn process_units(
        &self,
        cancel: &CancellationToken,
        units: &[UnitSnapshot],
    ) -> Result<ScanOutcome> {
        // requests made from here on wait for the next pass
        self.refresh.begin_pass();

        let not_ready: Vec<&UnitSnapshot> = units.iter().filter(|u| !u.is_ready()).collect();

        let mut outcome = ScanOutcome {
            total: units.len(),
            not_ready: not_ready.len(),
            ..Default::default()
        };
        let mut reports = Vec::with_capacity(not_ready.len());

        for unit in &not_ready {
            let report = investigate(unit).into_report(unit);

            let report = match self.pipeline.diagnose(cancel, unit, &self.analysis).await {
                Ok(Some(diagnosis)) => {
                    outcome.diagnosed += 1;
                    report.with_diagnosis(diagnosis)
                }
                Ok(None) => report,
                Err(DiagnosisError::Cancelled) => {
                    anyhow::bail!("scan cancelled");
                }
                Err(e) => {
                    outcome.failed += 1;
                    warn!(
                        pod = %unit.qualified_name(),
                        error = %e,
                        "Log analysis failed"
                    );
                    report.with_diagnosis(Diagnosis::failed(&e, Utc::now()))
                }
            };

            info!(
                pod = %unit.name,
                namespace = %unit.namespace,
                phase = %unit.phase,
                owner_kind = report.owner_kind.as_deref().unwrap_or(""),
                owner_name = report.owner_name.as_deref().unwrap_or(""),
                reason = %report.reason,
                message = %report.message,
                container_errors = report.container_errors.len(),
                "Non-ready pod detected"
            );

            reports.push(report);
        }

        let live: HashSet<CacheKey> = not_ready.iter().map(|u| CacheKey::for_unit(u)).collect();
        outcome.swept = self.pipeline.cache().sweep(&live);

        self.reports.replace(reports).await;
        self.refresh.finish_pass();

        self.metrics.set_units_not_ready(outcome.not_ready);
        self.metrics.set_cache_entries(self.pipeline.cache().len());

        if outcome.failed > 0 {
            self.health
                .set_degraded(
                    components::LOG_SOURCE,
                    format!("{} log analyses failed in last scan", outcome.failed),
                )
                .await;
        } else {
            self.health.set_healthy(components::LOG_SOURCE).await;
        }
        self.health.set_healthy(components::PIPELINE).await;
        self.health.mark_scan_completed().await;

        self.logger.log_scan_summary(
            outcome.total,
            outcome.not_ready,
            outcome.diagnosed,
            outcome.swept,
        );

        Ok(outcome)
    }
}
