//! Diagnosis pipeline
//!
//! Handles:
//! - Cache lookup keyed by unit generation, with force-refresh bypass
//! - Target container selection and log retrieval
//! - Running the configured analysis methods in order
//! - Merging verdicts and storing the result

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::analysis::{
    merge, resolve_methods, AiAnalyzer, AiError, AnalysisConfig, AnalysisMethod, PatternAnalyzer,
    PatternSpec,
};
use crate::cache::{AnalysisCache, CacheKey};
use crate::diagnosis::{AiVerdict, Diagnosis};
use crate::error::DiagnosisError;
use crate::models::{UnitPhase, UnitSnapshot};
use crate::observability::{SleuthMetrics, StructuredLogger};
use crate::refresh::RefreshSignal;
use crate::sources::LogSource;

/// Wait before a forced re-analysis so its timestamp differs at second precision
const DEFAULT_REFRESH_SETTLE: Duration = Duration::from_millis(1100);

const ERROR_KEYWORDS: &[&str] = &[
    "error", "err", "failed", "failure", "fatal", "panic", "exception", "warning", "warn",
    "critical", "alert",
];

/// Orchestrates log analysis for one unit at a time
pub struct DiagnosisPipeline {
    cache: Arc<AnalysisCache>,
    logs: Arc<dyn LogSource>,
    ai: AiAnalyzer,
    refresh: Arc<RefreshSignal>,
    refresh_settle: Duration,
    metrics: SleuthMetrics,
    logger: StructuredLogger,
    /// Analyzer compiled from the last seen custom patterns
    patterns: Mutex<Option<(Vec<PatternSpec>, Arc<PatternAnalyzer>)>>,
}

impl DiagnosisPipeline {
    pub fn new(
        cache: Arc<AnalysisCache>,
        logs: Arc<dyn LogSource>,
        ai: AiAnalyzer,
        refresh: Arc<RefreshSignal>,
    ) -> Self {
        Self {
            cache,
            logs,
            ai,
            refresh,
            refresh_settle: DEFAULT_REFRESH_SETTLE,
            metrics: SleuthMetrics::new(),
            logger: StructuredLogger::new("pod-sleuth"),
            patterns: Mutex::new(None),
        }
    }

    pub fn with_refresh_settle(mut self, settle: Duration) -> Self {
        self.refresh_settle = settle;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn cache(&self) -> &Arc<AnalysisCache> {
        &self.cache
    }

    /// Pattern analyzer for `specs`, recompiled only when they change
    pub fn pattern_analyzer(&self, specs: &[PatternSpec]) -> Arc<PatternAnalyzer> {
        let mut compiled = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((seen, analyzer)) = compiled.as_ref() {
            if seen.as_slice() == specs {
                return analyzer.clone();
            }
        }

        debug!(patterns = specs.len(), "Compiling pattern rules");
        let analyzer = Arc::new(PatternAnalyzer::from_specs(specs));
        *compiled = Some((specs.to_vec(), analyzer.clone()));
        analyzer
    }

    /// Diagnose `unit` from its logs.
    ///
    /// Returns `Ok(None)` when analysis is disabled, the unit completed
    /// successfully, or no relevant log lines were found.
    pub async fn diagnose(
        &self,
        cancel: &CancellationToken,
        unit: &UnitSnapshot,
        config: &AnalysisConfig,
    ) -> Result<Option<Diagnosis>, DiagnosisError> {
        if !config.enabled {
            return Ok(None);
        }

        if unit.phase == UnitPhase::Succeeded {
            debug!(pod = %unit.qualified_name(), "Unit succeeded, skipping log analysis");
            return Ok(None);
        }

        let key = CacheKey::for_unit(unit);

        if self.refresh.is_forced(unit) {
            info!(
                pod = %unit.qualified_name(),
                settle_ms = self.refresh_settle.as_millis() as u64,
                "Force refresh requested, bypassing cache"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DiagnosisError::Cancelled),
                _ = tokio::time::sleep(self.refresh_settle) => {}
            }
        } else if config.cache_enabled {
            if let Some(cached) = self.cache.get(&key) {
                self.metrics.inc_cache_hits();
                self.logger
                    .log_cache_hit(&unit.namespace, &unit.name, &key.to_string());
                return Ok(Some(cached));
            }
            self.metrics.inc_cache_misses();
        }

        let started = Instant::now();

        let container = select_target_container(unit)
            .ok_or_else(|| DiagnosisError::NoContainer {
                unit: unit.qualified_name(),
            })?
            .to_string();

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DiagnosisError::Cancelled),
            fetched = self.logs.fetch_tail_lines(
                &unit.namespace,
                &unit.name,
                &container,
                config.lines_to_analyze,
            ) => fetched,
        };
        let lines = fetched.map_err(|source| DiagnosisError::LogFetch {
            container: container.clone(),
            source,
        })?;

        let lines = if config.filter_errors_only {
            filter_error_lines(lines)
        } else {
            lines
        };

        if lines.is_empty() {
            debug!(
                pod = %unit.qualified_name(),
                container = %container,
                "No relevant log lines to analyze"
            );
            return Ok(None);
        }

        let methods = resolve_methods(config);
        let method_names: Vec<String> = methods.iter().map(|m| m.name().to_string()).collect();

        let mut pattern_verdict = None;
        let mut ai_verdict = None;
        let mut evidence = Vec::new();

        for method in &methods {
            match method {
                AnalysisMethod::Pattern => {
                    if let Some(analysis) =
                        self.pattern_analyzer(&config.patterns).analyze(&lines)
                    {
                        evidence.extend(analysis.evidence);
                        pattern_verdict = Some(analysis.verdict);
                    }
                }
                AnalysisMethod::Ai => match self.ai.analyze(cancel, &lines, unit, &config.ai).await {
                    Ok(analysis) => {
                        evidence.extend(analysis.evidence);
                        ai_verdict = Some(analysis.verdict);
                    }
                    Err(AiError::Cancelled) => return Err(DiagnosisError::Cancelled),
                    Err(e) => {
                        let message = format!("AI analysis failed: {}", e);
                        self.metrics.inc_method_failures(method.name());
                        self.logger.log_method_failure(
                            &unit.namespace,
                            &unit.name,
                            method.name(),
                            &message,
                        );
                        ai_verdict = Some(AiVerdict::failed(message));
                    }
                },
                AnalysisMethod::Noop(_) => {}
            }
        }

        let Some(merged) = merge(pattern_verdict, ai_verdict, &method_names, &evidence) else {
            debug!(pod = %unit.qualified_name(), "No analysis method produced a verdict");
            return Ok(None);
        };
        let diagnosis = merged.into_diagnosis(Utc::now());

        self.metrics
            .observe_analysis_latency(started.elapsed().as_secs_f64());
        self.metrics.inc_diagnoses();
        self.logger.log_diagnosis(
            &unit.namespace,
            &unit.name,
            &diagnosis.method,
            diagnosis.confidence,
            &diagnosis.root_cause,
        );

        if config.cache_enabled && diagnosis.has_usable_verdict() {
            let stored = self.cache.put(key, diagnosis, config.cache_ttl());
            self.metrics.set_cache_entries(self.cache.len());
            return Ok(Some(stored));
        }

        Ok(Some(diagnosis))
    }
}

/// Container whose logs explain the failure.
///
/// First container in a waiting or terminated state, else the first
/// not-ready one, else the first declared container.
pub fn select_target_container(unit: &UnitSnapshot) -> Option<&str> {
    unit.container_statuses
        .iter()
        .find(|c| c.is_error_state())
        .or_else(|| unit.container_statuses.iter().find(|c| !c.ready))
        .map(|c| c.name.as_str())
        .or_else(|| unit.declared_containers.first().map(String::as_str))
}

/// Keep lines mentioning an error or warning keyword
pub fn filter_error_lines(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            ERROR_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .collect()
}
