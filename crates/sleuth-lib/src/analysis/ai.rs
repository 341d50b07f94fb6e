//! AI-backed log analysis
//!
//! Handles:
//! - Credential lookup through a [`SecretSource`]
//! - Provider envelope selection and a single POST per call
//! - Response parsing and heuristic confidence scoring

use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::confidence::score_ai_response;
use super::config::AiEndpointConfig;
use super::provider::{build_prompt, ApiFormat};
use crate::diagnosis::AiVerdict;
use crate::models::UnitSnapshot;
use crate::sources::{SecretSource, SourceError};

/// Lines of input returned as evidence
const EVIDENCE_LINES: usize = 20;
const DEFAULT_SECRET_KEY: &str = "api-key";
const UNRECOGNIZED_CONFIDENCE: u8 = 50;

/// AI analysis failure
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI endpoint not configured")]
    MissingEndpoint,
    #[error("failed to get API key: {0}")]
    Credential(#[from] SourceError),
    #[error("AI request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("AI API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse AI response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("AI analysis cancelled")]
    Cancelled,
}

/// Verdict plus the lines sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiAnalysis {
    pub verdict: AiVerdict,
    pub evidence: Vec<String>,
}

/// Sends log lines to a configured AI endpoint
#[derive(Clone)]
pub struct AiAnalyzer {
    http: Client,
    secrets: Arc<dyn SecretSource>,
}

impl AiAnalyzer {
    pub fn new(secrets: Arc<dyn SecretSource>) -> Result<Self, reqwest::Error> {
        let http = Client::builder().build()?;
        Ok(Self { http, secrets })
    }

    /// Analyze `lines` for `unit` with one request to the configured endpoint
    pub async fn analyze(
        &self,
        cancel: &CancellationToken,
        lines: &[String],
        unit: &UnitSnapshot,
        config: &AiEndpointConfig,
    ) -> Result<AiAnalysis, AiError> {
        if config.endpoint.trim().is_empty() {
            return Err(AiError::MissingEndpoint);
        }

        let api_key = match &config.api_key {
            Some(secret) => {
                let key = secret
                    .key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .unwrap_or(DEFAULT_SECRET_KEY);
                let value = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AiError::Cancelled),
                    value = self.secrets.fetch_secret_value(&unit.namespace, &secret.name, key) => value?,
                };
                Some(value)
            }
            None => None,
        };

        let format = ApiFormat::resolve(config.format.as_deref(), &config.endpoint);
        let model = format.resolve_model(config.model.as_deref());
        let adapter = format.adapter();
        let body = adapter.build_request(model.as_deref(), &build_prompt(unit, lines));

        debug!(
            pod = %unit.qualified_name(),
            format = %format,
            model = model.as_deref().unwrap_or(""),
            lines = lines.len(),
            "Sending AI analysis request"
        );

        let mut request = self
            .http
            .post(&config.endpoint)
            .timeout(config.timeout())
            .json(&body);
        for (name, value) in adapter.extra_headers() {
            request = request.header(*name, *value);
        }
        if let Some(key) = &api_key {
            let (name, value) = config.auth_header_for(key);
            request = request.header(name, value);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
            text = response.text() => text?,
        };

        if !status.is_success() {
            warn!(
                pod = %unit.qualified_name(),
                status = status.as_u16(),
                "AI API returned error status"
            );
            return Err(AiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let decoded: Value = serde_json::from_str(&text)?;
        let reported_model = decoded
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or(model)
            .unwrap_or_default();

        let (root_cause, confidence) = match adapter.extract_text(&decoded) {
            Some(answer) => {
                let confidence = score_ai_response(&answer);
                (answer, confidence)
            }
            None => (
                format!("AI analysis completed (response format not recognized): {}", text),
                UNRECOGNIZED_CONFIDENCE,
            ),
        };

        info!(
            pod = %unit.qualified_name(),
            model = %reported_model,
            confidence = confidence,
            "AI analysis complete"
        );

        Ok(AiAnalysis {
            verdict: AiVerdict {
                model: reported_model,
                root_cause,
                confidence,
                error: None,
            },
            evidence: lines.iter().take(EVIDENCE_LINES).cloned().collect(),
        })
    }
}
