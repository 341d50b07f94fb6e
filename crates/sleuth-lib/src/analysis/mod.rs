//! Log analysis methods
//!
//! This module provides:
//! - Deterministic pattern matching against an ordered rule set
//! - AI analysis through OpenAI, Anthropic, Ollama or generic endpoints
//! - Heuristic confidence scoring for AI answers
//! - Merging of method verdicts into one diagnosis

mod ai;
mod confidence;
mod config;
mod merge;
mod pattern;
mod provider;

#[cfg(test)]
mod tests;

pub use ai::{AiAnalysis, AiAnalyzer, AiError};
pub use confidence::score_ai_response;
pub use config::{AiEndpointConfig, AnalysisConfig, PatternSpec, SecretKeyRef};
pub use merge::{merge, MergedVerdict};
pub use pattern::{compile_rules, default_rules, PatternAnalysis, PatternAnalyzer, PatternRule};
pub use provider::{build_prompt, ApiFormat, ProviderAdapter};

use tracing::warn;

/// Method run when none is configured
pub const DEFAULT_METHOD: &str = "pattern";

/// Registered analysis method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisMethod {
    Pattern,
    Ai,
    /// Unrecognized name; runs nothing
    Noop(String),
}

impl AnalysisMethod {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pattern" => AnalysisMethod::Pattern,
            "ai" => AnalysisMethod::Ai,
            other => AnalysisMethod::Noop(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AnalysisMethod::Pattern => "pattern",
            AnalysisMethod::Ai => "ai",
            AnalysisMethod::Noop(name) => name,
        }
    }
}

/// Configured method names, normalized; `["pattern"]` when none are set
pub fn configured_method_names(config: &AnalysisConfig) -> Vec<String> {
    let names: Vec<String> = config
        .methods
        .iter()
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .collect();

    if names.is_empty() {
        vec![DEFAULT_METHOD.to_string()]
    } else {
        names
    }
}

/// Resolve configured names through the registry, in order
pub fn resolve_methods(config: &AnalysisConfig) -> Vec<AnalysisMethod> {
    configured_method_names(config)
        .iter()
        .map(|name| {
            let method = AnalysisMethod::from_name(name);
            if let AnalysisMethod::Noop(unknown) = &method {
                warn!(method = %unknown, "Unknown analysis method, skipping");
            }
            method
        })
        .collect()
}
