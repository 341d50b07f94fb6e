//! Log analysis configuration supplied by the driver for each pass

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TTL for cached diagnoses (5 minutes)
const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;
const DEFAULT_LINES_TO_ANALYZE: u32 = 100;
const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;

/// Log analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Master switch; nothing is fetched or analyzed when false
    pub enabled: bool,
    /// Methods to run, in order (`pattern`, `ai`). Empty means `pattern`.
    pub methods: Vec<String>,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Tail lines fetched from the target container
    pub lines_to_analyze: u32,
    /// Keep only lines containing an error/warning keyword
    pub filter_errors_only: bool,
    /// Custom pattern rules; the built-in set is used when empty
    pub patterns: Vec<PatternSpec>,
    pub ai: AiEndpointConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            methods: Vec::new(),
            cache_enabled: true,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            lines_to_analyze: DEFAULT_LINES_TO_ANALYZE,
            filter_errors_only: true,
            patterns: Vec::new(),
            ai: AiEndpointConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Caller-supplied pattern rule before compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    /// Regular expression matched against each log line
    pub pattern: String,
    /// Reported root cause; the first matched line is used when empty
    #[serde(default)]
    pub root_cause: String,
    /// Higher wins when several rules could match a line
    #[serde(default)]
    pub priority: i32,
}

/// Reference to a secret key holding the AI credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    /// Defaults to `api-key`
    #[serde(default)]
    pub key: Option<String>,
}

/// AI endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiEndpointConfig {
    pub endpoint: String,
    /// `openai`, `anthropic`, `ollama` or `generic`; inferred from the endpoint when unset
    pub format: Option<String>,
    /// Per-format default when unset
    pub model: Option<String>,
    pub api_key: Option<SecretKeyRef>,
    /// Defaults to `Authorization`
    pub auth_header: Option<String>,
    /// Defaults to `Bearer`; an empty prefix sends the bare key
    pub auth_prefix: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AiEndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            format: None,
            model: None,
            api_key: None,
            auth_header: None,
            auth_prefix: None,
            timeout_secs: DEFAULT_AI_TIMEOUT_SECS,
        }
    }
}

impl AiEndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Header name and value for a resolved credential
    pub fn auth_header_for(&self, api_key: &str) -> (String, String) {
        let header = self
            .auth_header
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or("Authorization")
            .to_string();
        let value = match self.auth_prefix.as_deref().unwrap_or("Bearer") {
            "" => api_key.to_string(),
            prefix => format!("{} {}", prefix, api_key),
        };
        (header, value)
    }
}
