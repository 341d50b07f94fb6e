//! Provider-specific request and response shapes for AI endpoints
//!
//! Each wire format gets one [`ProviderAdapter`]. Formats are resolved from
//! configuration first and inferred from the endpoint URL otherwise.

use serde_json::{json, Value};
use url::Url;

use crate::models::UnitSnapshot;

const MAX_TOKENS: u32 = 200;
const OLLAMA_PORT: u16 = 11434;

const SYSTEM_PROMPT: &str =
    "You are a Kubernetes troubleshooting expert. Analyze pod logs and identify root causes.";

/// Wire format spoken by an AI endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    OpenAi,
    Anthropic,
    Ollama,
    Generic,
}

impl ApiFormat {
    /// Explicit format wins; unknown explicit values fall back to generic
    pub fn resolve(explicit: Option<&str>, endpoint: &str) -> Self {
        match explicit.map(str::trim).filter(|f| !f.is_empty()) {
            Some(format) => Self::parse(format),
            None => Self::infer(endpoint),
        }
    }

    pub fn parse(format: &str) -> Self {
        match format.to_ascii_lowercase().as_str() {
            "openai" => ApiFormat::OpenAi,
            "anthropic" => ApiFormat::Anthropic,
            "ollama" => ApiFormat::Ollama,
            _ => ApiFormat::Generic,
        }
    }

    /// Infer the format from the endpoint; OpenAI-compatible is the default
    pub fn infer(endpoint: &str) -> Self {
        if endpoint.contains("openai.com") {
            ApiFormat::OpenAi
        } else if endpoint.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else if endpoint.contains("ollama") || is_ollama_port(endpoint) {
            ApiFormat::Ollama
        } else {
            ApiFormat::OpenAi
        }
    }

    pub fn default_model(self) -> Option<&'static str> {
        match self {
            ApiFormat::OpenAi => Some("gpt-3.5-turbo"),
            ApiFormat::Anthropic => Some("claude-3-haiku-20240307"),
            ApiFormat::Ollama => Some("llama2"),
            ApiFormat::Generic => None,
        }
    }

    /// Explicit model wins over the per-format default
    pub fn resolve_model(self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or_else(|| self.default_model())
            .map(str::to_string)
    }

    pub fn adapter(self) -> &'static dyn ProviderAdapter {
        match self {
            ApiFormat::OpenAi => &OpenAiAdapter,
            ApiFormat::Anthropic => &AnthropicAdapter,
            ApiFormat::Ollama => &OllamaAdapter,
            ApiFormat::Generic => &GenericAdapter,
        }
    }
}

impl std::fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiFormat::OpenAi => write!(f, "openai"),
            ApiFormat::Anthropic => write!(f, "anthropic"),
            ApiFormat::Ollama => write!(f, "ollama"),
            ApiFormat::Generic => write!(f, "generic"),
        }
    }
}

fn is_ollama_port(endpoint: &str) -> bool {
    match Url::parse(endpoint) {
        Ok(url) => url.port() == Some(OLLAMA_PORT),
        Err(_) => endpoint.contains(":11434"),
    }
}

/// Request/response shape of one AI provider
pub trait ProviderAdapter: Send + Sync {
    /// JSON body for `prompt`
    fn build_request(&self, model: Option<&str>, prompt: &str) -> Value;

    /// Free-text answer from a decoded response body, if present and non-empty
    fn extract_text(&self, response: &Value) -> Option<String>;

    /// Headers the provider requires beyond content type and auth
    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }
}

/// OpenAI chat completions and compatible services (Together, Groq, vLLM, LocalAI)
pub struct OpenAiAdapter;

impl ProviderAdapter for OpenAiAdapter {
    fn build_request(&self, model: Option<&str>, prompt: &str) -> Value {
        json!({
            "model": model.unwrap_or_default(),
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": 0.3,
        })
    }

    fn extract_text(&self, response: &Value) -> Option<String> {
        non_empty(response.pointer("/choices/0/message/content"))
    }
}

/// Anthropic messages API
pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn build_request(&self, model: Option<&str>, prompt: &str) -> Value {
        json!({
            "model": model.unwrap_or_default(),
            "max_tokens": MAX_TOKENS,
            "messages": [
                {"role": "user", "content": prompt},
            ],
        })
    }

    fn extract_text(&self, response: &Value) -> Option<String> {
        non_empty(response.pointer("/content/0/text"))
    }

    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[("anthropic-version", "2023-06-01")]
    }
}

/// Ollama generate API
pub struct OllamaAdapter;

impl ProviderAdapter for OllamaAdapter {
    fn build_request(&self, model: Option<&str>, prompt: &str) -> Value {
        json!({
            "model": model.unwrap_or_default(),
            "prompt": prompt,
            "stream": false,
        })
    }

    fn extract_text(&self, response: &Value) -> Option<String> {
        non_empty(response.get("response"))
    }
}

/// Custom endpoints taking a bare prompt
pub struct GenericAdapter;

impl ProviderAdapter for GenericAdapter {
    fn build_request(&self, model: Option<&str>, prompt: &str) -> Value {
        let mut body = json!({
            "prompt": prompt,
            "max_tokens": MAX_TOKENS,
        });
        if let Some(model) = model {
            body["model"] = Value::String(model.to_string());
        }
        body
    }

    fn extract_text(&self, response: &Value) -> Option<String> {
        let first = ["text", "answer", "result", "content"]
            .iter()
            .find_map(|field| response.get(*field).and_then(Value::as_str))?;
        non_empty(Some(&Value::String(first.to_string())))
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Natural-language prompt for a unit's log lines
pub fn build_prompt(unit: &UnitSnapshot, lines: &[String]) -> String {
    format!(
        "Analyze these Kubernetes pod logs and identify the root cause why the pod is not ready.\n\n\
         Pod: {}/{}\n\
         Phase: {}\n\n\
         Logs:\n{}\n\n\
         Provide a concise root cause analysis. Focus on the primary issue.",
        unit.namespace,
        unit.name,
        unit.phase,
        lines.join("\n")
    )
}
