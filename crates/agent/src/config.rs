//! Agent configuration
//!
//! Loaded from an optional file (`SLEUTH_CONFIG`, default
//! `/etc/pod-sleuth/config.yaml`) overlaid with `SLEUTH_*` environment
//! variables. Nested keys use `__`, e.g. `SLEUTH_ANALYSIS__METHODS=pattern,ai`.

use anyhow::{Context, Result};
use serde::Deserialize;
use sleuth_lib::analysis::AnalysisConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/pod-sleuth/config.yaml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Identifies this agent in logs; the pod name when run in-cluster
    #[serde(default = "default_instance")]
    pub instance: String,

    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between pod scans
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Restrict scans to one namespace; all namespaces when unset
    #[serde(default)]
    pub namespace: Option<String>,

    /// Label selector applied when listing pods
    #[serde(default)]
    pub label_selector: Option<String>,

    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "pod-sleuth".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_scan_interval() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            api_port: default_api_port(),
            scan_interval_secs: default_scan_interval(),
            namespace: None,
            label_selector: None,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("SLEUTH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load from `path` (skipped when missing) overlaid with the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("SLEUTH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("analysis.methods"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::load_from(&dir.path().join("absent.yaml")).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.scan_interval(), Duration::from_secs(300));
        assert!(!config.analysis.enabled);
        assert_eq!(config.analysis.lines_to_analyze, 100);
    }

    #[test]
    fn test_yaml_file_is_loaded() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
instance: sleuth-east
api_port: 9100
scan_interval_secs: 60
label_selector: "app=checkout"
analysis:
  enabled: true
  methods: [pattern, ai]
  cache_ttl_secs: 120
  patterns:
    - name: Oom
      pattern: "(?i)out of memory"
      root_cause: "Process ran out of memory"
      priority: 20
  ai:
    endpoint: "http://ollama:11434/api/generate"
    api_key:
      name: ai-credentials
"#
        )
        .unwrap();

        let config = AgentConfig::load_from(file.path()).unwrap();

        assert_eq!(config.instance, "sleuth-east");
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.label_selector.as_deref(), Some("app=checkout"));
        assert!(config.analysis.enabled);
        assert_eq!(config.analysis.methods, vec!["pattern", "ai"]);
        assert_eq!(config.analysis.cache_ttl_secs, 120);
        assert!(config.analysis.filter_errors_only);
        assert_eq!(config.analysis.patterns[0].priority, 20);
        assert_eq!(
            config.analysis.ai.api_key.as_ref().unwrap().name,
            "ai-credentials"
        );
        assert_eq!(config.analysis.ai.timeout_secs, 30);
    }
}
