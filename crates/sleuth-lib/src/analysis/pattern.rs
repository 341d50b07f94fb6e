//! Deterministic pattern matching over log lines
//!
//! Rules are tried in priority order (highest first, ties in declaration
//! order). Each line matches at most one rule; the first rule that matches
//! any line decides the root cause.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::config::PatternSpec;
use crate::diagnosis::PatternVerdict;

/// Lines returned as evidence when no rule matched
const UNMATCHED_EVIDENCE_LINES: usize = 10;

const UNKNOWN_ROOT_CAUSE: &str = "Unknown error detected in logs";

/// Built-in signatures for network and dependency failures
const DEFAULT_PATTERNS: &[(&str, &str, &str, i32)] = &[
    (
        "ConnectionRefused",
        r"(?i)(connection refused|connection reset|connection closed)",
        "Connection refused - service may be down or unreachable",
        10,
    ),
    (
        "ConnectionTimeout",
        r"(?i)(connection timeout|timeout|timed out)",
        "Connection timeout - service may be slow or unreachable",
        10,
    ),
    (
        "DialTCP",
        r"(?i)(dial tcp|failed to connect)",
        "Network connection failed - unable to reach service",
        10,
    ),
    (
        "ServiceUnavailable",
        r"(?i)(service unavailable|503|503 service unavailable)",
        "Service unavailable - backend service is down or overloaded",
        10,
    ),
    (
        "DNSError",
        r"(?i)(no such host|name resolution failed|dns error|unknown host)",
        "DNS resolution failed - service name cannot be resolved",
        10,
    ),
    (
        "KafkaBrokerError",
        r"(?i)(broker not available|leader not available|connection to node)",
        "Kafka service is down or unreachable",
        15,
    ),
    (
        "KafkaConnectionError",
        r"(?i)(kafka.*connection|kafka.*timeout|kafka.*error)",
        "Kafka connection error - broker may be down",
        12,
    ),
    (
        "DatabaseConnectionError",
        r"(?i)(connection pool exhausted|too many connections|database.*connection.*failed)",
        "Database connection failed - connection pool may be exhausted",
        10,
    ),
    (
        "HTTP502",
        r"(?i)(502 bad gateway|bad gateway)",
        "502 Bad Gateway - upstream service is unavailable",
        10,
    ),
    (
        "HTTP503",
        r"(?i)(503 service unavailable)",
        "503 Service Unavailable - service is temporarily unavailable",
        10,
    ),
];

static DEFAULT_RULES: OnceLock<Vec<PatternRule>> = OnceLock::new();

/// Compiled pattern rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    pub matcher: Regex,
    pub root_cause: String,
    pub priority: i32,
}

impl PatternRule {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        root_cause: impl Into<String>,
        priority: i32,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            matcher: Regex::new(pattern)?,
            root_cause: root_cause.into(),
            priority,
        })
    }
}

/// The built-in rule set, in declaration order
pub fn default_rules() -> &'static [PatternRule] {
    DEFAULT_RULES.get_or_init(|| {
        DEFAULT_PATTERNS
            .iter()
            .map(|(name, pattern, root_cause, priority)| {
                PatternRule::new(*name, pattern, *root_cause, *priority)
                    .expect("built-in pattern must compile")
            })
            .collect()
    })
}

/// Compile caller-supplied rules, skipping invalid ones.
///
/// Falls back to the built-in set when `specs` is empty or nothing compiles.
pub fn compile_rules(specs: &[PatternSpec]) -> Vec<PatternRule> {
    if specs.is_empty() {
        debug!("Using default patterns");
        return default_rules().to_vec();
    }

    let rules: Vec<PatternRule> = specs
        .iter()
        .filter_map(|spec| {
            match PatternRule::new(&spec.name, &spec.pattern, &spec.root_cause, spec.priority) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(
                        pattern_name = %spec.name,
                        pattern = %spec.pattern,
                        error = %e,
                        "Skipping invalid pattern"
                    );
                    None
                }
            }
        })
        .collect();

    if rules.is_empty() {
        info!("No valid custom patterns, falling back to defaults");
        return default_rules().to_vec();
    }

    rules
}

/// Verdict plus the lines supporting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternAnalysis {
    pub verdict: PatternVerdict,
    pub evidence: Vec<String>,
}

/// Matches an ordered rule set against log lines
#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    rules: Vec<PatternRule>,
}

impl PatternAnalyzer {
    /// Create an analyzer; rules are ordered by priority, ties keep their order
    pub fn new(mut rules: Vec<PatternRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    pub fn from_specs(specs: &[PatternSpec]) -> Self {
        Self::new(compile_rules(specs))
    }

    pub fn with_defaults() -> Self {
        Self::new(default_rules().to_vec())
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Analyze log lines. Returns `None` when there are no lines.
    pub fn analyze(&self, lines: &[String]) -> Option<PatternAnalysis> {
        if lines.is_empty() {
            return None;
        }

        let mut matched_lines = Vec::new();
        let mut best_match: Option<&PatternRule> = None;

        for line in lines {
            if let Some(rule) = self.rules.iter().find(|r| r.matcher.is_match(line)) {
                matched_lines.push(line.clone());
                if best_match.is_none() {
                    debug!(pattern_name = %rule.name, line = %line, "Pattern matched");
                    best_match = Some(rule);
                }
            }
        }

        let Some(rule) = best_match else {
            debug!(lines = lines.len(), patterns = self.rules.len(), "No patterns matched");
            return Some(PatternAnalysis {
                verdict: PatternVerdict {
                    matched_pattern: String::new(),
                    priority: 0,
                    root_cause: UNKNOWN_ROOT_CAUSE.to_string(),
                    confidence: 30,
                    error: None,
                },
                evidence: lines.iter().take(UNMATCHED_EVIDENCE_LINES).cloned().collect(),
            });
        };

        let root_cause = if rule.root_cause.is_empty() {
            matched_lines[0].clone()
        } else {
            rule.root_cause.clone()
        };

        let confidence = match matched_lines.len() {
            n if n >= 3 => 80,
            2 => 65,
            _ => 50,
        };

        info!(
            pattern_name = %rule.name,
            matched_lines = matched_lines.len(),
            confidence = confidence,
            "Pattern matching complete"
        );

        Some(PatternAnalysis {
            verdict: PatternVerdict {
                matched_pattern: rule.name.clone(),
                priority: rule.priority,
                root_cause,
                confidence,
                error: None,
            },
            evidence: matched_lines,
        })
    }
}
