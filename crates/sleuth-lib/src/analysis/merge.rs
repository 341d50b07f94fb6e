//! Combine method verdicts into a single diagnosis

use chrono::{DateTime, Utc};

use crate::diagnosis::{AiVerdict, Diagnosis, PatternVerdict};

/// Error lines kept on a diagnosis
const MAX_ERROR_LINES: usize = 20;

/// AI confidence above which the AI verdict alone is trusted
const AI_TRUSTED_ABOVE: u8 = 80;
/// AI confidence below which the pattern verdict is preferred
const AI_DISTRUSTED_BELOW: u8 = 50;

/// Merged verdict awaiting its analysis timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedVerdict {
    pub root_cause: String,
    pub confidence: u8,
    pub method: String,
    pub methods: Vec<String>,
    pub pattern_result: Option<PatternVerdict>,
    pub ai_result: Option<AiVerdict>,
    pub error_lines: Vec<String>,
}

impl MergedVerdict {
    pub fn into_diagnosis(self, analyzed_at: DateTime<Utc>) -> Diagnosis {
        Diagnosis {
            root_cause: self.root_cause,
            confidence: self.confidence,
            method: self.method,
            methods: self.methods,
            pattern_result: self.pattern_result,
            ai_result: self.ai_result,
            error_lines: self.error_lines,
            analyzed_at,
            cached_at: None,
            cache_expires_at: None,
        }
    }
}

/// Merge pattern and AI verdicts. `None` when neither method produced one.
///
/// Verdicts carrying an error never become primary. With both usable the AI
/// verdict wins above 80, the pattern verdict wins below 50 and anything in
/// between is combined.
pub fn merge(
    pattern: Option<PatternVerdict>,
    ai: Option<AiVerdict>,
    methods: &[String],
    error_lines: &[String],
) -> Option<MergedVerdict> {
    if pattern.is_none() && ai.is_none() {
        return None;
    }

    let usable_pattern = pattern.as_ref().filter(|p| p.is_usable());
    let usable_ai = ai.as_ref().filter(|a| a.is_usable());

    let (root_cause, confidence, method) = match (usable_pattern, usable_ai) {
        (Some(_), Some(a)) if a.confidence > AI_TRUSTED_ABOVE => {
            (a.root_cause.clone(), a.confidence, "ai")
        }
        (Some(p), Some(a)) if a.confidence < AI_DISTRUSTED_BELOW => {
            (p.root_cause.clone(), p.confidence, "pattern")
        }
        (Some(p), Some(a)) => {
            let mean = (u16::from(p.confidence) + u16::from(a.confidence)) / 2;
            (
                format!("[Pattern] {} | [AI] {}", p.root_cause, a.root_cause),
                mean as u8,
                "pattern+ai",
            )
        }
        (Some(p), None) => (p.root_cause.clone(), p.confidence, "pattern"),
        (None, Some(a)) => (a.root_cause.clone(), a.confidence, "ai"),
        (None, None) => {
            let errors: Vec<&str> = pattern
                .iter()
                .filter_map(|p| p.error.as_deref())
                .chain(ai.iter().filter_map(|a| a.error.as_deref()))
                .collect();
            (format!("Analysis failed: {}", errors.join("; ")), 0, "failed")
        }
    };

    Some(MergedVerdict {
        root_cause,
        confidence,
        method: method.to_string(),
        methods: methods.to_vec(),
        pattern_result: pattern,
        ai_result: ai,
        error_lines: dedup_error_lines(error_lines),
    })
}

/// First-seen order, at most 20
fn dedup_error_lines(lines: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    lines
        .iter()
        .filter(|line| seen.insert(line.as_str()))
        .take(MAX_ERROR_LINES)
        .cloned()
        .collect()
}
