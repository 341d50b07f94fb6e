//! Method verdicts and the merged diagnosis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output of the pattern matching method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternVerdict {
    #[serde(default)]
    pub matched_pattern: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PatternVerdict {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_usable(&self) -> bool {
        self.error.is_none()
    }
}

/// Output of the AI method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiVerdict {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AiVerdict {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_usable(&self) -> bool {
        self.error.is_none()
    }
}

/// Merged, user-facing diagnosis for one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub root_cause: String,
    pub confidence: u8,
    /// Composite label of the verdict(s) that produced the root cause
    #[serde(default)]
    pub method: String,
    /// Configured method names in run order
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_result: Option<PatternVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_result: Option<AiVerdict>,
    #[serde(default)]
    pub error_lines: Vec<String>,
    #[serde(with = "timestamp")]
    pub analyzed_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub cache_expires_at: Option<DateTime<Utc>>,
}

impl Diagnosis {
    /// Placeholder published when analysis aborted before any method ran
    pub fn failed(error: impl std::fmt::Display, analyzed_at: DateTime<Utc>) -> Self {
        Self {
            root_cause: format!("Analysis Failed: {}", error),
            confidence: 0,
            method: "failed".to_string(),
            methods: vec!["failed".to_string()],
            pattern_result: None,
            ai_result: None,
            error_lines: Vec::new(),
            analyzed_at,
            cached_at: None,
            cache_expires_at: None,
        }
    }

    /// True when at least one method verdict carries no error
    pub fn has_usable_verdict(&self) -> bool {
        self.pattern_result.as_ref().map_or(false, PatternVerdict::is_usable)
            || self.ai_result.as_ref().map_or(false, AiVerdict::is_usable)
    }
}

/// RFC 3339 timestamps at second precision
pub(crate) mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(t) => super::serialize(t, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SubsecRound, TimeZone};

    fn sample() -> Diagnosis {
        let analyzed = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 5).unwrap()
            + chrono::Duration::milliseconds(750);
        Diagnosis {
            root_cause: "[Pattern] DNS resolution failed | [AI] resolver misconfigured".to_string(),
            confidence: 60,
            method: "pattern+ai".to_string(),
            methods: vec!["pattern".to_string(), "ai".to_string()],
            pattern_result: Some(PatternVerdict {
                matched_pattern: "DNSError".to_string(),
                priority: 10,
                root_cause: "DNS resolution failed".to_string(),
                confidence: 65,
                error: None,
            }),
            ai_result: Some(AiVerdict {
                model: "gpt-3.5-turbo".to_string(),
                root_cause: "resolver misconfigured".to_string(),
                confidence: 55,
                error: None,
            }),
            error_lines: vec!["dial tcp: lookup db: no such host".to_string()],
            analyzed_at: analyzed,
            cached_at: Some(analyzed + chrono::Duration::milliseconds(20)),
            cache_expires_at: Some(analyzed + chrono::Duration::minutes(5)),
        }
    }

    #[test]
    fn test_json_shape_uses_exposed_field_names() {
        let value = serde_json::to_value(sample()).unwrap();

        assert_eq!(value["rootCause"], sample().root_cause);
        assert_eq!(value["patternResult"]["matchedPattern"], "DNSError");
        assert_eq!(value["aiResult"]["model"], "gpt-3.5-turbo");
        assert_eq!(value["errorLines"][0], "dial tcp: lookup db: no such host");
        assert_eq!(value["analyzedAt"], "2025-03-01T12:00:05Z");
        assert!(value["patternResult"].get("error").is_none());
        assert!(value.get("cacheExpiresAt").is_some());
    }

    #[test]
    fn test_round_trip_preserves_fields_to_the_second() {
        let original = sample();
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Diagnosis = serde_json::from_str(&json).unwrap();

        let mut expected = original.clone();
        expected.analyzed_at = expected.analyzed_at.trunc_subsecs(0);
        expected.cached_at = expected.cached_at.map(|t| t.trunc_subsecs(0));
        expected.cache_expires_at = expected.cache_expires_at.map(|t| t.trunc_subsecs(0));

        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_error_verdicts_round_trip() {
        let mut diagnosis = sample();
        diagnosis.ai_result = Some(AiVerdict::failed("AI analysis failed: status 500"));
        diagnosis.cached_at = None;
        diagnosis.cache_expires_at = None;

        let json = serde_json::to_string(&diagnosis).unwrap();
        assert!(!json.contains("cachedAt"));
        let decoded: Diagnosis = serde_json::from_str(&json).unwrap();

        assert_eq!(
            decoded.ai_result.unwrap().error.as_deref(),
            Some("AI analysis failed: status 500")
        );
        assert!(decoded.cached_at.is_none());
    }

    #[test]
    fn test_usable_verdict_detection() {
        let mut diagnosis = sample();
        assert!(diagnosis.has_usable_verdict());

        diagnosis.pattern_result = Some(PatternVerdict::failed("boom"));
        diagnosis.ai_result = Some(AiVerdict::failed("boom"));
        assert!(!diagnosis.has_usable_verdict());
    }
}
