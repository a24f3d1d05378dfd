//! Shared data model for the improvement pipeline

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::error::{Result, TunerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserFeedback {
    Helpful,
    NotHelpful,
    Incorrect,
}

impl UserFeedback {
    pub fn is_negative(self) -> bool {
        matches!(self, Self::NotHelpful | Self::Incorrect)
    }
}

/// One logged query/response exchange. Produced by the query-answering
/// system and never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    pub query: String,
    pub confidence: f64,
    #[serde(default)]
    pub user_feedback: Option<UserFeedback>,
    #[serde(default)]
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(
        id: impl Into<String>,
        query: impl Into<String>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            confidence,
            user_feedback: None,
            response_time_ms: 0,
            timestamp,
        }
    }

    pub fn with_feedback(mut self, feedback: UserFeedback) -> Self {
        self.user_feedback = Some(feedback);
        self
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.confidence < threshold
    }

    pub fn has_negative_feedback(&self) -> bool {
        self.user_feedback.is_some_and(UserFeedback::is_negative)
    }

    /// Low confidence or negative feedback
    pub fn is_failure(&self, threshold: f64) -> bool {
        self.is_low_confidence(threshold) || self.has_negative_feedback()
    }
}

/// Wire shape of a record as delivered by the log source. Every field is
/// optional so that missing fields can be reported instead of failing the
/// whole batch at deserialization time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawInteractionRecord {
    pub id: Option<String>,
    pub query: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default, alias = "userFeedback")]
    pub user_feedback: Option<UserFeedback>,
    #[serde(default, alias = "responseTimeMs", alias = "responseTime")]
    pub response_time_ms: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<RawInteractionRecord> for InteractionRecord {
    type Error = TunerError;

    fn try_from(raw: RawInteractionRecord) -> Result<Self> {
        let id = raw.id.filter(|id| !id.trim().is_empty()).ok_or_else(|| {
            TunerError::invalid_record("id", "is missing or empty")
        })?;
        let query = raw.query.ok_or_else(|| TunerError::invalid_record("query", "is missing"))?;
        let confidence = raw
            .confidence
            .ok_or_else(|| TunerError::invalid_record("confidence", "is missing"))?;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(TunerError::invalid_record(
                "confidence",
                format!("must be within 0..=1, got {}", confidence),
            ));
        }
        let timestamp =
            raw.timestamp.ok_or_else(|| TunerError::invalid_record("timestamp", "is missing"))?;

        Ok(Self {
            id,
            query,
            confidence,
            user_feedback: raw.user_feedback,
            response_time_ms: raw.response_time_ms.unwrap_or(0),
            timestamp,
        })
    }
}

/// Topic of a query, derived from the classifier table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    Cpu,
    Memory,
    Network,
    Storage,
    Log,
    Incident,
    Server,
    General,
}

impl QueryCategory {
    pub const ALL: [QueryCategory; 8] = [
        Self::Cpu,
        Self::Memory,
        Self::Network,
        Self::Storage,
        Self::Log,
        Self::Incident,
        Self::Server,
        Self::General,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU monitoring",
            Self::Memory => "Memory management",
            Self::Network => "Network monitoring",
            Self::Storage => "Storage management",
            Self::Log => "Log analysis",
            Self::Incident => "Incident response",
            Self::Server => "Server management",
            Self::General => "General query",
        }
    }
}

impl std::fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePattern {
    pub id: Uuid,
    pub pattern_key: String,
    pub category: QueryCategory,
    pub frequency: usize,
    pub sample_queries: Vec<String>,
    pub last_seen: DateTime<Utc>,
    pub suggested_improvement: String,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionGroup {
    pub id: Uuid,
    pub group_key: String,
    pub member_queries: Vec<String>,
    pub frequency: usize,
    pub common_keywords: Vec<String>,
    pub category: QueryCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Keyword,
    Structural,
    Semantic,
    Manual,
}

/// A proposed or incumbent matching rule. The expression is compiled on
/// construction; `confidence` is a heuristic estimate only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulePattern {
    pub id: Uuid,
    pub kind: RuleKind,
    pub expression: String,
    pub description: String,
    pub category: QueryCategory,
    pub confidence: f64,
    pub test_queries: Vec<String>,
    pub expected_matches: usize,
}

impl RulePattern {
    pub fn new(
        kind: RuleKind,
        expression: impl Into<String>,
        description: impl Into<String>,
        category: QueryCategory,
        confidence: f64,
    ) -> Result<Self> {
        let expression = expression.into();
        Regex::new(&expression).map_err(|e| TunerError::invalid_pattern(&expression, &e))?;

        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            expression,
            description: description.into(),
            category,
            confidence: confidence.clamp(0.0, 1.0),
            test_queries: Vec::new(),
            expected_matches: 0,
        })
    }

    /// An incumbent rule supplied by the host, e.g. the production control
    pub fn manual(
        expression: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
    ) -> Result<Self> {
        Self::new(RuleKind::Manual, expression, description, QueryCategory::General, confidence)
    }

    pub fn with_samples(mut self, test_queries: Vec<String>, expected_matches: usize) -> Self {
        self.test_queries = test_queries;
        self.expected_matches = expected_matches;
        self
    }

    pub fn compile(&self) -> Result<Regex> {
        Regex::new(&self.expression).map_err(|e| TunerError::invalid_pattern(&self.expression, &e))
    }

    pub fn matches(&self, query: &str) -> Result<bool> {
        Ok(self.compile()?.is_match(query))
    }
}

/// Response skeleton with named `{{placeholders}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseTemplate {
    pub id: Uuid,
    pub category: String,
    pub template_body: String,
    pub placeholders: BTreeSet<String>,
    pub source_examples: Vec<String>,
    pub applicable_patterns: Vec<String>,
}

impl ResponseTemplate {
    /// Every placeholder referenced by the body is declared and vice versa
    pub fn validate(&self) -> Result<()> {
        let referenced = regex_utils::template::placeholders(&self.template_body);
        if referenced == self.placeholders {
            return Ok(());
        }

        let undeclared: Vec<_> = referenced.difference(&self.placeholders).cloned().collect();
        let unused: Vec<_> = self.placeholders.difference(&referenced).cloned().collect();
        Err(TunerError::InvalidTemplate {
            category: self.category.clone(),
            message: format!("undeclared placeholders {:?}, unused placeholders {:?}", undeclared, unused),
        })
    }

    /// Fill placeholders. `{{#if name}}` blocks keep their first branch when
    /// the value is present, non-empty and not "false"/"0". Conditionals do
    /// not nest.
    pub fn render(&self, values: &HashMap<String, String>) -> String {
        let truthy = |name: &str| {
            values
                .get(name)
                .is_some_and(|v| !v.is_empty() && v != "false" && v != "0")
        };

        let resolved = regex_utils::template::CONDITIONAL.replace_all(&self.template_body, |caps: &regex::Captures| {
            if truthy(&caps[1]) {
                caps.get(2).map_or(String::new(), |m| m.as_str().to_string())
            } else {
                caps.get(3).map_or(String::new(), |m| m.as_str().to_string())
            }
        });

        regex_utils::template::PLACEHOLDER
            .replace_all(&resolved, |caps: &regex::Captures| {
                values.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSuggestion {
    pub id: Uuid,
    pub group_key: String,
    pub candidate_rule: RulePattern,
    pub derived_from_record_ids: Vec<String>,
    pub confidence_score: f64,
    pub estimated_improvement_percent: f64,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
}

impl PatternSuggestion {
    /// Returns false when the suggestion was already decided
    pub fn approve(&mut self) -> bool {
        self.transition(SuggestionStatus::Approved)
    }

    pub fn reject(&mut self) -> bool {
        self.transition(SuggestionStatus::Rejected)
    }

    fn transition(&mut self, to: SuggestionStatus) -> bool {
        if self.status != SuggestionStatus::Pending {
            return false;
        }
        self.status = to;
        true
    }
}

/// Aggregated measurements of one rule. `is_simulated` marks estimates that
/// were derived from a heuristic rather than measured on traffic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetrics {
    pub total_queries: u64,
    pub successful_matches: u64,
    pub average_confidence: f64,
    pub user_satisfaction_rate: f64,
    pub average_response_time_ms: f64,
    pub error_rate: f64,
    pub conversion_rate: f64,
    pub is_simulated: bool,
    pub feedback_count: u64,
    pub helpful_count: u64,
    pub error_count: u64,
    pub excluded_records: u64,
}

impl ExperimentMetrics {
    /// Attempts include records excluded by evaluation errors
    pub fn attempts(&self) -> u64 {
        self.total_queries + self.excluded_records
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExperimentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum TrafficGroup {
    /// A share of live traffic routed to the candidate
    Sampled { percent: u8 },
    /// Historical records replayed against the candidate
    HistoricalReplay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub candidate_rule_id: Uuid,
    pub candidate_expression: String,
    pub traffic_group: TrafficGroup,
    pub status: ExperimentStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub metrics: ExperimentMetrics,
    pub sample_size: u64,
    pub confidence_level: f64,
    pub is_statistically_significant: bool,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Adopt,
    Reject,
    ContinueTesting,
}

/// Percentage deltas of candidate versus control. Response time and error
/// rate are sign-flipped so that a positive number is always an improvement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub confidence: f64,
    pub satisfaction: f64,
    pub response_time: f64,
    pub error_rate: f64,
    pub conversion: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub id: Uuid,
    pub control_rule: RulePattern,
    pub candidate_rule: RulePattern,
    pub control_metrics: ExperimentMetrics,
    pub candidate_metrics: ExperimentMetrics,
    pub improvement: Improvement,
    pub recommendation: Recommendation,
    pub reasoning: Vec<String>,
    pub sample_size: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawInteractionRecord {
        RawInteractionRecord {
            id: Some("r1".to_string()),
            query: Some("cpu 확인".to_string()),
            confidence: Some(0.4),
            user_feedback: None,
            response_time_ms: Some(120),
            timestamp: Some(Utc::now()),
        }
    }

    #[test]
    fn test_record_validation() {
        let record = InteractionRecord::try_from(raw()).unwrap();
        assert_eq!(record.id, "r1");
        assert_eq!(record.response_time_ms, 120);

        let err = InteractionRecord::try_from(RawInteractionRecord { query: None, ..raw() })
            .unwrap_err();
        assert!(matches!(err, TunerError::InvalidRecord { ref field, .. } if field == "query"));

        let err = InteractionRecord::try_from(RawInteractionRecord { confidence: Some(1.5), ..raw() })
            .unwrap_err();
        assert!(matches!(err, TunerError::InvalidRecord { ref field, .. } if field == "confidence"));

        let err = InteractionRecord::try_from(RawInteractionRecord { timestamp: None, ..raw() })
            .unwrap_err();
        assert!(matches!(err, TunerError::InvalidRecord { ref field, .. } if field == "timestamp"));
    }

    #[test]
    fn test_raw_record_accepts_camel_case_fields() {
        let json = r#"{"id":"a","query":"q","confidence":0.9,"userFeedback":"not_helpful",
                       "responseTimeMs":15,"timestamp":"2025-01-01T00:00:00Z"}"#;
        let raw: RawInteractionRecord = serde_json::from_str(json).unwrap();
        let record = InteractionRecord::try_from(raw).unwrap();
        assert_eq!(record.user_feedback, Some(UserFeedback::NotHelpful));
        assert!(record.has_negative_feedback());
        assert!(record.is_failure(0.6));
    }

    #[test]
    fn test_rule_pattern_rejects_invalid_regex() {
        let err = RulePattern::manual("(cpu|memory", "broken", 0.5).unwrap_err();
        assert!(matches!(err, TunerError::InvalidPattern { .. }));

        let rule = RulePattern::manual("(?i)cpu", "cpu", 0.5).unwrap();
        assert!(rule.matches("CPU usage").unwrap());
        assert!(!rule.matches("memory").unwrap());
    }

    #[test]
    fn test_template_validation_and_render() {
        let body = "{{#if alert}}ALERT {{detail}}{{else}}ok{{/if}} cpu={{cpu}}".to_string();
        let mut template = ResponseTemplate {
            id: Uuid::new_v4(),
            category: "test".to_string(),
            template_body: body,
            placeholders: ["alert", "detail", "cpu"].iter().map(|s| s.to_string()).collect(),
            source_examples: vec![],
            applicable_patterns: vec![],
        };
        assert!(template.validate().is_ok());

        let mut values = HashMap::new();
        values.insert("cpu".to_string(), "93".to_string());
        assert_eq!(template.render(&values), "ok cpu=93");

        values.insert("alert".to_string(), "true".to_string());
        values.insert("detail".to_string(), "hot".to_string());
        assert_eq!(template.render(&values), "ALERT hot cpu=93");

        template.placeholders.remove("detail");
        template.placeholders.insert("unused".to_string());
        assert!(matches!(template.validate(), Err(TunerError::InvalidTemplate { .. })));
    }

    #[test]
    fn test_suggestion_transitions_only_from_pending() {
        let rule = RulePattern::manual("cpu", "cpu", 0.8).unwrap();
        let mut suggestion = PatternSuggestion {
            id: Uuid::new_v4(),
            group_key: "cpu".to_string(),
            candidate_rule: rule,
            derived_from_record_ids: vec![],
            confidence_score: 0.8,
            estimated_improvement_percent: 50.0,
            status: SuggestionStatus::Pending,
            created_at: Utc::now(),
        };

        assert!(suggestion.approve());
        assert!(!suggestion.reject());
        assert_eq!(suggestion.status, SuggestionStatus::Approved);
    }
}
