//! Collaborators at the edge of the pipeline: where interaction records come
//! from and where adopted rules go

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, TunerError};
use crate::model::{
    Comparison, InteractionRecord, RawInteractionRecord, Recommendation, ResponseTemplate,
    RulePattern,
};

/// Read side of the interaction log
#[async_trait]
pub trait InteractionSource: Send + Sync {
    /// Records with a timestamp at or after `since`
    async fn fetch_interactions(&self, since: DateTime<Utc>) -> Result<Vec<InteractionRecord>>;
}

/// Write side of the production rule engine
#[async_trait]
pub trait RuleSink: Send + Sync {
    async fn publish_rule(&self, rule: &RulePattern, template: &ResponseTemplate) -> Result<()>;
}

/// Host-provided records held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLogStore {
    records: Vec<InteractionRecord>,
}

impl InMemoryLogStore {
    pub fn new(records: Vec<InteractionRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl InteractionSource for InMemoryLogStore {
    async fn fetch_interactions(&self, since: DateTime<Utc>) -> Result<Vec<InteractionRecord>> {
        Ok(self.records.iter().filter(|r| r.timestamp >= since).cloned().collect())
    }
}

/// Interaction log stored as a JSON array or as JSON lines
#[derive(Debug, Clone)]
pub struct JsonLogFile {
    path: PathBuf,
}

impl JsonLogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the file. A record with a missing or invalid field
    /// fails the whole read.
    pub async fn read_all(&self) -> Result<Vec<InteractionRecord>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let raw = parse_raw_records(&content)?;

        let records = raw
            .into_iter()
            .map(InteractionRecord::try_from)
            .collect::<Result<Vec<_>>>()?;

        debug!(path = %self.path.display(), records = records.len(), "Interaction log loaded");
        Ok(records)
    }
}

#[async_trait]
impl InteractionSource for JsonLogFile {
    async fn fetch_interactions(&self, since: DateTime<Utc>) -> Result<Vec<InteractionRecord>> {
        let mut records = self.read_all().await?;
        records.retain(|r| r.timestamp >= since);
        Ok(records)
    }
}

fn parse_raw_records(content: &str) -> Result<Vec<RawInteractionRecord>> {
    if content.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(content)?);
    }

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(TunerError::from))
        .collect()
}

/// Collects published rules in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuleSink {
    published: Arc<RwLock<Vec<(RulePattern, ResponseTemplate)>>>,
}

impl InMemoryRuleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<(RulePattern, ResponseTemplate)> {
        self.published.read().await.clone()
    }
}

#[async_trait]
impl RuleSink for InMemoryRuleSink {
    async fn publish_rule(&self, rule: &RulePattern, template: &ResponseTemplate) -> Result<()> {
        let mut published = self.published.write().await;
        if published.iter().any(|(existing, _)| existing.id == rule.id) {
            return Err(TunerError::Sink(format!("rule {} is already published", rule.id)));
        }
        published.push((rule.clone(), template.clone()));
        Ok(())
    }
}

/// Publish the candidate of an adopted comparison. Anything other than an
/// adopt verdict is refused, and the rule and template are re-checked first
/// so that a corrupted candidate never reaches the sink.
pub async fn publish_adopted(
    comparison: &Comparison,
    template: &ResponseTemplate,
    sink: &dyn RuleSink,
) -> Result<()> {
    if comparison.recommendation != Recommendation::Adopt {
        return Err(TunerError::NotAdopted(comparison.recommendation));
    }

    comparison.candidate_rule.compile()?;
    template.validate()?;
    sink.publish_rule(&comparison.candidate_rule, template).await?;

    info!(
        comparison = %comparison.id,
        rule = %comparison.candidate_rule.id,
        template = %template.id,
        "Adopted rule published"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperimentConfig;
    use crate::experiment::compare;
    use crate::model::{QueryCategory, QuestionGroup, UserFeedback};
    use crate::suggestion::suggest_response_templates;
    use chrono::Duration;
    use std::io::Write;
    use uuid::Uuid;

    fn template() -> ResponseTemplate {
        let group = QuestionGroup {
            id: Uuid::new_v4(),
            group_key: "cpu".to_string(),
            member_queries: vec!["cpu 확인".to_string()],
            frequency: 1,
            common_keywords: vec!["cpu".to_string()],
            category: QueryCategory::Cpu,
        };
        suggest_response_templates(&group, None).unwrap().remove(0)
    }

    fn comparison(candidate_confidence: f64) -> Comparison {
        let control = RulePattern::manual("cpu", "control", 0.5).unwrap();
        let candidate = RulePattern::manual("(?i)cpu", "candidate", candidate_confidence).unwrap();
        let records: Vec<_> = (0..10)
            .map(|i| {
                InteractionRecord::new(format!("r{}", i), if i < 5 { "cpu" } else { "disk" }, 0.5, Utc::now())
                    .with_feedback(if i % 2 == 0 { UserFeedback::Helpful } else { UserFeedback::NotHelpful })
            })
            .collect();
        compare(&control, &candidate, &records, &ExperimentConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_store_filters_by_time() {
        let now = Utc::now();
        let store = InMemoryLogStore::new(vec![
            InteractionRecord::new("old", "cpu", 0.5, now - Duration::days(40)),
            InteractionRecord::new("new", "cpu", 0.5, now),
        ]);

        let records = store.fetch_interactions(now - Duration::days(30)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "new");
    }

    #[tokio::test]
    async fn test_json_lines_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"a","query":"cpu 확인","confidence":0.4,"timestamp":"2025-03-01T00:00:00Z"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"id":"b","query":"disk","confidence":0.9,"userFeedback":"helpful","timestamp":"2025-03-02T00:00:00Z"}}"#
        )
        .unwrap();

        let log = JsonLogFile::new(file.path());
        let records = log.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].user_feedback, Some(UserFeedback::Helpful));
    }

    #[tokio::test]
    async fn test_json_array_with_invalid_record_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"a","query":"cpu","confidence":0.4,"timestamp":"2025-03-01T00:00:00Z"}},
               {{"id":"b","confidence":0.4,"timestamp":"2025-03-01T00:00:00Z"}}]"#
        )
        .unwrap();

        let err = JsonLogFile::new(file.path()).read_all().await.unwrap_err();
        assert!(matches!(err, TunerError::InvalidRecord { ref field, .. } if field == "query"));
    }

    #[tokio::test]
    async fn test_publish_requires_adoption() {
        let sink = InMemoryRuleSink::new();

        let rejected = comparison(0.1);
        assert_ne!(rejected.recommendation, Recommendation::Adopt);
        let err = publish_adopted(&rejected, &template(), &sink).await.unwrap_err();
        assert!(matches!(err, TunerError::NotAdopted(_)));
        assert!(sink.published().await.is_empty());

        let adopted = comparison(0.8);
        assert_eq!(adopted.recommendation, Recommendation::Adopt);
        publish_adopted(&adopted, &template(), &sink).await.unwrap();
        assert_eq!(sink.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sink_rejects_duplicate_rule() {
        let sink = InMemoryRuleSink::new();
        let adopted = comparison(0.8);

        publish_adopted(&adopted, &template(), &sink).await.unwrap();
        let err = publish_adopted(&adopted, &template(), &sink).await.unwrap_err();
        assert!(matches!(err, TunerError::Sink(_)));
        assert_eq!(sink.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_rechecks_template() {
        let sink = InMemoryRuleSink::new();
        let mut broken = template();
        broken.placeholders.insert("missing".to_string());

        let err = publish_adopted(&comparison(0.8), &broken, &sink).await.unwrap_err();
        assert!(matches!(err, TunerError::InvalidTemplate { .. }));
        assert!(sink.published().await.is_empty());
    }
}
