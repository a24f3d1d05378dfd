use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::classifier::QueryClassifier;
use crate::config::AnalyzerConfig;
use crate::model::{FailurePattern, InteractionRecord, QueryCategory};

/// Scans a window of interaction records for recurring failures.
///
/// All operations are pure over their inputs: the analyzer holds only its
/// configuration and classifier table and can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct FailureAnalyzer {
    config: AnalyzerConfig,
    classifier: QueryClassifier,
}

impl FailureAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config, classifier: QueryClassifier::default() }
    }

    pub fn with_classifier(config: AnalyzerConfig, classifier: QueryClassifier) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    pub fn analyze_low_confidence(&self, records: &[InteractionRecord]) -> AnalysisReport {
        let window = self.window(records);
        let low_confidence: Vec<&InteractionRecord> = window
            .records
            .iter()
            .copied()
            .filter(|r| r.is_low_confidence(self.config.low_confidence_threshold))
            .collect();
        let negative_count = window.records.iter().filter(|r| r.has_negative_feedback()).count();

        let patterns = self.cluster(&low_confidence);
        let recommendations = self.recommend(&patterns);

        info!(
            total_records = window.records.len(),
            low_confidence = low_confidence.len(),
            patterns = patterns.len(),
            "Low-confidence analysis complete"
        );

        AnalysisReport {
            id: Uuid::new_v4(),
            generated_at: window.end.unwrap_or_else(Utc::now),
            window_start: window.start,
            window_end: window.end,
            total_records: window.records.len(),
            low_confidence_records: low_confidence.len(),
            negative_feedback_records: negative_count,
            patterns,
            recommendations,
        }
    }

    pub fn analyze_negative_feedback(&self, records: &[InteractionRecord]) -> PatternAnalysisResult {
        let window = self.window(records);
        let negative: Vec<&InteractionRecord> =
            window.records.iter().copied().filter(|r| r.has_negative_feedback()).collect();

        let patterns = self.cluster(&negative);
        let aggregate_frequency: usize = patterns.iter().map(|p| p.frequency).sum();

        let total = window.records.len();
        let estimated_impact = if total == 0 {
            0.0
        } else {
            (total - negative.len()) as f64 / total as f64 * 100.0
        };

        info!(
            negative = negative.len(),
            patterns = patterns.len(),
            aggregate_frequency,
            "Negative-feedback analysis complete"
        );

        PatternAnalysisResult {
            patterns,
            total_negative: negative.len(),
            aggregate_frequency,
            priority_level: Priority::from_frequency(aggregate_frequency),
            estimated_impact,
        }
    }

    pub fn identify_unhandled_categories(&self, records: &[InteractionRecord]) -> Vec<CategorySummary> {
        let window = self.window(records);
        let mut tallies: BTreeMap<QueryCategory, CategoryTally> = BTreeMap::new();

        for record in &window.records {
            let category = self.classifier.category_of(&record.query);
            let tally = tallies.entry(category).or_default();
            tally.total += 1;

            if record.is_failure(self.config.low_confidence_threshold) {
                tally.failing += 1;
                if tally.examples.len() < self.config.max_sample_queries
                    && !tally.examples.contains(&record.query)
                {
                    tally.examples.push(record.query.clone());
                }
            }
        }

        let mut summaries: Vec<CategorySummary> = tallies
            .into_iter()
            .filter(|(_, tally)| tally.failing > 0)
            .map(|(category, tally)| CategorySummary {
                category,
                label: category.label().to_string(),
                example_queries: tally.examples,
                frequency: tally.failing,
                success_coverage: (tally.total - tally.failing) as f64 / tally.total as f64,
            })
            .collect();

        summaries.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.category.cmp(&b.category)));

        debug!(categories = summaries.len(), "Unhandled categories identified");
        summaries
    }

    /// Records within `analysis_window_days` of the newest record
    fn window<'a>(&self, records: &'a [InteractionRecord]) -> Window<'a> {
        let Some(end) = records.iter().map(|r| r.timestamp).max() else {
            return Window { start: None, end: None, records: Vec::new() };
        };
        let start = self.config.window_start(end);

        Window {
            start: Some(start),
            end: Some(end),
            records: records.iter().filter(|r| r.timestamp >= start).collect(),
        }
    }

    fn cluster(&self, records: &[&InteractionRecord]) -> Vec<FailurePattern> {
        let mut clusters: BTreeMap<String, Vec<&InteractionRecord>> = BTreeMap::new();
        for record in records {
            let key = self.classifier.classify(&record.query).pattern_key();
            clusters.entry(key).or_default().push(*record);
        }

        let mut patterns: Vec<FailurePattern> = clusters
            .into_iter()
            .filter(|(_, members)| members.len() >= self.config.min_pattern_frequency)
            .map(|(key, members)| self.build_pattern(key, &members))
            .collect();

        // BTreeMap order makes ties fall back to the key
        patterns.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        patterns.truncate(self.config.max_patterns_returned);
        patterns
    }

    fn build_pattern(&self, pattern_key: String, members: &[&InteractionRecord]) -> FailurePattern {
        let classification = self.classifier.classify(&members[0].query);

        let mut sample_queries: Vec<String> = Vec::new();
        for record in members {
            if sample_queries.len() >= self.config.max_sample_queries {
                break;
            }
            if !sample_queries.contains(&record.query) {
                sample_queries.push(record.query.clone());
            }
        }

        let last_seen = members.iter().map(|r| r.timestamp).max().unwrap_or_else(Utc::now);
        let average_confidence =
            members.iter().map(|r| r.confidence).sum::<f64>() / members.len() as f64;

        FailurePattern {
            id: Uuid::new_v4(),
            pattern_key,
            category: classification.category,
            frequency: members.len(),
            sample_queries,
            last_seen,
            suggested_improvement: self.classifier.suggested_improvement(&classification),
            average_confidence,
        }
    }

    fn recommend(&self, patterns: &[FailurePattern]) -> Vec<ImprovementRecommendation> {
        let mut recommendations: Vec<ImprovementRecommendation> = patterns
            .iter()
            .map(|pattern| ImprovementRecommendation {
                priority: Priority::from_frequency(pattern.frequency),
                pattern_key: pattern.pattern_key.clone(),
                message: format!(
                    "{} ({} low-confidence queries, average confidence {:.2})",
                    pattern.suggested_improvement, pattern.frequency, pattern.average_confidence
                ),
            })
            .collect();

        recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
        recommendations
    }
}

struct Window<'a> {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    records: Vec<&'a InteractionRecord>,
}

#[derive(Default)]
struct CategoryTally {
    total: usize,
    failing: usize,
    examples: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn from_frequency(frequency: usize) -> Self {
        if frequency > 20 {
            Self::High
        } else if frequency > 10 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementRecommendation {
    pub priority: Priority,
    pub pattern_key: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub total_records: usize,
    pub low_confidence_records: usize,
    pub negative_feedback_records: usize,
    pub patterns: Vec<FailurePattern>,
    pub recommendations: Vec<ImprovementRecommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternAnalysisResult {
    pub patterns: Vec<FailurePattern>,
    pub total_negative: usize,
    pub aggregate_frequency: usize,
    pub priority_level: Priority,
    /// Percentage of records in the analyzed set without negative feedback
    pub estimated_impact: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: QueryCategory,
    pub label: String,
    pub example_queries: Vec<String>,
    pub frequency: usize,
    /// Share of this category's records that did not fail
    pub success_coverage: f64,
}
