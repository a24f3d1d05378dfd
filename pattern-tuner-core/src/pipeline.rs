//! End-to-end improvement run: fetch, analyze, group, suggest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::analysis::{AnalysisReport, CategorySummary, FailureAnalyzer, PatternAnalysisResult};
use crate::config::TunerConfig;
use crate::error::Result;
use crate::experiment::ExperimentManager;
use crate::model::{InteractionRecord, PatternSuggestion, QuestionGroup};
use crate::source::InteractionSource;
use crate::suggestion::PatternSuggester;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub analysis: AnalysisReport,
    pub negative_feedback: PatternAnalysisResult,
    pub unhandled_categories: Vec<CategorySummary>,
    pub groups: Vec<QuestionGroup>,
    pub suggestions: Vec<PatternSuggestion>,
}

/// Owns one instance of each stage. The experiment registry is shared
/// through an `Arc` so the host can keep using it after a run.
pub struct ImprovementPipeline {
    config: TunerConfig,
    analyzer: FailureAnalyzer,
    suggester: PatternSuggester,
    experiments: Arc<ExperimentManager>,
}

impl Default for ImprovementPipeline {
    fn default() -> Self {
        Self::new(TunerConfig::default())
    }
}

impl ImprovementPipeline {
    pub fn new(config: TunerConfig) -> Self {
        let experiments = Arc::new(ExperimentManager::new(config.experiment.clone()));
        Self::with_experiments(config, experiments)
    }

    pub fn with_experiments(config: TunerConfig, experiments: Arc<ExperimentManager>) -> Self {
        Self {
            analyzer: FailureAnalyzer::new(config.analyzer.clone()),
            suggester: PatternSuggester::new(config.suggester.clone()),
            experiments,
            config,
        }
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &FailureAnalyzer {
        &self.analyzer
    }

    pub fn suggester(&self) -> &PatternSuggester {
        &self.suggester
    }

    pub fn experiments(&self) -> Arc<ExperimentManager> {
        Arc::clone(&self.experiments)
    }

    pub async fn run(&self, source: &dyn InteractionSource, now: DateTime<Utc>) -> Result<PipelineReport> {
        let since = self.config.analyzer.window_start(now);
        let records = source.fetch_interactions(since).await?;
        info!(records = records.len(), since = %since, "Interactions fetched");

        Ok(self.process(&records))
    }

    /// Run every stage over already materialized records
    pub fn process(&self, records: &[InteractionRecord]) -> PipelineReport {
        let analysis = self.analyzer.analyze_low_confidence(records);
        let negative_feedback = self.analyzer.analyze_negative_feedback(records);
        let unhandled_categories = self.analyzer.identify_unhandled_categories(records);

        let threshold = self.config.suggester.low_confidence_threshold;
        let failing_queries: Vec<String> = records
            .iter()
            .filter(|r| r.is_failure(threshold))
            .map(|r| r.query.clone())
            .collect();
        let groups = self.suggester.group_similar_queries(&failing_queries);
        let suggestions = self.suggester.build_suggestions(records, &groups);

        info!(
            patterns = analysis.patterns.len(),
            groups = groups.len(),
            suggestions = suggestions.len(),
            "Improvement run complete"
        );

        PipelineReport { analysis, negative_feedback, unhandled_categories, groups, suggestions }
    }
}
