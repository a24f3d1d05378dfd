use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::QueryClassifier;
use crate::config::SuggesterConfig;
use crate::error::Result;
use crate::model::{
    InteractionRecord, PatternSuggestion, QuestionGroup, ResponseTemplate, RulePattern,
    SuggestionStatus,
};
use crate::suggestion::grouping::group_similar_queries;
use crate::suggestion::rules::generate_candidate_rules;
use crate::suggestion::templates::{ContextData, suggest_response_templates};

/// Turns clusters of similar queries into candidate rules, templates and
/// ranked suggestions. Holds configuration only, so it can be shared
/// freely across threads.
#[derive(Debug, Clone, Default)]
pub struct PatternSuggester {
    config: SuggesterConfig,
    classifier: QueryClassifier,
}

impl PatternSuggester {
    pub fn new(config: SuggesterConfig) -> Self {
        Self { config, classifier: QueryClassifier::default() }
    }

    pub fn with_classifier(config: SuggesterConfig, classifier: QueryClassifier) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &SuggesterConfig {
        &self.config
    }

    pub fn group_similar_queries(&self, queries: &[String]) -> Vec<QuestionGroup> {
        group_similar_queries(queries, &self.config, &self.classifier)
    }

    pub fn generate_candidate_rules(&self, group: &QuestionGroup) -> Result<Vec<RulePattern>> {
        generate_candidate_rules(group, &self.config)
    }

    pub fn suggest_response_templates(
        &self,
        group: &QuestionGroup,
        context: Option<&ContextData>,
    ) -> Result<Vec<ResponseTemplate>> {
        suggest_response_templates(group, context)
    }

    /// One suggestion per surviving candidate rule, ranked by the share of
    /// failing records in the originating group. A group whose rules cannot
    /// be generated is logged and skipped.
    pub fn build_suggestions(
        &self,
        records: &[InteractionRecord],
        groups: &[QuestionGroup],
    ) -> Vec<PatternSuggestion> {
        let per_group: Vec<Vec<PatternSuggestion>> =
            groups.par_iter().map(|group| self.suggestions_for_group(records, group)).collect();

        let mut suggestions: Vec<PatternSuggestion> = per_group.into_iter().flatten().collect();
        suggestions.sort_by(|a, b| {
            b.estimated_improvement_percent.total_cmp(&a.estimated_improvement_percent)
        });
        suggestions.truncate(self.config.max_suggestions);

        info!(groups = groups.len(), suggestions = suggestions.len(), "Suggestions built");
        suggestions
    }

    fn suggestions_for_group(
        &self,
        records: &[InteractionRecord],
        group: &QuestionGroup,
    ) -> Vec<PatternSuggestion> {
        let members: Vec<&InteractionRecord> =
            records.iter().filter(|r| group.member_queries.contains(&r.query)).collect();
        if members.is_empty() {
            return Vec::new();
        }

        let rules = match self.generate_candidate_rules(group) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(group = %group.group_key, error = %e, "Skipping group");
                return Vec::new();
            }
        };

        let failing = members
            .iter()
            .filter(|r| r.is_failure(self.config.low_confidence_threshold))
            .count();
        let estimate = (failing as f64 / members.len() as f64 * 100.0).round();
        let record_ids: Vec<String> = members.iter().map(|r| r.id.clone()).collect();

        rules
            .into_iter()
            .map(|rule| PatternSuggestion {
                id: Uuid::new_v4(),
                group_key: group.group_key.clone(),
                confidence_score: rule.confidence,
                candidate_rule: rule,
                derived_from_record_ids: record_ids.clone(),
                estimated_improvement_percent: estimate,
                status: SuggestionStatus::Pending,
                created_at: Utc::now(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueryCategory, UserFeedback};

    fn group(key: &str, queries: &[&str], keywords: &[&str], category: QueryCategory) -> QuestionGroup {
        QuestionGroup {
            id: Uuid::new_v4(),
            group_key: key.to_string(),
            member_queries: queries.iter().map(|s| s.to_string()).collect(),
            frequency: queries.len(),
            common_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            category,
        }
    }

    fn record(id: &str, query: &str, confidence: f64) -> InteractionRecord {
        InteractionRecord::new(id, query, confidence, Utc::now())
    }

    #[test]
    fn test_build_suggestions_ranks_by_failure_share() {
        let cpu = group("cpu", &["cpu a", "cpu b", "cpu c"], &["cpu"], QueryCategory::General);
        let disk = group("disk", &["disk a", "disk b", "disk c"], &["disk"], QueryCategory::General);
        let records = vec![
            record("1", "cpu a", 0.9),
            record("2", "cpu b", 0.9),
            record("3", "cpu c", 0.3),
            record("4", "disk a", 0.2),
            record("5", "disk b", 0.9).with_feedback(UserFeedback::Incorrect),
            record("6", "unrelated", 0.1),
        ];

        let suggester = PatternSuggester::default();
        let suggestions = suggester.build_suggestions(&records, &[cpu, disk]);

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].group_key, "disk");
        assert_eq!(suggestions[0].estimated_improvement_percent, 100.0);
        assert_eq!(suggestions[0].derived_from_record_ids, vec!["4", "5"]);
        assert_eq!(suggestions[1].estimated_improvement_percent, 33.0);
        assert!(suggestions.iter().all(|s| s.status == SuggestionStatus::Pending));
    }

    #[test]
    fn test_groups_without_records_are_skipped() {
        let g = group("cpu", &["cpu a", "cpu b", "cpu c"], &["cpu"], QueryCategory::Cpu);
        let suggestions = PatternSuggester::default().build_suggestions(&[record("1", "other", 0.1)], &[g]);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_suggestions_are_capped() {
        let config = SuggesterConfig { max_suggestions: 1, ..Default::default() };
        let g = group("cpu", &["cpu a", "cpu b", "cpu c"], &["cpu"], QueryCategory::Cpu);
        let records = vec![record("1", "cpu a", 0.1)];

        // keyword and semantic rules both qualify
        let suggestions = PatternSuggester::new(config).build_suggestions(&records, &[g]);
        assert_eq!(suggestions.len(), 1);
    }
}
