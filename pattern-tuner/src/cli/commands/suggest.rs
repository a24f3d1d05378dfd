//! Suggest command - group failing queries and propose rules and templates

use anyhow::{Context, Result};
use pattern_tuner_core::{ContextData, PatternSuggester, TunerConfig};
use serde_json::json;
use std::path::Path;
use tracing::warn;

use super::{load_records, print_json};
use crate::cli::app::SuggestArgs;

pub async fn execute(args: SuggestArgs, config: &TunerConfig) -> Result<()> {
    let records = load_records(&args.logs).await?;
    let context = match &args.context {
        Some(path) => Some(load_context(path).await?),
        None => None,
    };

    let suggester = PatternSuggester::new(config.suggester.clone());
    let threshold = config.suggester.low_confidence_threshold;
    let failing: Vec<String> = records
        .iter()
        .filter(|r| r.is_failure(threshold))
        .map(|r| r.query.clone())
        .collect();

    let groups = suggester.group_similar_queries(&failing);
    let suggestions = suggester.build_suggestions(&records, &groups);

    let mut grouped = Vec::new();
    for group in &groups {
        let templates = match suggester.suggest_response_templates(group, context.as_ref()) {
            Ok(templates) => templates,
            Err(e) => {
                warn!(group = %group.group_key, error = %e, "No templates for group");
                Vec::new()
            }
        };
        grouped.push(json!({ "group": group, "templates": templates }));
    }

    print_json(&json!({
        "failing_queries": failing.len(),
        "groups": grouped,
        "suggestions": suggestions,
    }))
}

async fn load_context(path: &Path) -> Result<ContextData> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read context data {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid context data in {}", path.display()))
}
