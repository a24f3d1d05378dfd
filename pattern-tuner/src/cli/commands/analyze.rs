//! Analyze command - report failure patterns in an interaction log

use anyhow::Result;
use pattern_tuner_core::{FailureAnalyzer, TunerConfig};
use serde_json::json;

use super::{load_records, print_json};
use crate::cli::app::AnalyzeArgs;

pub async fn execute(args: AnalyzeArgs, config: &TunerConfig) -> Result<()> {
    let records = load_records(&args.logs).await?;
    let analyzer = FailureAnalyzer::new(config.analyzer.clone());

    let report = analyzer.analyze_low_confidence(&records);
    let negative_feedback = analyzer.analyze_negative_feedback(&records);
    let unhandled = analyzer.identify_unhandled_categories(&records);

    print_json(&json!({
        "low_confidence": report,
        "negative_feedback": negative_feedback,
        "unhandled_categories": unhandled,
    }))
}
