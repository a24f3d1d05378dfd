//! Control versus candidate comparison
//!
//! The control rule is measured by replaying historical records. A fresh
//! candidate has no traffic, so its metrics are estimated from its heuristic
//! confidence and flagged with `is_simulated`.

use chrono::Utc;
use uuid::Uuid;

use crate::config::{DecisionThresholds, ExperimentConfig};
use crate::error::Result;
use crate::experiment::metrics::measure;
use crate::model::{
    Comparison, ExperimentMetrics, Improvement, InteractionRecord, Recommendation, RulePattern,
};

const SUCCESS_UPLIFT: f64 = 1.1;
const SUCCESS_CAP: f64 = 0.95;
const RESPONSE_TIME_FACTOR: f64 = 0.95;
const SATISFACTION_FACTOR: f64 = 0.9;

const CONFIDENCE_WEIGHT: f64 = 0.3;
const SATISFACTION_WEIGHT: f64 = 0.4;
const RESPONSE_TIME_WEIGHT: f64 = 0.2;
const ERROR_RATE_WEIGHT: f64 = 0.1;

pub fn compare(
    control_rule: &RulePattern,
    candidate_rule: &RulePattern,
    records: &[InteractionRecord],
    config: &ExperimentConfig,
) -> Result<Comparison> {
    let control_metrics = measure(&control_rule.compile()?, records);
    candidate_rule.compile()?;
    let candidate_metrics = simulate(candidate_rule, &control_metrics);

    let improvement = improvement(&control_metrics, &candidate_metrics);
    let recommendation = recommend(&improvement, &config.thresholds);
    let reasoning = reasoning(
        &improvement,
        &candidate_metrics,
        candidate_rule.confidence,
        control_metrics.total_queries,
        config,
    );

    Ok(Comparison {
        id: Uuid::new_v4(),
        control_rule: control_rule.clone(),
        candidate_rule: candidate_rule.clone(),
        sample_size: control_metrics.total_queries,
        control_metrics,
        candidate_metrics,
        improvement,
        recommendation,
        reasoning,
        created_at: Utc::now(),
    })
}

/// Expected candidate performance derived from its heuristic confidence
pub fn simulate(candidate: &RulePattern, control: &ExperimentMetrics) -> ExperimentMetrics {
    let success = (candidate.confidence * SUCCESS_UPLIFT).min(SUCCESS_CAP);

    // errors scale with the share of traffic the rule is expected to miss
    let error_rate = if control.conversion_rate >= 1.0 {
        control.error_rate
    } else {
        (control.error_rate * (1.0 - success) / (1.0 - control.conversion_rate)).min(1.0)
    };

    ExperimentMetrics {
        total_queries: control.total_queries,
        successful_matches: (success * control.total_queries as f64).round() as u64,
        average_confidence: success,
        user_satisfaction_rate: success * SATISFACTION_FACTOR,
        average_response_time_ms: control.average_response_time_ms * RESPONSE_TIME_FACTOR,
        error_rate,
        conversion_rate: success,
        is_simulated: true,
        ..Default::default()
    }
}

/// Relative change in percent. A zero baseline counts as +100% when the
/// candidate is above it.
fn percent_delta(control: f64, candidate: f64) -> f64 {
    if control == 0.0 {
        if candidate > 0.0 { 100.0 } else { 0.0 }
    } else {
        (candidate - control) / control * 100.0
    }
}

pub fn improvement(control: &ExperimentMetrics, candidate: &ExperimentMetrics) -> Improvement {
    let confidence = percent_delta(control.average_confidence, candidate.average_confidence);
    let satisfaction =
        percent_delta(control.user_satisfaction_rate, candidate.user_satisfaction_rate);
    let response_time =
        -percent_delta(control.average_response_time_ms, candidate.average_response_time_ms);
    let error_rate = -percent_delta(control.error_rate, candidate.error_rate);
    let conversion = percent_delta(control.conversion_rate, candidate.conversion_rate);

    Improvement {
        confidence,
        satisfaction,
        response_time,
        error_rate,
        conversion,
        overall: confidence * CONFIDENCE_WEIGHT
            + satisfaction * SATISFACTION_WEIGHT
            + response_time * RESPONSE_TIME_WEIGHT
            + error_rate * ERROR_RATE_WEIGHT,
    }
}

pub fn recommend(improvement: &Improvement, thresholds: &DecisionThresholds) -> Recommendation {
    if improvement.overall >= thresholds.adopt_overall
        && improvement.satisfaction >= thresholds.adopt_satisfaction
        && improvement.confidence >= thresholds.adopt_confidence
    {
        Recommendation::Adopt
    } else if improvement.overall <= thresholds.reject_overall
        || improvement.satisfaction <= thresholds.reject_satisfaction
    {
        Recommendation::Reject
    } else {
        Recommendation::ContinueTesting
    }
}

fn reasoning(
    improvement: &Improvement,
    candidate: &ExperimentMetrics,
    candidate_confidence: f64,
    sample_size: u64,
    config: &ExperimentConfig,
) -> Vec<String> {
    let t = &config.thresholds;
    let mut lines = Vec::new();

    if improvement.overall >= t.adopt_overall {
        lines.push(format!(
            "Overall improvement of {:.1}% meets the adoption threshold of {:.1}%",
            improvement.overall, t.adopt_overall
        ));
    } else if improvement.overall <= t.reject_overall {
        lines.push(format!(
            "Overall change of {:.1}% is at or below the rejection threshold of {:.1}%",
            improvement.overall, t.reject_overall
        ));
    } else {
        lines.push(format!("Overall change of {:.1}% is inconclusive", improvement.overall));
    }

    if improvement.satisfaction >= t.adopt_satisfaction {
        lines.push(format!("User satisfaction improves by {:.1}%", improvement.satisfaction));
    } else if improvement.satisfaction <= t.reject_satisfaction {
        lines.push(format!(
            "User satisfaction drops by {:.1}%, beyond the {:.1}% limit",
            -improvement.satisfaction, -t.reject_satisfaction
        ));
    } else {
        lines.push(format!(
            "User satisfaction change of {:.1}% is below the {:.1}% needed for adoption",
            improvement.satisfaction, t.adopt_satisfaction
        ));
    }

    if improvement.confidence >= t.adopt_confidence {
        lines.push(format!("Average confidence improves by {:.1}%", improvement.confidence));
    } else {
        lines.push(format!(
            "Average confidence change of {:.1}% is below the {:.1}% needed for adoption",
            improvement.confidence, t.adopt_confidence
        ));
    }

    if improvement.response_time > 0.0 {
        lines.push(format!("Response time improves by {:.1}%", improvement.response_time));
    }
    if improvement.error_rate < 0.0 {
        lines.push(format!("Error rate rises by {:.1}%", -improvement.error_rate));
    }

    if candidate.is_simulated {
        lines.push(format!(
            "Candidate metrics are simulated from heuristic confidence {:.2}, not measured on traffic",
            candidate_confidence
        ));
    }
    if sample_size < config.min_sample_size {
        lines.push(format!(
            "Only {} historical records were replayed; at least {} are needed for a reliable verdict",
            sample_size, config.min_sample_size
        ));
    }

    lines
}
