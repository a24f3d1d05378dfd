//! Metric accumulation shared by live experiments and historical replays

use regex::Regex;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::warn;

use crate::config::ExperimentConfig;
use crate::error::{Result, TunerError};
use crate::model::{ExperimentMetrics, InteractionRecord, UserFeedback};

/// Match a single record against a compiled rule. Records that cannot be
/// measured meaningfully are reported as evaluation errors.
pub fn evaluate(rule: &Regex, record: &InteractionRecord) -> Result<bool> {
    if record.query.trim().is_empty() {
        return Err(TunerError::Evaluation {
            record_id: record.id.clone(),
            message: "query is empty".to_string(),
        });
    }
    if !record.confidence.is_finite() || !(0.0..=1.0).contains(&record.confidence) {
        return Err(TunerError::Evaluation {
            record_id: record.id.clone(),
            message: format!("confidence {} is outside 0..=1", record.confidence),
        });
    }
    Ok(rule.is_match(&record.query))
}

/// Fold one record into `metrics`. A record that fails evaluation is logged,
/// counted as excluded and left out of every average.
pub fn observe(metrics: &mut ExperimentMetrics, rule: &Regex, record: &InteractionRecord) {
    let matched = match evaluate(rule, record) {
        Ok(matched) => matched,
        Err(e) => {
            warn!(record = %record.id, error = %e, "Excluding record from metrics");
            metrics.excluded_records += 1;
            refresh_error_rate(metrics);
            return;
        }
    };

    metrics.total_queries += 1;
    if matched {
        metrics.successful_matches += 1;
    }

    let n = metrics.total_queries as f64;
    metrics.average_confidence += (record.confidence - metrics.average_confidence) / n;
    metrics.average_response_time_ms +=
        (record.response_time_ms as f64 - metrics.average_response_time_ms) / n;

    if let Some(feedback) = record.user_feedback {
        metrics.feedback_count += 1;
        match feedback {
            UserFeedback::Helpful => metrics.helpful_count += 1,
            UserFeedback::Incorrect => metrics.error_count += 1,
            UserFeedback::NotHelpful => {}
        }
        metrics.user_satisfaction_rate =
            metrics.helpful_count as f64 / metrics.feedback_count as f64;
    }

    metrics.conversion_rate = metrics.successful_matches as f64 / n;
    refresh_error_rate(metrics);
}

fn refresh_error_rate(metrics: &mut ExperimentMetrics) {
    let attempts = metrics.attempts();
    metrics.error_rate = if attempts == 0 {
        0.0
    } else {
        (metrics.error_count + metrics.excluded_records) as f64 / attempts as f64
    };
}

/// Replay a batch of records against a rule
pub fn measure(rule: &Regex, records: &[InteractionRecord]) -> ExperimentMetrics {
    let mut metrics = ExperimentMetrics::default();
    for record in records {
        observe(&mut metrics, rule, record);
    }
    metrics
}

pub fn is_significant(metrics: &ExperimentMetrics, config: &ExperimentConfig) -> bool {
    metrics.total_queries >= config.min_sample_size
        && metrics.conversion_rate > config.significance_floor
}

/// One-sided confidence that the true conversion rate exceeds `floor`,
/// using the normal approximation of the binomial proportion.
pub fn confidence_level(metrics: &ExperimentMetrics, floor: f64) -> f64 {
    let n = metrics.total_queries;
    if n == 0 {
        return 0.0;
    }

    let variance = floor * (1.0 - floor) / n as f64;
    if variance <= 0.0 {
        return if metrics.conversion_rate > floor { 1.0 } else { 0.0 };
    }

    let z = (metrics.conversion_rate - floor) / variance.sqrt();
    Normal::standard().cdf(z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule() -> Regex {
        Regex::new("(?i)cpu").unwrap()
    }

    fn record(query: &str, confidence: f64) -> InteractionRecord {
        InteractionRecord::new("r", query, confidence, Utc::now())
    }

    #[test]
    fn test_observe_updates_running_averages() {
        let mut metrics = ExperimentMetrics::default();
        observe(&mut metrics, &rule(), &record("cpu 확인", 0.8).with_response_time(100));
        observe(
            &mut metrics,
            &rule(),
            &record("memory", 0.4).with_response_time(300).with_feedback(UserFeedback::Incorrect),
        );
        observe(&mut metrics, &rule(), &record("CPU load", 0.6).with_feedback(UserFeedback::Helpful));

        assert_eq!(metrics.total_queries, 3);
        assert_eq!(metrics.successful_matches, 2);
        assert!((metrics.average_confidence - 0.6).abs() < 1e-9);
        assert!((metrics.average_response_time_ms - 400.0 / 3.0).abs() < 1e-9);
        assert!((metrics.conversion_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.user_satisfaction_rate, 0.5);
        assert!((metrics.error_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!(!metrics.is_simulated);
    }

    #[test]
    fn test_invalid_records_are_excluded() {
        let mut metrics = ExperimentMetrics::default();
        observe(&mut metrics, &rule(), &record("cpu", 0.9));
        observe(&mut metrics, &rule(), &record("cpu", f64::NAN));
        observe(&mut metrics, &rule(), &record("   ", 0.5));

        assert_eq!(metrics.total_queries, 1);
        assert_eq!(metrics.excluded_records, 2);
        assert_eq!(metrics.average_confidence, 0.9);
        assert!((metrics.error_rate - 2.0 / 3.0).abs() < 1e-9);

        let err = evaluate(&rule(), &record("cpu", 1.5)).unwrap_err();
        assert!(matches!(err, TunerError::Evaluation { .. }));
    }

    #[test]
    fn test_significance_and_confidence_level() {
        let config = ExperimentConfig { min_sample_size: 10, ..Default::default() };
        let records: Vec<_> = (0..10).map(|i| record(if i % 2 == 0 { "cpu" } else { "disk" }, 0.7)).collect();
        let metrics = measure(&rule(), &records);

        assert_eq!(metrics.conversion_rate, 0.5);
        assert!(is_significant(&metrics, &config));
        assert!(confidence_level(&metrics, 0.1) > 0.99);

        let none = measure(&rule(), &[record("disk", 0.7)]);
        assert!(!is_significant(&none, &config));
        assert!(confidence_level(&none, 0.1) < 0.5);
        assert_eq!(confidence_level(&ExperimentMetrics::default(), 0.1), 0.0);
    }
}
