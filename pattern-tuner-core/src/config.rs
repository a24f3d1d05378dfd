//! Configuration for the analyzer, suggester and experiment stages
//!
//! Every threshold has a default and can be overridden per invocation by
//! constructing a component with a custom config, or loaded from TOML.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TunerError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub analyzer: AnalyzerConfig,
    pub suggester: SuggesterConfig,
    pub experiment: ExperimentConfig,
}

impl TunerConfig {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.analyzer.validate()?;
        self.suggester.validate()?;
        self.experiment.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub low_confidence_threshold: f64,
    pub min_pattern_frequency: usize,
    pub max_patterns_returned: usize,
    pub analysis_window_days: i64,
    pub max_sample_queries: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: 0.6,
            min_pattern_frequency: 3,
            max_patterns_returned: 50,
            analysis_window_days: 30,
            max_sample_queries: 5,
        }
    }
}

impl AnalyzerConfig {
    fn validate(&self) -> Result<()> {
        check_unit("analyzer.low_confidence_threshold", self.low_confidence_threshold)?;
        check_positive("analyzer.min_pattern_frequency", self.min_pattern_frequency)?;
        check_positive("analyzer.max_patterns_returned", self.max_patterns_returned)?;
        if self.analysis_window_days <= 0 {
            return Err(TunerError::Config("analyzer.analysis_window_days must be positive".into()));
        }
        Ok(())
    }
    /// Start of the analysis window ending at `end`, clamped to the earliest
    /// representable instant when the window reaches past it
    pub fn window_start(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_days(self.analysis_window_days)
            .and_then(|window| end.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggesterConfig {
    pub min_group_size: usize,
    pub max_suggestions: usize,
    pub confidence_threshold: f64,
    pub similarity_threshold: f64,
    pub low_confidence_threshold: f64,
}

impl Default for SuggesterConfig {
    fn default() -> Self {
        Self {
            min_group_size: 3,
            max_suggestions: 20,
            confidence_threshold: 0.7,
            similarity_threshold: 0.6,
            low_confidence_threshold: 0.6,
        }
    }
}

impl SuggesterConfig {
    fn validate(&self) -> Result<()> {
        check_positive("suggester.min_group_size", self.min_group_size)?;
        check_positive("suggester.max_suggestions", self.max_suggestions)?;
        check_unit("suggester.confidence_threshold", self.confidence_threshold)?;
        check_unit("suggester.similarity_threshold", self.similarity_threshold)?;
        check_unit("suggester.low_confidence_threshold", self.low_confidence_threshold)
    }
}

/// Adopt/reject thresholds in percent. Heuristic defaults, not derived from
/// a significance test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    pub adopt_overall: f64,
    pub adopt_satisfaction: f64,
    pub adopt_confidence: f64,
    pub reject_overall: f64,
    pub reject_satisfaction: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            adopt_overall: 10.0,
            adopt_satisfaction: 5.0,
            adopt_confidence: 5.0,
            reject_overall: -5.0,
            reject_satisfaction: -10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub min_sample_size: u64,
    pub test_duration_days: i64,
    /// Conversion rate an experiment must exceed to count as significant
    pub significance_floor: f64,
    pub thresholds: DecisionThresholds,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 50,
            test_duration_days: 7,
            significance_floor: 0.1,
            thresholds: DecisionThresholds::default(),
        }
    }
}

impl ExperimentConfig {
    fn validate(&self) -> Result<()> {
        if self.min_sample_size == 0 {
            return Err(TunerError::Config("experiment.min_sample_size must be positive".into()));
        }
        if self.test_duration_days <= 0 {
            return Err(TunerError::Config("experiment.test_duration_days must be positive".into()));
        }
        check_unit("experiment.significance_floor", self.significance_floor)?;
        if self.thresholds.adopt_overall < self.thresholds.reject_overall {
            return Err(TunerError::Config(
                "experiment.thresholds.adopt_overall must not be below reject_overall".into(),
            ));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TunerError::Config(format!("{} must be within 0..=1, got {}", name, value)))
    }
}

fn check_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        Err(TunerError::Config(format!("{} must be positive", name)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_saturates() {
        let end = Utc::now();
        let config = AnalyzerConfig::default();
        assert_eq!(config.window_start(end), end - Duration::days(30));

        let config = AnalyzerConfig { analysis_window_days: i64::MAX, ..Default::default() };
        assert_eq!(config.window_start(end), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_defaults() {
        let config = TunerConfig::default();
        assert_eq!(config.analyzer.low_confidence_threshold, 0.6);
        assert_eq!(config.analyzer.min_pattern_frequency, 3);
        assert_eq!(config.analyzer.max_patterns_returned, 50);
        assert_eq!(config.suggester.similarity_threshold, 0.6);
        assert_eq!(config.suggester.min_group_size, 3);
        assert_eq!(config.suggester.max_suggestions, 20);
        assert_eq!(config.experiment.min_sample_size, 50);
        assert_eq!(config.experiment.test_duration_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = TunerConfig::from_toml_str(
            r#"
            [analyzer]
            low_confidence_threshold = 0.5

            [experiment.thresholds]
            adopt_overall = 15.0
            "#,
        )
        .unwrap();

        assert_eq!(config.analyzer.low_confidence_threshold, 0.5);
        assert_eq!(config.analyzer.min_pattern_frequency, 3);
        assert_eq!(config.experiment.thresholds.adopt_overall, 15.0);
        assert_eq!(config.experiment.thresholds.reject_satisfaction, -10.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = TunerConfig::from_toml_str("[suggester]\nsimilarity_threshold = 1.5").unwrap_err();
        assert!(matches!(err, TunerError::Config(_)));

        let err = TunerConfig::from_toml_str("[suggester]\nmin_group_size = 0").unwrap_err();
        assert!(matches!(err, TunerError::Config(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuner.toml");

        let mut config = TunerConfig::default();
        config.experiment.min_sample_size = 80;
        config.save(&path).unwrap();

        let loaded = TunerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
