use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ExperimentConfig;
use crate::error::{Result, TunerError};
use crate::experiment::comparison;
use crate::experiment::metrics::{confidence_level, is_significant, observe};
use crate::model::{
    Comparison, Experiment, ExperimentMetrics, ExperimentStatus, InteractionRecord, RulePattern,
    TrafficGroup,
};

/// A running experiment with its compiled candidate
struct ExperimentSlot {
    experiment: Experiment,
    matcher: Regex,
}

/// In-memory experiment registry.
///
/// Updates to one experiment go through the registry entry's exclusive
/// guard, so observations for the same id are serialized while distinct ids
/// proceed in parallel. Terminal experiments move to the history map and are
/// never modified again.
pub struct ExperimentManager {
    config: ExperimentConfig,
    active: DashMap<Uuid, ExperimentSlot>,
    history: DashMap<Uuid, Experiment>,
    comparisons: DashMap<Uuid, Comparison>,
}

impl Default for ExperimentManager {
    fn default() -> Self {
        Self::new(ExperimentConfig::default())
    }
}

impl ExperimentManager {
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            config,
            active: DashMap::new(),
            history: DashMap::new(),
            comparisons: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn start_experiment(
        &self,
        candidate: &RulePattern,
        traffic_group: TrafficGroup,
    ) -> Result<Experiment> {
        let matcher = candidate.compile()?;
        let experiment = Experiment {
            id: Uuid::new_v4(),
            candidate_rule_id: candidate.id,
            candidate_expression: candidate.expression.clone(),
            traffic_group,
            status: ExperimentStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            metrics: ExperimentMetrics::default(),
            sample_size: 0,
            confidence_level: 0.0,
            is_statistically_significant: false,
            failure_reason: None,
        };

        info!(
            experiment = %experiment.id,
            candidate = %candidate.id,
            traffic = ?traffic_group,
            "Experiment started"
        );

        self.active.insert(experiment.id, ExperimentSlot { experiment: experiment.clone(), matcher });
        Ok(experiment)
    }

    pub fn record_observation(&self, id: Uuid, record: &InteractionRecord) -> Result<ExperimentStatus> {
        self.record_observation_at(id, record, Utc::now())
    }

    /// Fold one record into a running experiment, completing it when the
    /// duration or sample thresholds are reached. Terminal experiments are
    /// left untouched.
    pub fn record_observation_at(
        &self,
        id: Uuid,
        record: &InteractionRecord,
        now: DateTime<Utc>,
    ) -> Result<ExperimentStatus> {
        let status = {
            let Some(mut slot) = self.active.get_mut(&id) else {
                return self.archived_status(id);
            };
            let slot = &mut *slot;
            if slot.experiment.status.is_terminal() {
                return Ok(slot.experiment.status);
            }

            let experiment = &mut slot.experiment;
            observe(&mut experiment.metrics, &slot.matcher, record);
            experiment.sample_size = experiment.metrics.total_queries;
            experiment.is_statistically_significant = is_significant(&experiment.metrics, &self.config);
            experiment.confidence_level =
                confidence_level(&experiment.metrics, self.config.significance_floor);

            if self.should_complete(experiment, now) {
                finish(experiment, ExperimentStatus::Completed, now, None);
                info!(
                    experiment = %id,
                    samples = experiment.sample_size,
                    conversion = experiment.metrics.conversion_rate,
                    significant = experiment.is_statistically_significant,
                    "Experiment completed"
                );
            }
            experiment.status
        };

        if status.is_terminal() {
            self.archive(id);
        }
        Ok(status)
    }

    /// Historical replay: feed records in order until the experiment ends
    pub fn replay(&self, id: Uuid, records: &[InteractionRecord]) -> Result<ExperimentStatus> {
        let mut status = self.archived_or_active_status(id)?;
        for record in records {
            if status.is_terminal() {
                break;
            }
            status = self.record_observation(id, record)?;
        }
        debug!(experiment = %id, records = records.len(), status = ?status, "Replay finished");
        Ok(status)
    }

    pub fn complete_experiment(&self, id: Uuid) -> Result<Experiment> {
        self.terminate(id, ExperimentStatus::Completed, None)
    }

    /// Mark an experiment failed after a non-recoverable measurement error
    pub fn fail_experiment(&self, id: Uuid, reason: impl Into<String>) -> Result<Experiment> {
        self.terminate(id, ExperimentStatus::Failed, Some(reason.into()))
    }

    pub fn cancel_experiment(&self, id: Uuid) -> Result<Experiment> {
        self.terminate(id, ExperimentStatus::Cancelled, None)
    }

    /// Measure `control` on historical records and compare it with the
    /// simulated `candidate`. Never changes any production rule; the verdict
    /// is returned and logged in the comparison history.
    pub fn compare(
        &self,
        control: &RulePattern,
        candidate: &RulePattern,
        records: &[InteractionRecord],
    ) -> Result<Comparison> {
        let result = comparison::compare(control, candidate, records, &self.config)?;
        info!(
            comparison = %result.id,
            samples = result.sample_size,
            overall = result.improvement.overall,
            recommendation = ?result.recommendation,
            "Comparison complete"
        );
        self.comparisons.insert(result.id, result.clone());
        Ok(result)
    }

    pub fn get(&self, id: Uuid) -> Option<Experiment> {
        self.active
            .get(&id)
            .map(|slot| slot.experiment.clone())
            .or_else(|| self.history.get(&id).map(|e| e.value().clone()))
    }

    /// Running experiments, oldest first
    pub fn active_experiments(&self) -> Vec<Experiment> {
        let mut experiments: Vec<Experiment> =
            self.active.iter().map(|slot| slot.experiment.clone()).collect();
        experiments.sort_by_key(|e| e.started_at);
        experiments
    }

    /// Finished experiments ordered by end time
    pub fn history(&self) -> Vec<Experiment> {
        let mut experiments: Vec<Experiment> = self.history.iter().map(|e| e.value().clone()).collect();
        experiments.sort_by_key(|e| e.ended_at);
        experiments
    }

    pub fn comparisons(&self) -> Vec<Comparison> {
        let mut comparisons: Vec<Comparison> =
            self.comparisons.iter().map(|c| c.value().clone()).collect();
        comparisons.sort_by_key(|c| c.created_at);
        comparisons
    }

    fn should_complete(&self, experiment: &Experiment, now: DateTime<Utc>) -> bool {
        let elapsed = now - experiment.started_at;
        elapsed >= Duration::days(self.config.test_duration_days)
            || (experiment.sample_size >= 2 * self.config.min_sample_size
                && experiment.is_statistically_significant)
    }

    fn terminate(&self, id: Uuid, status: ExperimentStatus, reason: Option<String>) -> Result<Experiment> {
        let experiment = {
            let Some(mut slot) = self.active.get_mut(&id) else {
                return self
                    .history
                    .get(&id)
                    .map(|e| e.value().clone())
                    .ok_or(TunerError::ExperimentNotFound(id));
            };
            if !slot.experiment.status.is_terminal() {
                finish(&mut slot.experiment, status, Utc::now(), reason);
                info!(experiment = %id, status = ?status, "Experiment ended");
            }
            slot.experiment.clone()
        };

        self.archive(id);
        Ok(experiment)
    }

    /// Copy a terminal experiment into the history before dropping it from
    /// the active map, so a lookup always finds it in one of the two.
    fn archive(&self, id: Uuid) {
        if let Some(slot) = self.active.get(&id) {
            if slot.experiment.status.is_terminal() {
                self.history.insert(id, slot.experiment.clone());
            }
        }
        self.active.remove_if(&id, |_, slot| slot.experiment.status.is_terminal());
    }

    fn archived_status(&self, id: Uuid) -> Result<ExperimentStatus> {
        self.history.get(&id).map(|e| e.status).ok_or(TunerError::ExperimentNotFound(id))
    }

    fn archived_or_active_status(&self, id: Uuid) -> Result<ExperimentStatus> {
        match self.active.get(&id) {
            Some(slot) => Ok(slot.experiment.status),
            None => self.archived_status(id),
        }
    }
}

fn finish(
    experiment: &mut Experiment,
    status: ExperimentStatus,
    now: DateTime<Utc>,
    reason: Option<String>,
) {
    experiment.status = status;
    experiment.ended_at = Some(now);
    experiment.failure_reason = reason;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserFeedback;
    use std::sync::Arc;

    fn candidate() -> RulePattern {
        RulePattern::manual("(?i)cpu", "cpu", 0.8).unwrap()
    }

    fn record(query: &str, confidence: f64) -> InteractionRecord {
        InteractionRecord::new("r", query, confidence, Utc::now()).with_feedback(UserFeedback::Helpful)
    }

    #[test]
    fn test_start_rejects_invalid_expression() {
        let manager = ExperimentManager::default();
        let mut rule = candidate();
        rule.expression = "(cpu".to_string();
        let err = manager.start_experiment(&rule, TrafficGroup::HistoricalReplay).unwrap_err();
        assert!(matches!(err, TunerError::InvalidPattern { .. }));
        assert!(manager.active_experiments().is_empty());
    }

    #[test]
    fn test_observations_and_auto_completion() {
        let config = ExperimentConfig { min_sample_size: 5, ..Default::default() };
        let manager = ExperimentManager::new(config);
        let experiment = manager.start_experiment(&candidate(), TrafficGroup::Sampled { percent: 10 }).unwrap();

        for _ in 0..9 {
            let status = manager.record_observation(experiment.id, &record("cpu 확인", 0.7)).unwrap();
            assert_eq!(status, ExperimentStatus::Running);
        }
        let running = manager.get(experiment.id).unwrap();
        assert!(running.is_statistically_significant);
        assert_eq!(running.sample_size, 9);

        // 2 * min_sample_size with a significant conversion rate
        let status = manager.record_observation(experiment.id, &record("cpu 확인", 0.7)).unwrap();
        assert_eq!(status, ExperimentStatus::Completed);
        assert!(manager.active_experiments().is_empty());
        assert_eq!(manager.history().len(), 1);

        let done = manager.get(experiment.id).unwrap();
        let before = done.metrics.clone();
        let status = manager.record_observation(experiment.id, &record("disk", 0.1)).unwrap();
        assert_eq!(status, ExperimentStatus::Completed);
        assert_eq!(manager.get(experiment.id).unwrap().metrics, before);
    }

    #[test]
    fn test_duration_completes_experiment() {
        let manager = ExperimentManager::default();
        let experiment = manager.start_experiment(&candidate(), TrafficGroup::Sampled { percent: 5 }).unwrap();
        let later = experiment.started_at + Duration::days(7);

        let status = manager.record_observation_at(experiment.id, &record("cpu", 0.9), later).unwrap();
        assert_eq!(status, ExperimentStatus::Completed);
        assert_eq!(manager.get(experiment.id).unwrap().ended_at, Some(later));
    }

    #[test]
    fn test_terminal_transitions_are_idempotent() {
        let manager = ExperimentManager::default();
        let experiment = manager.start_experiment(&candidate(), TrafficGroup::HistoricalReplay).unwrap();

        let failed = manager.fail_experiment(experiment.id, "log source corrupted").unwrap();
        assert_eq!(failed.status, ExperimentStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("log source corrupted"));

        let again = manager.cancel_experiment(experiment.id).unwrap();
        assert_eq!(again.status, ExperimentStatus::Failed);
        assert_eq!(again.ended_at, failed.ended_at);

        let completed = manager.complete_experiment(experiment.id).unwrap();
        assert_eq!(completed.status, ExperimentStatus::Failed);
    }

    #[test]
    fn test_unknown_experiment() {
        let manager = ExperimentManager::default();
        let id = Uuid::new_v4();
        assert!(matches!(
            manager.record_observation(id, &record("cpu", 0.5)),
            Err(TunerError::ExperimentNotFound(_))
        ));
        assert!(manager.complete_experiment(id).is_err());
        assert!(manager.get(id).is_none());
    }

    #[test]
    fn test_replay_stops_at_completion() {
        let config = ExperimentConfig { min_sample_size: 2, ..Default::default() };
        let manager = ExperimentManager::new(config);
        let experiment = manager.start_experiment(&candidate(), TrafficGroup::HistoricalReplay).unwrap();

        let records: Vec<_> = (0..10).map(|_| record("cpu", 0.6)).collect();
        let status = manager.replay(experiment.id, &records).unwrap();
        assert_eq!(status, ExperimentStatus::Completed);
        assert_eq!(manager.get(experiment.id).unwrap().sample_size, 4);
    }

    #[test]
    fn test_concurrent_observations_are_serialized() {
        let config = ExperimentConfig { min_sample_size: 10_000, ..Default::default() };
        let manager = Arc::new(ExperimentManager::new(config));
        let first = manager.start_experiment(&candidate(), TrafficGroup::HistoricalReplay).unwrap();
        let second = manager.start_experiment(&candidate(), TrafficGroup::HistoricalReplay).unwrap();

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let manager = Arc::clone(&manager);
                let id = if worker % 2 == 0 { first.id } else { second.id };
                scope.spawn(move || {
                    for _ in 0..250 {
                        manager.record_observation(id, &record("cpu", 0.5)).unwrap();
                    }
                });
            }
        });

        for id in [first.id, second.id] {
            let experiment = manager.get(id).unwrap();
            assert_eq!(experiment.metrics.total_queries, 1000);
            assert!((experiment.metrics.average_confidence - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_comparisons_are_logged() {
        let manager = ExperimentManager::default();
        let control = RulePattern::manual("cpu", "control", 0.5).unwrap();
        let records = vec![record("cpu", 0.5), record("disk", 0.5)];

        let comparison = manager.compare(&control, &candidate(), &records).unwrap();
        assert_eq!(manager.comparisons().len(), 1);
        assert_eq!(manager.comparisons()[0].id, comparison.id);
    }
}
