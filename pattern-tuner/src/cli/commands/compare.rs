//! Compare command - measure a control rule and compare a candidate with it

use anyhow::{Context, Result};
use pattern_tuner_core::model::RulePattern;
use pattern_tuner_core::{ExperimentManager, TunerConfig};

use super::{load_records, print_json};
use crate::cli::app::CompareArgs;

pub async fn execute(args: CompareArgs, config: &TunerConfig) -> Result<()> {
    let records = load_records(&args.logs).await?;

    let control = RulePattern::manual(&args.control, "Production rule", 1.0)
        .context("Control rule does not compile")?;
    let candidate = RulePattern::manual(&args.candidate, "Candidate rule", args.candidate_confidence)
        .context("Candidate rule does not compile")?;

    let manager = ExperimentManager::new(config.experiment.clone());
    let comparison = manager.compare(&control, &candidate, &records)?;

    print_json(&comparison)
}
