// Command implementations

pub mod analyze;
pub mod compare;
pub mod config;
pub mod suggest;

use anyhow::{Context, Result};
use pattern_tuner_core::JsonLogFile;
use pattern_tuner_core::model::InteractionRecord;
use std::path::Path;
use tracing::info;

/// Load every record of an interaction log
pub(crate) async fn load_records(path: &Path) -> Result<Vec<InteractionRecord>> {
    let records = JsonLogFile::new(path)
        .read_all()
        .await
        .with_context(|| format!("Failed to read interaction log {}", path.display()))?;
    info!(records = records.len(), path = %path.display(), "Interaction log loaded");
    Ok(records)
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
