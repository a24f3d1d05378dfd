//! Configuration loading and the init-config command

use anyhow::{Context, Result, bail};
use pattern_tuner_core::TunerConfig;
use std::path::Path;
use tracing::{debug, info};

use crate::cli::app::InitConfigArgs;

/// Configuration from `path`, or the defaults when none was given
pub fn load(path: Option<&Path>) -> Result<TunerConfig> {
    match path {
        Some(path) => {
            let config = TunerConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            debug!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => Ok(TunerConfig::default()),
    }
}

pub fn init(args: InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.output.display());
    }

    TunerConfig::default()
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(path = %args.output.display(), "Default configuration written");
    println!("{}", written_message(&args.output));
    Ok(())
}

fn written_message(path: &Path) -> String {
    format!("Wrote default configuration to {}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("pattern-tuner.toml");

        init(InitConfigArgs { output: output.clone(), force: false }).unwrap();
        assert_eq!(load(Some(&output)).unwrap(), TunerConfig::default());

        assert!(init(InitConfigArgs { output: output.clone(), force: false }).is_err());
        assert!(init(InitConfigArgs { output, force: true }).is_ok());
    }

    #[test]
    fn test_written_message() {
        assert_eq!(
            written_message(Path::new("pattern-tuner.toml")),
            "Wrote default configuration to pattern-tuner.toml"
        );
    }

    #[test]
    fn test_defaults_without_path() {
        assert_eq!(load(None).unwrap(), TunerConfig::default());
    }
}
