use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Parse CLI arguments first to get verbosity level
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = cli::commands::config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze(args) => {
            info!("Analyze command: {:?}", args);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(cli::commands::analyze::execute(args, &config))?;
        }
        Commands::Suggest(args) => {
            info!("Suggest command: {:?}", args);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(cli::commands::suggest::execute(args, &config))?;
        }
        Commands::Compare(args) => {
            info!("Compare command: {:?}", args);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(cli::commands::compare::execute(args, &config))?;
        }
        Commands::InitConfig(args) => {
            info!("Init-config command: {:?}", args);
            cli::commands::config::init(args)?;
        }
    }

    Ok(())
}
