use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pattern-tuner",
    version,
    about = "Pattern Tuner - Find matching failures and validate better rules",
    long_about = "Pattern Tuner mines interaction logs for recurring low-confidence and negatively rated queries, proposes candidate matching rules and response templates, and compares candidates against the rules in production."
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze failures in an interaction log
    #[command(about = "Report low-confidence patterns, negative feedback and unhandled categories")]
    Analyze(AnalyzeArgs),

    /// Suggest rules and templates
    #[command(about = "Group failing queries and suggest candidate rules and response templates")]
    Suggest(SuggestArgs),

    /// Compare a candidate rule with the control
    #[command(about = "Replay the log against a control rule and compare a candidate with it")]
    Compare(CompareArgs),

    /// Write the default configuration
    #[command(name = "init-config", about = "Write the default configuration as TOML")]
    InitConfig(InitConfigArgs),
}

#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Interaction log (JSON array or JSON lines)
    #[arg(short, long)]
    pub logs: PathBuf,
}

#[derive(Parser, Debug)]
pub struct SuggestArgs {
    /// Interaction log (JSON array or JSON lines)
    #[arg(short, long)]
    pub logs: PathBuf,

    /// Live context data (JSON) used for context-aware templates
    #[arg(long)]
    pub context: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// Interaction log (JSON array or JSON lines)
    #[arg(short, long)]
    pub logs: PathBuf,

    /// Expression of the rule currently in production
    #[arg(long)]
    pub control: String,

    /// Expression of the candidate rule
    #[arg(long)]
    pub candidate: String,

    /// Heuristic confidence of the candidate
    #[arg(long, default_value_t = 0.8)]
    pub candidate_confidence: f64,
}

#[derive(Parser, Debug)]
pub struct InitConfigArgs {
    /// Output path
    #[arg(short, long, default_value = "pattern-tuner.toml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
