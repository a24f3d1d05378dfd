//! Core functionality for pattern-tuner
//!
//! This crate mines interaction logs of a query-matching system for
//! recurring failures, synthesizes candidate matching rules and response
//! templates for them, and validates candidates against the incumbent rules
//! before anything is published.

pub mod analysis;
pub mod config;
pub mod error;
pub mod experiment;
pub mod model;
pub mod pipeline;
pub mod source;
pub mod suggestion;

pub use analysis::{FailureAnalyzer, QueryClassifier};
pub use config::TunerConfig;
pub use error::{Result, TunerError};
pub use experiment::ExperimentManager;
pub use pipeline::{ImprovementPipeline, PipelineReport};
pub use source::{InMemoryLogStore, InMemoryRuleSink, InteractionSource, JsonLogFile, RuleSink};
pub use suggestion::{ContextData, PatternSuggester};
