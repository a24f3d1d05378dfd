//! A/B harness for candidate rules: live or replayed experiments and
//! control-versus-candidate comparisons

pub mod comparison;
pub mod manager;
pub mod metrics;

pub use comparison::{compare, improvement, recommend, simulate};
pub use manager::ExperimentManager;
pub use metrics::{confidence_level, evaluate, is_significant, measure, observe};
