pub mod classifier;
pub mod failure_analyzer;

pub use classifier::{ActionRule, Classification, DomainRule, QueryClassifier};
pub use failure_analyzer::{
    AnalysisReport, CategorySummary, FailureAnalyzer, ImprovementRecommendation,
    PatternAnalysisResult, Priority,
};
