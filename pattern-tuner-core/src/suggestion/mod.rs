//! Pattern suggestion: query grouping, candidate rule synthesis, response
//! templates and ranked suggestions

pub mod grouping;
pub mod rules;
pub mod similarity;
pub mod suggester;
pub mod templates;

pub use grouping::{common_keywords, group_similar_queries};
pub use rules::generate_candidate_rules;
pub use similarity::{QueryFeatures, similarity};
pub use suggester::PatternSuggester;
pub use templates::{
    ContextData, ErrorLogEntry, ServerSnapshot, TimeRange, check_placeholders,
    suggest_response_templates,
};
