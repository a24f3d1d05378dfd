//! Lexical and structural similarity between two queries

use regex_utils::{structure, text};

const KEYWORD_WEIGHT: f64 = 0.5;
const STRUCTURE_WEIGHT: f64 = 0.3;
const LENGTH_WEIGHT: f64 = 0.2;

/// Word-count difference still considered structurally alike
const WORD_COUNT_TOLERANCE: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryFeatures {
    pub keywords: Vec<String>,
    pub has_question: bool,
    pub has_command: bool,
    pub length: usize,
    pub word_count: usize,
}

impl QueryFeatures {
    pub fn extract(query: &str) -> Self {
        Self {
            keywords: text::extract_keywords(query),
            has_question: structure::has_question(query),
            has_command: structure::has_command(query),
            length: query.chars().count(),
            word_count: text::word_count(query),
        }
    }
}

/// Shared keywords over the larger keyword list
pub fn keyword_similarity(a: &QueryFeatures, b: &QueryFeatures) -> f64 {
    let common = a.keywords.iter().filter(|k| b.keywords.contains(k)).count();
    let denominator = a.keywords.len().max(b.keywords.len()).max(1);
    common as f64 / denominator as f64
}

pub fn structure_similarity(a: &QueryFeatures, b: &QueryFeatures) -> f64 {
    let mut score = 0.0;
    if a.has_question == b.has_question {
        score += 0.3;
    }
    if a.has_command == b.has_command {
        score += 0.3;
    }
    if a.word_count.abs_diff(b.word_count) <= WORD_COUNT_TOLERANCE {
        score += 0.4;
    }
    score
}

pub fn length_similarity(a: &QueryFeatures, b: &QueryFeatures) -> f64 {
    let longest = a.length.max(b.length);
    if longest == 0 {
        return 1.0;
    }
    (1.0 - a.length.abs_diff(b.length) as f64 / longest as f64).max(0.0)
}

/// Weighted combination in `0.0..=1.0`
pub fn similarity(a: &QueryFeatures, b: &QueryFeatures) -> f64 {
    keyword_similarity(a, b) * KEYWORD_WEIGHT
        + structure_similarity(a, b) * STRUCTURE_WEIGHT
        + length_similarity(a, b) * LENGTH_WEIGHT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_queries_score_one() {
        let a = QueryFeatures::extract("cpu 사용률 확인해주세요");
        assert!((similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_component_scores() {
        let a = QueryFeatures::extract("memory usage check");
        let b = QueryFeatures::extract("memory usage trend?");

        assert!((keyword_similarity(&a, &b) - 2.0 / 3.0).abs() < 1e-9);
        // question mark differs, command differs, word count equal
        assert!((structure_similarity(&a, &b) - 0.4).abs() < 1e-9);
        assert!((length_similarity(&a, &b) - (1.0 - 1.0 / 19.0)).abs() < 1e-9);
    }

    #[test]
    fn test_unrelated_queries_below_default_threshold() {
        let a = QueryFeatures::extract("디스크 용량이 얼마나 남았나요?");
        let b = QueryFeatures::extract("restart the payment service now");
        assert!(similarity(&a, &b) < 0.6);
    }

    #[test]
    fn test_empty_queries() {
        let a = QueryFeatures::extract("");
        assert_eq!(keyword_similarity(&a, &a), 0.0);
        assert_eq!(length_similarity(&a, &a), 1.0);
    }
}
