//! Regex utilities for pattern-tuner
//! Extracted to a separate crate for compilation optimization

use once_cell::sync::Lazy;
use regex::Regex;

/// Keyword extraction from free-form query text
pub mod text {
    use super::*;

    static NON_WORD: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^\w\s]").expect("Invalid regex pattern"));

    static WHITESPACE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    /// Particles and interrogatives that carry no topical signal
    pub const STOP_WORDS: &[&str] = &[
        "은", "는", "이", "가", "을", "를", "에", "의", "와", "과", "도", "만", "부터", "까지",
        "어떻게", "무엇", "언제", "어디서", "the", "is", "are", "what", "how", "when", "where",
        "of", "to", "in", "on", "and", "or", "an", "me", "my", "please", "can", "you",
    ];

    /// Lowercase, strip punctuation, collapse whitespace.
    pub fn normalize(text: &str) -> String {
        let lowered = text.to_lowercase();
        let stripped = NON_WORD.replace_all(&lowered, " ");
        WHITESPACE.replace_all(&stripped, " ").trim().to_string()
    }

    /// Extract keywords in order of appearance. Duplicates are kept.
    pub fn extract_keywords(text: &str) -> Vec<String> {
        normalize(text)
            .split(' ')
            .filter(|word| word.chars().count() > 1)
            .filter(|word| !STOP_WORDS.contains(word))
            .map(|word| word.to_string())
            .collect()
    }

    /// Number of whitespace separated words in the raw text
    pub fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Structural traits of a query (question form, imperative form)
pub mod structure {
    use super::*;

    /// Imperative / command terms, shared by feature extraction and generated rules
    pub const COMMAND_TERMS: &[&str] =
        &["해주세요", "확인", "조회", "분석", "해결", "check", "show", "analyze", "resolve", "list"];

    pub static QUESTION_MARK: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[?？]").expect("Invalid regex pattern"));

    pub static COMMAND: Lazy<Regex> = Lazy::new(|| {
        Regex::new(&format!("(?i)({})", command_alternation())).expect("Invalid regex pattern")
    });

    /// `a|b|c` alternation of the escaped command terms
    pub fn command_alternation() -> String {
        COMMAND_TERMS.iter().map(|term| regex::escape(term)).collect::<Vec<_>>().join("|")
    }

    pub fn has_question(text: &str) -> bool {
        QUESTION_MARK.is_match(text)
    }

    pub fn has_command(text: &str) -> bool {
        COMMAND.is_match(text)
    }
}

/// Placeholder scanning for `{{name}}` / `{{#if name}}` response templates
pub mod template {
    use super::*;
    use std::collections::BTreeSet;

    pub static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\{\{\s*(?:#if\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
            .expect("Invalid regex pattern")
    });

    pub static CONDITIONAL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?s)\{\{#if\s+([A-Za-z_][A-Za-z0-9_]*)\s*\}\}(.*?)(?:\{\{else\}\}(.*?))?\{\{/if\}\}",
        )
        .expect("Invalid regex pattern")
    });

    const KEYWORDS: &[&str] = &["else"];

    /// Names referenced by the template body
    pub fn placeholders(body: &str) -> BTreeSet<String> {
        PLACEHOLDER
            .captures_iter(body)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|name| !KEYWORDS.contains(name))
            .map(|name| name.to_string())
            .collect()
    }
}
