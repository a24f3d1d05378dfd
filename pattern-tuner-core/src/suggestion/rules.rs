//! Candidate rule synthesis for a question group

use regex_utils::structure;
use tracing::debug;

use crate::config::SuggesterConfig;
use crate::error::Result;
use crate::model::{QueryCategory, QuestionGroup, RuleKind, RulePattern};
use crate::suggestion::similarity::QueryFeatures;

const MAX_RULE_KEYWORDS: usize = 3;
const MAX_TEST_QUERIES: usize = 5;
/// Share of members that must carry a structural trait
const STRUCTURE_SHARE: f64 = 0.7;
const STRUCTURAL_CONFIDENCE: f64 = 0.75;
const SEMANTIC_CONFIDENCE: f64 = 0.8;

/// Fixed vocabulary per known category
const SEMANTIC_KEYWORDS: &[(QueryCategory, &[&str])] = &[
    (QueryCategory::Cpu, &["cpu", "프로세서", "사용률", "부하", "load"]),
    (QueryCategory::Memory, &["메모리", "memory", "ram", "사용량", "부족"]),
    (QueryCategory::Network, &["네트워크", "network", "통신", "연결", "지연", "latency"]),
    (QueryCategory::Storage, &["디스크", "disk", "storage", "용량", "저장"]),
    (QueryCategory::Log, &["로그", "log", "기록"]),
    (QueryCategory::Incident, &["에러", "error", "오류", "장애", "문제", "해결"]),
];

/// Up to three candidates (keyword, structural, semantic), keeping those
/// whose heuristic confidence reaches `confidence_threshold`.
pub fn generate_candidate_rules(
    group: &QuestionGroup,
    config: &SuggesterConfig,
) -> Result<Vec<RulePattern>> {
    let mut candidates = Vec::new();
    candidates.extend(keyword_rule(group)?);
    candidates.extend(structural_rule(group)?);
    candidates.extend(semantic_rule(group)?);

    let generated = candidates.len();
    candidates.retain(|rule| rule.confidence >= config.confidence_threshold);

    debug!(
        group = %group.group_key,
        category = %group.category,
        generated,
        kept = candidates.len(),
        "Candidate rules generated"
    );

    Ok(candidates)
}

fn keyword_rule(group: &QuestionGroup) -> Result<Option<RulePattern>> {
    let keywords: Vec<&str> =
        group.common_keywords.iter().take(MAX_RULE_KEYWORDS).map(String::as_str).collect();
    if keywords.is_empty() {
        return Ok(None);
    }

    let alternation = keywords.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
    // 0.6 + 0.1 per keyword, capped at 0.9
    let confidence = ((6 + keywords.len()) as f64 / 10.0).min(0.9);

    let rule = RulePattern::new(
        RuleKind::Keyword,
        format!("(?i)({})", alternation),
        format!("Questions mentioning {}", keywords.join(", ")),
        group.category,
        confidence,
    )?;
    Ok(Some(with_group_samples(rule, group)))
}

fn structural_rule(group: &QuestionGroup) -> Result<Option<RulePattern>> {
    if group.member_queries.is_empty() {
        return Ok(None);
    }

    let features: Vec<QueryFeatures> =
        group.member_queries.iter().map(|q| QueryFeatures::extract(q)).collect();
    let share = |count: usize| count as f64 / features.len() as f64;
    let commands = share(features.iter().filter(|f| f.has_command).count());
    let questions = share(features.iter().filter(|f| f.has_question).count());

    let (expression, form) = if commands >= STRUCTURE_SHARE {
        (format!("(?i)({})", structure::command_alternation()), "command")
    } else if questions >= STRUCTURE_SHARE {
        (r"[?？]\s*$".to_string(), "question")
    } else {
        return Ok(None);
    };

    let rule = RulePattern::new(
        RuleKind::Structural,
        expression,
        format!("{} queries in {} form", group.category.label(), form),
        group.category,
        STRUCTURAL_CONFIDENCE,
    )?;
    Ok(Some(with_group_samples(rule, group)))
}

fn semantic_rule(group: &QuestionGroup) -> Result<Option<RulePattern>> {
    let Some((_, vocabulary)) = SEMANTIC_KEYWORDS.iter().find(|(c, _)| *c == group.category) else {
        return Ok(None);
    };

    let alternation = vocabulary.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
    let rule = RulePattern::new(
        RuleKind::Semantic,
        format!("(?i)({})", alternation),
        format!("{} vocabulary", group.category.label()),
        group.category,
        SEMANTIC_CONFIDENCE,
    )?;
    Ok(Some(with_group_samples(rule, group)))
}

fn with_group_samples(rule: RulePattern, group: &QuestionGroup) -> RulePattern {
    let samples = group.member_queries.iter().take(MAX_TEST_QUERIES).cloned().collect();
    rule.with_samples(samples, group.frequency)
}
