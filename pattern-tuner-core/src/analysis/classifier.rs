//! Table-driven query classification
//!
//! A query is classified by the first domain rule and the first action rule
//! with a keyword that starts one of its normalized tokens. Prefix matching
//! lets Korean keywords match with attached particles ("메모리가") without
//! letting short English keywords match inside unrelated words.

use serde::{Deserialize, Serialize};

use crate::model::QueryCategory;

pub const DEFAULT_DOMAIN: &str = "general";
pub const DEFAULT_ACTION: &str = "query";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRule {
    pub label: String,
    pub category: QueryCategory,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRule {
    pub label: String,
    pub keywords: Vec<String>,
    /// Improvement hint, completed with the category label
    pub improvement: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub domain: String,
    pub action: String,
    pub category: QueryCategory,
}

impl Classification {
    pub fn pattern_key(&self) -> String {
        format!("{}_{}", self.domain, self.action)
    }
}

const DOMAIN_TABLE: &[(&str, QueryCategory, &[&str])] = &[
    ("cpu", QueryCategory::Cpu, &["cpu", "프로세서", "processor"]),
    ("memory", QueryCategory::Memory, &["메모리", "memory", "ram"]),
    ("network", QueryCategory::Network, &["네트워크", "network", "통신", "latency", "지연"]),
    ("storage", QueryCategory::Storage, &["디스크", "disk", "storage", "저장"]),
    ("log", QueryCategory::Log, &["로그", "log", "기록"]),
    ("incident", QueryCategory::Incident, &["에러", "error", "장애", "오류", "incident", "failure"]),
    ("server", QueryCategory::Server, &["서버", "server", "시스템", "system"]),
];

const ACTION_TABLE: &[(&str, &[&str], &str)] = &[
    ("check", &["확인", "조회", "check", "show", "status", "상태"], "Add a direct status lookup rule"),
    ("analyze", &["분석", "analyze", "analysis", "원인", "cause"], "Add root-cause analysis handling"),
    ("resolve", &["해결", "복구", "fix", "resolve", "restart", "재시작"], "Add a troubleshooting response"),
    ("monitor", &["모니터링", "monitor", "watch", "추이", "trend"], "Add trend and monitoring responses"),
    ("predict", &["예측", "predict", "forecast"], "Add forecasting support"),
    ("optimize", &["최적화", "optimize", "tune", "개선"], "Add optimization guidance"),
];

const DEFAULT_IMPROVEMENT: &str = "Review and extend matching rules";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryClassifier {
    pub domains: Vec<DomainRule>,
    pub actions: Vec<ActionRule>,
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self {
            domains: DOMAIN_TABLE
                .iter()
                .map(|(label, category, keywords)| DomainRule {
                    label: label.to_string(),
                    category: *category,
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                })
                .collect(),
            actions: ACTION_TABLE
                .iter()
                .map(|(label, keywords, improvement)| ActionRule {
                    label: label.to_string(),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                    improvement: improvement.to_string(),
                })
                .collect(),
        }
    }
}

impl QueryClassifier {
    pub fn new(domains: Vec<DomainRule>, actions: Vec<ActionRule>) -> Self {
        Self { domains, actions }
    }

    pub fn classify(&self, query: &str) -> Classification {
        let normalized = regex_utils::text::normalize(query);
        let tokens: Vec<&str> = normalized.split(' ').collect();

        let domain = self.domains.iter().find(|rule| matches_any(&tokens, &rule.keywords));
        let action = self.actions.iter().find(|rule| matches_any(&tokens, &rule.keywords));

        Classification {
            domain: domain.map_or(DEFAULT_DOMAIN, |d| d.label.as_str()).to_string(),
            action: action.map_or(DEFAULT_ACTION, |a| a.label.as_str()).to_string(),
            category: domain.map_or(QueryCategory::General, |d| d.category),
        }
    }

    pub fn category_of(&self, query: &str) -> QueryCategory {
        self.classify(query).category
    }

    /// Category of an already extracted keyword set
    pub fn category_of_keywords(&self, keywords: &[String]) -> QueryCategory {
        let tokens: Vec<&str> = keywords.iter().map(String::as_str).collect();
        self.domains
            .iter()
            .find(|rule| matches_any(&tokens, &rule.keywords))
            .map_or(QueryCategory::General, |rule| rule.category)
    }

    pub fn suggested_improvement(&self, classification: &Classification) -> String {
        let hint = self
            .actions
            .iter()
            .find(|a| a.label == classification.action)
            .map_or(DEFAULT_IMPROVEMENT, |a| a.improvement.as_str());
        format!("{} for {} queries", hint, classification.category.label().to_lowercase())
    }
}

impl QueryCategory {
    /// Category of a keyword set using the default table
    pub fn from_keywords(keywords: &[String]) -> Self {
        QueryClassifier::default().category_of_keywords(keywords)
    }
}

fn matches_any(tokens: &[&str], keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| tokens.iter().any(|token| token.starts_with(keyword.as_str())))
}
