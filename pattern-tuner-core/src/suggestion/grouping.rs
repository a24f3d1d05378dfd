//! Greedy grouping of similar queries
//!
//! Single pass in input order: each query that is not yet part of an emitted
//! group seeds a candidate group made of every other query that scores at
//! least `similarity_threshold` against the seed, including queries already
//! grouped. Groups may therefore overlap. The result depends on input order
//! and is not a maximal clustering.

use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::analysis::QueryClassifier;
use crate::config::SuggesterConfig;
use crate::model::QuestionGroup;
use crate::suggestion::similarity::{QueryFeatures, similarity};

/// Share of members a keyword must appear in to count as common
const COMMON_KEYWORD_SHARE: f64 = 0.3;
const MAX_COMMON_KEYWORDS: usize = 10;
const GROUP_KEY_KEYWORDS: usize = 3;
const DEFAULT_GROUP_KEY: &str = "general_query";

pub fn group_similar_queries(
    queries: &[String],
    config: &SuggesterConfig,
    classifier: &QueryClassifier,
) -> Vec<QuestionGroup> {
    if queries.len() < config.min_group_size {
        debug!(queries = queries.len(), "Too few queries to form a group");
        return Vec::new();
    }

    let features: Vec<QueryFeatures> = queries.iter().map(|q| QueryFeatures::extract(q)).collect();
    let mut processed = vec![false; queries.len()];
    let mut groups = Vec::new();

    for seed in 0..queries.len() {
        if processed[seed] {
            continue;
        }

        let mut members = vec![seed];
        for candidate in 0..queries.len() {
            if candidate == seed {
                continue;
            }
            if similarity(&features[seed], &features[candidate]) >= config.similarity_threshold {
                members.push(candidate);
            }
        }

        if members.len() < config.min_group_size {
            continue;
        }

        for &member in &members {
            processed[member] = true;
        }
        groups.push(build_group(&members, queries, &features, classifier));
    }

    groups.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    groups.truncate(config.max_suggestions);

    debug!(
        queries = queries.len(),
        groups = groups.len(),
        grouped = groups.iter().map(|g| g.frequency).sum::<usize>(),
        "Query grouping complete"
    );

    groups
}

fn build_group(
    members: &[usize],
    queries: &[String],
    features: &[QueryFeatures],
    classifier: &QueryClassifier,
) -> QuestionGroup {
    let member_queries: Vec<String> = members.iter().map(|&i| queries[i].clone()).collect();
    let keyword_lists: Vec<&[String]> = members.iter().map(|&i| features[i].keywords.as_slice()).collect();
    let common_keywords = common_keywords(&keyword_lists);

    let group_key = if common_keywords.is_empty() {
        DEFAULT_GROUP_KEY.to_string()
    } else {
        common_keywords.iter().take(GROUP_KEY_KEYWORDS).cloned().collect::<Vec<_>>().join("_")
    };

    QuestionGroup {
        id: Uuid::new_v4(),
        group_key,
        frequency: member_queries.len(),
        member_queries,
        category: classifier.category_of_keywords(&common_keywords),
        common_keywords,
    }
}

/// Keywords present in at least 30% of the members, by number of members
/// containing them, ties broken by first appearance
pub fn common_keywords(keyword_lists: &[&[String]]) -> Vec<String> {
    let min_members = (keyword_lists.len() as f64 * COMMON_KEYWORD_SHARE).ceil() as usize;

    // keyword -> (members containing it, first appearance)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut position = 0;
    for keywords in keyword_lists {
        let mut seen: Vec<&str> = Vec::new();
        for keyword in keywords.iter() {
            if seen.contains(&keyword.as_str()) {
                continue;
            }
            seen.push(keyword);
            let entry = counts.entry(keyword).or_insert((0, position));
            entry.0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .filter(|(_, (count, _))| *count >= min_members.max(1))
        .map(|(keyword, (count, first))| (keyword, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked.into_iter().take(MAX_COMMON_KEYWORDS).map(|(keyword, _, _)| keyword.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueryCategory;

    fn queries(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_groups_similar_queries() {
        let input = queries(&[
            "memory usage check",
            "memory usage status",
            "restart the payment service",
            "memory usage check now",
            "memory usage check?",
        ]);

        let groups = group_similar_queries(&input, &SuggesterConfig::default(), &QueryClassifier::default());
        assert_eq!(groups.len(), 1);

        let group = &groups[0];
        assert_eq!(group.frequency, group.member_queries.len());
        assert!(group.frequency >= 3);
        assert!(!group.member_queries.contains(&"restart the payment service".to_string()));
        assert_eq!(group.common_keywords[0], "memory");
        assert_eq!(group.category, QueryCategory::Memory);
        assert!(group.group_key.starts_with("memory_usage"));
    }

    #[test]
    fn test_small_groups_are_not_emitted() {
        let input = queries(&["cpu 확인", "cpu 확인", "디스크 용량이 얼마나 남았나요?"]);
        let config = SuggesterConfig { min_group_size: 3, ..Default::default() };
        assert!(group_similar_queries(&input, &config, &QueryClassifier::default()).is_empty());

        let config = SuggesterConfig { min_group_size: 2, ..Default::default() };
        let groups = group_similar_queries(&input, &config, &QueryClassifier::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].frequency, 2);
    }

    #[test]
    fn test_later_seed_reuses_grouped_queries() {
        let input = queries(&[
            "cpu usage check",
            "cpu usage status",
            "cpu usage check now",
            "disk usage check now",
            "disk space check now",
        ]);

        let groups = group_similar_queries(&input, &SuggesterConfig::default(), &QueryClassifier::default());
        assert_eq!(groups.len(), 2);

        let disk = groups
            .iter()
            .find(|g| g.member_queries[0] == "disk space check now")
            .unwrap();
        assert_eq!(disk.frequency, 3);
        assert!(disk.member_queries.contains(&"cpu usage check now".to_string()));
        assert!(disk.member_queries.contains(&"disk usage check now".to_string()));

        let cpu = groups.iter().find(|g| g.member_queries[0] == "cpu usage check").unwrap();
        assert!(cpu.member_queries.contains(&"disk usage check now".to_string()));
        assert!(!cpu.member_queries.contains(&"disk space check now".to_string()));
    }

    #[test]
    fn test_insufficient_input_returns_empty() {
        let input = queries(&["cpu 확인"]);
        assert!(group_similar_queries(&input, &SuggesterConfig::default(), &QueryClassifier::default()).is_empty());
    }

    #[test]
    fn test_common_keywords_ranking() {
        let a = queries(&["cpu", "load"]);
        let b = queries(&["cpu", "usage", "usage"]);
        let c = queries(&["cpu", "usage"]);
        let lists = vec![a.as_slice(), b.as_slice(), c.as_slice()];

        assert_eq!(common_keywords(&lists), vec!["cpu", "usage", "load"]);
    }
}
