//! Response template suggestion
//!
//! Each category has its own skeleton with a declared placeholder set. When
//! live context is available an extra context-aware template is assembled
//! section by section. Construction is additive and every template is
//! checked against the placeholder/body invariant before it is returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::error::{Result, TunerError};
use crate::model::{QueryCategory, QuestionGroup, ResponseTemplate};

const CATEGORY_EXAMPLES: usize = 3;
const CONTEXT_EXAMPLES: usize = 2;

struct Skeleton {
    body: &'static str,
    placeholders: &'static [&'static str],
}

const CPU_SKELETON: Skeleton = Skeleton {
    body: "**CPU status**\n\n\
           Current usage: {{cpu_usage}}%\n\
           Load average: {{load_average}}\n\
           Processes: {{process_count}}\n\n\
           {{#if high_cpu}}\n\
           High CPU usage detected\n\
           - Top processes: {{top_processes}}\n\
           - Recommended actions: {{recommendations}}\n\
           {{/if}}\n\n\
           Details:\n{{detailed_analysis}}",
    placeholders: &[
        "cpu_usage",
        "load_average",
        "process_count",
        "high_cpu",
        "top_processes",
        "recommendations",
        "detailed_analysis",
    ],
};

const MEMORY_SKELETON: Skeleton = Skeleton {
    body: "**Memory status**\n\n\
           Total: {{total_memory}}GB\n\
           In use: {{used_memory}}GB ({{memory_percentage}}%)\n\
           Available: {{available_memory}}GB\n\n\
           {{#if memory_warning}}\n\
           Memory pressure detected\n\
           - Recommended actions: {{memory_recommendations}}\n\
           {{/if}}\n\n\
           Top consumers:\n{{top_memory_processes}}",
    placeholders: &[
        "total_memory",
        "used_memory",
        "memory_percentage",
        "available_memory",
        "memory_warning",
        "memory_recommendations",
        "top_memory_processes",
    ],
};

const NETWORK_SKELETON: Skeleton = Skeleton {
    body: "**Network status**\n\n\
           Connection: {{connection_status}}\n\
           Latency: {{latency}}ms\n\
           Bandwidth usage: {{bandwidth_usage}}%\n\n\
           {{#if network_issues}}\n\
           Network issue detected\n\
           - Type: {{issue_type}}\n\
           - Affected services: {{affected_services}}\n\
           - Recommended actions: {{network_recommendations}}\n\
           {{/if}}\n\n\
           Details:\n{{network_details}}",
    placeholders: &[
        "connection_status",
        "latency",
        "bandwidth_usage",
        "network_issues",
        "issue_type",
        "affected_services",
        "network_recommendations",
        "network_details",
    ],
};

const STORAGE_SKELETON: Skeleton = Skeleton {
    body: "**Storage status**\n\n\
           Usage: {{disk_usage}}% of {{total_capacity}}GB\n\
           Free: {{free_capacity}}GB\n\n\
           {{#if disk_warning}}\n\
           Low disk space\n\
           - Largest paths: {{largest_paths}}\n\
           {{/if}}\n\n\
           Cleanup suggestions:\n{{cleanup_recommendations}}",
    placeholders: &[
        "disk_usage",
        "total_capacity",
        "free_capacity",
        "disk_warning",
        "largest_paths",
        "cleanup_recommendations",
    ],
};

const LOG_SKELETON: Skeleton = Skeleton {
    body: "**Log analysis**\n\n\
           Source: {{log_source}}\n\
           Window: {{time_window}}\n\
           Errors: {{error_count}}, warnings: {{warning_count}}\n\n\
           Notable entries:\n{{notable_entries}}\n\n\
           Summary:\n{{log_summary}}",
    placeholders: &[
        "log_source",
        "time_window",
        "error_count",
        "warning_count",
        "notable_entries",
        "log_summary",
    ],
};

const INCIDENT_SKELETON: Skeleton = Skeleton {
    body: "**Incident response**\n\n\
           Type: {{incident_type}}\n\
           Severity: {{severity_level}}\n\
           Impact: {{impact_scope}}\n\n\
           Immediate actions:\n{{immediate_actions}}\n\n\
           Step-by-step resolution:\n{{step_by_step_solution}}\n\n\
           Keep monitoring:\n{{monitoring_items}}",
    placeholders: &[
        "incident_type",
        "severity_level",
        "impact_scope",
        "immediate_actions",
        "step_by_step_solution",
        "monitoring_items",
    ],
};

const SERVER_SKELETON: Skeleton = Skeleton {
    body: "**Server overview**\n\n\
           Status: {{server_status}}\n\
           Uptime: {{uptime}}\n\
           System load: {{system_load}}\n\n\
           Key indicators:\n\
           - CPU: {{cpu_status}}\n\
           - Memory: {{memory_status}}\n\
           - Disk: {{disk_status}}\n\
           - Network: {{network_status}}\n\n\
           Recommended work:\n{{recommended_actions}}",
    placeholders: &[
        "server_status",
        "uptime",
        "system_load",
        "cpu_status",
        "memory_status",
        "disk_status",
        "network_status",
        "recommended_actions",
    ],
};

const GENERAL_SKELETON: Skeleton = Skeleton {
    body: "**Answer**\n\n\
           Request: {{user_query}}\n\
           Result: {{analysis_result}}\n\n\
           Details:\n{{detailed_information}}\n\n\
           Further help:\n{{additional_help}}",
    placeholders: &["user_query", "analysis_result", "detailed_information", "additional_help"],
};

fn skeleton(category: QueryCategory) -> &'static Skeleton {
    match category {
        QueryCategory::Cpu => &CPU_SKELETON,
        QueryCategory::Memory => &MEMORY_SKELETON,
        QueryCategory::Network => &NETWORK_SKELETON,
        QueryCategory::Storage => &STORAGE_SKELETON,
        QueryCategory::Log => &LOG_SKELETON,
        QueryCategory::Incident => &INCIDENT_SKELETON,
        QueryCategory::Server => &SERVER_SKELETON,
        QueryCategory::General => &GENERAL_SKELETON,
    }
}

/// Live aggregate data the host can pass along with a group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextData {
    #[serde(default)]
    pub servers: Option<Vec<ServerSnapshot>>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub error_logs: Option<Vec<ErrorLogEntry>>,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub name: String,
    pub online: bool,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub server: String,
    pub kind: String,
    pub message: String,
}

impl ContextData {
    /// Values for the context placeholders this data can fill on its own
    pub fn placeholder_values(&self) -> HashMap<String, String> {
        let mut values = HashMap::new();

        if let Some(servers) = &self.servers {
            let count = servers.len();
            let mean = |f: fn(&ServerSnapshot) -> f64| {
                if count == 0 { 0.0 } else { servers.iter().map(f).sum::<f64>() / count as f64 }
            };
            values.insert("server_count".to_string(), count.to_string());
            values.insert(
                "online_servers".to_string(),
                servers.iter().filter(|s| s.online).count().to_string(),
            );
            values.insert("avg_cpu".to_string(), format!("{:.1}", mean(|s| s.cpu_percent)));
            values.insert("avg_memory".to_string(), format!("{:.1}", mean(|s| s.memory_percent)));
        }

        if let Some(range) = &self.time_range {
            values.insert("start_time".to_string(), range.start.to_rfc3339());
            values.insert("end_time".to_string(), range.end.to_rfc3339());
        }

        if let Some(errors) = &self.error_logs {
            let kinds: BTreeSet<&str> = errors.iter().map(|e| e.kind.as_str()).collect();
            let servers: BTreeSet<&str> = errors.iter().map(|e| e.server.as_str()).collect();
            values.insert("has_errors".to_string(), (!errors.is_empty()).to_string());
            values.insert("error_count".to_string(), errors.len().to_string());
            values.insert("error_types".to_string(), kinds.into_iter().collect::<Vec<_>>().join(", "));
            values.insert(
                "affected_servers".to_string(),
                servers.into_iter().collect::<Vec<_>>().join(", "),
            );
        }

        values
    }

    fn is_korean(&self) -> bool {
        self.preferred_language.as_deref().is_some_and(|lang| lang.eq_ignore_ascii_case("ko"))
    }
}

struct TemplateBuilder {
    category: String,
    body: String,
    declared: BTreeSet<String>,
}

impl TemplateBuilder {
    fn new(category: impl Into<String>) -> Self {
        Self { category: category.into(), body: String::new(), declared: BTreeSet::new() }
    }

    fn section(mut self, text: &str, placeholders: &[&str]) -> Self {
        self.body.push_str(text);
        self.declared.extend(placeholders.iter().map(|p| p.to_string()));
        self
    }

    fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    fn build(self, group: &QuestionGroup, examples: usize) -> Result<ResponseTemplate> {
        let template = ResponseTemplate {
            id: Uuid::new_v4(),
            category: self.category,
            template_body: self.body,
            placeholders: self.declared,
            source_examples: group.member_queries.iter().take(examples).cloned().collect(),
            applicable_patterns: vec![group.group_key.clone()],
        };
        template.validate()?;
        Ok(template)
    }
}

pub fn suggest_response_templates(
    group: &QuestionGroup,
    context: Option<&ContextData>,
) -> Result<Vec<ResponseTemplate>> {
    let mut templates = vec![category_template(group)?];
    if let Some(context) = context {
        templates.push(context_template(group, context)?);
    }
    Ok(templates)
}

fn category_template(group: &QuestionGroup) -> Result<ResponseTemplate> {
    let skeleton = skeleton(group.category);
    TemplateBuilder::new(group.category.label())
        .section(skeleton.body, skeleton.placeholders)
        .build(group, CATEGORY_EXAMPLES)
}

fn context_template(group: &QuestionGroup, context: &ContextData) -> Result<ResponseTemplate> {
    let mut builder = TemplateBuilder::new("Context-aware analysis").section(
        "**Context-aware analysis**\n\nRequest: {{user_query}}\nContext: {{context_summary}}\n\n",
        &["user_query", "context_summary"],
    );

    if context.servers.is_some() {
        builder = builder
            .category("Live server analysis")
            .section(
                "**Servers**\n\
                 - Total: {{server_count}}\n\
                 - Online: {{online_servers}}\n\
                 - Average CPU: {{avg_cpu}}%\n\
                 - Average memory: {{avg_memory}}%\n\n",
                &["server_count", "online_servers", "avg_cpu", "avg_memory"],
            );
    }

    if context.time_range.is_some() {
        builder = builder.section("**Period**: {{start_time}} ~ {{end_time}}\n\n", &["start_time", "end_time"]);
    }

    if context.error_logs.is_some() {
        builder = builder
            .category("Error analysis and resolution")
            .section(
                "**Recent errors**\n\
                 {{#if has_errors}}\n\
                 - Count: {{error_count}}\n\
                 - Types: {{error_types}}\n\
                 - Affected servers: {{affected_servers}}\n\
                 {{else}}\n\
                 - No recent critical errors\n\
                 {{/if}}\n\n",
                &["has_errors", "error_count", "error_types", "affected_servers"],
            );
    }

    if context.preferred_language.is_some() {
        builder = if context.is_korean() {
            builder.section("**상세 분석**:\n{{detailed_analysis_ko}}\n\n", &["detailed_analysis_ko"])
        } else {
            builder.section("**Detailed analysis**:\n{{detailed_analysis_en}}\n\n", &["detailed_analysis_en"])
        };
    }

    builder = match group.category {
        QueryCategory::Cpu => builder
            .section("**CPU optimization**:\n{{cpu_optimization}}\n\n", &["cpu_optimization"]),
        QueryCategory::Memory => builder
            .section("**Memory optimization**:\n{{memory_optimization}}\n\n", &["memory_optimization"]),
        QueryCategory::Network => builder
            .section("**Network optimization**:\n{{network_optimization}}\n\n", &["network_optimization"]),
        _ => builder,
    };

    builder
        .section(
            "**Recommended actions**:\n{{recommended_actions}}\n\n\
             **Additional monitoring**:\n{{additional_monitoring}}",
            &["recommended_actions", "additional_monitoring"],
        )
        .build(group, CONTEXT_EXAMPLES)
}

/// Checks a body against a declared placeholder list, used for host-supplied skeletons
pub fn check_placeholders(category: &str, body: &str, declared: &[&str]) -> Result<()> {
    let declared: BTreeSet<String> = declared.iter().map(|p| p.to_string()).collect();
    if regex_utils::template::placeholders(body) == declared {
        Ok(())
    } else {
        Err(TunerError::InvalidTemplate {
            category: category.to_string(),
            message: "declared placeholders do not match the body".to_string(),
        })
    }
}
