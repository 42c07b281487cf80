//! Field mappings between external trackers and local todos.
//!
//! Everything here is a pure function over plain values, so the sync
//! engine stays deterministic and the mappings can be tested without a
//! transport.

use crate::types::{Priority, Status};
use serde_json::Value;

/// GitHub encodes priority as labels.
pub fn priority_from_github(labels: &[String]) -> Priority {
    let has = |needle: &str| labels.iter().any(|l| l.eq_ignore_ascii_case(needle));
    if has("priority:high") || has("urgent") {
        Priority::High
    } else if has("priority:low") {
        Priority::Low
    } else {
        Priority::Medium
    }
}

/// Linear priority scale: 1 is urgent, 4 is low, 0 means unset.
pub fn priority_from_linear(priority: Option<i64>) -> Priority {
    match priority {
        Some(1) => Priority::High,
        Some(4) => Priority::Low,
        _ => Priority::Medium,
    }
}

/// JIRA priority names vary per instance; match on keywords.
pub fn priority_from_jira(name: &str) -> Priority {
    let name = name.to_lowercase();
    if name.contains("high") || name.contains("critical") || name.contains("blocker") {
        Priority::High
    } else if name.contains("low") || name.contains("trivial") {
        Priority::Low
    } else {
        Priority::Medium
    }
}

/// GitHub issues are only ever open or closed.
pub fn status_from_github(state: &str) -> Status {
    if state.eq_ignore_ascii_case("closed") {
        Status::Done
    } else {
        Status::Todo
    }
}

pub fn status_from_linear(state_name: &str) -> Status {
    status_from_keywords(state_name)
}

pub fn status_from_jira(status_name: &str) -> Status {
    status_from_keywords(status_name)
}

/// Workflow state names are free-form in Linear and JIRA; classify by
/// keyword.
fn status_from_keywords(name: &str) -> Status {
    let name = name.to_lowercase();
    if name.contains("done")
        || name.contains("closed")
        || name.contains("resolved")
        || name.contains("complete")
    {
        Status::Done
    } else if name.contains("progress") || name.contains("review") || name.contains("development") {
        Status::InProgress
    } else {
        Status::Todo
    }
}

/// GitHub labels become tags, minus the priority markers we already map.
pub fn tags_from_github(labels: &[String]) -> String {
    labels
        .iter()
        .filter(|l| !l.to_lowercase().starts_with("priority:"))
        .map(|l| l.to_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

/// Linear labels arrive as a connection object: `{"nodes": [{"name": ..}]}`.
pub fn tags_from_linear(labels: &Value) -> String {
    labels["nodes"]
        .as_array()
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|node| node["name"].as_str())
                .map(str::to_string)
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// JIRA tags combine labels, the issue type, and component names,
/// all lowercased.
pub fn tags_from_jira(fields: &Value) -> String {
    let mut tags: Vec<String> = Vec::new();

    if let Some(labels) = fields["labels"].as_array() {
        tags.extend(labels.iter().filter_map(|l| l.as_str()).map(str::to_lowercase));
    }
    if let Some(issue_type) = fields["issuetype"]["name"].as_str() {
        tags.push(issue_type.to_lowercase());
    }
    if let Some(components) = fields["components"].as_array() {
        tags.extend(
            components
                .iter()
                .filter_map(|c| c["name"].as_str())
                .map(str::to_lowercase),
        );
    }

    tags.join(",")
}

/// GitHub returns labels as objects from the API but adapters sometimes
/// flatten them to strings; accept both.
pub fn github_label_names(labels: &Value) -> Vec<String> {
    labels
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|label| {
                    label
                        .as_str()
                        .or_else(|| label["name"].as_str())
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn status_to_github(status: Status) -> &'static str {
    if status.is_done() { "closed" } else { "open" }
}

pub fn status_to_linear(status: Status) -> &'static str {
    match status {
        Status::Todo => "Todo",
        Status::InProgress => "In Progress",
        Status::Done => "Done",
    }
}

pub fn status_to_jira(status: Status) -> &'static str {
    match status {
        Status::Todo => "To Do",
        Status::InProgress => "In Progress",
        Status::Done => "Done",
    }
}
