//! Sync between local todos and external issue trackers.
//!
//! Each integration is described by a static [`IntegrationSpec`]: which
//! adapter to talk to, which tools to call, and which metadata key marks
//! a todo as linked. The engine enforces at-most-once linking by checking
//! that key before any adapter call, never retries a failed call, and
//! paces bulk creation so adapters are not hammered.

use crate::mapping;
use crate::store::Store;
use crate::transport::AdapterTransport;
use crate::types::{AddOptions, Metadata, Priority, Status, Todo, TodoPatch};
use chrono::{DateTime, Utc};
use eyre::Result;
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Delay paid before each bulk create call.
const DEFAULT_PACING: Duration = Duration::from_millis(500);

/// Supported issue trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integration {
    Github,
    Linear,
    Jira,
}

/// How one tracker is wired: adapter name, tool names, and the metadata
/// key that links a todo to one of its issues.
pub struct IntegrationSpec {
    pub display: &'static str,
    pub server: &'static str,
    pub create_tool: &'static str,
    pub update_tool: &'static str,
    pub search_tool: &'static str,
    pub link_key: &'static str,
}

static GITHUB_SPEC: IntegrationSpec = IntegrationSpec {
    display: "GitHub",
    server: "github",
    create_tool: "create_issue",
    update_tool: "update_issue",
    search_tool: "search_issues",
    link_key: "issue_number",
};

static LINEAR_SPEC: IntegrationSpec = IntegrationSpec {
    display: "Linear",
    server: "linear",
    create_tool: "linear_create_issue",
    update_tool: "linear_update_issue",
    search_tool: "linear_search_issues",
    link_key: "issue_id",
};

static JIRA_SPEC: IntegrationSpec = IntegrationSpec {
    display: "JIRA",
    server: "jira",
    create_tool: "jira_create_issue",
    update_tool: "jira_update_issue",
    search_tool: "jira_search_issues",
    link_key: "jira_key",
};

impl Integration {
    /// Every integration, in the order status sync fans out.
    pub const ALL: [Integration; 3] = [Integration::Github, Integration::Linear, Integration::Jira];

    /// Lowercase identifier used in config files and CLI arguments.
    pub fn key(&self) -> &'static str {
        self.spec().server
    }

    /// Parse a CLI or config identifier.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        match raw.to_lowercase().as_str() {
            "github" => Ok(Integration::Github),
            "linear" => Ok(Integration::Linear),
            "jira" => Ok(Integration::Jira),
            _ => Err(SyncError::UnknownIntegration(raw.to_string())),
        }
    }

    pub fn spec(&self) -> &'static IntegrationSpec {
        match self {
            Integration::Github => &GITHUB_SPEC,
            Integration::Linear => &LINEAR_SPEC,
            Integration::Jira => &JIRA_SPEC,
        }
    }

    /// Metadata key whose presence means "already linked".
    pub fn link_key(&self) -> &'static str {
        self.spec().link_key
    }

    /// Metadata key holding the external issue URL.
    pub fn url_key(&self) -> String {
        format!("{}_url", self.key())
    }

    /// Metadata key holding the link timestamp.
    pub fn linked_at_key(&self) -> String {
        format!("{}_linked_at", self.key())
    }

    /// Typed read of this integration's link from a metadata map.
    pub fn link(&self, metadata: &Metadata) -> Option<ExternalLink> {
        let id = metadata.get(self.link_key())?.clone();
        Some(ExternalLink {
            integration: *self,
            id,
            url: metadata
                .get(&self.url_key())
                .and_then(Value::as_str)
                .map(str::to_string),
            linked_at: metadata
                .get(&self.linked_at_key())
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|stamp| stamp.with_timezone(&Utc)),
        })
    }
}

impl std::fmt::Display for Integration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.spec().display)
    }
}

/// Errors that can occur during sync operations.
#[derive(Debug)]
pub enum SyncError {
    /// Integration name not recognized.
    UnknownIntegration(String),
    /// Todo id does not exist.
    TodoNotFound(i64),
    /// Todo is already linked to this tracker.
    AlreadyLinked { id: i64, integration: Integration },
    /// Adapter reported a failure or returned a malformed response.
    Adapter(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::UnknownIntegration(name) => {
                write!(f, "unknown integration: {} (expected github, linear, or jira)", name)
            }
            SyncError::TodoNotFound(id) => write!(f, "todo not found: {}", id),
            SyncError::AlreadyLinked { id, integration } => {
                write!(f, "todo {} is already linked to {}", id, integration)
            }
            SyncError::Adapter(message) => write!(f, "adapter error: {}", message),
        }
    }
}

impl std::error::Error for SyncError {}

/// An issue created on or imported from a tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalIssue {
    /// Tracker-native identifier: a number for GitHub, a string for
    /// Linear and JIRA.
    pub id: Value,
    pub url: Option<String>,
}

/// One integration's link state, read out of a todo's metadata. The raw
/// keys stay in the open map; this is the typed view of the known subset.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalLink {
    pub integration: Integration,
    pub id: Value,
    pub url: Option<String>,
    pub linked_at: Option<DateTime<Utc>>,
}

impl ExternalLink {
    /// Every link present in a metadata map, in fan-out order.
    pub fn all(metadata: &Metadata) -> Vec<ExternalLink> {
        Integration::ALL
            .iter()
            .filter_map(|integration| integration.link(metadata))
            .collect()
    }
}

/// Outcome of a status fan-out.
#[derive(Debug, Default)]
pub struct StatusSyncReport {
    pub synced: Vec<Integration>,
    pub errors: Vec<(Integration, String)>,
}

/// Outcome of a paced bulk create.
#[derive(Debug, Default)]
pub struct BulkCreateReport {
    pub created: Vec<(i64, ExternalIssue)>,
    pub errors: Vec<(i64, String)>,
}

/// Outcome of an import.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<i64>,
    pub skipped: usize,
}

/// Narrows which todos a bulk create picks up.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkFilter {
    pub priority: Option<Priority>,
    pub status: Option<Status>,
}

/// Drives sync flows against a store and an adapter transport.
pub struct SyncEngine<'a, T: AdapterTransport> {
    store: &'a mut Store,
    transport: T,
    pacing: Duration,
}

impl<'a, T: AdapterTransport> SyncEngine<'a, T> {
    pub fn new(store: &'a mut Store, transport: T) -> Self {
        Self {
            store,
            transport,
            pacing: DEFAULT_PACING,
        }
    }

    /// Override the bulk create pacing delay.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Create an issue on the tracker for one todo and record the link in
    /// its metadata. Fails without calling the adapter when the todo is
    /// already linked there.
    pub fn create_external_issue(&mut self, id: i64, integration: Integration) -> Result<ExternalIssue> {
        let spec = integration.spec();

        let Some(todo) = self.store.get(id)? else {
            return Err(eyre::eyre!(SyncError::TodoNotFound(id)));
        };
        if todo.metadata.contains_key(spec.link_key) {
            return Err(eyre::eyre!(SyncError::AlreadyLinked { id, integration }));
        }

        let response = self
            .transport
            .call_tool(spec.server, spec.create_tool, create_payload(&todo))?;
        let issue = parse_create_response(integration, &response)?;

        log::info!("Linked todo {} to {} issue {}", id, integration, issue.id);
        self.record_link(&todo, integration, &issue)?;

        Ok(issue)
    }

    /// Push a status to every tracker the todo is linked to. Each
    /// integration succeeds or fails independently; one tracker rejecting
    /// the update does not stop the fan-out.
    pub fn sync_external_status(&mut self, id: i64, status: Status) -> Result<StatusSyncReport> {
        let Some(todo) = self.store.get(id)? else {
            return Err(eyre::eyre!(SyncError::TodoNotFound(id)));
        };

        let mut report = StatusSyncReport::default();
        for integration in Integration::ALL {
            let spec = integration.spec();
            let Some(link) = integration.link(&todo.metadata) else {
                continue;
            };

            let payload = update_payload(integration, &link.id, status);
            match self.transport.call_tool(spec.server, spec.update_tool, payload) {
                Ok(response) if adapter_ok(&response) => report.synced.push(integration),
                Ok(response) => {
                    let message = adapter_error(&response);
                    log::warn!("{} status sync failed for todo {}: {}", integration, id, message);
                    report.errors.push((integration, message));
                }
                Err(e) => {
                    log::warn!("{} status sync failed for todo {}: {}", integration, id, e);
                    report.errors.push((integration, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Create issues for every unlinked todo matching the filter, pausing
    /// before each call. A failed todo is reported and skipped, not
    /// retried.
    pub fn bulk_create_external_issues(
        &mut self,
        integration: Integration,
        filter: &BulkFilter,
    ) -> Result<BulkCreateReport> {
        let link_key = integration.link_key();
        let candidates: Vec<Todo> = self
            .store
            .get_all()?
            .into_iter()
            .filter(|todo| !todo.metadata.contains_key(link_key))
            .filter(|todo| filter.priority.is_none_or(|p| todo.priority == p))
            .filter(|todo| filter.status.is_none_or(|s| todo.status == s))
            .collect();

        let mut report = BulkCreateReport::default();
        for todo in &candidates {
            std::thread::sleep(self.pacing);
            match self.create_external_issue(todo.id, integration) {
                Ok(issue) => report.created.push((todo.id, issue)),
                Err(e) => {
                    log::warn!("Bulk create failed for todo {}: {}", todo.id, e);
                    report.errors.push((todo.id, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Search the tracker and add each hit as a local todo. Issues whose
    /// id is already linked locally are skipped, so re-imports are safe.
    pub fn import_external_issues(&mut self, integration: Integration, query: &str) -> Result<ImportReport> {
        let spec = integration.spec();

        let response = self
            .transport
            .call_tool(spec.server, spec.search_tool, json!({ "query": query }))?;
        if !adapter_ok(&response) {
            return Err(eyre::eyre!(SyncError::Adapter(adapter_error(&response))));
        }

        let issues = response["issues"].as_array().cloned().unwrap_or_default();
        let mut report = ImportReport::default();

        for issue in &issues {
            let Some(external_id) = external_id(integration, issue) else {
                log::warn!("Skipping {} issue with no id during import", integration);
                report.skipped += 1;
                continue;
            };

            if self.store.find_by_metadata(spec.link_key, &external_id)?.is_some() {
                report.skipped += 1;
                continue;
            }

            let id = self.import_issue(integration, issue, &external_id)?;
            report.imported.push(id);
        }

        Ok(report)
    }

    fn record_link(&mut self, todo: &Todo, integration: Integration, issue: &ExternalIssue) -> Result<()> {
        let mut metadata = todo.metadata.clone();
        metadata.insert(integration.link_key(), issue.id.clone());
        if let Some(url) = &issue.url {
            metadata.insert(integration.url_key(), json!(url));
        }
        metadata.insert(integration.linked_at_key(), json!(Utc::now().to_rfc3339()));
        metadata.insert("external_sync", json!(true));

        self.store.update(todo.id, TodoPatch::default().metadata(metadata))?;
        Ok(())
    }

    fn import_issue(&mut self, integration: Integration, issue: &Value, external_id: &Value) -> Result<i64> {
        let parsed = parse_external_issue(integration, issue);

        let mut metadata = Metadata::new();
        metadata.insert(integration.link_key(), external_id.clone());
        if let Some(url) = &parsed.url {
            metadata.insert(integration.url_key(), json!(url));
        }
        metadata.insert(integration.linked_at_key(), json!(Utc::now().to_rfc3339()));
        metadata.insert("external_sync", json!(true));
        metadata.insert("source", json!("external_import"));

        let content = if parsed.body.is_empty() {
            parsed.title.clone()
        } else {
            format!("{}\n\n{}", parsed.title, parsed.body)
        };

        let options = AddOptions {
            title: Some(parsed.title),
            status: Some(parsed.status),
            priority: Some(parsed.priority),
            tags: Some(parsed.tags),
            metadata: Some(metadata),
            ..Default::default()
        };

        self.store.add(&content, options)
    }
}

/// Fixed payload shape for create tools, shared by every integration.
fn create_payload(todo: &Todo) -> Value {
    let mut payload = json!({
        "title": todo.title,
        "body": todo.content,
        "priority": todo.priority.as_str(),
        "tags": todo.tags,
    });
    if let Some(path) = &todo.file_path {
        payload["file_path"] = json!(path);
    }
    if let Some(line) = todo.line_number {
        payload["line_number"] = json!(line);
    }
    payload
}

fn update_payload(integration: Integration, external_id: &Value, status: Status) -> Value {
    let mut payload = Map::new();
    payload.insert(integration.link_key().to_string(), external_id.clone());
    match integration {
        Integration::Github => {
            payload.insert("state".to_string(), json!(mapping::status_to_github(status)));
        }
        Integration::Linear => {
            payload.insert("status".to_string(), json!(mapping::status_to_linear(status)));
        }
        Integration::Jira => {
            payload.insert("status".to_string(), json!(mapping::status_to_jira(status)));
        }
    }
    Value::Object(payload)
}

/// Adapters wrap tool results in `{"success": bool, ...}` with an
/// `error` string on failure.
fn adapter_ok(response: &Value) -> bool {
    response["success"].as_bool().unwrap_or(false)
}

fn adapter_error(response: &Value) -> String {
    response["error"]
        .as_str()
        .unwrap_or("unknown adapter failure")
        .to_string()
}

fn parse_create_response(integration: Integration, response: &Value) -> Result<ExternalIssue> {
    if !adapter_ok(response) {
        return Err(eyre::eyre!(SyncError::Adapter(adapter_error(response))));
    }

    let issue = &response["issue"];
    let id = external_id(integration, issue).ok_or_else(|| {
        eyre::eyre!(SyncError::Adapter(format!(
            "{} create response carried no issue id",
            integration
        )))
    })?;
    let url = issue["url"]
        .as_str()
        .or_else(|| issue["html_url"].as_str())
        .map(str::to_string);

    Ok(ExternalIssue { id, url })
}

fn non_null(issue: &Value, key: &str) -> Option<Value> {
    issue.get(key).filter(|v| !v.is_null()).cloned()
}

/// Tracker-native id field of an issue object.
fn external_id(integration: Integration, issue: &Value) -> Option<Value> {
    match integration {
        Integration::Github => non_null(issue, "number"),
        Integration::Linear => non_null(issue, "identifier").or_else(|| non_null(issue, "id")),
        Integration::Jira => non_null(issue, "key"),
    }
}

/// Issue fields mapped to local vocabulary, ready to add.
struct ParsedIssue {
    title: String,
    body: String,
    status: Status,
    priority: Priority,
    tags: String,
    url: Option<String>,
}

fn parse_external_issue(integration: Integration, issue: &Value) -> ParsedIssue {
    match integration {
        Integration::Github => {
            let labels = mapping::github_label_names(&issue["labels"]);
            ParsedIssue {
                title: issue["title"].as_str().unwrap_or("Untitled").to_string(),
                body: issue["body"].as_str().unwrap_or("").to_string(),
                status: mapping::status_from_github(issue["state"].as_str().unwrap_or("open")),
                priority: mapping::priority_from_github(&labels),
                tags: mapping::tags_from_github(&labels),
                url: issue["html_url"]
                    .as_str()
                    .or_else(|| issue["url"].as_str())
                    .map(str::to_string),
            }
        }
        Integration::Linear => ParsedIssue {
            title: issue["title"].as_str().unwrap_or("Untitled").to_string(),
            body: issue["description"].as_str().unwrap_or("").to_string(),
            status: mapping::status_from_linear(issue["state"]["name"].as_str().unwrap_or("")),
            priority: mapping::priority_from_linear(issue["priority"].as_i64()),
            tags: mapping::tags_from_linear(&issue["labels"]),
            url: issue["url"].as_str().map(str::to_string),
        },
        Integration::Jira => {
            // JIRA search results nest everything under "fields"; accept
            // flattened objects too.
            let fields = if issue["fields"].is_object() {
                &issue["fields"]
            } else {
                issue
            };
            ParsedIssue {
                title: fields["summary"].as_str().unwrap_or("Untitled").to_string(),
                body: fields["description"].as_str().unwrap_or("").to_string(),
                status: mapping::status_from_jira(fields["status"]["name"].as_str().unwrap_or("")),
                priority: mapping::priority_from_jira(fields["priority"]["name"].as_str().unwrap_or("")),
                tags: mapping::tags_from_jira(fields),
                url: issue["url"]
                    .as_str()
                    .or_else(|| fields["url"].as_str())
                    .map(str::to_string),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integration_parse() {
        assert_eq!(Integration::parse("github").unwrap(), Integration::Github);
        assert_eq!(Integration::parse("Linear").unwrap(), Integration::Linear);
        assert_eq!(Integration::parse("JIRA").unwrap(), Integration::Jira);
        assert!(Integration::parse("gitlab").is_err());
    }

    #[test]
    fn test_metadata_keys_per_integration() {
        assert_eq!(Integration::Github.link_key(), "issue_number");
        assert_eq!(Integration::Linear.link_key(), "issue_id");
        assert_eq!(Integration::Jira.link_key(), "jira_key");
        assert_eq!(Integration::Github.url_key(), "github_url");
        assert_eq!(Integration::Jira.linked_at_key(), "jira_linked_at");
    }

    #[test]
    fn test_link_view_reads_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("issue_number", json!(12));
        metadata.insert("github_url", json!("https://github.test/12"));
        metadata.insert("github_linked_at", json!("2026-02-01T10:00:00+00:00"));

        let link = Integration::Github.link(&metadata).unwrap();
        assert_eq!(link.id, json!(12));
        assert_eq!(link.url.as_deref(), Some("https://github.test/12"));
        assert!(link.linked_at.is_some());
        assert!(Integration::Linear.link(&metadata).is_none());

        let all = ExternalLink::all(&metadata);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].integration, Integration::Github);
    }

    #[test]
    fn test_create_payload_shape() {
        let now = Utc::now();
        let todo = Todo {
            id: 3,
            title: "Fix flaky test".to_string(),
            content: "Fix flaky test\nTimes out under load".to_string(),
            status: Status::Todo,
            priority: Priority::High,
            tags: "ci".to_string(),
            file_path: Some("tests/io.rs".to_string()),
            line_number: Some(41),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let payload = create_payload(&todo);
        assert_eq!(payload["title"], "Fix flaky test");
        assert_eq!(payload["priority"], "high");
        assert_eq!(payload["file_path"], "tests/io.rs");
        assert_eq!(payload["line_number"], 41);
    }

    #[test]
    fn test_update_payload_uses_link_key() {
        let github = update_payload(Integration::Github, &json!(12), Status::Done);
        assert_eq!(github["issue_number"], 12);
        assert_eq!(github["state"], "closed");

        let jira = update_payload(Integration::Jira, &json!("PROJ-4"), Status::InProgress);
        assert_eq!(jira["jira_key"], "PROJ-4");
        assert_eq!(jira["status"], "In Progress");
    }

    #[test]
    fn test_parse_create_response() {
        let ok = json!({
            "success": true,
            "issue": {"number": 7, "html_url": "https://github.test/7"}
        });
        let issue = parse_create_response(Integration::Github, &ok).unwrap();
        assert_eq!(issue.id, json!(7));
        assert_eq!(issue.url.as_deref(), Some("https://github.test/7"));

        let failed = json!({"success": false, "error": "rate limited"});
        let err = parse_create_response(Integration::Github, &failed).unwrap_err();
        assert!(err.to_string().contains("rate limited"));

        let missing_id = json!({"success": true, "issue": {}});
        assert!(parse_create_response(Integration::Jira, &missing_id).is_err());
    }

    #[test]
    fn test_external_id_shapes() {
        assert_eq!(
            external_id(Integration::Github, &json!({"number": 5})),
            Some(json!(5))
        );
        assert_eq!(
            external_id(Integration::Linear, &json!({"identifier": "ENG-1", "id": "uuid"})),
            Some(json!("ENG-1"))
        );
        assert_eq!(
            external_id(Integration::Linear, &json!({"id": "uuid"})),
            Some(json!("uuid"))
        );
        assert_eq!(external_id(Integration::Jira, &json!({"key": null})), None);
    }

    #[test]
    fn test_parse_external_issue_jira_nesting() {
        let nested = json!({
            "key": "PROJ-9",
            "fields": {
                "summary": "Crash on start",
                "description": "Stack trace attached",
                "status": {"name": "In Progress"},
                "priority": {"name": "Critical"},
                "labels": ["boot"],
            }
        });

        let parsed = parse_external_issue(Integration::Jira, &nested);
        assert_eq!(parsed.title, "Crash on start");
        assert_eq!(parsed.status, Status::InProgress);
        assert_eq!(parsed.priority, Priority::High);
        assert!(parsed.tags.contains("boot"));
    }
}
