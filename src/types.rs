//! Core data types for punchlist todos.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tracked todo item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Todo {
    /// Rowid assigned by SQLite on insert, never reused within a store
    pub id: i64,

    /// Short description; derived from the first content line when not given
    pub title: String,

    /// Free-form body text
    pub content: String,

    /// Current state
    pub status: Status,

    /// Importance, defaults to medium
    pub priority: Priority,

    /// Comma-delimited tag set, "" when untagged
    #[serde(default)]
    pub tags: String,

    /// Source file this todo refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Line within the source file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<i64>,

    /// Open JSON object carrying external link state and extensions
    #[serde(default)]
    pub metadata: Metadata,

    /// When created
    pub created_at: DateTime<Utc>,

    /// Last modification
    pub updated_at: DateTime<Utc>,

    /// When completed (if status == Done)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Todo status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl Status {
    /// Wire and storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Done => "done",
        }
    }

    /// Parse the storage form; None for anything unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "todo" => Some(Status::Todo),
            "in_progress" => Some(Status::InProgress),
            "done" => Some(Status::Done),
            _ => None,
        }
    }

    /// Completion flag this status maps to.
    pub fn is_done(&self) -> bool {
        matches!(self, Status::Done)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Todo priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Wire and storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Parse the storage form; None for anything unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Open string-keyed metadata attached to a todo. Always a valid JSON
/// object; integrations store their link state here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stored metadata column. Invalid JSON or a non-object value
    /// degrades to an empty map rather than failing the row.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    /// Serialize for the metadata column.
    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Title fallback: the first line of the content, trimmed.
pub fn derive_title(content: &str) -> String {
    content.lines().next().unwrap_or("").trim().to_string()
}

/// Caller-supplied overrides for `Store::add`. Unset fields take defaults.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub title: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub tags: Option<String>,
    pub file_path: Option<String>,
    pub line_number: Option<i64>,
    pub metadata: Option<Metadata>,
}

/// Partial update for `Store::update`. Only fields that are set are
/// applied; an empty patch is a no-op that leaves `updated_at` alone.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<Status>,
    /// Completion flag shorthand; `status` wins when both are set.
    pub done: Option<bool>,
    pub priority: Option<Priority>,
    pub tags: Option<String>,
    /// Outer None = untouched, inner None = cleared.
    pub file_path: Option<Option<String>>,
    pub line_number: Option<Option<i64>>,
    /// Replaces the whole metadata map.
    pub metadata: Option<Metadata>,
}

impl TodoPatch {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.status.is_none()
            && self.done.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
            && self.file_path.is_none()
            && self.line_number.is_none()
            && self.metadata.is_none()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn done(mut self, done: bool) -> Self {
        self.done = Some(done);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
