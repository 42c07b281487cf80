//! Search filters and aggregate statistics.

use crate::store::Store;
use crate::types::{Priority, Todo};
use eyre::Result;
use serde::Serialize;

/// Filter for [`StoreQueryExt::search`]. Every set field must match;
/// unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Exact priority.
    pub priority: Option<Priority>,
    /// Substring of the comma-joined tags field.
    pub tag: Option<String>,
    /// Substring of the anchored file path.
    pub file_path: Option<String>,
    /// Completion state.
    pub done: Option<bool>,
}

impl SearchFilter {
    /// Create an empty filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by exact priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Filter by tag substring.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Filter by file path substring.
    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Filter by completion state.
    pub fn done(mut self, done: bool) -> Self {
        self.done = Some(done);
        self
    }
}

/// Aggregate counters over the whole store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Stats {
    pub total: i64,
    pub completed: i64,
    pub active: i64,
    /// Completed share of all todos, as a percentage. 0.0 when empty.
    pub completion_rate: f64,
    /// Todos touched in the last seven days.
    pub recent_activity: i64,
}

/// Extension trait adding search and stats to [`Store`].
pub trait StoreQueryExt {
    /// Conjunctive search: substring match on content plus the filter's
    /// fields. Results come back open-first, then high priority first,
    /// then oldest first.
    fn search(&self, text: &str, filter: &SearchFilter) -> Result<Vec<Todo>>;

    /// Aggregate counters over the whole store.
    fn stats(&self) -> Result<Stats>;
}

impl StoreQueryExt for Store {
    fn search(&self, text: &str, filter: &SearchFilter) -> Result<Vec<Todo>> {
        self.storage().search(text, filter)
    }

    fn stats(&self) -> Result<Stats> {
        self.storage().stats()
    }
}
