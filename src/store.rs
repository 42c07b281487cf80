//! High-level todo store.
//!
//! `Store` wraps [`Storage`](crate::storage::Storage) with a short-lived
//! read cache and the patch-merge semantics callers actually want:
//! defaults are materialized on add, updates are partial, and the
//! completion timestamp tracks status transitions.

use crate::query::SearchFilter;
use crate::storage::Storage;
use crate::types::{AddOptions, Metadata, Status, Todo, TodoPatch, derive_title};
use chrono::Utc;
use eyre::Result;
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};

/// How long a cached `get_all` result stays valid. Writes through this
/// store invalidate it immediately; the TTL only bounds staleness against
/// other processes sharing the database file.
const CACHE_TTL: Duration = Duration::from_millis(1000);

/// Cached todo store backed by SQLite.
pub struct Store {
    storage: Storage,
    cache: Option<(Instant, Vec<Todo>)>,
}

impl Store {
    /// Open the store at the given database path, migrating as needed.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            storage: Storage::open(path)?,
            cache: None,
        })
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    fn invalidate_cache(&mut self) {
        self.cache = None;
    }

    /// Add a todo. Missing options fall back to defaults: title from the
    /// first content line, status `todo`, priority `medium`, empty tags
    /// and metadata. Returns the assigned id.
    pub fn add(&mut self, content: &str, options: AddOptions) -> Result<i64> {
        let now = Utc::now();
        let status = options.status.unwrap_or_default();

        let todo = Todo {
            id: 0,
            title: options.title.unwrap_or_else(|| derive_title(content)),
            content: content.to_string(),
            status,
            priority: options.priority.unwrap_or_default(),
            tags: options.tags.unwrap_or_default(),
            file_path: options.file_path,
            line_number: options.line_number,
            metadata: options.metadata.unwrap_or_else(Metadata::new),
            created_at: now,
            updated_at: now,
            completed_at: status.is_done().then_some(now),
        };

        let id = self.storage.insert(&todo)?;
        self.invalidate_cache();
        Ok(id)
    }

    /// Get a todo by id.
    pub fn get(&self, id: i64) -> Result<Option<Todo>> {
        self.storage.get(id)
    }

    /// All todos, open items first, oldest first within each completion
    /// class. Served from the cache when it is fresh.
    pub fn get_all(&mut self) -> Result<Vec<Todo>> {
        if let Some((stamp, todos)) = &self.cache
            && stamp.elapsed() < CACHE_TTL
        {
            return Ok(todos.clone());
        }

        let todos = self.storage.get_all()?;
        self.cache = Some((Instant::now(), todos.clone()));
        Ok(todos)
    }

    /// Apply a partial update. Returns true when a row changed; false for
    /// an unknown id or an empty patch. `updated_at` is only stamped when
    /// something is actually written.
    pub fn update(&mut self, id: i64, patch: TodoPatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(false);
        }

        let Some(existing) = self.storage.get(id)? else {
            return Ok(false);
        };

        // Status wins over the legacy done flag when both are patched.
        let status = patch
            .status
            .or_else(|| {
                patch.done.map(|done| match (done, existing.status) {
                    (true, _) => Status::Done,
                    (false, Status::Done) => Status::Todo,
                    (false, other) => other,
                })
            })
            .unwrap_or(existing.status);

        let completed_at = match (existing.status.is_done(), status.is_done()) {
            (false, true) => Some(Utc::now()),
            (true, false) => None,
            _ => existing.completed_at,
        };

        // New content re-derives the title unless the patch sets one
        // explicitly.
        let title = match (&patch.title, &patch.content) {
            (Some(title), _) => title.clone(),
            (None, Some(content)) => derive_title(content),
            (None, None) => existing.title,
        };

        let todo = Todo {
            id,
            title,
            content: patch.content.unwrap_or(existing.content),
            status,
            priority: patch.priority.unwrap_or(existing.priority),
            tags: patch.tags.unwrap_or(existing.tags),
            file_path: patch.file_path.unwrap_or(existing.file_path),
            line_number: patch.line_number.unwrap_or(existing.line_number),
            metadata: patch.metadata.unwrap_or(existing.metadata),
            created_at: existing.created_at,
            updated_at: Utc::now(),
            completed_at,
        };

        let changed = self.storage.update_row(&todo)?;
        if changed {
            self.invalidate_cache();
        }
        Ok(changed)
    }

    /// Flip a todo between done and not-done. Returns the new done state,
    /// or None for an unknown id.
    pub fn toggle_done(&mut self, id: i64) -> Result<Option<bool>> {
        let Some(existing) = self.storage.get(id)? else {
            return Ok(None);
        };

        let next = if existing.status.is_done() {
            Status::Todo
        } else {
            Status::Done
        };
        self.update(id, TodoPatch::default().status(next))?;
        Ok(Some(next.is_done()))
    }

    /// Delete a todo. Returns false for an unknown id.
    pub fn delete(&mut self, id: i64) -> Result<bool> {
        let deleted = self.storage.delete(id)?;
        if deleted {
            self.invalidate_cache();
        }
        Ok(deleted)
    }

    /// First todo whose metadata has `key` exactly equal to `value`.
    pub fn find_by_metadata(&self, key: &str, value: &Value) -> Result<Option<Todo>> {
        self.storage.find_by_metadata(key, value)
    }

    /// Conjunctive search over content and the filter's fields.
    pub fn search(&self, text: &str, filter: &SearchFilter) -> Result<Vec<Todo>> {
        self.storage.search(text, filter)
    }

    /// Highest applied migration version.
    pub fn schema_version(&self) -> Result<i64> {
        self.storage.schema_version()
    }

    /// What the migration runner did when this store was opened.
    pub fn migration_report(&self) -> &crate::migrate::MigrationReport {
        self.storage.migration_report()
    }
}
