//! SQLite persistence for punchlist todos.
//!
//! `Storage` owns the connection. Opening a database creates the base
//! table if needed (the minimal id/content/done/timestamps shape the
//! original server used) and then runs the schema migrations, so a store
//! written by any earlier generation of the tool comes up readable.

use crate::migrate::{self, MigrationReport};
use crate::query::{SearchFilter, Stats};
use crate::types::{Metadata, Priority, Status, Todo, derive_title};
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use std::path::Path;

/// Column list consumed by `row_to_todo`; keep the order in sync.
const SELECT_TODO: &str = "SELECT id, title, content, done, status, priority, tags, \
     file_path, line_number, metadata, created_at, updated_at, completed_at FROM todos";

/// Storage handle for the todos database.
pub struct Storage {
    db: Connection,
    migrations: MigrationReport,
}

impl Storage {
    /// Open (creating if needed) the database at the given path and bring
    /// its schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }

        let db = Connection::open(path).context("Failed to open SQLite database")?;

        db.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set journal mode")?;
        db.pragma_update(None, "busy_timeout", 5000)
            .context("Failed to set busy timeout")?;

        let mut storage = Self {
            db,
            migrations: MigrationReport::default(),
        };

        storage.init_schema()?;
        storage.migrations = migrate::run(&storage.db)?;

        Ok(storage)
    }

    /// Base table, as the first generation of the server created it.
    /// Everything beyond these columns is added by migrations.
    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS todos (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    content TEXT NOT NULL,
                    done BOOLEAN DEFAULT FALSE,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                );
            "#,
            )
            .context("Failed to initialize schema")?;

        Ok(())
    }

    /// What the migration runner did when this handle was opened.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migrations
    }

    /// Highest applied migration version, 0 for a pristine base schema.
    pub fn schema_version(&self) -> Result<i64> {
        migrate::current_version(&self.db)
    }

    /// Insert a fully-materialized todo, returning the assigned rowid.
    /// The todo's own `id` field is ignored.
    pub fn insert(&self, todo: &Todo) -> Result<i64> {
        self.db.execute(
            r#"
            INSERT INTO todos (title, content, done, status, priority, tags,
                               file_path, line_number, metadata, created_at, updated_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                todo.title,
                todo.content,
                todo.status.is_done(),
                todo.status.as_str(),
                todo.priority.as_str(),
                todo.tags,
                todo.file_path,
                todo.line_number,
                todo.metadata.to_json(),
                todo.created_at.to_rfc3339(),
                todo.updated_at.to_rfc3339(),
                todo.completed_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;

        Ok(self.db.last_insert_rowid())
    }

    /// Get a todo by id.
    pub fn get(&self, id: i64) -> Result<Option<Todo>> {
        let mut stmt = self.db.prepare(&format!("{} WHERE id = ?", SELECT_TODO))?;
        let todo = stmt.query_row(params![id], Self::row_to_todo).optional()?;
        Ok(todo)
    }

    /// All todos, open items first, oldest first within each completion
    /// class.
    pub fn get_all(&self) -> Result<Vec<Todo>> {
        let mut stmt = self
            .db
            .prepare(&format!("{} ORDER BY done ASC, created_at ASC", SELECT_TODO))?;
        let todos = stmt
            .query_map([], Self::row_to_todo)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(todos)
    }

    /// Write every mutable column of an existing row. Returns false when
    /// the id does not exist.
    pub fn update_row(&self, todo: &Todo) -> Result<bool> {
        let changed = self.db.execute(
            r#"
            UPDATE todos
            SET title = ?, content = ?, done = ?, status = ?, priority = ?, tags = ?,
                file_path = ?, line_number = ?, metadata = ?, updated_at = ?, completed_at = ?
            WHERE id = ?
            "#,
            params![
                todo.title,
                todo.content,
                todo.status.is_done(),
                todo.status.as_str(),
                todo.priority.as_str(),
                todo.tags,
                todo.file_path,
                todo.line_number,
                todo.metadata.to_json(),
                todo.updated_at.to_rfc3339(),
                todo.completed_at.map(|dt| dt.to_rfc3339()),
                todo.id,
            ],
        )?;

        Ok(changed > 0)
    }

    /// Hard-delete a row. Returns false when the id does not exist.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let changed = self.db.execute("DELETE FROM todos WHERE id = ?", params![id])?;
        Ok(changed > 0)
    }

    /// First todo whose metadata has `key` exactly equal to `value`.
    pub fn find_by_metadata(&self, key: &str, value: &Value) -> Result<Option<Todo>> {
        for todo in self.get_all()? {
            if todo.metadata.get(key) == Some(value) {
                return Ok(Some(todo));
            }
        }
        Ok(None)
    }

    /// Conjunctive search: substring on content plus the filter's fields.
    /// Open items first, then by priority (high before low), then oldest
    /// first.
    pub fn search(&self, text: &str, filter: &SearchFilter) -> Result<Vec<Todo>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if !text.is_empty() {
            conditions.push("content LIKE ?");
            args.push(Box::new(format!("%{}%", text)));
        }
        if let Some(priority) = filter.priority {
            conditions.push("priority = ?");
            args.push(Box::new(priority.as_str()));
        }
        if let Some(tag) = &filter.tag {
            conditions.push("tags LIKE ?");
            args.push(Box::new(format!("%{}%", tag)));
        }
        if let Some(path) = &filter.file_path {
            conditions.push("file_path LIKE ?");
            args.push(Box::new(format!("%{}%", path)));
        }
        if let Some(done) = filter.done {
            conditions.push("done = ?");
            args.push(Box::new(done));
        }

        let mut sql = String::from(SELECT_TODO);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(
            " ORDER BY done ASC, \
             CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END ASC, \
             created_at ASC",
        );

        let mut stmt = self.db.prepare(&sql)?;
        let todos = stmt
            .query_map(params_from_iter(args), Self::row_to_todo)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(todos)
    }

    /// Aggregate counters over the whole table.
    pub fn stats(&self) -> Result<Stats> {
        let (total, completed): (i64, i64) = self.db.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN done THEN 1 ELSE 0 END), 0) FROM todos",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let cutoff = (Utc::now() - chrono::Duration::days(7)).to_rfc3339();
        let recent_activity: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM todos WHERE updated_at >= ?",
            params![cutoff],
            |row| row.get(0),
        )?;

        let completion_rate = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(Stats {
            total,
            completed,
            active: total - completed,
            completion_rate,
            recent_activity,
        })
    }

    /// Convert a database row to a Todo. Columns added by migrations may
    /// be NULL on rows written by older tooling; each falls back to its
    /// default, and status falls back to the done flag.
    fn row_to_todo(row: &rusqlite::Row) -> rusqlite::Result<Todo> {
        let title: Option<String> = row.get(1)?;
        let content: String = row.get(2)?;
        let done: Option<bool> = row.get(3)?;
        let done = done.unwrap_or(false);
        let status_str: Option<String> = row.get(4)?;
        let priority_str: Option<String> = row.get(5)?;
        let tags: Option<String> = row.get(6)?;
        let metadata_raw: Option<String> = row.get(9)?;
        let created_at_str: String = row.get(10)?;
        let updated_at_str: String = row.get(11)?;
        let completed_at_str: Option<String> = row.get(12)?;

        let status = status_str
            .as_deref()
            .and_then(Status::parse)
            .unwrap_or(if done { Status::Done } else { Status::Todo });

        Ok(Todo {
            id: row.get(0)?,
            title: title.unwrap_or_else(|| derive_title(&content)),
            content,
            status,
            priority: priority_str.as_deref().and_then(Priority::parse).unwrap_or_default(),
            tags: tags.unwrap_or_default(),
            file_path: row.get(7)?,
            line_number: row.get(8)?,
            metadata: metadata_raw.as_deref().map(Metadata::parse).unwrap_or_default(),
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
            completed_at: completed_at_str.as_deref().map(parse_timestamp),
        })
    }
}

/// Parse a stored timestamp. Current writers store RFC 3339; rows written
/// through the base schema's CURRENT_TIMESTAMP default carry
/// "YYYY-MM-DD HH:MM:SS" instead.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup_test_storage() -> (TempDir, Storage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(&temp_dir.path().join("todos.db")).unwrap();
        (temp_dir, storage)
    }

    fn make_todo(content: &str) -> Todo {
        let now = Utc::now();
        Todo {
            id: 0,
            title: derive_title(content),
            content: content.to_string(),
            status: Status::Todo,
            priority: Priority::Medium,
            tags: String::new(),
            file_path: None,
            line_number: None,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_open_migrates_to_latest() {
        let (_temp_dir, storage) = setup_test_storage();
        assert_eq!(storage.schema_version().unwrap(), 6);
        assert_eq!(storage.migration_report().applied, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_insert_and_get() {
        let (_temp_dir, storage) = setup_test_storage();

        let mut todo = make_todo("Fix the login flow\nOAuth redirect loops");
        todo.tags = "auth,bug".to_string();
        todo.file_path = Some("src/auth.rs".to_string());
        todo.line_number = Some(88);
        todo.metadata.insert("issue_number", json!(12));

        let id = storage.insert(&todo).unwrap();
        let retrieved = storage.get(id).unwrap().unwrap();

        assert_eq!(retrieved.id, id);
        assert_eq!(retrieved.title, "Fix the login flow");
        assert_eq!(retrieved.content, todo.content);
        assert_eq!(retrieved.tags, "auth,bug");
        assert_eq!(retrieved.file_path.as_deref(), Some("src/auth.rs"));
        assert_eq!(retrieved.line_number, Some(88));
        assert_eq!(retrieved.metadata.get("issue_number"), Some(&json!(12)));
    }

    #[test]
    fn test_get_unknown_id() {
        let (_temp_dir, storage) = setup_test_storage();
        assert!(storage.get(999).unwrap().is_none());
    }

    #[test]
    fn test_get_all_orders_open_first() {
        let (_temp_dir, storage) = setup_test_storage();

        let first = storage.insert(&make_todo("first")).unwrap();
        let second = storage.insert(&make_todo("second")).unwrap();
        let third = storage.insert(&make_todo("third")).unwrap();

        let mut done = storage.get(second).unwrap().unwrap();
        done.status = Status::Done;
        done.completed_at = Some(Utc::now());
        storage.update_row(&done).unwrap();

        let all = storage.get_all().unwrap();
        let ids: Vec<i64> = all.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first, third, second]);
    }

    #[test]
    fn test_update_row_unknown_id() {
        let (_temp_dir, storage) = setup_test_storage();
        let mut todo = make_todo("ghost");
        todo.id = 42;
        assert!(!storage.update_row(&todo).unwrap());
    }

    #[test]
    fn test_delete() {
        let (_temp_dir, storage) = setup_test_storage();
        let id = storage.insert(&make_todo("ephemeral")).unwrap();

        assert!(storage.delete(id).unwrap());
        assert!(storage.get(id).unwrap().is_none());
        assert!(!storage.delete(id).unwrap());
    }

    #[test]
    fn test_legacy_row_mapping() {
        let (_temp_dir, storage) = setup_test_storage();

        // A row as the pre-migration server would have written it: base
        // columns only, CURRENT_TIMESTAMP dates.
        storage
            .db
            .execute("INSERT INTO todos (content, done) VALUES ('Old business\nDetails', 1)", [])
            .unwrap();
        let id = storage.db.last_insert_rowid();

        let todo = storage.get(id).unwrap().unwrap();
        assert_eq!(todo.title, "Old business");
        assert_eq!(todo.status, Status::Done);
        assert_eq!(todo.priority, Priority::Medium);
        assert_eq!(todo.tags, "");
        assert!(todo.metadata.is_empty());
    }

    #[test]
    fn test_find_by_metadata_exact_value() {
        let (_temp_dir, storage) = setup_test_storage();

        let mut linked = make_todo("linked");
        linked.metadata.insert("issue_number", json!(42));
        let id = storage.insert(&linked).unwrap();
        storage.insert(&make_todo("unlinked")).unwrap();

        let found = storage.find_by_metadata("issue_number", &json!(42)).unwrap();
        assert_eq!(found.map(|t| t.id), Some(id));

        // Value equality, not string equality.
        assert!(storage.find_by_metadata("issue_number", &json!("42")).unwrap().is_none());
        assert!(storage.find_by_metadata("issue_number", &json!(43)).unwrap().is_none());
        assert!(storage.find_by_metadata("jira_key", &json!(42)).unwrap().is_none());
    }

    #[test]
    fn test_search_text_and_filters() {
        let (_temp_dir, storage) = setup_test_storage();

        let mut high = make_todo("Fix crash in parser");
        high.priority = Priority::High;
        high.tags = "bug,parser".to_string();
        storage.insert(&high).unwrap();

        let mut low = make_todo("Fix typo in readme");
        low.priority = Priority::Low;
        low.tags = "docs".to_string();
        storage.insert(&low).unwrap();

        storage.insert(&make_todo("Add metrics")).unwrap();

        let fix = storage.search("Fix", &SearchFilter::new()).unwrap();
        assert_eq!(fix.len(), 2);

        let high_fix = storage
            .search("Fix", &SearchFilter::new().priority(Priority::High))
            .unwrap();
        assert_eq!(high_fix.len(), 1);
        assert_eq!(high_fix[0].title, "Fix crash in parser");

        let tagged = storage.search("", &SearchFilter::new().tag("docs")).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].title, "Fix typo in readme");

        let nothing = storage
            .search("Fix", &SearchFilter::new().priority(Priority::High).tag("docs"))
            .unwrap();
        assert!(nothing.is_empty());
    }

    #[test]
    fn test_search_orders_by_priority_within_open() {
        let (_temp_dir, storage) = setup_test_storage();

        let mut low = make_todo("low");
        low.priority = Priority::Low;
        storage.insert(&low).unwrap();

        let mut high = make_todo("high");
        high.priority = Priority::High;
        storage.insert(&high).unwrap();

        storage.insert(&make_todo("medium")).unwrap();

        let results = storage.search("", &SearchFilter::new()).unwrap();
        let titles: Vec<&str> = results.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["high", "medium", "low"]);
    }

    #[test]
    fn test_stats_counts() {
        let (_temp_dir, storage) = setup_test_storage();

        for i in 0..4 {
            let mut todo = make_todo(&format!("todo {}", i));
            if i < 2 {
                todo.status = Status::Done;
                todo.completed_at = Some(Utc::now());
            }
            storage.insert(&todo).unwrap();
        }

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.completion_rate, 50.0);
        assert_eq!(stats.recent_activity, 4);
    }

    #[test]
    fn test_stats_empty_store() {
        let (_temp_dir, storage) = setup_test_storage();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.completion_rate, 0.0);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2026-03-01T10:30:00+00:00");
        assert_eq!(rfc.to_rfc3339(), "2026-03-01T10:30:00+00:00");

        let legacy = parse_timestamp("2026-03-01 10:30:00");
        assert_eq!(legacy, rfc);
    }
}
