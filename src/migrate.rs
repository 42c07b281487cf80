//! Schema migrations for the todos database.
//!
//! The base table is the minimal one the first generation of the server
//! created (id/content/done/timestamps); everything else arrived later as
//! additive migrations. Each migration introspects the live schema before
//! altering it, so applying one twice is a no-op. A failed migration is
//! logged and skipped rather than aborting the open; it is retried on the
//! next run because only successful versions are recorded.

use crate::types::derive_title;
use chrono::Utc;
use eyre::{Context, Result};
use rusqlite::{Connection, params};
use std::collections::HashSet;

/// A single additive schema change.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub apply: fn(&Connection) -> Result<()>,
}

/// Outcome of a migration run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Versions applied during this run, in order.
    pub applied: Vec<i64>,
    /// Versions that failed, with the error text. These stay unrecorded
    /// and are retried on the next run.
    pub failed: Vec<(i64, String)>,
}

/// Every migration, in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "add_title",
        apply: add_title,
    },
    Migration {
        version: 2,
        name: "add_status_priority",
        apply: add_status_priority,
    },
    Migration {
        version: 3,
        name: "add_tags",
        apply: add_tags,
    },
    Migration {
        version: 4,
        name: "add_source_anchor",
        apply: add_source_anchor,
    },
    Migration {
        version: 5,
        name: "add_metadata",
        apply: add_metadata,
    },
    Migration {
        version: 6,
        name: "add_completed_at",
        apply: add_completed_at,
    },
];

/// Current schema version: highest recorded migration, 0 on a fresh log.
pub fn current_version(db: &Connection) -> Result<i64> {
    let version = db.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Bring the schema up to date.
pub fn run(db: &Connection) -> Result<MigrationReport> {
    run_list(db, MIGRATIONS)
}

fn run_list(db: &Connection, migrations: &[Migration]) -> Result<MigrationReport> {
    db.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );
        "#,
    )
    .context("Failed to create migration log")?;

    let recorded = recorded_versions(db)?;
    let mut report = MigrationReport::default();

    for migration in migrations {
        if recorded.contains(&migration.version) {
            continue;
        }

        match (migration.apply)(db) {
            Ok(()) => {
                db.execute(
                    "INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)",
                    params![migration.version, Utc::now().to_rfc3339()],
                )
                .context("Failed to record migration")?;
                log::info!("Applied migration v{}: {}", migration.version, migration.name);
                report.applied.push(migration.version);
            }
            Err(e) => {
                log::warn!(
                    "Migration v{} ({}) failed, skipping: {}",
                    migration.version,
                    migration.name,
                    e
                );
                report.failed.push((migration.version, e.to_string()));
            }
        }
    }

    Ok(report)
}

fn recorded_versions(db: &Connection) -> Result<HashSet<i64>> {
    let mut stmt = db.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(versions)
}

/// True when the table already carries the named column.
fn has_column(db: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = db.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// v1: explicit title column, backfilled from the first content line.
fn add_title(db: &Connection) -> Result<()> {
    if !has_column(db, "todos", "title")? {
        db.execute("ALTER TABLE todos ADD COLUMN title TEXT", [])?;
    }

    let mut stmt = db.prepare("SELECT id, content FROM todos WHERE title IS NULL")?;
    let rows: Vec<(i64, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .filter_map(|r| r.ok())
        .collect();

    for (id, content) in rows {
        db.execute(
            "UPDATE todos SET title = ? WHERE id = ?",
            params![derive_title(&content), id],
        )?;
    }

    Ok(())
}

/// v2: status and priority columns. Status is backfilled from the done
/// flag; rows already carrying a status are left alone.
fn add_status_priority(db: &Connection) -> Result<()> {
    if !has_column(db, "todos", "status")? {
        db.execute("ALTER TABLE todos ADD COLUMN status TEXT", [])?;
    }
    if !has_column(db, "todos", "priority")? {
        db.execute("ALTER TABLE todos ADD COLUMN priority TEXT", [])?;
    }

    db.execute(
        "UPDATE todos SET status = 'done' WHERE done = 1 AND status IS NOT 'done'",
        [],
    )?;
    db.execute(
        "UPDATE todos SET status = 'todo' WHERE done = 0 AND status IS NULL",
        [],
    )?;
    db.execute("UPDATE todos SET priority = 'medium' WHERE priority IS NULL", [])?;

    Ok(())
}

/// v3: comma-delimited tags, empty by default.
fn add_tags(db: &Connection) -> Result<()> {
    if !has_column(db, "todos", "tags")? {
        db.execute("ALTER TABLE todos ADD COLUMN tags TEXT", [])?;
    }
    db.execute("UPDATE todos SET tags = '' WHERE tags IS NULL", [])?;
    Ok(())
}

/// v4: optional source location the todo refers to.
fn add_source_anchor(db: &Connection) -> Result<()> {
    if !has_column(db, "todos", "file_path")? {
        db.execute("ALTER TABLE todos ADD COLUMN file_path TEXT", [])?;
    }
    if !has_column(db, "todos", "line_number")? {
        db.execute("ALTER TABLE todos ADD COLUMN line_number INTEGER", [])?;
    }
    Ok(())
}

/// v5: open metadata object for integration link state.
fn add_metadata(db: &Connection) -> Result<()> {
    if !has_column(db, "todos", "metadata")? {
        db.execute("ALTER TABLE todos ADD COLUMN metadata TEXT", [])?;
    }
    db.execute("UPDATE todos SET metadata = '{}' WHERE metadata IS NULL", [])?;
    Ok(())
}

/// v6: completion timestamp, approximated by updated_at for rows that
/// were already done when the column arrived.
fn add_completed_at(db: &Connection) -> Result<()> {
    if !has_column(db, "todos", "completed_at")? {
        db.execute("ALTER TABLE todos ADD COLUMN completed_at TEXT", [])?;
    }
    db.execute(
        "UPDATE todos SET completed_at = updated_at WHERE done = 1 AND completed_at IS NULL",
        [],
    )?;
    Ok(())
}
