//! punchlist: todo tracking with SQLite persistence and MCP tooling.
//!
//! The store keeps todos in a single SQLite database, migrating older
//! schemas forward on open. On top of it sit an MCP tool server for
//! editor agents and a sync engine that links todos to GitHub, Linear,
//! and JIRA issues through adapter processes.
//!
//! # Example
//!
//! ```no_run
//! use punchlist::{AddOptions, SearchFilter, Store, StoreQueryExt};
//! use std::path::Path;
//!
//! let mut store = Store::open(Path::new("todos.db")).unwrap();
//!
//! let id = store.add("Ship the release\nTag and push", AddOptions::default()).unwrap();
//! store.toggle_done(id).unwrap();
//!
//! let done = store.search("release", &SearchFilter::new().done(true)).unwrap();
//! assert_eq!(done.len(), 1);
//!
//! let stats = store.stats().unwrap();
//! assert_eq!(stats.completed, 1);
//! ```

mod migrate;
mod storage;
mod store;
mod types;

pub mod config;
pub mod mapping;
pub mod protocol;
pub mod query;
pub mod server;
pub mod sync;
pub mod tools;
pub mod transport;

// Re-export public API
pub use config::{AdapterConfig, Config, ConfigError};
pub use migrate::{MIGRATIONS, Migration, MigrationReport};
pub use query::{SearchFilter, Stats, StoreQueryExt};
pub use server::McpServer;
pub use store::Store;
pub use sync::{
    BulkCreateReport, BulkFilter, ExternalIssue, ExternalLink, ImportReport, Integration,
    IntegrationSpec, StatusSyncReport, SyncEngine, SyncError,
};
pub use transport::{AdapterTransport, StdioTransport};
pub use types::{AddOptions, Metadata, Priority, Status, Todo, TodoPatch, derive_title};
