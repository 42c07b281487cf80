//! Shared test infrastructure for punchlist integration tests.
//!
//! Provides TestEnv for database setup/teardown and MockTransport for
//! scripting adapter conversations.

#![allow(dead_code)]

use eyre::bail;
use punchlist::{AdapterTransport, AddOptions, Priority, Status, Store};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tempfile::TempDir;

/// Test environment with automatic cleanup.
pub struct TestEnv {
    temp_dir: TempDir,
    pub db_path: PathBuf,
}

impl TestEnv {
    /// Create a new test environment with a fresh database path.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("todos.db");
        Self { temp_dir, db_path }
    }

    /// Open a store on this environment's database. Call again to test
    /// reopen behavior; the data persists for the life of the env.
    pub fn store(&self) -> Store {
        Store::open(&self.db_path).expect("Failed to open store")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Add a todo with defaults.
pub fn add_todo(store: &mut Store, content: &str) -> i64 {
    store.add(content, AddOptions::default()).expect("Failed to add todo")
}

/// Add a todo with a specific priority.
pub fn add_todo_with_priority(store: &mut Store, content: &str, priority: Priority) -> i64 {
    let options = AddOptions {
        priority: Some(priority),
        ..Default::default()
    };
    store.add(content, options).expect("Failed to add todo")
}

/// Add a todo with a specific status.
pub fn add_todo_with_status(store: &mut Store, content: &str, status: Status) -> i64 {
    let options = AddOptions {
        status: Some(status),
        ..Default::default()
    };
    store.add(content, options).expect("Failed to add todo")
}

/// One tools/call seen by the mock transport.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub server: String,
    pub tool: String,
    pub arguments: Value,
}

/// Scripted transport for sync tests. Records every call and replays
/// queued responses per (server, tool); an unscripted call fails like a
/// dead adapter would.
#[derive(Default)]
pub struct MockTransport {
    pub calls: Vec<RecordedCall>,
    responses: HashMap<(String, String), VecDeque<Result<Value, String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response for the next call to server/tool.
    pub fn respond(&mut self, server: &str, tool: &str, response: Value) {
        self.responses
            .entry((server.to_string(), tool.to_string()))
            .or_default()
            .push_back(Ok(response));
    }

    /// Queue a transport-level failure for the next call to server/tool.
    pub fn fail(&mut self, server: &str, tool: &str, message: &str) {
        self.responses
            .entry((server.to_string(), tool.to_string()))
            .or_default()
            .push_back(Err(message.to_string()));
    }

    /// Calls made to one server/tool pair, in order.
    pub fn calls_to(&self, server: &str, tool: &str) -> Vec<&RecordedCall> {
        self.calls
            .iter()
            .filter(|call| call.server == server && call.tool == tool)
            .collect()
    }
}

impl AdapterTransport for MockTransport {
    fn call_tool(&mut self, server: &str, tool: &str, arguments: Value) -> eyre::Result<Value> {
        self.calls.push(RecordedCall {
            server: server.to_string(),
            tool: tool.to_string(),
            arguments,
        });

        let queue = self.responses.get_mut(&(server.to_string(), tool.to_string()));
        match queue.and_then(|q| q.pop_front()) {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => bail!("{}", message),
            None => bail!("no scripted response for {}/{}", server, tool),
        }
    }
}
