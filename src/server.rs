//! Line-delimited JSON-RPC server exposing the store as MCP tools.
//!
//! The server reads one request per line, handles it, and writes one
//! response per line, flushing after each. All I/O is synchronous: MCP
//! clients drive the conversation, one request at a time.

use crate::protocol::{
    INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION, RpcRequest,
    RpcResponse,
};
use crate::query::{SearchFilter, StoreQueryExt};
use crate::store::Store;
use crate::tools::{self, ToolName};
use crate::types::{AddOptions, TodoPatch};
use eyre::{Context, Result};
use serde_json::{Value, json};
use std::io::{BufRead, Write};

/// MCP tool server over a pair of line streams.
pub struct McpServer {
    store: Store,
    initialized: bool,
}

impl McpServer {
    /// Wrap a store for serving.
    pub fn new(store: Store) -> Self {
        Self {
            store,
            initialized: false,
        }
    }

    /// Serve requests from stdin to stdout until EOF.
    pub fn serve_stdio(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.run(stdin.lock(), &mut stdout.lock())
    }

    /// Serve requests line by line until the reader is exhausted. Blank
    /// lines are skipped; unparseable lines get a parse-error response.
    pub fn run(&mut self, reader: impl BufRead, writer: &mut impl Write) -> Result<()> {
        for line in reader.lines() {
            let line = line.context("Failed to read request line")?;
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<RpcRequest>(&line) {
                Ok(request) => self.handle_request(request),
                Err(e) => {
                    log::warn!("Unparseable request line: {}", e);
                    RpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e))
                }
            };

            let payload = serde_json::to_string(&response).context("Failed to serialize response")?;
            writeln!(writer, "{}", payload).context("Failed to write response")?;
            writer.flush().context("Failed to flush response")?;
        }

        Ok(())
    }

    /// Dispatch a single request.
    fn handle_request(&mut self, request: RpcRequest) -> RpcResponse {
        log::debug!("Handling {} request", request.method);

        match request.method.as_str() {
            "initialize" => {
                self.initialized = true;
                RpcResponse::result(
                    request.id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": { "tools": {} },
                        "serverInfo": {
                            "name": "punchlist",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                )
            }

            "tools/list" => {
                if !self.initialized {
                    log::warn!("tools/list before initialize");
                }
                RpcResponse::result(request.id, tools::list_tools())
            }

            "tools/call" => {
                if !self.initialized {
                    log::warn!("tools/call before initialize");
                }
                self.handle_tool_call(request.id, &request.params)
            }

            other => RpcResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        }
    }

    fn handle_tool_call(&mut self, id: Option<Value>, params: &Value) -> RpcResponse {
        let Some(name) = params["name"].as_str() else {
            return RpcResponse::error(id, INVALID_PARAMS, "Missing tool name");
        };

        let Some(tool) = ToolName::from_name(name) else {
            return RpcResponse::error(id, INVALID_PARAMS, format!("Unknown tool: {}", name));
        };

        match self.call_tool(tool, &params["arguments"]) {
            Ok(value) => RpcResponse::result(id, value),
            Err(e) => RpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }

    fn call_tool(&mut self, tool: ToolName, arguments: &Value) -> Result<Value> {
        match tool {
            ToolName::ListTodos => {
                let todos = self.store.get_all()?;
                Ok(json!({ "todos": todos }))
            }

            ToolName::AddTodo => {
                let content = arguments["content"]
                    .as_str()
                    .ok_or_else(|| eyre::eyre!("add_todo requires a content string"))?;
                let id = self.store.add(content, AddOptions::default())?;
                Ok(json!({ "id": id, "success": true }))
            }

            ToolName::UpdateTodo => {
                let id = arguments["id"]
                    .as_i64()
                    .ok_or_else(|| eyre::eyre!("update_todo requires an integer id"))?;

                let mut patch = TodoPatch::default();
                if let Some(content) = arguments["content"].as_str() {
                    patch = patch.content(content);
                }
                if let Some(done) = arguments["done"].as_bool() {
                    patch = patch.done(done);
                }

                let changed = self.store.update(id, patch)?;
                Ok(json!({ "success": changed }))
            }

            ToolName::DeleteTodo => {
                let id = arguments["id"]
                    .as_i64()
                    .ok_or_else(|| eyre::eyre!("delete_todo requires an integer id"))?;
                let deleted = self.store.delete(id)?;
                Ok(json!({ "success": deleted }))
            }

            ToolName::SearchTodos => {
                let query = arguments["query"]
                    .as_str()
                    .ok_or_else(|| eyre::eyre!("search_todos requires a query string"))?;
                let todos = self.store.search(query, &SearchFilter::new())?;
                Ok(json!({ "todos": todos }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_server() -> (TempDir, McpServer) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(&temp_dir.path().join("todos.db")).unwrap();
        (temp_dir, McpServer::new(store))
    }

    fn request(id: i64, method: &str, params: Value) -> RpcRequest {
        RpcRequest::new(Some(json!(id)), method, params)
    }

    #[test]
    fn test_initialize_reports_protocol_version() {
        let (_temp_dir, mut server) = setup_test_server();

        let response = server.handle_request(request(1, "initialize", Value::Null));
        let result = response.result.unwrap();

        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "punchlist");
        assert!(server.initialized);
    }

    #[test]
    fn test_unknown_method() {
        let (_temp_dir, mut server) = setup_test_server();

        let response = server.handle_request(request(1, "resources/list", Value::Null));
        let error = response.error.unwrap();

        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert!(error.message.contains("resources/list"));
    }

    #[test]
    fn test_unknown_tool() {
        let (_temp_dir, mut server) = setup_test_server();

        let response =
            server.handle_request(request(1, "tools/call", json!({"name": "explode"})));
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn test_add_requires_content() {
        let (_temp_dir, mut server) = setup_test_server();

        let response = server.handle_request(request(
            1,
            "tools/call",
            json!({"name": "add_todo", "arguments": {}}),
        ));
        let error = response.error.unwrap();

        assert_eq!(error.code, INTERNAL_ERROR);
        assert!(error.message.contains("content"));
    }
}
