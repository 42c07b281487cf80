//! Integration tests for the MCP tool server.
//!
//! Drives the server through its line protocol and checks the JSON-RPC
//! framing, the tool behaviors, and persistence of tool effects.

mod common;

use common::TestEnv;
use punchlist::McpServer;
use serde_json::{Value, json};
use std::io::Cursor;

/// Feed newline-delimited requests to a fresh server over the env's
/// database and collect one parsed response per output line.
fn serve(env: &TestEnv, requests: &[Value]) -> Vec<Value> {
    let input = requests
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    serve_raw(env, &input)
}

fn serve_raw(env: &TestEnv, input: &str) -> Vec<Value> {
    let mut server = McpServer::new(env.store());
    let mut output: Vec<u8> = Vec::new();
    server
        .run(Cursor::new(input.as_bytes()), &mut output)
        .expect("server run failed");

    String::from_utf8(output)
        .expect("server emitted invalid utf-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("server emitted invalid JSON"))
        .collect()
}

fn rpc(id: i64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

fn call(id: i64, tool: &str, arguments: Value) -> Value {
    rpc(id, "tools/call", json!({"name": tool, "arguments": arguments}))
}

// =============================================================================
// Handshake & Framing
// =============================================================================

#[test]
fn test_initialize() {
    let env = TestEnv::new();
    let responses = serve(&env, &[rpc(1, "initialize", json!({}))]);

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["jsonrpc"], "2.0");
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "punchlist");
    assert!(responses[0]["result"]["capabilities"]["tools"].is_object());
}

#[test]
fn test_tools_list() {
    let env = TestEnv::new();
    let responses = serve(&env, &[rpc(1, "tools/list", json!({}))]);

    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec!["list_todos", "add_todo", "update_todo", "delete_todo", "search_todos"]
    );
}

#[test]
fn test_one_response_per_request_in_order() {
    let env = TestEnv::new();
    let responses = serve(
        &env,
        &[
            rpc(1, "initialize", json!({})),
            rpc(2, "tools/list", json!({})),
            call(3, "list_todos", json!({})),
        ],
    );

    let ids: Vec<i64> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn test_blank_lines_skipped() {
    let env = TestEnv::new();
    let input = format!("\n\n{}\n\n", rpc(1, "tools/list", json!({})));
    let responses = serve_raw(&env, &input);
    assert_eq!(responses.len(), 1);
}

#[test]
fn test_malformed_line_gets_parse_error() {
    let env = TestEnv::new();
    let responses = serve_raw(&env, "this is not json\n");

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert!(responses[0].get("id").is_none());
}

#[test]
fn test_request_without_id_answered_without_id() {
    let env = TestEnv::new();
    let responses = serve_raw(&env, r#"{"jsonrpc":"2.0","method":"tools/list"}"#);

    assert_eq!(responses.len(), 1);
    assert!(responses[0].get("id").is_none());
    assert!(responses[0]["result"]["tools"].is_array());
}

#[test]
fn test_unknown_method() {
    let env = TestEnv::new();
    let responses = serve(&env, &[rpc(1, "resources/list", json!({}))]);

    assert_eq!(responses[0]["error"]["code"], -32601);
    assert!(
        responses[0]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("resources/list")
    );
}

#[test]
fn test_unknown_tool() {
    let env = TestEnv::new();
    let responses = serve(&env, &[call(1, "explode", json!({}))]);

    assert_eq!(responses[0]["error"]["code"], -32602);
    assert!(
        responses[0]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("explode")
    );
}

// =============================================================================
// Tool Behaviors
// =============================================================================

#[test]
fn test_add_then_list_round_trip() {
    let env = TestEnv::new();
    let responses = serve(
        &env,
        &[
            rpc(1, "initialize", json!({})),
            call(2, "add_todo", json!({"content": "Buy milk\nThe oat kind"})),
            call(3, "list_todos", json!({})),
        ],
    );

    assert_eq!(responses[1]["result"]["success"], true);
    let id = responses[1]["result"]["id"].as_i64().unwrap();

    let todos = responses[2]["result"]["todos"].as_array().unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0]["id"], id);
    assert_eq!(todos[0]["title"], "Buy milk");
    assert_eq!(todos[0]["content"], "Buy milk\nThe oat kind");
    assert_eq!(todos[0]["status"], "todo");
}

#[test]
fn test_add_without_content_is_internal_error() {
    let env = TestEnv::new();
    let responses = serve(&env, &[call(1, "add_todo", json!({}))]);

    assert_eq!(responses[0]["error"]["code"], -32603);
    assert!(
        responses[0]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("content")
    );
}

#[test]
fn test_update_marks_done() {
    let env = TestEnv::new();
    let responses = serve(
        &env,
        &[
            call(1, "add_todo", json!({"content": "Water plants"})),
            call(2, "update_todo", json!({"id": 1, "done": true})),
            call(3, "list_todos", json!({})),
        ],
    );

    assert_eq!(responses[1]["result"]["success"], true);
    let todos = responses[2]["result"]["todos"].as_array().unwrap();
    assert_eq!(todos[0]["status"], "done");
    assert!(todos[0]["completed_at"].is_string());
}

#[test]
fn test_update_with_nothing_to_change() {
    let env = TestEnv::new();
    let responses = serve(
        &env,
        &[
            call(1, "add_todo", json!({"content": "Stable"})),
            call(2, "update_todo", json!({"id": 1})),
            call(3, "update_todo", json!({"id": 999, "done": true})),
        ],
    );

    assert_eq!(responses[1]["result"]["success"], false);
    assert_eq!(responses[2]["result"]["success"], false);
}

#[test]
fn test_delete() {
    let env = TestEnv::new();
    let responses = serve(
        &env,
        &[
            call(1, "add_todo", json!({"content": "Ephemeral"})),
            call(2, "delete_todo", json!({"id": 1})),
            call(3, "delete_todo", json!({"id": 1})),
            call(4, "list_todos", json!({})),
        ],
    );

    assert_eq!(responses[1]["result"]["success"], true);
    assert_eq!(responses[2]["result"]["success"], false);
    assert!(responses[3]["result"]["todos"].as_array().unwrap().is_empty());
}

#[test]
fn test_search() {
    let env = TestEnv::new();
    let responses = serve(
        &env,
        &[
            call(1, "add_todo", json!({"content": "Fix parser crash"})),
            call(2, "add_todo", json!({"content": "Write changelog"})),
            call(3, "search_todos", json!({"query": "parser"})),
        ],
    );

    let todos = responses[2]["result"]["todos"].as_array().unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0]["title"], "Fix parser crash");
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_tool_effects_persist_after_server_exits() {
    let env = TestEnv::new();
    serve(
        &env,
        &[call(1, "add_todo", json!({"content": "Survive the restart"}))],
    );

    let store = env.store();
    let todo = store.get(1).unwrap().unwrap();
    assert_eq!(todo.title, "Survive the restart");
}
