//! Transport to external tracker adapters.
//!
//! Adapters are MCP servers spawned as child processes; we speak the same
//! line-delimited JSON-RPC to them that our own server speaks to clients.
//! The transport is a trait so the sync engine can run against a scripted
//! fake in tests.

use crate::protocol::{PROTOCOL_VERSION, RpcRequest, RpcResponse};
use eyre::{Context, Result, bail};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// One `tools/call` round trip to a named adapter.
pub trait AdapterTransport {
    fn call_tool(&mut self, server: &str, tool: &str, arguments: Value) -> Result<Value>;
}

impl<T: AdapterTransport + ?Sized> AdapterTransport for &mut T {
    fn call_tool(&mut self, server: &str, tool: &str, arguments: Value) -> Result<Value> {
        (**self).call_tool(server, tool, arguments)
    }
}

/// A spawned adapter with its pipe ends.
struct AdapterProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: i64,
}

impl AdapterProcess {
    /// Send one request and block for its response line.
    fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest::new(Some(json!(id)), method, params);
        let payload = serde_json::to_string(&request)?;
        writeln!(self.stdin, "{}", payload).context("Failed to write to adapter")?;
        self.stdin.flush().context("Failed to flush adapter stdin")?;

        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .context("Failed to read from adapter")?;
        if read == 0 {
            bail!("adapter closed its stdout");
        }

        let response: RpcResponse =
            serde_json::from_str(line.trim()).context("Failed to parse adapter response")?;
        if let Some(error) = response.error {
            bail!("adapter error {}: {}", error.code, error.message);
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

/// Spawns one child process per adapter, lazily, and keeps it for the
/// life of the transport.
pub struct StdioTransport {
    commands: HashMap<String, Vec<String>>,
    processes: HashMap<String, AdapterProcess>,
}

impl StdioTransport {
    /// Build a transport from adapter name to argv.
    pub fn new(commands: HashMap<String, Vec<String>>) -> Self {
        Self {
            commands,
            processes: HashMap::new(),
        }
    }

    fn ensure_process(&mut self, server: &str) -> Result<&mut AdapterProcess> {
        let commands = &self.commands;
        match self.processes.entry(server.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let argv = commands
                    .get(server)
                    .ok_or_else(|| eyre::eyre!("no adapter command configured for '{}'", server))?;
                let process = spawn_adapter(argv)?;
                Ok(entry.insert(process))
            }
        }
    }
}

fn spawn_adapter(argv: &[String]) -> Result<AdapterProcess> {
    let Some((program, args)) = argv.split_first() else {
        bail!("adapter command is empty");
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to spawn adapter '{}'", program))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| eyre::eyre!("adapter stdin unavailable"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| eyre::eyre!("adapter stdout unavailable"))?;

    let mut process = AdapterProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout),
        next_id: 1,
    };

    process.request(
        "initialize",
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "punchlist",
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
    )?;

    Ok(process)
}

impl AdapterTransport for StdioTransport {
    fn call_tool(&mut self, server: &str, tool: &str, arguments: Value) -> Result<Value> {
        let process = self.ensure_process(server)?;
        process.request("tools/call", json!({ "name": tool, "arguments": arguments }))
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for (name, process) in self.processes.iter_mut() {
            if let Err(e) = process.child.kill() {
                log::debug!("Failed to kill adapter '{}': {}", name, e);
            }
            let _ = process.child.wait();
        }
    }
}
