//! Tool catalog exposed over `tools/list`.

use serde_json::{Value, json};

/// The tools this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    ListTodos,
    AddTodo,
    UpdateTodo,
    DeleteTodo,
    SearchTodos,
}

/// Every tool, in the order `tools/list` reports them.
pub const ALL_TOOLS: &[ToolName] = &[
    ToolName::ListTodos,
    ToolName::AddTodo,
    ToolName::UpdateTodo,
    ToolName::DeleteTodo,
    ToolName::SearchTodos,
];

impl ToolName {
    /// Wire name of the tool.
    pub fn name(&self) -> &'static str {
        match self {
            ToolName::ListTodos => "list_todos",
            ToolName::AddTodo => "add_todo",
            ToolName::UpdateTodo => "update_todo",
            ToolName::DeleteTodo => "delete_todo",
            ToolName::SearchTodos => "search_todos",
        }
    }

    /// Look up a tool by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_TOOLS.iter().copied().find(|tool| tool.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::ListTodos => "List all todos, open items first",
            ToolName::AddTodo => "Add a new todo",
            ToolName::UpdateTodo => "Update an existing todo's content or completion state",
            ToolName::DeleteTodo => "Delete a todo by id",
            ToolName::SearchTodos => "Search todos by content substring",
        }
    }

    /// JSON Schema for the tool's `arguments` object.
    pub fn input_schema(&self) -> Value {
        match self {
            ToolName::ListTodos => json!({
                "type": "object",
                "properties": {}
            }),
            ToolName::AddTodo => json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "Todo text; the first line becomes the title"
                    }
                },
                "required": ["content"]
            }),
            ToolName::UpdateTodo => json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "integer",
                        "description": "Todo id"
                    },
                    "content": {
                        "type": "string",
                        "description": "Replacement text"
                    },
                    "done": {
                        "type": "boolean",
                        "description": "Completion state"
                    }
                },
                "required": ["id"]
            }),
            ToolName::DeleteTodo => json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "integer",
                        "description": "Todo id"
                    }
                },
                "required": ["id"]
            }),
            ToolName::SearchTodos => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Substring to match against todo content"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    /// Full descriptor as `tools/list` reports it.
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "inputSchema": self.input_schema(),
        })
    }
}

/// The `tools/list` result payload.
pub fn list_tools() -> Value {
    let tools: Vec<Value> = ALL_TOOLS.iter().map(|tool| tool.descriptor()).collect();
    json!({ "tools": tools })
}
