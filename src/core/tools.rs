use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::core::datastore::ColumnSpec;

/// A tool call decoded into one of the functions this process actually
/// implements. Parsing never fails: a known name with malformed arguments
/// becomes `Invalid` (answered with an error payload so the run can
/// continue), and a name we do not manage becomes `Unknown`.
#[derive(Debug)]
pub enum ToolRequest {
    CreateCustomTable(CreateTableArgs),
    ListCustomTables,
    InsertRow(InsertRowArgs),
    GetRows(GetRowsArgs),
    UpdateRow(UpdateRowArgs),
    DeleteRow(DeleteRowArgs),
    DelegateToSpecialist(DelegateArgs),
    Unknown { name: String },
    Invalid { name: String, error: String },
}

#[derive(Debug, Deserialize)]
pub struct CreateTableArgs {
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Deserialize)]
pub struct InsertRowArgs {
    pub table_name: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct GetRowsArgs {
    pub table_name: String,
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRowArgs {
    pub table_name: String,
    pub row_id: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRowArgs {
    pub table_name: String,
    pub row_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DelegateArgs {
    pub specialist: String,
    pub task: String,
}

impl ToolRequest {
    /// Decode a `(function_name, arguments_json)` pair as the assistant
    /// service delivers it. An empty argument string counts as `{}`.
    pub fn parse(name: &str, arguments: &str) -> Self {
        let raw = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };

        fn args<T: serde::de::DeserializeOwned>(
            name: &str,
            raw: &str,
            build: impl FnOnce(T) -> ToolRequest,
        ) -> ToolRequest {
            match serde_json::from_str(raw) {
                Ok(parsed) => build(parsed),
                Err(e) => ToolRequest::Invalid {
                    name: name.to_string(),
                    error: e.to_string(),
                },
            }
        }

        match name {
            "create_custom_table" => args(name, raw, Self::CreateCustomTable),
            "list_custom_tables" => Self::ListCustomTables,
            "insert_row" => args(name, raw, Self::InsertRow),
            "get_rows" => args(name, raw, Self::GetRows),
            "update_row" => args(name, raw, Self::UpdateRow),
            "delete_row" => args(name, raw, Self::DeleteRow),
            "delegate_to_specialist" => args(name, raw, Self::DelegateToSpecialist),
            other => Self::Unknown {
                name: other.to_string(),
            },
        }
    }
}

/// Function names owned by this process. `sync-tools` strips these from an
/// assistant before re-publishing, so foreign functions survive the sync.
pub const MANAGED_TOOL_NAMES: [&str; 7] = [
    "create_custom_table",
    "list_custom_tables",
    "insert_row",
    "get_rows",
    "update_row",
    "delete_row",
    "delegate_to_specialist",
];

/// Schemas published to every persona: the four row operations.
pub fn shared_tools() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": "insert_row",
                "description": "Insert a new row into a database table",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "table_name": {
                            "type": "string",
                            "description": "Table name (e.g. custom_festivals)"
                        },
                        "data": {
                            "type": "object",
                            "description": "Column/value pairs to insert"
                        }
                    },
                    "required": ["table_name", "data"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "get_rows",
                "description": "Read rows from a database table",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "table_name": { "type": "string" },
                        "filters": {
                            "type": "object",
                            "description": "Optional equality filters"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum rows to return (default 100)"
                        }
                    },
                    "required": ["table_name"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "update_row",
                "description": "Update an existing row in a table",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "table_name": { "type": "string" },
                        "row_id": {
                            "type": "string",
                            "description": "UUID of the row to update"
                        },
                        "data": {
                            "type": "object",
                            "description": "Fields to update"
                        }
                    },
                    "required": ["table_name", "row_id", "data"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "delete_row",
                "description": "Delete a row from a table",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "table_name": { "type": "string" },
                        "row_id": {
                            "type": "string",
                            "description": "UUID of the row to delete"
                        }
                    },
                    "required": ["table_name", "row_id"]
                }
            }
        }),
    ]
}

/// Additional schemas published only to the coordinator: table management
/// and delegation.
pub fn coordinator_tools() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": "create_custom_table",
                "description": "Create a new database table for project data",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "table_name": {
                            "type": "string",
                            "description": "Table name (the custom_ prefix is added automatically)"
                        },
                        "columns": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "name": { "type": "string" },
                                    "type": {
                                        "type": "string",
                                        "enum": ["text", "number", "date", "datetime", "boolean", "json"]
                                    }
                                },
                                "required": ["name", "type"]
                            },
                            "description": "Column definitions"
                        }
                    },
                    "required": ["table_name", "columns"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "list_custom_tables",
                "description": "List all custom tables created so far",
                "parameters": { "type": "object", "properties": {} }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "delegate_to_specialist",
                "description": "Hand a task to one of the specialist personas",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "specialist": {
                            "type": "string",
                            "description": "Persona key of the specialist"
                        },
                        "task": {
                            "type": "string",
                            "description": "What the specialist should do"
                        }
                    },
                    "required": ["specialist", "task"]
                }
            }
        }),
    ]
}
