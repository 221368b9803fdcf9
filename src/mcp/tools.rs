use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn no_args() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn list_tools() -> Vec<Tool> {
    vec![
        tool(
            "add_message",
            "Store a conversation message. The current conversation tag is applied; in automatic mode every full buffer is categorized.",
            json!({
                "type": "object",
                "properties": {
                    "role": { "type": "string", "enum": ["user", "assistant", "system"] },
                    "content": { "type": "string" }
                },
                "required": ["role", "content"]
            }),
        ),
        tool(
            "get_history",
            "Most recent conversation messages, oldest first.",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "default": 20 }
                }
            }),
        ),
        tool(
            "search",
            "Semantic search over conversation messages (project files excluded).",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": { "type": "integer", "default": 5 }
                },
                "required": ["query"]
            }),
        ),
        tool(
            "index_project",
            "Index text files under a directory. New and changed files are upserted and stamped with the tag.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "tag": { "type": "string", "optional": true }
                },
                "required": ["path"]
            }),
        ),
        tool(
            "update_project",
            "Re-sync a previously indexed directory. Only files modified since the last run are upserted.",
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }),
        ),
        tool(
            "prune_missing_project_files",
            "Delete stored records of files that no longer exist under the directory.",
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }),
        ),
        tool(
            "search_project_files",
            "Semantic search over indexed project files.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": { "type": "integer", "default": 5 },
                    "tag": { "type": "string", "optional": true }
                },
                "required": ["query"]
            }),
        ),
        tool("get_stats", "Message and file counts plus tagging state.", no_args()),
        tool(
            "delete_message",
            "Delete one conversation message by id.",
            json!({
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"]
            }),
        ),
        tool(
            "delete_all_messages",
            "Delete every conversation message. Project files are kept.",
            no_args(),
        ),
        tool(
            "delete_messages_in_range",
            "Delete conversation messages created within a time range.",
            json!({
                "type": "object",
                "properties": {
                    "after": { "type": "string", "description": "YYYY-MM-DD or ISO 8601", "optional": true },
                    "before": { "type": "string", "description": "YYYY-MM-DD or ISO 8601", "optional": true }
                }
            }),
        ),
        tool(
            "tag_messages",
            "Append a tag to the given messages. Existing tags are kept.",
            json!({
                "type": "object",
                "properties": {
                    "ids": { "type": "array", "items": { "type": "string" } },
                    "tag": { "type": "string" }
                },
                "required": ["ids", "tag"]
            }),
        ),
        tool(
            "get_messages_by_tag",
            "Messages carrying a tag, newest first.",
            json!({
                "type": "object",
                "properties": {
                    "tag": { "type": "string" },
                    "limit": { "type": "integer", "default": 20 }
                },
                "required": ["tag"]
            }),
        ),
        tool(
            "set_summary",
            "Attach a summary to a message.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "summary": { "type": "string" }
                },
                "required": ["id", "summary"]
            }),
        ),
        tool(
            "delete_project_file",
            "Delete one indexed file by its project-relative path.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "project": { "type": "string", "optional": true }
                },
                "required": ["path"]
            }),
        ),
        tool(
            "delete_all_project_files",
            "Delete every indexed file, or only those with the given tag.",
            json!({
                "type": "object",
                "properties": { "tag": { "type": "string", "optional": true } }
            }),
        ),
        tool(
            "set_tag",
            "Set the conversation tag applied to new messages. Empty clears it.",
            json!({
                "type": "object",
                "properties": { "tag": { "type": "string" } },
                "required": ["tag"]
            }),
        ),
        tool("get_tag", "Current conversation tag.", no_args()),
        tool(
            "set_mode",
            "Switch tagging mode. Switching to automatic categorizes buffered messages immediately.",
            json!({
                "type": "object",
                "properties": { "mode": { "type": "string", "enum": ["automatic", "manual"] } },
                "required": ["mode"]
            }),
        ),
        tool("get_mode", "Current tagging mode.", no_args()),
    ]
}
