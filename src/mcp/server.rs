use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
use tracing::{debug, error, info};

use super::format::{
    format_file_hits, format_message_hits, format_messages, format_prune_report, format_stats,
    format_sync_report,
};
use super::tools::{Tool, list_tools};
use crate::shared::{MemoryService, SyncReport, SyncStatus, TaggingMode};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Parse date string: YYYY-MM-DD (as start of day UTC) or full ISO 8601
fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    Err(anyhow!("Invalid date '{}': use YYYY-MM-DD or ISO 8601", s))
}

// MCP Protocol Structures
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct InitializeResponse {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfo,
}

#[derive(Debug, Serialize, Deserialize)]
struct ServerCapabilities {
    #[serde(default)]
    experimental: HashMap<String, Value>,
    #[serde(default)]
    logging: HashMap<String, Value>,
    #[serde(default)]
    prompts: HashMap<String, Value>,
    #[serde(default)]
    resources: HashMap<String, Value>,
    tools: HashMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ServerInfo {
    name: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListToolsResponse {
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CallToolRequest {
    name: String,
    arguments: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallToolResponse {
    pub content: Vec<ToolResult>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(rename = "type")]
    pub result_type: String,
    pub text: String,
}

impl CallToolResponse {
    fn text(text: String) -> Self {
        Self {
            content: vec![ToolResult {
                result_type: "text".to_string(),
                text,
            }],
            is_error: None,
        }
    }

    fn failure(text: String) -> Self {
        Self {
            is_error: Some(true),
            ..Self::text(text)
        }
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing '{}' parameter", key))
}

fn opt_str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

fn usize_arg(args: &Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(default)
}

fn string_list_arg(args: &Value, key: &str) -> Result<Vec<String>> {
    let list = args
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("Missing '{}' parameter", key))?;
    Ok(list
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect())
}

/// A run where nothing reached the store is reported as a tool error.
fn sync_result(report: &SyncReport) -> Result<String> {
    let text = format_sync_report(report);
    if report.status == SyncStatus::Failed {
        return Err(anyhow!(text));
    }
    Ok(text)
}

pub struct McpServer {
    service: Arc<MemoryService>,
}

impl McpServer {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self { service }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        debug!("Handling initialize request: {:?}", params);

        let response = InitializeResponse {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                experimental: HashMap::new(),
                logging: HashMap::new(),
                prompts: HashMap::new(),
                resources: HashMap::new(),
                tools: {
                    let mut tools = HashMap::new();
                    tools.insert("listChanged".to_string(), Value::Bool(false));
                    tools
                },
            },
            server_info: ServerInfo {
                name: "memory-sync".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(serde_json::to_value(response)?)
    }

    async fn handle_list_tools(&self) -> Result<Value> {
        debug!("Handling list_tools request");
        Ok(serde_json::to_value(ListToolsResponse {
            tools: list_tools(),
        })?)
    }

    async fn handle_call_tool(&self, params: Value) -> Result<Value> {
        let request: CallToolRequest = serde_json::from_value(params)?;
        debug!("Handling tool call: {}", request.name);

        let args = request.arguments.unwrap_or_default();
        let response = match self.call_tool(&request.name, &args).await {
            Ok(text) => CallToolResponse::text(text),
            Err(e) => {
                error!("Tool {} failed: {:#}", request.name, e);
                CallToolResponse::failure(format!("{e:#}"))
            }
        };

        Ok(serde_json::to_value(response)?)
    }

    async fn call_tool(&self, name: &str, args: &Value) -> Result<String> {
        match name {
            "add_message" => self.tool_add_message(args).await,
            "get_history" => self.tool_get_history(args).await,
            "search" => self.tool_search(args).await,
            "index_project" => self.tool_index_project(args).await,
            "update_project" => self.tool_update_project(args).await,
            "prune_missing_project_files" => self.tool_prune_project(args).await,
            "search_project_files" => self.tool_search_project_files(args).await,
            "get_stats" => Ok(format_stats(&self.service.stats().await?)),
            "delete_message" => self.tool_delete_message(args).await,
            "delete_all_messages" => {
                let deleted = self.service.conversations.delete_all_messages().await?;
                Ok(format!("Deleted {deleted} messages."))
            }
            "delete_messages_in_range" => self.tool_delete_messages_in_range(args).await,
            "tag_messages" => self.tool_tag_messages(args).await,
            "get_messages_by_tag" => self.tool_get_messages_by_tag(args).await,
            "set_summary" => self.tool_set_summary(args).await,
            "delete_project_file" => self.tool_delete_project_file(args).await,
            "delete_all_project_files" => self.tool_delete_all_project_files(args).await,
            "set_tag" => {
                let tag = str_arg(args, "tag")?;
                self.service.buffer().set_tag(tag);
                Ok(format!("Conversation tag set to '{}'.", self.service.buffer().tag()))
            }
            "get_tag" => {
                let tag = self.service.buffer().tag();
                Ok(if tag.is_empty() {
                    "No conversation tag set.".to_string()
                } else {
                    tag
                })
            }
            "set_mode" => self.tool_set_mode(args),
            "get_mode" => Ok(self.service.buffer().mode().to_string()),
            _ => Err(anyhow!("Unknown tool: {}", name)),
        }
    }

    async fn tool_add_message(&self, args: &Value) -> Result<String> {
        let role = str_arg(args, "role")?;
        let content = str_arg(args, "content")?;
        let message = self.service.conversations.add_message(role, content).await?;
        Ok(format!("Stored message {}", message.id))
    }

    async fn tool_get_history(&self, args: &Value) -> Result<String> {
        let limit = usize_arg(args, "limit", DEFAULT_HISTORY_LIMIT);
        let messages = self.service.conversations.get_history(limit).await?;
        Ok(format_messages("Conversation History", &messages))
    }

    async fn tool_search(&self, args: &Value) -> Result<String> {
        let query = str_arg(args, "query")?;
        let limit = usize_arg(args, "limit", DEFAULT_SEARCH_LIMIT);
        let hits = self.service.conversations.search(query, limit).await?;
        Ok(format_message_hits(query, &hits))
    }

    async fn tool_index_project(&self, args: &Value) -> Result<String> {
        let path = str_arg(args, "path")?;
        let tag = opt_str_arg(args, "tag").map(|t| t.to_string());
        let report = self
            .service
            .projects
            .index_project(Path::new(path), tag, &self.service.run_token())
            .await?;
        sync_result(&report)
    }

    async fn tool_update_project(&self, args: &Value) -> Result<String> {
        let path = str_arg(args, "path")?;
        let report = self
            .service
            .projects
            .update_project(Path::new(path), &self.service.run_token())
            .await?;
        sync_result(&report)
    }

    async fn tool_prune_project(&self, args: &Value) -> Result<String> {
        let path = str_arg(args, "path")?;
        let report = self.service.projects.prune_missing(Path::new(path)).await?;
        Ok(format_prune_report(&report))
    }

    async fn tool_search_project_files(&self, args: &Value) -> Result<String> {
        let query = str_arg(args, "query")?;
        let limit = usize_arg(args, "limit", DEFAULT_SEARCH_LIMIT);
        let tag = opt_str_arg(args, "tag");
        let hits = self
            .service
            .projects
            .search_project_files(query, limit, tag)
            .await?;
        Ok(format_file_hits(query, &hits))
    }

    async fn tool_delete_message(&self, args: &Value) -> Result<String> {
        let id = str_arg(args, "id")?;
        if self.service.conversations.delete_message(id).await? {
            Ok(format!("Deleted message {id}."))
        } else {
            Err(anyhow!("Message {} not found", id))
        }
    }

    async fn tool_delete_messages_in_range(&self, args: &Value) -> Result<String> {
        let after = opt_str_arg(args, "after").map(parse_date).transpose()?;
        let before = opt_str_arg(args, "before").map(parse_date).transpose()?;
        if matches!((after, before), (Some(after), Some(before)) if after > before) {
            return Err(anyhow!("'after' must not be later than 'before'"));
        }

        let deleted = self
            .service
            .conversations
            .delete_messages_in_range(after, before)
            .await?;
        Ok(format!("Deleted {deleted} messages."))
    }

    async fn tool_tag_messages(&self, args: &Value) -> Result<String> {
        let ids = string_list_arg(args, "ids")?;
        let tag = str_arg(args, "tag")?;
        let found = self.service.conversations.tag_messages(&ids, tag).await?;
        Ok(format!("Tagged {found} of {} messages with '{tag}'.", ids.len()))
    }

    async fn tool_get_messages_by_tag(&self, args: &Value) -> Result<String> {
        let tag = str_arg(args, "tag")?;
        let limit = usize_arg(args, "limit", DEFAULT_HISTORY_LIMIT);
        let messages = self
            .service
            .conversations
            .get_messages_by_tag(tag, limit)
            .await?;
        Ok(format_messages(&format!("Messages tagged '{tag}'"), &messages))
    }

    async fn tool_set_summary(&self, args: &Value) -> Result<String> {
        let id = str_arg(args, "id")?;
        let summary = str_arg(args, "summary")?;
        self.service.conversations.set_summary(id, summary).await?;
        Ok(format!("Summary set on {id}."))
    }

    async fn tool_delete_project_file(&self, args: &Value) -> Result<String> {
        let path = str_arg(args, "path")?;
        let project = opt_str_arg(args, "project");
        let deleted = self
            .service
            .projects
            .delete_project_file(path, project)
            .await?;
        Ok(format!("Deleted {deleted} records for {path}."))
    }

    async fn tool_delete_all_project_files(&self, args: &Value) -> Result<String> {
        let tag = opt_str_arg(args, "tag");
        let deleted = self.service.projects.delete_all_project_files(tag).await?;
        Ok(match tag {
            Some(tag) => format!("Deleted {deleted} project files tagged '{tag}'."),
            None => format!("Deleted {deleted} project files."),
        })
    }

    fn tool_set_mode(&self, args: &Value) -> Result<String> {
        let mode: TaggingMode = str_arg(args, "mode")?.parse()?;
        let flushed = self.service.buffer().set_mode(mode);
        Ok(if flushed > 0 {
            format!("Tagging mode set to {mode}; categorizing {flushed} buffered messages.")
        } else {
            format!("Tagging mode set to {mode}.")
        })
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => {
                self.handle_call_tool(request.params.unwrap_or_default())
                    .await
            }
            _ => Err(anyhow!("Unknown method: {}", request.method)),
        };

        match result {
            Ok(result) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(result),
                error: None,
            },
            Err(e) => JsonRpcResponse::error(request.id, -32603, e.to_string()),
        }
    }

    /// Handle one line of input. Notifications and blank lines get no reply.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        if line.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) if request.id.is_none() && request.method.starts_with("notifications/") => {
                debug!("Ignoring notification {}", request.method);
                None
            }
            Ok(request) => Some(self.handle_request(request).await),
            Err(e) => {
                error!("Failed to parse JSON-RPC request: {}", e);
                Some(JsonRpcResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {e}"),
                ))
            }
        }
    }
}

/// Serve JSON-RPC over stdin/stdout until stdin closes.
pub async fn run_mcp_server(service: Arc<MemoryService>) -> Result<()> {
    let server = McpServer::new(service);
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = AsyncBufReader::new(stdin).lines();

    while let Some(line) = reader.next_line().await? {
        debug!("Received line: {}", line);

        if let Some(response) = server.handle_line(&line).await {
            let response_json = serde_json::to_string(&response)?;
            debug!("Sending response: {}", response_json);

            stdout.write_all(response_json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    info!("stdin closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{Config, memory_store};
    use serde_json::json;

    fn server() -> McpServer {
        let service = MemoryService::new(&Config::default(), memory_store());
        McpServer::new(Arc::new(service))
    }

    async fn call(server: &McpServer, name: &str, arguments: Value) -> CallToolResponse {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/call".to_string(),
            params: Some(json!({ "name": name, "arguments": arguments })),
        };
        let response = server.handle_request(request).await;
        serde_json::from_value(response.result.expect("tool result")).expect("call response")
    }

    #[test]
    fn test_parse_date() {
        let day = parse_date("2024-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_date("2024-03-01T12:00:00Z").is_ok());
        assert!(parse_date("yesterday").is_err());
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let server = server();
        let init = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(init.result.unwrap()["serverInfo"]["name"], "memory-sync");

        let list = server
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = list.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, list_tools().len());
    }

    #[tokio::test]
    async fn test_notifications_and_garbage() {
        let server = server();
        assert!(
            server
                .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .await
                .is_none()
        );
        assert!(server.handle_line("   ").await.is_none());

        let parse_error = server.handle_line("{not json").await.unwrap();
        assert_eq!(parse_error.error.unwrap().code, -32700);

        let unknown = server
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(unknown.error.unwrap().code, -32603);
    }

    #[tokio::test]
    async fn test_add_message_then_history() {
        let server = server();
        let added = call(
            &server,
            "add_message",
            json!({ "role": "user", "content": "the compile error is back" }),
        )
        .await;
        assert!(added.is_error.is_none());

        let history = call(&server, "get_history", json!({ "limit": 10 })).await;
        assert!(history.content[0].text.contains("the compile error is back"));
    }

    #[tokio::test]
    async fn test_tool_errors_are_reported_in_result() {
        let server = server();

        let bad_role = call(
            &server,
            "add_message",
            json!({ "role": "project", "content": "x" }),
        )
        .await;
        assert_eq!(bad_role.is_error, Some(true));

        let missing = call(&server, "search", json!({})).await;
        assert_eq!(missing.is_error, Some(true));
        assert!(missing.content[0].text.contains("Missing 'query'"));

        let unknown = call(&server, "respawn_server", json!({})).await;
        assert_eq!(unknown.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_tag_and_mode_tools() {
        let server = server();

        call(&server, "set_tag", json!({ "tag": " sprint-3 " })).await;
        let tag = call(&server, "get_tag", json!({})).await;
        assert_eq!(tag.content[0].text, "sprint-3");

        call(&server, "set_mode", json!({ "mode": "manual" })).await;
        let mode = call(&server, "get_mode", json!({})).await;
        assert_eq!(mode.content[0].text, "manual");

        let bad = call(&server, "set_mode", json!({ "mode": "sometimes" })).await;
        assert_eq!(bad.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_delete_range_rejects_inverted_bounds() {
        let server = server();
        let response = call(
            &server,
            "delete_messages_in_range",
            json!({ "after": "2024-02-01", "before": "2024-01-01" }),
        )
        .await;
        assert_eq!(response.is_error, Some(true));
    }
}
