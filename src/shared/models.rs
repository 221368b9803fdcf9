use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::ValidationError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    /// Ingested project file content; never part of the conversation.
    Project,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Project => "project",
        }
    }

    /// Parse a role a caller may submit. `project` is reserved.
    pub fn parse_conversational(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(ValidationError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaggingMode {
    #[default]
    Automatic,
    Manual,
}

impl TaggingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaggingMode::Automatic => "automatic",
            TaggingMode::Manual => "manual",
        }
    }
}

impl FromStr for TaggingMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "automatic" | "auto" => Ok(TaggingMode::Automatic),
            "manual" => Ok(TaggingMode::Manual),
            _ => Err(ValidationError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for TaggingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation turn as stored in the conversation namespace.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Integer payload field history and tag listings are sorted on.
pub const MESSAGE_ORDER_FIELD: &str = "timestamp_micros";

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tags: Vec::new(),
            timestamp: Utc::now(),
            summary: None,
        }
    }

    /// Append a tag unless already present; existing tags are kept.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("role".into(), json!(self.role));
        fields.insert("content".into(), json!(self.content));
        fields.insert("tags".into(), json!(self.tags));
        fields.insert("timestamp".into(), json!(self.timestamp.to_rfc3339()));
        fields.insert("timestamp_unix".into(), json!(self.timestamp.timestamp()));
        fields.insert(
            MESSAGE_ORDER_FIELD.into(),
            json!(self.timestamp.timestamp_micros()),
        );
        if let Some(summary) = &self.summary {
            fields.insert("summary".into(), json!(summary));
        }
        fields
    }

    pub fn from_fields(id: &str, fields: &Map<String, Value>) -> Option<Self> {
        let role = serde_json::from_value(fields.get("role")?.clone()).ok()?;
        let content = fields.get("content")?.as_str()?.to_string();
        let timestamp = fields
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))?;
        let tags = fields
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();
        let summary = fields
            .get("summary")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Some(Self {
            id: id.to_string(),
            role,
            content,
            tags,
            timestamp,
            summary,
        })
    }
}

/// A project file's remote-store representation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IndexedFile {
    /// Root-relative, forward-slash path.
    pub path: String,
    /// Absolute project root the path is relative to.
    pub project: String,
    pub content: String,
    pub language: String,
    pub tag: Option<String>,
    /// Modification time, Unix seconds.
    pub last_modified: i64,
    pub content_hash: String,
    pub size: u64,
}

impl IndexedFile {
    /// Stable id so a re-upsert replaces the previous record.
    pub fn point_id(project: &str, path: &str) -> String {
        let key = format!("{project}\n{path}");
        Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
    }

    pub fn id(&self) -> String {
        Self::point_id(&self.project, &self.path)
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("role".into(), json!(Role::Project));
        fields.insert("path".into(), json!(self.path));
        fields.insert("project".into(), json!(self.project));
        fields.insert("content".into(), json!(self.content));
        fields.insert("language".into(), json!(self.language));
        fields.insert("tag".into(), json!(self.tag));
        fields.insert("last_modified".into(), json!(self.last_modified));
        fields.insert("content_hash".into(), json!(self.content_hash));
        fields.insert("size".into(), json!(self.size));
        fields.insert("indexed_at".into(), json!(Utc::now().to_rfc3339()));
        fields
    }

    pub fn from_fields(fields: &Map<String, Value>) -> Option<Self> {
        Some(Self {
            path: fields.get("path")?.as_str()?.to_string(),
            project: fields.get("project")?.as_str()?.to_string(),
            content: fields
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            language: fields
                .get("language")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            tag: fields
                .get("tag")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            last_modified: fields.get("last_modified")?.as_i64()?,
            content_hash: fields
                .get("content_hash")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            size: fields.get("size").and_then(|v| v.as_u64()).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageHit {
    pub score: f32,
    pub message: Message,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileHit {
    pub score: f32,
    pub path: String,
    pub project: String,
    pub language: String,
    pub tag: Option<String>,
    pub snippet: String,
}
