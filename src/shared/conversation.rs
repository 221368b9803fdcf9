use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Map, json};
use std::sync::Arc;
use tracing::{debug, info};

use super::buffer::ConversationBuffer;
use super::embed::Embedder;
use super::error::ValidationError;
use super::filter::Filter;
use super::models::{MESSAGE_ORDER_FIELD, Message, MessageHit, Role};
use super::store::{Namespace, OrderBy, Point, RemoteStore};
use super::tagging::Tagger;

fn conversation_only() -> Filter {
    Filter::new().must_not_match("role", Role::Project.as_str())
}

fn to_messages(points: Vec<Point>) -> Vec<Message> {
    points
        .into_iter()
        .filter_map(|p| Message::from_fields(&p.id, &p.fields))
        .collect()
}

pub struct ConversationService {
    store: Arc<dyn RemoteStore>,
    embedder: Arc<dyn Embedder>,
    buffer: Arc<ConversationBuffer>,
    tagger: Arc<Tagger>,
    max_scan: usize,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        embedder: Arc<dyn Embedder>,
        buffer: Arc<ConversationBuffer>,
        tagger: Arc<Tagger>,
        max_scan: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            buffer,
            tagger,
            max_scan: max_scan.max(1),
        }
    }

    /// Store a new message and feed it to the tagging buffer.
    pub async fn add_message(&self, role: &str, content: &str) -> Result<Message> {
        let role = Role::parse_conversational(role)?;
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let mut message = Message::new(role, content);
        self.buffer.stamp(&mut message);

        let vector = self.embedder.embed(&message.content);
        self.store
            .upsert(
                Namespace::Conversation,
                &message.id,
                vector,
                message.to_fields(),
            )
            .await?;
        debug!("Stored message {} ({})", message.id, message.role);

        Ok(self.buffer.append_stamped(message))
    }

    /// Newest `limit` messages matching `filter`, newest first. `limit` is
    /// capped at `max_scan`.
    async fn newest(&self, filter: &Filter, limit: usize) -> Result<Vec<Message>> {
        let limit = limit.min(self.max_scan);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let points = self
            .store
            .query_ordered(
                Namespace::Conversation,
                filter,
                &OrderBy::desc(MESSAGE_ORDER_FIELD),
                limit,
            )
            .await?;
        Ok(to_messages(points))
    }

    /// The most recent `limit` messages, oldest first.
    pub async fn get_history(&self, limit: usize) -> Result<Vec<Message>> {
        let mut messages = self.newest(&conversation_only(), limit).await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<MessageHit>> {
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }

        let hits = self
            .store
            .search(
                Namespace::Conversation,
                self.embedder.embed(query),
                &conversation_only(),
                limit,
            )
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                Some(MessageHit {
                    score: hit.score,
                    message: Message::from_fields(&hit.id, &hit.fields)?,
                })
            })
            .collect())
    }

    /// Returns whether a message with this id existed.
    pub async fn delete_message(&self, id: &str) -> Result<bool> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        let filter = conversation_only().has_ids(&[id.to_string()]);
        Ok(self.delete_counted(filter).await? > 0)
    }

    /// Delete every conversation message; project files are untouched.
    pub async fn delete_all_messages(&self) -> Result<u64> {
        let deleted = self.delete_counted(conversation_only()).await?;
        info!("Deleted {} messages", deleted);
        Ok(deleted)
    }

    pub async fn delete_messages_in_range(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let filter = conversation_only().range(
            "timestamp_unix",
            after.map(|t| t.timestamp()),
            before.map(|t| t.timestamp()),
        );
        self.delete_counted(filter).await
    }

    async fn delete_counted(&self, filter: Filter) -> Result<u64> {
        let count = self
            .store
            .count_by_filter(Namespace::Conversation, &filter)
            .await?;
        if count > 0 {
            self.store
                .delete_by_filter(Namespace::Conversation, &filter)
                .await?;
        }
        Ok(count)
    }

    /// Append `tag` to each message. Returns how many were found.
    pub async fn tag_messages(&self, ids: &[String], tag: &str) -> Result<usize> {
        let ids: Vec<String> = ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(ValidationError::EmptyIdList.into());
        }
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ValidationError::EmptyTag.into());
        }

        Ok(self.tagger.append(&ids, &[tag.to_string()]).await?)
    }

    /// Messages carrying `tag`, newest first.
    pub async fn get_messages_by_tag(&self, tag: &str, limit: usize) -> Result<Vec<Message>> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ValidationError::EmptyTag.into());
        }

        let filter = conversation_only().must_match("tags", tag);
        self.newest(&filter, limit).await
    }

    pub async fn set_summary(&self, id: &str, summary: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        if summary.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let mut fields = Map::new();
        fields.insert("summary".to_string(), json!(summary.trim()));
        self.store
            .update_fields(Namespace::Conversation, id, fields)
            .await?;
        Ok(())
    }

    pub async fn count_messages(&self) -> Result<u64> {
        Ok(self
            .store
            .count_by_filter(Namespace::Conversation, &conversation_only())
            .await?)
    }
}
