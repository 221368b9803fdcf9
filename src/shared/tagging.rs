use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::StoreError;
use super::filter::Filter;
use super::models::Role;
use super::store::{Namespace, RemoteStore};

/// Serializes tag writes so that concurrent appends to the same message
/// cannot overwrite each other's read-modify-write.
pub struct Tagger {
    store: Arc<dyn RemoteStore>,
    writes: Mutex<()>,
}

impl Tagger {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            writes: Mutex::new(()),
        }
    }

    /// Append `tags` to each conversation message in `ids`, keeping the tags
    /// already present. Returns how many messages were found.
    pub async fn append(&self, ids: &[String], tags: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() || tags.is_empty() {
            return Ok(0);
        }

        let _guard = self.writes.lock().await;
        let filter = Filter::new()
            .has_ids(ids)
            .must_not_match("role", Role::Project.as_str());
        let points = self
            .store
            .query_by_filter(Namespace::Conversation, &filter, ids.len(), false)
            .await?;

        for point in &points {
            let mut merged = tags_of(&point.fields);
            let before = merged.len();
            for tag in tags {
                if !merged.contains(tag) {
                    merged.push(tag.clone());
                }
            }
            if merged.len() == before {
                continue;
            }

            let mut fields = Map::new();
            fields.insert("tags".to_string(), json!(merged));
            self.store
                .update_fields(Namespace::Conversation, &point.id, fields)
                .await?;
        }

        debug!(
            "Tagged {}/{} messages with {:?}",
            points.len(),
            ids.len(),
            tags
        );
        Ok(points.len())
    }
}

pub fn tags_of(fields: &Map<String, Value>) -> Vec<String> {
    fields
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Message;
    use crate::shared::store::{MemoryStore, OrderBy, Point, ScoredPoint};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Pauses between reading a point and anything that follows.
    struct SlowReads(MemoryStore);

    #[async_trait]
    impl RemoteStore for SlowReads {
        async fn upsert(
            &self,
            namespace: Namespace,
            id: &str,
            vector: Vec<f32>,
            fields: Map<String, Value>,
        ) -> Result<(), StoreError> {
            self.0.upsert(namespace, id, vector, fields).await
        }

        async fn query_by_filter(
            &self,
            namespace: Namespace,
            filter: &Filter,
            limit: usize,
            with_vectors: bool,
        ) -> Result<Vec<Point>, StoreError> {
            let points = self
                .0
                .query_by_filter(namespace, filter, limit, with_vectors)
                .await?;
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(points)
        }

        async fn query_ordered(
            &self,
            namespace: Namespace,
            filter: &Filter,
            order: &OrderBy,
            limit: usize,
        ) -> Result<Vec<Point>, StoreError> {
            self.0.query_ordered(namespace, filter, order, limit).await
        }

        async fn delete_by_filter(
            &self,
            namespace: Namespace,
            filter: &Filter,
        ) -> Result<(), StoreError> {
            self.0.delete_by_filter(namespace, filter).await
        }

        async fn count_by_filter(
            &self,
            namespace: Namespace,
            filter: &Filter,
        ) -> Result<u64, StoreError> {
            self.0.count_by_filter(namespace, filter).await
        }

        async fn search(
            &self,
            namespace: Namespace,
            vector: Vec<f32>,
            filter: &Filter,
            limit: usize,
        ) -> Result<Vec<ScoredPoint>, StoreError> {
            self.0.search(namespace, vector, filter, limit).await
        }

        async fn update_fields(
            &self,
            namespace: Namespace,
            id: &str,
            fields: Map<String, Value>,
        ) -> Result<(), StoreError> {
            self.0.update_fields(namespace, id, fields).await
        }
    }

    async fn stored(store: &dyn RemoteStore, message: &Message) {
        store
            .upsert(Namespace::Conversation, &message.id, vec![1.0], message.to_fields())
            .await
            .unwrap();
    }

    async fn tags_in_store(store: &dyn RemoteStore) -> Vec<String> {
        let points = store
            .query_by_filter(Namespace::Conversation, &Filter::new(), 10, false)
            .await
            .unwrap();
        tags_of(&points[0].fields)
    }

    #[tokio::test]
    async fn test_append_keeps_existing_tags() {
        let store = Arc::new(MemoryStore::new());
        let mut message = Message::new(Role::User, "hi");
        message.add_tag("manual");
        stored(store.as_ref(), &message).await;

        let tagger = Tagger::new(store.clone());
        let ids = vec![message.id.clone(), "missing".to_string()];
        let tags = vec!["category:question".to_string(), "manual".to_string()];
        let found = tagger.append(&ids, &tags).await.unwrap();
        assert_eq!(found, 1);

        assert_eq!(
            tags_in_store(store.as_ref()).await,
            vec!["manual".to_string(), "category:question".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_appends_keep_both_tags() {
        let store: Arc<dyn RemoteStore> = Arc::new(SlowReads(MemoryStore::new()));
        let message = Message::new(Role::User, "bug bug bug");
        stored(store.as_ref(), &message).await;

        let tagger = Tagger::new(store.clone());
        let ids = vec![message.id.clone()];
        let reviewed = vec!["reviewed".to_string()];
        let technical = vec!["category:technical".to_string()];
        let (a, b) = tokio::join!(tagger.append(&ids, &reviewed), tagger.append(&ids, &technical));
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);

        let mut tags = tags_in_store(store.as_ref()).await;
        tags.sort();
        assert_eq!(
            tags,
            vec!["category:technical".to_string(), "reviewed".to_string()]
        );
    }
}
