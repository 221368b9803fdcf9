use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, info};

use super::{Namespace, OrderBy, Point, RemoteStore, ScoredPoint};
use crate::shared::config::StoreConfig;
use crate::shared::error::StoreError;
use crate::shared::filter::Filter;
use crate::shared::models::MESSAGE_ORDER_FIELD;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScrollPage {
    points: Vec<RawPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    id: Value,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
    #[serde(default)]
    score: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `RemoteStore` over the Qdrant REST API.
pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    conversation_collection: String,
    project_collection: String,
    vector_size: usize,
    page_size: usize,
}

impl QdrantStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            conversation_collection: config.conversation_collection.clone(),
            project_collection: config.project_collection.clone(),
            vector_size: config.vector_size,
            page_size: config.scan_page_size.max(1),
        })
    }

    fn collection(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::Conversation => &self.conversation_collection,
            Namespace::ProjectFiles => &self.project_collection,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, StoreError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.result)
    }

    /// Create both collections if they do not exist yet.
    pub async fn ensure_collections(&self) -> Result<(), StoreError> {
        let mut names = vec![self.conversation_collection.clone()];
        if self.project_collection != self.conversation_collection {
            names.push(self.project_collection.clone());
        }

        for name in names {
            let response = self
                .request(Method::GET, &format!("/collections/{name}"))
                .send()
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                info!("Creating collection {} (size {})", name, self.vector_size);
                let body = json!({
                    "vectors": { "size": self.vector_size, "distance": "Cosine" }
                });
                let _: Value = self
                    .send(
                        self.request(Method::PUT, &format!("/collections/{name}"))
                            .json(&body),
                    )
                    .await?;
            } else if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::Status { status, body });
            }
        }

        // Ordered scrolls need an integer index on the order field.
        let body = json!({ "field_name": MESSAGE_ORDER_FIELD, "field_schema": "integer" });
        let path = format!(
            "/collections/{}/index?wait=true",
            self.conversation_collection
        );
        let _: Value = self.send(self.request(Method::PUT, &path).json(&body)).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for QdrantStore {
    async fn upsert(
        &self,
        namespace: Namespace,
        id: &str,
        vector: Vec<f32>,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let path = format!("/collections/{}/points?wait=true", self.collection(namespace));
        let body = json!({
            "points": [{ "id": id, "vector": vector, "payload": fields }]
        });
        let _: Value = self.send(self.request(Method::PUT, &path).json(&body)).await?;
        Ok(())
    }

    async fn query_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<Point>, StoreError> {
        let path = format!("/collections/{}/points/scroll", self.collection(namespace));
        let mut points = Vec::new();
        let mut offset: Option<Value> = None;

        while points.len() < limit {
            let mut body = json!({
                "filter": filter,
                "limit": self.page_size.min(limit - points.len()),
                "with_payload": true,
                "with_vector": with_vectors,
            });
            if let Some(offset) = offset.take() {
                body["offset"] = offset;
            }

            let page: ScrollPage = self.send(self.request(Method::POST, &path).json(&body)).await?;
            debug!(
                "Scrolled {} points from {}",
                page.points.len(),
                self.collection(namespace)
            );

            points.extend(page.points.into_iter().map(|raw| Point {
                id: id_to_string(&raw.id),
                fields: raw.payload.unwrap_or_default(),
                vector: raw.vector,
            }));

            match page.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }

        points.truncate(limit);
        Ok(points)
    }

    async fn query_ordered(
        &self,
        namespace: Namespace,
        filter: &Filter,
        order: &OrderBy,
        limit: usize,
    ) -> Result<Vec<Point>, StoreError> {
        let path = format!("/collections/{}/points/scroll", self.collection(namespace));
        let body = json!({
            "filter": filter,
            "limit": limit,
            "order_by": order,
            "with_payload": true,
            "with_vector": false,
        });

        let page: ScrollPage = self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(page
            .points
            .into_iter()
            .map(|raw| Point {
                id: id_to_string(&raw.id),
                fields: raw.payload.unwrap_or_default(),
                vector: None,
            })
            .collect())
    }

    async fn delete_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
    ) -> Result<(), StoreError> {
        let path = format!(
            "/collections/{}/points/delete?wait=true",
            self.collection(namespace)
        );
        let body = json!({ "filter": filter });
        let _: Value = self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(())
    }

    async fn count_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        let path = format!("/collections/{}/points/count", self.collection(namespace));
        let body = json!({ "filter": filter, "exact": true });
        let result: CountResult = self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(result.count)
    }

    async fn search(
        &self,
        namespace: Namespace,
        vector: Vec<f32>,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let path = format!("/collections/{}/points/search", self.collection(namespace));
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if !filter.is_empty() {
            body["filter"] = serde_json::to_value(filter)?;
        }

        let hits: Vec<RawPoint> = self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(hits
            .into_iter()
            .map(|raw| ScoredPoint {
                id: id_to_string(&raw.id),
                score: raw.score.unwrap_or_default(),
                fields: raw.payload.unwrap_or_default(),
            })
            .collect())
    }

    async fn update_fields(
        &self,
        namespace: Namespace,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let path = format!(
            "/collections/{}/points/payload?wait=true",
            self.collection(namespace)
        );
        let body = json!({ "payload": fields, "points": [id] });
        let _: Value = self.send(self.request(Method::POST, &path).json(&body)).await?;
        Ok(())
    }
}
