pub mod memory;
pub mod qdrant;

pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::StoreError;
use super::filter::Filter;

/// Logical partition of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Conversation,
    ProjectFiles,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: String,
    pub fields: Map<String, Value>,
    pub vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub fields: Map<String, Value>,
}

/// Sort on an integer payload field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub key: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl OrderBy {
    pub fn desc(key: &str) -> Self {
        Self {
            key: key.to_string(),
            direction: Direction::Desc,
        }
    }
}

/// Key/vector store holding both conversation messages and project files.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or replace the point with this id.
    async fn upsert(
        &self,
        namespace: Namespace,
        id: &str,
        vector: Vec<f32>,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;

    async fn query_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<Point>, StoreError>;

    /// Up to `limit` points matching `filter`, sorted on `order`. Points
    /// without the order field are left out.
    async fn query_ordered(
        &self,
        namespace: Namespace,
        filter: &Filter,
        order: &OrderBy,
        limit: usize,
    ) -> Result<Vec<Point>, StoreError>;

    async fn delete_by_filter(&self, namespace: Namespace, filter: &Filter)
    -> Result<(), StoreError>;

    async fn count_by_filter(&self, namespace: Namespace, filter: &Filter)
    -> Result<u64, StoreError>;

    /// Nearest neighbours of `vector` among points matching `filter`.
    async fn search(
        &self,
        namespace: Namespace,
        vector: Vec<f32>,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Merge `fields` into an existing point's payload.
    async fn update_fields(
        &self,
        namespace: Namespace,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;
}
