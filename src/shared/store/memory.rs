use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{Direction, Namespace, OrderBy, Point, RemoteStore, ScoredPoint};
use crate::shared::embed::cosine_similarity;
use crate::shared::error::StoreError;
use crate::shared::filter::Filter;

#[derive(Debug, Clone)]
struct StoredPoint {
    vector: Vec<f32>,
    fields: Map<String, Value>,
}

/// In-process store. Useful offline and as the store behind tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Namespace, BTreeMap<String, StoredPoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, namespace: Namespace) -> usize {
        self.lock()
            .get(&namespace)
            .map(|points| points.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, namespace: Namespace) -> bool {
        self.len(namespace) == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Namespace, BTreeMap<String, StoredPoint>>> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn upsert(
        &self,
        namespace: Namespace,
        id: &str,
        vector: Vec<f32>,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.lock()
            .entry(namespace)
            .or_default()
            .insert(id.to_string(), StoredPoint { vector, fields });
        Ok(())
    }

    async fn query_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<Point>, StoreError> {
        let collections = self.lock();
        let Some(points) = collections.get(&namespace) else {
            return Ok(Vec::new());
        };

        Ok(points
            .iter()
            .filter(|(id, p)| filter.matches(id, &p.fields))
            .take(limit)
            .map(|(id, p)| Point {
                id: id.clone(),
                fields: p.fields.clone(),
                vector: with_vectors.then(|| p.vector.clone()),
            })
            .collect())
    }

    async fn query_ordered(
        &self,
        namespace: Namespace,
        filter: &Filter,
        order: &OrderBy,
        limit: usize,
    ) -> Result<Vec<Point>, StoreError> {
        let collections = self.lock();
        let Some(points) = collections.get(&namespace) else {
            return Ok(Vec::new());
        };

        let mut keyed: Vec<(i64, &String, &StoredPoint)> = points
            .iter()
            .filter(|(id, p)| filter.matches(id, &p.fields))
            .filter_map(|(id, p)| Some((p.fields.get(&order.key)?.as_i64()?, id, p)))
            .collect();
        keyed.sort_by_key(|(key, _, _)| *key);
        if order.direction == Direction::Desc {
            keyed.reverse();
        }

        Ok(keyed
            .into_iter()
            .take(limit)
            .map(|(_, id, p)| Point {
                id: id.clone(),
                fields: p.fields.clone(),
                vector: None,
            })
            .collect())
    }

    async fn delete_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
    ) -> Result<(), StoreError> {
        if let Some(points) = self.lock().get_mut(&namespace) {
            points.retain(|id, p| !filter.matches(id, &p.fields));
        }
        Ok(())
    }

    async fn count_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .get(&namespace)
            .map(|points| {
                points
                    .iter()
                    .filter(|(id, p)| filter.matches(id, &p.fields))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn search(
        &self,
        namespace: Namespace,
        vector: Vec<f32>,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.lock();
        let Some(points) = collections.get(&namespace) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<ScoredPoint> = points
            .iter()
            .filter(|(id, p)| filter.matches(id, &p.fields))
            .map(|(id, p)| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(&vector, &p.vector),
                fields: p.fields.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn update_fields(
        &self,
        namespace: Namespace,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut collections = self.lock();
        let point = collections
            .get_mut(&namespace)
            .and_then(|points| points.get_mut(id))
            .ok_or_else(|| StoreError::Status {
                status: 404,
                body: format!("point {id} not found"),
            })?;
        point.fields.extend(fields);
        Ok(())
    }
}
