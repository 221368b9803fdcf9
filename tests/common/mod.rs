#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use memory_sync::shared::{
    FileScanner, Filter, HashingEmbedder, MemoryStore, Namespace, OrderBy, Point,
    ProjectIndexer, RemoteStore, ScoredPoint, StoreError, SyncOptions,
};

pub const DIMS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    /// Connection refused.
    Transient,
    /// HTTP 400 from the store.
    Permanent,
    /// Upsert never completes.
    Hang,
}

/// `MemoryStore` whose project-file upserts fail on demand.
pub struct FaultyStore {
    pub inner: MemoryStore,
    fault: Fault,
    failures_left: AtomicU32,
    upsert_calls: AtomicU32,
}

impl FaultyStore {
    pub fn always(fault: Fault) -> Self {
        Self::failing_first(u32::MAX, fault)
    }

    pub fn failing_first(failures: u32, fault: Fault) -> Self {
        Self {
            inner: MemoryStore::new(),
            fault,
            failures_left: AtomicU32::new(failures),
            upsert_calls: AtomicU32::new(0),
        }
    }

    pub fn upsert_calls(&self) -> u32 {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteStore for FaultyStore {
    async fn upsert(
        &self,
        namespace: Namespace,
        id: &str,
        vector: Vec<f32>,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        if namespace == Namespace::ProjectFiles {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            if self.take_failure() {
                match self.fault {
                    Fault::Transient => {
                        return Err(StoreError::Connection("connection refused".to_string()));
                    }
                    Fault::Permanent => {
                        return Err(StoreError::Status {
                            status: 400,
                            body: "bad vector".to_string(),
                        });
                    }
                    Fault::Hang => std::future::pending::<()>().await,
                }
            }
        }
        self.inner.upsert(namespace, id, vector, fields).await
    }

    async fn query_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<Point>, StoreError> {
        self.inner
            .query_by_filter(namespace, filter, limit, with_vectors)
            .await
    }

    async fn query_ordered(
        &self,
        namespace: Namespace,
        filter: &Filter,
        order: &OrderBy,
        limit: usize,
    ) -> Result<Vec<Point>, StoreError> {
        self.inner.query_ordered(namespace, filter, order, limit).await
    }

    async fn delete_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
    ) -> Result<(), StoreError> {
        self.inner.delete_by_filter(namespace, filter).await
    }

    async fn count_by_filter(
        &self,
        namespace: Namespace,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        self.inner.count_by_filter(namespace, filter).await
    }

    async fn search(
        &self,
        namespace: Namespace,
        vector: Vec<f32>,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.inner.search(namespace, vector, filter, limit).await
    }

    async fn update_fields(
        &self,
        namespace: Namespace,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.inner.update_fields(namespace, id, fields).await
    }
}

pub fn test_options() -> SyncOptions {
    SyncOptions {
        max_attempts: 3,
        retry_backoff: Duration::from_millis(500),
        file_timeout: Duration::from_secs(10),
    }
}

pub fn indexer(store: Arc<dyn RemoteStore>) -> ProjectIndexer {
    ProjectIndexer::new(
        store,
        Arc::new(HashingEmbedder::new(DIMS)),
        FileScanner::default(),
        test_options(),
    )
}

/// Write `content` to `root/rel` and pin its mtime to `mtime` Unix seconds.
pub fn write_file(root: &Path, rel: &str, content: &[u8], mtime: u64) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    set_mtime(&path, mtime);
}

pub fn set_mtime(path: &Path, mtime: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime))
        .unwrap();
}

/// Three text files and one image.
pub fn sample_project(root: &Path) {
    write_file(root, "README.md", b"# Sample\n\nA small project.\n", 1_700_000_000);
    write_file(
        root,
        "src/main.rs",
        b"fn main() {\n    println!(\"hello\");\n}\n",
        1_700_000_000,
    );
    write_file(root, "notes.txt", b"remember the milk\n", 1_700_000_000);
    write_file(root, "logo.png", &[0x89, b'P', b'N', b'G', 0, 0, 0, 0], 1_700_000_000);
}
