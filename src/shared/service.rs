use anyhow::Result;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::buffer::ConversationBuffer;
use super::categorizer::{Categorizer, CategorizerPool};
use super::config::Config;
use super::conversation::ConversationService;
use super::embed::{Embedder, HashingEmbedder};
use super::models::TaggingMode;
use super::project::ProjectIndexer;
use super::scanner::FileScanner;
use super::store::{MemoryStore, QdrantStore, RemoteStore};
use super::sync::SyncOptions;
use super::tagging::Tagger;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub messages: u64,
    pub project_files: u64,
    pub buffered: usize,
    pub threshold: usize,
    pub mode: TaggingMode,
    pub current_tag: String,
}

/// Connect to the configured Qdrant instance, creating collections as needed.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn RemoteStore>> {
    let store = QdrantStore::new(&config.store)?;
    store.ensure_collections().await?;
    info!("Connected to store at {}", config.store.url);
    Ok(Arc::new(store))
}

pub fn memory_store() -> Arc<dyn RemoteStore> {
    Arc::new(MemoryStore::new())
}

/// Everything a transport needs, constructed once per process.
///
/// Must be created inside a tokio runtime: the categorizer workers are
/// spawned here.
pub struct MemoryService {
    pub conversations: ConversationService,
    pub projects: ProjectIndexer,
    buffer: Arc<ConversationBuffer>,
    pool: Mutex<Option<CategorizerPool>>,
    shutdown: CancellationToken,
}

impl MemoryService {
    pub fn new(config: &Config, store: Arc<dyn RemoteStore>) -> Self {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(config.store.vector_size));
        Self::with_embedder(config, store, embedder)
    }

    pub fn with_embedder(
        config: &Config,
        store: Arc<dyn RemoteStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let (tx, rx) = unbounded_channel();
        let buffer = Arc::new(ConversationBuffer::new(
            config.tagging.threshold,
            config.tagging.default_mode,
            config.tagging.default_tag.clone(),
            tx,
        ));

        let tagger = Arc::new(Tagger::new(store.clone()));
        let categorizer = Arc::new(Categorizer::new(tagger.clone(), config.tagging.min_score));
        let pool = CategorizerPool::spawn(categorizer, rx, config.tagging.workers);

        let conversations = ConversationService::new(
            store.clone(),
            embedder.clone(),
            buffer.clone(),
            tagger,
            config.history.max_scan,
        );
        let scanner = FileScanner::new(
            config.sync.max_file_bytes,
            &config.sync.extra_denied_extensions,
        );
        let projects = ProjectIndexer::new(
            store,
            embedder,
            scanner,
            SyncOptions::from(&config.sync),
        );

        Self {
            conversations,
            projects,
            buffer,
            pool: Mutex::new(Some(pool)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    /// Token for one sync run; cancelled when the service shuts down.
    pub fn run_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub async fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            messages: self.conversations.count_messages().await?,
            project_files: self.projects.count_files().await?,
            buffered: self.buffer.pending(),
            threshold: self.buffer.threshold(),
            mode: self.buffer.mode(),
            current_tag: self.buffer.tag(),
        })
    }

    /// Cancel running syncs, stop dispatching and wait for queued batches.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.buffer.close();

        let pool = self
            .pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(pool) = pool {
            pool.join().await;
        }
        info!("Service shut down");
    }
}
