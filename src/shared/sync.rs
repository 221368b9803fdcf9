use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SyncConfig;
use super::embed::Embedder;
use super::error::StoreError;
use super::language::detect_language;
use super::models::IndexedFile;
use super::store::{Namespace, RemoteStore};

const BINARY_SAMPLE_BYTES: usize = 8192;

/// One file scheduled for upsert.
#[derive(Debug, Clone)]
pub struct SyncItem {
    pub path: PathBuf,
    pub rel_path: String,
    pub marker: i64,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Every scheduled file was upserted (or nothing was scheduled).
    Completed,
    /// Some files failed, at least one succeeded.
    Partial,
    /// Files were scheduled but none made it to the store.
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub succeeded: Vec<String>,
    pub failures: Vec<FileFailure>,
    /// Files never attempted because the run was cancelled.
    pub not_attempted: usize,
}

impl SyncOutcome {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub file_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff(),
            file_timeout: config.file_timeout(),
        }
    }
}

/// NUL anywhere, or more than 10% control bytes (other than TAB/LF/CR) in
/// the leading sample.
pub fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.contains(&0) {
        return true;
    }
    let sample = &bytes[..bytes.len().min(BINARY_SAMPLE_BYTES)];
    if sample.is_empty() {
        return false;
    }
    let control = sample
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r')) || b == 0x7f)
        .count();
    control * 10 > sample.len()
}

pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

enum UpsertError {
    Store { error: StoreError, attempts: u32 },
    Cancelled { attempts: u32 },
}

pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    embedder: Arc<dyn Embedder>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        embedder: Arc<dyn Embedder>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            options,
        }
    }

    /// Upsert every item under `project`, one at a time.
    ///
    /// Per-file failures are recorded and skipped. Cancellation is checked
    /// before each file; whatever finished so far is returned.
    pub async fn sync(
        &self,
        project: &str,
        items: &[SyncItem],
        cancel: &CancellationToken,
    ) -> SyncOutcome {
        let mut succeeded = Vec::new();
        let mut failures = Vec::new();
        let mut not_attempted = 0;
        let mut cancelled = false;

        for (i, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                not_attempted = items.len() - i;
                info!("Sync cancelled with {} files remaining", not_attempted);
                break;
            }

            let record = match self.prepare(project, item).await {
                Ok(record) => record,
                Err(reason) => {
                    warn!("Skipping {}: {}", item.rel_path, reason);
                    failures.push(FileFailure {
                        path: item.rel_path.clone(),
                        reason,
                    });
                    continue;
                }
            };

            match self.upsert_with_retry(&record, cancel).await {
                Ok(attempts) => {
                    debug!("Upserted {} after {} attempt(s)", item.rel_path, attempts);
                    succeeded.push(item.rel_path.clone());
                }
                Err(UpsertError::Store { error, attempts }) => {
                    warn!(
                        "Failed to upsert {} after {} attempt(s): {}",
                        item.rel_path, attempts, error
                    );
                    failures.push(FileFailure {
                        path: item.rel_path.clone(),
                        reason: format!("{error} (after {attempts} attempt(s))"),
                    });
                }
                Err(UpsertError::Cancelled { attempts }) => {
                    failures.push(FileFailure {
                        path: item.rel_path.clone(),
                        reason: format!("cancelled after {attempts} attempt(s)"),
                    });
                    cancelled = true;
                    not_attempted = items.len() - i - 1;
                    break;
                }
            }
        }

        let status = if cancelled {
            SyncStatus::Cancelled
        } else if items.is_empty() || failures.is_empty() {
            SyncStatus::Completed
        } else if succeeded.is_empty() {
            SyncStatus::Failed
        } else {
            SyncStatus::Partial
        };

        SyncOutcome {
            status,
            succeeded,
            failures,
            not_attempted,
        }
    }

    async fn prepare(&self, project: &str, item: &SyncItem) -> Result<IndexedFile, String> {
        let bytes = tokio::fs::read(&item.path)
            .await
            .map_err(|e| format!("unreadable: {e}"))?;
        if bytes.is_empty() {
            return Err("empty file".to_string());
        }
        if looks_binary(&bytes) {
            return Err("binary content".to_string());
        }

        let size = bytes.len() as u64;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        if content.trim().is_empty() {
            return Err("empty file".to_string());
        }

        Ok(IndexedFile {
            path: item.rel_path.clone(),
            project: project.to_string(),
            language: detect_language(&item.path).to_string(),
            tag: item.tag.clone(),
            last_modified: item.marker,
            content_hash: content_hash(&content),
            size,
            content,
        })
    }

    async fn upsert_with_retry(
        &self,
        record: &IndexedFile,
        cancel: &CancellationToken,
    ) -> Result<u32, UpsertError> {
        let id = record.id();
        let vector = self.embedder.embed(&format!("{}\n{}", record.path, record.content));
        let fields = record.to_fields();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let call = self.store.upsert(
                Namespace::ProjectFiles,
                &id,
                vector.clone(),
                fields.clone(),
            );
            let result = match tokio::time::timeout(self.options.file_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(format!(
                    "upsert of {} exceeded {:?}",
                    record.path, self.options.file_timeout
                ))),
            };

            let error = match result {
                Ok(()) => return Ok(attempt),
                Err(e) => e,
            };
            if !error.is_transient() || attempt >= self.options.max_attempts {
                return Err(UpsertError::Store {
                    error,
                    attempts: attempt,
                });
            }

            let delay = self.options.retry_backoff * attempt;
            debug!(
                "Transient failure on {} (attempt {}), retrying in {:?}: {}",
                record.path, attempt, delay, error
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(UpsertError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
