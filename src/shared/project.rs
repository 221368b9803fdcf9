use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::classifier::{ChangeClassifier, PriorEntry, PriorIndex};
use super::embed::Embedder;
use super::error::{ScanError, ValidationError};
use super::filter::Filter;
use super::models::{FileHit, IndexedFile};
use super::scanner::FileScanner;
use super::store::{Namespace, RemoteStore};
use super::sync::{FileFailure, SyncEngine, SyncItem, SyncOptions, SyncStatus};
use super::utils::truncate_chars;

const SNIPPET_CHARS: usize = 300;

/// Outcome of one index/update run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub project: String,
    pub status: SyncStatus,
    pub scanned: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Filtered by the scanner, unchanged, or never attempted.
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FileFailure>,
    /// Recorded files no longer on disk.
    pub missing: Vec<String>,
}

impl SyncReport {
    pub fn is_balanced(&self) -> bool {
        self.succeeded + self.failed + self.skipped == self.scanned
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} new, {} updated, {} unchanged, {} skipped, {} failed ({:?})",
            self.project,
            self.new,
            self.updated,
            self.unchanged,
            self.skipped,
            self.failed,
            self.status
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub project: String,
    pub removed: Vec<String>,
}

/// How the tag of an upserted file is chosen.
enum TagPolicy {
    /// Stamp this tag on every upserted file.
    Set(Option<String>),
    /// Keep whatever tag the file was recorded with.
    Keep,
}

pub struct ProjectIndexer {
    store: Arc<dyn RemoteStore>,
    embedder: Arc<dyn Embedder>,
    scanner: FileScanner,
    engine: SyncEngine,
}

fn canonical_root(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::EmptyPath.into());
    }
    if !path.exists() {
        return Err(ScanError::MissingRoot(path.to_path_buf()).into());
    }
    if !path.is_dir() {
        return Err(ScanError::NotADirectory(path.to_path_buf()).into());
    }
    Ok(std::fs::canonicalize(path)?)
}

fn normalize_rel_path(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string()
}

impl ProjectIndexer {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        embedder: Arc<dyn Embedder>,
        scanner: FileScanner,
        options: SyncOptions,
    ) -> Self {
        let engine = SyncEngine::new(store.clone(), embedder.clone(), options);
        Self {
            store,
            embedder,
            scanner,
            engine,
        }
    }

    /// Index a project, stamping `tag` on every new or changed file.
    pub async fn index_project(
        &self,
        path: &Path,
        tag: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let tag = tag.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        self.run(path, TagPolicy::Set(tag), cancel).await
    }

    /// Re-sync a project, keeping each file's recorded tag.
    pub async fn update_project(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        self.run(path, TagPolicy::Keep, cancel).await
    }

    /// Recorded state of every file of `project`. Empty on a first run.
    pub async fn load_prior_index(&self, project: &str) -> Result<PriorIndex> {
        let filter = Filter::new().must_match("project", project);
        let points = self
            .store
            .query_by_filter(Namespace::ProjectFiles, &filter, usize::MAX, false)
            .await
            .context("loading prior index")?;

        let mut prior = PriorIndex::new();
        for point in points {
            match IndexedFile::from_fields(&point.fields) {
                Some(file) => {
                    prior.insert(
                        file.path,
                        PriorEntry {
                            marker: file.last_modified,
                            tag: file.tag,
                        },
                    );
                }
                None => warn!("Ignoring malformed project record {}", point.id),
            }
        }
        Ok(prior)
    }

    async fn run(
        &self,
        path: &Path,
        policy: TagPolicy,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let root = canonical_root(path)?;
        let project = root.to_string_lossy().into_owned();

        let scanner = self.scanner.clone();
        let scan_root = root.clone();
        let scan = tokio::task::spawn_blocking(move || scanner.scan(&scan_root)).await??;

        let prior = self.load_prior_index(&project).await?;
        let classification = ChangeClassifier::classify(&root, &scan.files, &prior);
        info!(
            "{}: {} files, {} new, {} modified, {} unchanged, {} missing",
            project,
            scan.files.len(),
            classification.new.len(),
            classification.modified.len(),
            classification.unchanged.len(),
            classification.missing.len()
        );

        let items: Vec<SyncItem> = classification
            .to_upsert()
            .map(|c| SyncItem {
                path: c.path.clone(),
                rel_path: c.rel_path.clone(),
                marker: c.marker,
                tag: match &policy {
                    TagPolicy::Set(tag) => tag.clone(),
                    TagPolicy::Keep => prior.get(&c.rel_path).and_then(|e| e.tag.clone()),
                },
            })
            .collect();

        let outcome = self.engine.sync(&project, &items, cancel).await;

        let mut failures: Vec<FileFailure> = classification
            .unreadable
            .iter()
            .map(|(path, reason)| FileFailure {
                path: path.display().to_string(),
                reason: format!("unreadable: {reason}"),
            })
            .collect();
        failures.extend(outcome.failures);

        let mut status = outcome.status;
        if status == SyncStatus::Completed && !failures.is_empty() {
            status = if outcome.succeeded.is_empty() {
                SyncStatus::Failed
            } else {
                SyncStatus::Partial
            };
        }

        let report = SyncReport {
            project,
            status,
            scanned: scan.scanned(),
            new: classification.new.len(),
            updated: classification.modified.len(),
            unchanged: classification.unchanged.len(),
            skipped: scan.skipped + classification.unchanged.len() + outcome.not_attempted,
            succeeded: outcome.succeeded.len(),
            failed: failures.len(),
            failures,
            missing: classification.missing,
        };
        info!("{}", report.summary_line());
        Ok(report)
    }

    /// Delete remote records of files that are no longer on disk.
    pub async fn prune_missing(&self, path: &Path) -> Result<PruneReport> {
        let root = canonical_root(path)?;
        let project = root.to_string_lossy().into_owned();

        let scanner = self.scanner.clone();
        let scan_root = root.clone();
        let scan = tokio::task::spawn_blocking(move || scanner.scan(&scan_root)).await??;
        let prior = self.load_prior_index(&project).await?;
        let missing = ChangeClassifier::classify(&root, &scan.files, &prior).missing;

        if !missing.is_empty() {
            let ids: Vec<String> = missing
                .iter()
                .map(|p| IndexedFile::point_id(&project, p))
                .collect();
            self.store
                .delete_by_filter(Namespace::ProjectFiles, &Filter::new().has_ids(&ids))
                .await?;
            info!("Pruned {} missing files from {}", missing.len(), project);
        }

        Ok(PruneReport {
            project,
            removed: missing,
        })
    }

    /// Delete one file's record. Returns how many records matched.
    pub async fn delete_project_file(&self, path: &str, project: Option<&str>) -> Result<u64> {
        let rel_path = normalize_rel_path(path);
        if rel_path.is_empty() {
            return Err(ValidationError::EmptyPath.into());
        }

        let mut filter = Filter::new().must_match("path", rel_path);
        if let Some(project) = project.filter(|p| !p.is_empty()) {
            filter = filter.must_match("project", project);
        }
        self.delete_counted(filter).await
    }

    /// Delete every project file record, or only those carrying `tag`.
    pub async fn delete_all_project_files(&self, tag: Option<&str>) -> Result<u64> {
        let filter = match tag.map(str::trim).filter(|t| !t.is_empty()) {
            Some(tag) => Filter::new().must_match("tag", tag),
            None => Filter::new(),
        };
        self.delete_counted(filter).await
    }

    async fn delete_counted(&self, filter: Filter) -> Result<u64> {
        let count = self
            .store
            .count_by_filter(Namespace::ProjectFiles, &filter)
            .await?;
        if count > 0 {
            self.store
                .delete_by_filter(Namespace::ProjectFiles, &filter)
                .await?;
        }
        Ok(count)
    }

    pub async fn search_project_files(
        &self,
        query: &str,
        limit: usize,
        tag: Option<&str>,
    ) -> Result<Vec<FileHit>> {
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }

        let mut filter = Filter::new();
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            filter = filter.must_match("tag", tag);
        }
        let hits = self
            .store
            .search(
                Namespace::ProjectFiles,
                self.embedder.embed(query),
                &filter,
                limit,
            )
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let file = IndexedFile::from_fields(&hit.fields)?;
                Some(FileHit {
                    score: hit.score,
                    snippet: truncate_chars(&file.content, SNIPPET_CHARS),
                    path: file.path,
                    project: file.project,
                    language: file.language,
                    tag: file.tag,
                })
            })
            .collect())
    }

    pub async fn count_files(&self) -> Result<u64> {
        Ok(self
            .store
            .count_by_filter(Namespace::ProjectFiles, &Filter::new())
            .await?)
    }
}
