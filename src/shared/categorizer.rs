use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::buffer::Batch;
use super::models::Message;
use super::tagging::Tagger;

pub const DEFAULT_MIN_SCORE: usize = 2;

/// Keyword table. Keywords are lowercase; order decides ties.
pub const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "technical",
        &[
            "code",
            "function",
            "error",
            "bug",
            "class",
            "variable",
            "implementation",
            "compile",
            "exception",
            "database",
            "algorithm",
            "refactor",
            "syntax",
            "library",
            "deploy",
        ],
    ),
    (
        "planning",
        &[
            "plan",
            "schedule",
            "timeline",
            "milestone",
            "feature",
            "requirement",
            "roadmap",
            "deadline",
            "priority",
            "sprint",
            "estimate",
        ],
    ),
    (
        "question",
        &["how", "what", "why", "when", "where", "help", "explain"],
    ),
    (
        "feedback",
        &[
            "review",
            "feedback",
            "suggestion",
            "improve",
            "opinion",
            "recommend",
            "prefer",
        ],
    ),
];

#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Occurrences of `needle` in `haystack`, overlapping matches included.
fn count_overlapping(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() || needle.len() > haystack.len() {
        return 0;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .filter(|w| *w == needle.as_bytes())
        .count()
}

pub struct Categorizer {
    categories: Vec<Category>,
    min_score: usize,
    tagger: Arc<Tagger>,
}

impl Categorizer {
    pub fn new(tagger: Arc<Tagger>, min_score: usize) -> Self {
        let categories = DEFAULT_CATEGORIES
            .iter()
            .map(|(name, keywords)| Category {
                name: name.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            })
            .collect();
        Self::with_categories(tagger, categories, min_score)
    }

    pub fn with_categories(
        tagger: Arc<Tagger>,
        categories: Vec<Category>,
        min_score: usize,
    ) -> Self {
        let categories = categories
            .into_iter()
            .map(|c| Category {
                name: c.name,
                keywords: c.keywords.iter().map(|k| k.to_lowercase()).collect(),
            })
            .collect();
        Self {
            categories,
            min_score,
            tagger,
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Score of every category against the batch, in table order.
    pub fn score(&self, batch: &[Message]) -> Vec<(&str, usize)> {
        let text = batch
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();

        self.categories
            .iter()
            .map(|c| {
                let score = c
                    .keywords
                    .iter()
                    .map(|k| count_overlapping(&text, k))
                    .sum();
                (c.name.as_str(), score)
            })
            .collect()
    }

    /// Category with the strictly highest score, if it reaches the minimum.
    pub fn select(&self, batch: &[Message]) -> Option<String> {
        let mut best: Option<(&str, usize)> = None;
        for (name, score) in self.score(batch) {
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((name, score));
            }
        }

        match best {
            Some((name, score)) if score >= self.min_score && score > 0 => Some(name.to_string()),
            _ => None,
        }
    }

    /// Pick a category for the batch and tag every message in it.
    ///
    /// A failed tag write is logged and reported as no category; the batch
    /// is not retried.
    pub async fn categorize(&self, batch: &[Message]) -> Option<String> {
        let category = self.select(batch)?;
        let tag = format!("category:{category}");
        let ids: Vec<String> = batch.iter().map(|m| m.id.clone()).collect();

        match self.tagger.append(&ids, std::slice::from_ref(&tag)).await {
            Ok(found) => {
                info!("Tagged {} of {} messages as {}", found, ids.len(), tag);
                Some(category)
            }
            Err(e) => {
                warn!("Failed to write {} for {} messages: {}", tag, ids.len(), e);
                None
            }
        }
    }
}

/// Fixed set of workers draining flushed batches into the categorizer.
pub struct CategorizerPool {
    handles: Vec<JoinHandle<()>>,
}

impl CategorizerPool {
    pub fn spawn(
        categorizer: Arc<Categorizer>,
        receiver: UnboundedReceiver<Batch>,
        workers: usize,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers.max(1))
            .map(|worker| {
                let categorizer = Arc::clone(&categorizer);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let batch = receiver.lock().await.recv().await;
                        let Some(batch) = batch else {
                            break;
                        };
                        debug!("Worker {} categorizing {} messages", worker, batch.len());
                        categorizer.categorize(&batch).await;
                    }
                    debug!("Categorizer worker {} stopped", worker);
                })
            })
            .collect();

        Self { handles }
    }

    /// Wait for every worker to finish. Returns once the sending side is
    /// closed and the queue is empty.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Categorizer worker panicked: {}", e);
            }
        }
    }
}
