use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::models::TaggingMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub conversation_collection: String,
    pub project_collection: String,
    pub vector_size: usize,
    pub request_timeout_secs: u64,
    /// Points fetched per scroll request.
    pub scan_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            conversation_collection: "conversations".to_string(),
            project_collection: "project_files".to_string(),
            vector_size: 384,
            request_timeout_secs: 30,
            scan_page_size: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_file_bytes: u64,
    pub extra_denied_extensions: Vec<String>,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub file_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            extra_denied_extensions: Vec::new(),
            max_attempts: 3,
            retry_backoff_ms: 500,
            file_timeout_secs: 10,
        }
    }
}

impl SyncConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub threshold: usize,
    pub min_score: usize,
    pub workers: usize,
    pub default_mode: TaggingMode,
    pub default_tag: String,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            min_score: 2,
            workers: 2,
            default_mode: TaggingMode::Automatic,
            default_tag: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Upper bound on messages returned by history or tag listings.
    pub max_scan: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_scan: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub tagging: TaggingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("memory-sync");
        Ok(config_dir.join("config.yaml"))
    }

    /// Load the default config file, writing one with defaults if absent.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            return Ok(config);
        }

        let default_config = Self::default();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, serde_yaml::to_string(&default_config)?)?;
        Ok(default_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let yaml = "tagging:\n  threshold: 3\nstore:\n  url: http://qdrant:6333\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.tagging.threshold, 3);
        assert_eq!(config.tagging.min_score, 2);
        assert_eq!(config.store.url, "http://qdrant:6333");
        assert_eq!(config.store.project_collection, "project_files");
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.sync.max_file_bytes, 1024 * 1024);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.tagging.default_mode, TaggingMode::Automatic);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.http.bind, config.http.bind);
    }
}
