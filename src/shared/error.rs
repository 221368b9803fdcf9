use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the remote store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deadline exceeded: {0}")]
    Timeout(String),
    #[error("connection refused: {0}")]
    Connection(String),
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed store response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout(_) | StoreError::Connection(_) => true,
            StoreError::Status { .. } | StoreError::Malformed(_) => false,
            StoreError::Other(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("deadline exceeded") || msg.contains("connection refused")
            }
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StoreError::Timeout(e.to_string())
        } else if e.is_connect() {
            StoreError::Connection(e.to_string())
        } else if e.is_decode() {
            StoreError::Malformed(e.to_string())
        } else {
            StoreError::Other(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Malformed(e.to_string())
    }
}

/// Bad caller input, rejected before any network call.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("message id must not be empty")]
    EmptyId,
    #[error("at least one message id is required")]
    EmptyIdList,
    #[error("tag must not be empty")]
    EmptyTag,
    #[error("content must not be empty")]
    EmptyContent,
    #[error("path must not be empty")]
    EmptyPath,
    #[error("unknown role '{0}' (expected user, assistant or system)")]
    UnknownRole(String),
    #[error("unknown tagging mode '{0}' (expected automatic or manual)")]
    UnknownMode(String),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("directory does not exist: {}", .0.display())]
    MissingRoot(PathBuf),
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}
