use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::error::ScanError;
use super::utils::is_hidden_name;

pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Extensions never worth indexing as text.
pub static DENIED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        // images
        "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd", "heic",
        // audio
        "mp3", "wav", "flac", "ogg", "aac", "m4a",
        // video
        "mp4", "avi", "mov", "mkv", "webm", "wmv",
        // archives
        "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "jar",
        // executables and objects
        "exe", "dll", "so", "dylib", "bin", "o", "a", "class", "wasm", "pyc",
        // office documents
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt",
        // fonts and databases
        "ttf", "otf", "woff", "woff2", "db", "sqlite",
    ])
});

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanResult {
    /// Absolute paths that passed every filter.
    pub files: Vec<PathBuf>,
    /// Files seen but rejected (hidden, denied extension, too large,
    /// unreadable metadata).
    pub skipped: usize,
}

impl ScanResult {
    pub fn scanned(&self) -> usize {
        self.files.len() + self.skipped
    }
}

#[derive(Debug, Clone)]
pub struct FileScanner {
    max_file_bytes: u64,
    extra_denied: HashSet<String>,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_BYTES, &[])
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(is_hidden_name)
            .unwrap_or(false)
}

/// Metadata of the file itself, resolving one level of symlink.
fn file_metadata(entry: &DirEntry) -> io::Result<Metadata> {
    if entry.path_is_symlink() {
        fs::metadata(entry.path())
    } else {
        entry.metadata().map_err(io::Error::from)
    }
}

impl FileScanner {
    pub fn new(max_file_bytes: u64, extra_denied: &[String]) -> Self {
        Self {
            max_file_bytes,
            extra_denied: extra_denied
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    fn is_denied(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        DENIED_EXTENSIONS.contains(ext.as_str()) || self.extra_denied.contains(&ext)
    }

    /// Walk `root` and return every file worth indexing.
    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        if !root.exists() {
            return Err(ScanError::MissingRoot(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut result = ScanResult::default();

        // Hidden directories are pruned before descent.
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && is_hidden(e)));

        for entry in walker {
            let entry = entry.map_err(|source| ScanError::Walk {
                path: source
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf()),
                source,
            })?;

            let file_type = entry.file_type();
            if !file_type.is_file() && !file_type.is_symlink() {
                continue;
            }

            let path = entry.path();
            if is_hidden(&entry) {
                debug!("Skipping hidden file: {}", path.display());
                result.skipped += 1;
                continue;
            }
            if self.is_denied(path) {
                debug!("Skipping denied extension: {}", path.display());
                result.skipped += 1;
                continue;
            }

            let metadata = match file_metadata(&entry) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    result.skipped += 1;
                    continue;
                }
            };
            // Links to directories are not followed.
            if !metadata.is_file() {
                continue;
            }
            let size = metadata.len();
            if size > self.max_file_bytes {
                debug!("Skipping large file ({} bytes): {}", size, path.display());
                result.skipped += 1;
                continue;
            }

            result.files.push(path.to_path_buf());
        }

        Ok(result)
    }
}
