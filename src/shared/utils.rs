use anyhow::Result;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Root-relative path with forward slashes, or `None` if `path` is not
/// under `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Modification time as Unix seconds.
pub fn file_mtime(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    let secs = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    };
    Ok(secs)
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

/// First `max_chars` characters on a char boundary, with an ellipsis if cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Leading eight characters of an id, enough to tell records apart in listings.
pub fn short_id(id: &str) -> &str {
    &id[..8.min(id.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_relative_path_normalizes() {
        let root = PathBuf::from("/work/app");
        let file = root.join("src").join("shared").join("mod.rs");
        assert_eq!(relative_path(&root, &file).as_deref(), Some("src/shared/mod.rs"));
        assert_eq!(relative_path(&root, Path::new("/elsewhere/x.rs")), None);
        assert_eq!(relative_path(&root, &root), None);
    }

    #[test]
    fn test_hidden_names() {
        assert!(is_hidden_name(".git"));
        assert!(is_hidden_name(".env"));
        assert!(!is_hidden_name("src"));
        assert!(!is_hidden_name("."));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("5c56c793-69f3"), "5c56c793");
        assert_eq!(short_id("abc"), "abc");
    }
}
