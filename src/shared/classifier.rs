use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::utils::{file_mtime, relative_path};

/// Previously recorded state of one file, keyed by relative path.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorEntry {
    pub marker: i64,
    pub tag: Option<String>,
}

pub type PriorIndex = HashMap<String, PriorEntry>;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub path: PathBuf,
    pub rel_path: String,
    pub marker: i64,
}

#[derive(Debug, Default, Clone)]
pub struct Classification {
    pub new: Vec<Candidate>,
    pub modified: Vec<Candidate>,
    pub unchanged: Vec<Candidate>,
    /// Recorded paths no longer present on disk. Never acted on here.
    pub missing: Vec<String>,
    /// Candidates whose marker could not be read.
    pub unreadable: Vec<(PathBuf, String)>,
}

impl Classification {
    pub fn to_upsert(&self) -> impl Iterator<Item = &Candidate> {
        self.new.iter().chain(self.modified.iter())
    }

    pub fn summary(&self) -> ClassificationSummary {
        ClassificationSummary {
            new: self.new.len(),
            modified: self.modified.len(),
            unchanged: self.unchanged.len(),
            missing: self.missing.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationSummary {
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub missing: usize,
}

pub struct ChangeClassifier;

impl ChangeClassifier {
    /// Compare on-disk candidates with the prior index.
    ///
    /// A file is modified only when its marker is strictly newer than the
    /// recorded one; equal markers count as unchanged.
    pub fn classify(root: &Path, candidates: &[PathBuf], prior: &PriorIndex) -> Classification {
        let mut result = Classification::default();
        let mut seen = HashSet::new();

        for path in candidates {
            let Some(rel_path) = relative_path(root, path) else {
                warn!("{} is outside {}", path.display(), root.display());
                continue;
            };
            seen.insert(rel_path.clone());

            let marker = match file_mtime(path) {
                Ok(m) => m,
                Err(e) => {
                    result.unreadable.push((path.clone(), e.to_string()));
                    continue;
                }
            };

            let candidate = Candidate {
                path: path.clone(),
                rel_path,
                marker,
            };
            match prior.get(&candidate.rel_path) {
                None => result.new.push(candidate),
                Some(entry) if marker > entry.marker => result.modified.push(candidate),
                Some(_) => result.unchanged.push(candidate),
            }
        }

        let mut missing: Vec<String> = prior
            .keys()
            .filter(|k| !seen.contains(*k))
            .cloned()
            .collect();
        missing.sort();
        result.missing = missing;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn touch(path: &Path, secs: u64) {
        fs::write(path, "content").unwrap();
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    fn prior_entry(marker: i64) -> PriorEntry {
        PriorEntry { marker, tag: None }
    }

    #[test]
    fn test_classifies_new_modified_unchanged_missing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let a = root.join("a.rs");
        let b = root.join("b.rs");
        let c = root.join("c.rs");
        touch(&a, 1_000);
        touch(&b, 2_000);
        touch(&c, 3_000);

        let prior: PriorIndex = [
            ("b.rs".to_string(), prior_entry(1_500)),
            ("c.rs".to_string(), prior_entry(3_000)),
            ("gone.rs".to_string(), prior_entry(10)),
        ]
        .into_iter()
        .collect();

        let result = ChangeClassifier::classify(root, &[a, b, c], &prior);
        assert_eq!(result.new.len(), 1);
        assert_eq!(result.new[0].rel_path, "a.rs");
        assert_eq!(result.modified.len(), 1);
        assert_eq!(result.modified[0].rel_path, "b.rs");
        // equal marker is not a modification
        assert_eq!(result.unchanged.len(), 1);
        assert_eq!(result.unchanged[0].rel_path, "c.rs");
        assert_eq!(result.missing, vec!["gone.rs".to_string()]);
        assert_eq!(result.to_upsert().count(), 2);
    }

    #[test]
    fn test_second_pass_is_all_unchanged() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let files: Vec<PathBuf> = (0..3).map(|i| root.join(format!("f{i}.txt"))).collect();
        for (i, f) in files.iter().enumerate() {
            touch(f, 5_000 + i as u64);
        }

        let first = ChangeClassifier::classify(root, &files, &PriorIndex::new());
        assert_eq!(first.new.len(), 3);

        let recorded: PriorIndex = first
            .new
            .iter()
            .map(|c| (c.rel_path.clone(), prior_entry(c.marker)))
            .collect();
        let second = ChangeClassifier::classify(root, &files, &recorded);
        assert_eq!(second.summary().unchanged, 3);
        assert_eq!(second.summary().new, 0);
        assert_eq!(second.summary().modified, 0);
        assert!(second.missing.is_empty());
    }

    #[test]
    fn test_vanished_candidate_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let ghost = dir.path().join("ghost.txt");
        let result = ChangeClassifier::classify(dir.path(), &[ghost], &PriorIndex::new());
        assert_eq!(result.unreadable.len(), 1);
        assert!(result.new.is_empty());
    }
}
