use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub view_name: String,
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: usize,
    /// Lines added or removed relative to the file this save replaced.
    pub changed_lines: Option<usize>,
}

/// Writes generated views as `<dir>/<view_name>.rs`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, view_name: &str) -> PathBuf {
        self.dir.join(format!("{}.rs", file_stem(view_name)))
    }

    pub fn save_code(&self, view_name: &str, code: &str) -> Result<SavedArtifact> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create output dir {}", self.dir.display()))?;
        let path = self.path_for(view_name);
        let previous = fs::read_to_string(&path).ok();
        fs::write(&path, code).with_context(|| format!("write {}", path.display()))?;

        let changed_lines = previous.map(|old| {
            TextDiff::from_lines(old.as_str(), code)
                .iter_all_changes()
                .filter(|change| change.tag() != ChangeTag::Equal)
                .count()
        });
        Ok(SavedArtifact {
            view_name: view_name.to_string(),
            path,
            sha256: sha256_hex(code.as_bytes()),
            bytes: code.len(),
            changed_lines,
        })
    }
}

fn file_stem(view_name: &str) -> String {
    let stem: String = view_name
        .trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect();
    if stem.trim_matches('_').is_empty() {
        "view".to_string()
    } else {
        stem
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
