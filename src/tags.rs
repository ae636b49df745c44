//! Persisted list of user watermark candidates.
//!
//! The list outlives any single conversion; it lives as JSON under the
//! user's config directory (`<config_dir>/pdfstruct/tags.json`). Candidates
//! stored here are only proposals: each document validates them again
//! through [`crate::watermark::WatermarkAnalyzer`].

use crate::error::PdfStructError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR: &str = "pdfstruct";
const TAGS_FILE: &str = "tags.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TagFile {
    #[serde(default)]
    tags: Vec<String>,
}

/// File-backed tag list.
#[derive(Debug, Clone)]
pub struct TagStore {
    path: PathBuf,
}

impl TagStore {
    /// Store at the platform config location.
    pub fn open_default() -> Result<Self, PdfStructError> {
        let dir = dirs::config_dir().ok_or_else(|| PdfStructError::TagStore {
            path: PathBuf::from(TAGS_FILE),
            detail: "no user config directory on this platform".into(),
        })?;
        Ok(Self::at(dir.join(APP_DIR).join(TAGS_FILE)))
    }

    /// Store backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored tags, in insertion order. A missing file is an empty list.
    pub fn list(&self) -> Result<Vec<String>, PdfStructError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no tag file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.error(e)),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: TagFile = serde_json::from_str(&text).map_err(|e| self.error(e))?;
        Ok(file.tags)
    }

    /// Add `tag`; `false` when it was already present or blank.
    pub fn add(&self, tag: &str) -> Result<bool, PdfStructError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Ok(false);
        }
        let mut tags = self.list()?;
        if tags.iter().any(|t| t == tag) {
            return Ok(false);
        }
        tags.push(tag.to_string());
        self.save(tags)?;
        info!(tag, "tag added");
        Ok(true)
    }

    /// Remove `tag`; `false` when it was not present.
    pub fn remove(&self, tag: &str) -> Result<bool, PdfStructError> {
        let tag = tag.trim();
        let mut tags = self.list()?;
        let before = tags.len();
        tags.retain(|t| t != tag);
        if tags.len() == before {
            return Ok(false);
        }
        self.save(tags)?;
        info!(tag, "tag removed");
        Ok(true)
    }

    /// Atomic write: temp file beside the target, then rename.
    fn save(&self, tags: Vec<String>) -> Result<(), PdfStructError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        let body = serde_json::to_string_pretty(&TagFile { tags }).map_err(|e| self.error(e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.error(e))
    }

    fn error(&self, e: impl std::fmt::Display) -> PdfStructError {
        PdfStructError::TagStore {
            path: self.path.clone(),
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = TagStore::at(dir.path().join("tags.json"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn add_and_remove_round_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = TagStore::at(dir.path().join("nested/tags.json"));
        assert!(store.add("CONFIDENTIAL").unwrap());
        assert!(!store.add("CONFIDENTIAL").unwrap());
        assert!(store.add("Taslak").unwrap());
        assert!(!store.add("   ").unwrap());

        let reopened = TagStore::at(store.path());
        assert_eq!(reopened.list().unwrap(), vec!["CONFIDENTIAL", "Taslak"]);

        assert!(reopened.remove("CONFIDENTIAL").unwrap());
        assert!(!reopened.remove("CONFIDENTIAL").unwrap());
        assert_eq!(store.list().unwrap(), vec!["Taslak"]);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = TagStore::at(&path).list().unwrap_err();
        assert!(matches!(err, PdfStructError::TagStore { .. }));
    }
}
