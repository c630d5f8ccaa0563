//! File-based storage implementation
//!
//! This module provides the desktop storage backend: each key maps to one
//! JSON file inside a base directory. Writes land in a temporary sibling and
//! are renamed over the target, so a reader never sees a half-written file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::OperationLogStorage;
use crate::error::StorageError;

/// File-backed implementation of [`OperationLogStorage`]
#[derive(Debug, Clone)]
pub struct FileLogStorage {
    /// Directory holding one file per key
    base_dir: PathBuf,
}

impl FileLogStorage {
    /// Open (and create if needed) a store rooted at `base_dir`
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;

        info!(path = %base_dir.display(), "Opened file log storage");
        Ok(Self { base_dir })
    }

    /// Directory this store writes into
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file backing `key`
    ///
    /// Distinct keys always map to distinct files.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Percent-encode a storage key into a file stem
///
/// Bytes outside `[A-Za-z0-9_.-]` become `%XX`, `%` included, so the mapping
/// is one-to-one. A key made only of dots has its dots encoded too, which
/// keeps "." and ".." inside the base directory.
fn encode_key(key: &str) -> String {
    let only_dots = !key.is_empty() && key.bytes().all(|b| b == b'.');

    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        let plain = byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.');
        if plain && !(only_dots && byte == b'.') {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

#[async_trait]
impl OperationLogStorage for FileLogStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                debug!(path = %path.display(), bytes = contents.len(), "Read item");
                Ok(Some(contents))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stored item");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, value.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = value.len(), "Wrote item");
        Ok(())
    }
}
