//! On-disk layout for crawled papers
//!
//! ```text
//! <root>/
//!   2305-04793/
//!     metadata.json
//!     references.json
//!     tex/
//!       2305-04793v1/...
//!       2305-04793v2/...
//! ```
//!
//! Each identifier's directory belongs to exactly one pipeline run at a time.

use crate::error::Result;
use crate::types::Identifier;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Metadata file name inside an item directory
pub const METADATA_FILE: &str = "metadata.json";
/// References file name inside an item directory
pub const REFERENCES_FILE: &str = "references.json";
/// Extracted sources subdirectory
pub const TEX_DIR: &str = "tex";

/// Per-identifier storage rooted at the configured output directory
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a storage handle; directories are created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/PPPP-NNNNN`
    pub fn item_dir(&self, id: &Identifier) -> PathBuf {
        self.root.join(id.storage_key())
    }

    /// `<root>/PPPP-NNNNN/tex`
    pub fn tex_dir(&self, id: &Identifier) -> PathBuf {
        self.item_dir(id).join(TEX_DIR)
    }

    /// `<root>/PPPP-NNNNN/tex/PPPP-NNNNNvN`
    pub fn version_dir(&self, id: &Identifier, version: u32) -> PathBuf {
        self.tex_dir(id)
            .join(format!("{}v{}", id.storage_key(), version))
    }

    /// Path to the metadata file
    pub fn metadata_path(&self, id: &Identifier) -> PathBuf {
        self.item_dir(id).join(METADATA_FILE)
    }

    /// Path to the references file
    pub fn references_path(&self, id: &Identifier) -> PathBuf {
        self.item_dir(id).join(REFERENCES_FILE)
    }

    /// Create the item and source directories, overwriting nothing
    pub async fn prepare_item(&self, id: &Identifier) -> Result<PathBuf> {
        let dir = self.item_dir(id);
        tokio::fs::create_dir_all(dir.join(TEX_DIR)).await?;
        Ok(dir)
    }

    /// Write `metadata.json`
    pub async fn write_metadata<T: Serialize>(&self, id: &Identifier, metadata: &T) -> Result<()> {
        self.write_json(&self.metadata_path(id), metadata).await
    }

    /// Write `references.json`
    pub async fn write_references<T: Serialize>(
        &self,
        id: &Identifier,
        references: &T,
    ) -> Result<()> {
        self.write_json(&self.references_path(id), references).await
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), "wrote JSON file");
        Ok(())
    }

    /// Number of entries in `references.json` (0 when missing or unreadable)
    pub async fn reference_count(&self, id: &Identifier) -> usize {
        let path = self.references_path(id);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(_) => return 0,
        };
        match serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&content) {
            Ok(map) => map.len(),
            Err(e) => {
                warn!(identifier = %id, error = %e, "references file is not a JSON object");
                0
            }
        }
    }

    /// Delete everything stored for an identifier; an absent directory is fine
    pub async fn remove_item(&self, id: &Identifier) -> Result<()> {
        let dir = self.item_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(identifier = %id, "removed item directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Total size in bytes of all files under the item directory (0 if absent)
    pub async fn disk_usage(&self, id: &Identifier) -> Result<u64> {
        let dir = self.item_dir(id);
        let total = tokio::task::spawn_blocking(move || directory_size(&dir))
            .await
            .map_err(|e| std::io::Error::other(format!("disk usage task failed: {}", e)))??;
        Ok(total)
    }
}

/// Recursive byte total of regular files below `dir`
pub fn directory_size(dir: &Path) -> std::io::Result<u64> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut total = 0u64;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(std::io::Error::other)?;
        if entry.file_type().is_file() {
            total = total.saturating_add(entry.metadata().map_err(std::io::Error::other)?.len());
        }
    }
    Ok(total)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Period;
    use serde_json::json;
    use tempfile::tempdir;

    fn id(seq: u32) -> Identifier {
        Identifier::new(Period::new(2023, 5).unwrap(), seq).unwrap()
    }

    #[test]
    fn layout_uses_storage_key() {
        let storage = Storage::new("/data");
        let id = id(4793);
        assert_eq!(storage.item_dir(&id), PathBuf::from("/data/2305-04793"));
        assert_eq!(
            storage.version_dir(&id, 2),
            PathBuf::from("/data/2305-04793/tex/2305-04793v2")
        );
        assert_eq!(
            storage.references_path(&id),
            PathBuf::from("/data/2305-04793/references.json")
        );
    }

    #[tokio::test]
    async fn reference_count_reads_object_keys() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let id = id(1);

        assert_eq!(storage.reference_count(&id).await, 0);

        storage
            .write_references(&id, &json!({"2301-00001": {}, "2302-00002": {}}))
            .await
            .unwrap();
        assert_eq!(storage.reference_count(&id).await, 2);

        storage.write_references(&id, &json!({})).await.unwrap();
        assert_eq!(storage.reference_count(&id).await, 0);
    }

    #[tokio::test]
    async fn disk_usage_sums_nested_files() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let id = id(2);

        assert_eq!(storage.disk_usage(&id).await.unwrap(), 0);

        storage.prepare_item(&id).await.unwrap();
        let version_dir = storage.version_dir(&id, 1);
        std::fs::create_dir_all(&version_dir).unwrap();
        std::fs::write(version_dir.join("main.tex"), vec![b'x'; 100]).unwrap();
        std::fs::write(storage.metadata_path(&id), vec![b'y'; 28]).unwrap();

        assert_eq!(storage.disk_usage(&id).await.unwrap(), 128);
    }

    #[tokio::test]
    async fn remove_item_tolerates_missing_directory() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let id = id(3);

        storage.remove_item(&id).await.unwrap();

        storage.prepare_item(&id).await.unwrap();
        assert!(storage.item_dir(&id).exists());
        storage.remove_item(&id).await.unwrap();
        assert!(!storage.item_dir(&id).exists());
    }
}
