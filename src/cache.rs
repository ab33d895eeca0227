//! Per-folder scan cache
//!
//! Each source folder gets one JSON blob holding its signature and the
//! records found by the last full scan. A blob is only trusted while the
//! folder's live signature still matches the stored one.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;
use crate::types::{FileRecord, FolderSignature, SourceFolder};
use crate::utils::{sanitize_path, write_atomic};

/// Bumped whenever the blob layout changes; other versions are misses
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Cached scan result for one folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Signature of the folder at scan time
    pub signature: FolderSignature,
    /// Records in traversal order
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Deserialize)]
struct VersionHeader {
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheBlob {
    version: u32,
    folder: PathBuf,
    signature: FolderSignature,
    files: Vec<FileRecord>,
}

/// On-disk store of per-folder scan results
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at `cache_dir`
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Store under the platform cache directory
    pub fn default_location() -> Result<Self> {
        let base = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .ok_or_else(|| crate::error!(Cache, "could not determine a cache directory"))?;
        Ok(Self::new(base.join("media-sampler")))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Blob location for a folder
    pub fn entry_path(&self, folder: &Path) -> PathBuf {
        self.cache_dir
            .join(format!("{}.media_cache.json", sanitize_path(folder)))
    }

    /// Cached records for `folder`, or `None` on any kind of miss
    pub fn load(&self, folder: &SourceFolder) -> Option<CacheEntry> {
        let path = self.entry_path(&folder.path);
        let data = fs::read(&path).ok()?;

        let header: VersionHeader = match serde_json::from_slice(&data) {
            Ok(header) => header,
            Err(e) => {
                debug!("Discarding unreadable cache blob {}: {}", path.display(), e);
                return None;
            }
        };
        if header.version != CACHE_FORMAT_VERSION {
            debug!(
                "Cache blob {} has version {}, expected {}",
                path.display(),
                header.version,
                CACHE_FORMAT_VERSION
            );
            return None;
        }

        let blob: CacheBlob = match serde_json::from_slice(&data) {
            Ok(blob) => blob,
            Err(e) => {
                debug!("Discarding malformed cache blob {}: {}", path.display(), e);
                return None;
            }
        };

        if blob.folder != folder.path {
            debug!("Cache blob {} belongs to {}", path.display(), blob.folder.display());
            return None;
        }
        if blob.signature != folder.signature {
            debug!("Cache for {} is stale", folder.path.display());
            return None;
        }

        Some(CacheEntry {
            signature: blob.signature,
            files: blob.files,
        })
    }

    /// Persist the records for `folder`, replacing any previous blob
    pub fn store(&self, folder: &SourceFolder, entry: &CacheEntry) -> Result<()> {
        let blob = CacheBlob {
            version: CACHE_FORMAT_VERSION,
            folder: folder.path.clone(),
            signature: entry.signature,
            files: entry.files.clone(),
        };
        let data = serde_json::to_vec(&blob)?;
        write_atomic(&self.entry_path(&folder.path), &data)?;
        debug!(
            "Cached {} records for {}",
            entry.files.len(),
            folder.path.display()
        );
        Ok(())
    }
}

/// Compute the signature of a folder tree.
///
/// Walks directories without stat-ing regular files: the latest directory
/// modification time changes whenever an entry is added, removed or renamed
/// anywhere in the tree, and the entry count catches the rest.
pub fn folder_signature(root: &Path) -> Result<FolderSignature> {
    let root_modified = fs::metadata(root)?.modified()?;
    let mut latest = root_modified;
    let mut entry_count = 0u64;

    for entry in WalkDir::new(root).min_depth(1).into_iter().filter_map(|e| e.ok()) {
        entry_count += 1;
        if entry.file_type().is_dir() {
            if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
                latest = latest.max(modified);
            }
        }
    }

    let since_epoch = latest.duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(FolderSignature {
        modified_secs: since_epoch.as_secs() as i64,
        modified_nanos: since_epoch.subsec_nanos(),
        entry_count,
    })
}

impl SourceFolder {
    /// Canonicalize `path` and capture its current signature
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(crate::error::SamplerError::PathNotFound(path.to_path_buf()));
        }
        let path = fs::canonicalize(path)?;
        let signature = folder_signature(&path)?;
        Ok(Self { path, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaCategory;
    use chrono::Utc;
    use std::fs::File;
    use tempfile::tempdir;

    fn record(folder: &Path, name: &str) -> FileRecord {
        FileRecord {
            path: folder.join(name),
            size: 42,
            modified: Utc::now(),
            extension: ".jpg".to_string(),
            category: MediaCategory::Image,
            folder: folder.to_path_buf(),
        }
    }

    #[test]
    fn test_store_then_load() -> Result<()> {
        let source = tempdir()?;
        let cache_dir = tempdir()?;
        File::create(source.path().join("a.jpg"))?;

        let folder = SourceFolder::open(source.path())?;
        let store = CacheStore::new(cache_dir.path());
        assert!(store.load(&folder).is_none());

        let entry = CacheEntry {
            signature: folder.signature,
            files: vec![record(&folder.path, "a.jpg")],
        };
        store.store(&folder, &entry)?;

        assert_eq!(store.load(&folder), Some(entry));
        Ok(())
    }

    #[test]
    fn test_signature_change_is_a_miss() -> Result<()> {
        let source = tempdir()?;
        let cache_dir = tempdir()?;
        File::create(source.path().join("a.jpg"))?;

        let folder = SourceFolder::open(source.path())?;
        let store = CacheStore::new(cache_dir.path());
        store.store(
            &folder,
            &CacheEntry {
                signature: folder.signature,
                files: vec![record(&folder.path, "a.jpg")],
            },
        )?;

        File::create(source.path().join("b.jpg"))?;
        let reopened = SourceFolder::open(source.path())?;
        assert_ne!(reopened.signature, folder.signature);
        assert!(store.load(&reopened).is_none());
        Ok(())
    }

    #[test]
    fn test_nested_change_updates_signature() -> Result<()> {
        let source = tempdir()?;
        fs::create_dir_all(source.path().join("2023").join("summer"))?;
        let before = folder_signature(source.path())?;

        File::create(source.path().join("2023").join("summer").join("new.mp4"))?;
        let after = folder_signature(source.path())?;

        assert_eq!(after.entry_count, before.entry_count + 1);
        Ok(())
    }

    #[test]
    fn test_corrupt_blob_is_a_miss() -> Result<()> {
        let source = tempdir()?;
        let cache_dir = tempdir()?;
        let folder = SourceFolder::open(source.path())?;
        let store = CacheStore::new(cache_dir.path());

        fs::write(store.entry_path(&folder.path), b"{ not json")?;
        assert!(store.load(&folder).is_none());

        fs::write(store.entry_path(&folder.path), b"{\"version\": 1, \"files\": 3}")?;
        assert!(store.load(&folder).is_none());
        Ok(())
    }

    #[test]
    fn test_future_version_is_a_miss() -> Result<()> {
        let source = tempdir()?;
        let cache_dir = tempdir()?;
        let folder = SourceFolder::open(source.path())?;
        let store = CacheStore::new(cache_dir.path());

        let blob = serde_json::json!({
            "version": CACHE_FORMAT_VERSION + 1,
            "layout": "something new",
        });
        fs::write(store.entry_path(&folder.path), blob.to_string())?;
        assert!(store.load(&folder).is_none());
        Ok(())
    }

    #[test]
    fn test_open_missing_folder() {
        let err = SourceFolder::open(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, crate::error::SamplerError::PathNotFound(_)));
    }
}
