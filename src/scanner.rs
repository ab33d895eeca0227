/*!
 * Directory scanning with cache support
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::cache::{CacheEntry, CacheStore};
use crate::media::MediaTable;
use crate::types::{FileRecord, FolderFiles, SourceFolder};

/// Scanner statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannerStatistics {
    /// Number of media files recorded, including cache replays
    pub files_scanned: usize,
    /// Folders served from the cache
    pub cache_hits: usize,
    /// Folders that had to be walked
    pub cache_misses: usize,
    /// Paths skipped with a warning
    pub warnings: usize,
}

/// A path that could not be scanned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Scan result for one source folder
#[derive(Debug, Clone)]
pub struct ScannedFolder {
    /// Source folder root
    pub folder: PathBuf,
    /// Media files in traversal order
    pub files: Vec<FileRecord>,
    /// Records came from the cache without walking the tree
    pub from_cache: bool,
    /// Skipped paths
    pub warnings: Vec<ScanWarning>,
}

impl From<ScannedFolder> for FolderFiles {
    fn from(scanned: ScannedFolder) -> Self {
        Self {
            folder: scanned.folder,
            files: scanned.files,
        }
    }
}

/// Scanner for source folders
pub struct Scanner {
    /// Recognized media extensions
    media: MediaTable,
    /// Scan cache, `None` when caching is disabled
    cache: Option<CacheStore>,
    /// Progress bar
    pub progress: Arc<ProgressBar>,
    /// Scanner statistics
    statistics: Arc<Mutex<ScannerStatistics>>,
}

impl Scanner {
    /// Create a new scanner
    pub fn new(media: MediaTable, cache: Option<CacheStore>, progress: Arc<ProgressBar>) -> Self {
        Self {
            media,
            cache,
            progress,
            statistics: Arc::new(Mutex::new(ScannerStatistics::default())),
        }
    }

    /// Get scanner statistics
    pub fn get_statistics(&self) -> ScannerStatistics {
        self.statistics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Scan every folder concurrently, returning results in declaration order
    pub fn scan(&self, folders: &[SourceFolder]) -> Vec<ScannedFolder> {
        let scanned: Vec<ScannedFolder> = folders.par_iter().map(|f| self.scan_folder(f)).collect();
        let stats = self.get_statistics();
        info!(
            "Scanned {} folders: {} media files, {} cache hits, {} warnings",
            folders.len(),
            stats.files_scanned,
            stats.cache_hits,
            stats.warnings
        );
        scanned
    }

    fn scan_folder(&self, folder: &SourceFolder) -> ScannedFolder {
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.load(folder) {
                debug!("Cache hit for {}", folder.path.display());
                self.progress.inc(entry.files.len() as u64);
                self.update_statistics(|stats| {
                    stats.cache_hits += 1;
                    stats.files_scanned += entry.files.len();
                });
                return ScannedFolder {
                    folder: folder.path.clone(),
                    files: entry.files,
                    from_cache: true,
                    warnings: Vec::new(),
                };
            }
            self.update_statistics(|stats| stats.cache_misses += 1);
        }

        self.progress
            .set_message(format!("Scanning {}", folder.path.display()));
        let (files, warnings) = self.walk(&folder.path);

        if let Some(cache) = &self.cache {
            let entry = CacheEntry {
                signature: folder.signature,
                files,
            };
            if let Err(e) = cache.store(folder, &entry) {
                warn!("Failed to cache scan of {}: {}", folder.path.display(), e);
            }
            return ScannedFolder {
                folder: folder.path.clone(),
                files: entry.files,
                from_cache: false,
                warnings,
            };
        }

        ScannedFolder {
            folder: folder.path.clone(),
            files,
            from_cache: false,
            warnings,
        }
    }

    /// Walk a folder tree, collecting media files in file-name order
    fn walk(&self, root: &Path) -> (Vec<FileRecord>, Vec<ScanWarning>) {
        let mut files = Vec::new();
        let mut warnings = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    self.warn(&mut warnings, path, e.to_string());
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let Some((extension, category)) = self.media.classify(entry.path()) else {
                continue;
            };

            match self.file_metadata(root, &entry) {
                Ok(Some(metadata)) => {
                    let modified = match metadata.modified() {
                        Ok(time) => DateTime::<Utc>::from(time),
                        Err(e) => {
                            self.warn(&mut warnings, entry.path().to_path_buf(), e.to_string());
                            continue;
                        }
                    };
                    files.push(FileRecord {
                        path: entry.path().to_path_buf(),
                        size: metadata.len(),
                        modified,
                        extension,
                        category,
                        folder: root.to_path_buf(),
                    });
                    self.progress.inc(1);
                }
                Ok(None) => {}
                Err(message) => self.warn(&mut warnings, entry.path().to_path_buf(), message),
            }
        }

        let count = files.len();
        self.update_statistics(|stats| stats.files_scanned += count);
        (files, warnings)
    }

    /// Metadata of a regular file, following symlinks. `Ok(None)` for
    /// links that resolve to something other than a file, and for links to
    /// media files under `root`, which the walk records on their own.
    fn file_metadata(&self, root: &Path, entry: &DirEntry) -> Result<Option<fs::Metadata>, String> {
        if entry.path_is_symlink() {
            let meta = match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => return Ok(None),
                Err(e) => return Err(format!("broken link: {}", e)),
            };
            if let Ok(target) = fs::canonicalize(entry.path()) {
                if target.starts_with(root) && self.media.classify(&target).is_some() {
                    debug!("{} links to {} inside the folder", entry.path().display(), target.display());
                    return Ok(None);
                }
            }
            return Ok(Some(meta));
        }
        if !entry.file_type().is_file() {
            return Ok(None);
        }
        entry.metadata().map(Some).map_err(|e| e.to_string())
    }

    fn warn(&self, warnings: &mut Vec<ScanWarning>, path: PathBuf, message: String) {
        warn!("Skipping {}: {}", path.display(), message);
        self.update_statistics(|stats| stats.warnings += 1);
        warnings.push(ScanWarning { path, message });
    }

    fn update_statistics(&self, f: impl FnOnce(&mut ScannerStatistics)) {
        let mut stats = self
            .statistics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::MediaCategory;
    use std::fs::File;
    use tempfile::tempdir;

    fn scanner(cache: Option<CacheStore>) -> Scanner {
        Scanner::new(MediaTable::default(), cache, Arc::new(ProgressBar::hidden()))
    }

    fn names(folder: &ScannedFolder) -> Vec<String> {
        folder
            .files
            .iter()
            .map(|f| f.relative_path().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_scan_keeps_media_in_sorted_order() -> Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("trip"))?;
        fs::write(dir.path().join("b.JPG"), b"12345")?;
        fs::write(dir.path().join("a.mp4"), b"1")?;
        fs::write(dir.path().join("notes.txt"), b"text")?;
        fs::write(dir.path().join("trip").join("c.gif"), b"12")?;

        let folder = SourceFolder::open(dir.path())?;
        let scanned = scanner(None).scan(&[folder.clone()]);

        assert_eq!(scanned.len(), 1);
        assert_eq!(names(&scanned[0]), ["a.mp4", "b.JPG", "trip/c.gif"]);
        let b = &scanned[0].files[1];
        assert_eq!(b.extension, ".jpg");
        assert_eq!(b.size, 5);
        assert_eq!(b.category, MediaCategory::Image);
        assert_eq!(b.folder, folder.path);
        assert_eq!(scanned[0].files[2].category, MediaCategory::Other);
        assert!(scanned[0].warnings.is_empty());
        Ok(())
    }

    #[test]
    fn test_results_follow_declaration_order() -> Result<()> {
        let first = tempdir()?;
        let second = tempdir()?;
        File::create(first.path().join("one.png"))?;
        File::create(second.path().join("two.png"))?;
        File::create(second.path().join("three.png"))?;

        let folders = [SourceFolder::open(second.path())?, SourceFolder::open(first.path())?];
        let scanned = scanner(None).scan(&folders);

        assert_eq!(scanned[0].folder, folders[0].path);
        assert_eq!(scanned[0].files.len(), 2);
        assert_eq!(scanned[1].folder, folders[1].path);
        assert_eq!(scanned[1].files.len(), 1);
        Ok(())
    }

    #[test]
    fn test_second_scan_is_cache_hit() -> Result<()> {
        let dir = tempdir()?;
        let cache_dir = tempdir()?;
        fs::create_dir_all(dir.path().join("nested"))?;
        fs::write(dir.path().join("a.jpg"), b"a")?;
        fs::write(dir.path().join("nested").join("b.mov"), b"bb")?;

        let folder = SourceFolder::open(dir.path())?;
        let first_scanner = scanner(Some(CacheStore::new(cache_dir.path())));
        let first = first_scanner.scan(&[folder.clone()]);
        assert!(!first[0].from_cache);
        assert_eq!(first_scanner.get_statistics().cache_misses, 1);

        let folder = SourceFolder::open(dir.path())?;
        let second_scanner = scanner(Some(CacheStore::new(cache_dir.path())));
        let second = second_scanner.scan(&[folder]);

        assert!(second[0].from_cache);
        assert_eq!(second[0].files, first[0].files);
        let stats = second_scanner.get_statistics();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 0);
        assert_eq!(stats.files_scanned, 2);
        Ok(())
    }

    #[test]
    fn test_new_file_invalidates_cache() -> Result<()> {
        let dir = tempdir()?;
        let cache_dir = tempdir()?;
        fs::write(dir.path().join("a.jpg"), b"a")?;
        scanner(Some(CacheStore::new(cache_dir.path()))).scan(&[SourceFolder::open(dir.path())?]);

        fs::write(dir.path().join("b.jpg"), b"b")?;
        let rescanned = scanner(Some(CacheStore::new(cache_dir.path())))
            .scan(&[SourceFolder::open(dir.path())?]);

        assert!(!rescanned[0].from_cache);
        assert_eq!(names(&rescanned[0]), ["a.jpg", "b.jpg"]);
        Ok(())
    }

    #[test]
    fn test_disabled_cache_writes_nothing() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.jpg"), b"a")?;
        let s = scanner(None);
        s.scan(&[SourceFolder::open(dir.path())?]);

        let stats = s.get_statistics();
        assert_eq!(stats.cache_hits + stats.cache_misses, 0);
        assert_eq!(stats.files_scanned, 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_link_is_a_warning() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("real.jpg"), b"data")?;
        std::os::unix::fs::symlink(dir.path().join("gone.jpg"), dir.path().join("dangling.jpg"))?;

        let s = scanner(None);
        let scanned = s.scan(&[SourceFolder::open(dir.path())?]);

        assert_eq!(names(&scanned[0]), ["real.jpg"]);
        assert_eq!(scanned[0].warnings.len(), 1);
        assert!(scanned[0].warnings[0].path.ends_with("dangling.jpg"));
        assert_eq!(s.get_statistics().warnings, 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_link_to_file_in_folder_is_recorded_once() -> Result<()> {
        let root = tempdir()?;
        let library = root.path().join("library");
        let outside = root.path().join("outside");
        fs::create_dir_all(library.join("2024"))?;
        fs::create_dir_all(&outside)?;
        fs::write(library.join("2024/real.jpg"), b"data")?;
        fs::write(outside.join("shared.png"), b"elsewhere")?;
        fs::write(library.join("notes.dat"), b"text")?;
        std::os::unix::fs::symlink(library.join("2024/real.jpg"), library.join("alias.jpg"))?;
        std::os::unix::fs::symlink(outside.join("shared.png"), library.join("shared.png"))?;
        std::os::unix::fs::symlink(library.join("notes.dat"), library.join("notes.jpg"))?;

        let scanned = scanner(None).scan(&[SourceFolder::open(&library)?]);

        assert_eq!(names(&scanned[0]), ["2024/real.jpg", "notes.jpg", "shared.png"]);
        let shared = &scanned[0].files[2];
        assert_eq!(shared.size, 9);
        assert!(scanned[0].warnings.is_empty());
        Ok(())
    }
}
