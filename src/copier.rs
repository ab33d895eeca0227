/*!
 * Parallel copy of the selected files into the destination
 */

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use filetime::FileTime;
use indicatif::ProgressBar;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointManager;
use crate::error::{Result, ResultExt};
use crate::selector::SelectionResult;
use crate::types::{CopyOutcome, CopyStatus, FileRecord, SkipReason};

/// Reason recorded for files that were never started because of a cancel
pub const INTERRUPTED_REASON: &str = "interrupted before copy started";

/// Copy behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Number of copy worker threads
    pub workers: usize,
    /// Mirror `<source folder name>/<relative path>` under the destination
    pub preserve_structure: bool,
    /// Plan destinations without touching the filesystem
    pub dry_run: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            preserve_structure: false,
            dry_run: false,
        }
    }
}

/// Copies a selection on a bounded worker pool
pub struct CopyExecutor {
    options: CopyOptions,
    cancel: Arc<AtomicBool>,
    progress: Arc<ProgressBar>,
    /// Destination paths owned by a source of the current selection
    claimed: Mutex<HashSet<PathBuf>>,
}

impl CopyExecutor {
    pub fn new(options: CopyOptions) -> Self {
        Self {
            options,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(ProgressBar::hidden()),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Share a cancel flag; once set no new copy is started
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressBar>) -> Self {
        self.progress = progress;
        self
    }

    /// Whether the run was cancelled
    pub fn interrupted(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Copy every selected file, returning one outcome per file in selection order
    pub fn run(
        &self,
        selection: &SelectionResult,
        checkpoint: &CheckpointManager,
        destination: &Path,
    ) -> Result<Vec<CopyOutcome>> {
        crate::ensure!(
            self.options.workers > 0,
            Config,
            "worker count must be at least 1"
        );

        if !self.options.dry_run {
            fs::create_dir_all(destination).map_err(|e| {
                crate::error!(
                    Copy,
                    "could not create destination {}: {}",
                    destination.display(),
                    e
                )
            })?;
        }

        self.lock_claimed().extend(checkpoint.copied_destinations());

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .thread_name(|i| format!("media-copy-{}", i))
            .build()
            .with_context(|| "failed to build copy worker pool")?;

        info!(
            "Copying {} files to {} with {} workers",
            selection.count(),
            destination.display(),
            self.options.workers
        );
        self.progress.set_length(selection.count() as u64);

        let outcomes: Vec<CopyOutcome> = pool.install(|| {
            selection
                .files
                .par_iter()
                .map(|record| {
                    let outcome = self.copy_one(record, checkpoint, destination);
                    self.progress.inc(1);
                    outcome
                })
                .collect()
        });

        if self.interrupted() {
            warn!("Copy interrupted, remaining files were not started");
        }
        Ok(outcomes)
    }

    fn copy_one(&self, record: &FileRecord, checkpoint: &CheckpointManager, destination: &Path) -> CopyOutcome {
        let outcome = |status| CopyOutcome {
            source: record.path.clone(),
            size: record.size,
            status,
        };

        if let Some(copied_to) = checkpoint.copied_destination(&record.path) {
            return outcome(CopyStatus::Skipped(SkipReason::Checkpointed(copied_to)));
        }
        if self.interrupted() {
            return outcome(CopyStatus::Failed {
                reason: INTERRUPTED_REASON.to_string(),
            });
        }

        let target = destination_path(record, destination, self.options.preserve_structure);
        if let Some(name) = record.file_name() {
            self.progress
                .set_message(format!("Copying {}", name.to_string_lossy()));
        }

        let status = if self.options.dry_run {
            self.plan(&target)
        } else {
            self.copy_file(record, &target)
        };

        match &status {
            CopyStatus::Copied { destination }
            | CopyStatus::Skipped(SkipReason::AlreadyPresent(destination)) => {
                checkpoint.record_progress(&record.path, destination);
            }
            CopyStatus::Failed { reason } => {
                warn!("Failed to copy {}: {}", record.path.display(), reason);
            }
            CopyStatus::Skipped(SkipReason::Checkpointed(_)) => {}
        }
        outcome(status)
    }

    fn plan(&self, target: &Path) -> CopyStatus {
        let mut claimed = self.lock_claimed();
        let destination = (0..)
            .map(|n| with_suffix(target, n))
            .find(|candidate| !candidate.exists() && !claimed.contains(candidate))
            .unwrap_or_else(|| target.to_path_buf());
        claimed.insert(destination.clone());
        CopyStatus::Copied { destination }
    }

    fn copy_file(&self, record: &FileRecord, target: &Path) -> CopyStatus {
        let failed = |reason: String| CopyStatus::Failed { reason };

        let source_meta = match fs::metadata(&record.path) {
            Ok(meta) => meta,
            Err(e) => return failed(format!("cannot read source: {}", e)),
        };
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return failed(format!("cannot create {}: {}", parent.display(), e));
            }
        }

        let (claimed, file) = match self.claim(target, &record.path, &source_meta) {
            Ok(Claim::Fresh(path, file)) => (path, file),
            Ok(Claim::Existing(path)) => {
                debug!("{} already present at {}", record.path.display(), path.display());
                return CopyStatus::Skipped(SkipReason::AlreadyPresent(path));
            }
            Err(e) => return failed(format!("cannot create destination file: {}", e)),
        };

        match write_contents(&record.path, file, &source_meta, &claimed) {
            Ok(()) => CopyStatus::Copied {
                destination: claimed,
            },
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&claimed) {
                    warn!("Could not remove partial file {}: {}", claimed.display(), cleanup);
                }
                failed(e.to_string())
            }
        }
    }

    /// Reserve the first free `target` variant. An existing variant is taken
    /// over only when no other source owns it and its contents equal the
    /// source's.
    fn claim(&self, target: &Path, source: &Path, source_meta: &fs::Metadata) -> io::Result<Claim> {
        for n in 0.. {
            let candidate = with_suffix(target, n);
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => {
                    self.lock_claimed().insert(candidate.clone());
                    return Ok(Claim::Fresh(candidate, file));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if self.lock_claimed().contains(&candidate) {
                        continue;
                    }
                    if same_contents(&candidate, source, source_meta)
                        && self.lock_claimed().insert(candidate.clone())
                    {
                        return Ok(Claim::Existing(candidate));
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(io::ErrorKind::Other, "no free destination name"))
    }

    fn lock_claimed(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Where a record lands under `destination`
pub fn destination_path(record: &FileRecord, destination: &Path, preserve_structure: bool) -> PathBuf {
    if preserve_structure {
        let folder_name = record.folder.file_name().unwrap_or_default();
        destination.join(folder_name).join(record.relative_path())
    } else {
        destination.join(record.file_name().unwrap_or_default())
    }
}

/// `photo.jpg` -> `photo_<n>.jpg`; `n == 0` keeps the name
pub fn with_suffix(path: &Path, n: usize) -> PathBuf {
    if n == 0 {
        return path.to_path_buf();
    }
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

enum Claim {
    /// A new, empty file reserved for this copy
    Fresh(PathBuf, File),
    /// A finished copy of the same source already exists
    Existing(PathBuf),
}

/// `existing` matches the source in length, modification time and content
fn same_contents(existing: &Path, source: &Path, source_meta: &fs::Metadata) -> bool {
    let Ok(meta) = fs::metadata(existing) else {
        return false;
    };
    if meta.len() != source_meta.len()
        || FileTime::from_last_modification_time(&meta)
            != FileTime::from_last_modification_time(source_meta)
    {
        return false;
    }
    match (content_hash(existing), content_hash(source)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn content_hash(path: &Path) -> io::Result<blake3::Hash> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize())
}

fn write_contents(source: &Path, file: File, source_meta: &fs::Metadata, target: &Path) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(file);
    io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    fs::set_permissions(target, source_meta.permissions())?;
    filetime::set_file_times(
        target,
        FileTime::from_last_access_time(source_meta),
        FileTime::from_last_modification_time(source_meta),
    )?;
    Ok(())
}
