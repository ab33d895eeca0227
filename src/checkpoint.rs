//! Persisted copy progress
//!
//! A checkpoint ties a destination to the target and the exact selection
//! being copied, and records where each finished source landed. All mutations and
//! writes go through a single mutex so concurrent copy workers can report
//! progress safely.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::selector::{SelectionResult, SelectionTarget};
use crate::types::{CopyOutcome, FileRecord};
use crate::utils::write_atomic;

pub const CHECKPOINT_FORMAT_VERSION: u32 = 2;

/// File name used when no explicit checkpoint path is configured
pub const CHECKPOINT_FILE_NAME: &str = ".media-sampler-checkpoint.json";

/// Progress is written to disk at least this often
pub const FLUSH_EVERY: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointFile {
    version: u32,
    selection_hash: String,
    destination: PathBuf,
    target: SelectionTarget,
    copied: Vec<CopiedFile>,
    updated_at: DateTime<Utc>,
    selected_files: Vec<FileRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CopiedFile {
    source: PathBuf,
    destination: PathBuf,
}

impl CheckpointFile {
    fn belongs_to(&self, destination: &Path, target: &SelectionTarget) -> bool {
        self.destination == destination && self.target == *target
    }
}

/// In-memory view of a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointState {
    pub destination: PathBuf,
    /// Target the selection was drawn for
    pub target: SelectionTarget,
    /// Content hash of the selection this progress belongs to
    pub selection_hash: String,
    pub selected: Vec<FileRecord>,
    /// Source path -> file written for it in the destination
    pub copied: HashMap<PathBuf, PathBuf>,
    pub updated_at: DateTime<Utc>,
    /// Progress was restored from an earlier run
    pub resumed: bool,
}

/// What happened to the checkpoint file at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    /// Every file was handled, the checkpoint was deleted
    Removed,
    /// Some files failed, the checkpoint was kept under this name
    Archived(PathBuf),
    /// Nothing persisted (dry run)
    InMemory,
}

struct Inner {
    state: CheckpointState,
    unflushed: usize,
}

/// Owner of the checkpoint state for one run
pub struct CheckpointManager {
    path: PathBuf,
    persist: bool,
    inner: Mutex<Inner>,
}

impl CheckpointManager {
    /// Default checkpoint location for a destination
    pub fn default_path(destination: &Path) -> PathBuf {
        destination.join(CHECKPOINT_FILE_NAME)
    }

    /// Open the checkpoint for `selection`, resuming earlier progress when
    /// the stored destination, target and selection hash all match. Any
    /// other checkpoint at the same path is superseded.
    ///
    /// With `persist` the fresh or resumed state is written immediately and
    /// failure to do so is fatal. Without it nothing is ever written.
    pub fn resolve(
        destination: &Path,
        selection: &SelectionResult,
        target: &SelectionTarget,
        explicit_path: Option<&Path>,
        persist: bool,
    ) -> Result<Self> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::default_path(destination));
        let selection_hash = selection.content_hash();

        let existing = read_checkpoint(&path).filter(|file| {
            let matches = file.selection_hash == selection_hash && file.belongs_to(destination, target);
            if !matches {
                debug!(
                    "Checkpoint {} belongs to another selection, starting fresh",
                    path.display()
                );
            }
            matches
        });

        let state = match existing {
            Some(file) => {
                info!(
                    "Resuming from checkpoint {} with {} files already copied",
                    path.display(),
                    file.copied.len()
                );
                CheckpointState {
                    destination: destination.to_path_buf(),
                    target: *target,
                    selection_hash,
                    selected: selection.files.clone(),
                    copied: file
                        .copied
                        .into_iter()
                        .map(|entry| (entry.source, entry.destination))
                        .collect(),
                    updated_at: file.updated_at,
                    resumed: true,
                }
            }
            None => CheckpointState {
                destination: destination.to_path_buf(),
                target: *target,
                selection_hash,
                selected: selection.files.clone(),
                copied: HashMap::new(),
                updated_at: Utc::now(),
                resumed: false,
            },
        };

        let manager = Self {
            path,
            persist,
            inner: Mutex::new(Inner {
                state,
                unflushed: 0,
            }),
        };
        if persist {
            manager.flush().map_err(|e| {
                crate::error!(
                    Checkpoint,
                    "could not write checkpoint {}: {}",
                    manager.path.display(),
                    e
                )
            })?;
        }
        Ok(manager)
    }

    /// Records stored in an existing checkpoint for `destination` that was
    /// drawn for the same `target`, if any
    pub fn load_selection(path: &Path, destination: &Path, target: &SelectionTarget) -> Option<Vec<FileRecord>> {
        let file = read_checkpoint(path)?;
        if !file.belongs_to(destination, target) {
            debug!(
                "Checkpoint {} was made for another destination or target",
                path.display()
            );
            return None;
        }
        Some(file.selected_files)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_resumed(&self) -> bool {
        self.lock().state.resumed
    }

    pub fn is_copied(&self, source: &Path) -> bool {
        self.lock().state.copied.contains_key(source)
    }

    /// Destination file recorded for `source`
    pub fn copied_destination(&self, source: &Path) -> Option<PathBuf> {
        self.lock().state.copied.get(source).cloned()
    }

    /// Every destination file recorded so far
    pub fn copied_destinations(&self) -> Vec<PathBuf> {
        self.lock().state.copied.values().cloned().collect()
    }

    pub fn copied_count(&self) -> usize {
        self.lock().state.copied.len()
    }

    /// Mark `source` as copied to `destination`. Must only be called once
    /// the destination file is complete.
    pub fn record_progress(&self, source: &Path, destination: &Path) {
        let mut inner = self.lock();
        if inner
            .state
            .copied
            .insert(source.to_path_buf(), destination.to_path_buf())
            .is_some()
        {
            return;
        }
        inner.unflushed += 1;
        if inner.unflushed >= FLUSH_EVERY {
            if let Err(e) = self.write_locked(&mut inner) {
                warn!("Failed to save checkpoint {}: {}", self.path.display(), e);
            }
        }
    }

    /// Write the current state to disk
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.lock();
        self.write_locked(&mut inner)?;
        Ok(())
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> CheckpointState {
        self.lock().state.clone()
    }

    /// Close out the checkpoint after a completed run: delete it when every
    /// file was copied or skipped, archive it when some failed.
    pub fn finalize(&self, outcomes: &[CopyOutcome]) -> Result<Finalized> {
        if !self.persist {
            return Ok(Finalized::InMemory);
        }

        if outcomes.iter().any(CopyOutcome::is_failed) {
            self.flush()?;
            let mut archived = self.path.clone().into_os_string();
            archived.push(".archived");
            let archived = PathBuf::from(archived);
            fs::rename(&self.path, &archived)?;
            info!("Some files failed, checkpoint kept at {}", archived.display());
            return Ok(Finalized::Archived(archived));
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("Removed checkpoint {}", self.path.display());
        Ok(Finalized::Removed)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_locked(&self, inner: &mut Inner) -> Result<()> {
        inner.state.updated_at = Utc::now();
        inner.unflushed = 0;
        if !self.persist {
            return Ok(());
        }

        let mut copied: Vec<CopiedFile> = inner
            .state
            .copied
            .iter()
            .map(|(source, destination)| CopiedFile {
                source: source.clone(),
                destination: destination.clone(),
            })
            .collect();
        copied.sort_by(|a, b| a.source.cmp(&b.source));
        let file = CheckpointFile {
            version: CHECKPOINT_FORMAT_VERSION,
            selection_hash: inner.state.selection_hash.clone(),
            destination: inner.state.destination.clone(),
            target: inner.state.target,
            copied,
            updated_at: inner.state.updated_at,
            selected_files: inner.state.selected.clone(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &data)?;
        debug!(
            "Checkpoint saved with {} copied files",
            file.copied.len()
        );
        Ok(())
    }
}

fn read_checkpoint(path: &Path) -> Option<CheckpointFile> {
    let data = fs::read(path).ok()?;
    match serde_json::from_slice::<CheckpointFile>(&data) {
        Ok(file) if file.version == CHECKPOINT_FORMAT_VERSION => Some(file),
        Ok(file) => {
            debug!(
                "Ignoring checkpoint {} with version {}",
                path.display(),
                file.version
            );
            None
        }
        Err(e) => {
            warn!("Ignoring unreadable checkpoint {}: {}", path.display(), e);
            None
        }
    }
}
