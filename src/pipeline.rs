//! End-to-end run: scan, filter, select, checkpoint, copy, report
//!
//! [`Pipeline::run`] only fails on configuration problems or when the
//! destination and its checkpoint cannot be set up. Everything that goes
//! wrong for individual files ends up in the returned [`RunSummary`].

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::checkpoint::CheckpointManager;
use crate::config::{resolve_path, Config};
use crate::copier::{CopyExecutor, CopyOptions, INTERRUPTED_REASON};
use crate::error::Result;
use crate::filter;
use crate::media::MediaTable;
use crate::report::{describe_skip, write_selection_log, RunSummary, SelectionLog};
use crate::scanner::{ScannedFolder, Scanner};
use crate::selector::{SelectionResult, SelectionTarget, Selector};
use crate::types::{CopyStatus, FolderFiles, SourceFolder};

/// Wires every component for one run
pub struct Pipeline<R = StdRng> {
    config: Config,
    rng: R,
    media: MediaTable,
    cache: Option<CacheStore>,
    cancel: Arc<AtomicBool>,
    scan_progress: Arc<ProgressBar>,
    copy_progress: Arc<ProgressBar>,
}

impl Pipeline<StdRng> {
    /// Pipeline seeded from `config.seed`, or from OS entropy
    pub fn new(config: Config) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            media: MediaTable::default(),
            cache: None,
            cancel: Arc::new(AtomicBool::new(false)),
            scan_progress: Arc::new(ProgressBar::hidden()),
            copy_progress: Arc::new(ProgressBar::hidden()),
        }
    }
}

impl<R: Rng> Pipeline<R> {
    /// Replace the random source
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Pipeline<R2> {
        Pipeline {
            config: self.config,
            rng,
            media: self.media,
            cache: self.cache,
            cancel: self.cancel,
            scan_progress: self.scan_progress,
            copy_progress: self.copy_progress,
        }
    }

    /// Use `store` instead of the configured cache location
    pub fn with_cache_store(mut self, store: CacheStore) -> Self {
        self.cache = Some(store);
        self
    }

    pub fn with_media_table(mut self, media: MediaTable) -> Self {
        self.media = media;
        self
    }

    /// Share a cancel flag with the copy stage
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, scan: Arc<ProgressBar>, copy: Arc<ProgressBar>) -> Self {
        self.scan_progress = scan;
        self.copy_progress = copy;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute the run
    pub fn run(mut self) -> Result<RunSummary> {
        self.config.validate()?;
        let config = self.config.clone();

        let folders = config
            .source_folders
            .iter()
            .map(|path| SourceFolder::open(path))
            .collect::<Result<Vec<_>>>()?;

        let scan_start = Instant::now();
        let scanner = Scanner::new(self.media.clone(), self.cache_store(), self.scan_progress.clone());
        let scanned = scanner.scan(&folders);
        let scan_stats = scanner.get_statistics();
        let scan_duration = scan_start.elapsed();
        self.scan_progress.finish_and_clear();

        let filtered = apply_filters(scanned, &config);
        let pool_size: usize = filtered.iter().map(|f| f.files.len()).sum();
        info!("{} of {} media files match the filters", pool_size, scan_stats.files_scanned);

        let destination = if config.dry_run {
            resolve_path(&config.destination)?
        } else {
            fs::create_dir_all(&config.destination).map_err(|e| {
                crate::error!(
                    Copy,
                    "could not create destination {}: {}",
                    config.destination.display(),
                    e
                )
            })?;
            fs::canonicalize(&config.destination)?
        };

        let checkpoint_path = config
            .checkpoint_path
            .clone()
            .unwrap_or_else(|| CheckpointManager::default_path(&destination));
        let stored = reusable_selection(
            &checkpoint_path,
            &destination,
            &config.target,
            &filtered,
            pool_size,
        );
        let selection = match stored {
            Some(selection) => selection,
            None => Selector::with_rng(&mut self.rng).select(&filtered, &config.target),
        };

        let mut summary = RunSummary {
            destination: destination.clone(),
            dry_run: config.dry_run,
            interrupted: false,
            resumed: false,
            selection,
            outcomes: Vec::new(),
            scan: scan_stats,
            scan_duration,
            copy_duration: Duration::ZERO,
            log_path: None,
        };
        if summary.selection.is_empty() {
            return Ok(summary);
        }

        let checkpoint = CheckpointManager::resolve(
            &destination,
            &summary.selection,
            &config.target,
            Some(&checkpoint_path),
            !config.dry_run,
        )?;
        summary.resumed = checkpoint.is_resumed();

        let executor = CopyExecutor::new(CopyOptions {
            workers: config.workers,
            preserve_structure: config.preserve_structure,
            dry_run: config.dry_run,
        })
        .with_cancel(self.cancel.clone())
        .with_progress(self.copy_progress.clone());

        let copy_start = Instant::now();
        summary.outcomes = executor.run(&summary.selection, &checkpoint, &destination)?;
        summary.copy_duration = copy_start.elapsed();
        summary.interrupted = executor.interrupted()
            && summary.outcomes.iter().any(|o| {
                matches!(&o.status, CopyStatus::Failed { reason } if reason == INTERRUPTED_REASON)
            });
        self.copy_progress.finish_and_clear();

        for outcome in &summary.outcomes {
            if let CopyStatus::Skipped(reason) = &outcome.status {
                debug!("Skipped {}: {}", outcome.source.display(), describe_skip(reason));
            }
        }

        if summary.interrupted {
            if let Err(e) = checkpoint.flush() {
                warn!("Failed to save checkpoint {}: {}", checkpoint.path().display(), e);
            }
            return Ok(summary);
        }

        checkpoint.finalize(&summary.outcomes)?;
        if !config.dry_run {
            let log = SelectionLog::new(&destination, &summary.selection, &config.filters, &summary.outcomes)?;
            summary.log_path = Some(write_selection_log(&destination, &log)?);
        }

        info!(
            "Run finished: {} copied, {} skipped, {} failed",
            summary.copied(),
            summary.skipped(),
            summary.failed()
        );
        Ok(summary)
    }

    fn cache_store(&self) -> Option<CacheStore> {
        if !self.config.use_cache {
            return None;
        }
        if let Some(store) = &self.cache {
            return Some(store.clone());
        }
        if let Some(dir) = &self.config.cache_dir {
            return Some(CacheStore::new(dir));
        }
        match CacheStore::default_location() {
            Ok(store) => Some(store),
            Err(e) => {
                warn!("Scan cache disabled: {}", e);
                None
            }
        }
    }
}

fn apply_filters(scanned: Vec<ScannedFolder>, config: &Config) -> Vec<FolderFiles> {
    scanned
        .into_iter()
        .map(|folder| {
            let files = filter::apply(&folder.files, &config.filters);
            FolderFiles {
                folder: folder.folder,
                files,
            }
        })
        .collect()
}

/// The selection stored by an interrupted run for the same target, when
/// every file in it still passes the current filters.
fn reusable_selection(
    checkpoint_path: &Path,
    destination: &Path,
    target: &SelectionTarget,
    filtered: &[FolderFiles],
    pool_size: usize,
) -> Option<SelectionResult> {
    let stored = CheckpointManager::load_selection(checkpoint_path, destination, target)?;
    if stored.is_empty() {
        return None;
    }

    let pool: HashSet<_> = filtered.iter().flat_map(|f| &f.files).collect();
    if !stored.iter().all(|record| pool.contains(record)) {
        debug!("Stored selection no longer matches the scanned files");
        return None;
    }

    info!("Reusing the selection of an interrupted run ({} files)", stored.len());
    Some(SelectionResult::from_records(stored, pool_size, Vec::new()))
}
