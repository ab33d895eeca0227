//! Random selection of files by count or cumulative size
//!
//! Selection draws from a single random source per run. Tests inject a
//! seeded generator through [`Selector::with_rng`]; production code seeds
//! from OS entropy.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{FileRecord, FolderFiles};

/// What the selection stops at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A number of files
    Count(usize),
    /// A cumulative size in bytes
    Size(u64),
}

/// Stopping criterion plus distribution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionTarget {
    pub kind: TargetKind,
    /// Split the target evenly across source folders
    pub balanced: bool,
}

impl SelectionTarget {
    pub fn count(n: usize) -> Self {
        Self {
            kind: TargetKind::Count(n),
            balanced: false,
        }
    }

    pub fn size(bytes: u64) -> Self {
        Self {
            kind: TargetKind::Size(bytes),
            balanced: false,
        }
    }

    pub fn balanced(mut self) -> Self {
        self.balanced = true;
        self
    }
}

/// A folder that could not fill its balanced share.
///
/// Units follow the target: files for count targets, bytes for size targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub folder: PathBuf,
    pub requested: u64,
    pub available: u64,
}

/// The chosen files and their aggregate statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionResult {
    /// Chosen records
    pub files: Vec<FileRecord>,
    /// Sum of the chosen sizes in bytes
    pub total_size: u64,
    /// Number of chosen files per extension
    pub histogram: BTreeMap<String, usize>,
    /// Number of records that passed filtering
    pub pool_size: usize,
    /// Folders that could not fill their balanced share
    pub shortfalls: Vec<Shortfall>,
}

impl SelectionResult {
    /// Build a result from chosen records, computing the aggregates
    pub fn from_records(files: Vec<FileRecord>, pool_size: usize, shortfalls: Vec<Shortfall>) -> Self {
        let total_size = files.iter().map(|f| f.size).sum();
        let mut histogram = BTreeMap::new();
        for file in &files {
            *histogram.entry(file.extension.clone()).or_insert(0) += 1;
        }
        Self {
            files,
            total_size,
            histogram,
            pool_size,
            shortfalls,
        }
    }

    pub fn count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// No record survived filtering, so there was nothing to choose from
    pub fn nothing_matched(&self) -> bool {
        self.pool_size == 0
    }

    /// Stable identity of the chosen set, independent of its order
    pub fn content_hash(&self) -> String {
        let mut entries: Vec<(String, u64)> = self
            .files
            .iter()
            .map(|f| (f.path.to_string_lossy().into_owned(), f.size))
            .collect();
        entries.sort();

        let mut hasher = blake3::Hasher::new();
        for (path, size) in &entries {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(&size.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Reduces filtered records to the target subset
pub struct Selector<R = StdRng> {
    rng: R,
}

impl Selector<StdRng> {
    /// Selector seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for Selector<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Selector<R> {
    /// Selector drawing from the given random source
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Choose files from `folders` (in declaration order) according to `target`
    pub fn select(&mut self, folders: &[FolderFiles], target: &SelectionTarget) -> SelectionResult {
        let pool_size: usize = folders.iter().map(|f| f.files.len()).sum();
        if pool_size == 0 {
            warn!("No files matched the filter criteria");
            return SelectionResult::default();
        }

        let (files, shortfalls) = match (target.kind, target.balanced) {
            (TargetKind::Count(n), false) => (self.sample_pool(folders, n), Vec::new()),
            (TargetKind::Count(n), true) => self.sample_balanced(folders, n),
            (TargetKind::Size(bytes), false) => {
                let pool: Vec<&FileRecord> = folders.iter().flat_map(|f| &f.files).collect();
                (self.accumulate(pool, bytes), Vec::new())
            }
            (TargetKind::Size(bytes), true) => self.accumulate_balanced(folders, bytes),
        };

        for shortfall in &shortfalls {
            warn!(
                "Folder {} could only provide {} of its {} share",
                shortfall.folder.display(),
                shortfall.available,
                shortfall.requested
            );
        }

        let result = SelectionResult::from_records(files, pool_size, shortfalls);
        info!(
            "Selected {} of {} files ({} bytes)",
            result.count(),
            pool_size,
            result.total_size
        );
        result
    }

    fn sample_pool(&mut self, folders: &[FolderFiles], n: usize) -> Vec<FileRecord> {
        let pool: Vec<&FileRecord> = folders.iter().flat_map(|f| &f.files).collect();
        let take = n.min(pool.len());
        pool.choose_multiple(&mut self.rng, take)
            .map(|r| (*r).clone())
            .collect()
    }

    fn sample_balanced(&mut self, folders: &[FolderFiles], n: usize) -> (Vec<FileRecord>, Vec<Shortfall>) {
        let k = folders.len();
        let base = n / k;
        let extra = n % k;
        debug!("Balanced count: {} per folder, first {} folders take one more", base, extra);

        let mut chosen = Vec::with_capacity(n);
        let mut shortfalls = Vec::new();
        for (i, folder) in folders.iter().enumerate() {
            let quota = base + usize::from(i < extra);
            let available = folder.files.len();
            if available < quota {
                shortfalls.push(Shortfall {
                    folder: folder.folder.clone(),
                    requested: quota as u64,
                    available: available as u64,
                });
            }
            chosen.extend(
                folder
                    .files
                    .choose_multiple(&mut self.rng, quota.min(available))
                    .cloned(),
            );
        }
        (chosen, shortfalls)
    }

    fn accumulate_balanced(&mut self, folders: &[FolderFiles], bytes: u64) -> (Vec<FileRecord>, Vec<Shortfall>) {
        let share = bytes / folders.len() as u64;
        debug!("Balanced size: {} bytes per folder", share);

        let mut chosen = Vec::new();
        let mut shortfalls = Vec::new();
        for folder in folders {
            let available = folder.total_size();
            if available < share {
                shortfalls.push(Shortfall {
                    folder: folder.folder.clone(),
                    requested: share,
                    available,
                });
            }
            chosen.extend(self.accumulate(folder.files.iter().collect(), share));
        }
        (chosen, shortfalls)
    }

    /// Shuffle, then take files until the running total reaches `budget`.
    /// The file that crosses the budget is kept whole.
    fn accumulate(&mut self, mut pool: Vec<&FileRecord>, budget: u64) -> Vec<FileRecord> {
        pool.shuffle(&mut self.rng);

        let mut total = 0u64;
        let mut chosen = Vec::new();
        for record in pool {
            if total >= budget {
                break;
            }
            total += record.size;
            chosen.push(record.clone());
        }
        chosen
    }
}
