//! Revert the last completed copy into a destination

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::report::{read_selection_log, SELECTION_LOG_FILE};

/// What an undo did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoReport {
    /// Files deleted from the destination
    pub removed: usize,
    /// Logged files that no longer existed
    pub missing: usize,
    /// Logged paths outside the destination, left alone
    pub refused: Vec<PathBuf>,
    /// Files that could not be deleted
    pub errors: Vec<(PathBuf, String)>,
}

/// Delete every file the last operation placed in `destination`, then remove
/// the selection log.
///
/// Only paths that resolve inside `destination` are touched; source files
/// are never deleted.
pub fn undo_last_operation(destination: &Path) -> Result<UndoReport> {
    let log = read_selection_log(destination)?;
    let root = fs::canonicalize(destination)?;
    let mut report = UndoReport::default();

    if log.copied.is_empty() && !log.files.is_empty() {
        warn!("Selection log lists no copied destinations, nothing to remove");
    }

    for entry in &log.copied {
        let target = match fs::canonicalize(&entry.destination) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} is already gone", entry.destination.display());
                report.missing += 1;
                continue;
            }
            Err(e) => {
                report.errors.push((entry.destination.clone(), e.to_string()));
                continue;
            }
        };

        if !target.starts_with(&root) || target == root {
            warn!("Refusing to delete {} outside {}", target.display(), root.display());
            report.refused.push(entry.destination.clone());
            continue;
        }

        match fs::remove_file(&target) {
            Ok(()) => {
                report.removed += 1;
                prune_empty_parents(&target, &root);
            }
            Err(e) => {
                warn!("Could not delete {}: {}", target.display(), e);
                report.errors.push((entry.destination.clone(), e.to_string()));
            }
        }
    }

    fs::remove_file(destination.join(SELECTION_LOG_FILE))?;
    info!(
        "Undo removed {} files from {} ({} already missing)",
        report.removed,
        destination.display(),
        report.missing
    );
    Ok(report)
}

/// Remove directories left empty by the undo, up to `root`
fn prune_empty_parents(file: &Path, root: &Path) {
    let mut current = file.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) || fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}
