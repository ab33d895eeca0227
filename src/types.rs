/*!
 * Core types and data structures for media-sampler
 */

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Coarse media category derived from a file extension
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    ValueEnum,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    /// Still images
    Image,
    /// Video files
    Video,
    /// Recognized media that is neither image nor video
    Other,
}

/// Cheap fingerprint of a folder tree used to decide cache validity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSignature {
    /// Latest modification time of any directory in the tree (seconds part)
    pub modified_secs: i64,
    /// Latest modification time of any directory in the tree (nanoseconds part)
    pub modified_nanos: u32,
    /// Number of entries below the folder root
    pub entry_count: u64,
}

/// A configured source folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFolder {
    /// Canonical absolute path
    pub path: PathBuf,
    /// Signature captured when the folder was opened for this run
    pub signature: FolderSignature,
}

/// A media file discovered while scanning
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Lower-cased extension including the leading dot
    pub extension: String,
    /// Category derived from the extension
    pub category: MediaCategory,
    /// Root of the source folder this file was found under
    pub folder: PathBuf,
}

impl FileRecord {
    /// File name component of the path
    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// Path relative to the owning source folder
    pub fn relative_path(&self) -> &Path {
        self.path.strip_prefix(&self.folder).unwrap_or(&self.path)
    }
}

/// Records belonging to one source folder, in declaration order
#[derive(Debug, Clone, Default)]
pub struct FolderFiles {
    /// Source folder root
    pub folder: PathBuf,
    /// Records found under the folder
    pub files: Vec<FileRecord>,
}

impl FolderFiles {
    /// Total size of all records in bytes
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Why a file did not need copying
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The checkpoint already lists the file as copied to this path
    Checkpointed(PathBuf),
    /// A file with identical contents already exists at this path
    AlreadyPresent(PathBuf),
}

/// Result of handling one selected file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    /// Written to the destination in this run
    Copied {
        /// Final destination path
        destination: PathBuf,
    },
    /// Nothing to do
    Skipped(SkipReason),
    /// Could not be copied
    Failed {
        /// Human readable cause
        reason: String,
    },
}

/// Per-file outcome of a copy run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Source file
    pub source: PathBuf,
    /// Size of the source in bytes
    pub size: u64,
    /// What happened
    pub status: CopyStatus,
}

impl CopyOutcome {
    /// Where the file sits in the destination, if it got there at any point
    pub fn destination(&self) -> Option<&Path> {
        match &self.status {
            CopyStatus::Copied { destination } => Some(destination.as_path()),
            CopyStatus::Skipped(SkipReason::Checkpointed(path) | SkipReason::AlreadyPresent(path)) => {
                Some(path.as_path())
            }
            CopyStatus::Failed { .. } => None,
        }
    }

    pub fn is_copied(&self) -> bool {
        matches!(self.status, CopyStatus::Copied { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, CopyStatus::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, CopyStatus::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_category_parsing() {
        assert_eq!("image".parse::<MediaCategory>().unwrap(), MediaCategory::Image);
        assert_eq!("VIDEO".parse::<MediaCategory>().unwrap(), MediaCategory::Video);
        assert!("audio".parse::<MediaCategory>().is_err());
        assert_eq!(MediaCategory::Other.to_string(), "other");
    }

    #[test]
    fn test_relative_path() {
        let record = FileRecord {
            path: PathBuf::from("/photos/2023/beach.jpg"),
            size: 10,
            modified: Utc::now(),
            extension: ".jpg".to_string(),
            category: MediaCategory::Image,
            folder: PathBuf::from("/photos"),
        };
        assert_eq!(record.relative_path(), Path::new("2023/beach.jpg"));
        assert_eq!(record.file_name().unwrap(), "beach.jpg");
    }

    #[test]
    fn test_outcome_destination() {
        let outcome = |status| CopyOutcome {
            source: PathBuf::from("/photos/a.jpg"),
            size: 1,
            status,
        };
        let out = PathBuf::from("/out/a.jpg");

        assert_eq!(
            outcome(CopyStatus::Skipped(SkipReason::Checkpointed(out.clone()))).destination(),
            Some(out.as_path())
        );
        assert_eq!(
            outcome(CopyStatus::Copied { destination: out.clone() }).destination(),
            Some(out.as_path())
        );
        assert_eq!(
            outcome(CopyStatus::Failed { reason: "gone".to_string() }).destination(),
            None
        );
    }
}
