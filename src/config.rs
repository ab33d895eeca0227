/*!
 * Configuration handling for media-sampler
 */

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use clap_complete::Shell;

use crate::error::{Result, SamplerError};
use crate::filter::FilterCriteria;
use crate::selector::SelectionTarget;
use crate::types::MediaCategory;
use crate::utils::{parse_date_end, parse_date_start, parse_size};

/// Files selected when no target is given
pub const DEFAULT_NUM_FILES: usize = 100;

/// Copy workers used when no count is given
pub const DEFAULT_WORKERS: usize = 4;

/// Command-line arguments for media-sampler
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "media-sampler",
    version = env!("CARGO_PKG_VERSION"),
    about = "Copy a random sample of media files from several folders",
    long_about = "Selects a random subset of images and videos from one or more source folders, by file count or total size, and copies it to a destination. Interrupted copies resume where they stopped."
)]
pub struct Args {
    /// Comma-separated list of source folders
    #[clap(
        short = 's',
        long = "source-folders",
        value_delimiter = ',',
        required_unless_present_any = ["generate", "undo"]
    )]
    pub source_folders: Vec<PathBuf>,

    /// Destination folder
    #[clap(long, visible_alias = "dest", required_unless_present = "generate")]
    pub destination: Option<PathBuf>,

    /// Number of files to select
    #[clap(short = 'n', long, default_value_t = DEFAULT_NUM_FILES, conflicts_with = "target_size")]
    pub num_files: usize,

    /// Total size to select instead of a file count (e.g. 500MB, 1.5GB)
    #[clap(long, visible_alias = "size")]
    pub target_size: Option<String>,

    /// Split the target evenly across source folders
    #[clap(short, long)]
    pub balanced: bool,

    /// Show what would be copied without copying
    #[clap(short, long)]
    pub dry_run: bool,

    /// Mirror each file's folder structure under the destination
    #[clap(short, long)]
    pub preserve_structure: bool,

    /// Minimum file size (e.g. 1MB)
    #[clap(long)]
    pub min_size: Option<String>,

    /// Maximum file size (e.g. 100MB)
    #[clap(long)]
    pub max_size: Option<String>,

    /// Files modified on or after this date (YYYY-MM-DD)
    #[clap(long)]
    pub date_from: Option<String>,

    /// Files modified on or before this date (YYYY-MM-DD)
    #[clap(long)]
    pub date_to: Option<String>,

    /// Comma-separated list of extensions to keep (e.g. jpg,mp4)
    #[clap(long, value_delimiter = ',')]
    pub file_types: Vec<String>,

    /// Comma-separated list of media types to keep
    #[clap(long, value_enum, value_delimiter = ',')]
    pub media_types: Vec<MediaCategory>,

    /// Number of parallel copy workers
    #[clap(long, visible_alias = "workers", default_value_t = DEFAULT_WORKERS)]
    pub max_workers: usize,

    /// Disable the scan cache
    #[clap(long)]
    pub no_cache: bool,

    /// Directory holding the scan cache
    #[clap(long)]
    pub cache_dir: Option<PathBuf>,

    /// Checkpoint file used to resume an interrupted copy
    #[clap(long)]
    pub resume_file: Option<PathBuf>,

    /// Seed for the random selection
    #[clap(long)]
    pub seed: Option<u64>,

    /// Delete the files copied by the last run into the destination
    #[clap(long, conflicts_with = "dry_run")]
    pub undo: bool,

    /// Increase log verbosity (-v, -vv)
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Generate shell completions
    #[clap(long = "generate", value_enum)]
    pub generate: Option<Shell>,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Folders to sample from, in declaration order
    pub source_folders: Vec<PathBuf>,

    /// Folder receiving the copies
    pub destination: PathBuf,

    /// What to select
    pub target: SelectionTarget,

    /// Predicates applied before selection
    pub filters: FilterCriteria,

    /// Number of copy workers
    pub workers: usize,

    /// Whether the scan cache is consulted and updated
    pub use_cache: bool,

    /// Scan cache location override
    pub cache_dir: Option<PathBuf>,

    /// Checkpoint location override
    pub checkpoint_path: Option<PathBuf>,

    /// Plan only, touch nothing
    pub dry_run: bool,

    /// Mirror source structure under the destination
    pub preserve_structure: bool,

    /// Fixed seed for reproducible selection
    pub seed: Option<u64>,
}

impl Config {
    /// Configuration with default target, workers and cache settings
    pub fn new(source_folders: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source_folders,
            destination: destination.into(),
            target: SelectionTarget::count(DEFAULT_NUM_FILES),
            filters: FilterCriteria::default(),
            workers: DEFAULT_WORKERS,
            use_cache: true,
            cache_dir: None,
            checkpoint_path: None,
            dry_run: false,
            preserve_structure: false,
            seed: None,
        }
    }

    /// Create configuration from command-line arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let destination = args
            .destination
            .ok_or_else(|| crate::error!(Config, "a destination folder is required"))?;

        let mut target = match &args.target_size {
            Some(size) => SelectionTarget::size(parse_size(size)?),
            None => SelectionTarget::count(args.num_files),
        };
        target.balanced = args.balanced;

        let filters = FilterCriteria {
            min_size: args.min_size.as_deref().map(parse_size).transpose()?,
            max_size: args.max_size.as_deref().map(parse_size).transpose()?,
            modified_from: args.date_from.as_deref().map(parse_date_start).transpose()?,
            modified_to: args.date_to.as_deref().map(parse_date_end).transpose()?,
            ..Default::default()
        }
        .with_extensions(&args.file_types)
        .with_media_types(args.media_types);

        Ok(Self {
            source_folders: args.source_folders,
            destination,
            target,
            filters,
            workers: args.max_workers,
            use_cache: !args.no_cache,
            cache_dir: args.cache_dir,
            checkpoint_path: args.resume_file,
            dry_run: args.dry_run,
            preserve_structure: args.preserve_structure,
            seed: args.seed,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        crate::ensure!(
            !self.source_folders.is_empty(),
            Config,
            "at least one source folder is required"
        );
        crate::ensure!(
            self.workers > 0,
            Config,
            "worker count must be at least 1, got {}",
            self.workers
        );

        if let (Some(min), Some(max)) = (self.filters.min_size, self.filters.max_size) {
            crate::ensure!(
                min <= max,
                InvalidArgument,
                "minimum size {} is larger than maximum size {}",
                min,
                max
            );
        }
        if let (Some(from), Some(to)) = (self.filters.modified_from, self.filters.modified_to) {
            crate::ensure!(
                from <= to,
                InvalidArgument,
                "date range starts after it ends"
            );
        }

        let destination = resolve_path(&self.destination)?;
        for source in &self.source_folders {
            if !source.is_dir() {
                return Err(SamplerError::PathNotFound(source.clone()));
            }
            let source = fs::canonicalize(source)?;
            crate::ensure!(
                !destination.starts_with(&source),
                Config,
                "destination {} is inside source folder {}",
                destination.display(),
                source.display()
            );
        }

        if let Some(parent) = self.checkpoint_path.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() && !parent.is_dir() && !self.dry_run {
                return Err(SamplerError::PathNotFound(parent.to_path_buf()));
            }
        }

        Ok(())
    }
}

/// Absolute, symlink-free form of a path that may not exist yet
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return Ok(rest.iter().rev().fold(canonical, |acc, part| acc.join(part)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::TargetKind;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("media-sampler").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(parse(&["-s", "/a,/b", "--destination", "/out"])).unwrap();
        assert_eq!(config.source_folders, [PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(config.target, SelectionTarget::count(100));
        assert_eq!(config.workers, 4);
        assert!(config.use_cache);
        assert!(config.filters.is_empty());
        assert!(!config.dry_run);
    }

    #[test]
    fn test_size_target_and_filters() {
        let config = Config::from_args(parse(&[
            "-s",
            "/a",
            "--dest",
            "/out",
            "--target-size",
            "1.5GB",
            "--balanced",
            "--min-size",
            "1MB",
            "--file-types",
            "JPG,.mp4",
            "--media-types",
            "image,video",
            "--date-from",
            "2024-01-01",
            "--no-cache",
        ]))
        .unwrap();

        assert_eq!(config.target.kind, TargetKind::Size(1536 * 1024 * 1024));
        assert!(config.target.balanced);
        assert_eq!(config.filters.min_size, Some(1024 * 1024));
        assert_eq!(
            config.filters.extensions,
            Some(BTreeSet::from([".jpg".to_string(), ".mp4".to_string()]))
        );
        assert_eq!(
            config.filters.media_types,
            Some(BTreeSet::from([MediaCategory::Image, MediaCategory::Video]))
        );
        assert!(config.filters.modified_from.is_some());
        assert!(!config.use_cache);
    }

    #[test]
    fn test_count_and_size_conflict() {
        let result = Args::try_parse_from([
            "media-sampler",
            "-s",
            "/a",
            "--destination",
            "/out",
            "-n",
            "5",
            "--target-size",
            "1GB",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_values() {
        let err = Config::from_args(parse(&["-s", "/a", "--destination", "/out", "--min-size", "huge"]))
            .unwrap_err();
        assert!(matches!(err, SamplerError::InvalidArgument(_)));

        let err = Config::from_args(parse(&["-s", "/a", "--destination", "/out", "--date-to", "yesterday"]))
            .unwrap_err();
        assert!(matches!(err, SamplerError::InvalidArgument(_)));
    }

    #[test]
    fn test_validate() -> Result<()> {
        let source = tempdir()?;
        let out = tempdir()?;
        let config = Config::new(vec![source.path().to_path_buf()], out.path().join("sample"));
        config.validate()?;

        let mut no_sources = config.clone();
        no_sources.source_folders.clear();
        assert!(matches!(no_sources.validate(), Err(SamplerError::Config(_))));

        let mut missing = config.clone();
        missing.source_folders.push(source.path().join("missing"));
        assert!(matches!(missing.validate(), Err(SamplerError::PathNotFound(_))));

        let mut no_workers = config.clone();
        no_workers.workers = 0;
        assert!(matches!(no_workers.validate(), Err(SamplerError::Config(_))));

        let mut inside = config.clone();
        inside.destination = source.path().join("picked").join("today");
        assert!(matches!(inside.validate(), Err(SamplerError::Config(_))));

        let mut inverted = config;
        inverted.filters.min_size = Some(10);
        inverted.filters.max_size = Some(5);
        assert!(matches!(inverted.validate(), Err(SamplerError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn test_undo_needs_only_destination() {
        let args = parse(&["--undo", "--destination", "/out"]);
        assert!(args.undo);
        assert!(args.source_folders.is_empty());
    }

    #[test]
    fn test_resolve_path_for_missing_leaf() -> Result<()> {
        let dir = tempdir()?;
        let resolved = resolve_path(&dir.path().join("a").join("b"))?;
        assert_eq!(resolved, fs::canonicalize(dir.path())?.join("a").join("b"));
        Ok(())
    }
}
