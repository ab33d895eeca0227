/*!
 * media-sampler - Copy a random sample of media files from several folders
 *
 * Source folders are scanned (with a per-folder cache), filtered, reduced to
 * a target count or size, optionally balanced across folders, and copied to
 * a destination by a bounded worker pool. A checkpoint makes interrupted
 * copies resumable.
 */

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod copier;
pub mod error;
pub mod filter;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod selector;
pub mod types;
pub mod undo;
pub mod utils;


// Re-export main components for easier access
pub use cache::{CacheEntry, CacheStore};
pub use checkpoint::{CheckpointManager, CheckpointState};
pub use config::Config;
pub use copier::{CopyExecutor, CopyOptions};
pub use error::{Result, SamplerError};
pub use filter::FilterCriteria;
pub use media::MediaTable;
pub use pipeline::Pipeline;
pub use report::{ReportFormat, Reporter, RunSummary, SelectionLog, SelectionStats};
pub use scanner::{ScannedFolder, Scanner};
pub use selector::{SelectionResult, SelectionTarget, Selector, TargetKind};
pub use types::{CopyOutcome, CopyStatus, FileRecord, MediaCategory, SkipReason, SourceFolder};
pub use utils::{format_file_size, parse_size};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
