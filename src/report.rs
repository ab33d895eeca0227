/*!
 * Reporting functionality for media-sampler
 *
 * Writes the structured selection log into the destination and renders the
 * console summary using the tabled library.
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Padding, Style},
    Table, Tabled,
};

use crate::error::Result;
use crate::filter::FilterCriteria;
use crate::scanner::ScannerStatistics;
use crate::selector::{SelectionResult, Shortfall};
use crate::types::{CopyOutcome, CopyStatus, SkipReason};
use crate::utils::{format_file_size, write_atomic};

/// Name of the selection log inside the destination
pub const SELECTION_LOG_FILE: &str = "selection_log.json";

/// Number of planned copies shown in a dry-run preview
pub const PREVIEW_LIMIT: usize = 10;

/// Aggregate statistics of a selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStats {
    /// Files per extension
    pub types: BTreeMap<String, usize>,
    pub total_size: u64,
    pub count: usize,
}

impl SelectionStats {
    pub fn from_selection(selection: &SelectionResult) -> Self {
        Self {
            types: selection.histogram.clone(),
            total_size: selection.total_size,
            count: selection.count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub source: PathBuf,
    pub reason: String,
}

/// Structured record of a completed run, written to the destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionLog {
    pub timestamp: String,
    pub destination: PathBuf,
    pub total_selected: usize,
    /// Source paths of every selected file
    pub files: Vec<PathBuf>,
    pub stats: SelectionStats,
    pub filters_applied: serde_json::Value,
    /// Files this operation placed in the destination, including those
    /// written by an interrupted attempt it resumed
    #[serde(default)]
    pub copied: Vec<CopiedEntry>,
    #[serde(default)]
    pub failed: Vec<FailedEntry>,
}

impl SelectionLog {
    pub fn new(
        destination: &Path,
        selection: &SelectionResult,
        filters: &FilterCriteria,
        outcomes: &[CopyOutcome],
    ) -> Result<Self> {
        let mut copied = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            if let Some(placed) = outcome.destination() {
                copied.push(CopiedEntry {
                    source: outcome.source.clone(),
                    destination: placed.to_path_buf(),
                });
            } else if let CopyStatus::Failed { reason } = &outcome.status {
                failed.push(FailedEntry {
                    source: outcome.source.clone(),
                    reason: reason.clone(),
                });
            }
        }

        Ok(Self {
            timestamp: Local::now().to_rfc3339(),
            destination: destination.to_path_buf(),
            total_selected: selection.count(),
            files: selection.files.iter().map(|f| f.path.clone()).collect(),
            stats: SelectionStats::from_selection(selection),
            filters_applied: serde_json::to_value(filters)?,
            copied,
            failed,
        })
    }
}

/// Write `log` to `<destination>/selection_log.json`
pub fn write_selection_log(destination: &Path, log: &SelectionLog) -> Result<PathBuf> {
    let path = destination.join(SELECTION_LOG_FILE);
    let data = serde_json::to_vec_pretty(log)?;
    write_atomic(&path, &data)?;
    Ok(path)
}

/// Read the selection log of `destination`
pub fn read_selection_log(destination: &Path) -> Result<SelectionLog> {
    let path = destination.join(SELECTION_LOG_FILE);
    if !path.is_file() {
        return Err(crate::error::SamplerError::PathNotFound(path));
    }
    let data = fs::read(&path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Everything the console report needs about a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub destination: PathBuf,
    pub dry_run: bool,
    /// Cancelled before every file was handled
    pub interrupted: bool,
    /// Progress was restored from a checkpoint
    pub resumed: bool,
    pub selection: SelectionResult,
    /// One outcome per selected file
    pub outcomes: Vec<CopyOutcome>,
    pub scan: ScannerStatistics,
    pub scan_duration: Duration,
    pub copy_duration: Duration,
    /// Where the selection log was written
    pub log_path: Option<PathBuf>,
}

impl RunSummary {
    pub fn copied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_copied()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn bytes_copied(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| o.is_copied())
            .map(|o| o.size)
            .sum()
    }

    /// Failed sources with their cause
    pub fn failures(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            CopyStatus::Failed { reason } => Some((o.source.as_path(), reason.as_str())),
            _ => None,
        })
    }

    pub fn nothing_matched(&self) -> bool {
        self.selection.nothing_matched()
    }
}

/// Format of the report output
pub enum ReportFormat {
    /// Console table output
    ConsoleTable,
}

/// Report generator for run summaries
pub struct Reporter {
    format: ReportFormat,
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Metric")]
    key: String,

    #[tabled(rename = "Value")]
    value: String,
}

impl SummaryRow {
    fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

impl Reporter {
    /// Create a new reporter
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Generate a report string for a run
    pub fn generate_report(&self, summary: &RunSummary) -> String {
        match self.format {
            ReportFormat::ConsoleTable => self.generate_console_report(summary),
        }
    }

    /// Print the report to stdout
    pub fn print_report(&self, summary: &RunSummary) {
        println!("\n{}", self.generate_report(summary));
    }

    fn render(mut table: Table) -> String {
        table
            .with(Style::rounded())
            .with(Padding::new(1, 1, 0, 0))
            .with(Modify::new(Columns::new(..)).with(Alignment::left()));
        table.to_string()
    }

    fn create_summary_table(&self, summary: &RunSummary) -> String {
        let mut rows = vec![
            SummaryRow::new("📂 Destination", summary.destination.display().to_string()),
            SummaryRow::new(
                "🔎 Files Scanned",
                format!("{} ({} matched filters)", summary.scan.files_scanned, summary.selection.pool_size),
            ),
            SummaryRow::new(
                "🎯 Selected",
                format!(
                    "{} files, {}",
                    summary.selection.count(),
                    format_file_size(summary.selection.total_size)
                ),
            ),
        ];

        if summary.dry_run {
            rows.push(SummaryRow::new("📝 Would Copy", summary.copied().to_string()));
        } else {
            rows.push(SummaryRow::new(
                "✅ Copied",
                format!("{} files, {}", summary.copied(), format_file_size(summary.bytes_copied())),
            ));
        }
        rows.push(SummaryRow::new("⏭️ Skipped", summary.skipped().to_string()));
        rows.push(SummaryRow::new("❌ Failed", summary.failed().to_string()));

        if summary.resumed {
            rows.push(SummaryRow::new("🔁 Resumed", "yes"));
        }

        let total = summary.scan.cache_hits + summary.scan.cache_misses;
        if total > 0 {
            rows.push(SummaryRow::new(
                "🔄 Cache Hits",
                format!("{} of {} folders", summary.scan.cache_hits, total),
            ));
        }
        if summary.scan.warnings > 0 {
            rows.push(SummaryRow::new("⚠️ Scan Warnings", summary.scan.warnings.to_string()));
        }

        rows.push(SummaryRow::new("⏱️ Scan Time", format!("{:.2?}", summary.scan_duration)));
        rows.push(SummaryRow::new("⏱️ Copy Time", format!("{:.2?}", summary.copy_duration)));
        if let Some(path) = &summary.log_path {
            rows.push(SummaryRow::new("🧾 Selection Log", path.display().to_string()));
        }

        Self::render(Table::new(rows))
    }

    fn create_types_table(&self, summary: &RunSummary) -> String {
        #[derive(Tabled)]
        struct TypeRow {
            #[tabled(rename = "Extension")]
            extension: String,

            #[tabled(rename = "Files")]
            count: usize,
        }

        let rows: Vec<TypeRow> = summary
            .selection
            .histogram
            .iter()
            .map(|(extension, &count)| TypeRow {
                extension: extension.clone(),
                count,
            })
            .collect();
        Self::render(Table::new(rows))
    }

    fn create_shortfall_table(&self, shortfalls: &[Shortfall]) -> String {
        #[derive(Tabled)]
        struct ShortfallRow {
            #[tabled(rename = "Folder")]
            folder: String,

            #[tabled(rename = "Requested")]
            requested: u64,

            #[tabled(rename = "Available")]
            available: u64,
        }

        let rows: Vec<ShortfallRow> = shortfalls
            .iter()
            .map(|s| ShortfallRow {
                folder: s.folder.display().to_string(),
                requested: s.requested,
                available: s.available,
            })
            .collect();
        Self::render(Table::new(rows))
    }

    fn create_failures_table(&self, summary: &RunSummary) -> String {
        #[derive(Tabled)]
        struct FailureRow {
            #[tabled(rename = "File")]
            path: String,

            #[tabled(rename = "Reason")]
            reason: String,
        }

        let rows: Vec<FailureRow> = summary
            .failures()
            .map(|(path, reason)| FailureRow {
                path: path.display().to_string(),
                reason: reason.to_string(),
            })
            .collect();
        Self::render(Table::new(rows))
    }

    fn create_preview_table(&self, summary: &RunSummary) -> String {
        #[derive(Tabled)]
        struct PreviewRow {
            #[tabled(rename = "Source")]
            source: String,

            #[tabled(rename = "Destination")]
            destination: String,

            #[tabled(rename = "Size")]
            size: String,
        }

        let rows: Vec<PreviewRow> = summary
            .outcomes
            .iter()
            .filter_map(|o| match &o.status {
                CopyStatus::Copied { destination } => Some((o, destination)),
                _ => None,
            })
            .take(PREVIEW_LIMIT)
            .map(|(o, destination)| PreviewRow {
                source: o.source.display().to_string(),
                destination: destination.display().to_string(),
                size: format_file_size(o.size),
            })
            .collect();
        Self::render(Table::new(rows))
    }

    fn generate_console_report(&self, summary: &RunSummary) -> String {
        if summary.nothing_matched() {
            return "⚠️  No files matched the filter criteria".to_string();
        }

        let mut sections = Vec::new();

        if summary.dry_run {
            let planned = summary.copied();
            let title = if planned > PREVIEW_LIMIT {
                format!("🔍  DRY RUN: FIRST {} OF {} PLANNED COPIES", PREVIEW_LIMIT, planned)
            } else {
                "🔍  DRY RUN: PLANNED COPIES".to_string()
            };
            sections.push(format!("{}\n{}", title, self.create_preview_table(summary)));
        }

        if !summary.selection.histogram.is_empty() {
            sections.push(format!("📋  FILE TYPES\n{}", self.create_types_table(summary)));
        }

        if !summary.selection.shortfalls.is_empty() {
            sections.push(format!(
                "⚖️  FOLDERS BELOW THEIR SHARE\n{}",
                self.create_shortfall_table(&summary.selection.shortfalls)
            ));
        }

        if summary.failed() > 0 {
            sections.push(format!("❌  FAILURES\n{}", self.create_failures_table(summary)));
        }

        let title = if summary.interrupted {
            "⏸️  INTERRUPTED: RE-RUN TO RESUME"
        } else if summary.dry_run {
            "✅  DRY RUN COMPLETE"
        } else {
            "✅  SAMPLING COMPLETE"
        };
        sections.push(format!("{}\n{}", title, self.create_summary_table(summary)));

        sections.join("\n\n")
    }
}

/// Short human description of why a file was skipped
pub fn describe_skip(reason: &SkipReason) -> String {
    match reason {
        SkipReason::Checkpointed(path) => format!("copied to {} in an earlier run", path.display()),
        SkipReason::AlreadyPresent(path) => format!("already present at {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileRecord, MediaCategory};
    use chrono::Utc;
    use tempfile::tempdir;

    fn selection() -> SelectionResult {
        let files = ["a.jpg", "b.mp4", "c.jpg"]
            .iter()
            .map(|name| FileRecord {
                path: PathBuf::from("/src").join(name),
                size: 2048,
                modified: Utc::now(),
                extension: format!(".{}", name.rsplit('.').next().unwrap()),
                category: MediaCategory::Image,
                folder: PathBuf::from("/src"),
            })
            .collect();
        SelectionResult::from_records(files, 10, Vec::new())
    }

    fn outcomes(selection: &SelectionResult, dest: &Path) -> Vec<CopyOutcome> {
        vec![
            CopyOutcome {
                source: selection.files[0].path.clone(),
                size: 2048,
                status: CopyStatus::Copied {
                    destination: dest.join("a.jpg"),
                },
            },
            CopyOutcome {
                source: selection.files[1].path.clone(),
                size: 2048,
                status: CopyStatus::Failed {
                    reason: "permission denied".to_string(),
                },
            },
            CopyOutcome {
                source: selection.files[2].path.clone(),
                size: 2048,
                status: CopyStatus::Skipped(SkipReason::Checkpointed(dest.join("c.jpg"))),
            },
        ]
    }

    fn summary(dest: &Path) -> RunSummary {
        let selection = selection();
        let outcomes = outcomes(&selection, dest);
        RunSummary {
            destination: dest.to_path_buf(),
            dry_run: false,
            interrupted: false,
            resumed: true,
            selection,
            outcomes,
            scan: ScannerStatistics {
                files_scanned: 12,
                cache_hits: 1,
                cache_misses: 1,
                warnings: 0,
            },
            scan_duration: Duration::from_millis(12),
            copy_duration: Duration::from_millis(40),
            log_path: None,
        }
    }

    #[test]
    fn test_selection_stats() {
        let stats = SelectionStats::from_selection(&selection());
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_size, 6144);
        assert_eq!(stats.types.get(".jpg"), Some(&2));
        assert_eq!(stats.types.get(".mp4"), Some(&1));
    }

    #[test]
    fn test_selection_log_round_trip() -> Result<()> {
        let dest = tempdir()?;
        let selection = selection();
        let filters = FilterCriteria {
            min_size: Some(1024),
            ..Default::default()
        };
        let log = SelectionLog::new(dest.path(), &selection, &filters, &outcomes(&selection, dest.path()))?;

        let path = write_selection_log(dest.path(), &log)?;
        assert_eq!(path, dest.path().join(SELECTION_LOG_FILE));

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path)?)?;
        assert_eq!(raw["total_selected"], 3);
        assert_eq!(raw["stats"]["count"], 3);
        assert_eq!(raw["filters_applied"]["min_size"], 1024);
        assert!(raw["filters_applied"].get("max_size").is_none());

        let read = read_selection_log(dest.path())?;
        assert_eq!(read, log);
        assert_eq!(read.copied.len(), 2);
        assert_eq!(read.copied[1].destination, dest.path().join("c.jpg"));
        assert_eq!(read.failed[0].reason, "permission denied");
        Ok(())
    }

    #[test]
    fn test_missing_log_is_path_not_found() {
        let dest = tempdir().unwrap();
        assert!(matches!(
            read_selection_log(dest.path()),
            Err(crate::error::SamplerError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_summary_counts() {
        let summary = summary(Path::new("/out"));
        assert_eq!(summary.copied(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.bytes_copied(), 2048);
        let failures: Vec<_> = summary.failures().collect();
        assert_eq!(failures, [(Path::new("/src/b.mp4"), "permission denied")]);
    }

    #[test]
    fn test_console_report_sections() {
        let reporter = Reporter::new(ReportFormat::ConsoleTable);
        let report = reporter.generate_report(&summary(Path::new("/out")));
        assert!(report.contains("FILE TYPES"));
        assert!(report.contains("FAILURES"));
        assert!(report.contains("permission denied"));
        assert!(report.contains("SAMPLING COMPLETE"));
        assert!(report.contains("1 of 2 folders"));
        assert!(!report.contains("DRY RUN"));
    }

    #[test]
    fn test_dry_run_preview_is_limited() {
        let files: Vec<FileRecord> = (0..15)
            .map(|i| FileRecord {
                path: PathBuf::from(format!("/src/{}.jpg", i)),
                size: 1,
                modified: Utc::now(),
                extension: ".jpg".to_string(),
                category: MediaCategory::Image,
                folder: PathBuf::from("/src"),
            })
            .collect();
        let outcomes = files
            .iter()
            .map(|f| CopyOutcome {
                source: f.path.clone(),
                size: 1,
                status: CopyStatus::Copied {
                    destination: PathBuf::from("/out").join(f.path.file_name().unwrap()),
                },
            })
            .collect();
        let mut summary = summary(Path::new("/out"));
        summary.dry_run = true;
        summary.selection = SelectionResult::from_records(files, 15, Vec::new());
        summary.outcomes = outcomes;

        let report = Reporter::new(ReportFormat::ConsoleTable).generate_report(&summary);
        assert!(report.contains("FIRST 10 OF 15 PLANNED COPIES"));
        assert!(report.contains("/src/9.jpg"));
        assert!(!report.contains("/src/14.jpg"));
    }

    #[test]
    fn test_nothing_matched_report() {
        let mut summary = summary(Path::new("/out"));
        summary.selection = SelectionResult::default();
        summary.outcomes.clear();
        let report = Reporter::new(ReportFormat::ConsoleTable).generate_report(&summary);
        assert!(report.contains("No files matched"));
    }

    #[test]
    fn test_describe_skip() {
        assert_eq!(
            describe_skip(&SkipReason::Checkpointed(PathBuf::from("/out/b.jpg"))),
            "copied to /out/b.jpg in an earlier run"
        );
        assert!(describe_skip(&SkipReason::AlreadyPresent(PathBuf::from("/out/a.jpg"))).contains("/out/a.jpg"));
    }
}
