/*!
 * Record filtering by size, modification date, extension and media type
 */

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::media::normalize_extension;
use crate::types::{FileRecord, MediaCategory};

/// Predicates applied to scanned records. Absent fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterCriteria {
    /// Minimum size in bytes (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    /// Maximum size in bytes (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Earliest modification time (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_from: Option<DateTime<Utc>>,
    /// Latest modification time (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_to: Option<DateTime<Utc>>,
    /// Allowed extensions, normalized to lower case with a leading dot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeSet<String>>,
    /// Allowed media categories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_types: Option<BTreeSet<MediaCategory>>,
}

impl FilterCriteria {
    /// Set the allowed extensions; `JPG`, `jpg` and `.jpg` are equivalent
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().to_string())
            .filter(|ext| !ext.is_empty())
            .map(|ext| normalize_extension(&ext))
            .collect();
        self.extensions = if set.is_empty() { None } else { Some(set) };
        self
    }

    /// Set the allowed media categories
    pub fn with_media_types<I>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = MediaCategory>,
    {
        let set: BTreeSet<MediaCategory> = media_types.into_iter().collect();
        self.media_types = if set.is_empty() { None } else { Some(set) };
        self
    }

    /// True when no predicate is configured
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Whether a single record passes every configured predicate
    pub fn matches(&self, record: &FileRecord) -> bool {
        if let Some(min) = self.min_size {
            if record.size < min {
                return false;
            }
        }
        if let Some(max) = self.max_size {
            if record.size > max {
                return false;
            }
        }
        if let Some(from) = self.modified_from {
            if record.modified < from {
                return false;
            }
        }
        if let Some(to) = self.modified_to {
            if record.modified > to {
                return false;
            }
        }
        if let Some(extensions) = &self.extensions {
            if !extensions.contains(&record.extension.to_lowercase()) {
                return false;
            }
        }
        if let Some(media_types) = &self.media_types {
            if !media_types.contains(&record.category) {
                return false;
            }
        }
        true
    }
}

/// Keep the records that pass `criteria`, preserving their order
pub fn apply(records: &[FileRecord], criteria: &FilterCriteria) -> Vec<FileRecord> {
    records
        .iter()
        .filter(|record| criteria.matches(record))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn record(name: &str, size: u64, day: u32, category: MediaCategory) -> FileRecord {
        let path = PathBuf::from("/src").join(name);
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        FileRecord {
            path,
            size,
            modified: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            extension,
            category,
            folder: PathBuf::from("/src"),
        }
    }

    fn sample() -> Vec<FileRecord> {
        vec![
            record("a.jpg", 100, 1, MediaCategory::Image),
            record("b.mp4", 5_000, 5, MediaCategory::Video),
            record("c.png", 1_000, 10, MediaCategory::Image),
            record("d.gif", 50, 15, MediaCategory::Other),
            record("e.mov", 1_000, 20, MediaCategory::Video),
        ]
    }

    fn names(records: &[FileRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_empty_criteria_keeps_everything() {
        let criteria = FilterCriteria::default();
        assert!(criteria.is_empty());
        assert_eq!(apply(&sample(), &criteria), sample());
    }

    #[test]
    fn test_size_bounds_are_inclusive() {
        let criteria = FilterCriteria {
            min_size: Some(100),
            max_size: Some(1_000),
            ..Default::default()
        };
        assert_eq!(names(&apply(&sample(), &criteria)), ["a.jpg", "c.png", "e.mov"]);
    }

    #[test]
    fn test_date_bounds_are_inclusive() {
        let criteria = FilterCriteria {
            modified_from: Some(Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap()),
            modified_to: Some(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()),
            ..Default::default()
        };
        assert_eq!(names(&apply(&sample(), &criteria)), ["b.mp4", "c.png", "d.gif"]);
    }

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        let criteria = FilterCriteria::default().with_extensions(["JPG", ".Mov", " "]);
        assert_eq!(
            criteria.extensions,
            Some(BTreeSet::from([".jpg".to_string(), ".mov".to_string()]))
        );
        assert_eq!(names(&apply(&sample(), &criteria)), ["a.jpg", "e.mov"]);
    }

    #[test]
    fn test_media_type_filter() {
        let criteria = FilterCriteria::default().with_media_types([MediaCategory::Video]);
        assert_eq!(names(&apply(&sample(), &criteria)), ["b.mp4", "e.mov"]);
    }

    #[test]
    fn test_criteria_compose_with_and() {
        let criteria = FilterCriteria {
            min_size: Some(1_000),
            ..Default::default()
        }
        .with_media_types([MediaCategory::Image]);
        assert_eq!(names(&apply(&sample(), &criteria)), ["c.png"]);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let criteria = FilterCriteria {
            max_size: Some(1_000),
            modified_from: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
            ..Default::default()
        }
        .with_extensions(["png", "gif", "mov"]);
        let once = apply(&sample(), &criteria);
        let twice = apply(&once, &criteria);
        assert_eq!(once, twice);
        assert_eq!(names(&once), ["c.png", "d.gif", "e.mov"]);
    }
}
