/*!
 * Utility functions for media-sampler
 */

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;

static SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(b|kb?|mb?|gb?|tb?)?\s*$").expect("valid size regex")
});

/// Format a human-readable file size
pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if size >= TB {
        format!("{:.2} TB", size as f64 / TB as f64)
    } else if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

/// Parse a size such as `500KB`, `1.5GB` or `1024` into bytes.
///
/// Units are 1024-based and case-insensitive; a bare number is bytes.
pub fn parse_size(input: &str) -> Result<u64> {
    let Some(caps) = SIZE_PATTERN.captures(input) else {
        crate::bail!(InvalidArgument, "invalid size '{}'", input);
    };

    let number: f64 = caps[1]
        .parse()
        .map_err(|_| crate::error!(InvalidArgument, "invalid size '{}'", input))?;

    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_uppercase())
        .unwrap_or_default();
    let multiplier: u64 = match unit.trim_end_matches('B') {
        "" => 1,
        "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        "T" => 1024 * 1024 * 1024 * 1024,
        _ => crate::bail!(InvalidArgument, "unknown size unit in '{}'", input),
    };

    Ok((number * multiplier as f64) as u64)
}

/// Parse a `YYYY-MM-DD` date as the first instant of that day in local time
pub fn parse_date_start(input: &str) -> Result<DateTime<Utc>> {
    let date = parse_date(input)?;
    let start = NaiveTime::from_hms_opt(0, 0, 0)
        .ok_or_else(|| crate::error!(Unexpected, "invalid start-of-day time"))?;
    local_to_utc(date, start, input)
}

/// Parse a `YYYY-MM-DD` date as the last instant of that day in local time
pub fn parse_date_end(input: &str) -> Result<DateTime<Utc>> {
    let date = parse_date(input)?;
    let end = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
        .ok_or_else(|| crate::error!(Unexpected, "invalid end-of-day time"))?;
    local_to_utc(date, end, input)
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|e| {
        crate::error!(InvalidArgument, "invalid date '{}' (expected YYYY-MM-DD): {}", input, e)
    })
}

fn local_to_utc(date: NaiveDate, time: NaiveTime, input: &str) -> Result<DateTime<Utc>> {
    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| crate::error!(InvalidArgument, "date '{}' does not exist locally", input))
}

/// Turn an absolute path into something usable as a single file name
pub fn sanitize_path(path: &Path) -> String {
    path.to_string_lossy().replace(
        |c: char| !c.is_alphanumeric() && c != '_' && c != '-' && c != '.',
        "_",
    )
}

/// Write `data` to `path` so that readers see either the old or the new
/// content, never a torn write.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path_for(path);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}
