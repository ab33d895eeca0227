/*!
 * Recognized media extensions
 */

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;

use crate::types::MediaCategory;

/// Extensions recognized out of the box, with their category
pub static DEFAULT_MEDIA_EXTENSIONS: Lazy<Vec<(&'static str, MediaCategory)>> = Lazy::new(|| {
    vec![
        // Images
        (".jpg", MediaCategory::Image),
        (".jpeg", MediaCategory::Image),
        (".png", MediaCategory::Image),
        (".bmp", MediaCategory::Image),
        (".tiff", MediaCategory::Image),
        (".webp", MediaCategory::Image),
        // Videos
        (".mp4", MediaCategory::Video),
        (".mov", MediaCategory::Video),
        (".avi", MediaCategory::Video),
        (".mkv", MediaCategory::Video),
        (".webm", MediaCategory::Video),
        (".m4v", MediaCategory::Video),
        (".flv", MediaCategory::Video),
        // Everything else we still pick up
        (".gif", MediaCategory::Other),
        (".svg", MediaCategory::Other),
        (".ico", MediaCategory::Other),
        (".heic", MediaCategory::Other),
        (".heif", MediaCategory::Other),
    ]
});

/// Lookup table from extension to media category
#[derive(Debug, Clone)]
pub struct MediaTable {
    categories: HashMap<String, MediaCategory>,
}

impl Default for MediaTable {
    fn default() -> Self {
        Self::new(DEFAULT_MEDIA_EXTENSIONS.iter().copied())
    }
}

impl MediaTable {
    /// Build a table from `(extension, category)` pairs
    pub fn new<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, MediaCategory)>,
    {
        let categories = entries
            .into_iter()
            .map(|(ext, category)| (normalize_extension(ext), category))
            .collect();
        Self { categories }
    }

    /// Category for an extension, if recognized
    pub fn category(&self, extension: &str) -> Option<MediaCategory> {
        self.categories.get(&normalize_extension(extension)).copied()
    }

    /// Normalized extension and category for a path, if recognized
    pub fn classify(&self, path: &Path) -> Option<(String, MediaCategory)> {
        let ext = path.extension()?.to_str()?;
        let ext = normalize_extension(ext);
        let category = self.categories.get(&ext).copied()?;
        Some((ext, category))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Lower-case an extension and make sure it carries a leading dot
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}
