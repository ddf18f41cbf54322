//! Media discovery and the selection filter.
//!
//! Discovery snapshots `ppt/media/image*` into an owned, name-sorted list
//! before any file is touched, so later renames and deletions never run
//! against a live directory iterator. The sort only makes runs repeatable;
//! nothing depends on the order semantically.

use crate::config::DownsizeConfig;
use crate::error::DownsizeError;
use crate::pipeline::archive::MEDIA_DIR;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One embedded image inside the extracted workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub path: PathBuf,
    /// Basename, e.g. `image3.png`.
    pub name: String,
    /// Size on disk in bytes.
    pub size: u64,
    /// `(width, height)` when the header could be read; `None` for vector
    /// formats such as EMF and for damaged files.
    pub dimensions: Option<(u32, u32)>,
    /// Extension without the dot, as found on disk (case preserved).
    pub extension: String,
}

impl MediaEntry {
    pub fn from_path(path: &Path) -> Result<Self, DownsizeError> {
        let meta = std::fs::metadata(path).map_err(|e| DownsizeError::io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: meta.len(),
            dimensions: image::image_dimensions(path).ok(),
            extension,
        })
    }

    /// `true` for `.jpg` / `.jpeg` sources, which keep their format.
    pub fn is_jpeg(&self) -> bool {
        matches!(self.extension.to_ascii_lowercase().as_str(), "jpg" | "jpeg")
    }
}

/// Snapshot every `image*` file of the media directory, sorted by name.
pub fn discover_media(workspace: &Path) -> Result<Vec<MediaEntry>, DownsizeError> {
    let media_dir = workspace.join(MEDIA_DIR);
    if !media_dir.is_dir() {
        debug!("No media directory in package");
        return Ok(Vec::new());
    }
    let pattern = format!(
        "{}/image*",
        Pattern::escape(&media_dir.to_string_lossy())
    );
    let paths = glob::glob(&pattern)
        .map_err(|e| DownsizeError::Internal(format!("media glob '{}': {}", pattern, e)))?;

    let mut entries = Vec::new();
    for path in paths {
        let path = path.map_err(|e| {
            let p = e.path().to_path_buf();
            DownsizeError::io(p, e.into())
        })?;
        if path.is_file() {
            entries.push(MediaEntry::from_path(&path)?);
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("Found {} media files", entries.len());
    Ok(entries)
}

/// Decide whether `entry` should be converted.
///
/// `(size_filter unset OR size > size_filter) AND (name_filter unset OR name matches)`.
pub fn should_convert(entry: &MediaEntry, config: &DownsizeConfig) -> bool {
    let size_ok = config.size_filter.is_none_or(|limit| entry.size > limit);
    let name_ok = config
        .name_filter
        .as_ref()
        .is_none_or(|pattern| pattern.matches(&entry.name));
    size_ok && name_ok
}

/// Entries that pass [`should_convert`], in input order.
pub fn select<'a>(entries: &'a [MediaEntry], config: &DownsizeConfig) -> Vec<&'a MediaEntry> {
    entries.iter().filter(|e| should_convert(e, config)).collect()
}
