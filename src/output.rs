//! Result types returned by a downsizing run.

use crate::error::MediaError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An image whose file name changed because its format changed.
///
/// Both names are basenames: every image lives in the flat `ppt/media`
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenameRecord {
    pub old_name: String,
    pub new_name: String,
}

impl RenameRecord {
    pub fn new(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }
}

/// Outcome for one selected image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaResult {
    /// Basename before conversion.
    pub name: String,
    /// Basename after conversion; equals `name` unless the format changed
    /// or the conversion failed.
    pub new_name: String,
    /// Bytes before conversion.
    pub original_size: u64,
    /// Bytes after conversion (equals `original_size` on failure).
    pub new_size: u64,
    /// `(from, to)` pixel dimensions when the image was downscaled.
    pub resized: Option<((u32, u32), (u32, u32))>,
    /// Set when the image failed under the `continue` policy.
    pub error: Option<MediaError>,
}

impl MediaResult {
    pub fn is_converted(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_renamed(&self) -> bool {
        self.error.is_none() && self.name != self.new_name
    }
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownsizeStats {
    /// Size of the input package in bytes.
    pub input_size: u64,
    /// Size of the written package in bytes.
    pub output_size: u64,
    /// Images found in the media directory.
    pub total_images: usize,
    /// Images that passed the selection filters.
    pub selected_images: usize,
    /// Selected images that were re-encoded successfully.
    pub converted_images: usize,
    /// Selected images that failed under the `continue` policy.
    pub failed_images: usize,
    /// Relationship files examined.
    pub rels_scanned: usize,
    /// Relationship files that were rewritten.
    pub rels_rewritten: usize,
    /// Wall-clock time of the conversion stage.
    pub convert_duration_ms: u64,
    /// Wall-clock time of the whole run.
    pub total_duration_ms: u64,
}

impl DownsizeStats {
    /// Output size as a fraction of the input size (`0.25` = a quarter).
    pub fn ratio(&self) -> f64 {
        if self.input_size == 0 {
            return 1.0;
        }
        self.output_size as f64 / self.input_size as f64
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownsizeReport {
    /// Path of the written package.
    pub output_path: PathBuf,
    /// Per-image results in media-directory order.
    pub media: Vec<MediaResult>,
    /// File renames applied to the package.
    pub renames: Vec<RenameRecord>,
    pub stats: DownsizeStats,
}

/// One image found by [`crate::inspect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub name: String,
    pub size: u64,
    pub dimensions: Option<(u32, u32)>,
}

/// Package summary produced by [`crate::inspect`] without modifying anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSummary {
    pub path: PathBuf,
    pub size: u64,
    /// Zip entries in the package.
    pub entry_count: usize,
    pub media: Vec<MediaInfo>,
    /// Relationship descriptors (`*.xml.rels`) in the package.
    pub rels_count: usize,
}

impl PackageSummary {
    pub fn media_bytes(&self) -> u64 {
        self.media.iter().map(|m| m.size).sum()
    }
}
