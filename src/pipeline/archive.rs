//! Zip container extraction and repacking.
//!
//! Extraction records the entry order of the source package. Repacking
//! writes entries back in that order (with renamed media substituted in
//! place), so `[Content_Types].xml` stays the first entry as Office
//! expects. Files that were not in the source are appended in sorted
//! order. Directory entries are not written back.

use crate::config::ArchiveCompression;
use crate::error::DownsizeError;
use crate::output::{MediaInfo, PackageSummary, RenameRecord};
use image::ImageReader;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Directory inside the package holding every embedded image.
pub const MEDIA_DIR: &str = "ppt/media";

/// Bytes read from each image by [`summarize`] to find its dimensions.
const HEADER_BYTES: u64 = 64 * 1024;

fn corrupt(path: &Path, detail: impl ToString) -> DownsizeError {
    DownsizeError::ArchiveCorrupt {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

impl From<ArchiveCompression> for CompressionMethod {
    fn from(c: ArchiveCompression) -> Self {
        match c {
            ArchiveCompression::Stored => CompressionMethod::Stored,
            ArchiveCompression::Deflated => CompressionMethod::Deflated,
            ArchiveCompression::Bzip2 => CompressionMethod::Bzip2,
            ArchiveCompression::Zstd => CompressionMethod::Zstd,
        }
    }
}

/// Extract every file of `archive_path` below `dest`.
///
/// Returns the entry names (zip-style, `/`-separated) in archive order.
/// Entries whose names escape `dest` are skipped with a warning.
pub fn extract(archive_path: &Path, dest: &Path) -> Result<Vec<String>, DownsizeError> {
    let file = File::open(archive_path).map_err(|e| DownsizeError::io(archive_path, e))?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(archive_path, e))?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(archive_path, e))?;
        let name = entry.name().to_string();
        let Some(rel) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {:?}", name);
            continue;
        };
        let target = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| DownsizeError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DownsizeError::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| DownsizeError::io(&target, e))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| corrupt(archive_path, format!("entry '{}': {}", name, e)))?;
        names.push(name);
    }

    info!(
        "Extracted {} entries from {} to {}",
        names.len(),
        archive_path.display(),
        dest.display()
    );
    Ok(names)
}

/// Substitute renamed media entries in an extracted entry list, keeping their slot.
pub fn apply_renames(names: &[String], renames: &[RenameRecord]) -> Vec<String> {
    let by_old: HashMap<String, String> = renames
        .iter()
        .map(|r| {
            (
                format!("{}/{}", MEDIA_DIR, r.old_name),
                format!("{}/{}", MEDIA_DIR, r.new_name),
            )
        })
        .collect();
    names
        .iter()
        .map(|n| by_old.get(n).cloned().unwrap_or_else(|| n.clone()))
        .collect()
}

/// Zip-style name of `path` relative to `root`.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Write every file below `root` into a new zip on `writer`.
///
/// Files listed in `order` come first, in that order; names in `order`
/// that no longer exist are ignored. Returns the number of entries written.
pub fn pack<W: Write + Seek>(
    root: &Path,
    writer: W,
    order: &[String],
    compression: ArchiveCompression,
) -> Result<usize, DownsizeError> {
    let mut on_disk: HashMap<String, PathBuf> = HashMap::new();
    let mut sorted: Vec<String> = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            DownsizeError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry_name(root, entry.path()) {
            sorted.push(name.clone());
            on_disk.insert(name, entry.into_path());
        }
    }

    let mut written: HashSet<&str> = HashSet::new();
    let mut plan: Vec<&str> = Vec::with_capacity(sorted.len());
    for name in order.iter().chain(sorted.iter()) {
        if on_disk.contains_key(name) && written.insert(name.as_str()) {
            plan.push(name.as_str());
        }
    }

    let options = SimpleFileOptions::default().compression_method(compression.into());
    let mut zip = ZipWriter::new(writer);
    for name in &plan {
        let path = &on_disk[*name];
        let mut src = File::open(path).map_err(|e| DownsizeError::io(path, e))?;
        zip.start_file(*name, options)
            .map_err(|e| DownsizeError::Internal(format!("zip entry '{}': {}", name, e)))?;
        std::io::copy(&mut src, &mut zip).map_err(|e| DownsizeError::io(path, e))?;
        debug!(" - adding {:?}", name);
    }
    zip.finish()
        .map_err(|e| DownsizeError::Internal(format!("finishing zip: {}", e)))?;

    info!("{} files written to archive", plan.len());
    Ok(plan.len())
}

/// Read the central directory of `archive_path` and describe its images
/// without extracting anything to disk.
pub fn summarize(archive_path: &Path) -> Result<PackageSummary, DownsizeError> {
    let size = std::fs::metadata(archive_path)
        .map_err(|e| DownsizeError::io(archive_path, e))?
        .len();
    let file = File::open(archive_path).map_err(|e| DownsizeError::io(archive_path, e))?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(archive_path, e))?;

    let media_prefix = format!("{}/image", MEDIA_DIR);
    let mut media = Vec::new();
    let mut rels_count = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(archive_path, e))?;
        let name = entry.name().to_string();
        if name.ends_with(".xml.rels") {
            rels_count += 1;
            continue;
        }
        if !name.starts_with(&media_prefix) || entry.is_dir() {
            continue;
        }
        let Some((_, basename)) = name.rsplit_once('/') else {
            continue;
        };
        // Sizes in the central directory are untrusted; only the header is read.
        let mut header = Vec::new();
        if let Err(e) = (&mut entry).take(HEADER_BYTES).read_to_end(&mut header) {
            debug!("Short read of {}: {}", name, e);
        }
        let dimensions = ImageReader::new(Cursor::new(&header))
            .with_guessed_format()
            .ok()
            .and_then(|r| r.into_dimensions().ok());
        media.push(MediaInfo {
            name: basename.to_string(),
            size: entry.size(),
            dimensions,
        });
    }
    media.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(PackageSummary {
        path: archive_path.to_path_buf(),
        size,
        entry_count: archive.len(),
        media,
        rels_count,
    })
}
