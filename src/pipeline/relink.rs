//! Relationship rewriting: point `*.xml.rels` entries at renamed images.
//!
//! A relationship file is only rewritten when it mentions at least one old
//! image name. Untouched files keep their exact bytes, line endings
//! included. Rewritten files always end up with CRLF line endings, which
//! PowerPoint requires on every platform.
//!
//! Replacement targets the quoted relative path `"../media/<name>"` rather
//! than the bare name, so external links or unrelated attributes that
//! happen to contain the same characters are left alone.

use crate::error::DownsizeError;
use crate::output::RenameRecord;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Counts reported by [`rewrite_relationship_files`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelinkSummary {
    pub scanned: usize,
    pub rewritten: usize,
    pub substitutions: usize,
}

/// Every `*.xml.rels` file below `workspace`, sorted.
pub fn find_relationship_files(workspace: &Path) -> Result<Vec<PathBuf>, DownsizeError> {
    let pattern = format!(
        "{}/**/*.xml.rels",
        Pattern::escape(&workspace.to_string_lossy())
    );
    let paths = glob::glob(&pattern)
        .map_err(|e| DownsizeError::Internal(format!("rels glob '{}': {}", pattern, e)))?;
    let mut files = Vec::new();
    for path in paths {
        let path = path.map_err(|e| {
            let p = e.path().to_path_buf();
            DownsizeError::io(p, e.into())
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Convert every line ending to CRLF.
pub fn to_crlf(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n")
}

/// Rewrite `text` for `renames`.
///
/// Returns `None` when no old name occurs in `text`, otherwise the
/// CRLF-normalised text with every quoted media path replaced and the
/// number of substitutions made.
pub fn rewrite_links(text: &str, renames: &[RenameRecord]) -> Option<(String, usize)> {
    if !renames.iter().any(|r| text.contains(&r.old_name)) {
        return None;
    }
    let mut out = to_crlf(text);
    let mut count = 0;
    for r in renames {
        let old = format!("\"../media/{}\"", r.old_name);
        let hits = out.matches(&old).count();
        if hits > 0 {
            let new = format!("\"../media/{}\"", r.new_name);
            out = out.replace(&old, &new);
            count += hits;
        }
    }
    Some((out, count))
}

/// Apply [`rewrite_links`] to each file in place.
pub fn rewrite_relationship_files(
    files: &[PathBuf],
    renames: &[RenameRecord],
) -> Result<RelinkSummary, DownsizeError> {
    let mut summary = RelinkSummary {
        scanned: files.len(),
        ..Default::default()
    };
    if renames.is_empty() {
        return Ok(summary);
    }

    for path in files {
        let bytes = std::fs::read(path).map_err(|e| DownsizeError::io(path, e))?;
        let Ok(text) = std::str::from_utf8(&bytes) else {
            warn!("Skipping non-UTF-8 relationship file {}", path.display());
            continue;
        };
        if let Some((rewritten, count)) = rewrite_links(text, renames) {
            std::fs::write(path, rewritten).map_err(|e| DownsizeError::io(path, e))?;
            debug!(" - Performed {} substitutions in file {}", count, path.display());
            summary.rewritten += 1;
            summary.substitutions += count;
        }
    }

    info!(
        "Made changes to {} of {} xml relationship files",
        summary.rewritten, summary.scanned
    );
    Ok(summary)
}
