//! `[Content_Types].xml` maintenance.
//!
//! PowerPoint refuses to open a package containing a part whose extension
//! has no `<Default Extension="…">` declaration. Converting `image1.bmp` to
//! `image1.png` in a deck that had no PNG before would therefore break it.
//! After conversion every newly introduced extension is declared; the file
//! is left untouched when nothing is missing.

use crate::config::TargetFormat;
use crate::error::DownsizeError;
use crate::output::RenameRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

pub const CONTENT_TYPES: &str = "[Content_Types].xml";

static RE_DEFAULT_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<Default\s[^>]*?Extension\s*=\s*"([^"]+)""#).unwrap());

/// `(extension, mime)` pairs introduced by `renames`, deduplicated.
pub fn required_defaults(renames: &[RenameRecord]) -> Vec<(String, &'static str)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for r in renames {
        let Some((_, ext)) = r.new_name.rsplit_once('.') else {
            continue;
        };
        let Some(format) = TargetFormat::from_extension(ext) else {
            continue;
        };
        if seen.insert(ext.to_ascii_lowercase()) {
            out.push((ext.to_string(), format.mime_type()));
        }
    }
    out
}

/// Extensions declared with `<Default Extension=…>`, lowercased.
pub fn declared_extensions(xml: &str) -> HashSet<String> {
    RE_DEFAULT_EXTENSION
        .captures_iter(xml)
        .map(|c| c[1].to_ascii_lowercase())
        .collect()
}

/// Insert missing `<Default>` declarations before `</Types>`.
///
/// Returns `None` when every extension is already declared.
pub fn add_defaults(xml: &str, required: &[(String, &str)]) -> Option<String> {
    let declared = declared_extensions(xml);
    let missing: Vec<_> = required
        .iter()
        .filter(|(ext, _)| !declared.contains(&ext.to_ascii_lowercase()))
        .collect();
    if missing.is_empty() {
        return None;
    }
    let close = xml.rfind("</Types>")?;
    let mut out = String::with_capacity(xml.len() + missing.len() * 64);
    out.push_str(&xml[..close]);
    for (ext, mime) in missing {
        out.push_str(&format!(
            "<Default Extension=\"{}\" ContentType=\"{}\"/>",
            ext, mime
        ));
    }
    out.push_str(&xml[close..]);
    Some(out)
}

/// Declare every extension introduced by `renames` in the workspace's
/// `[Content_Types].xml`. Returns the number of declarations added.
pub fn register_extensions(workspace: &Path, renames: &[RenameRecord]) -> Result<usize, DownsizeError> {
    let required = required_defaults(renames);
    if required.is_empty() {
        return Ok(0);
    }
    let path = workspace.join(CONTENT_TYPES);
    if !path.is_file() {
        warn!("Package has no {}; new image types are not declared", CONTENT_TYPES);
        return Ok(0);
    }
    let xml = std::fs::read_to_string(&path).map_err(|e| DownsizeError::io(&path, e))?;
    let before = declared_extensions(&xml).len();
    let Some(updated) = add_defaults(&xml, &required) else {
        return Ok(0);
    };
    let added = declared_extensions(&updated).len() - before;
    std::fs::write(&path, updated).map_err(|e| DownsizeError::io(&path, e))?;
    info!("Declared {} new image type(s) in {}", added, CONTENT_TYPES);
    Ok(added)
}
