//! Input and output path resolution.
//!
//! The input is validated before anything is extracted: a missing or
//! unreadable file, or one that does not start with the zip local-header
//! magic (`PK\x03\x04`), is rejected with a specific error instead of a
//! generic archive failure later on.

use crate::error::DownsizeError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

const PLACEHOLDERS: [&str; 2] = ["{filename}", "{fnroot}"];

/// Validate a local package path: it must exist, be readable and look like a zip.
pub fn resolve_input(path: &Path) -> Result<PathBuf, DownsizeError> {
    if !path.is_file() {
        return Err(DownsizeError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != ZIP_MAGIC {
                return Err(DownsizeError::NotAZip {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DownsizeError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(DownsizeError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved input package: {}", path.display());
    Ok(path.to_path_buf())
}

/// Reject output name formats with placeholders other than `{filename}` and `{fnroot}`.
pub fn validate_output_name_format(fmt: &str) -> Result<(), DownsizeError> {
    let mut rest = fmt.to_string();
    for p in PLACEHOLDERS {
        rest = rest.replace(p, "");
    }
    if let Some(start) = rest.find('{') {
        let end = rest[start..].find('}').map(|i| start + i + 1).unwrap_or(rest.len());
        return Err(DownsizeError::InvalidConfig(format!(
            "Unknown placeholder '{}' in output name format '{}' (use {{filename}} or {{fnroot}})",
            &rest[start..end],
            fmt
        )));
    }
    if rest.contains('}') {
        return Err(DownsizeError::InvalidConfig(format!(
            "Unbalanced '}}' in output name format '{}'",
            fmt
        )));
    }
    if rest.trim().is_empty() && !fmt.contains("{fnroot}") && !fmt.contains("{filename}") {
        return Err(DownsizeError::InvalidConfig(
            "Output name format is empty".into(),
        ));
    }
    Ok(())
}

/// Render the output path for `input`.
///
/// `{filename}` is the input path as given, `{fnroot}` the same path without
/// its extension.
pub fn output_path(fmt: &str, input: &Path) -> PathBuf {
    let filename = input.to_string_lossy();
    let fnroot = input.with_extension("");
    let fnroot = fnroot.to_string_lossy();
    PathBuf::from(
        fmt.replace("{filename}", &filename)
            .replace("{fnroot}", &fnroot),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_format_inserts_suffix_before_extension() {
        let out = output_path("{fnroot}.downsized.pptx", Path::new("talks/deck.pptx"));
        assert_eq!(out, PathBuf::from("talks/deck.downsized.pptx"));
    }

    #[test]
    fn filename_placeholder_keeps_extension() {
        let out = output_path("{filename}.small.pptx", Path::new("deck.pptx"));
        assert_eq!(out, PathBuf::from("deck.pptx.small.pptx"));
    }

    #[test]
    fn validate_accepts_known_placeholders() {
        assert!(validate_output_name_format("{fnroot}.downsized.pptx").is_ok());
        assert!(validate_output_name_format("{filename}-{fnroot}.pptx").is_ok());
        assert!(validate_output_name_format("out/fixed.pptx").is_ok());
    }

    #[test]
    fn validate_rejects_unknown_placeholder() {
        let err = validate_output_name_format("{root}.pptx").unwrap_err();
        assert!(err.to_string().contains("{root}"), "got: {err}");
        assert!(validate_output_name_format("{fnroot}}.pptx").is_err());
        assert!(validate_output_name_format("").is_err());
    }

    #[test]
    fn missing_input_is_not_found() {
        let err = resolve_input(Path::new("/definitely/not/here.pptx")).unwrap_err();
        assert!(matches!(err, DownsizeError::InputNotFound { .. }));
    }

    #[test]
    fn non_zip_input_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7 not a deck").unwrap();
        let err = resolve_input(f.path()).unwrap_err();
        assert!(matches!(err, DownsizeError::NotAZip { .. }), "got: {err:?}");
    }

    #[test]
    fn zip_magic_is_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04rest-of-archive").unwrap();
        assert_eq!(resolve_input(f.path()).unwrap(), f.path());
    }
}
