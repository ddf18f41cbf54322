//! The packaging driver: the entry points that run a whole package through
//! the pipeline.
//!
//! A run moves through `extract → select → convert → relink → pack` in
//! strict sequence; only the conversion stage fans out. The extracted
//! workspace is a [`tempfile::TempDir`] owned by [`downsize`], so it is
//! removed on every exit path, errors and panics included.
//!
//! The output archive is built in a [`tempfile::NamedTempFile`] next to the
//! destination and moved into place only once it is complete. Under
//! [`ExistingOutput::Abort`] the move is `persist_noclobber`, so a file that
//! appeared at the destination while the run was busy is not replaced.

use crate::config::{ArchiveCompression, DownsizeConfig, ExistingOutput};
use crate::error::DownsizeError;
use crate::output::{DownsizeReport, DownsizeStats, PackageSummary};
use crate::pipeline::archive::{self, MEDIA_DIR};
use crate::pipeline::convert::{self, ConversionPlan};
use crate::pipeline::{content_types, input, relink, select};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

/// Downsize the images of a presentation package and write a new package.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input`  — Path to a `.pptx` (or any OOXML zip with `ppt/media`)
/// * `config` — Downsizing configuration
///
/// # Returns
/// `Ok(DownsizeReport)` once the output package is written. Under
/// [`crate::OnError::Continue`] this includes runs where some images
/// failed; check `report.stats.failed_images`.
///
/// # Errors
/// Returns `Err(DownsizeError)` for fatal errors only:
/// - input missing, unreadable or not a zip
/// - output already exists under [`ExistingOutput::Abort`]
/// - an image failed under [`crate::OnError::Raise`]
/// - the archive could not be read or written
pub async fn downsize(
    input: impl AsRef<Path>,
    config: &DownsizeConfig,
) -> Result<DownsizeReport, DownsizeError> {
    let total_start = Instant::now();
    let input = input.as_ref();
    info!("Starting downsize: {}", input.display());

    // ── Step 1: Resolve input and output ─────────────────────────────────
    let input_path = input::resolve_input(input)?;
    let output_path = input::output_path(&config.output_name_format, &input_path);
    if config.existing_output == ExistingOutput::Abort && output_path.exists() {
        return Err(DownsizeError::OutputExists { path: output_path });
    }
    let input_size = std::fs::metadata(&input_path)
        .map_err(|e| DownsizeError::io(&input_path, e))?
        .len();
    debug!("Output will be written to {}", output_path.display());

    // ── Step 2: Extract ──────────────────────────────────────────────────
    let workspace = TempDir::new().map_err(|e| DownsizeError::io(std::env::temp_dir(), e))?;
    let ws = workspace.path().to_path_buf();
    let entry_order = {
        let (src, dest) = (input_path.clone(), ws.clone());
        blocking(move || archive::extract(&src, &dest)).await?
    };

    // ── Step 3: Discover and select ──────────────────────────────────────
    let (total_images, plans) = {
        let (ws, config) = (ws.clone(), config.clone());
        blocking(move || plan_run(&ws, &config)).await?
    };
    let selected = plans.len();
    info!("Selected {} of {} images for conversion", selected, total_images);
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(selected, total_images);
    }

    // ── Step 4: Convert ──────────────────────────────────────────────────
    let convert_start = Instant::now();
    let outcome = convert::convert_all(plans, config).await?;
    let convert_duration_ms = convert_start.elapsed().as_millis() as u64;
    let converted = outcome.results.iter().filter(|r| r.is_converted()).count();
    let failed = outcome.results.len() - converted;

    // ── Step 5: Declare new extensions, rewrite relationships ────────────
    let relinked = {
        let (ws, renames) = (ws.clone(), outcome.renames.clone());
        blocking(move || {
            content_types::register_extensions(&ws, &renames)?;
            let files = relink::find_relationship_files(&ws)?;
            relink::rewrite_relationship_files(&files, &renames)
        })
        .await?
    };

    if let Some(cb) = config.progress_callback.clone() {
        let ws = ws.clone();
        tokio::task::spawn_blocking(move || cb.on_before_pack(&ws))
            .await
            .map_err(|e| DownsizeError::Internal(format!("before-pack callback panicked: {}", e)))?;
    }

    // ── Step 6: Pack and persist ─────────────────────────────────────────
    let order = archive::apply_renames(&entry_order, &outcome.renames);
    let output_size = {
        let (ws, out, compression, policy) = (
            ws.clone(),
            output_path.clone(),
            config.compression,
            config.existing_output,
        );
        blocking(move || write_archive(&ws, &out, &order, compression, policy)).await?
    };
    drop(workspace);

    // ── Step 7: Report ───────────────────────────────────────────────────
    let stats = DownsizeStats {
        input_size,
        output_size,
        total_images,
        selected_images: selected,
        converted_images: converted,
        failed_images: failed,
        rels_scanned: relinked.scanned,
        rels_rewritten: relinked.rewritten,
        convert_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    if config.verbosity > 0 {
        info!(
            "Downsized {} images; new file {} is {:.0}% of the original ({} kb → {} kb)",
            converted,
            output_path.display(),
            stats.ratio() * 100.0,
            input_size / 1024,
            output_size / 1024
        );
    }
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(selected, converted);
    }

    Ok(DownsizeReport {
        output_path,
        media: outcome.results,
        renames: outcome.renames,
        stats,
    })
}

/// Synchronous wrapper around [`downsize`].
///
/// Creates a temporary tokio runtime internally.
pub fn downsize_sync(
    input: impl AsRef<Path>,
    config: &DownsizeConfig,
) -> Result<DownsizeReport, DownsizeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DownsizeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(downsize(input, config))
}

/// List the images of a package without modifying anything.
pub async fn inspect(input: impl AsRef<Path>) -> Result<PackageSummary, DownsizeError> {
    let path = input::resolve_input(input.as_ref())?;
    blocking(move || archive::summarize(&path)).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Run blocking pipeline work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, DownsizeError>
where
    F: FnOnce() -> Result<T, DownsizeError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DownsizeError::Internal(format!("Blocking task panicked: {}", e)))?
}

/// Snapshot the media directory and plan every conversion.
///
/// Returns the number of images found alongside the plans.
fn plan_run(
    workspace: &Path,
    config: &DownsizeConfig,
) -> Result<(usize, Vec<ConversionPlan>), DownsizeError> {
    let media = select::discover_media(workspace)?;
    for entry in media.iter().filter(|e| !select::should_convert(e, config)) {
        debug!("Skipping {} ({} kb)", entry.name, entry.size / 1024);
    }
    let selected = select::select(&media, config);
    if selected.is_empty() {
        return Ok((media.len(), Vec::new()));
    }
    let existing = convert::existing_names(&workspace.join(MEDIA_DIR))?;
    let plans = convert::plan_conversions(&selected, &existing, config);
    Ok((media.len(), plans))
}

/// Build the archive beside `output` and move it into place.
///
/// Returns the size of the written file.
fn write_archive(
    workspace: &Path,
    output: &Path,
    order: &[String],
    compression: ArchiveCompression,
    policy: ExistingOutput,
) -> Result<u64, DownsizeError> {
    let write_failed = |source: std::io::Error| DownsizeError::OutputWriteFailed {
        path: output.to_path_buf(),
        source,
    };

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_failed)?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(write_failed)?;
    archive::pack(workspace, tmp.as_file_mut(), order, compression)?;

    let persisted = match policy {
        ExistingOutput::Abort => tmp.persist_noclobber(output),
        ExistingOutput::Overwrite => tmp.persist(output),
    };
    let file = persisted.map_err(|e| {
        if policy == ExistingOutput::Abort && e.error.kind() == std::io::ErrorKind::AlreadyExists {
            DownsizeError::OutputExists {
                path: output.to_path_buf(),
            }
        } else {
            write_failed(e.error)
        }
    })?;

    let size = file.metadata().map_err(write_failed)?.len();
    info!("Wrote {} ({} kb)", output.display(), size / 1024);
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OnError;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn bmp_bytes(w: u32, h: u32) -> Vec<u8> {
        let mut out = Vec::new();
        image::DynamicImage::new_rgb8(w, h)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Bmp)
            .unwrap();
        out
    }

    fn write_deck(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let mut zip = ZipWriter::new(std::fs::File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn plan_run_counts_everything_but_plans_selected() {
        let ws = TempDir::new().unwrap();
        let media = ws.path().join(MEDIA_DIR);
        std::fs::create_dir_all(&media).unwrap();
        std::fs::write(media.join("image1.bmp"), bmp_bytes(4, 4)).unwrap();
        std::fs::write(media.join("image2.bmp"), bmp_bytes(4, 4)).unwrap();

        let config = DownsizeConfig::builder()
            .no_size_filter()
            .name_filter("image2*")
            .build()
            .unwrap();
        let (total, plans) = plan_run(ws.path(), &config).unwrap();
        assert_eq!(total, 2);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].target_name, "image2.png");
    }

    #[test]
    fn plan_run_without_media_dir() {
        let ws = TempDir::new().unwrap();
        let (total, plans) = plan_run(ws.path(), &DownsizeConfig::default()).unwrap();
        assert_eq!(total, 0);
        assert!(plans.is_empty());
    }

    #[test]
    fn write_archive_noclobber_reports_exists() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("a.xml"), b"<a/>").unwrap();
        let out_dir = TempDir::new().unwrap();
        let out = out_dir.path().join("deck.downsized.pptx");
        std::fs::write(&out, b"keep me").unwrap();

        let err =
            write_archive(ws.path(), &out, &[], Default::default(), ExistingOutput::Abort).unwrap_err();
        assert!(matches!(err, DownsizeError::OutputExists { .. }), "got: {err:?}");
        assert_eq!(std::fs::read(&out).unwrap(), b"keep me");

        let size =
            write_archive(ws.path(), &out, &[], Default::default(), ExistingOutput::Overwrite).unwrap();
        assert_eq!(std::fs::metadata(&out).unwrap().len(), size);
        assert_eq!(&std::fs::read(&out).unwrap()[..4], b"PK\x03\x04");
    }

    #[tokio::test]
    async fn downsize_small_deck() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("deck.pptx");
        write_deck(
            &input,
            &[
                ("[Content_Types].xml", b"<Types></Types>".to_vec()),
                (
                    "ppt/slides/_rels/slide1.xml.rels",
                    b"<Relationships>\n<Relationship Target=\"../media/image1.bmp\"/>\n</Relationships>"
                        .to_vec(),
                ),
                ("ppt/media/image1.bmp", bmp_bytes(64, 32)),
            ],
        );

        let config = DownsizeConfig::builder()
            .no_size_filter()
            .on_error(OnError::Raise)
            .build()
            .unwrap();
        let report = downsize(&input, &config).await.unwrap();

        assert_eq!(report.output_path, dir.path().join("deck.downsized.pptx"));
        assert!(report.output_path.is_file());
        assert_eq!(report.stats.total_images, 1);
        assert_eq!(report.stats.converted_images, 1);
        assert_eq!(report.stats.rels_rewritten, 1);
        assert_eq!(report.renames.len(), 1);
        assert_eq!(report.renames[0].new_name, "image1.png");
    }

    #[tokio::test]
    async fn downsize_refuses_existing_output_before_work() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("deck.pptx");
        write_deck(&input, &[("[Content_Types].xml", b"<Types></Types>".to_vec())]);
        let existing = dir.path().join("deck.downsized.pptx");
        std::fs::write(&existing, b"old").unwrap();

        let err = downsize(&input, &DownsizeConfig::default()).await.unwrap_err();
        assert!(matches!(err, DownsizeError::OutputExists { .. }), "got: {err:?}");
        assert_eq!(std::fs::read(&existing).unwrap(), b"old");
    }

    #[test]
    fn downsize_sync_reports_missing_input() {
        let err = downsize_sync("/definitely/not/here.pptx", &DownsizeConfig::default()).unwrap_err();
        assert!(matches!(err, DownsizeError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn inspect_reads_without_writing() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("deck.pptx");
        write_deck(
            &input,
            &[
                ("[Content_Types].xml", b"<Types></Types>".to_vec()),
                ("ppt/media/image1.bmp", bmp_bytes(20, 10)),
            ],
        );
        let summary = inspect(&input).await.unwrap();
        assert_eq!(summary.entry_count, 2);
        assert_eq!(summary.media.len(), 1);
        assert_eq!(summary.media[0].dimensions, Some((20, 10)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
