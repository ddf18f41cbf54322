//! The conversion engine: decode, downscale, re-encode and rename each
//! selected image.
//!
//! Work is split in two phases. [`plan_conversions`] runs first and
//! sequentially: it decides every output name up front, so the invariant
//! "no two images end up with the same name" holds before a single byte is
//! written. [`convert_all`] then executes the plans on the blocking pool,
//! `concurrency` at a time, and joins every result before returning. The
//! rename list it returns is complete, which is what the link rewriter
//! needs.
//!
//! JPEG sources are re-encoded as JPEG in place whatever the target format
//! is; they are already compressed photographs and a PNG of them would
//! only grow.

use crate::config::{DownsizeConfig, OnError, TargetFormat};
use crate::error::{DownsizeError, MediaError};
use crate::output::{MediaResult, RenameRecord};
use crate::pipeline::select::MediaEntry;
use crate::pipeline::{encode, transform};
use futures::stream::{self, StreamExt};
use image::ImageReader;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do with one selected image.
#[derive(Debug, Clone)]
pub struct ConversionPlan {
    pub entry: MediaEntry,
    /// Encoding used for the output.
    pub format: TargetFormat,
    /// Output basename; equals `entry.name` for in-place conversions.
    pub target_name: String,
    pub target: PathBuf,
}

impl ConversionPlan {
    pub fn is_rename(&self) -> bool {
        self.target_name != self.entry.name
    }
}

/// Everything the conversion stage produced.
#[derive(Debug, Default)]
pub struct ConversionOutcome {
    /// One result per plan, in plan order.
    pub results: Vec<MediaResult>,
    /// Renames of successfully converted images, in plan order.
    pub renames: Vec<RenameRecord>,
}

/// Basenames currently present in `media_dir`.
pub fn existing_names(media_dir: &Path) -> Result<Vec<String>, DownsizeError> {
    let mut names = Vec::new();
    let dir = std::fs::read_dir(media_dir).map_err(|e| DownsizeError::io(media_dir, e))?;
    for entry in dir {
        let entry = entry.map_err(|e| DownsizeError::io(media_dir, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Decide format and output name for every selected entry.
///
/// `existing` lists the names already in the media directory. A target
/// name that is taken (by an unrelated file or by an earlier plan) gets a
/// `-2`, `-3`, … suffix on its stem. Names are compared case-insensitively
/// because the package may be extracted onto a case-insensitive filesystem.
pub fn plan_conversions(
    selected: &[&MediaEntry],
    existing: &[String],
    config: &DownsizeConfig,
) -> Vec<ConversionPlan> {
    let mut taken: HashSet<String> = existing.iter().map(|n| n.to_ascii_lowercase()).collect();
    let mut plans = Vec::with_capacity(selected.len());

    for entry in selected {
        let entry = (*entry).clone();
        if entry.is_jpeg() {
            debug!("Preserving JPEG image format for {}", entry.name);
            plans.push(ConversionPlan {
                format: TargetFormat::Jpeg,
                target_name: entry.name.clone(),
                target: entry.path.clone(),
                entry,
            });
            continue;
        }

        let format = config.convert_to;
        let stem = entry
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.name.clone());
        let mut target_name = format!("{}.{}", stem, format.extension());

        if target_name.eq_ignore_ascii_case(&entry.name) {
            target_name = entry.name.clone();
        } else {
            let mut n = 2;
            while taken.contains(&target_name.to_ascii_lowercase()) {
                target_name = format!("{}-{}.{}", stem, n, format.extension());
                n += 1;
            }
            if n > 2 {
                warn!(
                    "{} would collide with an existing image; writing {} instead",
                    entry.name, target_name
                );
            }
            taken.insert(target_name.to_ascii_lowercase());
        }

        let target = entry.path.with_file_name(&target_name);
        plans.push(ConversionPlan {
            entry,
            format,
            target_name,
            target,
        });
    }
    plans
}

fn decode(entry: &MediaEntry) -> Result<image::DynamicImage, MediaError> {
    let failed = |detail: String| MediaError::DecodeFailed {
        name: entry.name.clone(),
        detail,
    };
    ImageReader::open(&entry.path)
        .map_err(|e| failed(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| failed(e.to_string()))?
        .decode()
        .map_err(|e| failed(e.to_string()))
}

/// Convert one image according to its plan. Blocking.
///
/// On error the original file is left exactly as it was.
pub fn convert_entry(
    plan: &ConversionPlan,
    config: &DownsizeConfig,
) -> Result<MediaResult, MediaError> {
    let entry = &plan.entry;
    info!("Converting {} ({} kb)...", entry.name, entry.size / 1024);

    let img = decode(entry)?;
    let (img, resized) = transform::downscale(img, config.max_dimension);
    let img = match config.color_mode_for(plan.format) {
        Some(mode) => {
            debug!(" - Changing image mode from {:?} to {:?}", img.color(), mode);
            transform::apply_color_mode(img, mode, config.fill_color)
        }
        None => img,
    };

    let bytes = encode::encode_image(&img, plan.format, config.quality, config.optimize).map_err(
        |e| MediaError::EncodeFailed {
            name: entry.name.clone(),
            format: plan.format.to_string(),
            detail: e.to_string(),
        },
    )?;

    let write_failed = |detail: String| MediaError::WriteFailed {
        name: entry.name.clone(),
        detail,
    };
    std::fs::write(&plan.target, &bytes).map_err(|e| write_failed(e.to_string()))?;
    if plan.is_rename() {
        if let Err(e) = std::fs::remove_file(&entry.path) {
            let _ = std::fs::remove_file(&plan.target);
            return Err(write_failed(format!("removing original: {}", e)));
        }
        debug!(" - Deleted: {}", entry.name);
    }

    let new_size = bytes.len() as u64;
    info!(" - Saved: {} ({} kb)", plan.target_name, new_size / 1024);
    if let Some(limit) = config.size_filter {
        if new_size > limit {
            info!(
                " - Notice: {} kb is still above the size limit ({} kb)",
                new_size / 1024,
                limit / 1024
            );
        }
    }

    Ok(MediaResult {
        name: entry.name.clone(),
        new_name: plan.target_name.clone(),
        original_size: entry.size,
        new_size,
        resized,
        error: None,
    })
}

fn convert_reporting(plan: &ConversionPlan, config: &DownsizeConfig) -> Result<MediaResult, MediaError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_image_start(&plan.entry.name);
    }
    let result = convert_entry(plan, config);
    if let Some(ref cb) = config.progress_callback {
        match &result {
            Ok(r) => cb.on_image_complete(&r.new_name, r.original_size, r.new_size),
            Err(e) if config.on_error == OnError::Continue => {
                cb.on_image_error(&plan.entry.name, &e.to_string())
            }
            Err(_) => {}
        }
    }
    result
}

/// Execute every plan and join the results.
///
/// Under [`OnError::Raise`] the first failure aborts with
/// [`DownsizeError::EncodeFailure`]; under [`OnError::Continue`] the failure
/// is logged and recorded, and the image keeps its original file and name.
pub async fn convert_all(
    plans: Vec<ConversionPlan>,
    config: &DownsizeConfig,
) -> Result<ConversionOutcome, DownsizeError> {
    let shared = Arc::new(config.clone());
    let mut pending = stream::iter(plans.into_iter().enumerate().map(|(idx, plan)| {
        let config = Arc::clone(&shared);
        async move {
            let joined = tokio::task::spawn_blocking(move || {
                let result = convert_reporting(&plan, &config);
                (plan, result)
            })
            .await;
            (idx, joined)
        }
    }))
    .buffer_unordered(config.concurrency.max(1));

    let mut done: Vec<(usize, MediaResult)> = Vec::new();
    while let Some((idx, joined)) = pending.next().await {
        let (plan, result) = joined
            .map_err(|e| DownsizeError::Internal(format!("Conversion task panicked: {}", e)))?;
        match result {
            Ok(r) => done.push((idx, r)),
            Err(e) => match config.on_error {
                OnError::Raise => {
                    return Err(DownsizeError::EncodeFailure {
                        name: plan.entry.name.clone(),
                        source: e,
                    })
                }
                OnError::Continue => {
                    warn!("Error converting image, skipping: {}", e);
                    done.push((
                        idx,
                        MediaResult {
                            name: plan.entry.name.clone(),
                            new_name: plan.entry.name.clone(),
                            original_size: plan.entry.size,
                            new_size: plan.entry.size,
                            resized: None,
                            error: Some(e),
                        },
                    ));
                }
            },
        }
    }

    done.sort_by_key(|(idx, _)| *idx);
    let results: Vec<MediaResult> = done.into_iter().map(|(_, r)| r).collect();
    let renames = results
        .iter()
        .filter(|r| r.is_renamed())
        .map(|r| RenameRecord::new(&r.name, &r.new_name))
        .collect();

    Ok(ConversionOutcome { results, renames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorMode;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, w: u32, h: u32, format: ImageFormat) -> MediaEntry {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255])
        }));
        let path = dir.join(name);
        let img = if format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(img.to_rgb8())
        } else {
            img
        };
        img.save_with_format(&path, format).unwrap();
        MediaEntry::from_path(&path).unwrap()
    }

    fn all_config() -> DownsizeConfig {
        DownsizeConfig::builder().no_size_filter().build().unwrap()
    }

    #[test]
    fn plan_renames_on_format_change() {
        let dir = TempDir::new().unwrap();
        let bmp = write_image(dir.path(), "image1.bmp", 4, 4, ImageFormat::Bmp);
        let plans = plan_conversions(&[&bmp], &["image1.bmp".into()], &all_config());
        assert_eq!(plans[0].target_name, "image1.png");
        assert!(plans[0].is_rename());
    }

    #[test]
    fn plan_keeps_jpeg_in_place() {
        let dir = TempDir::new().unwrap();
        let jpg = write_image(dir.path(), "image2.jpg", 4, 4, ImageFormat::Jpeg);
        let plans = plan_conversions(&[&jpg], &["image2.jpg".into()], &all_config());
        assert_eq!(plans[0].format, TargetFormat::Jpeg);
        assert_eq!(plans[0].target, jpg.path);
        assert!(!plans[0].is_rename());
    }

    #[test]
    fn plan_disambiguates_collisions() {
        let dir = TempDir::new().unwrap();
        let bmp = write_image(dir.path(), "image1.bmp", 4, 4, ImageFormat::Bmp);
        let tif = write_image(dir.path(), "image1.tiff", 4, 4, ImageFormat::Tiff);
        let existing = vec!["image1.bmp".to_string(), "image1.tiff".to_string()];
        let plans = plan_conversions(&[&bmp, &tif], &existing, &all_config());
        assert_eq!(plans[0].target_name, "image1.png");
        assert_eq!(plans[1].target_name, "image1-2.png");
    }

    #[test]
    fn plan_avoids_unselected_existing_file() {
        let dir = TempDir::new().unwrap();
        let bmp = write_image(dir.path(), "image3.bmp", 4, 4, ImageFormat::Bmp);
        let existing = vec!["image3.bmp".to_string(), "IMAGE3.PNG".to_string()];
        let plans = plan_conversions(&[&bmp], &existing, &all_config());
        assert_eq!(plans[0].target_name, "image3-2.png");
    }

    #[test]
    fn plan_case_only_difference_stays_in_place() {
        let dir = TempDir::new().unwrap();
        let png = write_image(dir.path(), "image5.PNG", 4, 4, ImageFormat::Png);
        let plans = plan_conversions(&[&png], &["image5.PNG".into()], &all_config());
        assert_eq!(plans[0].target_name, "image5.PNG");
        assert!(!plans[0].is_rename());
    }

    #[test]
    fn convert_entry_resizes_and_renames() {
        let dir = TempDir::new().unwrap();
        let bmp = write_image(dir.path(), "image1.bmp", 600, 400, ImageFormat::Bmp);
        let config = DownsizeConfig::builder()
            .no_size_filter()
            .max_dimension(300)
            .build()
            .unwrap();
        let plans = plan_conversions(&[&bmp], &["image1.bmp".into()], &config);

        let result = convert_entry(&plans[0], &config).unwrap();
        assert_eq!(result.new_name, "image1.png");
        assert_eq!(result.resized, Some(((600, 400), (200, 133))));
        assert!(!bmp.path.exists());
        let out = image::open(dir.path().join("image1.png")).unwrap();
        assert_eq!((out.width(), out.height()), (200, 133));
    }

    #[test]
    fn convert_entry_failure_leaves_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image9.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let entry = MediaEntry::from_path(&path).unwrap();
        let config = all_config();
        let plans = plan_conversions(&[&entry], &["image9.png".into()], &config);

        let err = convert_entry(&plans[0], &config).unwrap_err();
        assert!(matches!(err, MediaError::DecodeFailed { .. }), "got: {err:?}");
        assert_eq!(std::fs::read(&path).unwrap(), b"definitely not a png");
    }

    #[test]
    fn jpeg_target_uses_rgb_for_transparent_source() {
        let dir = TempDir::new().unwrap();
        let png = write_image(dir.path(), "image1.png", 16, 16, ImageFormat::Png);
        let config = DownsizeConfig::builder()
            .no_size_filter()
            .convert_to(TargetFormat::Jpeg)
            .build()
            .unwrap();
        assert_eq!(config.color_mode_for(TargetFormat::Jpeg), Some(ColorMode::Rgb));
        let plans = plan_conversions(&[&png], &["image1.png".into()], &config);
        let result = convert_entry(&plans[0], &config).unwrap();
        assert_eq!(result.new_name, "image1.jpeg");
        let bytes = std::fs::read(dir.path().join("image1.jpeg")).unwrap();
        assert_eq!(&bytes[..2], b"\xFF\xD8");
    }

    #[tokio::test]
    async fn convert_all_continue_skips_failures() {
        let dir = TempDir::new().unwrap();
        let good = write_image(dir.path(), "image1.bmp", 8, 8, ImageFormat::Bmp);
        let bad_path = dir.path().join("image2.bmp");
        std::fs::write(&bad_path, b"BM garbage").unwrap();
        let bad = MediaEntry::from_path(&bad_path).unwrap();

        let config = DownsizeConfig::builder()
            .no_size_filter()
            .on_error(OnError::Continue)
            .concurrency(2)
            .build()
            .unwrap();
        let existing = vec!["image1.bmp".to_string(), "image2.bmp".to_string()];
        let plans = plan_conversions(&[&good, &bad], &existing, &config);
        let outcome = convert_all(plans, &config).await.unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].name, "image1.bmp");
        assert!(outcome.results[0].is_converted());
        assert!(!outcome.results[1].is_converted());
        assert_eq!(outcome.renames, vec![RenameRecord::new("image1.bmp", "image1.png")]);
        assert!(bad_path.exists());
    }

    #[tokio::test]
    async fn convert_all_raise_aborts() {
        let dir = TempDir::new().unwrap();
        let bad_path = dir.path().join("image2.bmp");
        std::fs::write(&bad_path, b"BM garbage").unwrap();
        let bad = MediaEntry::from_path(&bad_path).unwrap();

        let config = all_config();
        let plans = plan_conversions(&[&bad], &["image2.bmp".into()], &config);
        let err = convert_all(plans, &config).await.unwrap_err();
        assert!(
            matches!(err, DownsizeError::EncodeFailure { ref name, .. } if name == "image2.bmp"),
            "got: {err:?}"
        );
    }
}
