//! Pixel transformations applied before re-encoding: downscaling and
//! colour-mode conversion.
//!
//! ## Downscale factor
//!
//! When either side exceeds the limit the image is divided by the integer
//! factor `max(w, h) / limit + 1`. Each side is floor-divided on its own,
//! so non-square images can drift from their exact aspect ratio by up to
//! one pixel per side. Slides reference images by EMU extents, not pixels,
//! so the drift is invisible once the image is placed.
//!
//! ## Fill colour
//!
//! Flattening onto an opaque background only happens when the source
//! actually carries alpha (RGBA, LA, or a palette decoded with
//! transparency). Sources without alpha skip straight to the mode
//! conversion.

use crate::config::{ColorMode, FillColor};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use tracing::debug;

/// New `(width, height)` if the image exceeds `max_dimension` on either side.
pub fn downscale_size(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width <= max_dimension && height <= max_dimension {
        return None;
    }
    let factor = width.max(height) / max_dimension + 1;
    Some(((width / factor).max(1), (height / factor).max(1)))
}

/// Downscale `img` when it exceeds `max_dimension`.
///
/// Returns the image and, if it was resized, the `(from, to)` dimensions.
pub fn downscale(
    img: DynamicImage,
    max_dimension: Option<u32>,
) -> (DynamicImage, Option<((u32, u32), (u32, u32))>) {
    let Some(limit) = max_dimension else {
        return (img, None);
    };
    let from = (img.width(), img.height());
    match downscale_size(from.0, from.1, limit) {
        Some(to) => {
            debug!(" - Resizing from {:?} to {:?}", from, to);
            let resized = img.resize_exact(to.0, to.1, FilterType::CatmullRom);
            (resized, Some((from, to)))
        }
        None => (img, None),
    }
}

/// Composite `img` over an opaque `color` background, dropping alpha.
fn flatten(img: &DynamicImage, color: FillColor) -> DynamicImage {
    let rgba = img.to_rgba8();
    let bg = color.0;
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let a = src[3] as u32;
        for c in 0..3 {
            let v = (src[c] as u32 * a + bg[c] as u32 * (255 - a) + 127) / 255;
            dst[c] = v as u8;
        }
    }
    DynamicImage::ImageRgb8(out)
}

/// Convert `img` to `mode`, flattening transparency onto `fill` first when given.
pub fn apply_color_mode(img: DynamicImage, mode: ColorMode, fill: Option<FillColor>) -> DynamicImage {
    let img = match fill {
        Some(color) if img.color().has_alpha() => {
            debug!(" - Flattening alpha onto {:?}", color.0);
            flatten(&img, color)
        }
        _ => img,
    };
    match mode {
        ColorMode::L => DynamicImage::ImageLuma8(img.to_luma8()),
        ColorMode::La => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
        ColorMode::Rgb => DynamicImage::ImageRgb8(img.to_rgb8()),
        ColorMode::Rgba => DynamicImage::ImageRgba8(img.to_rgba8()),
    }
}
