//! Image encoding: `DynamicImage` → bytes in the target format.
//!
//! Encoding happens into memory first. Only a complete, successful encode is
//! written back to the workspace, so a failure never leaves a truncated file
//! where the original image used to be.

use crate::config::TargetFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode `img` as `format`.
///
/// `quality` only applies to JPEG. `optimize` selects the slowest, smallest
/// PNG compression; other formats ignore it.
pub fn encode_image(
    img: &DynamicImage,
    format: TargetFormat,
    quality: u8,
    optimize: bool,
) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        TargetFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            img.write_with_encoder(encoder)?;
        }
        TargetFormat::Png => {
            let compression = if optimize {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            let encoder = PngEncoder::new_with_quality(&mut buf, compression, PngFilterType::Adaptive);
            img.write_with_encoder(encoder)?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut buf), other.image_format())?;
        }
    }

    debug!("Encoded {}x{} image → {} bytes {}", img.width(), img.height(), buf.len(), format);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 7) as u8, (y * 3) as u8, ((x + y) * 5) as u8])
        }))
    }

    #[test]
    fn png_output_decodes_back() {
        let bytes = encode_image(&gradient(40, 30), TargetFormat::Png, 90, true).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (40, 30));
    }

    #[test]
    fn jpeg_quality_changes_size() {
        let img = gradient(128, 128);
        let low = encode_image(&img, TargetFormat::Jpeg, 10, true).unwrap();
        let high = encode_image(&img, TargetFormat::Jpeg, 95, true).unwrap();
        assert_eq!(&low[..2], b"\xFF\xD8");
        assert!(low.len() < high.len(), "{} vs {}", low.len(), high.len());
    }

    #[test]
    fn bmp_and_tiff_encode() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255])));
        let bmp = encode_image(&img, TargetFormat::Bmp, 90, false).unwrap();
        assert_eq!(&bmp[..2], b"BM");
        let tiff = encode_image(&img, TargetFormat::Tiff, 90, false).unwrap();
        assert!(tiff.starts_with(b"II*\0") || tiff.starts_with(b"MM\0*"));
    }
}
