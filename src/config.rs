//! Configuration types for presentation downsizing.
//!
//! All run behaviour is controlled through [`DownsizeConfig`], built via its
//! [`DownsizeConfigBuilder`]. The configuration is validated once in
//! [`DownsizeConfigBuilder::build`] and is read-only for the rest of the run;
//! every pipeline stage receives it by shared reference.
//!
//! String-typed options coming from a CLI or a config file are parsed with
//! the `FromStr` impls on the enums below and with [`parse_size`]; all of
//! them report failures as [`DownsizeError::InvalidConfig`].

use crate::error::DownsizeError;
use crate::pipeline::input;
use crate::progress::ProgressCallback;
use glob::Pattern;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Default output file name pattern: `deck.pptx` → `deck.downsized.pptx`.
pub const DEFAULT_OUTPUT_NAME_FORMAT: &str = "{fnroot}.downsized.pptx";

/// Configuration for a downsizing run.
///
/// Built via [`DownsizeConfig::builder()`] or using
/// [`DownsizeConfig::default()`].
///
/// # Example
/// ```rust
/// use pptx_downsizer::{DownsizeConfig, TargetFormat};
///
/// let config = DownsizeConfig::builder()
///     .convert_to(TargetFormat::Jpeg)
///     .quality(80)
///     .max_dimension(1600)
///     .name_filter("*.png")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DownsizeConfig {
    /// Only convert images whose basename matches this shell glob. Default: none.
    pub name_filter: Option<Pattern>,

    /// Only convert images strictly larger than this many bytes. Default: 512 KiB.
    ///
    /// Combined with `name_filter` using AND: an image at or below the
    /// threshold is skipped even when its name matches.
    pub size_filter: Option<u64>,

    /// Downscale images whose width or height exceeds this many pixels. Default: 2048.
    ///
    /// The downscale factor is an integer, `max(w, h) / max_dimension + 1`,
    /// applied to both axes with floor division.
    pub max_dimension: Option<u32>,

    /// Format that converted images are written in. Default: PNG.
    ///
    /// JPEG sources are always re-encoded as JPEG in place, whatever this says.
    pub convert_to: TargetFormat,

    /// Encoder quality, 1–100. Only JPEG output uses it. Default: 90.
    pub quality: u8,

    /// Spend more CPU for smaller output (PNG compression level). Default: true.
    pub optimize: bool,

    /// Convert pixels to this colour mode before encoding. Default: none.
    ///
    /// When unset and the output is JPEG, RGB is used.
    pub color_mode: Option<ColorMode>,

    /// Background colour for transparent regions when `color_mode` is set. Default: none.
    pub fill_color: Option<FillColor>,

    /// Output file name pattern with `{filename}` and `{fnroot}` placeholders.
    pub output_name_format: String,

    /// Compression method for every entry of the output archive. Default: deflated.
    pub compression: ArchiveCompression,

    /// What to do when the output file already exists. Default: abort.
    pub existing_output: ExistingOutput,

    /// What to do when a single image fails to convert. Default: raise.
    pub on_error: OnError,

    /// Report detail level, 0–5. Default: 2.
    pub verbosity: u8,

    /// Number of images converted at once. Default: 1 (sequential).
    ///
    /// Images are independent once selected, so raising this only trades
    /// memory for wall-clock time. The link rewrite always waits for every
    /// image to finish.
    pub concurrency: usize,

    /// Optional observer for per-image progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DownsizeConfig {
    fn default() -> Self {
        Self {
            name_filter: None,
            size_filter: Some(512 * 1024),
            max_dimension: Some(2048),
            convert_to: TargetFormat::default(),
            quality: 90,
            optimize: true,
            color_mode: None,
            fill_color: None,
            output_name_format: DEFAULT_OUTPUT_NAME_FORMAT.to_string(),
            compression: ArchiveCompression::default(),
            existing_output: ExistingOutput::default(),
            on_error: OnError::default(),
            verbosity: 2,
            concurrency: 1,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DownsizeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownsizeConfig")
            .field("name_filter", &self.name_filter.as_ref().map(|p| p.as_str()))
            .field("size_filter", &self.size_filter)
            .field("max_dimension", &self.max_dimension)
            .field("convert_to", &self.convert_to)
            .field("quality", &self.quality)
            .field("optimize", &self.optimize)
            .field("color_mode", &self.color_mode)
            .field("fill_color", &self.fill_color)
            .field("output_name_format", &self.output_name_format)
            .field("compression", &self.compression)
            .field("existing_output", &self.existing_output)
            .field("on_error", &self.on_error)
            .field("verbosity", &self.verbosity)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn DownsizeProgressCallback>"),
            )
            .finish()
    }
}

impl DownsizeConfig {
    /// Create a new builder for `DownsizeConfig`.
    pub fn builder() -> DownsizeConfigBuilder {
        DownsizeConfigBuilder {
            config: Self::default(),
            name_filter: None,
        }
    }

    /// Colour mode to apply before encoding in `format`.
    pub fn color_mode_for(&self, format: TargetFormat) -> Option<ColorMode> {
        self.color_mode
            .or((format == TargetFormat::Jpeg).then_some(ColorMode::Rgb))
    }
}

/// Builder for [`DownsizeConfig`].
#[derive(Debug)]
pub struct DownsizeConfigBuilder {
    config: DownsizeConfig,
    name_filter: Option<String>,
}

impl DownsizeConfigBuilder {
    pub fn name_filter(mut self, glob: impl Into<String>) -> Self {
        self.name_filter = Some(glob.into());
        self
    }

    pub fn size_filter(mut self, bytes: u64) -> Self {
        self.config.size_filter = Some(bytes);
        self
    }

    /// Disable size gating: every image passes the size predicate.
    pub fn no_size_filter(mut self) -> Self {
        self.config.size_filter = None;
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = Some(px);
        self
    }

    /// Never resize.
    pub fn no_max_dimension(mut self) -> Self {
        self.config.max_dimension = None;
        self
    }

    pub fn convert_to(mut self, format: TargetFormat) -> Self {
        self.config.convert_to = format;
        self
    }

    pub fn quality(mut self, q: u8) -> Self {
        self.config.quality = q;
        self
    }

    pub fn optimize(mut self, v: bool) -> Self {
        self.config.optimize = v;
        self
    }

    pub fn color_mode(mut self, mode: ColorMode) -> Self {
        self.config.color_mode = Some(mode);
        self
    }

    pub fn fill_color(mut self, color: FillColor) -> Self {
        self.config.fill_color = Some(color);
        self
    }

    pub fn output_name_format(mut self, fmt: impl Into<String>) -> Self {
        self.config.output_name_format = fmt.into();
        self
    }

    pub fn compression(mut self, method: ArchiveCompression) -> Self {
        self.config.compression = method;
        self
    }

    pub fn existing_output(mut self, policy: ExistingOutput) -> Self {
        self.config.existing_output = policy;
        self
    }

    /// Shorthand for `existing_output(ExistingOutput::Overwrite)` when `true`.
    pub fn overwrite(self, v: bool) -> Self {
        self.existing_output(if v {
            ExistingOutput::Overwrite
        } else {
            ExistingOutput::Abort
        })
    }

    pub fn on_error(mut self, policy: OnError) -> Self {
        self.config.on_error = policy;
        self
    }

    pub fn verbosity(mut self, level: u8) -> Self {
        self.config.verbosity = level.min(5);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<DownsizeConfig, DownsizeError> {
        if let Some(ref glob) = self.name_filter {
            let pattern = Pattern::new(glob).map_err(|e| {
                DownsizeError::InvalidConfig(format!("Invalid name filter '{}': {}", glob, e))
            })?;
            self.config.name_filter = Some(pattern);
        }

        let c = &self.config;
        if !(1..=100).contains(&c.quality) {
            return Err(DownsizeError::InvalidConfig(format!(
                "Quality must be 1–100, got {}",
                c.quality
            )));
        }
        if c.max_dimension == Some(0) {
            return Err(DownsizeError::InvalidConfig(
                "Max dimension must be ≥ 1 pixel".into(),
            ));
        }
        input::validate_output_name_format(&c.output_name_format)?;
        if c.fill_color.is_some() && c.color_mode.is_none() && c.convert_to != TargetFormat::Jpeg {
            warn!("Fill colour is only applied together with a colour mode; ignoring it");
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image format written for converted images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Lossless; the safe default for diagrams and screenshots.
    #[default]
    Png,
    /// Lossy; much smaller for photographs.
    Jpeg,
    Gif,
    Bmp,
    Tiff,
}

impl TargetFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Gif => "gif",
            TargetFormat::Bmp => "bmp",
            TargetFormat::Tiff => "tiff",
        }
    }

    /// MIME type registered in `[Content_Types].xml`.
    pub fn mime_type(self) -> &'static str {
        match self {
            TargetFormat::Png => "image/png",
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Gif => "image/gif",
            TargetFormat::Bmp => "image/bmp",
            TargetFormat::Tiff => "image/tiff",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            TargetFormat::Png => ImageFormat::Png,
            TargetFormat::Jpeg => ImageFormat::Jpeg,
            TargetFormat::Gif => ImageFormat::Gif,
            TargetFormat::Bmp => ImageFormat::Bmp,
            TargetFormat::Tiff => ImageFormat::Tiff,
        }
    }

    /// Format implied by a file extension (case-insensitive, no leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(TargetFormat::Png),
            "jpg" | "jpeg" => Some(TargetFormat::Jpeg),
            "gif" => Some(TargetFormat::Gif),
            "bmp" => Some(TargetFormat::Bmp),
            "tif" | "tiff" => Some(TargetFormat::Tiff),
            _ => None,
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = DownsizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().trim_start_matches('.').to_ascii_lowercase();
        if norm == "jpg" {
            warn!("Selected format 'jpg' should be 'jpeg' instead, switching");
        }
        Self::from_extension(&norm).ok_or_else(|| {
            DownsizeError::InvalidConfig(format!(
                "Unsupported image format '{}' (expected png, jpeg, gif, bmp or tiff)",
                s
            ))
        })
    }
}

/// Pixel layout applied before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    /// 8-bit greyscale.
    L,
    /// 8-bit greyscale with alpha.
    La,
    /// 8-bit RGB.
    Rgb,
    /// 8-bit RGB with alpha.
    Rgba,
}

impl FromStr for ColorMode {
    type Err = DownsizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(ColorMode::L),
            "LA" => Ok(ColorMode::La),
            "RGB" => Ok(ColorMode::Rgb),
            "RGBA" => Ok(ColorMode::Rgba),
            _ => Err(DownsizeError::InvalidConfig(format!(
                "Unsupported colour mode '{}' (expected L, LA, RGB or RGBA)",
                s
            ))),
        }
    }
}

/// Opaque background colour used to flatten transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillColor(pub [u8; 3]);

impl FillColor {
    pub const WHITE: FillColor = FillColor([255, 255, 255]);
    pub const BLACK: FillColor = FillColor([0, 0, 0]);
}

impl FromStr for FillColor {
    type Err = DownsizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            DownsizeError::InvalidConfig(format!(
                "Invalid fill colour '{}' (expected #rgb, #rrggbb, white or black)",
                s
            ))
        };
        let t = s.trim().to_ascii_lowercase();
        match t.as_str() {
            "white" => return Ok(FillColor::WHITE),
            "black" => return Ok(FillColor::BLACK),
            _ => {}
        }
        let hex = t.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = channel(&c.to_string())?;
                    rgb[i] = v * 17;
                }
                Ok(FillColor(rgb))
            }
            6 => Ok(FillColor([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            ])),
            _ => Err(invalid()),
        }
    }
}

/// Zip compression method used when repacking the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    /// No compression.
    Stored,
    /// Deflate; the only method every Office version reads. (default)
    #[default]
    Deflated,
    Bzip2,
    Zstd,
}

impl FromStr for ArchiveCompression {
    type Err = DownsizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        let norm = norm.strip_prefix("zip_").unwrap_or(norm.as_str());
        match norm {
            "store" | "stored" => Ok(ArchiveCompression::Stored),
            "deflate" | "deflated" => Ok(ArchiveCompression::Deflated),
            "bzip2" => Ok(ArchiveCompression::Bzip2),
            "zstd" => Ok(ArchiveCompression::Zstd),
            _ => Err(DownsizeError::InvalidConfig(format!(
                "Unsupported compression method '{}' (expected stored, deflated, bzip2 or zstd)",
                s
            ))),
        }
    }
}

/// Outcome when the output file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingOutput {
    /// Stop with [`DownsizeError::OutputExists`]. (default)
    #[default]
    Abort,
    /// Replace the existing file.
    Overwrite,
}

/// Policy for a single image that fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Abort the whole run. (default)
    #[default]
    Raise,
    /// Log a warning, keep the original image, carry on.
    Continue,
}

impl FromStr for OnError {
    type Err = DownsizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raise" => Ok(OnError::Raise),
            "continue" => Ok(OnError::Continue),
            _ => Err(DownsizeError::InvalidConfig(format!(
                "Unknown error policy '{}' (expected raise or continue)",
                s
            ))),
        }
    }
}

/// Parse a human-readable size string (e.g. "500kb", "1e6", "2MB") into bytes.
///
/// Suffixes use base 1024. A bare number is a byte count and may be written
/// in float or exponent form.
pub fn parse_size(s: &str) -> Result<u64, DownsizeError> {
    let t = s.trim().to_ascii_lowercase();

    let (num_str, multiplier) = if let Some(n) = t.strip_suffix("gb").or(t.strip_suffix('g')) {
        (n, 1024u64 * 1024 * 1024)
    } else if let Some(n) = t.strip_suffix("mb").or(t.strip_suffix('m')) {
        (n, 1024u64 * 1024)
    } else if let Some(n) = t.strip_suffix("kb").or(t.strip_suffix('k')) {
        (n, 1024u64)
    } else if let Some(n) = t.strip_suffix('b') {
        (n, 1u64)
    } else {
        (t.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| DownsizeError::InvalidConfig(format!("Size must be numeric, got '{}'", s)))?;
    if !num.is_finite() || num < 0.0 {
        return Err(DownsizeError::InvalidConfig(format!(
            "Size must be a non-negative number, got '{}'",
            s
        )));
    }

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = DownsizeConfig::default();
        assert_eq!(c.size_filter, Some(524_288));
        assert_eq!(c.max_dimension, Some(2048));
        assert_eq!(c.convert_to, TargetFormat::Png);
        assert_eq!(c.quality, 90);
        assert!(c.optimize);
        assert_eq!(c.output_name_format, "{fnroot}.downsized.pptx");
        assert_eq!(c.existing_output, ExistingOutput::Abort);
        assert_eq!(c.on_error, OnError::Raise);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_compiles_name_filter() {
        let c = DownsizeConfig::builder().name_filter("*.tiff").build().unwrap();
        assert!(c.name_filter.unwrap().matches("image4.tiff"));
    }

    #[test]
    fn builder_rejects_bad_glob() {
        let err = DownsizeConfig::builder().name_filter("[abc").build().unwrap_err();
        assert!(matches!(err, DownsizeError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_quality_out_of_range() {
        assert!(DownsizeConfig::builder().quality(0).build().is_err());
        assert!(DownsizeConfig::builder().quality(101).build().is_err());
        assert!(DownsizeConfig::builder().quality(100).build().is_ok());
    }

    #[test]
    fn builder_rejects_zero_max_dimension() {
        assert!(DownsizeConfig::builder().max_dimension(0).build().is_err());
    }

    #[test]
    fn builder_rejects_unknown_placeholder() {
        let err = DownsizeConfig::builder()
            .output_name_format("{stem}.small.pptx")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("{stem}"), "got: {err}");
    }

    #[test]
    fn overwrite_shorthand() {
        let c = DownsizeConfig::builder().overwrite(true).build().unwrap();
        assert_eq!(c.existing_output, ExistingOutput::Overwrite);
    }

    #[test]
    fn jpeg_output_defaults_to_rgb() {
        let c = DownsizeConfig::default();
        assert_eq!(c.color_mode_for(TargetFormat::Jpeg), Some(ColorMode::Rgb));
        assert_eq!(c.color_mode_for(TargetFormat::Png), None);

        let c = DownsizeConfig::builder().color_mode(ColorMode::L).build().unwrap();
        assert_eq!(c.color_mode_for(TargetFormat::Jpeg), Some(ColorMode::L));
    }

    #[test]
    fn target_format_normalises_jpg() {
        assert_eq!("jpg".parse::<TargetFormat>().unwrap(), TargetFormat::Jpeg);
        assert_eq!(".JPEG".parse::<TargetFormat>().unwrap(), TargetFormat::Jpeg);
        assert_eq!(" png ".parse::<TargetFormat>().unwrap(), TargetFormat::Png);
        assert_eq!("tif".parse::<TargetFormat>().unwrap(), TargetFormat::Tiff);
        assert!("webp".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn color_mode_parse() {
        assert_eq!("rgb".parse::<ColorMode>().unwrap(), ColorMode::Rgb);
        assert_eq!("LA".parse::<ColorMode>().unwrap(), ColorMode::La);
        assert!("P".parse::<ColorMode>().is_err());
    }

    #[test]
    fn fill_color_parse() {
        assert_eq!("#ffffff".parse::<FillColor>().unwrap(), FillColor::WHITE);
        assert_eq!("#fff".parse::<FillColor>().unwrap(), FillColor::WHITE);
        assert_eq!("#102030".parse::<FillColor>().unwrap(), FillColor([16, 32, 48]));
        assert_eq!("Black".parse::<FillColor>().unwrap(), FillColor::BLACK);
        assert!("ffffff".parse::<FillColor>().is_err());
        assert!("#ggg".parse::<FillColor>().is_err());
        assert!("#ffff".parse::<FillColor>().is_err());
    }

    #[test]
    fn compression_parse_accepts_zip_constants() {
        assert_eq!(
            "ZIP_DEFLATED".parse::<ArchiveCompression>().unwrap(),
            ArchiveCompression::Deflated
        );
        assert_eq!("store".parse::<ArchiveCompression>().unwrap(), ArchiveCompression::Stored);
        assert_eq!("bzip2".parse::<ArchiveCompression>().unwrap(), ArchiveCompression::Bzip2);
        assert!("rar".parse::<ArchiveCompression>().is_err());
    }

    #[test]
    fn on_error_parse() {
        assert_eq!("Continue".parse::<OnError>().unwrap(), OnError::Continue);
        assert!("ignore".parse::<OnError>().is_err());
    }

    #[test]
    fn parse_size_units() {
        assert_eq!(parse_size("500kb").unwrap(), 512_000);
        assert_eq!(parse_size("500KB").unwrap(), 512_000);
        assert_eq!(parse_size("2M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1e6").unwrap(), 1_000_000);
        assert_eq!(parse_size("0.5mb").unwrap(), 524_288);
        assert_eq!(parse_size("1000000").unwrap(), 1_000_000);
        assert_eq!(parse_size("12b").unwrap(), 12);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("lots").is_err());
        assert!(parse_size("-5kb").is_err());
        assert!(parse_size("").is_err());
    }
}
