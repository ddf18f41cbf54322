//! # pptx-downsizer
//!
//! Shrink PowerPoint (`.pptx`) files by downscaling and re-encoding the
//! images embedded in them.
//!
//! ## Why this crate?
//!
//! Decks grow large because screenshots and photos are pasted at full
//! resolution, often as uncompressed BMP or TIFF. A slide never shows more
//! than a couple of thousand pixels, so most of those bytes are wasted.
//! This crate unpacks the package, converts every image that is too big,
//! points the slides at the converted files and packs everything back up.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .pptx
//!  │
//!  ├─ 1. Input    validate the package, derive the output path
//!  ├─ 2. Extract  unzip into a scratch directory (spawn_blocking)
//!  ├─ 3. Select   ppt/media/image* filtered by size AND name
//!  ├─ 4. Convert  decode → downscale → colour mode → encode (blocking pool)
//!  ├─ 5. Relink   declare new extensions, rewrite *.xml.rels (CRLF)
//!  └─ 6. Pack     zip in the original entry order, atomic persist
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pptx_downsizer::{downsize, DownsizeConfig, TargetFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DownsizeConfig::builder()
//!         .convert_to(TargetFormat::Png)
//!         .max_dimension(2048)
//!         .build()?;
//!     let report = downsize("talk.pptx", &config).await?;
//!     eprintln!(
//!         "{} images converted, output is {:.0}% of the original",
//!         report.stats.converted_images,
//!         report.stats.ratio() * 100.0
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pptx-downsizer` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pptx-downsizer = { version = "0.3", default-features = false }
//! ```
//!
//! ## Choosing a Format
//!
//! | Format | Lossy | Best for |
//! |--------|-------|----------|
//! | `png`  | no    | Default; screenshots, diagrams, anything with text |
//! | `jpeg` | yes   | Photographs; pair with `quality` |
//! | `gif`, `bmp`, `tiff` | no | Rarely useful; kept for completeness |
//!
//! JPEG sources are always re-encoded as JPEG whatever the target is.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod downsize;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    parse_size, ArchiveCompression, ColorMode, DownsizeConfig, DownsizeConfigBuilder,
    ExistingOutput, FillColor, OnError, TargetFormat,
};
pub use downsize::{downsize, downsize_sync, inspect};
pub use error::{DownsizeError, MediaError};
pub use output::{
    DownsizeReport, DownsizeStats, MediaInfo, MediaResult, PackageSummary, RenameRecord,
};
pub use progress::{DownsizeProgressCallback, NoopProgressCallback, ProgressCallback};
