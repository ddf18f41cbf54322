//! Progress-callback trait for per-image downsizing events.
//!
//! Inject an [`Arc<dyn DownsizeProgressCallback>`] via
//! [`crate::config::DownsizeConfigBuilder::progress_callback`] to receive
//! events as the pipeline converts each image.
//!
//! # Example
//!
//! ```rust
//! use pptx_downsizer::{DownsizeConfig, DownsizeProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl DownsizeProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, name: &str, _old: u64, new_size: u64) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{name}: {new_size} bytes");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { converted: AtomicUsize::new(0) });
//!
//! let config = DownsizeConfig::builder()
//!     .progress_callback(counter as Arc<dyn DownsizeProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the downsizing pipeline as it works through the package.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the
/// per-image methods are called from several blocking-pool threads at once.
/// All methods have default no-op implementations.
pub trait DownsizeProgressCallback: Send + Sync {
    /// Called once, after selection, before the first image is converted.
    ///
    /// * `selected` — images that passed the filters
    /// * `total`    — images found in the media directory
    fn on_run_start(&self, selected: usize, total: usize) {
        let _ = (selected, total);
    }

    /// Called just before an image is decoded.
    fn on_image_start(&self, name: &str) {
        let _ = name;
    }

    /// Called when an image has been re-encoded and written.
    ///
    /// `name` is the final basename, which differs from the original when the
    /// format changed.
    fn on_image_complete(&self, name: &str, old_size: u64, new_size: u64) {
        let _ = (name, old_size, new_size);
    }

    /// Called when an image fails under the `continue` policy.
    fn on_image_error(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called after every link is rewritten and before the archive is built.
    ///
    /// `workspace` is the extracted package; it is deleted once the run ends.
    /// Blocking here delays packing, which is how the CLI offers a pause for
    /// manual edits.
    fn on_before_pack(&self, workspace: &Path) {
        let _ = workspace;
    }

    /// Called once after all selected images have been attempted.
    fn on_run_complete(&self, selected: usize, converted: usize) {
        let _ = (selected, converted);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DownsizeProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DownsizeConfig`].
pub type ProgressCallback = Arc<dyn DownsizeProgressCallback>;
