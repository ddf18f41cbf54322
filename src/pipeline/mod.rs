//! Pipeline stages for downsizing a presentation package.
//!
//! Each submodule implements exactly one step, and each one is testable in
//! isolation against a plain directory.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ archive ──▶ select ──▶ convert ──▶ content_types ──▶ relink ──▶ archive
//! (.pptx)   (extract)   (filter)   (decode,     (declare new     (.rels     (pack)
//!                                   scale,       extensions)      fix-up)
//!                                   encode)
//! ```
//!
//! 1. [`input`]   validate the package path and derive the output path
//! 2. [`archive`] extract into a scratch directory and later pack it back,
//!    keeping the original entry order
//! 3. [`select`]  list `ppt/media/image*` and apply the size and name filters
//! 4. [`convert`] plan output names, then decode, [`transform`] and
//!    [`encode`] each image on the blocking pool
//! 5. [`content_types`] declare any extension the package did not use before
//! 6. [`relink`]  point every `*.xml.rels` at the renamed images

pub mod archive;
pub mod content_types;
pub mod convert;
pub mod encode;
pub mod input;
pub mod relink;
pub mod select;
pub mod transform;
