//! # Watermark Pipeline
//!
//! Burns a capture timestamp and coordinates into the bottom-right corner of an
//! image and re-encodes it as JPEG for upload.
//!
//! ## Layout
//!
//! - Font size scales with width: `max(20, width / 40)`, shrunk further when a
//!   line would otherwise run past the left edge
//! - Glyphs are condensed to 5/8 of the font size in width
//! - Padding from the right and bottom edges equals the font size
//! - Two right-aligned lines, date above coordinates, baselines `1.2 ×` font size apart
//! - A dark drop shadow under a near-opaque white fill keeps the label readable
//!   on light and dark backgrounds
//!
//! ## Usage
//!
//! ```ignore
//! use core_watermark::{apply_watermark, WatermarkLabel, WatermarkOptions};
//!
//! let label = WatermarkLabel::new("2024-01-15", "-6.81,107.14");
//! let output = apply_watermark(&raw_bytes, &label, &WatermarkOptions::default())?;
//! assert_eq!(output.content_type(), "image/jpeg");
//! ```
//!
//! The transformation is synchronous and CPU bound. Async callers should run
//! it on a blocking thread.

pub mod error;
mod glyphs;
pub mod label;
pub mod pipeline;

pub use error::{Result, WatermarkError};
pub use label::{GeoPoint, WatermarkLabel};
pub use pipeline::{apply_watermark, LabelLayout, WatermarkOptions, WatermarkedImage};
