//! Decode, stamp, re-encode.

use crate::error::{Result, WatermarkError};
use crate::glyphs::{draw_text, text_width};
use crate::label::WatermarkLabel;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, Rgba};
use imageproc::drawing::Blend;
use tracing::debug;

/// Smallest font size in pixels, whatever the image width.
pub const MIN_FONT_SIZE: u32 = 20;

/// Default JPEG quality of the re-encoded image.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 153]);
const FILL: Rgba<u8> = Rgba([255, 255, 255, 242]);

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkOptions {
    /// JPEG quality, 1..=100
    pub jpeg_quality: u8,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl WatermarkOptions {
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}

/// Geometry of the label for a given image width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelLayout {
    pub font_size: u32,
    /// Distance from the right and bottom edges
    pub padding: u32,
    /// Vertical distance between the two baselines (1.2 × font size)
    pub line_gap: u32,
    pub shadow_offset: u32,
}

impl LabelLayout {
    pub fn for_width(width: u32) -> Self {
        Self::with_font_size(MIN_FONT_SIZE.max(width / 40))
    }

    pub fn with_font_size(font_size: u32) -> Self {
        let font_size = font_size.max(1);
        Self {
            font_size,
            padding: font_size,
            line_gap: font_size * 6 / 5,
            shadow_offset: (font_size / 12).max(1),
        }
    }

    /// Shrink the font until the widest line of `label` fits between the left
    /// edge and the right padding of a `width`-pixel image.
    ///
    /// Below a 1 px font the label is clipped instead.
    pub fn fit(self, width: u32, label: &WatermarkLabel) -> Self {
        let widest = |size: u32| {
            text_width(&label.date, size).max(text_width(&label.coordinates, size))
        };

        let mut size = self.font_size;
        while size > 1 && widest(size) + size > width {
            size -= 1;
        }
        if size == self.font_size {
            self
        } else {
            Self::with_font_size(size)
        }
    }
}

/// A JPEG that has been through [`apply_watermark`].
///
/// Only this module constructs it, so holding one proves the label was
/// burned in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkedImage {
    bytes: Bytes,
    width: u32,
    height: u32,
}

impl WatermarkedImage {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn content_type(&self) -> &'static str {
        "image/jpeg"
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Burn `label` into the bottom-right corner of `raw` and re-encode as JPEG.
///
/// Output dimensions equal the input's.
///
/// # Errors
///
/// - [`WatermarkError::Decode`] if `raw` is not a decodable image
/// - [`WatermarkError::Encode`] if the image has no pixels or JPEG encoding fails
pub fn apply_watermark(
    raw: &[u8],
    label: &WatermarkLabel,
    options: &WatermarkOptions,
) -> Result<WatermarkedImage> {
    let source = image::load_from_memory(raw).map_err(|e| WatermarkError::Decode(e.to_string()))?;
    let (width, height) = source.dimensions();

    if width == 0 || height == 0 {
        return Err(WatermarkError::Encode(format!(
            "cannot create a {}x{} compositing surface",
            width, height
        )));
    }

    let layout = LabelLayout::for_width(width).fit(width, label);
    let mut canvas = Blend(source.to_rgba8());
    stamp(&mut canvas, label, &layout, width, height);

    let rgb = DynamicImage::ImageRgba8(canvas.0).to_rgb8();
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, options.jpeg_quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|e| WatermarkError::Encode(e.to_string()))?;

    debug!(
        width = width,
        height = height,
        font_size = layout.font_size,
        input_bytes = raw.len(),
        output_bytes = buffer.len(),
        "Watermarked image"
    );

    Ok(WatermarkedImage {
        bytes: Bytes::from(buffer),
        width,
        height,
    })
}

/// Top-left corner of each line, date first.
fn line_origins<'a>(
    label: &'a WatermarkLabel,
    layout: &LabelLayout,
    width: u32,
    height: u32,
) -> [(&'a str, i32, i32); 2] {
    let size = layout.font_size as i32;
    let right = width as i32 - layout.padding as i32;
    let coords_baseline = height as i32 - layout.padding as i32;
    let date_baseline = coords_baseline - layout.line_gap as i32;

    [
        (label.date.as_str(), date_baseline),
        (label.coordinates.as_str(), coords_baseline),
    ]
    .map(|(text, baseline)| {
        let x = right - text_width(text, layout.font_size) as i32;
        (text, x, baseline - size)
    })
}

fn stamp(
    canvas: &mut Blend<image::RgbaImage>,
    label: &WatermarkLabel,
    layout: &LabelLayout,
    width: u32,
    height: u32,
) {
    let lines = line_origins(label, layout, width, height);

    let offset = layout.shadow_offset as i32;
    for (color, shift) in [(SHADOW, offset), (FILL, 0)] {
        for (text, x, top) in lines {
            draw_text(canvas, text, x + shift, top + shift, layout.font_size, color);
        }
    }
}
