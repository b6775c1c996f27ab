//! Bitmap text rendering onto an RGBA canvas.
//!
//! Glyphs come from the 8×8 public-domain font in `font8x8`. A glyph drawn at
//! `size` fills a cell `advance(size)` wide and `size` tall; source row `r`
//! covers destination rows `r*size/8 .. (r+1)*size/8` and source column `c`
//! covers `c*advance/8 .. (c+1)*advance/8`, so the scaled glyph tiles the cell
//! exactly.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, Blend};
use imageproc::rect::Rect;

const GLYPH_CELLS: u32 = 8;

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Horizontal distance between glyph origins at `size`. Glyphs are condensed
/// to 5/8 of their height.
pub(crate) fn advance(size: u32) -> u32 {
    (size * 5 / 8).max(1)
}

/// Width in pixels of `text` rendered at `size`.
pub(crate) fn text_width(text: &str, size: u32) -> u32 {
    text.chars().count() as u32 * advance(size)
}

/// Alpha-blend `text` with its top-left corner at `(x, y)`.
///
/// Parts that fall outside the canvas are clipped.
pub(crate) fn draw_text(
    canvas: &mut Blend<RgbaImage>,
    text: &str,
    x: i32,
    y: i32,
    size: u32,
    color: Rgba<u8>,
) {
    let cell_width = advance(size);
    let span = |i: u32, extent: u32| -> (i32, u32) {
        let start = i * extent / GLYPH_CELLS;
        let end = (i + 1) * extent / GLYPH_CELLS;
        (start as i32, end - start)
    };

    for (index, ch) in text.chars().enumerate() {
        let cell_x = x + (index as u32 * cell_width) as i32;
        for (row, bits) in glyph(ch).iter().enumerate() {
            let (dy, height) = span(row as u32, size);
            for col in 0..GLYPH_CELLS {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let (dx, width) = span(col, cell_width);
                if width == 0 || height == 0 {
                    continue;
                }
                draw_filled_rect_mut(
                    canvas,
                    Rect::at(cell_x + dx, y + dy).of_size(width, height),
                    color,
                );
            }
        }
    }
}
