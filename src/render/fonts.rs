//! Font faces for receipt text.
//!
//! TrueType fonts are read from disk once, when the renderer is built, and
//! rasterized with ab_glyph. A missing or unparsable font file is not an
//! error: the face falls back to the Spleen 12x24 bitmap font compiled into
//! the binary, scaled nearest-neighbor to the requested height.

use std::fs;
use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use spleen_font::{FONT_12X24, PSF2Font};
use tracing::warn;

const SPLEEN_WIDTH: usize = 12;
const SPLEEN_HEIGHT: usize = 24;

/// A font at a fixed pixel height.
#[derive(Clone)]
pub enum Face {
    /// Anti-aliased TrueType outline font
    Ttf { font: FontArc, px: f32 },
    /// Built-in Spleen bitmap font, scaled nearest-neighbor to `px`
    Bitmap { px: f32 },
}

impl Face {
    /// Load a TrueType face from `path`, or fall back to the bitmap face.
    pub fn load_or_fallback(path: &Path, px: f32) -> Self {
        match fs::read(path) {
            Ok(bytes) => match FontArc::try_from_vec(bytes) {
                Ok(font) => Face::Ttf { font, px },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Font file is not a usable TrueType font, using built-in font");
                    Face::Bitmap { px }
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read font file, using built-in font");
                Face::Bitmap { px }
            }
        }
    }

    /// The built-in bitmap face.
    pub fn builtin(px: f32) -> Self {
        Face::Bitmap { px }
    }

    /// Pixel height this face renders at.
    pub fn px(&self) -> f32 {
        match self {
            Face::Ttf { px, .. } | Face::Bitmap { px } => *px,
        }
    }

    /// The same font at another pixel height.
    pub fn with_px(&self, px: f32) -> Self {
        match self {
            Face::Ttf { font, .. } => Face::Ttf {
                font: font.clone(),
                px,
            },
            Face::Bitmap { .. } => Face::Bitmap { px },
        }
    }

    /// This face, shrunk if needed so `text` is at most `max_width` wide.
    ///
    /// The height never drops below one pixel, so a single glyph wider than
    /// `max_width` at that size can still overflow.
    pub fn fit_width(&self, text: &str, max_width: u32) -> Self {
        let width = self.text_width(text);
        if width <= max_width || width == 0 {
            return self.clone();
        }
        let mut px = (self.px() * max_width as f32 / width as f32).floor().max(1.0);
        let mut face = self.with_px(px);
        while px > 1.0 && face.text_width(text) > max_width {
            px -= 1.0;
            face = self.with_px(px);
        }
        face
    }

    /// Whether this face uses the built-in fallback font.
    pub fn is_builtin(&self) -> bool {
        matches!(self, Face::Bitmap { .. })
    }

    /// Height of one line of text in pixels.
    pub fn line_height(&self) -> u32 {
        match self {
            Face::Ttf { font, px } => {
                let scaled = font.as_scaled(PxScale::from(*px));
                (scaled.ascent() - scaled.descent()).ceil().max(1.0) as u32
            }
            Face::Bitmap { px } => px.round().max(1.0) as u32,
        }
    }

    /// Advance width of `text` in pixels.
    pub fn text_width(&self, text: &str) -> u32 {
        match self {
            Face::Ttf { font, px } => {
                let scaled = font.as_scaled(PxScale::from(*px));
                let mut width = 0.0f32;
                let mut previous = None;
                for ch in text.chars() {
                    let id = font.glyph_id(ch);
                    if let Some(prev) = previous {
                        width += scaled.kern(prev, id);
                    }
                    width += scaled.h_advance(id);
                    previous = Some(id);
                }
                width.ceil() as u32
            }
            Face::Bitmap { .. } => self.bitmap_cell_width() * text.chars().count() as u32,
        }
    }

    /// Draw `text` in black with its top-left corner at (`x`, `y`).
    ///
    /// Pixels falling outside the canvas are clipped.
    pub fn draw(&self, canvas: &mut RgbImage, text: &str, x: i32, y: i32) {
        match self {
            Face::Ttf { font, px } => draw_ttf(canvas, font, *px, text, x, y),
            Face::Bitmap { .. } => self.draw_bitmap(canvas, text, x, y),
        }
    }

    fn bitmap_cell_width(&self) -> u32 {
        let height = self.line_height();
        ((height as usize * SPLEEN_WIDTH) / SPLEEN_HEIGHT).max(1) as u32
    }

    fn draw_bitmap(&self, canvas: &mut RgbImage, text: &str, x: i32, y: i32) {
        let cell_w = self.bitmap_cell_width() as usize;
        let cell_h = self.line_height() as usize;

        for (i, ch) in text.chars().enumerate() {
            let glyph = spleen_glyph(ch);
            let origin_x = x + (i * cell_w) as i32;
            for dy in 0..cell_h {
                let sy = dy * SPLEEN_HEIGHT / cell_h;
                for dx in 0..cell_w {
                    let sx = dx * SPLEEN_WIDTH / cell_w;
                    if glyph[sy * SPLEEN_WIDTH + sx] {
                        put_coverage(canvas, origin_x + dx as i32, y + dy as i32, 1.0);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Face {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Face::Ttf { px, .. } => f.debug_struct("Ttf").field("px", px).finish(),
            Face::Bitmap { px } => f.debug_struct("Bitmap").field("px", px).finish(),
        }
    }
}

fn draw_ttf(canvas: &mut RgbImage, font: &FontArc, px: f32, text: &str, x: i32, y: i32) {
    let scale = PxScale::from(px);
    let scaled = font.as_scaled(scale);
    let baseline = y as f32 + scaled.ascent();
    let mut caret = x as f32;
    let mut previous = None;

    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scale, ab_glyph::point(caret, baseline));
        caret += scaled.h_advance(id);
        previous = Some(id);

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let cx = bounds.min.x as i32 + gx as i32;
                let cy = bounds.min.y as i32 + gy as i32;
                put_coverage(canvas, cx, cy, coverage);
            });
        }
    }
}

/// Darken a pixel by `coverage` (0.0 = untouched, 1.0 = black).
fn put_coverage(canvas: &mut RgbImage, x: i32, y: i32, coverage: f32) {
    if x < 0 || y < 0 || x >= canvas.width() as i32 || y >= canvas.height() as i32 {
        return;
    }
    let ink = (255.0 * (1.0 - coverage.clamp(0.0, 1.0))).round() as u8;
    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
    let value = pixel[0].min(ink);
    *pixel = Rgb([value, value, value]);
}

/// Rasterize one Spleen 12x24 glyph; unknown characters render as a box.
fn spleen_glyph(ch: char) -> Vec<bool> {
    let mut cells = vec![false; SPLEEN_WIDTH * SPLEEN_HEIGHT];
    let mut found = false;

    if let Ok(mut font) = PSF2Font::new(FONT_12X24) {
        let utf8 = ch.to_string();
        if let Some(glyph) = font.glyph_for_utf8(utf8.as_bytes()) {
            found = true;
            for (row_y, row) in glyph.enumerate() {
                for (col_x, on) in row.enumerate() {
                    if row_y < SPLEEN_HEIGHT && col_x < SPLEEN_WIDTH {
                        cells[row_y * SPLEEN_WIDTH + col_x] = on;
                    }
                }
            }
        }
    }

    if !found && !ch.is_whitespace() {
        for x in 2..SPLEEN_WIDTH - 2 {
            cells[4 * SPLEEN_WIDTH + x] = true;
            cells[(SPLEEN_HEIGHT - 5) * SPLEEN_WIDTH + x] = true;
        }
        for y in 4..SPLEEN_HEIGHT - 4 {
            cells[y * SPLEEN_WIDTH + 2] = true;
            cells[y * SPLEEN_WIDTH + SPLEEN_WIDTH - 3] = true;
        }
    }
    cells
}
