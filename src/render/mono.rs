//! # Monochrome Conversion
//!
//! Thermal heads print dots, not gray. This module turns a rendered RGB
//! receipt into a packed 1-bit [`MonoBitmap`] and applies the physical
//! adjustments that depend on the paper roll:
//!
//! ```text
//! RgbImage → luma → autocontrast → contrast → threshold → MonoBitmap
//!                                                           ↓
//!                       trim columns → upscale → center → x offset → height cap
//! ```
//!
//! ## Bit Packing
//!
//! Rows are packed MSB-first, 1 = black, padded with white to a whole byte:
//!
//! ```text
//! [true, true, false, false, true, false, true, false] → 0b11001010
//! ```

use image::{GrayImage, Luma, RgbImage, imageops};

/// Luma values below this print as black.
const BLACK_THRESHOLD: u8 = 128;

/// A packed 1-bit image, row-major, MSB = leftmost dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoBitmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl MonoBitmap {
    /// An all-white bitmap.
    pub fn blank(width: u32, height: u32) -> Self {
        let width_bytes = width.div_ceil(8) as usize;
        Self {
            width,
            height,
            data: vec![0; width_bytes * height as usize],
        }
    }

    /// Bytes per row.
    #[inline]
    pub fn width_bytes(&self) -> usize {
        self.width.div_ceil(8) as usize
    }

    /// Whether the dot at (`x`, `y`) is black.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        let idx = y as usize * self.width_bytes() + x as usize / 8;
        (self.data[idx] >> (7 - (x % 8))) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32) {
        let idx = y as usize * self.width_bytes() + x as usize / 8;
        self.data[idx] |= 1 << (7 - (x % 8));
    }

    /// Number of black dots.
    pub fn ink(&self) -> usize {
        self.data.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// First and last column holding a black dot.
    pub fn ink_columns(&self) -> Option<(u32, u32)> {
        let inked = |x: u32| (0..self.height).any(|y| self.get(x, y));
        let first = (0..self.width).find(|&x| inked(x))?;
        let last = (first..self.width).rev().find(|&x| inked(x)).unwrap_or(first);
        Some((first, last))
    }

    /// Convert back to grayscale for PNG previews.
    pub fn to_gray_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let color = if self.get(x, y) { 0u8 } else { 255u8 };
                img.put_pixel(x, y, Luma([color]));
            }
        }
        img
    }
}

/// Pack a row of boolean pixel values into bytes.
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; pixels.len().div_ceil(8)];
    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    bytes
}

/// Convert a rendered image to 1-bit.
///
/// The luma channel is stretched to the full 0..=255 range (autocontrast),
/// then pushed away from its mean by `contrast` (1.0 = unchanged), then
/// thresholded at mid-gray.
pub fn to_mono(image: &RgbImage, contrast: f32) -> MonoBitmap {
    let mut gray = imageops::grayscale(image);
    autocontrast(&mut gray);
    enhance_contrast(&mut gray, contrast);

    let (width, height) = gray.dimensions();
    let mut data = Vec::with_capacity(width.div_ceil(8) as usize * height as usize);
    for row in gray.rows() {
        let pixels: Vec<bool> = row.map(|p| p[0] < BLACK_THRESHOLD).collect();
        data.extend(pack_row(&pixels));
    }

    MonoBitmap {
        width,
        height,
        data,
    }
}

/// Stretch luma values linearly so the darkest becomes 0 and the lightest 255.
pub fn autocontrast(gray: &mut GrayImage) {
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if hi <= lo {
        return;
    }
    let range = (hi - lo) as f32;
    for p in gray.pixels_mut() {
        p[0] = (((p[0] - lo) as f32 / range) * 255.0).round() as u8;
    }
}

/// Scale luma values away from the image mean by `factor`.
pub fn enhance_contrast(gray: &mut GrayImage, factor: f32) {
    let count = (gray.width() * gray.height()) as usize;
    if count == 0 || (factor - 1.0).abs() < f32::EPSILON {
        return;
    }
    let sum: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    let mean = (sum as f32 / count as f32).round();
    for p in gray.pixels_mut() {
        let value = mean + factor * (p[0] as f32 - mean);
        p[0] = value.round().clamp(0.0, 255.0) as u8;
    }
}

/// Largest scale `<= requested` that keeps `width * scale` within `max_width`.
///
/// Never returns less than 1.
pub fn fit_scale(width: u32, requested: u32, max_width: u32) -> u32 {
    let mut scale = requested.max(1);
    while scale > 1 && width.saturating_mul(scale) > max_width {
        scale -= 1;
    }
    scale
}

/// Drop the blank columns on both sides. A blank bitmap is returned as is.
pub fn trim_columns(bitmap: &MonoBitmap) -> MonoBitmap {
    let Some((first, last)) = bitmap.ink_columns() else {
        return bitmap.clone();
    };
    if first == 0 && last + 1 == bitmap.width {
        return bitmap.clone();
    }
    let mut out = MonoBitmap::blank(last - first + 1, bitmap.height);
    for y in 0..bitmap.height {
        for x in first..=last {
            if bitmap.get(x, y) {
                out.set(x - first, y);
            }
        }
    }
    out
}

/// Left padding that centers a `width`-dot image on a print line made of a
/// `printable` span with `margin` blank dots on each side.
///
/// An image wider than the printable span (a full-paper calibration page)
/// is centered on the whole line instead, and is never padded past zero.
pub fn center_offset(width: u32, printable: u32, margin: u32) -> i32 {
    ((printable + 2 * margin).saturating_sub(width) / 2) as i32
}

/// Nearest-neighbor integer upscale.
pub fn upscale(bitmap: &MonoBitmap, scale: u32) -> MonoBitmap {
    if scale <= 1 {
        return bitmap.clone();
    }
    let mut out = MonoBitmap::blank(bitmap.width * scale, bitmap.height * scale);
    for y in 0..out.height {
        for x in 0..out.width {
            if bitmap.get(x / scale, y / scale) {
                out.set(x, y);
            }
        }
    }
    out
}

/// Shift the image horizontally by `offset` dots within a `max_width` print line.
///
/// Positive offsets pad white on the left; negative offsets trim columns off
/// the left. Content pushed past `max_width` is clipped.
pub fn shift_x(bitmap: &MonoBitmap, offset: i32, max_width: u32) -> MonoBitmap {
    if offset == 0 && bitmap.width <= max_width {
        return bitmap.clone();
    }
    let width = ((bitmap.width as i64 + offset as i64).max(1) as u32).min(max_width.max(1));
    let mut out = MonoBitmap::blank(width, bitmap.height);
    for y in 0..bitmap.height {
        for x in 0..bitmap.width {
            let nx = x as i64 + offset as i64;
            if nx >= 0 && (nx as u32) < width && bitmap.get(x, y) {
                out.set(nx as u32, y);
            }
        }
    }
    out
}

/// Drop rows beyond `max_rows`.
pub fn cap_height(mut bitmap: MonoBitmap, max_rows: u32) -> MonoBitmap {
    if bitmap.height > max_rows {
        let keep = bitmap.width_bytes() * max_rows as usize;
        bitmap.data.truncate(keep);
        bitmap.height = max_rows;
    }
    bitmap
}
