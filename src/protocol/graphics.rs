//! # ESC/POS Image Commands
//!
//! Three ways of getting a 1-bit bitmap onto an ESC/POS printer. Printers
//! differ in which of them they implement, so the printer connection picks
//! one at connect time (see [`ImageEncoding`]) and sticks with it.
//!
//! | Encoding | Command | Notes |
//! |----------|---------|-------|
//! | `bitImageRaster` | GS v 0 | Row-major raster, widest support |
//! | `graphics` | GS ( L fn 112 / fn 50 | Store in buffer, then print |
//! | `bitImageColumn` | ESC * 33 | 24-dot vertical bands, oldest printers |
//!
//! ## Bit Packing
//!
//! Input data is always packed row by row, one bit per dot:
//! - Bit 7 (MSB) = leftmost dot
//! - 1 = black (print), 0 = white
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! ```

use std::fmt;
use std::str::FromStr;

use super::commands::{ESC, GS, LF, u16_le};
use crate::error::ReceiptError;

/// Maximum rows per `GS v 0` fragment.
///
/// Small printers stall or print garbage when a single raster command
/// exceeds their receive buffer.
pub const RASTER_FRAGMENT_ROWS: usize = 960;

/// Maximum payload of one `GS ( L` command (pL/pH is 16 bits).
const GRAPHICS_MAX_PAYLOAD: usize = 65_535;

/// Header bytes counted in the `GS ( L` store length (m fn a bx by c xL xH yL yH).
const GRAPHICS_HEADER_LEN: usize = 10;

/// Image transfer method understood by the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageEncoding {
    /// `GS v 0` raster bit image
    BitImageRaster,
    /// `GS ( L` graphics buffer store and print
    Graphics,
    /// `ESC *` 24-dot column bit image
    BitImageColumn,
}

impl ImageEncoding {
    /// All encodings, in default preference order.
    pub const ALL: [ImageEncoding; 3] = [
        ImageEncoding::BitImageRaster,
        ImageEncoding::Graphics,
        ImageEncoding::BitImageColumn,
    ];

    /// Configuration name of this encoding.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BitImageRaster => "bitImageRaster",
            Self::Graphics => "graphics",
            Self::BitImageColumn => "bitImageColumn",
        }
    }

    /// Build the printer commands for a packed 1-bit image.
    pub fn encode(&self, width_dots: u16, height: u16, data: &[u8]) -> Vec<u8> {
        match self {
            Self::BitImageRaster => raster(width_dots, height, data),
            Self::Graphics => graphics(width_dots, height, data),
            Self::BitImageColumn => column(width_dots, height, data),
        }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageEncoding {
    type Err = ReceiptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bitImageRaster" | "raster" => Ok(Self::BitImageRaster),
            "graphics" => Ok(Self::Graphics),
            "bitImageColumn" | "column" => Ok(Self::BitImageColumn),
            other => Err(ReceiptError::Config(format!(
                "Unknown image encoding '{}'. Expected bitImageRaster, graphics or bitImageColumn",
                other
            ))),
        }
    }
}

/// Parse a comma-separated encoding preference list, ignoring blank entries.
pub fn parse_encoding_list(list: &str) -> Result<Vec<ImageEncoding>, ReceiptError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ImageEncoding::from_str)
        .collect()
}

// ============================================================================
// RASTER BIT IMAGE (GS v 0)
// ============================================================================

/// # Print Raster Bit Image (GS v 0 m xL xH yL yH d1...dk)
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS v 0 m xL xH yL yH d1...dk |
/// | Hex     | 1D 76 30 m xL xH yL yH d1...dk |
///
/// ## Parameters
///
/// - `m`: 0 = normal density
/// - `xL, xH`: Width in **bytes**
/// - `yL, yH`: Height in dots
///
/// Images taller than [`RASTER_FRAGMENT_ROWS`] are split into several
/// consecutive commands.
///
/// ## Example
///
/// ```
/// use ntfy_printer::protocol::graphics;
///
/// let data = vec![0xFF; 48 * 10];
/// let cmd = graphics::raster(384, 10, &data);
///
/// assert_eq!(&cmd[0..4], &[0x1D, 0x76, 0x30, 0x00]);
/// assert_eq!(cmd[4], 48); // xL
/// assert_eq!(cmd[6], 10); // yL
/// assert_eq!(cmd.len(), 8 + 48 * 10);
/// ```
pub fn raster(width_dots: u16, height: u16, data: &[u8]) -> Vec<u8> {
    let width_bytes = width_dots.div_ceil(8) as usize;
    debug_assert_eq!(
        data.len(),
        width_bytes * height as usize,
        "Raster data length mismatch"
    );

    let mut cmd = Vec::with_capacity(data.len() + 8 * (1 + data.len() / RASTER_FRAGMENT_ROWS));
    for fragment in data.chunks(width_bytes * RASTER_FRAGMENT_ROWS) {
        let rows = (fragment.len() / width_bytes) as u16;
        let [xl, xh] = u16_le(width_bytes as u16);
        let [yl, yh] = u16_le(rows);
        cmd.extend_from_slice(&[GS, b'v', b'0', 0, xl, xh, yl, yh]);
        cmd.extend_from_slice(fragment);
    }
    cmd
}

// ============================================================================
// GRAPHICS BUFFER (GS ( L)
// ============================================================================

/// # Store and Print Graphics Data (GS ( L, fn 112 then fn 50)
///
/// Store: `GS ( L pL pH 48 112 48 bx by c xL xH yL yH d1...dk`
/// Print: `GS ( L 2 0 48 50`
///
/// - `pL, pH`: payload length = k + 10
/// - `bx, by`: 1 (no scaling)
/// - `c`: 49 (first color)
/// - `xL, xH`: width in **dots**; `yL, yH`: height in dots
///
/// The 16-bit length limits a single store, so tall images go out as
/// horizontal strips, each stored and printed in turn.
///
/// ```
/// use ntfy_printer::protocol::graphics;
///
/// let cmd = graphics::graphics(8, 2, &[0xFF, 0x00]);
/// assert_eq!(&cmd[0..3], &[0x1D, 0x28, 0x4C]);
/// assert_eq!(&cmd[3..5], &[12, 0]); // 2 data bytes + 10
/// assert_eq!(&cmd[cmd.len() - 7..], &[0x1D, 0x28, 0x4C, 2, 0, 48, 50]);
/// ```
pub fn graphics(width_dots: u16, height: u16, data: &[u8]) -> Vec<u8> {
    let width_bytes = width_dots.div_ceil(8) as usize;
    debug_assert_eq!(data.len(), width_bytes * height as usize);

    let rows_per_strip = ((GRAPHICS_MAX_PAYLOAD - GRAPHICS_HEADER_LEN) / width_bytes.max(1)).max(1);
    let mut cmd = Vec::with_capacity(data.len() + 24);

    for strip in data.chunks(width_bytes * rows_per_strip) {
        let rows = (strip.len() / width_bytes) as u16;
        let [pl, ph] = u16_le((strip.len() + GRAPHICS_HEADER_LEN) as u16);
        let [xl, xh] = u16_le(width_dots);
        let [yl, yh] = u16_le(rows);

        cmd.extend_from_slice(&[GS, b'(', b'L', pl, ph, 48, 112, 48, 1, 1, 49, xl, xh, yl, yh]);
        cmd.extend_from_slice(strip);
        cmd.extend_from_slice(&[GS, b'(', b'L', 2, 0, 48, 50]);
    }
    cmd
}

// ============================================================================
// COLUMN BIT IMAGE (ESC *)
// ============================================================================

/// # 24-Dot Column Bit Image (ESC * 33 nL nH d1...dk)
///
/// The image is cut into 24-row bands. Within a band every column is sent
/// as 3 bytes, top to bottom, MSB = top dot. Line spacing is set to 24 dots
/// (`ESC 3 24`) so bands butt together, and restored (`ESC 2`) at the end.
///
/// ```text
///  band 0 ┌──────────────┐  col0: [b0 b1 b2]  col1: [b0 b1 b2] ...
///         │ 24 rows      │
///  band 1 ├──────────────┤
/// ```
pub fn column(width_dots: u16, height: u16, data: &[u8]) -> Vec<u8> {
    let width = width_dots as usize;
    let width_bytes = width.div_ceil(8);
    let height = height as usize;
    debug_assert_eq!(data.len(), width_bytes * height);

    let dot = |x: usize, y: usize| -> bool {
        y < height && (data[y * width_bytes + x / 8] >> (7 - (x % 8))) & 1 == 1
    };

    let [nl, nh] = u16_le(width_dots);
    let mut cmd = vec![ESC, b'3', 24];

    for band_top in (0..height).step_by(24) {
        cmd.extend_from_slice(&[ESC, b'*', 33, nl, nh]);
        for x in 0..width {
            for byte in 0..3 {
                let mut value = 0u8;
                for bit in 0..8 {
                    if dot(x, band_top + byte * 8 + bit) {
                        value |= 0x80 >> bit;
                    }
                }
                cmd.push(value);
            }
        }
        cmd.push(LF);
    }

    cmd.extend_from_slice(&[ESC, b'2']);
    cmd
}

// ============================================================================
// TESTS
// ============================================================================
