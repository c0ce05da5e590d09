//! # ESC/POS Control Commands
//!
//! Byte builders for the handful of ESC/POS control commands the receipt
//! pipeline issues around every image: initialize, feed, and cut.
//!
//! ## Escape Sequence Structure
//!
//! - Single byte: `LF`
//! - Two bytes: `ESC @`
//! - With a parameter: `GS V 0`
//!
//! ## Byte Order
//!
//! Multi-byte integers use **little-endian** encoding:
//! - `u16` value 0x1234 is sent as bytes `[0x34, 0x12]`

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
///
/// Prefixes the cutter and graphics commands (`GS V`, `GS v 0`, `GS ( L`).
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - Print and advance one line
pub const LF: u8 = 0x0A;

// ============================================================================
// INITIALIZATION
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Clears the print buffer and resets text modes, line spacing and
/// alignment. Sent at the start of every receipt so a half-written job from
/// a previous connection cannot leak into the next one.
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
///
/// ## Example
///
/// ```
/// use ntfy_printer::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

// ============================================================================
// PAPER FEED
// ============================================================================

/// Feed `lines` blank lines (one `LF` each).
///
/// Used after the image so the printed content clears the cutter blade.
pub fn feed_lines(lines: u8) -> Vec<u8> {
    vec![LF; lines as usize]
}

// ============================================================================
// CUTTER
// ============================================================================

/// # Full Cut (GS V 0)
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | GS V 0   |
/// | Hex     | 1D 56 00 |
#[inline]
pub fn cut_full() -> Vec<u8> {
    vec![GS, b'V', 0]
}

// ============================================================================
// HELPERS
// ============================================================================

/// Encode a u16 as little-endian bytes.
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

// ============================================================================
// TESTS
// ============================================================================
