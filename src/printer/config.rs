//! # Printer Configuration
//!
//! Hardware identity of the receipt printer and the geometry of the paper
//! loaded in it.
//!
//! ## Usage
//!
//! ```
//! use ntfy_printer::printer::{PaperGeometry, PrinterProfile};
//!
//! let profile = PrinterProfile::default();
//! let paper = PaperGeometry::default();
//! println!("{:04x}:{:04x} prints {} dots wide",
//!          profile.vendor_id,
//!          profile.product_id,
//!          paper.printable_width_dots(profile.dpi));
//! ```

use crate::protocol::graphics::ImageEncoding;

/// USB identity and capabilities of the printer.
///
/// ## Calculations
///
/// ```text
/// dots_per_mm = dpi / 25.4
///
/// For a 203 DPI head:
///   dots_per_mm ≈ 8
///   72mm printable ≈ 575 dots
/// ```
#[derive(Debug, Clone)]
pub struct PrinterProfile {
    /// Human-readable name for logs
    pub name: String,
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
    /// USB interface number to claim
    pub interface: u8,
    /// Bulk OUT endpoint used when the descriptor cannot be read
    pub out_endpoint: u8,
    /// Resolution in dots per inch
    pub dpi: u16,
    /// Image encodings the printer implements
    pub encodings: Vec<ImageEncoding>,
}

impl PrinterProfile {
    /// Generic 80mm ESC/POS USB receipt printer (0416:5011 family).
    pub fn generic_escpos() -> Self {
        Self {
            name: "ESC/POS USB printer".to_string(),
            vendor_id: 0x0416,
            product_id: 0x5011,
            interface: 0,
            out_endpoint: 0x01,
            dpi: 203,
            encodings: ImageEncoding::ALL.to_vec(),
        }
    }

    /// Calculate dots per millimeter
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        dots_per_mm(self.dpi)
    }
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self::generic_escpos()
    }
}

/// Paper roll geometry, all in millimeters.
///
/// ```text
/// ├─ margin ─┼──── printable ────┼─ margin ─┤
/// │          │                   │          │
/// ←───────────── paper width ──────────────→
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperGeometry {
    /// Roll width
    pub paper_width_mm: f32,
    /// Horizontal shift applied to every image (negative = left)
    pub x_offset_mm: f32,
    /// Unprintable margin on each side
    pub safe_margin_mm: f32,
    /// Optional cap on receipt length
    pub max_height_mm: Option<f32>,
}

impl Default for PaperGeometry {
    fn default() -> Self {
        Self {
            paper_width_mm: 80.0,
            x_offset_mm: 0.0,
            safe_margin_mm: 4.0,
            max_height_mm: None,
        }
    }
}

impl PaperGeometry {
    /// Printable width in millimeters.
    pub fn printable_width_mm(&self) -> f32 {
        (self.paper_width_mm - 2.0 * self.safe_margin_mm).max(0.0)
    }

    /// Printable width in dots at `dpi`.
    pub fn printable_width_dots(&self, dpi: u16) -> u32 {
        mm_to_dots(self.printable_width_mm(), dpi).max(8)
    }

    /// Paper width in dots at `dpi`.
    pub fn paper_width_dots(&self, dpi: u16) -> u32 {
        mm_to_dots(self.paper_width_mm, dpi).max(8)
    }

    /// Signed X offset in dots at `dpi`.
    pub fn x_offset_dots(&self, dpi: u16) -> i32 {
        (self.x_offset_mm * dots_per_mm(dpi)).round() as i32
    }

    /// Safe margin in dots at `dpi`.
    pub fn safe_margin_dots(&self, dpi: u16) -> u32 {
        mm_to_dots(self.safe_margin_mm, dpi)
    }

    /// Receipt length cap in dots at `dpi`, if any.
    pub fn max_height_dots(&self, dpi: u16) -> Option<u32> {
        self.max_height_mm.map(|mm| mm_to_dots(mm, dpi).max(1))
    }
}

#[inline]
fn dots_per_mm(dpi: u16) -> f32 {
    dpi as f32 / 25.4
}

/// Convert millimeters to dots, clamping negatives to zero.
#[inline]
pub fn mm_to_dots(mm: f32, dpi: u16) -> u32 {
    (mm.max(0.0) * dots_per_mm(dpi)).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = PrinterProfile::default();
        assert_eq!(profile.vendor_id, 0x0416);
        assert_eq!(profile.product_id, 0x5011);
        assert!((profile.dots_per_mm() - 8.0).abs() < 0.1);
        assert_eq!(profile.encodings.len(), 3);
    }

    #[test]
    fn test_printable_width_80mm() {
        let paper = PaperGeometry::default();
        assert_eq!(paper.printable_width_mm(), 72.0);
        assert_eq!(paper.printable_width_dots(203), 575);
        assert_eq!(paper.paper_width_dots(203), 639);
    }

    #[test]
    fn test_x_offset_is_signed() {
        let paper = PaperGeometry {
            x_offset_mm: -2.0,
            ..PaperGeometry::default()
        };
        assert_eq!(paper.x_offset_dots(203), -16);
    }

    #[test]
    fn test_max_height() {
        let paper = PaperGeometry::default();
        assert_eq!(paper.max_height_dots(203), None);
        let capped = PaperGeometry {
            max_height_mm: Some(100.0),
            ..paper
        };
        assert_eq!(capped.max_height_dots(203), Some(799));
    }

    #[test]
    fn test_mm_to_dots_clamps_negative() {
        assert_eq!(mm_to_dots(-3.0, 203), 0);
    }
}
