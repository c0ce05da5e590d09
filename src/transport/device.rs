//! # Printer Device Abstraction
//!
//! The printer connection talks to hardware only through these two traits,
//! so the connection state machine can be exercised without a printer on
//! the bus.
//!
//! - [`PrinterDevice`]: an open device. Implementors supply raw byte writes
//!   and their image capabilities; the ESC/POS operations (initialize,
//!   write image, feed, cut) are provided on top.
//! - [`DeviceOpener`]: how to (re)open a device.

use crate::error::ReceiptError;
use crate::protocol::commands;
use crate::protocol::graphics::ImageEncoding;
use crate::render::mono::MonoBitmap;

/// An open printer.
pub trait PrinterDevice: Send {
    /// Write raw bytes, blocking until the device accepted all of them.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), ReceiptError>;

    /// Image encodings this device implements.
    fn capabilities(&self) -> &[ImageEncoding];

    /// Reset the printer (ESC @).
    fn initialize(&mut self) -> Result<(), ReceiptError> {
        self.write_raw(&commands::init())
    }

    /// Print a 1-bit image with the given encoding.
    fn write_image(
        &mut self,
        bitmap: &MonoBitmap,
        encoding: ImageEncoding,
    ) -> Result<(), ReceiptError> {
        let width = u16::try_from(bitmap.width)
            .map_err(|_| ReceiptError::Image(format!("Image too wide: {} dots", bitmap.width)))?;
        let height = u16::try_from(bitmap.height)
            .map_err(|_| ReceiptError::Image(format!("Image too tall: {} rows", bitmap.height)))?;
        self.write_raw(&encoding.encode(width, height, &bitmap.data))
    }

    /// Feed `lines` blank lines.
    fn feed(&mut self, lines: u8) -> Result<(), ReceiptError> {
        self.write_raw(&commands::feed_lines(lines))
    }

    /// Full cut.
    fn cut(&mut self) -> Result<(), ReceiptError> {
        self.write_raw(&commands::cut_full())
    }
}

/// Opens printer devices.
pub trait DeviceOpener: Send {
    fn open(&self) -> Result<Box<dyn PrinterDevice>, ReceiptError>;
}

/// Pick the image encoding to use for a freshly opened device.
///
/// Returns the first entry of `preferred` the device supports, else the
/// device's own first capability, else `None`.
///
/// ```
/// use ntfy_printer::protocol::graphics::ImageEncoding::*;
/// use ntfy_printer::transport::negotiate_encoding;
///
/// assert_eq!(negotiate_encoding(&[Graphics, BitImageRaster], &[BitImageRaster]), Some(BitImageRaster));
/// assert_eq!(negotiate_encoding(&[Graphics], &[BitImageColumn]), Some(BitImageColumn));
/// assert_eq!(negotiate_encoding(&[Graphics], &[]), None);
/// ```
pub fn negotiate_encoding(
    preferred: &[ImageEncoding],
    supported: &[ImageEncoding],
) -> Option<ImageEncoding> {
    preferred
        .iter()
        .copied()
        .find(|encoding| supported.contains(encoding))
        .or_else(|| supported.first().copied())
}
