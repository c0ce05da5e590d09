//! # ESC/POS Protocol
//!
//! Low-level command builders for ESC/POS thermal receipt printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: Control commands (init, feed, cut)
//! - [`graphics`]: Image commands and the [`ImageEncoding`](graphics::ImageEncoding) choice
//!
//! ## Usage Example
//!
//! ```
//! use ntfy_printer::protocol::{commands, graphics::ImageEncoding};
//!
//! let image = vec![0xAA; 48 * 24]; // 384 x 24 vertical stripes
//!
//! let mut data = Vec::new();
//! data.extend(commands::init());
//! data.extend(ImageEncoding::BitImageRaster.encode(384, 24, &image));
//! data.extend(commands::feed_lines(4));
//! data.extend(commands::cut_full());
//! ```

pub mod commands;
pub mod graphics;
