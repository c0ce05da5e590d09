//! # Rendering Module
//!
//! Everything between a message string and the dots sent to the printer.
//!
//! ## Modules
//!
//! - [`text`]: Truncation, word wrap and line cap
//! - [`fonts`]: TrueType faces with a built-in bitmap fallback
//! - [`symbol`]: The star drawn at the top of every receipt
//! - [`layout`]: The receipt layout renderer
//! - [`mono`]: 1-bit conversion, upscale and paper geometry adjustments
//! - [`calibration`]: Calibration grid and alignment test images
//!
//! ## Usage Example
//!
//! ```
//! use ntfy_printer::render::layout::{LayoutConfig, LayoutRenderer};
//! use ntfy_printer::render::mono;
//!
//! let renderer = LayoutRenderer::builtin(LayoutConfig::default());
//! let image = renderer.render("Lunch Time!");
//!
//! let bitmap = mono::to_mono(&image, 1.5);
//! assert_eq!(bitmap.width, image.width());
//! ```

pub mod calibration;
pub mod fonts;
pub mod layout;
pub mod mono;
pub mod symbol;
pub mod text;

pub use layout::{LayoutConfig, LayoutRenderer};
pub use mono::MonoBitmap;
