//! # ntfy-printer - Push Notifications on Paper
//!
//! ntfy-printer subscribes to an [ntfy](https://ntfy.sh) topic and prints
//! every message on a USB ESC/POS thermal receipt printer as a large-print
//! receipt. It provides:
//!
//! - **Layout rendering**: star, word-wrapped bold lines, divider, date stamp
//! - **Protocol implementation**: ESC/POS command and image builders
//! - **Transport**: USB bulk transfers via libusb
//! - **Backpressure**: pauses printing while host memory is tight
//! - **Stream listener**: reconnecting ntfy JSON stream consumer
//!
//! ## Quick Start
//!
//! ```no_run
//! use ntfy_printer::{
//!     backpressure::PauseFlag,
//!     printer::{PrintOptions, PrintOutcome, PrinterConnection, PrinterProfile},
//!     render::{LayoutConfig, LayoutRenderer},
//!     transport::UsbOpener,
//! };
//!
//! let mut printer = PrinterConnection::new(
//!     Box::new(UsbOpener::new(PrinterProfile::default())),
//!     LayoutRenderer::new(LayoutConfig::default()),
//!     PrintOptions::default(),
//!     PauseFlag::new(),
//! );
//!
//! printer.connect();
//! assert_eq!(printer.print("Lunch Time!"), PrintOutcome::Printed);
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`render`] | Receipt layout and 1-bit conversion |
//! | [`protocol`] | ESC/POS command builders |
//! | [`transport`] | Printer device trait and USB backend |
//! | [`printer`] | Printer profile and connection state machine |
//! | [`backpressure`] | Memory pressure monitor |
//! | [`listener`] | ntfy stream listener and message sinks |
//! | [`agent`] | Component wiring, signals and shutdown |
//! | [`config`] | CLI/environment configuration |
//! | [`logging`] | Log subscriber setup |
//! | [`error`] | Error types |
//!
//! ## Supported Printers
//!
//! Generic 80mm ESC/POS USB printers (203 DPI); the default USB id is
//! `0416:5011`. Anything implementing [`transport::PrinterDevice`] can be
//! driven by the same pipeline.

pub mod agent;
pub mod backpressure;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod transport;

// Re-exports for convenience
pub use error::ReceiptError;
pub use printer::{PrinterConnection, PrinterProfile};
pub use transport::UsbPrinter;
