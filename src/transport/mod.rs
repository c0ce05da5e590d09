//! # Printer Transport Layer
//!
//! How bytes reach the printer.
//!
//! ## Available Transports
//!
//! - [`usb`]: USB bulk transfers via libusb
//!
//! Anything implementing [`PrinterDevice`] can stand in for the hardware.

pub mod device;
pub mod usb;

pub use device::{DeviceOpener, PrinterDevice, negotiate_encoding};
pub use usb::{UsbOpener, UsbPrinter};
