//! # Printer Module
//!
//! The printer's hardware profile and the connection that drives it.
//!
//! ## Modules
//!
//! - [`config`]: USB identity, resolution and paper geometry
//! - [`connection`]: Connection lifecycle and the print pipeline

pub mod config;
pub mod connection;

pub use config::{PaperGeometry, PrinterProfile};
pub use connection::{ConnectionState, PrintOptions, PrintOutcome, PrinterConnection};
