//! # Error Types
//!
//! This module defines error types used throughout the ntfy-printer library.
//!
//! Most variants are recoverable and never leave the component that raised
//! them: the stream listener backs off on [`ReceiptError::Transport`], the
//! printer connection reconnects on [`ReceiptError::Device`], and the
//! backpressure monitor skips a tick on [`ReceiptError::Memory`]. Only
//! [`ReceiptError::Config`] is fatal, and only at startup.

use thiserror::Error;

/// Main error type for ntfy-printer operations
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// Stream connection, read, or HTTP status errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Printer open, claim, or write errors
    #[error("Device error: {0}")]
    Device(String),

    /// A stream line that is not a JSON object
    #[error("Decode error: {0}")]
    Decode(String),

    /// Memory utilization could not be sampled
    #[error("Memory sampling error: {0}")]
    Memory(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Image processing error
    #[error("Image error: {0}")]
    Image(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
