//! # Backpressure
//!
//! Pauses printing while the host is short on memory.
//!
//! ```text
//!   /proc/meminfo ──sample──► BackpressureMonitor ──store──► PauseFlag
//!                               (every 5 s)                     │
//!                                                      load     ▼
//!                                               PrinterConnection::print
//! ```
//!
//! The flag switches with hysteresis: it sets at or above the high-water
//! mark and clears only at or below the low-water mark. Utilization between
//! the two leaves it where it is.
//!
//! ## Modules
//!
//! - [`memory`]: Memory utilization sources
//! - [`monitor`]: The sampling task and hysteresis rule

pub mod memory;
pub mod monitor;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use memory::{MemorySource, ProcMeminfo};
pub use monitor::{BackpressureMonitor, Hysteresis};

/// Shared paused/running flag.
///
/// Written by the monitor, read by the printer connection. Cloning shares the
/// same flag.
#[derive(Debug, Clone, Default)]
pub struct PauseFlag(Arc<AtomicBool>);

impl PauseFlag {
    /// A new, unpaused flag.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, paused: bool) {
        self.0.store(paused, Ordering::Release);
    }
}
