//! # Memory Sources
//!
//! Utilization is `(MemTotal - MemAvailable) / MemTotal * 100`. Kernels
//! older than 3.14 have no `MemAvailable`; `MemFree + Buffers + Cached`
//! stands in for it there.

use std::path::PathBuf;

use crate::error::ReceiptError;

/// Something that can report memory utilization as a percentage (0..=100).
pub trait MemorySource: Send {
    fn utilization(&mut self) -> Result<f64, ReceiptError>;
}

/// Reads `/proc/meminfo` (or another file with the same format).
#[derive(Debug, Clone)]
pub struct ProcMeminfo {
    path: PathBuf,
}

impl ProcMeminfo {
    pub fn new() -> Self {
        Self::with_path("/proc/meminfo")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcMeminfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for ProcMeminfo {
    fn utilization(&mut self) -> Result<f64, ReceiptError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            ReceiptError::Memory(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        Ok(parse_meminfo(&text)?.utilization())
    }
}

/// The `/proc/meminfo` fields utilization is computed from, in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemoryInfo {
    /// Percentage of memory in use.
    pub fn utilization(&self) -> f64 {
        let used = self.total_kb.saturating_sub(self.available_kb);
        used as f64 / self.total_kb as f64 * 100.0
    }
}

/// Parse `/proc/meminfo` text.
///
/// ```
/// use ntfy_printer::backpressure::memory::parse_meminfo;
///
/// let info = parse_meminfo("MemTotal: 1000 kB\nMemAvailable: 250 kB\n").unwrap();
/// assert_eq!(info.utilization(), 75.0);
/// ```
pub fn parse_meminfo(text: &str) -> Result<MemoryInfo, ReceiptError> {
    let mut total = None;
    let mut available = None;
    let mut free = 0u64;
    let mut buffers = 0u64;
    let mut cached = 0u64;

    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(value) = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        match key.trim() {
            "MemTotal" => total = Some(value),
            "MemAvailable" => available = Some(value),
            "MemFree" => free = value,
            "Buffers" => buffers = value,
            "Cached" => cached = value,
            _ => {}
        }
    }

    let total_kb = match total {
        Some(0) | None => {
            return Err(ReceiptError::Memory(
                "MemTotal missing from meminfo".to_string(),
            ));
        }
        Some(t) => t,
    };
    let available_kb = available.unwrap_or(free + buffers + cached).min(total_kb);

    Ok(MemoryInfo {
        total_kb,
        available_kb,
    })
}
