//! Memory sampling task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::PauseFlag;
use super::memory::MemorySource;
use crate::error::ReceiptError;

/// High/low water marks in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresis {
    pub high: f64,
    pub low: f64,
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self {
            high: 80.0,
            low: 70.0,
        }
    }
}

impl Hysteresis {
    /// Build and validate a pair of water marks.
    pub fn new(high: f64, low: f64) -> Result<Self, ReceiptError> {
        let marks = Self { high, low };
        marks.validate()?;
        Ok(marks)
    }

    pub fn validate(&self) -> Result<(), ReceiptError> {
        for (name, value) in [("pause", self.high), ("resume", self.low)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ReceiptError::Config(format!(
                    "Memory {} percent must be within 0..=100, got {}",
                    name, value
                )));
            }
        }
        if self.low > self.high {
            return Err(ReceiptError::Config(format!(
                "Memory resume percent ({}) must not exceed pause percent ({})",
                self.low, self.high
            )));
        }
        Ok(())
    }

    /// Decide a transition for one sample.
    ///
    /// `Some(true)` means pause, `Some(false)` means resume, `None` means
    /// keep the current state.
    ///
    /// ```
    /// use ntfy_printer::backpressure::Hysteresis;
    ///
    /// let marks = Hysteresis::default();
    /// assert_eq!(marks.evaluate(false, 85.0), Some(true));
    /// assert_eq!(marks.evaluate(true, 75.0), None);
    /// assert_eq!(marks.evaluate(true, 68.0), Some(false));
    /// ```
    pub fn evaluate(&self, paused: bool, utilization: f64) -> Option<bool> {
        if !paused && utilization >= self.high {
            Some(true)
        } else if paused && utilization <= self.low {
            Some(false)
        } else {
            None
        }
    }
}

/// Periodically samples a [`MemorySource`] and drives a [`PauseFlag`].
///
/// The source is read on tokio's blocking pool.
pub struct BackpressureMonitor<S: MemorySource> {
    source: Arc<Mutex<S>>,
    marks: Hysteresis,
    interval: Duration,
    flag: PauseFlag,
}

impl<S: MemorySource + 'static> BackpressureMonitor<S> {
    pub fn new(source: S, marks: Hysteresis, interval: Duration, flag: PauseFlag) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            marks,
            interval,
            flag,
        }
    }

    /// Take one sample and apply the hysteresis rule.
    pub async fn sample(&mut self) -> Option<bool> {
        let source = self.source.clone();
        let reading = tokio::task::spawn_blocking(move || {
            source.lock().unwrap_or_else(|p| p.into_inner()).utilization()
        })
        .await
        .unwrap_or_else(|e| Err(ReceiptError::Memory(format!("Sampling task failed: {}", e))));
        self.apply(reading)
    }

    /// Apply one reading to the flag.
    ///
    /// Returns the transition that was applied, if any. Sampling failures are
    /// logged and leave the flag untouched.
    pub fn apply(&mut self, reading: Result<f64, ReceiptError>) -> Option<bool> {
        let utilization = match reading {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "Memory sample failed, skipping");
                return None;
            }
        };

        let paused = self.flag.is_paused();
        let transition = self.marks.evaluate(paused, utilization);
        match transition {
            Some(true) => {
                self.flag.set(true);
                warn!(
                    utilization,
                    high = self.marks.high,
                    "Memory pressure high, pausing printing"
                );
            }
            Some(false) => {
                self.flag.set(false);
                info!(
                    utilization,
                    low = self.marks.low,
                    "Memory pressure relieved, resuming printing"
                );
            }
            None => {
                debug!(utilization, paused, "Memory sample");
            }
        }
        transition
    }

    /// Sample until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            high = self.marks.high,
            low = self.marks.low,
            interval_secs = self.interval.as_secs_f64(),
            "Backpressure monitor started"
        );
        loop {
            self.sample().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Backpressure monitor stopped");
    }
}
