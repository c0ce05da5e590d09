//! # Agent
//!
//! Wires the components together and owns their lifetimes.
//!
//! ```text
//!                         CancellationToken
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!   BackpressureMonitor    StreamListener      shutdown_signal
//!            │                   │               (SIGINT/SIGTERM)
//!       PauseFlag ──────►   MessageSink
//!                                │
//!                      PrinterConnection / PNG preview
//! ```
//!
//! Startup order: printer connection first (a failed open is only a
//! warning), then the monitor and listener tasks. On cancellation each task
//! is given [`SHUTDOWN_GRACE`] to finish before it is aborted, then the
//! printer is closed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backpressure::{BackpressureMonitor, MemorySource, PauseFlag, ProcMeminfo};
use crate::config::AgentConfig;
use crate::error::ReceiptError;
use crate::listener::{MessageSink, PreviewSink, PrinterSink, StreamListener};
use crate::printer::{PrintOptions, PrinterConnection, PrinterProfile};
use crate::render::layout::{LayoutConfig, LayoutRenderer};
use crate::transport::UsbOpener;

/// How long each task gets to stop after cancellation.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Where messages end up.
#[derive(Debug, Clone)]
pub enum Output {
    /// USB receipt printer
    Printer,
    /// Numbered PNG files in a directory
    Preview(PathBuf),
}

/// Build a (disconnected) connection to the USB printer.
pub fn printer_connection(
    profile: &PrinterProfile,
    print: &PrintOptions,
    layout: &LayoutConfig,
    pause: PauseFlag,
) -> PrinterConnection {
    PrinterConnection::new(
        Box::new(UsbOpener::new(profile.clone())),
        LayoutRenderer::new(layout.clone()),
        print.clone(),
        pause,
    )
}

/// Run the agent until `cancel` fires.
pub async fn run(
    config: AgentConfig,
    output: Output,
    cancel: CancellationToken,
) -> Result<(), ReceiptError> {
    let pause = PauseFlag::new();

    let mut printer = None;
    let sink: Arc<dyn MessageSink> = match output {
        Output::Printer => {
            let mut connection =
                printer_connection(&config.profile, &config.print, &config.layout, pause.clone());
            let connection = tokio::task::spawn_blocking(move || {
                if !connection.connect() {
                    warn!("Printer not available, will retry when a message arrives");
                }
                connection
            })
            .await
            .map_err(|e| ReceiptError::Device(format!("Printer setup task failed: {}", e)))?;

            let connection = Arc::new(Mutex::new(connection));
            printer = Some(connection.clone());
            Arc::new(PrinterSink::new(connection))
        }
        Output::Preview(dir) => {
            let sink = PreviewSink::new(LayoutRenderer::new(config.layout.clone()), dir)?;
            info!(dir = %sink.dir().display(), "Preview mode, messages are rendered to PNG");
            Arc::new(sink)
        }
    };

    let monitor = BackpressureMonitor::new(
        ProcMeminfo::new(),
        config.marks,
        config.memory_interval,
        pause,
    );
    let listener = StreamListener::new(config.listener.clone(), sink)?;

    supervise(listener, monitor, cancel).await;

    if let Some(connection) = printer {
        close_printer(connection).await;
    }
    info!("Agent stopped");
    Ok(())
}

/// Release the printer on the blocking pool, even behind a poisoned lock.
async fn close_printer(connection: Arc<Mutex<PrinterConnection>>) {
    let closed = tokio::task::spawn_blocking(move || {
        connection.lock().unwrap_or_else(|p| p.into_inner()).close();
    })
    .await;
    if let Err(e) = closed {
        error!(error = %e, "Printer close task failed");
    }
}

/// Spawn the listener and monitor, wait for `cancel`, then join both.
pub async fn supervise<S>(
    listener: StreamListener,
    monitor: BackpressureMonitor<S>,
    cancel: CancellationToken,
) where
    S: MemorySource + 'static,
{
    let monitor_task = tokio::spawn(monitor.run(cancel.clone()));
    let listener_task = tokio::spawn(listener.run(cancel.clone()));

    cancel.cancelled().await;
    info!("Shutting down");

    join_bounded("listener", listener_task).await;
    join_bounded("monitor", monitor_task).await;
}

async fn join_bounded(name: &str, mut task: JoinHandle<()>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
        Ok(Ok(())) => debug!(task = name, "Task stopped"),
        Ok(Err(e)) => error!(task = name, error = %e, "Task failed"),
        Err(_) => {
            warn!(task = name, "Task did not stop in time, aborting");
            task.abort();
        }
    }
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backpressure::Hysteresis;
    use crate::listener::{ListenerConfig, ListenerState};
    use async_trait::async_trait;

    struct Discard;

    #[async_trait]
    impl MessageSink for Discard {
        async fn deliver(&self, _message: &str) {}
    }

    struct Idle;

    impl MemorySource for Idle {
        fn utilization(&mut self) -> Result<f64, ReceiptError> {
            Ok(10.0)
        }
    }

    #[tokio::test]
    async fn test_supervise_stops_both_tasks() {
        // Nothing listens on port 1, so the listener cycles through backoff.
        let config = ListenerConfig {
            reconnect_delay: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(200),
            ..ListenerConfig::new("http://127.0.0.1:1/topic/json")
        };
        let listener = StreamListener::new(config, Arc::new(Discard)).unwrap();
        let state = listener.subscribe();
        let monitor = BackpressureMonitor::new(
            Idle,
            Hysteresis::default(),
            Duration::from_millis(10),
            PauseFlag::new(),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervise(listener, monitor, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("supervise did not return")
            .unwrap();

        assert_eq!(*state.borrow(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn test_close_printer_survives_poisoned_lock() {
        let connection = Arc::new(Mutex::new(printer_connection(
            &PrinterProfile::default(),
            &PrintOptions::default(),
            &LayoutConfig::default(),
            PauseFlag::new(),
        )));
        let poisoner = connection.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the printer lock");
        })
        .join();
        assert!(connection.is_poisoned());

        tokio::time::timeout(SHUTDOWN_GRACE, close_printer(connection.clone()))
            .await
            .expect("close did not finish");
        let state = connection.lock().unwrap_or_else(|p| p.into_inner()).state();
        assert_eq!(state, crate::printer::ConnectionState::Disconnected);
    }
}
