//! # Message Sinks
//!
//! Where decoded messages go.
//!
//! | Sink | Effect |
//! |------|--------|
//! | [`PrinterSink`] | Prints on the receipt printer |
//! | [`PreviewSink`] | Writes `message-0001.png`, `message-0002.png`, ... to a directory |
//!
//! Delivery never fails from the listener's point of view; each sink logs
//! and absorbs its own errors.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::ReceiptError;
use crate::printer::connection::{PrintOutcome, PrinterConnection};
use crate::render::layout::LayoutRenderer;

/// Receives messages from the stream listener, one at a time, in order.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: &str);
}

/// Prints each message through a shared [`PrinterConnection`].
///
/// Printing blocks on USB I/O, so it runs on the blocking thread pool.
#[derive(Clone)]
pub struct PrinterSink {
    connection: Arc<Mutex<PrinterConnection>>,
}

impl PrinterSink {
    pub fn new(connection: Arc<Mutex<PrinterConnection>>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl MessageSink for PrinterSink {
    async fn deliver(&self, message: &str) {
        let connection = self.connection.clone();
        let message = message.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut connection = connection.lock().unwrap_or_else(|p| p.into_inner());
            connection.print(&message)
        })
        .await;

        match result {
            Ok(PrintOutcome::Printed) => info!("Message printed"),
            Ok(outcome) => debug!(?outcome, "Message not printed"),
            Err(e) => error!(error = %e, "Print task failed"),
        }
    }
}

/// Renders each message to a numbered PNG instead of printing it.
pub struct PreviewSink {
    renderer: LayoutRenderer,
    dir: PathBuf,
    count: AtomicUsize,
}

impl PreviewSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(renderer: LayoutRenderer, dir: impl Into<PathBuf>) -> Result<Self, ReceiptError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            renderer,
            dir,
            count: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl MessageSink for PreviewSink {
    async fn deliver(&self, message: &str) {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.dir.join(format!("message-{:04}.png", n));
        let renderer = self.renderer.clone();
        let message = message.to_string();

        let target = path.clone();
        let result = tokio::task::spawn_blocking(move || {
            renderer
                .render(&message)
                .save(&target)
                .map_err(|e| ReceiptError::Image(format!("Failed to save preview: {}", e)))
        })
        .await;

        match result {
            Ok(Ok(())) => info!(path = %path.display(), "Preview saved"),
            Ok(Err(e)) => error!(error = %e, "Preview failed"),
            Err(e) => error!(error = %e, "Preview task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backpressure::PauseFlag;
    use crate::printer::connection::{ConnectionState, PrintOptions};
    use crate::protocol::graphics::ImageEncoding;
    use crate::render::layout::LayoutConfig;
    use crate::transport::{DeviceOpener, PrinterDevice};

    struct NoPrinter;

    impl DeviceOpener for NoPrinter {
        fn open(&self) -> Result<Box<dyn PrinterDevice>, ReceiptError> {
            Err(ReceiptError::Device("unplugged".into()))
        }
    }

    struct Sink(Arc<Mutex<usize>>);

    impl PrinterDevice for Sink {
        fn write_raw(&mut self, _data: &[u8]) -> Result<(), ReceiptError> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }

        fn capabilities(&self) -> &[ImageEncoding] {
            &ImageEncoding::ALL
        }
    }

    struct SinkOpener(Arc<Mutex<usize>>);

    impl DeviceOpener for SinkOpener {
        fn open(&self) -> Result<Box<dyn PrinterDevice>, ReceiptError> {
            Ok(Box::new(Sink(self.0.clone())))
        }
    }

    fn connection(opener: Box<dyn DeviceOpener>) -> Arc<Mutex<PrinterConnection>> {
        Arc::new(Mutex::new(PrinterConnection::new(
            opener,
            LayoutRenderer::builtin(LayoutConfig::default()),
            PrintOptions::default(),
            PauseFlag::new(),
        )))
    }

    #[tokio::test]
    async fn test_printer_sink_prints() {
        let writes = Arc::new(Mutex::new(0));
        let conn = connection(Box::new(SinkOpener(writes.clone())));
        let sink = PrinterSink::new(conn.clone());

        sink.deliver("Lunch Time!").await;

        assert_eq!(*writes.lock().unwrap(), 4);
        assert_eq!(conn.lock().unwrap().state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_printer_sink_absorbs_missing_printer() {
        let conn = connection(Box::new(NoPrinter));
        let sink = PrinterSink::new(conn.clone());

        sink.deliver("hello").await;
        sink.deliver("again").await;

        assert_eq!(conn.lock().unwrap().state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_preview_sink_writes_numbered_pngs() {
        let dir = std::env::temp_dir().join(format!("preview-sink-{}", std::process::id()));
        let sink = PreviewSink::new(LayoutRenderer::builtin(LayoutConfig::default()), &dir).unwrap();

        sink.deliver("first").await;
        sink.deliver("second").await;

        let first = image::open(dir.join("message-0001.png")).unwrap();
        assert!(first.width() > 0);
        assert!(dir.join("message-0002.png").exists());
        assert!(!dir.join("message-0003.png").exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
