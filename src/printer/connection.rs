//! # Printer Connection
//!
//! Owns the printer device and turns messages into printed receipts.
//!
//! ## States
//!
//! ```text
//!                 connect() ok
//!  Disconnected ───────────────► Connected
//!       ▲                            │
//!       └──── write error ───────────┘
//!             (then one reconnect attempt)
//!
//!  Paused: reported whenever the pause flag is set, regardless of the device.
//! ```
//!
//! ## Print Pipeline
//!
//! ```text
//! message → LayoutRenderer → RgbImage → to_mono → trim → upscale → center + x offset → height cap
//!                                                                                      │
//!              USB ◄── ESC @ · image (negotiated encoding) · LF×n · GS V 0
//! ```
//!
//! Delivery is at most once. A message that arrives while paused or
//! disconnected is dropped. A message whose write fails is not retried.

use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::config::PaperGeometry;
use crate::backpressure::PauseFlag;
use crate::error::ReceiptError;
use crate::protocol::graphics::ImageEncoding;
use crate::render::layout::LayoutRenderer;
use crate::render::mono::{self, MonoBitmap};
use crate::transport::{DeviceOpener, PrinterDevice, negotiate_encoding};

/// Reported connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Paused,
}

/// Result of one print request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintOutcome {
    Printed,
    DroppedPaused,
    DroppedDisconnected,
    Failed,
}

/// How rendered images are turned into dots.
#[derive(Debug, Clone)]
pub struct PrintOptions {
    /// Print head resolution
    pub dpi: u16,
    /// Paper roll geometry
    pub paper: PaperGeometry,
    /// Requested nearest-neighbor upscale factor
    pub upscale: u32,
    /// Blank lines fed before the cut
    pub feed_lines: u8,
    /// Contrast factor applied after autocontrast
    pub contrast: f32,
    /// Image encodings in order of preference
    pub encodings: Vec<ImageEncoding>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            dpi: 203,
            paper: PaperGeometry::default(),
            upscale: 2,
            feed_lines: 4,
            contrast: 1.5,
            encodings: ImageEncoding::ALL.to_vec(),
        }
    }
}

struct ConnectedDevice {
    device: Box<dyn PrinterDevice>,
    encoding: ImageEncoding,
}

pub struct PrinterConnection {
    opener: Box<dyn DeviceOpener>,
    renderer: LayoutRenderer,
    options: PrintOptions,
    pause: PauseFlag,
    device: Option<ConnectedDevice>,
}

impl PrinterConnection {
    /// Create a disconnected connection. Call [`connect`](Self::connect) to open the device.
    pub fn new(
        opener: Box<dyn DeviceOpener>,
        renderer: LayoutRenderer,
        options: PrintOptions,
        pause: PauseFlag,
    ) -> Self {
        Self {
            opener,
            renderer,
            options,
            pause,
            device: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.pause.is_paused() {
            ConnectionState::Paused
        } else if self.device.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// The image encoding negotiated for the open device.
    pub fn encoding(&self) -> Option<ImageEncoding> {
        self.device.as_ref().map(|d| d.encoding)
    }

    pub fn options(&self) -> &PrintOptions {
        &self.options
    }

    /// (Re)open the device.
    ///
    /// Any open device is closed first. Returns `false` and stays
    /// disconnected if the device cannot be opened or shares no image
    /// encoding with us.
    pub fn connect(&mut self) -> bool {
        self.close();

        let device = match self.opener.open() {
            Ok(device) => device,
            Err(e) => {
                warn!(error = %e, "Printer connection failed");
                return false;
            }
        };

        let Some(encoding) = negotiate_encoding(&self.options.encodings, device.capabilities())
        else {
            error!("Printer supports no image encoding");
            return false;
        };

        info!(encoding = %encoding, "Printer connected");
        self.device = Some(ConnectedDevice { device, encoding });
        true
    }

    /// Drop the device, releasing it.
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            debug!("Printer closed");
        }
    }

    /// Render and print one message.
    pub fn print(&mut self, message: &str) -> PrintOutcome {
        if let Some(dropped) = self.admit() {
            return dropped;
        }
        let result = self.render_and_write(message);
        reclaim_memory();
        self.finish(result)
    }

    /// Print a pre-rendered image through the same pipeline.
    pub fn print_image(&mut self, image: &RgbImage) -> PrintOutcome {
        if let Some(dropped) = self.admit() {
            return dropped;
        }
        let result = self.write_receipt(image);
        reclaim_memory();
        self.finish(result)
    }

    /// Convert a rendered image into the bitmap that will be printed.
    pub fn prepare_bitmap(&self, image: &RgbImage) -> MonoBitmap {
        let opts = &self.options;
        let printable = opts.paper.printable_width_dots(opts.dpi);
        let paper = opts.paper.paper_width_dots(opts.dpi).max(printable);

        let margin = opts.paper.safe_margin_dots(opts.dpi);

        let bitmap = mono::trim_columns(&mono::to_mono(image, opts.contrast));
        let scale = mono::fit_scale(bitmap.width, opts.upscale, printable);
        let bitmap = mono::upscale(&bitmap, scale);
        let left = mono::center_offset(bitmap.width, printable, margin);
        let bitmap = mono::shift_x(&bitmap, left + opts.paper.x_offset_dots(opts.dpi), paper);
        match opts.paper.max_height_dots(opts.dpi) {
            Some(max_rows) => mono::cap_height(bitmap, max_rows),
            None => bitmap,
        }
    }

    /// Gate a print request on the pause flag and the device.
    fn admit(&mut self) -> Option<PrintOutcome> {
        if self.pause.is_paused() {
            info!("Printing paused by memory pressure, dropping message");
            return Some(PrintOutcome::DroppedPaused);
        }
        if self.device.is_none() && !self.connect() {
            warn!("Printer not connected, dropping message");
            return Some(PrintOutcome::DroppedDisconnected);
        }
        None
    }

    fn render_and_write(&mut self, message: &str) -> Result<(), ReceiptError> {
        let image = self.renderer.render(message);
        self.write_receipt(&image)
    }

    fn write_receipt(&mut self, image: &RgbImage) -> Result<(), ReceiptError> {
        let bitmap = self.prepare_bitmap(image);
        let feed = self.options.feed_lines;
        let connected = self
            .device
            .as_mut()
            .ok_or_else(|| ReceiptError::Device("Printer not connected".to_string()))?;

        debug!(
            width = bitmap.width,
            height = bitmap.height,
            encoding = %connected.encoding,
            "Printing receipt"
        );
        connected.device.initialize()?;
        connected.device.write_image(&bitmap, connected.encoding)?;
        connected.device.feed(feed)?;
        connected.device.cut()
    }

    fn finish(&mut self, result: Result<(), ReceiptError>) -> PrintOutcome {
        match result {
            Ok(()) => PrintOutcome::Printed,
            Err(e) => {
                error!(error = %e, "Print failed, message dropped");
                self.device = None;
                if self.connect() {
                    info!("Printer reconnected after failure");
                }
                PrintOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for PrinterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterConnection")
            .field("state", &self.state())
            .field("encoding", &self.encoding())
            .field("options", &self.options)
            .finish()
    }
}

/// Return freed heap pages to the OS.
///
/// Receipt bitmaps are large and short-lived; glibc otherwise keeps the
/// freed arenas mapped.
pub fn reclaim_memory() {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::layout::LayoutConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Shared record of what fake devices saw.
    #[derive(Default)]
    struct Log {
        opens: AtomicUsize,
        writes: Mutex<Vec<Vec<u8>>>,
    }

    struct FakeDevice {
        log: Arc<Log>,
        capabilities: Vec<ImageEncoding>,
        fail_writes: bool,
    }

    impl PrinterDevice for FakeDevice {
        fn write_raw(&mut self, data: &[u8]) -> Result<(), ReceiptError> {
            if self.fail_writes {
                return Err(ReceiptError::Device("broken pipe".into()));
            }
            self.log.writes.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        fn capabilities(&self) -> &[ImageEncoding] {
            &self.capabilities
        }
    }

    struct FakeOpener {
        log: Arc<Log>,
        capabilities: Vec<ImageEncoding>,
        /// Opens at or after this index fail
        fail_from: usize,
        /// Devices opened before this index fail every write
        broken_until: usize,
    }

    impl DeviceOpener for FakeOpener {
        fn open(&self) -> Result<Box<dyn PrinterDevice>, ReceiptError> {
            let n = self.log.opens.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_from {
                return Err(ReceiptError::Device("no such device".into()));
            }
            Ok(Box::new(FakeDevice {
                log: self.log.clone(),
                capabilities: self.capabilities.clone(),
                fail_writes: n < self.broken_until,
            }))
        }
    }

    fn connection(opener: FakeOpener, pause: PauseFlag) -> PrinterConnection {
        PrinterConnection::new(
            Box::new(opener),
            LayoutRenderer::builtin(LayoutConfig::default()),
            PrintOptions::default(),
            pause,
        )
    }

    fn opener(log: &Arc<Log>) -> FakeOpener {
        FakeOpener {
            log: log.clone(),
            capabilities: ImageEncoding::ALL.to_vec(),
            fail_from: usize::MAX,
            broken_until: 0,
        }
    }

    #[test]
    fn test_print_writes_full_receipt() {
        let log = Arc::new(Log::default());
        let mut conn = connection(opener(&log), PauseFlag::new());

        assert_eq!(conn.print("Lunch Time!"), PrintOutcome::Printed);
        assert_eq!(conn.state(), ConnectionState::Connected);

        let writes = log.writes.lock().unwrap();
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[0], vec![0x1B, 0x40]);
        assert_eq!(&writes[1][0..3], &[0x1D, 0x76, 0x30]);
        assert_eq!(writes[2], vec![0x0A; 4]);
        assert_eq!(writes[3], vec![0x1D, 0x56, 0x00]);
    }

    #[test]
    fn test_connect_is_repeatable() {
        let log = Arc::new(Log::default());
        let mut conn = connection(opener(&log), PauseFlag::new());

        assert!(conn.connect());
        assert!(conn.connect());
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(log.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let log = Arc::new(Log::default());
        let mut conn = connection(
            FakeOpener {
                fail_from: 0,
                ..opener(&log)
            },
            PauseFlag::new(),
        );

        assert!(!conn.connect());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.print("hello"), PrintOutcome::DroppedDisconnected);
        assert!(log.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_paused_drops_without_connecting() {
        let log = Arc::new(Log::default());
        let pause = PauseFlag::new();
        pause.set(true);
        let mut conn = connection(opener(&log), pause.clone());

        assert_eq!(conn.state(), ConnectionState::Paused);
        assert_eq!(conn.print("hello"), PrintOutcome::DroppedPaused);
        assert_eq!(log.opens.load(Ordering::SeqCst), 0);

        pause.set(false);
        assert_eq!(conn.print("hello"), PrintOutcome::Printed);
    }

    #[test]
    fn test_write_failure_reconnects_once_without_reprint() {
        let log = Arc::new(Log::default());
        // First device is broken, the second open fails.
        let mut conn = connection(
            FakeOpener {
                broken_until: 1,
                fail_from: 1,
                ..opener(&log)
            },
            PauseFlag::new(),
        );

        assert!(conn.connect());
        assert_eq!(conn.print("hello"), PrintOutcome::Failed);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(log.opens.load(Ordering::SeqCst), 2);
        assert!(log.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_write_failure_recovers_for_next_message() {
        let log = Arc::new(Log::default());
        let mut conn = connection(
            FakeOpener {
                broken_until: 1,
                ..opener(&log)
            },
            PauseFlag::new(),
        );

        assert_eq!(conn.print("first"), PrintOutcome::Failed);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(log.writes.lock().unwrap().is_empty());

        assert_eq!(conn.print("second"), PrintOutcome::Printed);
        assert_eq!(log.writes.lock().unwrap().len(), 4);
        assert_eq!(log.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_encoding_negotiated_from_preferences() {
        let log = Arc::new(Log::default());
        let mut conn = PrinterConnection::new(
            Box::new(FakeOpener {
                capabilities: vec![ImageEncoding::BitImageColumn, ImageEncoding::Graphics],
                ..opener(&log)
            }),
            LayoutRenderer::builtin(LayoutConfig::default()),
            PrintOptions {
                encodings: vec![ImageEncoding::BitImageRaster, ImageEncoding::Graphics],
                ..PrintOptions::default()
            },
            PauseFlag::new(),
        );

        assert_eq!(conn.encoding(), None);
        assert!(conn.connect());
        assert_eq!(conn.encoding(), Some(ImageEncoding::Graphics));
    }

    #[test]
    fn test_no_shared_encoding_fails_connect() {
        let log = Arc::new(Log::default());
        let mut conn = connection(
            FakeOpener {
                capabilities: Vec::new(),
                ..opener(&log)
            },
            PauseFlag::new(),
        );
        assert!(!conn.connect());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    /// Blank dots left and right of the ink on the full paper width.
    fn paper_margins(conn: &PrinterConnection, bitmap: &MonoBitmap) -> (u32, u32) {
        let paper = conn.options().paper.paper_width_dots(203);
        let (first, last) = bitmap.ink_columns().unwrap();
        (first, paper - 1 - last)
    }

    #[test]
    fn test_prepared_bitmap_fits_printable_width() {
        let log = Arc::new(Log::default());
        let conn = connection(opener(&log), PauseFlag::new());
        let paper = conn.options().paper;
        let printable = paper.printable_width_dots(203);
        let margin = paper.safe_margin_dots(203);

        let narrow = conn.prepare_bitmap(&RgbImage::from_pixel(100, 10, image::Rgb([0, 0, 0])));
        assert_eq!(narrow.height, 20);
        let (first, last) = narrow.ink_columns().unwrap();
        assert_eq!(last - first + 1, 200);

        let wide = conn.prepare_bitmap(&RgbImage::from_pixel(384, 10, image::Rgb([0, 0, 0])));
        let (first, last) = wide.ink_columns().unwrap();
        assert_eq!(last - first + 1, 384);
        assert!(first >= margin);
        assert!(last < margin + printable);
    }

    #[test]
    fn test_rendered_receipt_is_centered_on_paper() {
        let log = Arc::new(Log::default());
        let conn = connection(opener(&log), PauseFlag::new());
        let image = LayoutRenderer::builtin(LayoutConfig::default()).render("Hi");

        let bitmap = conn.prepare_bitmap(&image);
        let (left, right) = paper_margins(&conn, &bitmap);
        assert!(left > 0);
        assert!(left.abs_diff(right) <= 1, "left {} right {}", left, right);
    }

    #[test]
    fn test_full_paper_image_is_not_shifted() {
        let log = Arc::new(Log::default());
        let conn = connection(opener(&log), PauseFlag::new());
        let mut page = RgbImage::from_pixel(639, 4, image::Rgb([255, 255, 255]));
        page.put_pixel(0, 0, image::Rgb([0, 0, 0]));
        page.put_pixel(638, 3, image::Rgb([0, 0, 0]));

        let bitmap = conn.prepare_bitmap(&page);
        assert_eq!(bitmap.width, 639);
        assert_eq!(bitmap.ink_columns(), Some((0, 638)));
    }

    #[test]
    fn test_x_offset_moves_centered_receipt() {
        let log = Arc::new(Log::default());
        let centered = connection(opener(&log), PauseFlag::new());
        let mut options = PrintOptions::default();
        options.paper.x_offset_mm = -2.0;
        let shifted = PrinterConnection::new(
            Box::new(opener(&log)),
            LayoutRenderer::builtin(LayoutConfig::default()),
            options,
            PauseFlag::new(),
        );
        let image = RgbImage::from_pixel(100, 10, image::Rgb([0, 0, 0]));

        let (left, _) = paper_margins(&centered, &centered.prepare_bitmap(&image));
        let (shifted_left, _) = paper_margins(&shifted, &shifted.prepare_bitmap(&image));
        assert_eq!(left - shifted_left, 16);
    }

    #[test]
    fn test_prepared_bitmap_respects_max_height() {
        let log = Arc::new(Log::default());
        let mut options = PrintOptions::default();
        options.paper.max_height_mm = Some(5.0);
        let conn = PrinterConnection::new(
            Box::new(opener(&log)),
            LayoutRenderer::builtin(LayoutConfig::default()),
            options,
            PauseFlag::new(),
        );
        let bitmap = conn.prepare_bitmap(&RgbImage::from_pixel(50, 200, image::Rgb([0, 0, 0])));
        assert_eq!(bitmap.height, 40);
    }

    #[test]
    fn test_print_image_uses_pipeline() {
        let log = Arc::new(Log::default());
        let mut conn = connection(opener(&log), PauseFlag::new());
        let image = RgbImage::from_pixel(64, 8, image::Rgb([0, 0, 0]));
        assert_eq!(conn.print_image(&image), PrintOutcome::Printed);
        assert_eq!(log.writes.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_close_disconnects() {
        let log = Arc::new(Log::default());
        let mut conn = connection(opener(&log), PauseFlag::new());
        assert!(conn.connect());
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }
}
