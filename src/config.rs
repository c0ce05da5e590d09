//! # Configuration
//!
//! Command-line flags, each with an environment variable fallback, resolved
//! into validated component settings before anything starts.
//!
//! | Group | Env vars |
//! |-------|----------|
//! | [`StreamArgs`] | `NTFY_HOST`, `NTFY_TOPIC`, `RECONNECT_DELAY`, `MEMORY_*` |
//! | [`PrinterArgs`] | `PRINTER_*`, `PAPER_WIDTH_MM`, `X_OFFSET_MM`, `SAFE_MARGIN_MM`, `MAX_HEIGHT_MM`, `IMAGE_*` |
//! | [`LayoutArgs`] | `MAX_MESSAGE_LENGTH`, `MAX_LINES`, `WRAP_WIDTH`, `FONT_*_PATH` |

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::backpressure::Hysteresis;
use crate::error::ReceiptError;
use crate::listener::{ListenerConfig, stream_url};
use crate::printer::{PaperGeometry, PrintOptions, PrinterProfile};
use crate::protocol::graphics::parse_encoding_list;
use crate::render::layout::{DEFAULT_BOLD_FONT, DEFAULT_REGULAR_FONT, LayoutConfig};

/// Where to listen and when to back off.
#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// ntfy server base URL, e.g. https://ntfy.sh
    #[arg(long, env = "NTFY_HOST")]
    pub host: Option<String>,

    /// Topic to subscribe to
    #[arg(long, env = "NTFY_TOPIC")]
    pub topic: Option<String>,

    /// Seconds to wait before reconnecting
    #[arg(long, env = "RECONNECT_DELAY", default_value_t = 5)]
    pub reconnect_secs: u64,

    /// Memory utilization (%) at which printing pauses
    #[arg(long, env = "MEMORY_PAUSE_PERCENT", default_value_t = 80.0)]
    pub pause_percent: f64,

    /// Memory utilization (%) at which printing resumes
    #[arg(long, env = "MEMORY_RESUME_PERCENT", default_value_t = 70.0)]
    pub resume_percent: f64,

    /// Seconds between memory samples
    #[arg(long, env = "MEMORY_CHECK_INTERVAL", default_value_t = 5)]
    pub memory_interval_secs: u64,
}

impl StreamArgs {
    /// Host and topic, if both are set and non-empty.
    pub fn target(&self) -> Option<(&str, &str)> {
        let host = self.host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        let topic = self.topic.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        Some((host, topic))
    }
}

/// Printer hardware, paper and image conversion.
#[derive(Args, Debug, Clone)]
pub struct PrinterArgs {
    /// USB vendor id (hex)
    #[arg(long, env = "PRINTER_VENDOR_ID", default_value = "0x0416", value_parser = parse_usb_id)]
    pub vendor_id: u16,

    /// USB product id (hex)
    #[arg(long, env = "PRINTER_PRODUCT_ID", default_value = "0x5011", value_parser = parse_usb_id)]
    pub product_id: u16,

    /// USB interface number
    #[arg(long, env = "PRINTER_INTERFACE", default_value_t = 0)]
    pub interface: u8,

    /// Paper roll width in millimeters
    #[arg(long, env = "PAPER_WIDTH_MM", default_value_t = 80.0)]
    pub paper_width_mm: f32,

    /// Horizontal image shift in millimeters (negative = left)
    #[arg(long, env = "X_OFFSET_MM", default_value_t = 0.0, allow_hyphen_values = true)]
    pub x_offset_mm: f32,

    /// Unprintable margin on each side in millimeters
    #[arg(long, env = "SAFE_MARGIN_MM", default_value_t = 4.0)]
    pub safe_margin_mm: f32,

    /// Cap on receipt length in millimeters
    #[arg(long, env = "MAX_HEIGHT_MM")]
    pub max_height_mm: Option<f32>,

    /// Contrast factor applied before thresholding
    #[arg(long, env = "IMAGE_CONTRAST", default_value_t = 1.5)]
    pub contrast: f32,

    /// Image encodings in order of preference
    #[arg(long, env = "IMAGE_IMPLS", default_value = "bitImageRaster,graphics,bitImageColumn")]
    pub image_impls: String,

    /// Upscale factor for rendered receipts
    #[arg(long, default_value_t = 2)]
    pub upscale: u32,

    /// Blank lines fed before the cut
    #[arg(long, default_value_t = 4)]
    pub feed_lines: u8,
}

impl PrinterArgs {
    pub fn profile(&self) -> PrinterProfile {
        PrinterProfile {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            interface: self.interface,
            ..PrinterProfile::default()
        }
    }

    pub fn paper(&self) -> Result<PaperGeometry, ReceiptError> {
        let paper = PaperGeometry {
            paper_width_mm: self.paper_width_mm,
            x_offset_mm: self.x_offset_mm,
            safe_margin_mm: self.safe_margin_mm,
            max_height_mm: self.max_height_mm,
        };
        if paper.paper_width_mm <= 0.0 {
            return Err(ReceiptError::Config(format!(
                "Paper width must be positive, got {}",
                paper.paper_width_mm
            )));
        }
        if paper.safe_margin_mm < 0.0 || paper.printable_width_mm() <= 0.0 {
            return Err(ReceiptError::Config(format!(
                "Safe margin {}mm leaves no printable area on {}mm paper",
                paper.safe_margin_mm, paper.paper_width_mm
            )));
        }
        if matches!(paper.max_height_mm, Some(h) if h <= 0.0) {
            return Err(ReceiptError::Config(
                "Max height must be positive".to_string(),
            ));
        }
        Ok(paper)
    }

    pub fn print_options(&self) -> Result<PrintOptions, ReceiptError> {
        if self.contrast.is_nan() || self.contrast <= 0.0 {
            return Err(ReceiptError::Config(format!(
                "Contrast must be positive, got {}",
                self.contrast
            )));
        }
        if self.upscale == 0 {
            return Err(ReceiptError::Config("Upscale must be at least 1".to_string()));
        }
        Ok(PrintOptions {
            dpi: self.profile().dpi,
            paper: self.paper()?,
            upscale: self.upscale,
            feed_lines: self.feed_lines,
            contrast: self.contrast,
            encodings: parse_encoding_list(&self.image_impls)?,
        })
    }
}

/// Receipt layout.
#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    /// Messages longer than this many characters are truncated
    #[arg(long, env = "MAX_MESSAGE_LENGTH", default_value_t = 300)]
    pub max_message_length: usize,

    /// Maximum printed lines
    #[arg(long, env = "MAX_LINES", default_value_t = 5)]
    pub max_lines: usize,

    /// Wrap width in characters
    #[arg(long, env = "WRAP_WIDTH", default_value_t = 10)]
    pub wrap_width: usize,

    /// TrueType font for message lines
    #[arg(long, env = "FONT_BOLD_PATH", default_value = DEFAULT_BOLD_FONT)]
    pub bold_font: PathBuf,

    /// TrueType font for the date stamp
    #[arg(long, env = "FONT_REGULAR_PATH", default_value = DEFAULT_REGULAR_FONT)]
    pub regular_font: PathBuf,
}

impl LayoutArgs {
    pub fn layout_config(&self) -> Result<LayoutConfig, ReceiptError> {
        if self.max_message_length < 4 {
            return Err(ReceiptError::Config(format!(
                "Max message length must be at least 4, got {}",
                self.max_message_length
            )));
        }
        if self.max_lines == 0 || self.wrap_width == 0 {
            return Err(ReceiptError::Config(
                "Max lines and wrap width must be at least 1".to_string(),
            ));
        }
        Ok(LayoutConfig {
            max_message_length: self.max_message_length,
            max_lines: self.max_lines,
            wrap_width: self.wrap_width,
            bold_font: self.bold_font.clone(),
            regular_font: self.regular_font.clone(),
            ..LayoutConfig::default()
        })
    }
}

/// Everything the agent needs, validated.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub listener: ListenerConfig,
    pub marks: Hysteresis,
    pub memory_interval: Duration,
    pub profile: PrinterProfile,
    pub print: PrintOptions,
    pub layout: LayoutConfig,
}

impl AgentConfig {
    pub fn from_args(
        stream: &StreamArgs,
        printer: &PrinterArgs,
        layout: &LayoutArgs,
    ) -> Result<Self, ReceiptError> {
        let (host, topic) = stream.target().ok_or_else(|| {
            ReceiptError::Config("NTFY_HOST and NTFY_TOPIC must both be set".to_string())
        })?;
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ReceiptError::Config(format!(
                "NTFY_HOST must start with http:// or https://, got {}",
                host
            )));
        }

        let marks = Hysteresis::new(stream.pause_percent, stream.resume_percent)?;
        if stream.memory_interval_secs == 0 {
            return Err(ReceiptError::Config(
                "Memory check interval must be at least 1 second".to_string(),
            ));
        }

        let layout = layout.layout_config()?;
        let listener = ListenerConfig {
            reconnect_delay: Duration::from_secs(stream.reconnect_secs),
            max_message_length: layout.max_message_length,
            ..ListenerConfig::new(stream_url(host, topic))
        };

        Ok(Self {
            listener,
            marks,
            memory_interval: Duration::from_secs(stream.memory_interval_secs),
            profile: printer.profile(),
            print: printer.print_options()?,
            layout,
        })
    }
}

/// Parse a USB id written in hex, with or without `0x`.
///
/// ```
/// use ntfy_printer::config::parse_usb_id;
///
/// assert_eq!(parse_usb_id("0x0416"), Ok(0x0416));
/// assert_eq!(parse_usb_id("5011"), Ok(0x5011));
/// assert!(parse_usb_id("0xZZ").is_err());
/// ```
pub fn parse_usb_id(value: &str) -> Result<u16, String> {
    let digits = value
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid USB id '{}': {}", value, e))
}
