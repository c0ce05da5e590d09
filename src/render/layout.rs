//! # Receipt Layout Renderer
//!
//! Turns one message into a receipt image:
//!
//! ```text
//! ┌──────────── 384 px canvas ────────────┐
//! │                  ★                    │  symbol
//! │                LUNCH                  │  wrapped lines, bold face
//! │                TIME!                  │
//! │            ─────────────              │  divider (widest text span)
//! │           2026-02-15 12:30            │  date stamp, regular face
//! └───────────────────────────────────────┘
//!     rows cropped to the ink, width kept
//! ```
//!
//! A line too wide for the canvas is drawn with a smaller face so no glyph
//! is clipped.
//!
//! Rendering is deterministic: [`LayoutRenderer::render_at`] with the same
//! message, timestamp and configuration yields byte-identical images. Fonts
//! are resolved once in [`LayoutRenderer::new`], so `render` itself never
//! touches the filesystem.

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use image::{Rgb, RgbImage, imageops};

use super::fonts::Face;
use super::symbol::draw_star;
use super::text::{limit_lines, truncate_message, wrap_text};

/// Default bold font used for message lines.
pub const DEFAULT_BOLD_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";

/// Default regular font used for the date stamp.
pub const DEFAULT_REGULAR_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Layout parameters. All sizes are in pixels unless noted.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Canvas width, constant for every message
    pub width: u32,
    /// Message length cap in characters
    pub max_message_length: usize,
    /// Wrap width in characters
    pub wrap_width: usize,
    /// Maximum number of wrapped lines printed
    pub max_lines: usize,
    /// Font file for message lines
    pub bold_font: PathBuf,
    /// Font file for the date stamp
    pub regular_font: PathBuf,
    /// Pixel height of message lines
    pub line_px: f32,
    /// Pixel height of the date stamp
    pub date_px: f32,
    /// Star symbol size
    pub symbol_size: u32,
    /// Divider thickness
    pub divider_thickness: u32,
    /// Vertical gap between elements
    pub gap: u32,
    /// Blank border around the composition before cropping
    pub margin: u32,
    /// `chrono` format string for the date stamp
    pub date_format: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 384,
            max_message_length: 300,
            wrap_width: 10,
            max_lines: 5,
            bold_font: PathBuf::from(DEFAULT_BOLD_FONT),
            regular_font: PathBuf::from(DEFAULT_REGULAR_FONT),
            line_px: 56.0,
            date_px: 24.0,
            symbol_size: 48,
            divider_thickness: 3,
            gap: 12,
            margin: 8,
            date_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

/// Renders messages to receipt images.
#[derive(Debug, Clone)]
pub struct LayoutRenderer {
    config: LayoutConfig,
    bold: Face,
    regular: Face,
}

impl LayoutRenderer {
    /// Build a renderer, loading both fonts (with built-in fallback).
    pub fn new(config: LayoutConfig) -> Self {
        let bold = Face::load_or_fallback(&config.bold_font, config.line_px);
        let regular = Face::load_or_fallback(&config.regular_font, config.date_px);
        Self::with_faces(config, bold, regular)
    }

    /// Build a renderer that only uses the built-in bitmap font.
    pub fn builtin(config: LayoutConfig) -> Self {
        let bold = Face::builtin(config.line_px);
        let regular = Face::builtin(config.date_px);
        Self::with_faces(config, bold, regular)
    }

    fn with_faces(config: LayoutConfig, bold: Face, regular: Face) -> Self {
        Self {
            config,
            bold,
            regular,
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Apply truncation, wrapping and the line cap to a message.
    ///
    /// ```
    /// use ntfy_printer::render::layout::{LayoutConfig, LayoutRenderer};
    ///
    /// let renderer = LayoutRenderer::builtin(LayoutConfig::default());
    /// assert_eq!(renderer.prepare_lines("Lunch Time!"), vec!["Lunch", "Time!"]);
    /// ```
    pub fn prepare_lines(&self, message: &str) -> Vec<String> {
        let message = truncate_message(message, self.config.max_message_length);
        let lines = wrap_text(&message, self.config.wrap_width);
        limit_lines(lines, self.config.max_lines)
    }

    /// Render `message` stamped with the current local time.
    pub fn render(&self, message: &str) -> RgbImage {
        self.render_at(message, Local::now().naive_local())
    }

    /// Render `message` stamped with `at`.
    pub fn render_at(&self, message: &str, at: NaiveDateTime) -> RgbImage {
        let lines = self.prepare_lines(message);
        let stamp = at.format(&self.config.date_format).to_string();
        let canvas = self.compose(&lines, &stamp);
        crop_rows(&canvas)
    }

    fn compose(&self, lines: &[String], stamp: &str) -> RgbImage {
        let cfg = &self.config;
        let width = cfg.width;
        let line_h = self.bold.line_height();
        let date_h = self.regular.line_height();

        let height = cfg.margin * 2
            + cfg.symbol_size
            + cfg.gap
            + (line_h + cfg.gap) * lines.len() as u32
            + cfg.divider_thickness
            + cfg.gap
            + date_h;

        let mut canvas = RgbImage::from_pixel(width, height, WHITE);
        let mut y = cfg.margin;

        draw_star(&mut canvas, centered_x(width, cfg.symbol_size), y as i32, cfg.symbol_size);
        y += cfg.symbol_size + cfg.gap;

        let available = width.saturating_sub(cfg.margin * 2).max(1);
        let regular = self.regular.fit_width(stamp, available);
        let mut widest = regular.text_width(stamp);
        for line in lines {
            let face = self.bold.fit_width(line, available);
            let line_w = face.text_width(line);
            widest = widest.max(line_w);
            let dy = line_h.saturating_sub(face.line_height()) / 2;
            face.draw(&mut canvas, line, centered_x(width, line_w), (y + dy) as i32);
            y += line_h + cfg.gap;
        }

        let rule_w = widest.min(available);
        let rule_x = centered_x(width, rule_w).max(0) as u32;
        for dy in 0..cfg.divider_thickness {
            for dx in 0..rule_w {
                if rule_x + dx < width && y + dy < height {
                    canvas.put_pixel(rule_x + dx, y + dy, BLACK);
                }
            }
        }
        y += cfg.divider_thickness + cfg.gap;

        let stamp_w = regular.text_width(stamp);
        regular.draw(&mut canvas, stamp, centered_x(width, stamp_w), y as i32);

        canvas
    }
}

/// Left edge that centers an element of `element_w` on a canvas of `canvas_w`.
fn centered_x(canvas_w: u32, element_w: u32) -> i32 {
    (canvas_w as i32 - element_w as i32) / 2
}

/// Crop an image to the rows holding non-white pixels, keeping its width.
///
/// A fully white image is returned as a single white row.
pub fn crop_rows(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let inked = |y: u32| (0..width).any(|x| *image.get_pixel(x, y) != WHITE);
    let Some(top) = (0..height).find(|&y| inked(y)) else {
        return RgbImage::from_pixel(width.max(1), 1, WHITE);
    };
    let bottom = (top..height).rev().find(|&y| inked(y)).unwrap_or(top);
    imageops::crop_imm(image, 0, top, width, bottom - top + 1).to_image()
}
