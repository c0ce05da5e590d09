//! # Calibration and Alignment Printouts
//!
//! Diagnostic images for tuning the paper geometry settings:
//!
//! - [`calibration_grid`]: lettered columns every 5 mm across the full paper
//!   width plus a heavy center line. The rightmost fully-visible letter tells
//!   the operator the printable width; an off-center line tells them the
//!   X offset.
//! - [`alignment_test`]: a box inset by the safe margin, a center cross and
//!   edge arrows, for checking an already-tuned configuration.

use image::{Rgb, RgbImage};

use super::fonts::Face;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Column pitch of the calibration grid in millimeters.
pub const GRID_PITCH_MM: f32 = 5.0;

/// Height of both diagnostic images in dots.
const DIAGNOSTIC_HEIGHT: u32 = 240;

/// Render the calibration grid for a print line of `width_dots`.
pub fn calibration_grid(width_dots: u32, dots_per_mm: f32) -> RgbImage {
    let width = width_dots.max(1);
    let height = DIAGNOSTIC_HEIGHT;
    let mut canvas = RgbImage::from_pixel(width, height, WHITE);
    let label = Face::builtin(24.0);

    let pitch = (GRID_PITCH_MM * dots_per_mm).round().max(8.0) as u32;
    let mut column = 0u32;
    let mut x = 0u32;
    while x < width {
        fill_rect(&mut canvas, x, 0, 1, height);
        let letter = column_letter(column);
        if x + 2 + label.text_width(&letter) <= width {
            label.draw(&mut canvas, &letter, x as i32 + 2, 36);
        }
        column += 1;
        x += pitch;
    }

    // Border and center line
    fill_rect(&mut canvas, 0, 0, width, 2);
    fill_rect(&mut canvas, 0, height - 2, width, 2);
    fill_rect(&mut canvas, width - 1, 0, 1, height);
    fill_rect(&mut canvas, (width / 2).saturating_sub(2), 0, 4, height);

    canvas
}

/// Render the alignment test for a print line of `width_dots`.
pub fn alignment_test(width_dots: u32, safe_margin_dots: u32) -> RgbImage {
    let width = width_dots.max(1);
    let height = DIAGNOSTIC_HEIGHT;
    let mut canvas = RgbImage::from_pixel(width, height, WHITE);
    let label = Face::builtin(24.0);

    let margin = safe_margin_dots.min(width / 4);
    let inner_w = width - 2 * margin;

    // Safe-area box
    fill_rect(&mut canvas, margin, 0, inner_w, 3);
    fill_rect(&mut canvas, margin, height - 3, inner_w, 3);
    fill_rect(&mut canvas, margin, 0, 3, height);
    fill_rect(&mut canvas, width - margin - 3, 0, 3, height);

    // Center cross
    let cx = width / 2;
    let cy = height / 2;
    fill_rect(&mut canvas, cx.saturating_sub(1), 20, 3, height - 40);
    fill_rect(&mut canvas, margin + 20, cy.saturating_sub(1), inner_w.saturating_sub(40), 3);

    // Edge arrows pointing outwards
    for i in 0..16u32 {
        fill_rect(&mut canvas, margin + 6 + i, cy.saturating_sub(i), 1, 2 * i + 1);
        fill_rect(&mut canvas, width - margin - 7 - i, cy.saturating_sub(i), 1, 2 * i + 1);
    }

    label.draw(&mut canvas, "L", (margin + 10) as i32, 10);
    let r_w = label.text_width("R");
    label.draw(&mut canvas, "R", (width - margin - 10 - r_w) as i32, 10);

    canvas
}

/// Spreadsheet-style column label: A..Z, then AA, AB, ...
pub fn column_letter(index: u32) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        out.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

fn fill_rect(canvas: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    let (cw, ch) = canvas.dimensions();
    for py in y..(y + h).min(ch) {
        for px in x..(x + w).min(cw) {
            canvas.put_pixel(px, py, BLACK);
        }
    }
}
