//! # Receipt Header Symbol
//!
//! A solid five-pointed star drawn procedurally at the top of every
//! receipt, so the receipt has a recognisable header without shipping an
//! image asset.

use image::{Rgb, RgbImage};
use std::f32::consts::{PI, TAU};

/// Draw a star of `size` x `size` pixels with its top-left corner at (`x`, `y`).
///
/// Pixels outside the canvas are clipped.
pub fn draw_star(canvas: &mut RgbImage, x: i32, y: i32, size: u32) {
    let center = size as f32 / 2.0;
    let outer_radius = center * 0.95;
    let inner_radius = outer_radius * 0.382;

    for py in 0..size {
        for px in 0..size {
            let dx = px as f32 + 0.5 - center;
            let dy = py as f32 + 0.5 - center;
            if !is_inside_star(dx, dy, outer_radius, inner_radius) {
                continue;
            }
            let cx = x + px as i32;
            let cy = y + py as i32;
            if cx >= 0 && cy >= 0 && (cx as u32) < canvas.width() && (cy as u32) < canvas.height() {
                canvas.put_pixel(cx as u32, cy as u32, Rgb([0, 0, 0]));
            }
        }
    }
}

/// Whether a point relative to the center lies inside the star.
///
/// The edge radius is interpolated between the outer points and the inner
/// valleys, which gives slightly convex edges. Good enough at receipt scale.
fn is_inside_star(dx: f32, dy: f32, outer_r: f32, inner_r: f32) -> bool {
    let dist = (dx * dx + dy * dy).sqrt();
    if dist > outer_r {
        return false;
    }

    // 0 at the top point, clockwise
    let adjusted = (dy.atan2(dx) + PI / 2.0).rem_euclid(TAU);
    let sector = TAU / 5.0;
    let half = sector / 2.0;
    let local = adjusted.rem_euclid(sector);

    let edge_radius = if local < half {
        let t = local / half;
        outer_r * (1.0 - t) + inner_r * t
    } else {
        let t = (local - half) / half;
        inner_r * (1.0 - t) + outer_r * t
    };

    dist <= edge_radius
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawn(size: u32) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(size, size, Rgb([255, 255, 255]));
        draw_star(&mut canvas, 0, 0, size);
        canvas
    }

    #[test]
    fn test_star_center_is_filled() {
        let canvas = drawn(48);
        assert_eq!(canvas.get_pixel(24, 24)[0], 0);
    }

    #[test]
    fn test_star_corners_are_empty() {
        let canvas = drawn(48);
        for (x, y) in [(0, 0), (47, 0), (0, 47), (47, 47)] {
            assert_eq!(canvas.get_pixel(x, y)[0], 255, "corner ({x},{y}) should be white");
        }
    }

    #[test]
    fn test_star_top_point_reaches_top_rows() {
        let canvas = drawn(48);
        let top_ink = (0..48).any(|x| canvas.get_pixel(x, 2)[0] == 0);
        assert!(top_ink);
    }

    #[test]
    fn test_star_fill_ratio() {
        let canvas = drawn(96);
        let black = canvas.pixels().filter(|p| p[0] == 0).count();
        let total = 96 * 96;
        assert!(black > total / 5, "Star has too few pixels");
        assert!(black < total * 3 / 4, "Star has too many pixels");
    }

    #[test]
    fn test_star_clips_at_canvas_edge() {
        let mut canvas = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
        draw_star(&mut canvas, -10, -10, 40);
        assert_eq!(canvas.get_pixel(10, 10)[0], 0);
    }
}
