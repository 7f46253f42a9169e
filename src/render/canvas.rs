use rayon::prelude::*;
use std::f32::consts::TAU;

use crate::scene::Rgb;

/// An opaque RGBA frame with 2D-canvas style fills.
///
/// Shapes are sampled at pixel centers without antialiasing. All drawing
/// is source-over blending; the alpha channel stays at 255.
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut canvas = Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        };
        canvas.clear(Rgb::BLACK);
        canvas
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    pub fn clear(&mut self, color: Rgb) {
        self.pixels.par_chunks_mut(4).for_each(|px| {
            px.copy_from_slice(&[color.r, color.g, color.b, 255]);
        });
    }

    /// Whole-canvas fill at `alpha` opacity.
    pub fn fill(&mut self, color: Rgb, alpha: f32) {
        let (w, h) = (self.width as f32, self.height as f32);
        self.fill_rect(0.0, 0.0, w, h, color, alpha);
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb, alpha: f32) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        self.paint(x, y, x + w, y + h, color, alpha, |_, _| true);
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgb) {
        if radius <= 0.0 {
            return;
        }
        let r2 = radius * radius;
        self.paint(cx - radius, cy - radius, cx + radius, cy + radius, color, 1.0, |x, y| {
            let (dx, dy) = (x - cx, y - cy);
            dx * dx + dy * dy <= r2
        });
    }

    /// Outline of a circle, `line_width` wide and centered on the radius.
    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, line_width: f32, color: Rgb) {
        self.stroke_arc(cx, cy, radius, 0.0, TAU, line_width, color);
    }

    /// Clockwise arc from `start` to `end` radians (0 points along +x, y
    /// grows downward) with butt ends.
    #[allow(clippy::too_many_arguments)]
    pub fn stroke_arc(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        start: f32,
        end: f32,
        line_width: f32,
        color: Rgb,
    ) {
        if radius <= 0.0 || line_width <= 0.0 {
            return;
        }
        let inner = (radius - line_width / 2.0).max(0.0);
        let outer = radius + line_width / 2.0;
        let (inner2, outer2) = (inner * inner, outer * outer);
        let sweep = end - start;
        let full = sweep >= TAU;
        let start = start.rem_euclid(TAU);

        self.paint(cx - outer, cy - outer, cx + outer, cy + outer, color, 1.0, |x, y| {
            let (dx, dy) = (x - cx, y - cy);
            let d2 = dx * dx + dy * dy;
            if d2 < inner2 || d2 > outer2 {
                return false;
            }
            full || (dy.atan2(dx) - start).rem_euclid(TAU) <= sweep
        });
    }

    /// Blends `color` into every pixel whose center lies inside the
    /// `[x0, x1) x [y0, y1)` box and satisfies `covers`.
    #[allow(clippy::too_many_arguments)]
    fn paint<F>(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgb, alpha: f32, covers: F)
    where
        F: Fn(f32, f32) -> bool + Sync,
    {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha == 0.0 {
            return;
        }
        let col_start = span_start(x0, self.width);
        let col_end = span_start(x1, self.width);
        let row_start = span_start(y0, self.height);
        let row_end = span_start(y1, self.height);
        if col_start >= col_end || row_start >= row_end {
            return;
        }

        let row_bytes = (self.width * 4) as usize;
        let inv_a = 1.0 - alpha;
        self.pixels
            .par_chunks_mut(row_bytes)
            .enumerate()
            .skip(row_start)
            .take(row_end - row_start)
            .for_each(|(row, line)| {
                let py = row as f32 + 0.5;
                for col in col_start..col_end {
                    if !covers(col as f32 + 0.5, py) {
                        continue;
                    }
                    let idx = col * 4;
                    line[idx] = (color.r as f32 * alpha + line[idx] as f32 * inv_a).round() as u8;
                    line[idx + 1] = (color.g as f32 * alpha + line[idx + 1] as f32 * inv_a).round() as u8;
                    line[idx + 2] = (color.b as f32 * alpha + line[idx + 2] as f32 * inv_a).round() as u8;
                    line[idx + 3] = 255;
                }
            });
    }
}

/// First pixel index whose center is at or past `edge`, clamped to `[0, len]`.
fn span_start(edge: f32, len: u32) -> usize {
    let first = (edge - 0.5).ceil();
    if first.is_nan() || first <= 0.0 {
        0
    } else {
        (first as usize).min(len as usize)
    }
}
