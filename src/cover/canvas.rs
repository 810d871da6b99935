//! A minimal software rasterizer over an [`RgbImage`].
//!
//! Shapes are filled with per-pixel coverage so edges are anti-aliased:
//! rectangles by exact pixel overlap, circles and rounded rectangles by signed
//! distance. Colors carry their own alpha and are blended source-over.

use super::font::{Face, GLYPH_COLUMNS, GLYPH_ROWS, glyph};
use super::palette::Color;
use image::{Rgb, RgbImage};

pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Fill the whole canvas with a gradient from the top-left corner to the
    /// bottom-right corner.
    pub fn fill_diagonal_gradient(&mut self, from: Color, to: Color) {
        let (w, h) = (self.width() as f32, self.height() as f32);
        let norm = w * w + h * h;
        for (x, y, px) in self.image.enumerate_pixels_mut() {
            let t = (((x as f32 + 0.5) * w + (y as f32 + 0.5) * h) / norm).clamp(0.0, 1.0);
            px.0 = [
                lerp(from.r, to.r, t),
                lerp(from.g, to.g, t),
                lerp(from.b, to.b, t),
            ];
        }
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color) {
        let Some((x0, y0, x1, y1)) = self.clip(x, y, x + width, y + height) else {
            return;
        };
        for py in y0..y1 {
            let cov_y = overlap(py as f32, y, y + height);
            for px in x0..x1 {
                let coverage = overlap(px as f32, x, x + width) * cov_y;
                self.blend(px, py, color, coverage);
            }
        }
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color) {
        let Some((x0, y0, x1, y1)) =
            self.clip(cx - radius - 1.0, cy - radius - 1.0, cx + radius + 1.0, cy + radius + 1.0)
        else {
            return;
        };
        for py in y0..y1 {
            for px in x0..x1 {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                let distance = (dx * dx + dy * dy).sqrt();
                let coverage = (radius - distance + 0.5).clamp(0.0, 1.0);
                self.blend(px, py, color, coverage);
            }
        }
    }

    /// Rounded rectangle; the radius is capped at half the shorter side.
    pub fn fill_rounded_rect(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
        color: Color,
    ) {
        let radius = radius.min(width / 2.0).min(height / 2.0).max(0.0);
        let Some((x0, y0, x1, y1)) = self.clip(x, y, x + width, y + height) else {
            return;
        };
        let (half_w, half_h) = (width / 2.0, height / 2.0);
        let (cx, cy) = (x + half_w, y + half_h);
        for py in y0..y1 {
            for px in x0..x1 {
                let qx = (px as f32 + 0.5 - cx).abs() - half_w + radius;
                let qy = (py as f32 + 0.5 - cy).abs() - half_h + radius;
                let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
                let distance = outside + qx.max(qy).min(0.0) - radius;
                let coverage = (0.5 - distance).clamp(0.0, 1.0);
                self.blend(px, py, color, coverage);
            }
        }
    }

    /// Draw one line of text with its line box's top-left corner at `(x, y)`.
    pub fn draw_text(&mut self, text: &str, x: f32, y: f32, face: Face, color: Color) {
        for_each_stroke(text, x, y, face, |sx, sy, sw, sh| {
            self.fill_rect(sx, sy, sw, sh, color);
        });
    }

    /// Draw text over a blurred, offset copy of itself in `shadow`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_text_with_shadow(
        &mut self,
        text: &str,
        x: f32,
        y: f32,
        face: Face,
        color: Color,
        shadow: Color,
        blur: f32,
        offset_y: f32,
    ) {
        let margin = blur.ceil() + 2.0;
        let left = (x - margin).floor();
        let top = (y + offset_y - margin).floor();
        let width = face.measure(text) + face.overhang() + margin * 2.0 + face.stroke_width();
        let height = face.size * 1.2 + margin * 2.0;
        let mut mask = Mask::new(left, top, width.ceil() as usize, height.ceil() as usize);
        for_each_stroke(text, x, y + offset_y, face, |sx, sy, sw, sh| {
            mask.add_rect(sx, sy, sw, sh);
        });
        // Three box passes approximate a gaussian of the same extent.
        let radius = (blur / 3.0).round().max(1.0) as usize;
        for _ in 0..3 {
            mask.box_blur(radius);
        }
        mask.composite(self, shadow);
        self.draw_text(text, x, y, face, color);
    }

    fn blend(&mut self, x: u32, y: u32, color: Color, coverage: f32) {
        let alpha = (color.a * coverage).clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let Rgb([r, g, b]) = *self.image.get_pixel(x, y);
        self.image.put_pixel(
            x,
            y,
            Rgb([
                mix(r, color.r, alpha),
                mix(g, color.g, alpha),
                mix(b, color.b, alpha),
            ]),
        );
    }

    /// Integer pixel bounds of a float rectangle, clipped to the canvas.
    fn clip(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Option<(u32, u32, u32, u32)> {
        let cx0 = x0.floor().max(0.0) as u32;
        let cy0 = y0.floor().max(0.0) as u32;
        let cx1 = (x1.ceil().max(0.0) as u32).min(self.width());
        let cy1 = (y1.ceil().max(0.0) as u32).min(self.height());
        (cx0 < cx1 && cy0 < cy1).then_some((cx0, cy0, cx1, cy1))
    }
}

/// Call `stroke(x, y, w, h)` for every lit font pixel of `text`.
fn for_each_stroke(text: &str, x: f32, y: f32, face: Face, mut stroke: impl FnMut(f32, f32, f32, f32)) {
    let unit = face.unit();
    let top = y + face.ascent_gap();
    let stroke_width = face.stroke_width();
    let mut pen = x;
    for c in text.chars() {
        let columns = glyph(c);
        for (col, bits) in columns.iter().enumerate().take(GLYPH_COLUMNS) {
            for row in 0..GLYPH_ROWS {
                if bits & (1 << row) != 0 {
                    stroke(
                        pen + col as f32 * unit + face.row_shift(row),
                        top + row as f32 * unit,
                        stroke_width,
                        unit,
                    );
                }
            }
        }
        pen += face.advance();
    }
}

/// Single-channel coverage buffer positioned on the canvas.
struct Mask {
    left: f32,
    top: f32,
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Mask {
    fn new(left: f32, top: f32, width: usize, height: usize) -> Self {
        Self {
            left,
            top,
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    fn add_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let (x, y) = (x - self.left, y - self.top);
        let x0 = x.floor().max(0.0) as usize;
        let y0 = y.floor().max(0.0) as usize;
        let x1 = ((x + w).ceil().max(0.0) as usize).min(self.width);
        let y1 = ((y + h).ceil().max(0.0) as usize).min(self.height);
        for py in y0..y1 {
            let cov_y = overlap(py as f32, y, y + h);
            for px in x0..x1 {
                let cell = &mut self.data[py * self.width + px];
                *cell = cell.max(overlap(px as f32, x, x + w) * cov_y);
            }
        }
    }

    fn box_blur(&mut self, radius: usize) {
        let mut scratch = vec![0.0; self.data.len()];
        blur_lines(&self.data, &mut scratch, self.width, self.height, radius, true);
        blur_lines(&scratch, &mut self.data, self.width, self.height, radius, false);
    }

    fn composite(&self, canvas: &mut Canvas, color: Color) {
        for my in 0..self.height {
            let cy = self.top + my as f32;
            if cy < 0.0 || cy >= canvas.height() as f32 {
                continue;
            }
            for mx in 0..self.width {
                let cx = self.left + mx as f32;
                if cx < 0.0 || cx >= canvas.width() as f32 {
                    continue;
                }
                let coverage = self.data[my * self.width + mx];
                canvas.blend(cx as u32, cy as u32, color, coverage);
            }
        }
    }
}

/// One box-blur pass along rows (`horizontal`) or columns.
fn blur_lines(
    src: &[f32],
    dst: &mut [f32],
    width: usize,
    height: usize,
    radius: usize,
    horizontal: bool,
) {
    let (lines, len) = if horizontal { (height, width) } else { (width, height) };
    let index = |line: usize, i: usize| {
        if horizontal {
            line * width + i
        } else {
            i * width + line
        }
    };
    let window = (2 * radius + 1) as f32;
    for line in 0..lines {
        let mut sum: f32 = (0..=radius.min(len.saturating_sub(1)))
            .map(|i| src[index(line, i)])
            .sum();
        for i in 0..len {
            dst[index(line, i)] = sum / window;
            if i + radius + 1 < len {
                sum += src[index(line, i + radius + 1)];
            }
            if i >= radius {
                sum -= src[index(line, i - radius)];
            }
        }
    }
}

/// Fraction of the unit pixel span starting at `p` covered by `[a, b)`.
fn overlap(p: f32, a: f32, b: f32) -> f32 {
    (b.min(p + 1.0) - a.max(p)).clamp(0.0, 1.0)
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round().clamp(0.0, 255.0) as u8
}

fn mix(dst: u8, src: u8, alpha: f32) -> u8 {
    lerp(dst, src, alpha)
}
