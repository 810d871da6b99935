//! Procedural cover art.
//!
//! Every export gets a freshly drawn 1600×2400 JPEG: a diagonal two-tone
//! gradient, an accent bar and a translucent accent disc, the book title in
//! large bold type, and a rounded panel holding the creator and export date.
//! Nothing is loaded from disk; text uses the built-in bitmap font.
//!
//! | Part | Module |
//! |---|---|
//! | Palette (hue, dark/light theme) | [`palette`] |
//! | Title sizing and word wrap | [`layout`] |
//! | Shapes, blending, text | [`canvas`] |
//! | Glyph data and metrics | [`font`] |
//!
//! Randomness is injected so tests and `--seed` runs are reproducible.

pub mod canvas;
pub mod font;
pub mod layout;
pub mod palette;

use canvas::Canvas;
use font::Face;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use layout::{fit_title, normalize_cover_text};
use palette::{Palette, pick_palette};
use rand::Rng;
use thiserror::Error;

pub use layout::TitleFit;

pub const WIDTH: u32 = 1600;
pub const HEIGHT: u32 = 2400;
pub const PADDING: f32 = 140.0;
pub const DEFAULT_QUALITY: u8 = 92;

const ACCENT_BAR_HEIGHT: f32 = 26.0;
const ACCENT_DISC_ALPHA: f32 = 0.18;
const TITLE_TOP: u32 = 360;
const TITLE_BOTTOM_RESERVE: u32 = 520;
const TITLE_SHADOW_BLUR: f32 = 14.0;
const TITLE_SHADOW_OFFSET: f32 = 4.0;
const CREATOR_SIZE: u32 = 56;
const DATE_SIZE: u32 = 48;
const META_GAP: f32 = 120.0;
const META_BOTTOM_RESERVE: f32 = 220.0;
const PANEL_INSET: f32 = 12.0;
const PANEL_EXTRA_WIDTH: f32 = 72.0;
const PANEL_RADIUS: f32 = 28.0;

const PLACEHOLDER_SIZE: (u32, u32) = (160, 240);
const PLACEHOLDER_COLOR: [u8; 3] = [0x2f, 0x48, 0x58];

#[derive(Error, Debug)]
pub enum CoverError {
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("encoder produced no data")]
    Empty,
}

/// The strings printed on the cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverText {
    pub title: String,
    pub creator: String,
    /// `YYYY-MM-DD`; the date line is omitted when empty.
    pub export_date: String,
}

/// Where everything on the cover goes. Computed before any drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverLayout {
    pub title: TitleFit,
    pub creator: String,
    pub date: Option<String>,
    /// Top of the creator line.
    pub meta_y: f32,
    pub creator_line_height: f32,
    pub panel: (f32, f32, f32, f32),
}

impl CoverLayout {
    pub fn compute(text: &CoverText) -> Self {
        let title_text = match normalize_cover_text(&text.title) {
            t if t.is_empty() => "To Be Read".to_string(),
            t => t,
        };
        let title = fit_title(
            &title_text,
            WIDTH as f32 - PADDING * 2.0,
            HEIGHT - TITLE_TOP - TITLE_BOTTOM_RESERVE,
        );
        let title_end = (TITLE_TOP + title.height()) as f32;

        let creator = match normalize_cover_text(&text.creator) {
            c if c.is_empty() => "Tsundoku".to_string(),
            c => c,
        };
        let date = Some(normalize_cover_text(&text.export_date)).filter(|d| !d.is_empty());

        let creator_line_height = (CREATOR_SIZE as f32 * 1.16).round();
        let date_line_height = (DATE_SIZE as f32 * 1.2).round();
        let block = creator_line_height + if date.is_some() { date_line_height } else { 0.0 };
        let meta_y = (title_end + META_GAP).max(HEIGHT as f32 - block - META_BOTTOM_RESERVE);

        let creator_face = creator_face();
        let creator_width = creator_face.measure(&creator) + creator_face.overhang();
        let date_width = date.as_deref().map_or(0.0, |d| {
            let face = date_face();
            face.measure(d) + face.overhang()
        });
        let panel = (
            PADDING - PANEL_INSET,
            meta_y - PANEL_INSET,
            creator_width.max(date_width) + PANEL_EXTRA_WIDTH,
            block + PANEL_INSET * 2.0,
        );

        Self {
            title,
            creator,
            date,
            meta_y,
            creator_line_height,
            panel,
        }
    }
}

/// The meta panel is set in the oblique face so it reads apart from the title.
fn creator_face() -> Face {
    Face::bold(CREATOR_SIZE).oblique()
}

fn date_face() -> Face {
    Face::regular(DATE_SIZE).oblique()
}

/// Draw the cover without encoding it.
pub fn render_cover<R: Rng + ?Sized>(text: &CoverText, rng: &mut R) -> RgbImage {
    let palette = pick_palette(rng);
    let layout = CoverLayout::compute(text);
    draw(&palette, &layout).into_image()
}

/// Draw and JPEG-encode the cover.
pub fn build_cover_image<R: Rng + ?Sized>(
    text: &CoverText,
    rng: &mut R,
    quality: u8,
) -> Result<Vec<u8>, CoverError> {
    encode_jpeg(&render_cover(text, rng), quality)
}

/// A small flat-colored JPEG used when the real cover cannot be produced.
pub fn placeholder_cover() -> Result<Vec<u8>, CoverError> {
    let (w, h) = PLACEHOLDER_SIZE;
    let image = RgbImage::from_pixel(w, h, image::Rgb(PLACEHOLDER_COLOR));
    encode_jpeg(&image, 80)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CoverError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).encode_image(image)?;
    if bytes.is_empty() {
        return Err(CoverError::Empty);
    }
    Ok(bytes)
}

fn draw(palette: &Palette, layout: &CoverLayout) -> Canvas {
    let (w, h) = (WIDTH as f32, HEIGHT as f32);
    let mut canvas = Canvas::new(WIDTH, HEIGHT);
    canvas.fill_diagonal_gradient(palette.background, palette.background_alt);
    canvas.fill_rect(0.0, 0.0, w, ACCENT_BAR_HEIGHT, palette.accent);
    canvas.fill_circle(
        w * 0.82,
        h * 0.78,
        w * 0.36,
        palette.accent.with_alpha(ACCENT_DISC_ALPHA),
    );

    let face = layout.title.face();
    let mut y = TITLE_TOP as f32;
    for line in &layout.title.lines {
        canvas.draw_text_with_shadow(
            line,
            PADDING,
            y,
            face,
            palette.text,
            palette.shadow,
            TITLE_SHADOW_BLUR,
            TITLE_SHADOW_OFFSET,
        );
        y += layout.title.line_height as f32;
    }

    let (px, py, pw, ph) = layout.panel;
    canvas.fill_rounded_rect(px, py, pw, ph, PANEL_RADIUS, palette.panel);
    canvas.draw_text(
        &layout.creator,
        PADDING,
        layout.meta_y,
        creator_face(),
        palette.meta,
    );
    if let Some(date) = &layout.date {
        canvas.draw_text(
            date,
            PADDING,
            layout.meta_y + layout.creator_line_height,
            date_face(),
            palette.sub,
        );
    }
    canvas
}
