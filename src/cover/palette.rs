//! Cover color schemes.
//!
//! A palette is one random hue plus a coin flip between a dark and a light
//! theme. The background runs from the base hue to a slightly shifted hue; the
//! accent sits roughly opposite on the color wheel.

use rand::Rng;

/// Probability of the dark theme.
const DARK_PROBABILITY: f64 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Opacity in `0.0..=1.0`.
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// Convert HSL (`hue` in degrees, `saturation`/`lightness` in percent) to RGB.
pub fn hsl(hue: f32, saturation: f32, lightness: f32) -> Color {
    let h = hue.rem_euclid(360.0) / 60.0;
    let s = (saturation / 100.0).clamp(0.0, 1.0);
    let l = (lightness / 100.0).clamp(0.0, 1.0);

    let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = l - chroma / 2.0;
    let channel = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Color::rgb(channel(r), channel(g), channel(b))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub dark: bool,
    pub hue: u16,
    pub accent_hue: u16,
    pub background: Color,
    pub background_alt: Color,
    pub accent: Color,
    /// Title ink.
    pub text: Color,
    /// Creator line.
    pub meta: Color,
    /// Date line.
    pub sub: Color,
    pub panel: Color,
    pub shadow: Color,
}

impl Palette {
    pub fn new(hue: u16, dark: bool, accent_offset: u16) -> Self {
        let hue = hue % 360;
        let accent_hue = (hue + 160 + accent_offset) % 360;
        let pick = |dark_value: f32, light_value: f32| if dark { dark_value } else { light_value };
        let (text, meta, sub, panel, shadow) = if dark {
            (
                Color::rgb(0xfe, 0xf6, 0xe8),
                Color::rgba(254, 246, 232, 0.9),
                Color::rgba(254, 246, 232, 0.75),
                Color::rgba(0, 0, 0, 0.32),
                Color::rgba(0, 0, 0, 0.35),
            )
        } else {
            (
                Color::rgb(0x1b, 0x1b, 0x1b),
                Color::rgb(0x2f, 0x48, 0x58),
                Color::rgb(0x6b, 0x6b, 0x6b),
                Color::rgba(255, 255, 255, 0.7),
                Color::rgba(0, 0, 0, 0.18),
            )
        };
        Self {
            dark,
            hue,
            accent_hue,
            background: hsl(hue as f32, 42.0, pick(22.0, 88.0)),
            background_alt: hsl(((hue + 18) % 360) as f32, 45.0, pick(30.0, 78.0)),
            accent: hsl(accent_hue as f32, 72.0, pick(64.0, 38.0)),
            text,
            meta,
            sub,
            panel,
            shadow,
        }
    }
}

pub fn pick_palette<R: Rng + ?Sized>(rng: &mut R) -> Palette {
    let hue = rng.gen_range(0..360u16);
    let dark = rng.gen_bool(DARK_PROBABILITY);
    let accent_offset = rng.gen_range(0..40u16);
    Palette::new(hue, dark, accent_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn hsl_primaries() {
        assert_eq!(hsl(0.0, 100.0, 50.0), Color::rgb(255, 0, 0));
        assert_eq!(hsl(120.0, 100.0, 50.0), Color::rgb(0, 255, 0));
        assert_eq!(hsl(240.0, 100.0, 50.0), Color::rgb(0, 0, 255));
        assert_eq!(hsl(360.0, 100.0, 50.0), Color::rgb(255, 0, 0));
    }

    #[test]
    fn hsl_greys_ignore_hue() {
        assert_eq!(hsl(200.0, 0.0, 0.0), Color::rgb(0, 0, 0));
        assert_eq!(hsl(200.0, 0.0, 100.0), Color::rgb(255, 255, 255));
        assert_eq!(hsl(37.0, 0.0, 50.0), Color::rgb(128, 128, 128));
    }

    #[test]
    fn dark_theme_colors() {
        let p = Palette::new(200, true, 10);
        assert_eq!(p.accent_hue, 10);
        assert_eq!(p.text, Color::rgb(0xfe, 0xf6, 0xe8));
        assert_eq!(p.panel.a, 0.32);
        assert_eq!(p.background, hsl(200.0, 42.0, 22.0));
        assert_eq!(p.background_alt, hsl(218.0, 45.0, 30.0));
        assert_eq!(p.accent, hsl(10.0, 72.0, 64.0));
    }

    #[test]
    fn light_theme_colors() {
        let p = Palette::new(350, false, 0);
        assert_eq!(p.text, Color::rgb(0x1b, 0x1b, 0x1b));
        assert_eq!(p.meta, Color::rgb(0x2f, 0x48, 0x58));
        assert_eq!(p.background_alt, hsl(8.0, 45.0, 78.0));
        assert_eq!(p.accent_hue, 150);
    }

    #[test]
    fn seeded_palettes_are_reproducible_and_in_range() {
        for seed in 0..50 {
            let a = pick_palette(&mut StdRng::seed_from_u64(seed));
            let b = pick_palette(&mut StdRng::seed_from_u64(seed));
            assert_eq!(a, b);
            assert!(a.hue < 360);
            let offset = (a.accent_hue + 720 - a.hue - 160) % 360;
            assert!(offset < 40, "accent offset {offset} for seed {seed}");
        }
    }

    #[test]
    fn both_themes_occur() {
        let mut rng = StdRng::seed_from_u64(7);
        let darks = (0..200).filter(|_| pick_palette(&mut rng).dark).count();
        assert!(darks > 40 && darks < 160, "dark count {darks}");
    }
}
