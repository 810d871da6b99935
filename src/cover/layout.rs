//! Title fitting and word wrapping for the cover.

use super::font::{Face, fold_to_ascii};

pub const TITLE_MAX_SIZE: u32 = 132;
pub const TITLE_MIN_SIZE: u32 = 84;
pub const TITLE_SIZE_STEP: u32 = 4;
pub const TITLE_MAX_LINES: usize = 6;
const TITLE_LINE_HEIGHT_RATIO: f32 = 1.18;

/// Fold to the font's character set, collapse whitespace runs to single
/// spaces and trim.
pub fn normalize_cover_text(text: &str) -> String {
    fold_to_ascii(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Greedy word wrap. A word wider than `max_width` gets a line of its own
/// rather than being broken.
pub fn wrap_text(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if measure(&candidate) > max_width {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleFit {
    pub lines: Vec<String>,
    pub font_size: u32,
    pub line_height: u32,
}

impl TitleFit {
    pub fn face(&self) -> Face {
        Face::bold(self.font_size)
    }

    pub fn height(&self) -> u32 {
        self.lines.len() as u32 * self.line_height
    }
}

pub fn line_height(size: u32) -> u32 {
    (size as f32 * TITLE_LINE_HEIGHT_RATIO).round() as u32
}

/// Pick the largest title size (132 down to 84 in steps of 4) at which the
/// wrapped title has at most six lines and fits `max_height`. If none does,
/// use the smallest size and cut the title to the lines that fit, ending the
/// last kept line with `...`.
pub fn fit_title(text: &str, max_width: f32, max_height: u32) -> TitleFit {
    let mut size = TITLE_MAX_SIZE;
    while size >= TITLE_MIN_SIZE {
        let face = Face::bold(size);
        let lines = wrap_text(text, max_width, |s| face.measure(s));
        let lh = line_height(size);
        if lines.len() <= TITLE_MAX_LINES && lines.len() as u32 * lh <= max_height {
            return TitleFit {
                lines,
                font_size: size,
                line_height: lh,
            };
        }
        size -= TITLE_SIZE_STEP;
    }

    let face = Face::bold(TITLE_MIN_SIZE);
    let lh = line_height(TITLE_MIN_SIZE);
    let max_lines = ((max_height / lh) as usize).clamp(1, TITLE_MAX_LINES);
    let mut lines = wrap_text(text, max_width, |s| face.measure(s));
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            *last = format!("{}...", last.trim_end());
        }
    }
    TitleFit {
        lines,
        font_size: TITLE_MIN_SIZE,
        line_height: lh,
    }
}
