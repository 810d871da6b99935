//! Choosing which URL an `<img>` really shows, and making it absolute.
//!
//! Saved pages are full of lazy-loading tricks: a 1×1 GIF in `src` with the
//! real image in `data-src`, or only a `srcset` on a `<picture>` source. The
//! order tried is:
//!
//! 1. `src`, unless it looks like a placeholder
//! 2. the first non-placeholder lazy attribute (`data-src`, `data-original`, ...)
//! 3. the best-scoring candidate across every srcset on the image and on the
//!    `<source>` elements of its `<picture>`
//! 4. a placeholder `data:` `src`, as a last resort

use crate::html::decode_attribute;
use url::Url;

pub const LAZY_SRC_ATTRIBUTES: &[&str] = &[
    "data-src",
    "data-original",
    "data-lazy-src",
    "data-actualsrc",
    "data-url",
];

pub const SRCSET_ATTRIBUTES: &[&str] = &["srcset", "data-srcset", "data-lazy-srcset"];

/// Tiny inline GIF/PNG data URLs below this length are treated as spacers.
const PLACEHOLDER_DATA_URL_MAX_LEN: usize = 512;

/// The attributes of one tag, names lowercased and values entity-decoded, in
/// source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagAttributes(Vec<(String, String)>);

impl TagAttributes {
    /// Build from raw `(name, value)` pairs as they appear in the markup.
    /// The first occurrence of a repeated name wins, as in a browser.
    pub fn from_raw(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        pairs
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), decode_attribute(&value)))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| n != name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for TagAttributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut attrs = TagAttributes::default();
        for (name, value) in iter {
            if attrs.get(&name).is_none() {
                attrs.0.push((name, value));
            }
        }
        attrs
    }
}

pub fn is_placeholder_src(src: &str) -> bool {
    let src = src.trim();
    if src.is_empty() || src == "#" || src.eq_ignore_ascii_case("about:blank") {
        return true;
    }
    let lower = src.get(..15).unwrap_or(src).to_ascii_lowercase();
    (lower.starts_with("data:image/gif") || lower.starts_with("data:image/png"))
        && src.len() < PLACEHOLDER_DATA_URL_MAX_LEN
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Descriptor {
    Width(f64),
    Density(f64),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SrcsetCandidate {
    pub url: String,
    pub descriptor: Descriptor,
}

impl SrcsetCandidate {
    /// `format_preference * 100000 + size`, where size is the width
    /// descriptor, the density × 1000, or 0.
    pub fn score(&self) -> f64 {
        let size = match self.descriptor {
            Descriptor::Width(w) => w,
            Descriptor::Density(x) => x * 1000.0,
            Descriptor::None => 0.0,
        };
        format_preference(&self.url) as f64 * 100_000.0 + size
    }
}

/// How well an EPUB reader is likely to handle the image format at `url`,
/// judged by its extension.
pub fn format_preference(url: &str) -> u32 {
    match url_extension(url).as_deref() {
        Some("jpg" | "jpeg" | "png") => 3,
        Some("gif" | "svg" | "bmp" | "tif" | "tiff") => 2,
        _ => 1,
    }
}

/// Lowercased extension of the path part of a (possibly relative) URL.
pub fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty() && ext.len() <= 5).then(|| ext.to_ascii_lowercase())
}

/// Parse a `srcset` value into candidates, following the HTML splitting rules
/// closely enough that commas inside URLs survive.
pub fn parse_srcset(value: &str) -> Vec<SrcsetCandidate> {
    let mut candidates = Vec::new();
    let mut rest = value;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }
        let url_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let raw_url = &rest[..url_end];
        rest = &rest[url_end..];

        let trimmed_url = raw_url.trim_end_matches(',');
        if trimmed_url.len() != raw_url.len() {
            // "a.jpg," ends the candidate with no descriptor.
            candidates.push(SrcsetCandidate {
                url: trimmed_url.to_string(),
                descriptor: Descriptor::None,
            });
            continue;
        }

        let descriptor_end = descriptor_end(rest);
        let descriptor = parse_descriptor(rest[..descriptor_end].trim());
        rest = &rest[descriptor_end..];
        if !raw_url.is_empty() {
            candidates.push(SrcsetCandidate {
                url: raw_url.to_string(),
                descriptor,
            });
        }
    }
    candidates
}

/// End of the descriptor list: the first comma outside parentheses.
fn descriptor_end(s: &str) -> usize {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return i,
            _ => {}
        }
    }
    s.len()
}

fn parse_descriptor(s: &str) -> Descriptor {
    for token in s.split_whitespace() {
        let Some((idx, unit)) = token.char_indices().last() else {
            continue;
        };
        let Ok(value) = token[..idx].parse::<f64>() else {
            continue;
        };
        match unit {
            'w' | 'W' => return Descriptor::Width(value),
            'x' | 'X' => return Descriptor::Density(value),
            _ => {}
        }
    }
    Descriptor::None
}

/// Highest-scoring candidate across several srcset values; the first wins a
/// tie.
pub fn best_srcset_candidate<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut best: Option<(f64, String)> = None;
    for candidate in values.into_iter().flat_map(parse_srcset) {
        let score = candidate.score();
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, candidate.url));
        }
    }
    best.map(|(_, url)| url)
}

/// The URL this image should be embedded from, before resolution.
pub fn select_image_source(
    img: &TagAttributes,
    picture_sources: &[TagAttributes],
) -> Option<String> {
    let src = img.get("src").map(str::trim).unwrap_or("");
    if !is_placeholder_src(src) {
        return Some(src.to_string());
    }

    if let Some(lazy) = LAZY_SRC_ATTRIBUTES
        .iter()
        .filter_map(|name| img.get(name))
        .map(str::trim)
        .find(|value| !is_placeholder_src(value))
    {
        return Some(lazy.to_string());
    }

    let srcsets = SRCSET_ATTRIBUTES
        .iter()
        .filter_map(|name| img.get(name))
        .chain(
            picture_sources
                .iter()
                .flat_map(|source| ["srcset", "data-srcset"].map(|name| source.get(name)))
                .flatten(),
        );
    if let Some(best) = best_srcset_candidate(srcsets) {
        return Some(best);
    }

    let is_data_url = src.len() > 5 && src.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:"));
    is_data_url.then(|| src.to_string())
}

/// Where a chosen source points, after resolution against the page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    /// Inline `data:` URL, decoded locally.
    Data(String),
    /// `blob:` URL, which cannot be read outside the browser.
    Blob(String),
    Remote(Url),
    /// Not something that can be embedded (`javascript:`, `mailto:`, a
    /// relative URL with no base, ...).
    Rejected(String),
}

impl ResolvedSource {
    /// The absolute URL a failed image should keep pointing at, so the
    /// reader can still load it online.
    pub fn remote_fallback(&self) -> Option<String> {
        match self {
            ResolvedSource::Remote(url) => Some(url.to_string()),
            _ => None,
        }
    }

    /// Key used to deduplicate images within one export.
    pub fn cache_key(&self) -> &str {
        match self {
            ResolvedSource::Data(s) | ResolvedSource::Blob(s) | ResolvedSource::Rejected(s) => s,
            ResolvedSource::Remote(url) => url.as_str(),
        }
    }
}

pub fn resolve_source(raw: &str, base: Option<&Url>) -> ResolvedSource {
    let raw = raw.trim();
    let scheme = raw
        .split_once(':')
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)));
    match scheme.as_deref() {
        Some("data") => return ResolvedSource::Data(raw.to_string()),
        Some("blob") => return ResolvedSource::Blob(raw.to_string()),
        _ => {}
    }

    let parsed = match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(raw),
            None => return ResolvedSource::Rejected(raw.to_string()),
        },
        Err(e) => Err(e),
    };
    match parsed {
        Ok(url) if matches!(url.scheme(), "http" | "https") => ResolvedSource::Remote(url),
        _ => ResolvedSource::Rejected(raw.to_string()),
    }
}
