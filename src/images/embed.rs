//! Rewriting article HTML so every image it shows travels with the book.
//!
//! [`prepare_images_for_epub`] turns each image into a package asset
//! (`images/img-N.ext`) and points the tag at it; [`inline_images_in_html`]
//! turns each image into a `data:` URL instead, for callers that store a
//! single self-contained HTML string. Both stream the markup through
//! `lol_html` element handlers and share source selection; they differ only in
//! what the chosen image becomes. Markup other than `<img>` and
//! `<picture><source>` passes through byte for byte.
//!
//! Images are handled one at a time in document order. Within an
//! [`EmbedContext`] a resolved URL is fetched at most once: later references
//! reuse the asset, and a URL that failed stays failed. A failed http(s)
//! image keeps pointing at its absolute remote URL.

use super::data_url::{decode_data_url, encode_data_url};
use super::fetch::{DEFAULT_MAX_IMAGE_BYTES, FetchError, Fetcher};
use super::media::{extension_for_mime, needs_transcode, resolve_media_type, transcode_to_png};
use super::source::{
    LAZY_SRC_ATTRIBUTES, ResolvedSource, SRCSET_ATTRIBUTES, TagAttributes, resolve_source,
    select_image_source,
};
use crate::html::xhtml_empty_element;
use crate::types::ImageAsset;
use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

/// Attributes dropped from a rewritten `<img>` so readers use the new `src`.
const STRIPPED_ATTRIBUTES: &[&str] = &["sizes"];

/// Per-export image counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedStats {
    /// `<img>` tags with a usable source.
    pub found: usize,
    /// Distinct images turned into assets.
    pub embedded: usize,
    /// References satisfied from the cache.
    pub reused: usize,
    /// References left pointing at their remote URL.
    pub failed: usize,
}

impl EmbedStats {
    /// Counts accumulated since `earlier` was taken.
    pub fn since(&self, earlier: &EmbedStats) -> EmbedStats {
        EmbedStats {
            found: self.found - earlier.found,
            embedded: self.embedded - earlier.embedded,
            reused: self.reused - earlier.reused,
            failed: self.failed - earlier.failed,
        }
    }
}

#[derive(Debug, Clone)]
enum CacheEntry {
    /// Asset href relative to `OEBPS/`.
    Embedded(String),
    Failed,
}

/// Image state for one export: the URL cache, the assets created so far and
/// the next asset number.
#[derive(Debug)]
pub struct EmbedContext {
    cache: HashMap<String, CacheEntry>,
    assets: Vec<ImageAsset>,
    next_id: usize,
    stats: EmbedStats,
    max_image_bytes: usize,
}

impl Default for EmbedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbedContext {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            assets: Vec::new(),
            next_id: 1,
            stats: EmbedStats::default(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_bytes(mut self, limit: usize) -> Self {
        self.max_image_bytes = limit;
        self
    }

    pub fn assets(&self) -> &[ImageAsset] {
        &self.assets
    }

    pub fn into_assets(self) -> Vec<ImageAsset> {
        self.assets
    }

    pub fn stats(&self) -> EmbedStats {
        self.stats
    }

    /// Chapter-relative `src` for `raw`, embedding it first if needed. A
    /// failed http(s) image yields its absolute URL; `None` leaves the tag
    /// untouched.
    fn embed(&mut self, raw: &str, base: Option<&Url>, fetcher: &dyn Fetcher) -> Option<String> {
        self.stats.found += 1;
        let resolved = resolve_source(raw, base);
        let key = resolved.cache_key().to_string();

        match self.cache.get(&key) {
            Some(CacheEntry::Embedded(href)) => {
                self.stats.reused += 1;
                return Some(format!("../{href}"));
            }
            Some(CacheEntry::Failed) => {
                self.stats.failed += 1;
                return resolved.remote_fallback();
            }
            None => {}
        }

        match load_image(&resolved, fetcher, self.max_image_bytes) {
            Ok(image) => {
                let href = self.push_asset(image.media_type, image.data);
                debug!(url = %truncate(&key), %href, "embedded image");
                self.cache.insert(key, CacheEntry::Embedded(href.clone()));
                self.stats.embedded += 1;
                Some(format!("../{href}"))
            }
            Err(error) => {
                warn!(url = %truncate(&key), %error, "image not embedded");
                self.cache.insert(key, CacheEntry::Failed);
                self.stats.failed += 1;
                resolved.remote_fallback()
            }
        }
    }

    fn push_asset(&mut self, media_type: String, data: Vec<u8>) -> String {
        let (media_type, data) = if needs_transcode(&media_type) {
            match transcode_to_png(&data) {
                Ok(png) => ("image/png".to_string(), png),
                Err(error) => {
                    warn!(%media_type, %error, "could not convert image to PNG, keeping original");
                    (media_type, data)
                }
            }
        } else {
            (media_type, data)
        };

        let n = self.next_id;
        self.next_id += 1;
        let href = format!("images/img-{n}.{}", extension_for_mime(&media_type));
        self.assets.push(ImageAsset {
            id: format!("img-{n}"),
            href: href.clone(),
            media_type,
            data,
        });
        href
    }
}

struct LoadedImage {
    media_type: String,
    data: Vec<u8>,
}

fn load_image(
    resolved: &ResolvedSource,
    fetcher: &dyn Fetcher,
    max_bytes: usize,
) -> Result<LoadedImage, FetchError> {
    let (media_type, data) = match resolved {
        ResolvedSource::Data(url) => {
            let decoded = decode_data_url(url).ok_or(FetchError::BadDataUrl)?;
            if !decoded.mime.starts_with("image/") {
                return Err(FetchError::NotAnImage(decoded.mime));
            }
            (resolve_media_type(Some(&decoded.mime), None), decoded.data)
        }
        ResolvedSource::Blob(_) => return Err(FetchError::Blob),
        ResolvedSource::Rejected(raw) => return Err(FetchError::UnsupportedUrl(raw.clone())),
        ResolvedSource::Remote(url) => {
            let response = fetcher.fetch(url)?;
            if !response.is_success() {
                return Err(FetchError::Status(response.status));
            }
            let media_type = resolve_media_type(response.content_type.as_deref(), Some(url.path()));
            (media_type, response.body)
        }
    };
    if data.is_empty() {
        return Err(FetchError::EmptyBody);
    }
    if data.len() > max_bytes {
        return Err(FetchError::TooLarge {
            size: data.len(),
            limit: max_bytes,
        });
    }
    Ok(LoadedImage { media_type, data })
}

/// Embed every image in `html` into `ctx` and return the rewritten HTML.
///
/// `base_url` is the article's own URL, used to resolve relative sources; it
/// may be empty. Images that cannot be embedded keep their remote URL, or
/// their original tag when there is none.
pub fn prepare_images_for_epub(
    html: &str,
    base_url: &str,
    ctx: &mut EmbedContext,
    fetcher: &dyn Fetcher,
) -> String {
    let base = parse_base(base_url);
    rewrite_images(html, |raw| ctx.embed(raw, base.as_ref(), fetcher))
}

/// Replace every image source in `html` with a `data:` URL.
///
/// Uses the same source selection as [`prepare_images_for_epub`], with a URL
/// cache that lives only for this call.
pub fn inline_images_in_html(html: &str, base_url: &str, fetcher: &dyn Fetcher) -> String {
    let base = parse_base(base_url);
    let mut cache: HashMap<String, Option<String>> = HashMap::new();
    rewrite_images(html, |raw| {
        let resolved = resolve_source(raw, base.as_ref());
        if let ResolvedSource::Data(url) = &resolved {
            return Some(url.clone());
        }
        let key = resolved.cache_key().to_string();
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }
        let inlined = match load_image(&resolved, fetcher, DEFAULT_MAX_IMAGE_BYTES) {
            Ok(image) => Some(encode_data_url(&image.media_type, &image.data)),
            Err(error) => {
                warn!(url = %truncate(&key), %error, "image not inlined");
                resolved.remote_fallback()
            }
        };
        cache.insert(key, inlined.clone());
        inlined
    })
}

fn parse_base(base_url: &str) -> Option<Url> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(url) => Some(url),
        Err(error) => {
            warn!(base_url = trimmed, %error, "ignoring unparseable article URL");
            None
        }
    }
}

/// Stream `html` through `lol_html`, handing each image's chosen source to
/// `embed`. When `embed` returns a new `src`, the `<img>` is replaced by a
/// self-closing XHTML tag pointing at it, without its lazy-loading and
/// responsive attributes. `<source>` children of `<picture>` are dropped;
/// their srcsets feed the `<img>` selection instead.
fn rewrite_images(html: &str, embed: impl FnMut(&str) -> Option<String>) -> String {
    let embed = RefCell::new(embed);
    let picture_sources: RefCell<Vec<TagAttributes>> = RefCell::new(Vec::new());
    let in_picture = Cell::new(false);

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("picture", |_el| {
                    picture_sources.borrow_mut().clear();
                    Ok(())
                }),
                element!("picture > source", |el| {
                    let attrs = TagAttributes::from_raw(
                        el.attributes().iter().map(|a| (a.name(), a.value())),
                    );
                    picture_sources.borrow_mut().push(attrs);
                    el.remove();
                    Ok(())
                }),
                // Registered before "img" so the flag is set when it runs.
                element!("picture img", |_el| {
                    in_picture.set(true);
                    Ok(())
                }),
                element!("img", |el| {
                    let attrs = TagAttributes::from_raw(
                        el.attributes().iter().map(|a| (a.name(), a.value())),
                    );
                    let sources = if in_picture.replace(false) {
                        std::mem::take(&mut *picture_sources.borrow_mut())
                    } else {
                        Vec::new()
                    };
                    let new_src = select_image_source(&attrs, &sources).and_then(|source| {
                        let mut embed = embed.borrow_mut();
                        (*embed)(&source)
                    });
                    if let Some(src) = new_src {
                        el.replace(&rewritten_tag(attrs, src), ContentType::Html);
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    );
    match rewritten {
        Ok(out) => out,
        Err(error) => {
            warn!(%error, "could not rewrite article images, keeping the HTML as is");
            html.to_string()
        }
    }
}

fn rewritten_tag(mut attrs: TagAttributes, src: String) -> String {
    attrs.set("src", src);
    for name in SRCSET_ATTRIBUTES
        .iter()
        .chain(LAZY_SRC_ATTRIBUTES)
        .chain(STRIPPED_ATTRIBUTES)
    {
        attrs.remove(name);
    }
    xhtml_empty_element("img", attrs.iter())
}

/// Data URLs make for unreadable log lines.
fn truncate(url: &str) -> &str {
    match url.char_indices().nth(120) {
        Some((idx, _)) => &url[..idx],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::fetch::FetchResponse;
    use crate::test_helpers::{MockFetcher, png_bytes};

    const PAGE: &str = "https://example.test/posts/1";

    #[test]
    fn remote_image_becomes_asset() {
        let fetcher = MockFetcher::new().with_image("https://example.test/a.jpg", "image/jpeg", b"JPEG");
        let mut ctx = EmbedContext::new();
        let html = prepare_images_for_epub(r#"<p><img src="/a.jpg" alt="A"></p>"#, PAGE, &mut ctx, &fetcher);

        assert_eq!(html, r#"<p><img src="../images/img-1.jpg" alt="A"/></p>"#);
        let assets = ctx.assets();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].id, "img-1");
        assert_eq!(assets[0].href, "images/img-1.jpg");
        assert_eq!(assets[0].media_type, "image/jpeg");
        assert_eq!(assets[0].data, b"JPEG");
    }

    #[test]
    fn same_url_is_fetched_once() {
        let fetcher = MockFetcher::new().with_image("https://x.test/a.jpg", "image/jpeg", b"A");
        let mut ctx = EmbedContext::new();
        let html = r#"<img src="https://x.test/a.jpg">"#;
        let first = prepare_images_for_epub(html, "", &mut ctx, &fetcher);
        let second = prepare_images_for_epub(html, "", &mut ctx, &fetcher);

        assert_eq!(first, second);
        assert!(first.contains("../images/img-1.jpg"));
        assert_eq!(ctx.assets().len(), 1);
        assert_eq!(fetcher.calls(), vec!["https://x.test/a.jpg"]);
        assert_eq!(ctx.stats().reused, 1);
    }

    #[test]
    fn ids_count_up_in_document_order() {
        let fetcher = MockFetcher::new()
            .with_image("https://x.test/a.png", "image/png", b"A")
            .with_image("https://x.test/b.gif", "image/gif", b"B");
        let mut ctx = EmbedContext::new();
        let html = prepare_images_for_epub(
            r#"<img src="https://x.test/a.png"><img src="https://x.test/b.gif">"#,
            "",
            &mut ctx,
            &fetcher,
        );
        assert_eq!(
            html,
            r#"<img src="../images/img-1.png"/><img src="../images/img-2.gif"/>"#
        );
    }

    #[test]
    fn data_urls_are_decoded_without_fetching() {
        let fetcher = MockFetcher::new();
        let mut ctx = EmbedContext::new();
        let src = format!("data:image/png;base64,{}", "QUJD".repeat(200));
        let html = prepare_images_for_epub(&format!(r#"<img src="{src}">"#), PAGE, &mut ctx, &fetcher);

        assert_eq!(html, r#"<img src="../images/img-1.png"/>"#);
        assert!(fetcher.calls().is_empty());
        assert_eq!(ctx.assets()[0].data, b"ABC".repeat(200));
    }

    #[test]
    fn lazy_source_is_used_and_lazy_attributes_removed() {
        let fetcher = MockFetcher::new().with_image("https://example.test/real.jpg", "image/jpeg", b"R");
        let mut ctx = EmbedContext::new();
        let html = prepare_images_for_epub(
            r#"<img src="data:image/gif;base64,R0lGOD" data-src="/real.jpg" srcset="x.jpg 2x" sizes="50vw" class="lazy">"#,
            PAGE,
            &mut ctx,
            &fetcher,
        );
        assert_eq!(html, r#"<img src="../images/img-1.jpg" class="lazy"/>"#);
    }

    #[test]
    fn srcset_picks_widest_candidate() {
        let fetcher = MockFetcher::new()
            .with_image("https://example.test/a.jpg", "image/jpeg", b"small")
            .with_image("https://example.test/b.jpg", "image/jpeg", b"large");
        let mut ctx = EmbedContext::new();
        prepare_images_for_epub(r#"<img srcset="/a.jpg 480w, /b.jpg 960w">"#, PAGE, &mut ctx, &fetcher);
        assert_eq!(fetcher.calls(), vec!["https://example.test/b.jpg"]);
        assert_eq!(ctx.assets()[0].data, b"large");
    }

    #[test]
    fn picture_sources_are_consumed() {
        let fetcher = MockFetcher::new().with_image("https://example.test/p.jpg", "image/jpeg", b"P");
        let mut ctx = EmbedContext::new();
        let html = prepare_images_for_epub(
            r#"<picture><source srcset="/p.webp 1200w" type="image/webp"><source srcset="/p.jpg 800w"><img src="" alt="p"></picture>"#,
            PAGE,
            &mut ctx,
            &fetcher,
        );
        assert_eq!(html, r#"<picture><img src="../images/img-1.jpg" alt="p"/></picture>"#);
    }

    #[test]
    fn media_sources_outside_picture_are_kept() {
        let fetcher = MockFetcher::new();
        let mut ctx = EmbedContext::new();
        let html = r#"<video><source src="/v.mp4"></video>"#;
        assert_eq!(prepare_images_for_epub(html, PAGE, &mut ctx, &fetcher), html);
    }

    #[test]
    fn failed_fetch_keeps_remote_url_and_is_not_retried() {
        let fetcher = MockFetcher::new().with_response(
            "https://x.test/missing.jpg",
            FetchResponse {
                status: 404,
                content_type: Some("text/html".into()),
                body: b"nope".to_vec(),
            },
        );
        let mut ctx = EmbedContext::new();
        let html = r#"<img src="https://x.test/missing.jpg"><img src="https://x.test/missing.jpg">"#;
        let out = prepare_images_for_epub(html, "", &mut ctx, &fetcher);

        assert_eq!(
            out,
            r#"<img src="https://x.test/missing.jpg"/><img src="https://x.test/missing.jpg"/>"#
        );
        assert!(ctx.assets().is_empty());
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(ctx.stats().failed, 2);
    }

    #[test]
    fn failed_lazy_image_points_at_real_source() {
        let fetcher = MockFetcher::new();
        let mut ctx = EmbedContext::new();
        let html = r#"<img src="data:image/gif;base64,R0lGOD" data-src="https://x.test/real.jpg">"#;
        let out = prepare_images_for_epub(html, PAGE, &mut ctx, &fetcher);
        assert_eq!(out, r#"<img src="https://x.test/real.jpg"/>"#);
        assert_eq!(ctx.stats().failed, 1);
    }

    #[test]
    fn failed_picture_image_gets_source_url() {
        let fetcher = MockFetcher::new();
        let mut ctx = EmbedContext::new();
        let html = r#"<picture><source srcset="/p.jpg 800w"><img src="" alt="p"></picture>"#;
        let out = prepare_images_for_epub(html, PAGE, &mut ctx, &fetcher);
        assert_eq!(out, r#"<picture><img src="https://example.test/p.jpg" alt="p"/></picture>"#);
    }

    #[test]
    fn failed_relative_source_is_made_absolute() {
        let fetcher = MockFetcher::new();
        let mut ctx = EmbedContext::new();
        let out = prepare_images_for_epub(r#"<img src="pics/a.png">"#, PAGE, &mut ctx, &fetcher);
        assert_eq!(out, r#"<img src="https://example.test/posts/pics/a.png"/>"#);
    }

    #[test]
    fn non_image_data_url_is_not_embedded() {
        let fetcher = MockFetcher::new();
        let mut ctx = EmbedContext::new();
        let html = r#"<img src="data:text/html,%3Cb%3Ehi%3C/b%3E">"#;
        assert_eq!(prepare_images_for_epub(html, PAGE, &mut ctx, &fetcher), html);
        assert!(ctx.assets().is_empty());
        assert_eq!(ctx.stats().failed, 1);
    }

    #[test]
    fn entity_encoded_source_is_decoded_before_fetching() {
        let fetcher = MockFetcher::new().with_image("https://x.test/i?a=1&b=2", "image/png", b"P");
        let mut ctx = EmbedContext::new();
        let out = prepare_images_for_epub(
            r#"<img src="https://x.test/i?a=1&amp;b=2">"#,
            "",
            &mut ctx,
            &fetcher,
        );
        assert_eq!(out, r#"<img src="../images/img-1.png"/>"#);
        assert_eq!(fetcher.calls(), vec!["https://x.test/i?a=1&b=2"]);
    }

    #[test]
    fn empty_and_oversize_bodies_fail() {
        let fetcher = MockFetcher::new()
            .with_image("https://x.test/empty.jpg", "image/jpeg", b"")
            .with_image("https://x.test/big.jpg", "image/jpeg", &[0u8; 64]);
        let mut ctx = EmbedContext::new().with_max_image_bytes(32);
        let out = prepare_images_for_epub(
            r#"<img src="https://x.test/empty.jpg"><img src="https://x.test/big.jpg">"#,
            "",
            &mut ctx,
            &fetcher,
        );
        assert!(!out.contains("images/img-"));
        assert_eq!(ctx.stats().failed, 2);
    }

    #[test]
    fn blob_and_javascript_sources_fail_without_fetching() {
        let fetcher = MockFetcher::new();
        let mut ctx = EmbedContext::new();
        let html = r#"<img src="blob:https://x.test/1"><img src="javascript:alert(1)">"#;
        assert_eq!(prepare_images_for_epub(html, PAGE, &mut ctx, &fetcher), html);
        assert!(fetcher.calls().is_empty());
        assert_eq!(ctx.stats().failed, 2);
    }

    #[test]
    fn unknown_content_type_uses_extension() {
        let fetcher = MockFetcher::new().with_image("https://x.test/a.gif", "application/octet-stream", b"G");
        let mut ctx = EmbedContext::new();
        prepare_images_for_epub(r#"<img src="https://x.test/a.gif">"#, "", &mut ctx, &fetcher);
        assert_eq!(ctx.assets()[0].media_type, "image/gif");
        assert_eq!(ctx.assets()[0].href, "images/img-1.gif");
    }

    #[test]
    fn bmp_is_converted_to_png() {
        let bmp = crate::test_helpers::bmp_bytes();
        let fetcher = MockFetcher::new().with_image("https://x.test/a.bmp", "image/bmp", &bmp);
        let mut ctx = EmbedContext::new();
        let html = prepare_images_for_epub(r#"<img src="https://x.test/a.bmp">"#, "", &mut ctx, &fetcher);
        assert_eq!(html, r#"<img src="../images/img-1.png"/>"#);
        assert_eq!(ctx.assets()[0].media_type, "image/png");
        assert_eq!(&ctx.assets()[0].data[..4], b"\x89PNG");
    }

    #[test]
    fn non_image_markup_is_untouched() {
        let fetcher = MockFetcher::new();
        let mut ctx = EmbedContext::new();
        let html = "<p class=x>Fish &amp; chips<br>more</p><!-- c -->";
        assert_eq!(prepare_images_for_epub(html, PAGE, &mut ctx, &fetcher), html);
    }

    #[test]
    fn inline_rewrites_to_data_urls() {
        let png = png_bytes();
        let fetcher = MockFetcher::new().with_image("https://example.test/i.png", "image/png", &png);
        let html = inline_images_in_html(
            r#"<img src="/i.png"><img src="/i.png">"#,
            PAGE,
            &fetcher,
        );
        let expected_src = encode_data_url("image/png", &png);
        assert_eq!(html.matches(&expected_src).count(), 2);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[test]
    fn inline_keeps_failed_images_remote() {
        let fetcher = MockFetcher::new();
        let html = r#"<img src="https://x.test/gone.jpg">"#;
        assert_eq!(
            inline_images_in_html(html, PAGE, &fetcher),
            r#"<img src="https://x.test/gone.jpg"/>"#
        );
    }

    #[test]
    fn stats_since_subtracts() {
        let earlier = EmbedStats { found: 1, embedded: 1, reused: 0, failed: 0 };
        let later = EmbedStats { found: 4, embedded: 2, reused: 1, failed: 1 };
        assert_eq!(
            later.since(&earlier),
            EmbedStats { found: 3, embedded: 1, reused: 1, failed: 1 }
        );
    }
}
