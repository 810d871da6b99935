//! Image embedding: finding, fetching and repacking every image an article
//! shows.
//!
//! | Step | Module |
//! |---|---|
//! | Pick the real source (lazy attributes, srcset, `<picture>`) | [`source`] |
//! | Resolve against the article URL, reject non-http schemes | [`source`] |
//! | Fetch over HTTP (cookie-carrying, size-capped) | [`fetch`] |
//! | Decode inline `data:` URLs | [`data_url`] |
//! | Media type, extension, BMP/TIFF → PNG | [`media`] |
//! | Rewrite tags, dedupe by URL, number assets | [`embed`] |
//!
//! Per-image failures never abort an export: the tag keeps its original URL
//! and the failure is logged and counted.

pub mod data_url;
pub mod embed;
pub mod fetch;
pub mod media;
pub mod source;

pub use embed::{EmbedContext, EmbedStats, inline_images_in_html, prepare_images_for_epub};
pub use fetch::{FetchError, FetchResponse, Fetcher, HttpFetcher, HttpOptions};
