//! # Tsundoku EPUB
//!
//! Turns a queue of saved web articles into one self-contained EPUB 3 book
//! that reads offline on any e-reader. Each article becomes a chapter, every
//! image it shows is downloaded and packaged, and a cover is drawn for the
//! book on the spot.
//!
//! # Pipeline
//!
//! ```text
//! items.json ──► queue ──► &[ArticleItem]
//!                              │
//!                              ▼
//!                     epub::build_epub ──► Vec<u8> (.epub)
//!                 ┌────────┬───┴─────┬─────────┐
//!              images   chapter   cover    package
//!                 └────────┴───┬─────┴─────────┘
//!                              ▼
//!                        archive::build_zip
//! ```
//!
//! The library never touches the filesystem on its own: the caller supplies
//! articles and a [`images::Fetcher`], and gets bytes back. The binary wires
//! in [`queue::JsonQueue`], [`images::HttpFetcher`] and [`config`].
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`epub`] | Orchestrator: sequences everything below into one archive |
//! | [`archive`] | Store-only ZIP writer with the OCF `mimetype` rules |
//! | [`package`] | `container.xml`, `content.opf`, `nav.xhtml`, `toc.ncx`, stylesheet, cover page |
//! | [`chapter`] | One XHTML document per article, with header and fallbacks |
//! | [`cover`] | 1600×2400 JPEG cover: palette, title fitting, text rendering |
//! | [`images`] | Source selection, fetching, dedup and rewriting of `<img>` tags |
//! | [`html`] | HTML parsing (html5ever) and XHTML serialization |
//! | [`types`] | `ArticleItem` and the package-level records |
//! | [`queue`] | Article sources: JSON queue files, filtering and ordering |
//! | [`config`] | `config.toml` loading, merging with defaults, validation |
//! | [`naming`] | Output filename slugs |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Degrade, Don't Fail
//!
//! An export fails only when there is nothing to export or the archive
//! itself cannot be written. A dead image link leaves its remote URL in
//! place; a cover that cannot be drawn is replaced by a flat placeholder.
//! Readers get a slightly worse book instead of no book.
//!
//! ## Hand-Written ZIP
//!
//! EPUB readers insist that `mimetype` is the first entry, stored, with no
//! extra field. Writing the container directly makes that guarantee local
//! and keeps the output byte-for-byte reproducible for identical input.
//!
//! ## Sequential Fetching
//!
//! Images are fetched one at a time in document order with a blocking
//! client. The per-export URL cache is checked before every request, so a
//! URL is never fetched twice and asset numbering follows reading order.

pub mod archive;
pub mod chapter;
pub mod config;
pub mod cover;
pub mod epub;
pub mod html;
pub mod images;
pub mod naming;
pub mod output;
pub mod package;
pub mod queue;
pub mod types;

pub use epub::{ExportOptions, ExportedEpub, build_epub, export_epub};
pub use images::inline_images_in_html;

#[cfg(test)]
pub(crate) mod test_helpers;
