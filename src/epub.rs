//! Export orchestration: articles in, EPUB bytes out.
//!
//! ```text
//! items ──► metadata (book id, date) ──► cover.jpg + cover.xhtml
//!   │
//!   └─► per article: embed images ─► XHTML-normalize ─► chapter document
//!                                                          │
//! container.xml, content.opf, nav.xhtml, toc.ncx, styles.css ◄─┘
//!                              │
//!                              ▼
//!                         build_zip
//! ```
//!
//! Everything runs sequentially on the calling thread. Only an empty input or
//! an archive that cannot be written fails the export; a broken image or cover
//! is logged and worked around.

use crate::archive::{ZipEntry, ZipError, build_zip};
use crate::chapter::{chapter_title, render_chapter};
use crate::cover::{self, CoverError, CoverText};
use crate::html::to_xhtml_fragment;
use crate::images::fetch::DEFAULT_MAX_IMAGE_BYTES;
use crate::images::{EmbedContext, EmbedStats, Fetcher, prepare_images_for_epub};
use crate::package::{
    COVER_IMAGE_HREF, COVER_PAGE_HREF, MIMETYPE, NAV_HREF, NCX_HREF, OPF_PATH, STYLES_HREF,
    build_container, build_cover_page, build_nav, build_ncx, build_opf, build_styles,
};
use crate::types::{ArticleItem, Chapter, PackageMetadata};
use chrono::{DateTime, NaiveDate, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_TITLE: &str = "To Be Read";
pub const DEFAULT_CREATOR: &str = "Tsundoku";
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Error, Debug)]
pub enum EpubError {
    #[error("nothing to export: the article list is empty")]
    NoItems,
    #[error("failed to write the EPUB archive: {0}")]
    Zip(#[from] ZipError),
    #[error("failed to encode the cover image: {0}")]
    Cover(#[from] CoverError),
}

/// Book-level settings for one export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub title: String,
    pub creator: String,
    /// `YYYY-MM-DD` or an RFC 3339 instant. `None` means today (UTC).
    pub exported_at: Option<String>,
    pub language: String,
    /// Fixes the cover palette. `None` draws from OS entropy.
    pub cover_seed: Option<u64>,
    pub cover_quality: u8,
    /// When false, image tags keep their remote URLs and nothing is fetched.
    pub embed_images: bool,
    pub max_image_bytes: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            creator: DEFAULT_CREATOR.to_string(),
            exported_at: None,
            language: DEFAULT_LANGUAGE.to_string(),
            cover_seed: None,
            cover_quality: cover::DEFAULT_QUALITY,
            embed_images: true,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// Which cover ended up in the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverKind {
    Generated,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterReport {
    pub title: String,
    pub url: String,
    /// Path relative to `OEBPS/`.
    pub href: String,
    pub images: EmbedStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub name: String,
    pub size: usize,
}

/// What went into the archive, for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub metadata: PackageMetadata,
    pub cover: CoverKind,
    pub chapters: Vec<ChapterReport>,
    pub images: EmbedStats,
    pub entries: Vec<EntryReport>,
}

#[derive(Debug, Clone)]
pub struct ExportedEpub {
    pub bytes: Vec<u8>,
    pub report: ExportReport,
}

/// Build the EPUB and return only its bytes.
pub fn build_epub(
    items: &[ArticleItem],
    options: &ExportOptions,
    fetcher: &dyn Fetcher,
) -> Result<Vec<u8>, EpubError> {
    export_epub(items, options, fetcher).map(|exported| exported.bytes)
}

/// Build the EPUB along with a report of what it contains.
pub fn export_epub(
    items: &[ArticleItem],
    options: &ExportOptions,
    fetcher: &dyn Fetcher,
) -> Result<ExportedEpub, EpubError> {
    if items.is_empty() {
        return Err(EpubError::NoItems);
    }

    let metadata = package_metadata(options, Utc::now().date_naive());
    info!(
        title = %metadata.title,
        articles = items.len(),
        date = %metadata.export_date,
        "exporting EPUB"
    );

    let (cover_jpeg, cover_kind) = cover_image(&metadata, options)?;

    let mut ctx = EmbedContext::new().with_max_image_bytes(options.max_image_bytes);
    let mut chapters = Vec::with_capacity(items.len());
    let mut chapter_reports = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let index = i + 1;
        let before = ctx.stats();
        let chapter = build_chapter_for_export(item, index, options, &mut ctx, fetcher);
        let images = ctx.stats().since(&before);
        debug!(
            chapter = index,
            title = %chapter.title,
            images = images.found,
            embedded = images.embedded,
            failed = images.failed,
            "rendered chapter"
        );
        chapter_reports.push(ChapterReport {
            title: chapter.title.clone(),
            url: item.url.trim().to_string(),
            href: chapter.href.clone(),
            images,
        });
        chapters.push(chapter);
    }

    let images = ctx.stats();
    let assets = ctx.into_assets();
    for asset in &assets {
        debug!(href = %asset.href, media_type = %asset.media_type, size = asset.data.len(), "embedded image");
    }

    let mut entries = vec![
        ZipEntry::new("mimetype", MIMETYPE),
        ZipEntry::new("META-INF/container.xml", build_container()),
        ZipEntry::new(OPF_PATH, build_opf(&metadata, &chapters, &assets)),
        ZipEntry::new(oebps(NAV_HREF), build_nav(&metadata, &chapters)),
        ZipEntry::new(oebps(NCX_HREF), build_ncx(&metadata, &chapters)),
        ZipEntry::new(oebps(STYLES_HREF), build_styles()),
        ZipEntry::new(oebps(COVER_IMAGE_HREF), cover_jpeg),
        ZipEntry::new(
            oebps(COVER_PAGE_HREF),
            build_cover_page(&metadata.title, &metadata.language),
        ),
    ];
    entries.extend(chapters.into_iter().map(|c| ZipEntry::new(oebps(&c.href), c.content)));
    entries.extend(assets.into_iter().map(|a| ZipEntry::new(oebps(&a.href), a.data)));

    let entry_reports = entries
        .iter()
        .map(|e| EntryReport {
            name: e.name.clone(),
            size: e.data.len(),
        })
        .collect();

    let bytes = build_zip(&entries)?;
    info!(
        bytes = bytes.len(),
        chapters = chapter_reports.len(),
        images = images.embedded,
        failed_images = images.failed,
        "EPUB ready"
    );

    Ok(ExportedEpub {
        bytes,
        report: ExportReport {
            metadata,
            cover: cover_kind,
            chapters: chapter_reports,
            images,
            entries: entry_reports,
        },
    })
}

fn oebps(href: &str) -> String {
    format!("OEBPS/{href}")
}

fn build_chapter_for_export(
    item: &ArticleItem,
    index: usize,
    options: &ExportOptions,
    ctx: &mut EmbedContext,
    fetcher: &dyn Fetcher,
) -> Chapter {
    let mut prepared = item.clone();
    if !item.content_html.trim().is_empty() {
        let html = if options.embed_images {
            prepare_images_for_epub(&item.content_html, item.url.trim(), ctx, fetcher)
        } else {
            item.content_html.clone()
        };
        prepared.content_html = to_xhtml_fragment(&html);
    }

    let id = format!("chap-{index}");
    Chapter {
        href: format!("chapters/{id}.xhtml"),
        id,
        title: chapter_title(item, index),
        content: render_chapter(&prepared, index, &options.language),
    }
}

/// The generated cover, or the placeholder if rendering fails.
fn cover_image(
    metadata: &PackageMetadata,
    options: &ExportOptions,
) -> Result<(Vec<u8>, CoverKind), EpubError> {
    let text = CoverText {
        title: metadata.title.clone(),
        creator: metadata.creator.clone(),
        export_date: metadata.export_date.clone(),
    };
    let mut rng = match options.cover_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    match cover::build_cover_image(&text, &mut rng, options.cover_quality) {
        Ok(jpeg) => Ok((jpeg, CoverKind::Generated)),
        Err(e) => {
            warn!(error = %e, "cover rendering failed, using placeholder");
            Ok((cover::placeholder_cover()?, CoverKind::Placeholder))
        }
    }
}

fn package_metadata(options: &ExportOptions, today: NaiveDate) -> PackageMetadata {
    let export_date = resolve_export_date(options.exported_at.as_deref(), today);
    PackageMetadata {
        book_id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
        title: non_blank(&options.title, DEFAULT_TITLE),
        creator: non_blank(&options.creator, DEFAULT_CREATOR),
        language: non_blank(&options.language, DEFAULT_LANGUAGE),
        modified: format!("{export_date}T00:00:00Z"),
        export_date,
    }
}

fn non_blank(value: &str, fallback: &str) -> String {
    match value.trim() {
        "" => fallback.to_string(),
        v => v.to_string(),
    }
}

/// `YYYY-MM-DD` for the book. Accepts a plain date or an RFC 3339 instant
/// (taken in UTC); anything else falls back to `today`.
pub fn resolve_export_date(raw: Option<&str>, today: NaiveDate) -> String {
    let parsed = raw.map(str::trim).filter(|s| !s.is_empty()).map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc).date_naive()))
            .ok_or(s)
    });
    let date = match parsed {
        Some(Ok(date)) => date,
        Some(Err(bad)) => {
            warn!(exported_at = bad, "unrecognized export date, using today");
            today
        }
        None => today,
    };
    date.format("%Y-%m-%d").to_string()
}
