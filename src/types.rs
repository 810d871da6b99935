//! Types shared between the queue loader, the export engine and the CLI.
//!
//! [`ArticleItem`] mirrors the records the browser extension keeps in its item
//! store, so a JSON dump of that store deserializes directly. Everything else
//! here is built during one export and dropped with it.

use serde::{Deserialize, Deserializer, Serialize};

/// Queue an item belongs to when its record carries no `queue_id`.
pub const DEFAULT_QUEUE_ID: &str = "default";

/// One saved article, as produced by the extraction layer.
///
/// All fields except `id` may be missing or empty. Timestamps are kept as the
/// strings the extension wrote; the chapter renderer formats what it can parse
/// and shows the rest verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleItem {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(deserialize_with = "lenient_string")]
    pub byline: String,
    #[serde(deserialize_with = "lenient_string")]
    pub site: String,
    #[serde(deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(deserialize_with = "lenient_string")]
    pub published_at: String,
    #[serde(deserialize_with = "lenient_string")]
    pub modified_at: String,
    #[serde(deserialize_with = "lenient_string")]
    pub content_html: String,
    #[serde(deserialize_with = "lenient_string")]
    pub content_text: String,
    #[serde(deserialize_with = "lenient_string")]
    pub tagline: String,
    #[serde(deserialize_with = "lenient_string")]
    pub excerpt: String,
    pub word_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
}

impl ArticleItem {
    /// Queue this item is filed under.
    pub fn queue(&self) -> &str {
        self.queue_id
            .as_deref()
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_QUEUE_ID)
    }

    /// Position in the queue: explicit `order`, else `created_at` in epoch
    /// milliseconds, else 0.
    pub fn sort_key(&self) -> f64 {
        if let Some(order) = self.order.filter(|o| o.is_finite()) {
            return order;
        }
        chrono::DateTime::parse_from_rfc3339(self.created_at.trim())
            .map(|dt| dt.timestamp_millis() as f64)
            .unwrap_or(0.0)
    }
}

/// Accepts `"abc"`, `42` or `null` for string fields; the extension writes
/// whatever the page handed it.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
        Null,
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
        Raw::Null => String::new(),
    })
}

/// One rendered article in the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Manifest id, `chap-N`.
    pub id: String,
    pub title: String,
    /// Path relative to `OEBPS/`, `chapters/chap-N.xhtml`.
    pub href: String,
    /// Complete XHTML document.
    pub content: String,
}

/// An image embedded into the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// Manifest id, `img-N`.
    pub id: String,
    /// Path relative to `OEBPS/`, `images/img-N.{ext}`.
    pub href: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Book-level metadata written into `content.opf` and `toc.ncx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// `urn:uuid:...`
    pub book_id: String,
    pub title: String,
    pub creator: String,
    pub language: String,
    /// `YYYY-MM-DD`
    pub export_date: String,
    /// `YYYY-MM-DDT00:00:00Z`
    pub modified: String,
}
