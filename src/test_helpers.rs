//! Shared test utilities for the tsundoku-epub test suite.
//!
//! Provides article builders, an in-memory [`Fetcher`], tiny real image
//! payloads, and a minimal ZIP reader for checking archives byte by byte.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let fetcher = MockFetcher::new().with_image("https://x.test/a.jpg", "image/jpeg", b"JPEG");
//! let items = vec![article("A", r#"<img src="https://x.test/a.jpg">"#)];
//! let bytes = build_epub(&items, &options(), &fetcher).unwrap();
//!
//! let entries = read_zip(&bytes);
//! assert_eq!(entry_names(&entries)[0], "mimetype");
//! assert_eq!(fetcher.calls(), vec!["https://x.test/a.jpg"]);
//! ```

use crate::images::{FetchError, FetchResponse, Fetcher};
use crate::types::ArticleItem;
use image::{ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use url::Url;

// =========================================================================
// Articles
// =========================================================================

/// An article with a title and HTML body; every other field empty.
pub fn article(title: &str, content_html: &str) -> ArticleItem {
    ArticleItem {
        id: format!("id-{}", title.trim().to_lowercase().replace(' ', "-")),
        title: title.to_string(),
        content_html: content_html.to_string(),
        ..Default::default()
    }
}

/// An article filed in `queue` at position `order`.
pub fn queued(title: &str, queue: &str, order: f64) -> ArticleItem {
    ArticleItem {
        queue_id: Some(queue.to_string()),
        order: Some(order),
        ..article(title, "<p>x</p>")
    }
}

// =========================================================================
// Fetcher double
// =========================================================================

/// Serves canned responses by exact URL and records every request.
/// Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, FetchResponse>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, url: &str, content_type: &str, body: &[u8]) -> Self {
        self.with_response(url, FetchResponse::ok(content_type, body))
    }

    pub fn with_response(mut self, url: &str, response: FetchResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    /// URLs requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.responses
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| {
                FetchError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("no route to {url}"),
                ))
            })
    }
}

// =========================================================================
// Image payloads
// =========================================================================

fn encode(format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(4, 3, Rgb([200, 80, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png_bytes() -> Vec<u8> {
    encode(ImageFormat::Png)
}

pub fn bmp_bytes() -> Vec<u8> {
    encode(ImageFormat::Bmp)
}

// =========================================================================
// ZIP inspection
// =========================================================================

pub fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// One entry as recorded in the central directory, with its data read from
/// the local header it points at.
#[derive(Debug, Clone)]
pub struct ReadEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub crc32: u32,
    pub method: u16,
    pub local_offset: u32,
}

/// Walk a stored-only ZIP through its end-of-central-directory record.
/// Panics on any structural inconsistency.
pub fn read_zip(bytes: &[u8]) -> Vec<ReadEntry> {
    assert!(bytes.len() >= 22, "archive shorter than an EOCD record");
    let eocd = bytes.len() - 22;
    assert_eq!(read_u32(bytes, eocd), 0x0605_4b50, "EOCD signature");
    let count = read_u16(bytes, eocd + 10) as usize;
    assert_eq!(count, read_u16(bytes, eocd + 8) as usize, "EOCD entry counts differ");
    let cd_size = read_u32(bytes, eocd + 12) as usize;
    let cd_offset = read_u32(bytes, eocd + 16) as usize;
    assert_eq!(cd_offset + cd_size, eocd, "central directory does not end at EOCD");

    let mut entries = Vec::with_capacity(count);
    let mut at = cd_offset;
    for _ in 0..count {
        assert_eq!(read_u32(bytes, at), 0x0201_4b50, "central header signature");
        let method = read_u16(bytes, at + 10);
        let crc32 = read_u32(bytes, at + 16);
        let size = read_u32(bytes, at + 20) as usize;
        let name_len = read_u16(bytes, at + 28) as usize;
        let local_offset = read_u32(bytes, at + 42);
        let name = String::from_utf8(bytes[at + 46..at + 46 + name_len].to_vec()).unwrap();

        let local = local_offset as usize;
        assert_eq!(read_u32(bytes, local), 0x0403_4b50, "local header signature for {name}");
        assert_eq!(read_u32(bytes, local + 14), crc32, "local/central CRC for {name}");
        let local_name_len = read_u16(bytes, local + 26) as usize;
        let extra_len = read_u16(bytes, local + 28) as usize;
        let data_start = local + 30 + local_name_len + extra_len;
        let data = bytes[data_start..data_start + size].to_vec();

        entries.push(ReadEntry {
            name,
            data,
            crc32,
            method,
            local_offset,
        });
        at += 46 + name_len;
    }
    entries
}

pub fn entry_names(entries: &[ReadEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.name.as_str()).collect()
}

/// Entry data as UTF-8. Panics if the entry is missing.
pub fn entry_text<'a>(entries: &'a [ReadEntry], name: &str) -> &'a str {
    let entry = entries.iter().find(|e| e.name == name).unwrap_or_else(|| {
        panic!("entry '{name}' not found. Available: {:?}", entry_names(entries))
    });
    std::str::from_utf8(&entry.data).unwrap()
}
