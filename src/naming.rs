//! Output filenames for exported books.
//!
//! A book called "To Be Read" exported on 2024-03-09 is written as
//! `to-be-read-2024-03-09.epub`. The title is slugified:
//! - `"Weekend Reading"` → `weekend-reading`
//! - `"  C++ & Rust!  "` → `c-rust`
//! - `"Café Notes"` → `caf-notes`
//! - `"!!!"` → `to-be-read` (nothing usable left)

/// Slug used when a title has no ASCII letters or digits.
pub const FALLBACK_SLUG: &str = "to-be-read";

/// Longest slug kept, in bytes. Slugs are pure ASCII.
pub const MAX_SLUG_LEN: usize = 80;

/// Lowercase ASCII alphanumerics, with every other run of characters
/// collapsed to a single dash and no dash at either end. Empty when the
/// input has nothing usable.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// `{slug}-{date}.epub`, with [`FALLBACK_SLUG`] for unusable titles.
pub fn epub_filename(title: &str, export_date: &str) -> String {
    let slug = match slugify(title) {
        s if s.is_empty() => FALLBACK_SLUG.to_string(),
        s => s,
    };
    let date = export_date.trim();
    if date.is_empty() {
        format!("{slug}.epub")
    } else {
        format!("{slug}-{date}.epub")
    }
}
