//! CLI output formatting.
//!
//! Output is article-centric: every chapter leads with its position and
//! title, with the source URL and image results as indented context lines.
//!
//! # Output Format
//!
//! ## Export
//!
//! ```text
//! Weekend Reading · 2024-03-09 · 2 chapters
//! 001 The Long Read
//!     Source: https://example.com/long-read
//!     Images: 3 embedded, 1 reused, 1 failed
//! 002 Chapter 2
//!     Images: none
//!
//! Cover: generated
//! Wrote weekend-reading-2024-03-09.epub (1.2 MB, 13 entries)
//! ```
//!
//! ## Check
//!
//! ```text
//! Queue default: 2 articles
//! 001 The Long Read (2,310 words)
//!     Source: https://example.com/long-read
//!     Content: html, 4 images
//!     Excerpt: Why we keep buying books we never...
//! 002 (untitled)
//!     Content: missing
//! ```
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::epub::{CoverKind, ExportedEpub};
use crate::html::count_elements;
use crate::images::EmbedStats;
use crate::types::ArticleItem;
use std::path::Path;

const EXCERPT_LEN: usize = 40;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Strip HTML tags from a string (simple angle-bracket stripping).
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_desc(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// `1234567` → `1,234,567`.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn human_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn image_summary(stats: &EmbedStats) -> String {
    if stats.found == 0 {
        return "none".to_string();
    }
    let mut parts = vec![format!("{} embedded", stats.embedded)];
    if stats.reused > 0 {
        parts.push(format!("{} reused", stats.reused));
    }
    if stats.failed > 0 {
        parts.push(format!("{} failed", stats.failed));
    }
    parts.join(", ")
}

fn count_images(html: &str) -> usize {
    count_elements(html, "img")
}

// ============================================================================
// Export
// ============================================================================

/// Format the result of an export written to `path`.
pub fn format_export_output(exported: &ExportedEpub, path: &Path) -> Vec<String> {
    let report = &exported.report;
    let meta = &report.metadata;
    let mut lines = vec![format!(
        "{} · {} · {} chapter{}",
        meta.title,
        meta.export_date,
        report.chapters.len(),
        if report.chapters.len() == 1 { "" } else { "s" }
    )];

    for (i, chapter) in report.chapters.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), chapter.title));
        if !chapter.url.is_empty() {
            lines.push(format!("{}Source: {}", indent(1), chapter.url));
        }
        lines.push(format!("{}Images: {}", indent(1), image_summary(&chapter.images)));
    }

    lines.push(String::new());
    lines.push(format!(
        "Cover: {}",
        match report.cover {
            CoverKind::Generated => "generated",
            CoverKind::Placeholder => "placeholder",
        }
    ));
    lines.push(format!(
        "Wrote {} ({}, {} entries)",
        path.display(),
        human_size(exported.bytes.len()),
        report.entries.len()
    ));
    lines
}

pub fn print_export_output(exported: &ExportedEpub, path: &Path) {
    for line in format_export_output(exported, path) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format a dry-run listing of the articles an export would include.
pub fn format_check_output(items: &[ArticleItem], queue: Option<&str>) -> Vec<String> {
    let scope = match queue {
        Some(q) => format!("Queue {q}"),
        None => "All queues".to_string(),
    };
    let mut lines = vec![format!(
        "{scope}: {} article{}",
        items.len(),
        if items.len() == 1 { "" } else { "s" }
    )];

    for (i, item) in items.iter().enumerate() {
        let title = match item.title.trim() {
            "" => "(untitled)",
            t => t,
        };
        match item.word_count {
            Some(words) => lines.push(format!("{} {} ({} words)", format_index(i + 1), title, thousands(words))),
            None => lines.push(format!("{} {}", format_index(i + 1), title)),
        }
        if !item.url.trim().is_empty() {
            lines.push(format!("{}Source: {}", indent(1), item.url.trim()));
        }

        let content = if !item.content_html.trim().is_empty() {
            match count_images(&item.content_html) {
                0 => "html".to_string(),
                1 => "html, 1 image".to_string(),
                n => format!("html, {n} images"),
            }
        } else if !item.content_text.trim().is_empty() {
            "text only".to_string()
        } else {
            "missing".to_string()
        };
        lines.push(format!("{}Content: {}", indent(1), content));

        let excerpt = strip_html_tags(&item.excerpt);
        let excerpt = excerpt.split_whitespace().collect::<Vec<_>>().join(" ");
        if !excerpt.is_empty() {
            lines.push(format!("{}Excerpt: {}", indent(1), truncate_desc(&excerpt, EXCERPT_LEN)));
        }
    }
    lines
}

pub fn print_check_output(items: &[ArticleItem], queue: Option<&str>) {
    for line in format_check_output(items, queue) {
        println!("{}", line);
    }
}
