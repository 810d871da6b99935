//! One article → one standalone XHTML chapter document.
//!
//! The chapter body is spliced in verbatim, so the caller is responsible for
//! handing over well-formed XHTML (the orchestrator runs article HTML through
//! [`crate::html::to_xhtml_fragment`] first). Everything this module interpolates
//! itself is XML-escaped.
//!
//! Header layout, in order:
//!
//! ```text
//! <h1><a href="{url}">{title}</a></h1>
//! <p class="tagline">...</p>            when the item has a tagline, and then nothing else
//! <p class="byline">By ...</p>          otherwise, each line only when present
//! <p class="meta">Published at ...</p>
//! <p class="meta">Edited at ...</p>     only when it differs from the published line
//! ```

use crate::html::xml_text;
use crate::types::ArticleItem;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use maud::{Markup, PreEscaped, html};

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const NO_CONTENT: &str = "<p>No content available.</p>";

/// Render chapter `index` (1-based) with the default `en` language tag.
pub fn build_chapter(item: &ArticleItem, index: usize) -> String {
    render_chapter(item, index, "en")
}

pub fn render_chapter(item: &ArticleItem, index: usize, language: &str) -> String {
    let title = chapter_title(item, index);
    let url = item.url.trim();
    let tagline = item.tagline.trim();

    let markup = html! {
        (PreEscaped(XML_DECLARATION))
        html xmlns=(XHTML_NS) lang=(language) {
            head {
                title { (xml_text(&title)) }
                link rel="stylesheet" type="text/css" href="../styles.css" {}
            }
            body {
                article {
                    h1 {
                        @if url.is_empty() {
                            (xml_text(&title))
                        } @else {
                            a href=(url) { (xml_text(&title)) }
                        }
                    }
                    @if !tagline.is_empty() {
                        p.tagline { (xml_text(tagline)) }
                    } @else {
                        (meta_lines(item))
                    }
                    (PreEscaped(chapter_body(item)))
                }
            }
        }
    };
    markup.into_string()
}

/// Display title of chapter `index`: the trimmed article title, or
/// `Chapter {index}` when there is none.
pub fn chapter_title(item: &ArticleItem, index: usize) -> String {
    let title = item.title.trim();
    if title.is_empty() {
        format!("Chapter {index}")
    } else {
        title.to_string()
    }
}

fn meta_lines(item: &ArticleItem) -> Markup {
    let byline = format_byline(&item.byline);
    let published = format_date_time(&item.published_at);
    let edited = format_date_time(&item.modified_at);
    let show_edited = !edited.is_empty() && edited != published;

    html! {
        @if !byline.is_empty() {
            p.byline { (xml_text(&byline)) }
        }
        @if !published.is_empty() {
            p.meta { "Published at " (xml_text(&published)) }
        }
        @if show_edited {
            p.meta { "Edited at " (xml_text(&edited)) }
        }
    }
}

/// Chapter body markup: the article HTML, else its text as one escaped
/// paragraph, else a fixed placeholder.
fn chapter_body(item: &ArticleItem) -> String {
    if !item.content_html.trim().is_empty() {
        item.content_html.clone()
    } else if !item.content_text.trim().is_empty() {
        format!("<p>{}</p>", xml_text(&item.content_text).0)
    } else {
        NO_CONTENT.to_string()
    }
}

/// `"by Jane Doe"` → `"By Jane Doe"`. Empty input stays empty.
pub fn format_byline(value: &str) -> String {
    let trimmed = value.trim();
    let name = match trimmed.get(..2) {
        Some(prefix)
            if prefix.eq_ignore_ascii_case("by")
                && trimmed[2..].starts_with(char::is_whitespace) =>
        {
            trimmed[2..].trim_start()
        }
        _ => trimmed,
    };
    if name.is_empty() {
        String::new()
    } else {
        format!("By {name}")
    }
}

/// Human-readable timestamp.
///
/// Instants (RFC 3339, RFC 2822, or a bare `YYYY-MM-DDTHH:MM[:SS]` taken as
/// UTC) render as `Mar 5, 2024, 10:30 AM UTC`; a bare date as `Mar 5, 2024`.
/// Anything unparseable comes back whitespace-normalized.
pub fn format_date_time(value: &str) -> String {
    let raw = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if raw.is_empty() {
        return raw;
    }
    if let Some(instant) = parse_instant(&raw) {
        return instant.format("%b %-d, %Y, %I:%M %p UTC").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return date.format("%b %-d, %Y").to_string();
    }
    raw
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::article;

    fn body_of(doc: &str) -> &str {
        let start = doc.find("<article>").unwrap() + "<article>".len();
        let end = doc.find("</article>").unwrap();
        &doc[start..end]
    }

    #[test]
    fn document_is_xhtml_with_stylesheet() {
        let doc = build_chapter(&article("A", "<p>x</p>"), 1);
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(doc.contains(r#"<html xmlns="http://www.w3.org/1999/xhtml" lang="en">"#));
        assert!(doc.contains(r#"href="../styles.css""#));
        assert!(doc.contains("<title>A</title>"));
    }

    #[test]
    fn text_fallback_is_single_paragraph() {
        let mut item = article("T", "");
        item.content_text = "Hello".into();
        let doc = build_chapter(&item, 1);
        assert!(body_of(&doc).ends_with("<p>Hello</p>"));
    }

    #[test]
    fn text_fallback_is_escaped() {
        let mut item = article("T", "");
        item.content_text = "a < b & c".into();
        let doc = build_chapter(&item, 1);
        assert!(doc.contains("<p>a &lt; b &amp; c</p>"));
    }

    #[test]
    fn empty_content_gets_placeholder() {
        let doc = build_chapter(&article("T", "  "), 1);
        assert!(body_of(&doc).ends_with("<p>No content available.</p>"));
    }

    #[test]
    fn html_content_is_verbatim() {
        let doc = build_chapter(&article("T", "<p>one &amp; <em>two</em></p>"), 1);
        assert!(body_of(&doc).ends_with("<p>one &amp; <em>two</em></p>"));
    }

    #[test]
    fn missing_title_uses_index() {
        let doc = build_chapter(&article("   ", "<p>x</p>"), 7);
        assert!(doc.contains("<h1>Chapter 7</h1>"));
    }

    #[test]
    fn title_links_to_source_url() {
        let mut item = article("Tom & Jerry's", "<p>x</p>");
        item.url = "https://x.test/a?b=1&c=2".into();
        let doc = build_chapter(&item, 1);
        assert!(doc.contains(
            r#"<h1><a href="https://x.test/a?b=1&amp;c=2">Tom &amp; Jerry&apos;s</a></h1>"#
        ));
    }

    #[test]
    fn tagline_suppresses_byline_and_dates() {
        let mut item = article("T", "<p>x</p>");
        item.tagline = "A short note".into();
        item.byline = "Jane".into();
        item.published_at = "2024-03-05".into();
        let doc = build_chapter(&item, 1);
        assert!(doc.contains(r#"<p class="tagline">A short note</p>"#));
        assert!(!doc.contains("byline"));
        assert!(!doc.contains("Published at"));
    }

    #[test]
    fn meta_lines_in_order() {
        let mut item = article("T", "<p>x</p>");
        item.byline = "by Jane Doe".into();
        item.published_at = "2024-03-05T10:30:00Z".into();
        item.modified_at = "2024-03-06".into();
        let doc = build_chapter(&item, 1);
        let byline = doc.find(r#"<p class="byline">By Jane Doe</p>"#).unwrap();
        let published = doc
            .find(r#"<p class="meta">Published at Mar 5, 2024, 10:30 AM UTC</p>"#)
            .unwrap();
        let edited = doc.find(r#"<p class="meta">Edited at Mar 6, 2024</p>"#).unwrap();
        assert!(byline < published && published < edited);
    }

    #[test]
    fn edited_hidden_when_same_as_published() {
        let mut item = article("T", "<p>x</p>");
        item.published_at = "2024-03-05T10:30:00Z".into();
        item.modified_at = "2024-03-05T10:30:00+00:00".into();
        let doc = build_chapter(&item, 1);
        assert!(doc.contains("Published at"));
        assert!(!doc.contains("Edited at"));
    }

    #[test]
    fn byline_prefix_stripped_case_insensitively() {
        assert_eq!(format_byline("BY  Jane"), "By Jane");
        assert_eq!(format_byline("by\tJane"), "By Jane");
        assert_eq!(format_byline("Jane"), "By Jane");
        assert_eq!(format_byline("Bylaw Smith"), "By Bylaw Smith");
        assert_eq!(format_byline("  "), "");
        assert_eq!(format_byline("by "), "By by");
    }

    #[test]
    fn date_time_formats() {
        assert_eq!(
            format_date_time("2024-03-05T10:30:00+02:00"),
            "Mar 5, 2024, 08:30 AM UTC"
        );
        assert_eq!(format_date_time("2024-12-25T18:05"), "Dec 25, 2024, 06:05 PM UTC");
        assert_eq!(
            format_date_time("Tue, 1 Jul 2003 10:52:37 +0000"),
            "Jul 1, 2003, 10:52 AM UTC"
        );
        assert_eq!(format_date_time("2024-03-05"), "Mar 5, 2024");
        assert_eq!(format_date_time("  last   Tuesday "), "last Tuesday");
        assert_eq!(format_date_time(""), "");
    }
}
