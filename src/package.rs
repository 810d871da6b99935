//! EPUB package documents: `container.xml`, `content.opf`, `nav.xhtml`,
//! `toc.ncx`, `styles.css` and the cover page.
//!
//! The XML documents are short fixed shapes, so they are written with
//! `format!` and [`escape_xml`] rather than a template engine; only the cover
//! page, which is XHTML like the chapters, goes through maud.
//!
//! Manifest ids are fixed for the scaffolding (`cover`, `cover-page`, `nav`,
//! `toc`, `css`) and come from the caller for chapters (`chap-N`) and images
//! (`img-N`), so they cannot collide.

use crate::chapter::{XHTML_NS, XML_DECLARATION};
use crate::html::{escape_xml, xml_text};
use crate::types::{Chapter, ImageAsset, PackageMetadata};
use maud::{PreEscaped, html};
use std::fmt::Write as _;

pub const MIMETYPE: &str = "application/epub+zip";
pub const OPF_PATH: &str = "OEBPS/content.opf";
pub const COVER_IMAGE_HREF: &str = "cover.jpg";
pub const COVER_PAGE_HREF: &str = "cover.xhtml";
pub const NAV_HREF: &str = "nav.xhtml";
pub const NCX_HREF: &str = "toc.ncx";
pub const STYLES_HREF: &str = "styles.css";

const STYLES: &str = r#"body {
  font-family: "Georgia", "Times New Roman", serif;
  color: #1b1b1b;
  line-height: 1.6;
  margin: 8%;
}

h1 {
  font-size: 1.8em;
  margin-bottom: 0.4em;
}

.byline {
  font-style: italic;
  color: #555;
  margin-bottom: 1.2em;
}

.tagline {
  font-size: 0.95em;
  color: #555;
  margin-bottom: 1.1em;
}

.meta {
  font-size: 0.95em;
  color: #555;
  margin-bottom: 0.9em;
}

.source {
  margin-top: 1.6em;
  font-size: 0.9em;
}

img {
  max-width: 100%;
  height: auto;
}

blockquote {
  margin: 1.2em 0;
  padding-left: 1em;
  border-left: 3px solid #d0c8bd;
}

pre {
  background: #f5f1ea;
  padding: 0.8em;
  border-radius: 6px;
  overflow-x: auto;
}
"#;

const COVER_PAGE_STYLE: &str = "
      html, body { margin: 0; padding: 0; height: 100%; }
      body { display: flex; align-items: center; justify-content: center; background: #f7f4ef; }
      img { max-width: 100%; max-height: 100%; }
    ";

/// `META-INF/container.xml`, pointing readers at the package document.
pub fn build_container() -> String {
    format!(
        r#"{XML_DECLARATION}<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{OPF_PATH}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    )
}

pub fn build_styles() -> &'static str {
    STYLES
}

/// `content.opf`: metadata, manifest of every package file, and a spine of
/// the cover page followed by the chapters in the order given.
pub fn build_opf(meta: &PackageMetadata, chapters: &[Chapter], assets: &[ImageAsset]) -> String {
    let mut manifest = String::new();
    let mut item = |id: &str, href: &str, media_type: &str, properties: Option<&str>| {
        let props = properties
            .map(|p| format!(r#" properties="{p}""#))
            .unwrap_or_default();
        let _ = writeln!(
            manifest,
            r#"    <item id="{}" href="{}" media-type="{}"{props}/>"#,
            escape_xml(id),
            escape_xml(href),
            escape_xml(media_type),
        );
    };
    item("cover", COVER_IMAGE_HREF, "image/jpeg", Some("cover-image"));
    item("cover-page", COVER_PAGE_HREF, "application/xhtml+xml", None);
    item("nav", NAV_HREF, "application/xhtml+xml", Some("nav"));
    item("toc", NCX_HREF, "application/x-dtbncx+xml", None);
    item("css", STYLES_HREF, "text/css", None);
    for asset in assets {
        item(&asset.id, &asset.href, &asset.media_type, None);
    }
    for chapter in chapters {
        item(&chapter.id, &chapter.href, "application/xhtml+xml", None);
    }

    let mut spine = String::from("    <itemref idref=\"cover-page\"/>\n");
    for chapter in chapters {
        let _ = writeln!(spine, r#"    <itemref idref="{}"/>"#, escape_xml(&chapter.id));
    }

    format!(
        r#"{XML_DECLARATION}<package version="3.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">{book_id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{creator}</dc:creator>
    <dc:date>{date}</dc:date>
    <dc:language>{language}</dc:language>
    <meta name="cover" content="cover"/>
    <meta property="dcterms:modified">{modified}</meta>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="toc">
{spine}  </spine>
</package>
"#,
        book_id = escape_xml(&meta.book_id),
        title = escape_xml(&meta.title),
        creator = escape_xml(&meta.creator),
        date = escape_xml(&meta.export_date),
        language = escape_xml(&meta.language),
        modified = escape_xml(&meta.modified),
    )
}

/// EPUB3 navigation document: one flat list of chapters.
pub fn build_nav(meta: &PackageMetadata, chapters: &[Chapter]) -> String {
    let mut items = String::new();
    for chapter in chapters {
        let _ = writeln!(
            items,
            r#"        <li><a href="{}">{}</a></li>"#,
            escape_xml(&chapter.href),
            escape_xml(&chapter.title)
        );
    }
    let title = escape_xml(&meta.title);
    let language = escape_xml(&meta.language);
    format!(
        r#"{XML_DECLARATION}<html xmlns="{XHTML_NS}" xmlns:epub="http://www.idpf.org/2007/ops" lang="{language}">
  <head>
    <title>{title}</title>
    <link rel="stylesheet" type="text/css" href="{STYLES_HREF}"/>
  </head>
  <body>
    <nav epub:type="toc" id="toc">
      <h1>{title}</h1>
      <ol>
{items}      </ol>
    </nav>
  </body>
</html>
"#
    )
}

/// EPUB2 NCX for older readers. Same entries as the nav document.
pub fn build_ncx(meta: &PackageMetadata, chapters: &[Chapter]) -> String {
    let mut points = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        let n = i + 1;
        let _ = write!(
            points,
            r#"    <navPoint id="navPoint-{n}" playOrder="{n}">
      <navLabel><text>{}</text></navLabel>
      <content src="{}"/>
    </navPoint>
"#,
            escape_xml(&chapter.title),
            escape_xml(&chapter.href)
        );
    }
    format!(
        r#"{XML_DECLARATION}<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{uid}"/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>
"#,
        uid = escape_xml(&meta.book_id),
        title = escape_xml(&meta.title),
    )
}

/// Cover page: the cover image centered, with the book title as alt text.
pub fn build_cover_page(title: &str, language: &str) -> String {
    let title = match title.trim() {
        "" => "To Be Read",
        t => t,
    };
    html! {
        (PreEscaped(XML_DECLARATION))
        html xmlns=(XHTML_NS) lang=(language) {
            head {
                title { (xml_text(title)) }
                style type="text/css" { (PreEscaped(COVER_PAGE_STYLE)) }
            }
            body {
                img src=(COVER_IMAGE_HREF) alt=(title) {}
            }
        }
    }
    .into_string()
}
