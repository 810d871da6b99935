//! HTML parsing and XHTML fragment serialization.
//!
//! Article bodies arrive as HTML fragments serialized by the extraction layer,
//! and EPUB chapters must be well-formed XML. Fragments are parsed with
//! `html5ever` into a small reference-counted tree, then written back out as
//! XHTML:
//!
//! | Input | Output |
//! |---|---|
//! | `<br>`, `<img ...>` | `<br/>`, `<img .../>` |
//! | `&Ouml;`, `&hearts;`, `&nbsp;` | the characters themselves (UTF-8) |
//! | `a < b`, `Q&A` | `a &lt; b`, `Q&amp;A` |
//! | unquoted or single-quoted attributes | double-quoted, XML-escaped |
//! | `<svg>`, `<math>` | namespace declared on the root element |
//! | `<script>`, doctypes, processing instructions | dropped |
//!
//! Unbalanced markup is repaired the way a browser would repair it, since the
//! tree comes from the standard HTML parsing algorithm.

use html5ever::driver::ParseOpts;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeBuilderOpts, TreeSink};
use html5ever::{Attribute, LocalName, Namespace, QualName, parse_document};
use maud::PreEscaped;
use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Elements that never have content in HTML and must be self-closed in XHTML.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements left out of chapters entirely, content included.
const DROPPED_ELEMENTS: &[&str] = &["script"];

/// Escape the five XML special characters for text and attribute values.
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    push_escaped(&mut out, value, true);
    out
}

/// [`escape_xml`] wrapped for splicing into a `maud` template. maud leaves
/// apostrophes alone, XML documents here escape all five.
pub fn xml_text(value: &str) -> PreEscaped<String> {
    PreEscaped(escape_xml(value))
}

/// Append `value` to `out` with XML escaping. Characters XML 1.0 cannot
/// carry at all (C0 controls other than tab, newline and carriage return)
/// are dropped.
fn push_escaped(out: &mut String, value: &str, quotes: bool) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if quotes => out.push_str("&quot;"),
            '\'' if quotes => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c < ' ' => {}
            _ => out.push(c),
        }
    }
}

/// Whether `name` can be written as an attribute of an un-namespaced XHTML
/// element.
pub fn is_xhtml_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Serialize an empty element as `<name a="1" b="2"/>`, skipping attributes
/// whose names XHTML cannot carry.
pub fn xhtml_empty_element<'a>(
    name: &str,
    attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut out = String::with_capacity(name.len() + 64);
    out.push('<');
    out.push_str(name);
    for (attr, value) in attrs {
        if is_xhtml_attribute_name(attr) {
            push_attribute(&mut out, attr, value);
        }
    }
    out.push_str("/>");
    out
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    push_escaped(out, value, true);
    out.push('"');
}

// ============================================================================
// Tree
// ============================================================================

type Handle = Rc<Node>;

struct Node {
    /// Element name; empty for every other kind of node.
    name: QualName,
    data: NodeData,
    parent: RefCell<Option<Weak<Node>>>,
    children: RefCell<Vec<Handle>>,
}

enum NodeData {
    Document,
    Element { attrs: RefCell<Vec<Attribute>> },
    Text(RefCell<String>),
    Comment(String),
    /// Doctypes and processing instructions: parsed, never written.
    Ignored,
}

impl Node {
    fn new(data: NodeData) -> Handle {
        Self::with_name(empty_name(), data)
    }

    fn with_name(name: QualName, data: NodeData) -> Handle {
        Rc::new(Node {
            name,
            data,
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
        })
    }

    fn parent(&self) -> Option<Handle> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn is_element(&self, local: &str) -> bool {
        matches!(self.data, NodeData::Element { .. }) && self.name.local.as_ref() == local
    }

    fn attribute(&self, local: &str) -> Option<String> {
        match &self.data {
            NodeData::Element { attrs } => attrs
                .borrow()
                .iter()
                .find(|a| a.name.local.as_ref() == local)
                .map(|a| a.value.to_string()),
            _ => None,
        }
    }
}

fn empty_name() -> QualName {
    QualName::new(None, Namespace::from(""), LocalName::from(""))
}

fn detach(node: &Handle) {
    let Some(parent) = node.parent.borrow_mut().take().and_then(|weak| weak.upgrade()) else {
        return;
    };
    parent.children.borrow_mut().retain(|child| !Rc::ptr_eq(child, node));
}

fn append_node(parent: &Handle, node: Handle) {
    detach(&node);
    *node.parent.borrow_mut() = Some(Rc::downgrade(parent));
    parent.children.borrow_mut().push(node);
}

fn append_text(parent: &Handle, text: &str) {
    if let Some(last) = parent.children.borrow().last()
        && let NodeData::Text(existing) = &last.data
    {
        existing.borrow_mut().push_str(text);
        return;
    }
    append_node(parent, Node::new(NodeData::Text(RefCell::new(text.to_string()))));
}

/// Builds the [`Node`] tree for `html5ever`.
struct FragmentSink {
    document: Handle,
}

impl FragmentSink {
    fn new() -> Self {
        Self {
            document: Node::new(NodeData::Document),
        }
    }
}

impl TreeSink for FragmentSink {
    type Handle = Handle;
    type Output = Handle;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Handle {
        self.document
    }

    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> Handle {
        self.document.clone()
    }

    fn elem_name<'a>(&'a self, target: &'a Handle) -> &'a QualName {
        &target.name
    }

    fn create_element(&self, name: QualName, attrs: Vec<Attribute>, _flags: ElementFlags) -> Handle {
        Node::with_name(
            name,
            NodeData::Element {
                attrs: RefCell::new(attrs),
            },
        )
    }

    fn create_comment(&self, text: StrTendril) -> Handle {
        Node::new(NodeData::Comment(text.to_string()))
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Handle {
        Node::new(NodeData::Ignored)
    }

    fn append(&self, parent: &Handle, child: NodeOrText<Handle>) {
        match child {
            NodeOrText::AppendNode(node) => append_node(parent, node),
            NodeOrText::AppendText(text) => append_text(parent, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Handle,
        prev_element: &Handle,
        child: NodeOrText<Handle>,
    ) {
        if element.parent().is_some() {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn get_template_contents(&self, target: &Handle) -> Handle {
        target.clone()
    }

    fn same_node(&self, x: &Handle, y: &Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Handle, new_node: NodeOrText<Handle>) {
        let Some(parent) = sibling.parent() else {
            return;
        };
        if let NodeOrText::AppendNode(node) = &new_node {
            detach(node);
        }
        let mut children = parent.children.borrow_mut();
        let Some(index) = children.iter().position(|c| Rc::ptr_eq(c, sibling)) else {
            return;
        };
        let node = match new_node {
            NodeOrText::AppendText(text) => {
                if let Some(NodeData::Text(previous)) = index.checked_sub(1).map(|i| &children[i].data) {
                    previous.borrow_mut().push_str(&text);
                    return;
                }
                Node::new(NodeData::Text(RefCell::new(text.to_string())))
            }
            NodeOrText::AppendNode(node) => node,
        };
        *node.parent.borrow_mut() = Some(Rc::downgrade(&parent));
        children.insert(index, node);
    }

    fn add_attrs_if_missing(&self, target: &Handle, attrs: Vec<Attribute>) {
        if let NodeData::Element { attrs: existing } = &target.data {
            let mut existing = existing.borrow_mut();
            for attr in attrs {
                if !existing.iter().any(|a| a.name == attr.name) {
                    existing.push(attr);
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Handle) {
        detach(target);
    }

    fn reparent_children(&self, node: &Handle, new_parent: &Handle) {
        let children = std::mem::take(&mut *node.children.borrow_mut());
        for child in children {
            *child.parent.borrow_mut() = Some(Rc::downgrade(new_parent));
            new_parent.children.borrow_mut().push(child);
        }
    }
}

/// Parse `html` as the content of a `<body>` and return the body element.
fn parse_body(html: &str) -> Option<Handle> {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            // Lets `<noscript>` fallbacks (often the real image) parse as markup.
            scripting_enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let wrapped = format!("<!DOCTYPE html><html><head></head><body>{html}</body></html>");
    let document = parse_document(FragmentSink::new(), opts)
        .from_utf8()
        .one(wrapped.as_bytes());
    find_element(&document, "body")
}

fn find_element(node: &Handle, local: &str) -> Option<Handle> {
    if node.is_element(local) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, local))
}

fn count_in(node: &Handle, local: &str) -> usize {
    let own = usize::from(node.is_element(local));
    own + node
        .children
        .borrow()
        .iter()
        .map(|child| count_in(child, local))
        .sum::<usize>()
}

// ============================================================================
// Public operations
// ============================================================================

/// Make an HTML fragment well-formed XHTML, ready to embed in a chapter.
pub fn to_xhtml_fragment(html: &str) -> String {
    let Some(body) = parse_body(html) else {
        return String::new();
    };
    let mut out = String::with_capacity(html.len() + html.len() / 16);
    for child in body.children.borrow().iter() {
        write_node(child, HTML_NS, &mut out);
    }
    out
}

/// Number of `local` elements in an HTML fragment.
pub fn count_elements(html: &str, local: &str) -> usize {
    parse_body(html).map_or(0, |body| count_in(&body, local) - usize::from(local == "body"))
}

/// Decode character references in a raw attribute value the way a browser
/// would (`&amp;` → `&`, `&eacute;` → `é`, `&#233;` → `é`).
pub fn decode_attribute(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let markup = format!("<i title=\"{}\"></i>", raw.replace('"', "&quot;"));
    parse_body(&markup)
        .and_then(|body| find_element(&body, "i"))
        .and_then(|i| i.attribute("title"))
        .unwrap_or_else(|| raw.to_string())
}

// ============================================================================
// Serialization
// ============================================================================

fn write_node(node: &Handle, parent_ns: &str, out: &mut String) {
    match &node.data {
        NodeData::Text(text) => push_escaped(out, &text.borrow(), false),
        NodeData::Comment(text) => {
            // XML forbids `--` inside a comment and a trailing `-`.
            if !text.contains("--") && !text.ends_with('-') {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
        }
        NodeData::Element { attrs } => write_element(node, &attrs.borrow(), parent_ns, out),
        NodeData::Document | NodeData::Ignored => {}
    }
}

fn write_element(node: &Handle, attrs: &[Attribute], parent_ns: &str, out: &mut String) {
    let name = node.name.local.as_ref();
    let ns = node.name.ns.as_ref();
    let is_html = ns == HTML_NS;
    if is_html && DROPPED_ELEMENTS.contains(&name) {
        return;
    }

    out.push('<');
    out.push_str(name);
    if ns != parent_ns && !ns.is_empty() {
        push_attribute(out, "xmlns", ns);
    }
    let has_plain_href = attrs
        .iter()
        .any(|a| a.name.ns.is_empty() && a.name.local.as_ref() == "href");
    for attr in attrs {
        let local = attr.name.local.as_ref();
        match attr.name.ns.as_ref() {
            // On HTML elements the parser leaves `xml:lang` as a plain name.
            "" if local == "xml:lang" || (local != "xmlns" && is_xhtml_attribute_name(local)) => {
                push_attribute(out, local, &attr.value);
            }
            XML_NS if matches!(local, "lang" | "space") => {
                push_attribute(out, &format!("xml:{local}"), &attr.value);
            }
            // SVG 2 readers take a plain `href`; the xlink prefix is not declared.
            XLINK_NS if local == "href" && !has_plain_href => {
                push_attribute(out, "href", &attr.value);
            }
            _ => {}
        }
    }

    let children = node.children.borrow();
    if children.is_empty() && (!is_html || VOID_ELEMENTS.contains(&name)) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in children.iter() {
        write_node(child, ns, out);
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}
