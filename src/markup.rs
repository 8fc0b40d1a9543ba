//! Markup serialization of reconstructed documents.
//!
//! The output is a namespaced XML tree: a TEI root with an empty header
//! skeleton, a `text`/`body` pair, one `p` element per paragraph (when
//! splitting is on), and one element per tagged span, named after the tag
//! class in a dedicated annotation namespace and carrying the annotation id
//! as an attribute.
//!
//! Rendering is a pure function of the document: no lookups back into tokens
//! or annotations, no timestamps, so re-rendering an unchanged tree is
//! byte-identical. Tag classes become element names; they are expected to be
//! XML-name-safe, which the vocabulary check at table-reload time is
//! responsible for.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::{Document, Node, Paragraph};
use crate::error::Result;

/// TEI namespace of the document tree. Not configurable.
pub const TEI_NS: &str = "http://www.tei-c.org/ns/1.0";

/// Default namespace for tagged span elements.
pub const DEFAULT_ANNOTATION_NS: &str = "https://arclabs.dev/ns/weft/1.0";

/// Default prefix bound to the annotation namespace.
pub const DEFAULT_ANNOTATION_PREFIX: &str = "wa";

/// Ordered space corrections applied once over the fully rendered text.
///
/// Tokens are joined with single spaces; punctuation tokens therefore arrive
/// with an artificial space on the wrong side. The pairs are literal
/// find/replace rules, applied in this order, over the whole serialized
/// string, because quote context can span element boundaries. The guillemet
/// rules follow German usage: `»` opens and hugs the following word, `«`
/// closes and hugs the preceding one.
pub const PUNCTUATION_CORRECTIONS: [(&str, &str); 9] = [
    (" .", "."),
    (" ,", ","),
    (" :", ":"),
    (" ;", ";"),
    ("» ", "»"),
    (" «", "«"),
    (" ?", "?"),
    (" !", "!"),
    (" </p>", "</p>"),
];

/// Serializer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupOptions {
    /// Namespace URI for span elements and the annotation attribute.
    pub annotation_ns: String,
    /// Prefix bound to `annotation_ns`.
    pub annotation_prefix: String,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        Self {
            annotation_ns: DEFAULT_ANNOTATION_NS.to_string(),
            annotation_prefix: DEFAULT_ANNOTATION_PREFIX.to_string(),
        }
    }
}

/// Render a document with default options.
#[must_use]
pub fn render(doc: &Document) -> String {
    render_with(doc, &MarkupOptions::default())
}

/// Render a document to namespaced XML.
#[must_use]
pub fn render_with(doc: &Document, options: &MarkupOptions) -> String {
    let prefix = options.annotation_prefix.as_str();
    let mut xml = String::new();

    xml.push_str("<?xml version='1.0' encoding='UTF-8'?>\n");
    xml.push_str(&format!(
        "<TEI xmlns=\"{TEI_NS}\" xmlns:{prefix}=\"{}\">\n",
        xml_escape(&options.annotation_ns)
    ));
    xml.push_str("  <teiHeader>\n");
    xml.push_str("    <fileDesc/>\n");
    xml.push_str("    <profileDesc/>\n");
    xml.push_str("    <revisionDesc/>\n");
    xml.push_str("  </teiHeader>\n");
    xml.push_str("  <text>\n");

    if doc.split_paragraphs {
        xml.push_str("    <body>\n");
        for paragraph in &doc.paragraphs {
            if paragraph.is_empty() {
                xml.push_str("      <p/>\n");
            } else {
                xml.push_str("      <p>");
                xml.push_str(&paragraph_content(paragraph, prefix));
                xml.push_str("</p>\n");
            }
        }
        xml.push_str("    </body>\n");
    } else {
        let content: String = doc
            .paragraphs
            .iter()
            .map(|p| paragraph_content(p, prefix))
            .collect();
        if content.is_empty() {
            xml.push_str("    <body/>\n");
        } else {
            xml.push_str("    <body>");
            xml.push_str(&content);
            xml.push_str("</body>\n");
        }
    }

    xml.push_str("  </text>\n");
    xml.push_str("</TEI>\n");

    fix_punctuation(&xml)
}

/// Write rendered markup to `path`.
pub fn write_markup(path: impl AsRef<Path>, doc: &Document, options: &MarkupOptions) -> Result<()> {
    std::fs::write(path.as_ref(), render_with(doc, options))?;
    Ok(())
}

/// Apply the ordered punctuation-spacing corrections to a rendered string.
#[must_use]
pub fn fix_punctuation(text: &str) -> String {
    let mut fixed = text.to_string();
    for (from, to) in PUNCTUATION_CORRECTIONS {
        fixed = fixed.replace(from, to);
    }
    fixed
}

fn paragraph_content(paragraph: &Paragraph, prefix: &str) -> String {
    let mut out = String::new();
    for node in &paragraph.nodes {
        match node {
            Node::Run(text) => out.push_str(&xml_escape(text)),
            Node::Span {
                tag_class,
                annotation_id,
                text,
            } => {
                out.push_str(&format!(
                    "<{prefix}:{tag_class} {prefix}:annotation=\"{}\">{}</{prefix}:{tag_class}>",
                    xml_escape(annotation_id),
                    xml_escape(text)
                ));
            }
        }
    }
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
