//! Content classification
//!
//! Decision order: JSON, then XML, then HTML, then plain text. JSON and XML
//! bodies are parsed into structured values; HTML and text are passed on
//! unparsed for the summarizer.

use crate::types::{ContentType, ParsedValue};
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::BTreeMap;

/// Generic XML element tree
///
/// Element and attribute names are local names (namespace prefixes are not
/// kept). `text` holds the element's direct text content, trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct XmlNode {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse an XML document into a tree rooted at its document element
    pub fn parse(xml: &str) -> Result<Self, roxmltree::Error> {
        let document = roxmltree::Document::parse(xml)?;
        Ok(Self::from_element(document.root_element()))
    }

    fn from_element(element: roxmltree::Node<'_, '_>) -> Self {
        let attributes = element
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect();

        let mut text = String::new();
        let mut children = Vec::new();
        for child in element.children() {
            if child.is_element() {
                children.push(Self::from_element(child));
            } else if child.is_text() {
                if let Some(t) = child.text() {
                    text.push_str(t);
                }
            }
        }
        let text = text.trim();

        Self {
            name: element.tag_name().name().to_string(),
            attributes,
            text: (!text.is_empty()).then(|| text.to_string()),
            children,
        }
    }

    /// Serialize back to XML; the output parses to an equal tree
    pub fn to_xml_string(&self) -> String {
        let mut output = String::new();
        self.write_xml(&mut output);
        output
    }

    fn write_xml(&self, output: &mut String) {
        output.push('<');
        output.push_str(&self.name);
        for (name, value) in &self.attributes {
            output.push_str(&format!(" {}=\"{}\"", name, escape_xml(value, true)));
        }
        if self.text.is_none() && self.children.is_empty() {
            output.push_str("/>");
            return;
        }
        output.push('>');
        if let Some(ref text) = self.text {
            output.push_str(&escape_xml(text, false));
        }
        for child in &self.children {
            child.write_xml(output);
        }
        output.push_str(&format!("</{}>", self.name));
    }
}

fn escape_xml(s: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            // Parsers normalize raw line breaks and attribute whitespace
            '\r' => escaped.push_str("&#13;"),
            '\n' if attribute => escaped.push_str("&#10;"),
            '\t' if attribute => escaped.push_str("&#9;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Classify a response body
///
/// Returns the detected kind and, for JSON and XML, the parsed value. A body
/// that claims to be JSON or XML but fails to parse falls through to the
/// HTML/text checks.
pub fn classify(bytes: &[u8], content_type_header: Option<&str>) -> (ContentType, Option<ParsedValue>) {
    let mime = content_type_header
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_lowercase())
        .unwrap_or_default();
    let body = String::from_utf8_lossy(bytes);
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();

    if is_json_mime(&mime) || trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return (ContentType::Json, Some(ParsedValue::Json(value)));
        }
    }

    if is_xml_mime(&mime) || trimmed.starts_with("<?xml") {
        if let Ok(node) = XmlNode::parse(trimmed) {
            if node.name.eq_ignore_ascii_case("html") {
                return (ContentType::Html, None);
            }
            return (ContentType::Xml, Some(ParsedValue::Xml(node)));
        }
    }

    if is_html(&mime, trimmed) {
        (ContentType::Html, None)
    } else {
        (ContentType::Text, None)
    }
}

fn is_json_mime(mime: &str) -> bool {
    mime == "application/json" || mime == "text/json" || mime.ends_with("+json")
}

fn is_xml_mime(mime: &str) -> bool {
    (mime == "application/xml" || mime == "text/xml" || mime.ends_with("+xml"))
        && mime != "application/xhtml+xml"
}

/// Check if content is HTML based on media type and body
fn is_html(mime: &str, body: &str) -> bool {
    if mime == "text/html" || mime == "application/xhtml+xml" {
        return true;
    }

    let head: String = body.chars().take(15).collect::<String>().to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}
