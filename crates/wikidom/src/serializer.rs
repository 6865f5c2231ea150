//! DOM Serializer - Convert a document tree back to HTML markup
//!
//! This module handles:
//! - Outer/inner HTML of any node
//! - Text and attribute escaping
//! - Void elements and the leading-newline rule for `<pre>`
//! - Optional stripping of the parser-private `data-parsoid*` attributes
//!
//! The serializer reads attributes only. Sidecar records must be saved
//! with [`Document::save_data_attribs`] before they show up in the output.

use crate::document::Document;
use crate::error::Result;
use crate::types::*;

/// Serializer configuration
#[derive(Debug, Clone)]
pub struct SerializerConfig {
    /// Emit `data-parsoid` and `data-parsoid-diff` attributes
    pub include_data_attribs: bool,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            include_data_attribs: true,
        }
    }
}

/// HTML Serializer
pub struct DomSerializer {
    config: SerializerConfig,
}

enum Step {
    Open(NodeId),
    Close(NodeId),
}

impl DomSerializer {
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self { config }
    }

    /// Serialize the contents of `<body>`
    pub fn serialize(&self, doc: &Document) -> Result<String> {
        self.inner_html(doc, doc.body())
    }

    /// Markup of the node itself and its subtree
    pub fn outer_html(&self, doc: &Document, id: NodeId) -> Result<String> {
        let mut output = String::with_capacity(256);
        self.write_subtree(doc, id, &mut output)?;
        Ok(output)
    }

    /// Markup of the node's children
    pub fn inner_html(&self, doc: &Document, id: NodeId) -> Result<String> {
        let mut output = String::with_capacity(256);
        let node = doc.get(id)?;
        if Self::skips_leading_newline(node) && Self::starts_with_newline(doc, id) {
            output.push('\n');
        }
        let mut child = node.first_child();
        while let Some(c) = child {
            self.write_subtree(doc, c, &mut output)?;
            child = doc.next_sibling(c);
        }
        Ok(output)
    }

    fn write_subtree(&self, doc: &Document, id: NodeId, output: &mut String) -> Result<()> {
        let mut stack = vec![Step::Open(id)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Open(id) => {
                    let node = doc.get(id)?;
                    match node.kind {
                        NodeKind::Element => {
                            self.write_start_tag(doc, node, output);
                            if VOID_ELEMENTS.contains(&node.name.as_str()) {
                                continue;
                            }
                            stack.push(Step::Close(id));
                            let children = doc.children(id);
                            stack.extend(children.into_iter().rev().map(Step::Open));
                        }
                        NodeKind::Text => escape_text(&node.value, output),
                        NodeKind::Comment => {
                            output.push_str("<!--");
                            output.push_str(&node.value);
                            output.push_str("-->");
                        }
                        NodeKind::Document => {
                            let children = doc.children(id);
                            stack.extend(children.into_iter().rev().map(Step::Open));
                        }
                    }
                }
                Step::Close(id) => {
                    let node = doc.get(id)?;
                    output.push_str("</");
                    output.push_str(&node.name);
                    output.push('>');
                }
            }
        }
        Ok(())
    }

    fn write_start_tag(&self, doc: &Document, node: &Node, output: &mut String) {
        output.push('<');
        output.push_str(&node.name);
        for (name, value) in node.attributes.iter() {
            if !self.config.include_data_attribs && is_private_data_attr(name) {
                continue;
            }
            output.push(' ');
            output.push_str(name);
            output.push_str("=\"");
            escape_attr(value, output);
            output.push('"');
        }
        output.push('>');
        if Self::skips_leading_newline(node) && Self::starts_with_newline(doc, node.id) {
            output.push('\n');
        }
    }

    // An HTML parser drops one newline right after these start tags
    fn skips_leading_newline(node: &Node) -> bool {
        matches!(node.name.as_str(), "pre" | "textarea" | "listing")
    }

    fn starts_with_newline(doc: &Document, id: NodeId) -> bool {
        doc.first_child(id)
            .and_then(|c| doc.node(c))
            .is_some_and(|c| c.is_text() && c.value.starts_with('\n'))
    }
}

impl Default for DomSerializer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_private_data_attr(name: &str) -> bool {
    name == "data-parsoid" || name == "data-parsoid-diff"
}

/// Escape `&`, `<` and `>` in text content
pub fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '\u{a0}' => output.push_str("&nbsp;"),
            _ => output.push(c),
        }
    }
}

/// Escape `&` and `"` in attribute values
pub fn escape_attr(value: &str, output: &mut String) {
    for c in value.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '\u{a0}' => output.push_str("&nbsp;"),
            _ => output.push(c),
        }
    }
}
