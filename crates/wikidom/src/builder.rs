//! DOM Builder - Construct a document from a positioned token stream
//!
//! This handles:
//! - Tree construction from start/end/text/comment tokens
//! - Parse provenance: `dsr`, syntax variant, self-closing flag
//! - Attribute shadows: source text of attributes whose value was normalized
//! - Auto-closing unclosed elements (recorded as `autoInsertedEnd`)
//! - The inverse conversion, document → tokens
//!
//! Tokens can also be fed as JSON, one object per token:
//! ```json
//! [
//!   {"type": "startTag", "name": "p", "dsr": [0, 1, 0, 0]},
//!   {"type": "text", "value": "hi"},
//!   {"type": "endTag", "name": "p"}
//! ]
//! ```

use crate::document::Document;
use crate::error::Result;
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Diagnostic channel for malformed token streams
pub const BUILDER_CHANNEL: &str = "warn/dom-builder";

/// One attribute of a start tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAttr {
    pub name: String,
    pub value: String,
    /// Source text, when it differs from the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

impl TokenAttr {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            src: None,
        }
    }

    pub fn with_source(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Token {
    StartTag {
        name: String,
        #[serde(default)]
        attrs: Vec<TokenAttr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dsr: Option<Dsr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stx: Option<Syntax>,
        #[serde(default, rename = "selfClosing")]
        self_closing: bool,
    },
    EndTag {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dsr: Option<Dsr>,
    },
    Text {
        value: String,
    },
    Comment {
        value: String,
    },
}

impl Token {
    pub fn start(name: &str) -> Self {
        Token::StartTag {
            name: name.to_string(),
            attrs: Vec::new(),
            dsr: None,
            stx: None,
            self_closing: false,
        }
    }

    pub fn end(name: &str) -> Self {
        Token::EndTag {
            name: name.to_string(),
            dsr: None,
        }
    }

    pub fn text(value: &str) -> Self {
        Token::Text {
            value: value.to_string(),
        }
    }
}

/// Configuration for the DOM builder
#[derive(Debug, Clone)]
pub struct DomBuilderConfig {
    /// Record `a`/`sa` provenance for attributes with source text
    pub record_attribute_shadows: bool,
}

impl Default for DomBuilderConfig {
    fn default() -> Self {
        Self {
            record_attribute_shadows: true,
        }
    }
}

/// Tree constructor for token streams
pub struct DomBuilder {
    config: DomBuilderConfig,
}

impl DomBuilder {
    pub fn new() -> Self {
        Self::with_config(DomBuilderConfig::default())
    }

    pub fn with_config(config: DomBuilderConfig) -> Self {
        Self { config }
    }

    /// Parse a JSON token array and build a document
    pub fn build_from_json(&self, tokens: &Value) -> Result<Document> {
        let tokens: Vec<Token> = serde_json::from_value(tokens.clone())?;
        self.build(tokens)
    }

    /// Build a document whose `<body>` holds the token stream's content
    pub fn build<I>(&self, tokens: I) -> Result<Document>
    where
        I: IntoIterator<Item = Token>,
    {
        let mut doc = Document::new();
        let body = doc.body();
        let mut open: Vec<NodeId> = Vec::new();

        for token in tokens {
            let parent = open.last().copied().unwrap_or(body);
            match token {
                Token::StartTag {
                    name,
                    attrs,
                    dsr,
                    stx,
                    self_closing,
                } => {
                    let el = self.create_element(&mut doc, &name, &attrs, dsr, stx, self_closing);
                    doc.append_child(parent, el)?;
                    let void = VOID_ELEMENTS.contains(&doc.get(el)?.name.as_str());
                    if !self_closing && !void {
                        open.push(el);
                    }
                }
                Token::EndTag { name, dsr } => {
                    let name = name.to_ascii_lowercase();
                    let Some(pos) = open.iter().rposition(|&n| doc.get(n).is_ok_and(|n| n.name == name)) else {
                        tracing::debug!("[DomBuilder] Ignoring stray </{}>", name);
                        doc.push_diagnostic(
                            BUILDER_CHANNEL,
                            format!("stray end tag </{}> ignored", name),
                            Some(parent),
                        );
                        continue;
                    };
                    for unclosed in open.drain(pos + 1..).rev().collect::<Vec<_>>() {
                        Self::mark_auto_closed(&mut doc, unclosed);
                    }
                    if let Some(closed) = open.pop() {
                        Self::close_with(&mut doc, closed, dsr);
                    }
                }
                Token::Text { value } => Self::append_text(&mut doc, parent, &value)?,
                Token::Comment { value } => {
                    let c = doc.create_comment(&value);
                    doc.append_child(parent, c)?;
                }
            }
        }

        for unclosed in open.into_iter().rev() {
            Self::mark_auto_closed(&mut doc, unclosed);
        }
        tracing::debug!("[DomBuilder] Built document with {} nodes", doc.len());
        Ok(doc)
    }

    fn create_element(
        &self,
        doc: &mut Document,
        name: &str,
        attrs: &[TokenAttr],
        dsr: Option<Dsr>,
        stx: Option<Syntax>,
        self_closing: bool,
    ) -> NodeId {
        let attributes: Attributes = attrs
            .iter()
            .map(|a| (a.name.to_ascii_lowercase(), a.value.clone()))
            .collect();
        let el = doc.create_element_with(name, attributes);

        let mut dp = DataParsoid {
            dsr,
            stx,
            self_close: self_closing,
            ..Default::default()
        };
        let shadowed = attrs
            .iter()
            .any(|a| a.src.as_deref().is_some_and(|s| s != a.value));
        if self.config.record_attribute_shadows && shadowed {
            for a in attrs {
                dp.record_attribute(&a.name.to_ascii_lowercase(), Some(&a.value), a.src.as_deref());
            }
        }
        if !dp.is_empty() {
            doc.set_data_parsoid(el, dp);
        }
        el
    }

    fn append_text(doc: &mut Document, parent: NodeId, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        if let Some(last) = doc.last_child(parent) {
            if doc.get(last)?.is_text() {
                doc.get_mut(last)?.value.push_str(value);
                return Ok(());
            }
        }
        let t = doc.create_text(value);
        doc.append_child(parent, t)
    }

    fn mark_auto_closed(doc: &mut Document, el: NodeId) {
        if let Some(dp) = doc.data_parsoid_mut(el) {
            dp.auto_inserted_end = true;
        }
    }

    fn close_with(doc: &mut Document, el: NodeId, end: Option<Dsr>) {
        let Some(end) = end else {
            return;
        };
        let Some(dp) = doc.data_parsoid_mut(el) else {
            return;
        };
        let Some(dsr) = dp.dsr.as_mut() else {
            return;
        };
        if let (Some(s), Some(e)) = (end.start, end.end) {
            dsr.end = Some(e);
            dsr.close_width = Some(e.saturating_sub(s));
        }
    }
}

impl Default for DomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Token stream for the children of `root`.
///
/// Elements whose end tag was auto-inserted get no end token, so building
/// the stream again reproduces the flag. Parser-private `data-parsoid*`
/// attributes are folded back into token fields.
pub fn tokens_from_dom(doc: &Document, root: NodeId) -> Result<Vec<Token>> {
    enum Step {
        Open(NodeId),
        Close(NodeId),
    }
    let mut tokens = Vec::new();
    let mut stack: Vec<Step> = doc.children(root).into_iter().rev().map(Step::Open).collect();

    while let Some(step) = stack.pop() {
        match step {
            Step::Open(id) => {
                let node = doc.get(id)?;
                match node.kind {
                    NodeKind::Element => {
                        let dp = doc.peek_data_parsoid(id).map(|dp| dp.into_owned()).unwrap_or_default();
                        let attrs = node
                            .attributes
                            .iter()
                            .filter(|(k, _)| !k.starts_with("data-parsoid"))
                            .map(|(k, v)| TokenAttr {
                                name: k.to_string(),
                                value: v.to_string(),
                                src: dp.sa.as_ref().and_then(|sa| sa.get(k).cloned().flatten()),
                            })
                            .collect();
                        tokens.push(Token::StartTag {
                            name: node.name.clone(),
                            attrs,
                            dsr: dp.dsr,
                            stx: dp.stx.clone(),
                            self_closing: dp.self_close,
                        });
                        let void = VOID_ELEMENTS.contains(&node.name.as_str());
                        if dp.self_close || void {
                            continue;
                        }
                        if !dp.auto_inserted_end {
                            stack.push(Step::Close(id));
                        }
                        stack.extend(doc.children(id).into_iter().rev().map(Step::Open));
                    }
                    NodeKind::Text => tokens.push(Token::text(&node.value)),
                    NodeKind::Comment => tokens.push(Token::Comment {
                        value: node.value.clone(),
                    }),
                    NodeKind::Document => {}
                }
            }
            Step::Close(id) => tokens.push(Token::end(&doc.get(id)?.name)),
        }
    }
    Ok(tokens)
}
