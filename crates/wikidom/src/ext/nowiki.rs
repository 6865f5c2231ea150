//! `<nowiki>`: everything inside is literal text
//!
//! Character references stay visible to editors: each decodable one
//! becomes a `<span typeof="mw:Entity">` that remembers its source text.

use crate::document::Document;
use crate::entities::{decode_entity, entity_encode_all, ENTITY_RE};
use crate::error::{DomError, Result};
use crate::extension::{ExtensionApi, ExtensionTag, Html2WtFlag};
use crate::predicates::is_diff_marker;
use crate::types::{Attributes, DataParsoid, MwType, NodeId, NodeKind, TypeTag};
use regex::Regex;
use std::sync::LazyLock;

const LOG_CHANNEL: &str = "error/html2wt/nowiki";

static NOWIKI_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?nowiki\s*/?\s*)>").expect("valid nowiki regex"));

/// Escape `<nowiki>`, `</nowiki>` and `<nowiki/>` so they stay literal
pub fn escape_nowiki_tags(text: &str) -> String {
    NOWIKI_TAG_RE.replace_all(text, "&lt;${1}&gt;").into_owned()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Nowiki;

impl Nowiki {
    fn append_text(doc: &mut Document, parent: NodeId, text: &str) -> Result<()> {
        if !text.is_empty() {
            let t = doc.create_text(text);
            doc.append_child(parent, t)?;
        }
        Ok(())
    }

    fn entity_source(doc: &mut Document, span: NodeId) -> Result<String> {
        let text = doc.text_content(span);
        let dp = doc.data_parsoid(span).cloned().unwrap_or_default();
        match (dp.src, dp.src_content) {
            (Some(src), Some(content)) if content == text => Ok(src),
            _ => {
                let first = doc.first_child(span).ok_or(DomError::NodeNotFound(span))?;
                Ok(entity_encode_all(&doc.get(first)?.value))
            }
        }
    }

    fn is_entity_span(doc: &Document, id: NodeId) -> bool {
        doc.node(id).is_some_and(|n| {
            n.name == "span" && n.type_of().has(MwType::Entity)
        }) && doc.child_count(id) == 1
    }
}

impl ExtensionTag for Nowiki {
    fn name(&self) -> &str {
        "nowiki"
    }

    fn to_dom(&self, _api: &mut ExtensionApi, src: &str, _args: &Attributes) -> Result<Document> {
        let mut doc = Document::new();
        let body = doc.body();
        let span = doc.create_element("span");
        doc.add_type_of(span, TypeTag::mw(MwType::Nowiki))?;
        doc.append_child(body, span)?;

        let mut last = 0;
        for m in ENTITY_RE.find_iter(src) {
            Self::append_text(&mut doc, span, &src[last..m.start()])?;
            last = m.end();
            let token = m.as_str();
            let Some(decoded) = decode_entity(token) else {
                Self::append_text(&mut doc, span, token)?;
                continue;
            };
            let decoded = decoded.to_string();
            let entity = doc.create_element("span");
            doc.add_type_of(entity, TypeTag::mw(MwType::Entity))?;
            doc.set_data_parsoid(
                entity,
                DataParsoid {
                    src: Some(token.to_string()),
                    src_content: Some(decoded.clone()),
                    ..Default::default()
                },
            );
            Self::append_text(&mut doc, entity, &decoded)?;
            doc.append_child(span, entity)?;
        }
        Self::append_text(&mut doc, span, &src[last..])?;
        doc.normalize(span)?;
        Ok(doc)
    }

    fn from_dom(
        &self,
        api: &mut ExtensionApi,
        doc: &mut Document,
        node: NodeId,
        _wrapper_unmodified: bool,
    ) -> Result<String> {
        if doc.first_child(node).is_none() {
            api.set_html2wt_flag(Html2WtFlag::HasSelfClosingNowikis);
            return Ok("<nowiki/>".to_string());
        }
        let mut out = String::from("<nowiki>");
        for child in doc.children(node) {
            let kind = doc.get(child)?.kind;
            let piece = match kind {
                NodeKind::Element if is_diff_marker(doc, child) => continue,
                NodeKind::Element if Self::is_entity_span(doc, child) => {
                    Self::entity_source(doc, child)?
                }
                NodeKind::Element => {
                    api.log(LOG_CHANNEL, "Invalid nowiki content");
                    doc.text_content(child)
                }
                NodeKind::Text => doc.get(child)?.value.clone(),
                NodeKind::Comment | NodeKind::Document => {
                    api.log(LOG_CHANNEL, "Discarded invalid embedded comment in a <nowiki>");
                    continue;
                }
            };
            out.push_str(&escape_nowiki_tags(&piece));
        }
        out.push_str("</nowiki>");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(src: &str) -> (Document, NodeId) {
        let mut api = ExtensionApi::new();
        let doc = Nowiki.to_dom(&mut api, src, &Attributes::new()).unwrap();
        let span = doc.first_child(doc.body()).unwrap();
        (doc, span)
    }

    fn back(doc: &mut Document, span: NodeId) -> (String, ExtensionApi) {
        let mut api = ExtensionApi::new();
        let out = Nowiki.from_dom(&mut api, doc, span, true).unwrap();
        (out, api)
    }

    #[test]
    fn test_to_dom_structure() {
        let (doc, span) = render("a &amp; b &foo; c");
        assert_eq!(doc.attr(span, "typeof"), Some("mw:Nowiki"));
        let kids = doc.children(span);
        assert_eq!(kids.len(), 3);
        assert_eq!(doc.get(kids[0]).unwrap().value, "a ");
        assert_eq!(doc.attr(kids[1], "typeof"), Some("mw:Entity"));
        assert_eq!(doc.text_content(kids[1]), "&");
        // Undecodable references stay in the surrounding text
        assert_eq!(doc.get(kids[2]).unwrap().value, " b &foo; c");
    }

    #[test]
    fn test_round_trip_is_exact() {
        for src in [
            "plain",
            "a &amp; b &foo; <b>x</b> &#x41;",
            "&lt;&lt;&#60;",
            "[[not a link]] {{not a template}}",
        ] {
            let (mut doc, span) = render(src);
            let (out, api) = back(&mut doc, span);
            assert_eq!(out, format!("<nowiki>{}</nowiki>", src));
            assert!(api.diagnostics().is_empty());
        }
    }

    #[test]
    fn test_edited_entity_is_reencoded() {
        let (mut doc, span) = render("&lt;");
        let entity = doc.first_child(span).unwrap();
        let text = doc.first_child(entity).unwrap();
        doc.set_text(text, ">").unwrap();
        let (out, _) = back(&mut doc, span);
        assert_eq!(out, "<nowiki>&#x3E;</nowiki>");
    }

    #[test]
    fn test_empty_nowiki_self_closes() {
        let (mut doc, span) = render("");
        let (out, api) = back(&mut doc, span);
        assert_eq!(out, "<nowiki/>");
        assert!(api.has_html2wt_flag(Html2WtFlag::HasSelfClosingNowikis));
    }

    #[test]
    fn test_nested_nowiki_tags_are_escaped() {
        let mut doc = Document::new();
        let span = doc.create_element("span");
        let text = doc.create_text("x</nowiki>y<NOWIKI />");
        doc.append_child(doc.body(), span).unwrap();
        doc.append_child(span, text).unwrap();
        let (out, _) = back(&mut doc, span);
        assert_eq!(out, "<nowiki>x&lt;/nowiki&gt;y&lt;NOWIKI /&gt;</nowiki>");
    }

    #[test]
    fn test_invalid_content_degrades_with_diagnostics() {
        let (mut doc, span) = render("a");
        let b = doc.create_element("b");
        let inner = doc.create_text("bold");
        doc.append_child(b, inner).unwrap();
        doc.append_child(span, b).unwrap();
        let comment = doc.create_comment("c");
        doc.append_child(span, comment).unwrap();
        let marker = doc.create_element("meta");
        doc.set_attr(marker, "typeof", "mw:DiffMarker/deleted").unwrap();
        doc.append_child(span, marker).unwrap();

        let (out, api) = back(&mut doc, span);
        assert_eq!(out, "<nowiki>abold</nowiki>");
        let channels: Vec<_> = api.diagnostics().iter().map(|d| d.channel.as_str()).collect();
        assert_eq!(channels, vec![LOG_CHANNEL, LOG_CHANNEL]);
    }
}
