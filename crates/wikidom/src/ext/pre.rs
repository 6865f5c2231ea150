//! `<pre>` as an extension tag
//!
//! Unlike an indent-pre, the body is literal: `<nowiki>` wrappers are
//! dropped, character references are decoded, and one leading newline is
//! stripped. The exact body source is kept in `data-mw` so an unmodified
//! block serializes back byte for byte.

use crate::document::Document;
use crate::entities::decode_wt_entities;
use crate::error::Result;
use crate::extension::{ExtensionApi, ExtensionTag};
use crate::serializer::escape_attr;
use crate::types::{Attributes, DataMw, DataParsoid, MwBody, NodeId, Syntax};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static NOWIKI_WRAPPER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<nowiki\s*>(.*?)</nowiki\s*>").expect("valid nowiki wrapper regex")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct Pre;

fn write_attrs<'a>(out: &mut String, attrs: impl Iterator<Item = (&'a str, &'a str)>) {
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
}

fn is_wrapper_attr(name: &str) -> bool {
    name == "typeof" || name == "about" || name.starts_with("data-")
}

fn body_text(src: &str) -> String {
    let unwrapped = NOWIKI_WRAPPER_RE.replace_all(src, "${1}");
    let stripped = unwrapped.strip_prefix('\n').unwrap_or(&unwrapped);
    decode_wt_entities(stripped)
}

fn escape_body(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    if text.starts_with('\n') {
        out.push('\n');
    }
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
    out
}

impl ExtensionTag for Pre {
    fn name(&self) -> &str {
        "pre"
    }

    fn to_dom(&self, _api: &mut ExtensionApi, src: &str, args: &Attributes) -> Result<Document> {
        let mut doc = Document::new();
        let body = doc.body();
        let pre = doc.create_element_with("pre", args.clone());
        doc.append_child(body, pre)?;

        let text = doc.create_text(&body_text(src));
        doc.append_child(pre, text)?;
        doc.normalize(pre)?;

        doc.set_data_parsoid(
            pre,
            DataParsoid {
                stx: Some(Syntax::Html),
                ..Default::default()
            },
        );
        let attrs: BTreeMap<String, String> = args
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        doc.set_data_mw(
            pre,
            DataMw {
                name: Some("pre".into()),
                attrs: Some(attrs),
                body: Some(MwBody {
                    extsrc: Some(src.to_string()),
                    html: None,
                }),
                ..Default::default()
            },
        );
        Ok(doc)
    }

    fn from_dom(
        &self,
        _api: &mut ExtensionApi,
        doc: &mut Document,
        node: NodeId,
        wrapper_unmodified: bool,
    ) -> Result<String> {
        let mw = doc.data_mw(node).cloned().unwrap_or_default();
        let mut out = String::from("<pre");
        let extsrc = mw.body.and_then(|b| b.extsrc);
        match extsrc {
            Some(src) if wrapper_unmodified => {
                if let Some(attrs) = &mw.attrs {
                    write_attrs(&mut out, attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                }
                out.push('>');
                out.push_str(&src);
            }
            _ => {
                tracing::debug!("[Extension] Regenerating <pre> source for node {}", node);
                let node_ref = doc.get(node)?;
                write_attrs(
                    &mut out,
                    node_ref.attributes.iter().filter(|(k, _)| !is_wrapper_attr(k)),
                );
                out.push('>');
                out.push_str(&escape_body(&doc.text_content(node)));
            }
        }
        out.push_str("</pre>");
        Ok(out)
    }
}
