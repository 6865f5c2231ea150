//! Encapsulation resolver
//!
//! Template, extension and media output is a run of adjacent siblings that
//! share one `about` id. The first member carries the `typeof` marker.
//! Passes use these helpers to treat the run as one unit.
//!
//! Only adjacency defines a group. The one exception is whitespace-only
//! text in table context, which is never span-wrapped (it would be
//! fostered out) yet still belongs to the run it sits in.

use crate::document::Document;
use crate::error::{DomError, Result};
use crate::predicates::{is_elt, is_fosterable_position, is_iew};
use crate::serializer::DomSerializer;
use crate::types::{MwType, NodeId, NodeKind, TypeTag};
use ahash::AHashMap;

/// Output of one expansion and its rendered markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub nodes: Vec<NodeId>,
    pub html: String,
}

/// A node that reuses an `about` id without being adjacent to its group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub about: String,
    pub node: NodeId,
}

/// Expansions of a document, keyed by source text (media: cache key)
#[derive(Debug, Clone, Default)]
pub struct Expansions {
    pub transclusions: AHashMap<String, Expansion>,
    pub extensions: AHashMap<String, Expansion>,
    pub files: AHashMap<String, Expansion>,
    pub violations: Vec<Violation>,
}

impl Expansions {
    pub fn is_empty(&self) -> bool {
        self.transclusions.is_empty() && self.extensions.is_empty() && self.files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpansionKind {
    Transclusion,
    Extension,
    File,
}

fn expansion_kind(doc: &Document, id: NodeId) -> Option<ExpansionKind> {
    let node = doc.node(id)?;
    if !node.is_element() {
        return None;
    }
    let types = node.type_of();
    let has_about = node.attr("about").is_some();
    if has_about && types.has(MwType::Transclusion) {
        Some(ExpansionKind::Transclusion)
    } else if has_about
        && types
            .find(MwType::Extension)
            .is_some_and(|t| t.sub().is_some())
    {
        Some(ExpansionKind::Extension)
    } else if types.has(MwType::Image) {
        Some(ExpansionKind::File)
    } else {
        None
    }
}

/// True for the first wrapper of a template/extension/media group
pub fn is_first_encapsulation_wrapper(doc: &Document, id: NodeId) -> bool {
    let Some(node) = doc.node(id) else {
        return false;
    };
    if !node.is_element() || node.attr("about").is_none() {
        return false;
    }
    node.type_of().iter().any(|t| {
        matches!(
            t.kind(),
            Some(MwType::Transclusion | MwType::Extension | MwType::Image | MwType::Param)
        ) && !t.is_end()
    })
}

/// Siblings following `node` that belong to the group with id `about`.
///
/// The result always starts with `node`. Without an id the group is the
/// node alone.
pub fn about_siblings(doc: &Document, node: NodeId, about: Option<&str>) -> Vec<NodeId> {
    let mut nodes = vec![node];
    let Some(about) = about else {
        return nodes;
    };
    let mut next = doc.next_sibling(node);
    while let Some(n) = next {
        let same_about = is_elt(doc, n) && doc.attr(n, "about") == Some(about);
        let table_ws = !is_elt(doc, n) && is_fosterable_position(doc, n) && is_iew(doc, n);
        if !(same_about || table_ws) {
            break;
        }
        nodes.push(n);
        next = doc.next_sibling(n);
    }
    nodes
}

/// Group of `node`, using its own `about` attribute
pub fn group_siblings(doc: &Document, node: NodeId) -> Vec<NodeId> {
    about_siblings(doc, node, doc.attr(node, "about"))
}

/// First node after the group starting at `node`
pub fn skip_group(doc: &Document, node: NodeId) -> Option<NodeId> {
    let group = group_siblings(doc, node);
    group.last().and_then(|&last| doc.next_sibling(last))
}

/// Later siblings that reuse the group's id without being adjacent to it
fn stray_members(doc: &Document, group: &[NodeId], about: &str) -> Vec<NodeId> {
    let mut stray = Vec::new();
    let mut next = group.last().and_then(|&last| doc.next_sibling(last));
    while let Some(n) = next {
        if is_elt(doc, n) && doc.attr(n, "about") == Some(about) {
            stray.push(n);
        }
        next = doc.next_sibling(n);
    }
    stray
}

/// Group of `node`, failing when the group's id shows up again further on
pub fn check_encapsulation(doc: &Document, node: NodeId) -> Result<Vec<NodeId>> {
    let group = group_siblings(doc, node);
    if let Some(about) = doc.attr(node, "about") {
        if let Some(&stray) = stray_members(doc, &group, about).first() {
            return Err(DomError::Encapsulation {
                about: about.to_string(),
                node: stray,
            });
        }
    }
    Ok(group)
}

/// Collect template, extension and media expansions of the document body.
///
/// Group members are saved before their markup is rendered, and scanning
/// resumes after each group without descending into it.
pub fn extract_expansions(doc: &mut Document) -> Result<Expansions> {
    let serializer = DomSerializer::new();
    let mut expansions = Expansions::default();
    let mut parents: Vec<NodeId> = Vec::new();
    let mut cursor = doc.first_child(doc.body());

    loop {
        let Some(node) = cursor else {
            match parents.pop() {
                Some(p) => {
                    cursor = doc.next_sibling(p);
                    continue;
                }
                None => break,
            }
        };
        if !is_elt(doc, node) {
            cursor = doc.next_sibling(node);
            continue;
        }
        let Some(kind) = expansion_kind(doc, node) else {
            match doc.first_child(node) {
                Some(first) => {
                    parents.push(node);
                    cursor = Some(first);
                }
                None => cursor = doc.next_sibling(node),
            }
            continue;
        };

        doc.load_data_parsoid(node);
        let about = doc.attr(node, "about").map(str::to_string);
        let group = about_siblings(doc, node, about.as_deref());
        if let Some(about) = &about {
            for stray in stray_members(doc, &group, about) {
                tracing::warn!(
                    "[Encapsulation] Node {} reuses about id {} outside its group",
                    stray,
                    about
                );
                expansions.violations.push(Violation {
                    about: about.clone(),
                    node: stray,
                });
            }
        }

        let key = doc.data_parsoid(node).and_then(|dp| match kind {
            ExpansionKind::File => dp.cache_key.clone(),
            _ => dp.src.clone(),
        });
        if let Some(key) = key {
            let mut html = String::new();
            for &member in &group {
                doc.save_subtree(member)?;
                html.push_str(&serializer.outer_html(doc, member)?);
            }
            tracing::debug!(
                "[Encapsulation] {:?} expansion of {} nodes keyed {:?}",
                kind,
                group.len(),
                key
            );
            let map = match kind {
                ExpansionKind::Transclusion => &mut expansions.transclusions,
                ExpansionKind::Extension => &mut expansions.extensions,
                ExpansionKind::File => &mut expansions.files,
            };
            map.insert(
                key,
                Expansion {
                    nodes: group.clone(),
                    html,
                },
            );
        }
        cursor = group.last().and_then(|&last| doc.next_sibling(last));
    }
    Ok(expansions)
}

/// Wrap runs of text and comment nodes in spans so that every node in
/// the returned list is an element
pub fn add_span_wrappers(doc: &mut Document, nodes: &[NodeId]) -> Result<Vec<NodeId>> {
    let mut out = Vec::with_capacity(nodes.len());
    let mut pending: Vec<NodeId> = Vec::new();
    for &node in nodes {
        match doc.get(node)?.kind {
            NodeKind::Text | NodeKind::Comment => pending.push(node),
            _ => {
                if !pending.is_empty() {
                    out.push(wrap_run(doc, &pending)?);
                    pending.clear();
                }
                out.push(node);
            }
        }
    }
    if !pending.is_empty() {
        out.push(wrap_run(doc, &pending)?);
    }
    Ok(out)
}

fn wrap_run(doc: &mut Document, run: &[NodeId]) -> Result<NodeId> {
    let first = run[0];
    let parent = doc.parent(first).ok_or(DomError::NodeNotFound(first))?;
    let span = doc.create_element("span");
    doc.insert_before(parent, span, Some(first))?;
    for &n in run {
        doc.append_child(span, n)?;
    }
    Ok(span)
}

/// Move `node` into a new `<span typeof=...>` at the same position
pub fn wrap_text_in_typed_span(doc: &mut Document, node: NodeId, tag: TypeTag) -> Result<NodeId> {
    let parent = doc.parent(node).ok_or(DomError::NodeNotFound(node))?;
    let span = doc.create_element("span");
    doc.set_attr(span, "typeof", &tag.to_string())?;
    doc.insert_before(parent, span, Some(node))?;
    doc.append_child(span, node)?;
    Ok(span)
}

/// Insert a `<meta typeof=...>` right before `node`
pub fn prepend_typed_meta(doc: &mut Document, node: NodeId, tag: TypeTag) -> Result<NodeId> {
    let parent = doc.parent(node).ok_or(DomError::NodeNotFound(node))?;
    let meta = doc.create_element("meta");
    doc.set_attr(meta, "typeof", &tag.to_string())?;
    doc.insert_before(parent, meta, Some(node))?;
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attributes, DataParsoid};

    fn el(doc: &mut Document, parent: NodeId, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs: Attributes = attrs.iter().copied().collect();
        let id = doc.create_element_with(name, attrs);
        doc.append_child(parent, id).unwrap();
        id
    }

    fn text(doc: &mut Document, parent: NodeId, s: &str) -> NodeId {
        let id = doc.create_text(s);
        doc.append_child(parent, id).unwrap();
        id
    }

    #[test]
    fn test_group_and_skip() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = el(&mut doc, body, "p", &[("about", "x")]);
        let b = el(&mut doc, body, "p", &[("about", "x")]);
        let c = el(&mut doc, body, "p", &[("about", "y")]);

        assert_eq!(group_siblings(&doc, a), vec![a, b]);
        assert_eq!(skip_group(&doc, a), Some(c));
        assert_eq!(skip_group(&doc, c), None);
        assert_eq!(about_siblings(&doc, a, None), vec![a]);
    }

    #[test]
    fn test_text_breaks_group_outside_tables() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = el(&mut doc, body, "span", &[("about", "#mwt1")]);
        text(&mut doc, body, " ");
        el(&mut doc, body, "span", &[("about", "#mwt1")]);
        assert_eq!(group_siblings(&doc, a), vec![a]);
    }

    #[test]
    fn test_table_whitespace_belongs_to_group() {
        let mut doc = Document::new();
        let body = doc.body();
        let table = el(&mut doc, body, "table", &[]);
        let tbody = el(&mut doc, table, "tbody", &[]);
        let r1 = el(&mut doc, tbody, "tr", &[("about", "#mwt1")]);
        let ws = text(&mut doc, tbody, "\n");
        let r2 = el(&mut doc, tbody, "tr", &[("about", "#mwt1")]);
        let r3 = el(&mut doc, tbody, "tr", &[]);

        assert_eq!(group_siblings(&doc, r1), vec![r1, ws, r2]);
        assert_eq!(skip_group(&doc, r1), Some(r3));
    }

    #[test]
    fn test_check_encapsulation_rejects_stray_member() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = el(&mut doc, body, "p", &[("about", "#mwt1")]);
        el(&mut doc, body, "p", &[]);
        let stray = el(&mut doc, body, "p", &[("about", "#mwt1")]);

        match check_encapsulation(&doc, a) {
            Err(DomError::Encapsulation { about, node }) => {
                assert_eq!(about, "#mwt1");
                assert_eq!(node, stray);
            }
            other => panic!("expected encapsulation error, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_expansions() {
        let mut doc = Document::new();
        let body = doc.body();
        let div = el(&mut doc, body, "div", &[]);
        let t1 = el(
            &mut doc,
            div,
            "p",
            &[("typeof", "mw:Transclusion"), ("about", "#mwt1")],
        );
        text(&mut doc, t1, "a");
        let t2 = el(&mut doc, div, "p", &[("about", "#mwt1")]);
        text(&mut doc, t2, "b");
        doc.set_data_parsoid(
            t1,
            DataParsoid {
                src: Some("{{echo|a}}".into()),
                ..Default::default()
            },
        );
        let ext = el(
            &mut doc,
            body,
            "pre",
            &[
                ("typeof", "mw:Extension/pre"),
                ("about", "#mwt2"),
                ("data-parsoid", r#"{"src":"<pre>x</pre>"}"#),
            ],
        );
        let img = el(
            &mut doc,
            body,
            "figure",
            &[
                ("typeof", "mw:Image/Thumb"),
                ("data-parsoid", r#"{"cacheKey":"File:A.png|thumb"}"#),
            ],
        );
        // Inner template of an extension is not visited
        el(
            &mut doc,
            ext,
            "span",
            &[("typeof", "mw:Transclusion"), ("about", "#mwt9"), ("data-parsoid", r#"{"src":"{{x}}"}"#)],
        );

        let exp = extract_expansions(&mut doc).unwrap();
        assert_eq!(exp.transclusions.len(), 1);
        let t = &exp.transclusions["{{echo|a}}"];
        assert_eq!(t.nodes, vec![t1, t2]);
        assert_eq!(
            t.html,
            "<p typeof=\"mw:Transclusion\" about=\"#mwt1\" data-parsoid=\"{&quot;src&quot;:&quot;{{echo|a}}&quot;}\">a</p><p about=\"#mwt1\">b</p>"
        );
        assert_eq!(exp.extensions["<pre>x</pre>"].nodes, vec![ext]);
        assert_eq!(exp.files["File:A.png|thumb"].nodes, vec![img]);
        assert!(exp.violations.is_empty());
    }

    #[test]
    fn test_extract_records_violations() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = el(
            &mut doc,
            body,
            "p",
            &[("typeof", "mw:Transclusion"), ("about", "#mwt1"), ("data-parsoid", r#"{"src":"{{a}}"}"#)],
        );
        el(&mut doc, body, "hr", &[]);
        let stray = el(&mut doc, body, "p", &[("about", "#mwt1")]);

        let exp = extract_expansions(&mut doc).unwrap();
        assert_eq!(exp.transclusions["{{a}}"].nodes, vec![a]);
        assert_eq!(
            exp.violations,
            vec![Violation {
                about: "#mwt1".into(),
                node: stray
            }]
        );
    }

    #[test]
    fn test_group_without_key_is_skipped() {
        let mut doc = Document::new();
        let body = doc.body();
        el(&mut doc, body, "p", &[("typeof", "mw:Transclusion"), ("about", "#mwt1")]);
        let exp = extract_expansions(&mut doc).unwrap();
        assert!(exp.is_empty());
    }

    #[test]
    fn test_add_span_wrappers() {
        let mut doc = Document::new();
        let body = doc.body();
        let t1 = text(&mut doc, body, "a");
        let c1 = doc.create_comment("c");
        doc.append_child(body, c1).unwrap();
        let p = el(&mut doc, body, "p", &[]);
        let t2 = text(&mut doc, body, "b");

        let out = add_span_wrappers(&mut doc, &[t1, c1, p, t2]).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], p);
        assert_eq!(doc.children(out[0]), vec![t1, c1]);
        assert_eq!(doc.children(out[2]), vec![t2]);
        assert_eq!(doc.children(body), out);
    }

    #[test]
    fn test_typed_span_and_meta() {
        let mut doc = Document::new();
        let body = doc.body();
        let t = text(&mut doc, body, "x");
        let span = wrap_text_in_typed_span(&mut doc, t, TypeTag::mw(MwType::Nowiki)).unwrap();
        assert_eq!(doc.attr(span, "typeof"), Some("mw:Nowiki"));
        assert_eq!(doc.parent(t), Some(span));

        let meta =
            prepend_typed_meta(&mut doc, span, TypeTag::mw_sub(MwType::DiffMarker, "deleted")).unwrap();
        assert_eq!(doc.children(body), vec![meta, span]);
        assert_eq!(doc.attr(meta, "typeof"), Some("mw:DiffMarker/deleted"));
    }

    #[test]
    fn test_first_wrapper_detection() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = el(&mut doc, body, "span", &[("typeof", "mw:Extension/ref"), ("about", "#mwt3")]);
        let b = el(&mut doc, body, "span", &[("typeof", "mw:Transclusion")]);
        let c = el(&mut doc, body, "meta", &[("typeof", "mw:Transclusion/End"), ("about", "#mwt4")]);
        assert!(is_first_encapsulation_wrapper(&doc, a));
        assert!(!is_first_encapsulation_wrapper(&doc, b));
        assert!(!is_first_encapsulation_wrapper(&doc, c));
    }
}
