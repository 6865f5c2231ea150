//! Node predicates
//!
//! Pure classification functions over `(&Document, NodeId)`. They never
//! panic and never mutate: an unknown id is simply "not a match". Provenance
//! is read through [`Document::peek_data_parsoid`], which does not load.

use crate::document::{is_parsoid_object_id, Document};
use crate::types::{MwType, NodeId, NodeKind, TypeOf, BLOCK_TAGS, FORMATTING_TAGS};

fn kind(doc: &Document, id: NodeId) -> Option<NodeKind> {
    doc.node(id).map(|n| n.kind)
}

pub fn is_elt(doc: &Document, id: NodeId) -> bool {
    kind(doc, id) == Some(NodeKind::Element)
}

pub fn is_text(doc: &Document, id: NodeId) -> bool {
    kind(doc, id) == Some(NodeKind::Text)
}

pub fn is_comment(doc: &Document, id: NodeId) -> bool {
    kind(doc, id) == Some(NodeKind::Comment)
}

/// Element with the given (lowercase) tag name
pub fn has_node_name(doc: &Document, id: NodeId, name: &str) -> bool {
    doc.node(id)
        .is_some_and(|n| n.is_element() && n.name.eq_ignore_ascii_case(name))
}

pub fn is_block_tag(name: &str) -> bool {
    BLOCK_TAGS.iter().any(|t| t.eq_ignore_ascii_case(name))
}

pub fn is_block_node(doc: &Document, id: NodeId) -> bool {
    doc.node(id)
        .is_some_and(|n| n.is_element() && is_block_tag(&n.name))
}

pub fn is_formatting_elt(doc: &Document, id: NodeId) -> bool {
    doc.node(id).is_some_and(|n| {
        n.is_element() && FORMATTING_TAGS.iter().any(|t| t.eq_ignore_ascii_case(&n.name))
    })
}

fn type_of(doc: &Document, id: NodeId) -> TypeOf {
    doc.node(id).map(|n| n.type_of()).unwrap_or_default()
}

/// Element `name` whose `typeof` carries the given type family
pub fn is_node_of_type(doc: &Document, id: NodeId, name: &str, kind: MwType) -> bool {
    has_node_name(doc, id, name) && type_of(doc, id).has(kind)
}

pub fn is_marker_meta(doc: &Document, id: NodeId, kind: MwType) -> bool {
    is_node_of_type(doc, id, "meta", kind)
}

pub fn is_diff_marker(doc: &Document, id: NodeId) -> bool {
    is_marker_meta(doc, id, MwType::DiffMarker)
}

pub fn is_tpl_marker_meta(doc: &Document, id: NodeId) -> bool {
    is_marker_meta(doc, id, MwType::Transclusion)
}

pub fn is_tpl_start_marker_meta(doc: &Document, id: NodeId) -> bool {
    has_node_name(doc, id, "meta")
        && type_of(doc, id)
            .find(MwType::Transclusion)
            .is_some_and(|t| !t.is_end())
}

pub fn is_tpl_end_marker_meta(doc: &Document, id: NodeId) -> bool {
    has_node_name(doc, id, "meta")
        && type_of(doc, id)
            .find(MwType::Transclusion)
            .is_some_and(|t| t.is_end())
}

/// Element whose attributes were (partly) produced by templates
pub fn is_expanded_attrs(doc: &Document, id: NodeId) -> bool {
    is_elt(doc, id) && type_of(doc, id).has(MwType::ExpandedAttrs)
}

/// Root-level element of template or extension output
pub fn is_tpl_element_node(doc: &Document, id: NodeId) -> bool {
    is_elt(doc, id) && doc.attr(id, "about").is_some_and(is_parsoid_object_id)
}

/// Inter-element whitespace: a whitespace-only text node
pub fn is_iew(doc: &Document, id: NodeId) -> bool {
    doc.node(id)
        .is_some_and(|n| n.is_text() && n.value.chars().all(char::is_whitespace))
}

/// Anything but comments, inter-element whitespace and deletion markers
pub fn is_content_node(doc: &Document, id: NodeId) -> bool {
    doc.node(id).is_some()
        && !is_comment(doc, id)
        && !is_iew(doc, id)
        && !is_diff_marker(doc, id)
}

/// Element written as a literal HTML tag rather than wikitext syntax
pub fn is_literal_html_node(doc: &Document, id: NodeId) -> bool {
    is_elt(doc, id)
        && doc
            .peek_data_parsoid(id)
            .is_some_and(|dp| dp.is_literal_html())
}

/// Element inserted after parsing (no provenance at all)
pub fn is_new_elt(doc: &Document, id: NodeId) -> bool {
    is_elt(doc, id) && !doc.has_provenance(id)
}

/// `<pre>` produced by leading-space indentation
pub fn is_indent_pre(doc: &Document, id: NodeId) -> bool {
    has_node_name(doc, id, "pre") && !is_literal_html_node(doc, id)
}

/// Child of a table container, where stray content gets fostered out
pub fn is_fosterable_position(doc: &Document, id: NodeId) -> bool {
    doc.parent(id).is_some_and(|p| {
        ["table", "tbody", "tr"]
            .iter()
            .any(|t| has_node_name(doc, p, t))
    })
}

pub fn is_list(doc: &Document, id: NodeId) -> bool {
    ["ol", "ul", "dl"].iter().any(|t| has_node_name(doc, id, t))
}

pub fn is_list_elt(doc: &Document, id: NodeId) -> bool {
    ["li", "dd", "dt"].iter().any(|t| has_node_name(doc, id, t))
}

pub fn is_list_or_list_elt(doc: &Document, id: NodeId) -> bool {
    is_list(doc, id) || is_list_elt(doc, id)
}

/// Nodes that render as nothing and can sit between content without
/// affecting whitespace: comments, category links, and metas.
pub fn is_rendering_transparent(doc: &Document, id: NodeId) -> bool {
    is_comment(doc, id)
        || has_node_name(doc, id, "meta")
        || (has_node_name(doc, id, "link")
            && doc
                .attr(id, "rel")
                .is_some_and(|r| r.split_whitespace().any(|t| t.starts_with("mw:PageProp/Category"))))
}

/// Class list membership (whole-word match)
pub fn has_class(doc: &Document, id: NodeId, class: &str) -> bool {
    is_elt(doc, id)
        && doc
            .attr(id, "class")
            .is_some_and(|c| c.split_whitespace().any(|w| w == class))
}

pub fn has_element_child(doc: &Document, id: NodeId) -> bool {
    let mut child = doc.first_child(id);
    while let Some(c) = child {
        if is_elt(doc, c) {
            return true;
        }
        child = doc.next_sibling(c);
    }
    false
}

/// Any block-level element anywhere below `id`
pub fn has_block_element_descendant(doc: &Document, id: NodeId) -> bool {
    let mut stack: Vec<NodeId> = Vec::new();
    let mut child = doc.first_child(id);
    while let Some(c) = child {
        stack.push(c);
        child = doc.next_sibling(c);
    }
    while let Some(n) = stack.pop() {
        if is_elt(doc, n) {
            if is_block_node(doc, n) {
                return true;
            }
            let mut child = doc.first_child(n);
            while let Some(c) = child {
                stack.push(c);
                child = doc.next_sibling(c);
            }
        }
    }
    false
}

/// Any direct child is a block-level element
pub fn has_block_content(doc: &Document, id: NodeId) -> bool {
    let mut child = doc.first_child(id);
    while let Some(c) = child {
        if is_block_node(doc, c) {
            return true;
        }
        child = doc.next_sibling(c);
    }
    false
}

pub fn all_children_are_text(doc: &Document, id: NodeId) -> bool {
    let mut child = doc.first_child(id);
    while let Some(c) = child {
        if !is_text(doc, c) {
            return false;
        }
        child = doc.next_sibling(c);
    }
    true
}

pub fn preceding_element_sibling(doc: &Document, id: NodeId) -> Option<NodeId> {
    let mut sibling = doc.prev_sibling(id);
    while let Some(s) = sibling {
        if is_elt(doc, s) {
            return Some(s);
        }
        sibling = doc.prev_sibling(s);
    }
    None
}

pub fn first_non_sep_child(doc: &Document, id: NodeId) -> Option<NodeId> {
    let mut child = doc.first_child(id);
    while let Some(c) = child {
        if is_content_node(doc, c) {
            return Some(c);
        }
        child = doc.next_sibling(c);
    }
    None
}

pub fn previous_non_sep_sibling(doc: &Document, id: NodeId) -> Option<NodeId> {
    let mut prev = doc.prev_sibling(id);
    while let Some(p) = prev {
        if is_content_node(doc, p) {
            return Some(p);
        }
        prev = doc.prev_sibling(p);
    }
    None
}

pub fn next_non_sep_sibling(doc: &Document, id: NodeId) -> Option<NodeId> {
    let mut next = doc.next_sibling(id);
    while let Some(n) = next {
        if is_content_node(doc, n) {
            return Some(n);
        }
        next = doc.next_sibling(n);
    }
    None
}

/// Does `a` occur at or before `b` in the same sibling list?
pub fn in_sibling_order(doc: &Document, a: NodeId, b: NodeId) -> bool {
    let mut cur = Some(a);
    while let Some(n) = cur {
        if n == b {
            return true;
        }
        cur = doc.next_sibling(n);
    }
    false
}

/// Is `ancestor` an ancestor of (or equal to) `node`?
pub fn is_ancestor_of(doc: &Document, ancestor: NodeId, node: NodeId) -> bool {
    let mut cur = Some(node);
    while let Some(n) = cur {
        if n == ancestor {
            return true;
        }
        cur = doc.parent(n);
    }
    false
}

/// Path from `node` up to, but excluding, `ancestor`
pub fn path_to_ancestor(doc: &Document, node: NodeId, ancestor: Option<NodeId>) -> Vec<NodeId> {
    let mut path = Vec::new();
    let mut cur = Some(node);
    while let Some(n) = cur {
        if Some(n) == ancestor {
            break;
        }
        path.push(n);
        cur = doc.parent(n);
    }
    path
}

pub fn path_to_root(doc: &Document, node: NodeId) -> Vec<NodeId> {
    path_to_ancestor(doc, node, None)
}

/// Siblings from `node` towards `sibling` (exclusive), rightwards or leftwards
pub fn path_to_sibling(doc: &Document, node: NodeId, sibling: NodeId, left: bool) -> Vec<NodeId> {
    let mut path = Vec::new();
    let mut cur = Some(node);
    while let Some(n) = cur {
        if n == sibling {
            break;
        }
        path.push(n);
        cur = if left {
            doc.prev_sibling(n)
        } else {
            doc.next_sibling(n)
        };
    }
    path
}

/// Number of source newlines that an indent-pre text node swallowed.
///
/// Each line of an indent-pre starts with a space that is not in the DOM, so
/// dsr computation must correct for it. A trailing newline of the last child
/// does not start a new line of content and is not counted.
pub fn indent_pre_dsr_correction(doc: &Document, text: NodeId) -> usize {
    let Some(parent) = doc.parent(text) else {
        return 0;
    };
    if !is_indent_pre(doc, parent) || !is_text(doc, text) {
        return 0;
    }
    let value = doc.node(text).map(|n| n.value.as_str()).unwrap_or("");
    if doc.last_child(parent) == Some(text) {
        value
            .char_indices()
            .filter(|&(i, c)| c == '\n' && i + 1 < value.len())
            .count()
    } else {
        value.matches('\n').count()
    }
}
