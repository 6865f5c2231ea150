//! Source reuse decisions for selective serialization
//!
//! A serializer walking an edited document asks, node by node, whether the
//! original wikitext slice can be replayed. Only elements with a valid `dsr`
//! whose whole subtree is free of current diff marks, freshly inserted
//! elements and attributes edited since parsing qualify.

use crate::document::Document;
use crate::predicates::{is_diff_marker, is_elt, is_new_elt};
use crate::shadow::TplAttrs;
use crate::types::{NodeId, RevisionId};

pub use crate::shadow::modified_attributes;

/// Source slice covered by the node's `dsr`
pub fn wt_source<'s>(doc: &Document, node: NodeId, src: &'s str) -> Option<&'s str> {
    let dsr = doc.peek_data_parsoid(node)?.dsr?;
    dsr.source(src)
}

/// True when the node's original source can be replayed verbatim for
/// revision `rev`. `tpl_attrs` carries the pre-expansion source of
/// template-generated attributes, if any were collected.
pub fn can_reuse_source(
    doc: &mut Document,
    node: NodeId,
    rev: RevisionId,
    tpl_attrs: Option<&TplAttrs>,
) -> bool {
    if !is_elt(doc, node) || is_diff_marker(doc, node) {
        return false;
    }
    let has_range = doc
        .peek_data_parsoid(node)
        .and_then(|dp| dp.dsr)
        .is_some_and(|dsr| dsr.is_valid());
    if !has_range {
        return false;
    }
    for n in doc.descendants(node) {
        if !is_elt(doc, n) {
            continue;
        }
        if is_new_elt(doc, n) || is_diff_marker(doc, n) {
            tracing::debug!("[Selser] Node {} not reusable: edited content at {}", node, n);
            return false;
        }
        if crate::diff::has_current_diff_mark(doc, n, rev) {
            tracing::debug!("[Selser] Node {} not reusable: diff mark on {}", node, n);
            return false;
        }
        let modified = modified_attributes(doc, n, tpl_attrs);
        if !modified.is_empty() {
            tracing::debug!(
                "[Selser] Node {} not reusable: attributes {:?} of {} changed",
                node,
                modified,
                n
            );
            return false;
        }
    }
    true
}

/// Original source for `node` when it can be reused, otherwise `None`
pub fn reusable_source(
    doc: &mut Document,
    node: NodeId,
    rev: RevisionId,
    tpl_attrs: Option<&TplAttrs>,
    src: &str,
) -> Option<String> {
    if !can_reuse_source(doc, node, rev, tpl_attrs) {
        return None;
    }
    wt_source(doc, node, src).map(str::to_string)
}

/// Topmost reusable elements under `root`, in document order.
///
/// Once a node is reusable none of its descendants are listed, so the
/// result is the smallest set of slices covering every untouched subtree.
pub fn reuse_plan(
    doc: &mut Document,
    root: NodeId,
    rev: RevisionId,
    tpl_attrs: Option<&TplAttrs>,
) -> Vec<NodeId> {
    let mut plan = Vec::new();
    let mut stack: Vec<NodeId> = doc.children(root).into_iter().rev().collect();
    while let Some(n) = stack.pop() {
        if !is_elt(doc, n) {
            continue;
        }
        if can_reuse_source(doc, n, rev, tpl_attrs) {
            plan.push(n);
        } else {
            stack.extend(doc.children(n).into_iter().rev());
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::mark_node;
    use crate::shadow::attribute_shadow_info;
    use crate::types::{Attributes, DataParsoid, DiffChange, Dsr};

    const SRC: &str = "''a'' [[b]]\n* c";
    const REV: RevisionId = 7;

    fn parsed(doc: &mut Document, parent: NodeId, name: &str, dsr: Dsr) -> NodeId {
        let el = doc.create_element(name);
        doc.append_child(parent, el).unwrap();
        doc.set_data_parsoid(
            el,
            DataParsoid {
                dsr: Some(dsr),
                ..Default::default()
            },
        );
        el
    }

    fn page() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let body = doc.body();
        let p = parsed(&mut doc, body, "p", Dsr::new(0, 11));
        let i = parsed(&mut doc, p, "i", Dsr::with_widths(0, 5, 2, 2));
        let a = parsed(&mut doc, p, "a", Dsr::with_widths(6, 11, 2, 2));
        (doc, p, i, a)
    }

    #[test]
    fn test_wt_source() {
        let (doc, p, i, a) = page();
        assert_eq!(wt_source(&doc, p, SRC), Some("''a'' [[b]]"));
        assert_eq!(wt_source(&doc, i, SRC), Some("''a''"));
        assert_eq!(wt_source(&doc, a, SRC), Some("[[b]]"));
        assert_eq!(wt_source(&doc, a, "short"), None);
        assert_eq!(wt_source(&doc, doc.body(), SRC), None);
    }

    #[test]
    fn test_unedited_subtree_is_reused_whole() {
        let (mut doc, p, _, _) = page();
        let body = doc.body();
        assert!(can_reuse_source(&mut doc, p, REV, None));
        assert_eq!(reuse_plan(&mut doc, body, REV, None), vec![p]);
        assert_eq!(reusable_source(&mut doc, p, REV, None, SRC).as_deref(), Some("''a'' [[b]]"));
    }

    #[test]
    fn test_edit_limits_reuse_to_siblings() {
        let (mut doc, p, i, a) = page();
        let body = doc.body();
        mark_node(&mut doc, a, REV, DiffChange::Modified).unwrap();
        assert!(!can_reuse_source(&mut doc, p, REV, None));
        assert!(!can_reuse_source(&mut doc, a, REV, None));
        assert_eq!(reuse_plan(&mut doc, body, REV, None), vec![i]);
        assert_eq!(reusable_source(&mut doc, a, REV, None, SRC), None);
    }

    #[test]
    fn test_stale_marks_do_not_block_reuse() {
        let (mut doc, p, _, a) = page();
        mark_node(&mut doc, a, REV - 1, DiffChange::Modified).unwrap();
        assert!(can_reuse_source(&mut doc, p, REV, None));
    }

    #[test]
    fn test_inserted_element_blocks_reuse() {
        let (mut doc, p, i, _) = page();
        let b = doc.create_element("b");
        doc.append_child(i, b).unwrap();
        assert!(!can_reuse_source(&mut doc, p, REV, None));
        assert!(!can_reuse_source(&mut doc, b, REV, None));
    }

    #[test]
    fn test_edited_attribute_blocks_reuse() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = parsed(&mut doc, body, "p", Dsr::new(0, 11));
        let attrs: Attributes = [
            ("href", "./A"),
            ("data-parsoid", r#"{"dsr":[6,11,2,2],"a":{"href":"./A"}}"#),
        ]
        .into_iter()
        .collect();
        let link = doc.create_element_with("a", attrs);
        doc.append_child(p, link).unwrap();
        assert!(can_reuse_source(&mut doc, link, REV, None));

        doc.set_attr(link, "href", "./B").unwrap();
        assert!(attribute_shadow_info(&doc, link, "href", None).modified);
        assert!(!can_reuse_source(&mut doc, link, REV, None));
        assert!(!can_reuse_source(&mut doc, p, REV, None));
        assert!(reuse_plan(&mut doc, body, REV, None).is_empty());
    }
}
