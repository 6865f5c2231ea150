//! Diff marks: which edits touched a node since a reference revision
//!
//! Every operation takes the reference revision explicitly. A mark
//! recorded against another revision is treated as absent and is
//! replaced, never merged, on the next write.

use crate::document::Document;
use crate::encapsulation::prepend_typed_meta;
use crate::error::{DomError, Result};
use crate::types::{DiffChange, DiffMark, MwType, NodeId, RevisionId, TypeTag};

/// Record `change` on an element. Non-elements carry no marks.
pub fn set_diff_mark(doc: &mut Document, node: NodeId, rev: RevisionId, change: DiffChange) {
    let Some(mark) = doc.diff_mark_entry(node) else {
        return;
    };
    if mark.id != rev || mark.is_empty() {
        *mark = DiffMark::new(rev, change);
    } else if !mark.contains(&change) {
        mark.changes.push(change);
    }
}

/// The node's mark if it was recorded against `rev`
pub fn current_diff_mark(doc: &mut Document, node: NodeId, rev: RevisionId) -> Option<&DiffMark> {
    let mark = doc.diff_mark_entry(node)?;
    if mark.id == rev && !mark.is_empty() {
        Some(mark)
    } else {
        None
    }
}

pub fn has_current_diff_mark(doc: &mut Document, node: NodeId, rev: RevisionId) -> bool {
    current_diff_mark(doc, node, rev).is_some()
}

/// Only descendants changed; the node and its child list are untouched
pub fn only_subtree_changed(doc: &mut Document, node: NodeId, rev: RevisionId) -> bool {
    current_diff_mark(doc, node, rev)
        .is_some_and(|m| m.changes.as_slice() == [DiffChange::SubtreeChanged])
}

pub fn direct_children_changed(doc: &mut Document, node: NodeId, rev: RevisionId) -> bool {
    current_diff_mark(doc, node, rev).is_some_and(|m| m.contains(&DiffChange::ChildrenChanged))
}

pub fn has_inserted_or_modified_diff_mark(doc: &mut Document, node: NodeId, rev: RevisionId) -> bool {
    current_diff_mark(doc, node, rev)
        .is_some_and(|m| m.contains(&DiffChange::Inserted) || m.contains(&DiffChange::Modified))
}

fn mark_ancestors(doc: &mut Document, from: Option<NodeId>, rev: RevisionId) {
    let body = doc.body();
    let mut cur = from;
    while let Some(n) = cur {
        if n == body {
            break;
        }
        let already = current_diff_mark(doc, n, rev)
            .is_some_and(|m| m.contains(&DiffChange::SubtreeChanged));
        if already {
            break;
        }
        set_diff_mark(doc, n, rev, DiffChange::SubtreeChanged);
        cur = doc.parent(n);
    }
}

/// Mark an edited node and propagate to its ancestors.
///
/// The parent's child list changed for insertions and deletions, and for
/// any edit to a text or comment node. Every ancestor below `<body>` is
/// marked `subtree-changed`.
pub fn mark_node(doc: &mut Document, node: NodeId, rev: RevisionId, change: DiffChange) -> Result<()> {
    let is_element = doc.get(node)?.is_element();
    let parent = doc.parent(node);
    if is_element {
        set_diff_mark(doc, node, rev, change.clone());
    }
    let structural = matches!(change, DiffChange::Inserted | DiffChange::Deleted);
    if let Some(p) = parent {
        if structural || !is_element {
            set_diff_mark(doc, p, rev, DiffChange::ChildrenChanged);
        }
    }
    tracing::debug!("[DiffMarker] Marked node {} as {:?} against revision {}", node, change, rev);
    mark_ancestors(doc, parent, rev);
    Ok(())
}

/// Insert an `mw:DiffMarker/deleted` meta where removed content used to be.
///
/// `before` is the node that followed the deleted content, `None` when it
/// was the last child of `parent`.
pub fn mark_deleted_before(
    doc: &mut Document,
    parent: NodeId,
    before: Option<NodeId>,
    rev: RevisionId,
) -> Result<NodeId> {
    let tag = TypeTag::mw_sub(MwType::DiffMarker, "deleted");
    let meta = match before {
        Some(node) => {
            if doc.parent(node) != Some(parent) {
                return Err(DomError::HierarchyRequest { parent, child: node });
            }
            prepend_typed_meta(doc, node, tag)?
        }
        None => {
            let meta = doc.create_element("meta");
            doc.set_attr(meta, "typeof", &tag.to_string())?;
            doc.append_child(parent, meta)?;
            meta
        }
    };
    set_diff_mark(doc, parent, rev, DiffChange::ChildrenChanged);
    let grandparent = doc.parent(parent);
    mark_ancestors(doc, grandparent, rev);
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicates::is_diff_marker;
    use serde_json::json;

    fn nested() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let body = doc.body();
        let div = doc.create_element("div");
        let p = doc.create_element("p");
        let b = doc.create_element("b");
        doc.append_child(body, div).unwrap();
        doc.append_child(div, p).unwrap();
        doc.append_child(p, b).unwrap();
        (doc, div, p, b)
    }

    #[test]
    fn test_stale_mark_is_ignored_and_replaced() {
        let (mut doc, _, p, _) = nested();
        set_diff_mark(&mut doc, p, 1, DiffChange::Modified);
        assert!(has_current_diff_mark(&mut doc, p, 1));
        assert!(!has_current_diff_mark(&mut doc, p, 2));

        set_diff_mark(&mut doc, p, 2, DiffChange::Inserted);
        let mark = current_diff_mark(&mut doc, p, 2).unwrap();
        assert_eq!(mark.changes.as_slice(), [DiffChange::Inserted]);
        assert!(current_diff_mark(&mut doc, p, 1).is_none());
    }

    #[test]
    fn test_stale_mark_from_attribute() {
        let (mut doc, _, p, _) = nested();
        doc.set_attr(p, "data-parsoid-diff", r#"{"id":1,"diff":["modified"]}"#)
            .unwrap();
        assert!(has_inserted_or_modified_diff_mark(&mut doc, p, 1));
        assert!(!has_inserted_or_modified_diff_mark(&mut doc, p, 7));
    }

    #[test]
    fn test_duplicate_kinds_are_collapsed() {
        let (mut doc, _, p, _) = nested();
        set_diff_mark(&mut doc, p, 3, DiffChange::Modified);
        set_diff_mark(&mut doc, p, 3, DiffChange::Modified);
        set_diff_mark(&mut doc, p, 3, DiffChange::ChildrenChanged);
        let mark = current_diff_mark(&mut doc, p, 3).unwrap();
        assert_eq!(
            mark.changes.as_slice(),
            [DiffChange::Modified, DiffChange::ChildrenChanged]
        );
    }

    #[test]
    fn test_derived_queries() {
        let (mut doc, div, p, b) = nested();
        mark_node(&mut doc, b, 5, DiffChange::Inserted).unwrap();

        assert!(has_inserted_or_modified_diff_mark(&mut doc, b, 5));
        assert!(direct_children_changed(&mut doc, p, 5));
        assert!(!only_subtree_changed(&mut doc, p, 5));
        assert!(only_subtree_changed(&mut doc, div, 5));
        let body = doc.body();
        assert!(!has_current_diff_mark(&mut doc, body, 5));
    }

    #[test]
    fn test_text_edit_marks_parent() {
        let (mut doc, _, p, b) = nested();
        let t = doc.create_text("x");
        doc.append_child(b, t).unwrap();
        mark_node(&mut doc, t, 1, DiffChange::Modified).unwrap();
        assert!(direct_children_changed(&mut doc, b, 1));
        assert!(only_subtree_changed(&mut doc, p, 1));
    }

    #[test]
    fn test_mark_deleted_before() {
        let (mut doc, div, p, b) = nested();
        let meta = mark_deleted_before(&mut doc, p, Some(b), 9).unwrap();
        assert!(is_diff_marker(&doc, meta));
        assert_eq!(doc.children(p), vec![meta, b]);
        assert!(direct_children_changed(&mut doc, p, 9));
        assert!(only_subtree_changed(&mut doc, div, 9));

        let tail = mark_deleted_before(&mut doc, div, None, 9).unwrap();
        assert_eq!(doc.last_child(div), Some(tail));
        assert!(mark_deleted_before(&mut doc, div, Some(b), 9).is_err());
    }

    #[test]
    fn test_mark_survives_save() {
        let (mut doc, _, p, _) = nested();
        set_diff_mark(&mut doc, p, 42, DiffChange::DeletedChild);
        doc.save_data_attribs(p).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(doc.attr(p, "data-parsoid-diff").unwrap()).unwrap();
        assert_eq!(raw, json!({"id": 42, "diff": ["deleted-child"]}));
    }

    #[test]
    fn test_unknown_kind_round_trips() {
        let (mut doc, _, p, _) = nested();
        doc.set_attr(p, "data-parsoid-diff", r#"{"id":5,"diff":["modified","moved"]}"#)
            .unwrap();
        let mark = current_diff_mark(&mut doc, p, 5).unwrap();
        assert_eq!(
            mark.changes.as_slice(),
            [DiffChange::Modified, DiffChange::Other("moved".into())]
        );
        assert!(has_inserted_or_modified_diff_mark(&mut doc, p, 5));
        assert!(doc.diagnostics().is_empty());

        doc.save_data_attribs(p).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(doc.attr(p, "data-parsoid-diff").unwrap()).unwrap();
        assert_eq!(raw, json!({"id": 5, "diff": ["modified", "moved"]}));
    }
}
