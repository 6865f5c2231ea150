//! Arena-backed mutable document
//!
//! Nodes live in a single `Vec<Node>` and refer to each other by `NodeId`.
//! Unlike a read-only snapshot, every node keeps live parent/child/sibling
//! links so that passes can splice the tree while it is being walked.
//!
//! ```text
//! Arena: Vec<Node>
//!        [#document][body][p][#text]...
//!                     ↑ links are 4-byte indices, never pointers
//! ```
//!
//! Removing a node only unlinks it; its arena slot stays allocated until the
//! document is dropped.

use crate::error::{DomError, Result};
use crate::types::{Attributes, Node, NodeData, NodeId, NodeKind, TypeOf, TypeTag};
use ahash::AHashMap;

/// A diagnostic recorded while processing a document.
///
/// Recoverable problems (corrupt provenance, invalid extension content,
/// encapsulation violations) end up here instead of failing the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Log channel, e.g. `error/html2wt/nowiki`
    pub channel: String,
    pub message: String,
    pub node: Option<NodeId>,
}

/// An HTML document with sidecar metadata
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    /// Counter behind `#mwt<N>` about ids
    next_about: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Document {
    /// Create an empty document: `#document > body`
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.max(2));
        nodes.push(Node::new(0, NodeKind::Document, NodeKind::Document.node_name()));
        nodes.push(Node::new(1, NodeKind::Element, "body"));
        let mut doc = Self {
            nodes,
            root: 0,
            body: 1,
            next_about: 0,
            diagnostics: Vec::new(),
        };
        doc.link_last(0, 1);
        doc
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Total number of allocated nodes, attached or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id as usize)
            .ok_or(DomError::NodeNotFound(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id as usize)
            .ok_or(DomError::NodeNotFound(id))
    }

    /// Lenient lookup used by predicates, which must never fail
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| i as NodeId)
    }

    fn alloc(&mut self, kind: NodeKind, name: &str) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node::new(id, kind, name));
        id
    }

    /// Create a detached element. Tag names are lowercased.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Element, &name.to_ascii_lowercase())
    }

    pub fn create_element_with(&mut self, name: &str, attributes: Attributes) -> NodeId {
        let id = self.create_element(name);
        if let Some(about) = attributes.get("about") {
            self.reserve_about_id(about);
        }
        self.nodes[id as usize].attributes = attributes;
        id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        let id = self.alloc(NodeKind::Text, NodeKind::Text.node_name());
        self.nodes[id as usize].value = text.to_string();
        id
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        let id = self.alloc(NodeKind::Comment, NodeKind::Comment.node_name());
        self.nodes[id as usize].value = text.to_string();
        id
    }

    // ---- navigation -------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.first_child)
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.last_child)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.next_sibling)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.prev_sibling)
    }

    /// Snapshot of the current children of a node
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut child = self.first_child(id);
        while let Some(c) = child {
            out.push(c);
            child = self.next_sibling(c);
        }
        out
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut child = self.first_child(id);
        while let Some(c) = child {
            count += 1;
            child = self.next_sibling(c);
        }
        count
    }

    /// True when the node hangs off the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == self.root {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Traverse a subtree depth-first (iterative, no recursion)
    pub fn traverse_df<F>(&self, start: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&Node) -> Result<()>,
    {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = self.get(id)?;
            visit(node)?;
            // Push children in reverse so they pop left-to-right
            let mut child = node.last_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.get(c)?.prev_sibling;
            }
        }
        Ok(())
    }

    /// Pre-order list of a subtree, including `start`
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        // Nodes in the arena always resolve, so the visitor cannot fail here
        let _ = self.traverse_df(start, |n| {
            out.push(n.id);
            Ok(())
        });
        out
    }

    /// Find attached nodes matching a predicate, in document order
    pub fn find<F>(&self, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| self.node(id).is_some_and(&predicate))
            .collect()
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.find(|n| n.is_element() && n.name.eq_ignore_ascii_case(tag))
    }

    /// Map of `about` id to the attached elements carrying it
    pub fn about_index(&self) -> AHashMap<String, Vec<NodeId>> {
        let mut index: AHashMap<String, Vec<NodeId>> = AHashMap::new();
        for id in self.descendants(self.root) {
            if let Some(about) = self.node(id).and_then(|n| n.attr("about")) {
                index.entry(about.to_string()).or_default().push(id);
            }
        }
        index
    }

    // ---- attributes -------------------------------------------------------

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id).and_then(|n| n.attr(name))
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let node = self.get_mut(id)?;
        if !node.is_element() {
            return Err(DomError::InvalidNodeType {
                expected: "element".into(),
                actual: node.name.clone(),
            });
        }
        node.attributes.set(name, value);
        if name == "about" {
            self.reserve_about_id(value);
        }
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.nodes
            .get_mut(id as usize)
            .and_then(|n| n.attributes.remove(name))
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        let node = self.get_mut(id)?;
        if node.is_element() || node.kind == NodeKind::Document {
            return Err(DomError::InvalidNodeType {
                expected: "text or comment".into(),
                actual: node.name.clone(),
            });
        }
        node.value = text.to_string();
        Ok(())
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        let mut text = String::new();
        let _ = self.traverse_df(id, |n| {
            if n.is_text() {
                text.push_str(&n.value);
            }
            Ok(())
        });
        text
    }

    /// Add a `typeof` tag, keeping existing ones
    pub fn add_type_of(&mut self, id: NodeId, tag: TypeTag) -> Result<()> {
        let mut types = self.get(id)?.type_of();
        types.add(tag);
        self.set_attr(id, "typeof", &types.to_string())
    }

    /// Remove a `typeof` tag, dropping the attribute when it empties
    pub fn remove_type_of(&mut self, id: NodeId, tag: &TypeTag) -> Result<()> {
        let mut types: TypeOf = self.get(id)?.type_of();
        types.remove(tag);
        if types.is_empty() {
            self.remove_attr(id, "typeof");
            Ok(())
        } else {
            self.set_attr(id, "typeof", &types.to_string())
        }
    }

    // ---- mutation ---------------------------------------------------------

    fn can_have_children(&self, id: NodeId) -> bool {
        matches!(
            self.node(id).map(|n| n.kind),
            Some(NodeKind::Element) | Some(NodeKind::Document)
        )
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.get(parent)?;
        self.get(child)?;
        // A node may not be inserted into itself or its own subtree
        let mut cur = Some(parent);
        while let Some(n) = cur {
            if n == child {
                return Err(DomError::HierarchyRequest { parent, child });
            }
            cur = self.parent(n);
        }
        if !self.can_have_children(parent) || child == self.root {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        Ok(())
    }

    fn link_last(&mut self, parent: NodeId, child: NodeId) {
        let prev = self.nodes[parent as usize].last_child;
        {
            let c = &mut self.nodes[child as usize];
            c.parent = Some(parent);
            c.prev_sibling = prev;
            c.next_sibling = None;
        }
        match prev {
            Some(p) => self.nodes[p as usize].next_sibling = Some(child),
            None => self.nodes[parent as usize].first_child = Some(child),
        }
        self.nodes[parent as usize].last_child = Some(child);
    }

    /// Unlink a node from its parent and siblings. The subtree stays intact.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let (parent, prev, next) = {
            let n = self.get(id)?;
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        let Some(parent) = parent else {
            return Ok(());
        };
        match prev {
            Some(p) => self.nodes[p as usize].next_sibling = next,
            None => self.nodes[parent as usize].first_child = next,
        }
        match next {
            Some(n) => self.nodes[n as usize].prev_sibling = prev,
            None => self.nodes[parent as usize].last_child = prev,
        }
        let n = &mut self.nodes[id as usize];
        n.parent = None;
        n.prev_sibling = None;
        n.next_sibling = None;
        Ok(())
    }

    /// Alias of [`Document::detach`]
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        self.detach(id)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_insert(parent, child)?;
        self.detach(child)?;
        self.link_last(parent, child);
        Ok(())
    }

    /// Insert `child` before `reference` (or at the end when `None`)
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        let Some(reference) = reference else {
            return self.append_child(parent, child);
        };
        if reference == child {
            return Ok(());
        }
        self.check_insert(parent, child)?;
        if self.parent(reference) != Some(parent) {
            return Err(DomError::HierarchyRequest {
                parent,
                child: reference,
            });
        }
        self.detach(child)?;
        let prev = self.nodes[reference as usize].prev_sibling;
        {
            let c = &mut self.nodes[child as usize];
            c.parent = Some(parent);
            c.prev_sibling = prev;
            c.next_sibling = Some(reference);
        }
        self.nodes[reference as usize].prev_sibling = Some(child);
        match prev {
            Some(p) => self.nodes[p as usize].next_sibling = Some(child),
            None => self.nodes[parent as usize].first_child = Some(child),
        }
        Ok(())
    }

    pub fn insert_after(&mut self, node: NodeId, new: NodeId) -> Result<()> {
        let parent = self.parent(node).ok_or(DomError::HierarchyRequest {
            parent: node,
            child: new,
        })?;
        let next = self.next_sibling(node);
        self.insert_before(parent, new, next)
    }

    /// Put `new` where `old` is and detach `old`
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        let parent = self.parent(old).ok_or(DomError::HierarchyRequest {
            parent: old,
            child: new,
        })?;
        self.insert_before(parent, new, Some(old))?;
        self.detach(old)
    }

    /// Move all children of `from` to the end of `to`
    pub fn migrate_children(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let mut child = self.first_child(from);
        while let Some(c) = child {
            let next = self.next_sibling(c);
            self.append_child(to, c)?;
            child = next;
        }
        Ok(())
    }

    /// Merge adjacent text nodes and drop empty ones in a subtree
    pub fn normalize(&mut self, id: NodeId) -> Result<()> {
        for node in self.descendants(id) {
            let mut child = self.first_child(node);
            while let Some(c) = child {
                let next = self.next_sibling(c);
                if self.get(c)?.is_text() {
                    if self.get(c)?.value.is_empty() {
                        self.detach(c)?;
                        child = next;
                        continue;
                    }
                    let mut merge = next;
                    while let Some(m) = merge {
                        if !self.get(m)?.is_text() {
                            break;
                        }
                        let after = self.next_sibling(m);
                        let text = std::mem::take(&mut self.get_mut(m)?.value);
                        self.get_mut(c)?.value.push_str(&text);
                        self.detach(m)?;
                        merge = after;
                    }
                    child = merge;
                } else {
                    child = next;
                }
            }
        }
        Ok(())
    }

    /// Deep-copy a subtree from another document, returning the detached copy
    pub fn import_subtree(&mut self, other: &Document, id: NodeId) -> Result<NodeId> {
        let src = other.get(id)?;
        let copy = match src.kind {
            NodeKind::Element => {
                let c = self.create_element_with(&src.name, src.attributes.clone());
                self.nodes[c as usize].data = src.data.clone();
                c
            }
            NodeKind::Text => self.create_text(&src.value),
            NodeKind::Comment => self.create_comment(&src.value),
            NodeKind::Document => {
                return Err(DomError::InvalidNodeType {
                    expected: "element, text or comment".into(),
                    actual: src.name.clone(),
                })
            }
        };
        // Explicit work-list keeps deep fragments off the call stack
        let mut work = vec![(id, copy)];
        while let Some((src_parent, dst_parent)) = work.pop() {
            for src_child in other.children(src_parent) {
                let n = other.get(src_child)?;
                let dst_child = match n.kind {
                    NodeKind::Element => {
                        let c = self.create_element_with(&n.name, n.attributes.clone());
                        self.nodes[c as usize].data = n.data.clone();
                        work.push((src_child, c));
                        c
                    }
                    NodeKind::Text => self.create_text(&n.value),
                    _ => self.create_comment(&n.value),
                };
                self.link_last(dst_parent, dst_child);
            }
        }
        Ok(copy)
    }

    // ---- about ids & diagnostics ------------------------------------------

    /// Fresh encapsulation id of the form `#mwt<N>`
    pub fn new_about_id(&mut self) -> String {
        let id = format!("#mwt{}", self.next_about);
        self.next_about += 1;
        id
    }

    /// Keep [`Document::new_about_id`] clear of an id already in the tree
    fn reserve_about_id(&mut self, about: &str) {
        if !is_parsoid_object_id(about) {
            return;
        }
        if let Ok(n) = about["#mwt".len()..].parse::<u32>() {
            self.next_about = self.next_about.max(n.saturating_add(1));
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn push_diagnostic(&mut self, channel: &str, message: impl Into<String>, node: Option<NodeId>) {
        self.diagnostics.push(Diagnostic {
            channel: channel.to_string(),
            message: message.into(),
            node,
        });
    }

    pub(crate) fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.node(id).and_then(|n| n.data.as_deref())
    }

    /// Sidecar record of an element, created on first use
    pub(crate) fn data_entry(&mut self, id: NodeId) -> Option<&mut NodeData> {
        let node = self.nodes.get_mut(id as usize)?;
        if !node.is_element() {
            return None;
        }
        let data = node.data.get_or_insert_with(Default::default);
        Some(&mut **data)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// True for ids minted by [`Document::new_about_id`]
pub fn is_parsoid_object_id(about: &str) -> bool {
    about
        .strip_prefix("#mwt")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(doc: &Document, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|&id| {
                let n = doc.get(id).unwrap();
                if n.is_text() {
                    n.value.clone()
                } else {
                    n.name.clone()
                }
            })
            .collect()
    }

    #[test]
    fn test_new_document_shape() {
        let doc = Document::new();
        assert_eq!(doc.get(doc.root_id()).unwrap().kind, NodeKind::Document);
        assert_eq!(doc.first_child(doc.root_id()), Some(doc.body()));
        assert_eq!(doc.get(doc.body()).unwrap().name, "body");
    }

    #[test]
    fn test_append_insert_detach() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = doc.create_element("P");
        let b = doc.create_text("b");
        let c = doc.create_comment("c");
        doc.append_child(body, a).unwrap();
        doc.append_child(body, c).unwrap();
        doc.insert_before(body, b, Some(c)).unwrap();
        assert_eq!(names(&doc, &doc.children(body)), vec!["p", "b", "#comment"]);

        doc.detach(b).unwrap();
        assert_eq!(doc.children(body), vec![a, c]);
        assert_eq!(doc.next_sibling(a), Some(c));
        assert_eq!(doc.prev_sibling(c), Some(a));
        assert_eq!(doc.parent(b), None);

        doc.insert_after(a, b).unwrap();
        assert_eq!(doc.children(body), vec![a, b, c]);
        assert_eq!(doc.last_child(body), Some(c));
    }

    #[test]
    fn test_hierarchy_errors() {
        let mut doc = Document::new();
        let body = doc.body();
        let div = doc.create_element("div");
        let text = doc.create_text("x");
        doc.append_child(body, div).unwrap();
        assert!(matches!(
            doc.append_child(div, body),
            Err(DomError::HierarchyRequest { .. })
        ));
        assert!(doc.append_child(text, div).is_err());
        assert!(matches!(doc.get(999), Err(DomError::NodeNotFound(999))));
    }

    #[test]
    fn test_normalize_merges_text() {
        let mut doc = Document::new();
        let body = doc.body();
        for t in ["a", "", "b"] {
            let n = doc.create_text(t);
            doc.append_child(body, n).unwrap();
        }
        let span = doc.create_element("span");
        doc.append_child(body, span).unwrap();
        let tail = doc.create_text("c");
        doc.append_child(body, tail).unwrap();

        doc.normalize(body).unwrap();
        assert_eq!(names(&doc, &doc.children(body)), vec!["ab", "span", "c"]);
    }

    #[test]
    fn test_traverse_df_order() {
        let mut doc = Document::new();
        let body = doc.body();
        let div = doc.create_element("div");
        let span1 = doc.create_element("span");
        let span2 = doc.create_element("span");
        doc.append_child(body, div).unwrap();
        doc.append_child(div, span1).unwrap();
        doc.append_child(body, span2).unwrap();

        let mut visited = Vec::new();
        doc.traverse_df(body, |n| {
            visited.push(n.name.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(visited, vec!["body", "div", "span", "span"]);
    }

    #[test]
    fn test_typeof_helpers_and_about_ids() {
        let mut doc = Document::new();
        let span = doc.create_element("span");
        doc.add_type_of(span, TypeTag::parse("mw:Entity")).unwrap();
        doc.add_type_of(span, TypeTag::parse("mw:Entity")).unwrap();
        doc.add_type_of(span, TypeTag::parse("foo")).unwrap();
        assert_eq!(doc.attr(span, "typeof"), Some("mw:Entity foo"));
        doc.remove_type_of(span, &TypeTag::parse("mw:Entity")).unwrap();
        assert_eq!(doc.attr(span, "typeof"), Some("foo"));
        doc.remove_type_of(span, &TypeTag::parse("foo")).unwrap();
        assert!(!doc.has_attr(span, "typeof"));

        assert_eq!(doc.new_about_id(), "#mwt0");
        assert_eq!(doc.new_about_id(), "#mwt1");
        doc.set_attr(span, "about", "#mwt7").unwrap();
        doc.set_attr(span, "about", "#mwt3").unwrap();
        doc.set_attr(span, "about", "tpl").unwrap();
        assert_eq!(doc.new_about_id(), "#mwt8");
        assert!(is_parsoid_object_id("#mwt12"));
        assert!(!is_parsoid_object_id("#mwt"));
        assert!(!is_parsoid_object_id("mwt1"));
    }

    #[test]
    fn test_import_subtree_copies_deeply() {
        let mut frag = Document::new();
        let span = frag.create_element("span");
        let text = frag.create_text("hi");
        frag.append_child(frag.body(), span).unwrap();
        frag.append_child(span, text).unwrap();

        let mut doc = Document::new();
        let copy = doc.import_subtree(&frag, span).unwrap();
        doc.append_child(doc.body(), copy).unwrap();
        assert_eq!(doc.text_content(doc.body()), "hi");
        assert!(doc.import_subtree(&frag, frag.root_id()).is_err());
    }
}
