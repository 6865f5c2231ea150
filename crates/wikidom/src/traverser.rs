//! Generic tree traverser
//!
//! Pre-order walk with registered handlers. Handlers may rewrite the tree
//! while it is being walked, so the traverser never snapshots a node list:
//! after every handler call the next node is read from the live links.
//!
//! ```text
//! visit(n) ── handlers ──┬─ Continue      → first_child(n), else next_sibling(n)
//!                        └─ ResumeAt(x)   → x (None ends this sibling chain)
//! ```
//!
//! Descent uses an explicit stack of ancestors instead of recursion, so
//! arbitrarily deep documents do not grow the call stack.

use crate::document::Document;
use crate::encapsulation;
use crate::error::{DomError, Result};
use crate::types::{Node, NodeId, NodeKind};

/// Which nodes a handler is registered for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeMatch {
    Any,
    /// Elements with this tag name (case-insensitive)
    Element(String),
    Text,
    Comment,
}

impl NodeMatch {
    pub fn element(name: &str) -> Self {
        NodeMatch::Element(name.to_ascii_lowercase())
    }

    pub fn matches(&self, node: &Node) -> bool {
        match self {
            NodeMatch::Any => true,
            NodeMatch::Element(name) => node.is_element() && node.name.eq_ignore_ascii_case(name),
            NodeMatch::Text => node.kind == NodeKind::Text,
            NodeMatch::Comment => node.kind == NodeKind::Comment,
        }
    }
}

/// What the traverser does after a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run the remaining handlers, then descend into the children
    Continue,
    /// Stop handling this node and resume at the given node
    ResumeAt(Option<NodeId>),
}

/// First and last node of the encapsulated group being walked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TplInfo {
    pub first: NodeId,
    pub last: NodeId,
}

/// Position information handed to handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Walk {
    /// 0 for the start node, 1 for its children, ...
    pub depth: usize,
    /// True for direct children of the start node
    pub at_top_level: bool,
    pub tpl_info: Option<TplInfo>,
}

type Handler<'h> = Box<dyn FnMut(&mut Document, NodeId, &Walk) -> Result<Action> + 'h>;

struct Frame {
    node: NodeId,
    tpl: Option<TplInfo>,
}

/// Handler registry plus the walk loop
pub struct DomTraverser<'h> {
    handlers: Vec<(NodeMatch, Handler<'h>)>,
    track_tpl_info: bool,
}

impl<'h> DomTraverser<'h> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            track_tpl_info: false,
        }
    }

    /// Report encapsulated groups to handlers through [`Walk::tpl_info`]
    pub fn with_tpl_info(mut self) -> Self {
        self.track_tpl_info = true;
        self
    }

    /// Register a handler. Handlers run in registration order.
    pub fn add_handler<F>(&mut self, matcher: NodeMatch, handler: F)
    where
        F: FnMut(&mut Document, NodeId, &Walk) -> Result<Action> + 'h,
    {
        self.handlers.push((matcher, Box::new(handler)));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn call_handlers(&mut self, doc: &mut Document, node: NodeId, walk: &Walk) -> Result<Action> {
        let attached = doc.parent(node).is_some();
        for (matcher, handler) in self.handlers.iter_mut() {
            if !matcher.matches(doc.get(node)?) {
                continue;
            }
            match handler(doc, node, walk) {
                Ok(Action::Continue) => {
                    if attached && doc.parent(node).is_none() {
                        tracing::error!(
                            "[Traverser] Node {} was detached by a handler that asked to continue",
                            node
                        );
                        return Err(DomError::TraversalPosition(node));
                    }
                }
                Ok(resume) => return Ok(resume),
                Err(e) => {
                    tracing::error!("[Traverser] Handler failed on node {}: {}", node, e);
                    return Err(DomError::Handler {
                        node,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(Action::Continue)
    }

    fn group_start(doc: &Document, node: NodeId) -> Option<TplInfo> {
        if !encapsulation::is_first_encapsulation_wrapper(doc, node) {
            return None;
        }
        let group = encapsulation::group_siblings(doc, node);
        let last = *group.last()?;
        Some(TplInfo { first: node, last })
    }

    /// Walk the subtree rooted at `start`.
    ///
    /// Siblings of `start` are not visited unless a handler on the start
    /// node explicitly resumes at one.
    pub fn traverse(&mut self, doc: &mut Document, start: NodeId) -> Result<()> {
        doc.get(start)?;
        let mut stack: Vec<Frame> = Vec::new();
        let mut tpl: Option<TplInfo> = None;
        let mut work = Some(start);

        loop {
            let node = match work {
                Some(n) => n,
                None => {
                    let Some(frame) = stack.pop() else {
                        break;
                    };
                    tpl = frame.tpl;
                    if tpl.is_some_and(|t| t.last == frame.node) {
                        tpl = None;
                    }
                    if stack.is_empty() {
                        // The start node's subtree is done
                        break;
                    }
                    work = doc.next_sibling(frame.node);
                    continue;
                }
            };

            if self.track_tpl_info && tpl.is_none() {
                tpl = Self::group_start(doc, node);
            }
            let walk = Walk {
                depth: stack.len(),
                at_top_level: stack.len() == 1,
                tpl_info: tpl,
            };

            let action = self.call_handlers(doc, node, &walk)?;
            let ends_group = tpl.is_some_and(|t| t.last == node);
            match action {
                Action::ResumeAt(next) => {
                    if ends_group {
                        tpl = None;
                    }
                    work = next;
                }
                Action::Continue => {
                    let first = doc.first_child(node);
                    if let Some(first) = first {
                        stack.push(Frame { node, tpl });
                        work = Some(first);
                    } else {
                        if ends_group {
                            tpl = None;
                        }
                        work = if stack.is_empty() {
                            None
                        } else {
                            doc.next_sibling(node)
                        };
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for DomTraverser<'_> {
    fn default() -> Self {
        Self::new()
    }
}
