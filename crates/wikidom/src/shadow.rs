//! Attribute shadow resolver
//!
//! Decides per attribute whether the serializer may replay the original
//! source text. The judgment is computed from the current attribute value
//! and the `a`/`sa` provenance maps every time it is asked for.

use crate::document::Document;
use crate::types::{MwType, NodeId};
use ahash::AHashMap;

/// Pre-expansion source of template-generated attributes of one group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedAttrsState {
    /// Attribute name → original source text
    pub vs: AHashMap<String, String>,
}

/// Expanded attribute state of all groups, keyed by `about` id
pub type TplAttrs = AHashMap<String, ExpandedAttrsState>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeShadowInfo {
    pub value: Option<String>,
    /// The value no longer matches what was parsed
    pub modified: bool,
    /// `value` is original source text rather than the DOM value
    pub from_source: bool,
}

impl AttributeShadowInfo {
    fn current(value: Option<String>, modified: bool) -> Self {
        Self {
            value,
            modified,
            from_source: false,
        }
    }

    fn source(value: String) -> Self {
        Self {
            value: Some(value),
            modified: false,
            from_source: true,
        }
    }
}

fn expanded_attr_source(
    doc: &Document,
    node: NodeId,
    name: &str,
    tpl_attrs: Option<&TplAttrs>,
) -> Option<String> {
    let tpl_attrs = tpl_attrs?;
    let n = doc.node(node)?;
    let expanded = n
        .type_of()
        .find(MwType::ExpandedAttrs)
        .is_some_and(|t| t.sub().is_some());
    if !expanded {
        return None;
    }
    let about = n.attr("about").unwrap_or("");
    tpl_attrs.get(about)?.vs.get(name).cloned()
}

/// Shadow judgment for attribute `name` of `node`.
///
/// Precedence: template-expanded source, missing `a` map, changed value,
/// missing `sa` entry, shadowed source text.
pub fn attribute_shadow_info(
    doc: &Document,
    node: NodeId,
    name: &str,
    tpl_attrs: Option<&TplAttrs>,
) -> AttributeShadowInfo {
    let current = doc.attr(node, name).map(str::to_string);
    let Some(dp) = doc.peek_data_parsoid(node) else {
        return AttributeShadowInfo::current(current, false);
    };

    if let Some(src) = expanded_attr_source(doc, node, name, tpl_attrs) {
        return AttributeShadowInfo::source(src);
    }

    let Some(a) = &dp.a else {
        // Elements without provenance were inserted by an editor
        return AttributeShadowInfo::current(current, !doc.has_provenance(node));
    };
    let parsed = a.get(name).cloned().flatten();
    if parsed != current {
        return AttributeShadowInfo::current(current, true);
    }
    match dp.sa.as_ref().and_then(|sa| sa.get(name).cloned().flatten()) {
        Some(src) => AttributeShadowInfo::source(src),
        None => AttributeShadowInfo::current(current, false),
    }
}

/// Names of attributes whose shadow judgment reports a modification
pub fn modified_attributes(doc: &Document, node: NodeId, tpl_attrs: Option<&TplAttrs>) -> Vec<String> {
    let Some(n) = doc.node(node) else {
        return Vec::new();
    };
    let mut names: Vec<String> = n
        .attributes
        .iter()
        .map(|(k, _)| k.to_string())
        .filter(|k| !k.starts_with("data-parsoid") && k != "data-mw")
        .collect();
    // Attributes that were parsed but have since been removed
    if let Some(a) = doc.peek_data_parsoid(node).and_then(|dp| dp.into_owned().a) {
        for k in a.into_keys() {
            if !names.contains(&k) {
                names.push(k);
            }
        }
    }
    names.retain(|k| attribute_shadow_info(doc, node, k, tpl_attrs).modified);
    names
}
