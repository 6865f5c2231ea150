//! Sidecar store: per-node metadata kept beside the visible DOM
//!
//! Each element may carry hidden `data-<ns>` attributes holding JSON. They
//! are decoded lazily into the node's [`NodeData`] record, which is then the
//! only writable copy. [`Document::save_data_attribs`] is the single path
//! that writes the record back into attributes; reading an attribute after
//! writing the record without saving sees the stale value.
//!
//! Namespaces beginning with `tmp_` are process-local and never saved.

use crate::document::Document;
use crate::error::Result;
use crate::types::{
    DataMw, DataParsoid, DiffMark, NodeData, NodeId, NS_DIFF, NS_MW, NS_PARSOID, TMP_PREFIX,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;

/// Diagnostic channel for corrupt hidden attributes
pub const MALFORMED_CHANNEL: &str = "warn/data-attrib";

fn attr_name(ns: &str) -> String {
    format!("data-{}", ns)
}

impl Document {
    /// Decode `data-<attr>` as JSON.
    ///
    /// Missing attribute → `None`. Malformed JSON is logged, recorded as a
    /// diagnostic, and also yields `None` so the caller substitutes its
    /// default.
    fn decode_data_attr<T: DeserializeOwned>(&mut self, id: NodeId, ns: &str) -> Option<T> {
        let raw = self.attr(id, &attr_name(ns))?.to_string();
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    "[SidecarStore] Could not decode data-{} on node {}: {} ({})",
                    ns,
                    id,
                    e,
                    raw
                );
                self.push_diagnostic(
                    MALFORMED_CHANNEL,
                    format!("could not decode data-{}: {}", ns, e),
                    Some(id),
                );
                None
            }
        }
    }

    /// Load namespace `name` into the node's record unless already loaded.
    ///
    /// `default` is used when the attribute is missing or malformed. Non
    /// elements are ignored.
    pub fn load_data_attrib(&mut self, id: NodeId, name: &str, default: Value) {
        if !self.node(id).is_some_and(|n| n.is_element()) {
            return;
        }
        let loaded = self.data(id).is_some_and(|d| match name {
            NS_PARSOID => d.parsoid.is_some(),
            NS_MW => d.mw.is_some(),
            NS_DIFF => d.diff.is_some(),
            _ if name.starts_with(TMP_PREFIX) => d.tmp.contains_key(name),
            _ => d.extra.contains_key(name),
        });
        if loaded {
            return;
        }

        match name {
            NS_PARSOID => {
                let dp = self
                    .decode_data_attr::<DataParsoid>(id, name)
                    .unwrap_or_else(|| typed_default(default));
                if let Some(d) = self.data_entry(id) {
                    d.parsoid = Some(dp);
                }
            }
            NS_MW => {
                let mw = self
                    .decode_data_attr::<DataMw>(id, name)
                    .unwrap_or_else(|| typed_default(default));
                if let Some(d) = self.data_entry(id) {
                    d.mw = Some(mw);
                }
            }
            NS_DIFF => {
                let mark = self
                    .decode_data_attr::<DiffMark>(id, name)
                    .unwrap_or_else(|| typed_default(default));
                if let Some(d) = self.data_entry(id) {
                    d.diff = Some(mark);
                }
            }
            _ if name.starts_with(TMP_PREFIX) => {
                if let Some(d) = self.data_entry(id) {
                    d.tmp.insert(name.to_string(), default);
                }
            }
            _ => {
                let value = self.decode_data_attr::<Value>(id, name).unwrap_or(default);
                if let Some(d) = self.data_entry(id) {
                    d.extra.insert(name.to_string(), value);
                }
            }
        }
    }

    pub fn load_data_parsoid(&mut self, id: NodeId) {
        self.load_data_attrib(id, NS_PARSOID, Value::Null);
    }

    /// Parse provenance of an element, loading it on first access
    pub fn data_parsoid(&mut self, id: NodeId) -> Option<&DataParsoid> {
        self.load_data_parsoid(id);
        self.data(id).and_then(|d| d.parsoid.as_ref())
    }

    pub fn data_parsoid_mut(&mut self, id: NodeId) -> Option<&mut DataParsoid> {
        self.load_data_parsoid(id);
        self.data_entry(id).and_then(|d| d.parsoid.as_mut())
    }

    /// Replace the in-memory provenance record
    pub fn set_data_parsoid(&mut self, id: NodeId, dp: DataParsoid) {
        if let Some(d) = self.data_entry(id) {
            d.parsoid = Some(dp);
        }
    }

    pub fn data_mw(&mut self, id: NodeId) -> Option<&DataMw> {
        self.load_data_attrib(id, NS_MW, Value::Null);
        self.data(id).and_then(|d| d.mw.as_ref())
    }

    pub fn data_mw_mut(&mut self, id: NodeId) -> Option<&mut DataMw> {
        self.load_data_attrib(id, NS_MW, Value::Null);
        self.data_entry(id).and_then(|d| d.mw.as_mut())
    }

    pub fn set_data_mw(&mut self, id: NodeId, mw: DataMw) {
        if let Some(d) = self.data_entry(id) {
            d.mw = Some(mw);
        }
    }

    /// Diff mark record, loaded on first access
    pub(crate) fn diff_mark_entry(&mut self, id: NodeId) -> Option<&mut DiffMark> {
        self.load_data_attrib(id, NS_DIFF, Value::Null);
        self.data_entry(id).and_then(|d| d.diff.as_mut())
    }

    /// Free-form namespace (anything other than `parsoid`, `mw`,
    /// `parsoid-diff`), including `tmp_` scratch.
    pub fn data_attrib(&mut self, id: NodeId, name: &str) -> Option<&Value> {
        self.load_data_attrib(id, name, Value::Null);
        let d = self.data(id)?;
        if name.starts_with(TMP_PREFIX) {
            d.tmp.get(name)
        } else {
            d.extra.get(name)
        }
    }

    pub fn set_data_attrib(&mut self, id: NodeId, name: &str, value: Value) {
        if let Some(d) = self.data_entry(id) {
            if name.starts_with(TMP_PREFIX) {
                d.tmp.insert(name.to_string(), value);
            } else {
                d.extra.insert(name.to_string(), value);
            }
        }
    }

    /// Drop all `tmp_` scratch entries of a node
    pub fn clear_tmp(&mut self, id: NodeId) {
        if let Some(d) = self.data_entry(id) {
            d.tmp.clear();
        }
    }

    /// Read provenance without loading it.
    ///
    /// Returns the in-memory record when loaded, otherwise a freshly decoded
    /// copy of the hidden attribute (default on malformed JSON). Never
    /// mutates the document, so predicates can use it freely.
    pub fn peek_data_parsoid(&self, id: NodeId) -> Option<Cow<'_, DataParsoid>> {
        let node = self.node(id)?;
        if !node.is_element() {
            return None;
        }
        if let Some(dp) = node.data.as_deref().and_then(|d| d.parsoid.as_ref()) {
            return Some(Cow::Borrowed(dp));
        }
        let dp = node
            .attr("data-parsoid")
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        Some(Cow::Owned(dp))
    }

    /// True when the element carries any parse provenance, serialized or
    /// in memory. New elements inserted by an editor have none.
    pub fn has_provenance(&self, id: NodeId) -> bool {
        if self.has_attr(id, "data-parsoid") {
            return true;
        }
        self.data(id)
            .and_then(|d| d.parsoid.as_ref())
            .is_some_and(|dp| !dp.is_empty())
    }

    /// Write every non-`tmp_` namespace of the record back to attributes.
    ///
    /// String values are written as plain attribute text; everything else is
    /// JSON. An empty typed record is written only when its attribute already
    /// exists, so loading never makes a fresh element look parsed.
    pub fn save_data_attribs(&mut self, id: NodeId) -> Result<()> {
        let Some(data) = self.get_mut(id)?.data.take() else {
            return Ok(());
        };
        let result = self.write_data_attribs(id, &data);
        self.get_mut(id)?.data = Some(data);
        result
    }

    fn write_data_attribs(&mut self, id: NodeId, data: &NodeData) -> Result<()> {
        if let Some(dp) = &data.parsoid {
            self.write_typed(id, NS_PARSOID, dp, dp.is_empty())?;
        }
        if let Some(mw) = &data.mw {
            self.write_typed(id, NS_MW, mw, mw.is_empty())?;
        }
        if let Some(mark) = &data.diff {
            self.write_typed(id, NS_DIFF, mark, mark.is_empty())?;
        }
        for (name, value) in &data.extra {
            if name.starts_with(TMP_PREFIX) {
                continue;
            }
            match value {
                Value::Null => {}
                Value::String(s) => self.set_attr(id, &attr_name(name), s)?,
                other => self.set_attr(id, &attr_name(name), &serde_json::to_string(other)?)?,
            }
        }
        Ok(())
    }

    fn write_typed<T: Serialize>(&mut self, id: NodeId, ns: &str, value: &T, empty: bool) -> Result<()> {
        let name = attr_name(ns);
        if empty && !self.has_attr(id, &name) {
            return Ok(());
        }
        let json = serde_json::to_string(value)?;
        self.set_attr(id, &name, &json)
    }

    /// Save every element in a subtree
    pub fn save_subtree(&mut self, id: NodeId) -> Result<()> {
        for n in self.descendants(id) {
            if self.get(n)?.data.is_some() {
                self.save_data_attribs(n)?;
            }
        }
        Ok(())
    }
}

fn typed_default<T: DeserializeOwned + Default>(default: Value) -> T {
    if default.is_null() {
        return T::default();
    }
    serde_json::from_value(default).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dsr, Syntax};
    use serde_json::json;

    fn element(doc: &mut Document, name: &str) -> NodeId {
        let el = doc.create_element(name);
        let body = doc.body();
        doc.append_child(body, el).unwrap();
        el
    }

    #[test]
    fn test_tmp_namespace_never_saved() {
        let mut doc = Document::new();
        let p = element(&mut doc, "p");

        doc.data_parsoid_mut(p).unwrap().dsr = Some(Dsr::new(0, 5));
        doc.set_data_attrib(p, "tmp_scratch", json!({"seen": true}));
        doc.save_data_attribs(p).unwrap();

        let attrs: Vec<_> = doc.get(p).unwrap().attributes.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(attrs, vec!["data-parsoid"]);
        assert!(!doc.attr(p, "data-parsoid").unwrap().contains("tmp_"));

        // Reload on a fresh element carrying only the serialized form
        let mut doc2 = Document::new();
        let copy = doc2.create_element_with("p", doc.get(p).unwrap().attributes.clone());
        assert_eq!(doc2.data_parsoid(copy).unwrap().dsr, Some(Dsr::new(0, 5)));
        assert_eq!(doc2.data_attrib(copy, "tmp_scratch"), Some(&Value::Null));
    }

    #[test]
    fn test_load_is_idempotent() {
        let mut doc = Document::new();
        let p = element(&mut doc, "p");
        doc.set_attr(p, "data-parsoid", r#"{"stx":"html"}"#).unwrap();

        doc.data_parsoid_mut(p).unwrap().stx = Some(Syntax::Piped);
        // Attribute changes after loading are not read back
        doc.set_attr(p, "data-parsoid", r#"{"stx":"url"}"#).unwrap();
        doc.load_data_parsoid(p);
        assert_eq!(doc.data_parsoid(p).unwrap().stx, Some(Syntax::Piped));

        doc.save_data_attribs(p).unwrap();
        assert_eq!(doc.attr(p, "data-parsoid"), Some(r#"{"stx":"piped"}"#));
    }

    #[test]
    fn test_malformed_json_is_recovered() {
        let mut doc = Document::new();
        let bad = element(&mut doc, "p");
        let good = element(&mut doc, "p");
        doc.set_attr(bad, "data-parsoid", "{not json").unwrap();
        doc.set_attr(good, "data-parsoid", r#"{"src":"x"}"#).unwrap();

        assert!(doc.data_parsoid(bad).unwrap().is_empty());
        assert_eq!(doc.data_parsoid(good).unwrap().src.as_deref(), Some("x"));
        assert_eq!(doc.diagnostics().len(), 1);
        assert_eq!(doc.diagnostics()[0].node, Some(bad));
        assert_eq!(doc.diagnostics()[0].channel, MALFORMED_CHANNEL);
    }

    #[test]
    fn test_empty_record_not_added_to_new_element() {
        let mut doc = Document::new();
        let p = element(&mut doc, "p");
        doc.load_data_parsoid(p);
        doc.save_data_attribs(p).unwrap();
        assert!(!doc.has_attr(p, "data-parsoid"));
        assert!(!doc.has_provenance(p));

        let q = element(&mut doc, "p");
        doc.set_attr(q, "data-parsoid", "{}").unwrap();
        doc.load_data_parsoid(q);
        doc.save_data_attribs(q).unwrap();
        assert_eq!(doc.attr(q, "data-parsoid"), Some("{}"));
        assert!(doc.has_provenance(q));
    }

    #[test]
    fn test_scalars_saved_as_plain_text() {
        let mut doc = Document::new();
        let p = element(&mut doc, "p");
        doc.set_data_attrib(p, "ve-note", json!("plain"));
        doc.set_data_attrib(p, "ve-meta", json!({"k": [1, 2]}));
        doc.set_data_attrib(p, "ve-none", Value::Null);
        doc.save_data_attribs(p).unwrap();
        assert_eq!(doc.attr(p, "data-ve-note"), Some("plain"));
        assert_eq!(doc.attr(p, "data-ve-meta"), Some(r#"{"k":[1,2]}"#));
        assert!(!doc.has_attr(p, "data-ve-none"));
    }

    #[test]
    fn test_text_nodes_have_no_sidecar() {
        let mut doc = Document::new();
        let t = doc.create_text("x");
        assert!(doc.data_parsoid(t).is_none());
        assert!(doc.peek_data_parsoid(t).is_none());
        doc.save_data_attribs(t).unwrap();
    }

    #[test]
    fn test_peek_does_not_load() {
        let mut doc = Document::new();
        let p = element(&mut doc, "p");
        doc.set_attr(p, "data-parsoid", r#"{"stx":"html"}"#).unwrap();
        assert!(doc.peek_data_parsoid(p).unwrap().is_literal_html());
        assert!(doc.get(p).unwrap().data.is_none());
    }

    #[test]
    fn test_mw_and_diff_namespaces_round_trip() {
        let mut doc = Document::new();
        let p = element(&mut doc, "span");
        doc.data_mw_mut(p).unwrap().name = Some("ref".into());
        *doc.diff_mark_entry(p).unwrap() = DiffMark::new(7, crate::types::DiffChange::Inserted);
        doc.save_data_attribs(p).unwrap();

        let mut doc2 = Document::new();
        let copy = doc2.create_element_with("span", doc.get(p).unwrap().attributes.clone());
        assert_eq!(doc2.data_mw(copy).unwrap().name.as_deref(), Some("ref"));
        assert_eq!(doc2.diff_mark_entry(copy).unwrap().id, 7);
    }
}
