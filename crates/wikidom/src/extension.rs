//! Extension tag contract
//!
//! An extension tag (`<nowiki>`, `<pre>`, ...) converts its source text to a
//! DOM fragment and back. When the wrapper was not modified and the
//! fragment is exactly what `to_dom` produced, `from_dom` must return the
//! original source text. Anything else degrades to a best-effort
//! reconstruction plus a diagnostic; it never fails the document.

use crate::document::{Diagnostic, Document};
use crate::encapsulation::add_span_wrappers;
use crate::error::{DomError, Result};
use crate::types::{Attributes, MwType, NodeId, TypeTag};
use ahash::{AHashMap, AHashSet};
use std::sync::Arc;

/// State flags an extension can raise for the wikitext serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Html2WtFlag {
    /// A `<nowiki/>` was emitted
    HasSelfClosingNowikis,
}

/// Services handed to extension code
#[derive(Debug, Default)]
pub struct ExtensionApi {
    diagnostics: Vec<Diagnostic>,
    flags: AHashSet<Html2WtFlag>,
}

impl ExtensionApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic on `channel` (`error/...`, `warn/...`, ...)
    pub fn log(&mut self, channel: &str, message: impl Into<String>) {
        let message = message.into();
        if channel.starts_with("error") {
            tracing::error!("[Extension] {}: {}", channel, message);
        } else if channel.starts_with("warn") {
            tracing::warn!("[Extension] {}: {}", channel, message);
        } else {
            tracing::debug!("[Extension] {}: {}", channel, message);
        }
        self.diagnostics.push(Diagnostic {
            channel: channel.to_string(),
            message,
            node: None,
        });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn set_html2wt_flag(&mut self, flag: Html2WtFlag) {
        self.flags.insert(flag);
    }

    pub fn has_html2wt_flag(&self, flag: Html2WtFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// A pluggable extension tag
pub trait ExtensionTag: Send + Sync {
    /// Lowercase tag name, e.g. `nowiki`
    fn name(&self) -> &str;

    /// Build a standalone document whose body holds the rendered content
    fn to_dom(&self, api: &mut ExtensionApi, src: &str, args: &Attributes) -> Result<Document>;

    /// Turn the rendered content rooted at `node` back into source text
    fn from_dom(
        &self,
        api: &mut ExtensionApi,
        doc: &mut Document,
        node: NodeId,
        wrapper_unmodified: bool,
    ) -> Result<String>;
}

/// Extension tags known to a site, by lowercase name
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    tags: AHashMap<String, Arc<dyn ExtensionTag>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: ExtensionTag + 'static>(&mut self, tag: T) {
        let name = tag.name().to_ascii_lowercase();
        tracing::debug!("[Extension] Registered <{}>", name);
        self.tags.insert(name, Arc::new(tag));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExtensionTag>> {
        self.tags.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn ExtensionTag>> {
        self.get(name)
            .ok_or_else(|| DomError::UnknownExtension(name.to_string()))
    }

    /// Render `src` with extension `name` and splice the result into `doc`
    /// before `before` (or at the end of `parent`).
    ///
    /// The inserted nodes form one encapsulated group: text and comments
    /// are span-wrapped, all members share a fresh `about` id, and the
    /// first member carries `typeof="mw:Extension/<name>"` plus the source
    /// text in its provenance.
    pub fn expand_into(
        &self,
        api: &mut ExtensionApi,
        doc: &mut Document,
        parent: NodeId,
        before: Option<NodeId>,
        name: &str,
        src: &str,
        args: &Attributes,
    ) -> Result<Vec<NodeId>> {
        let tag = self.lookup(name)?;
        let fragment = tag.to_dom(api, src, args)?;

        let mut inserted = Vec::new();
        for child in fragment.children(fragment.body()) {
            let copy = doc.import_subtree(&fragment, child)?;
            doc.insert_before(parent, copy, before)?;
            inserted.push(copy);
        }
        if inserted.is_empty() {
            let span = doc.create_element("span");
            doc.insert_before(parent, span, before)?;
            inserted.push(span);
        }
        let group = add_span_wrappers(doc, &inserted)?;

        let about = doc.new_about_id();
        for &member in &group {
            doc.set_attr(member, "about", &about)?;
        }
        let first = group[0];
        doc.add_type_of(first, TypeTag::mw_sub(MwType::Extension, tag.name()))?;
        if let Some(dp) = doc.data_parsoid_mut(first) {
            dp.src = Some(src.to_string());
        }
        tracing::debug!(
            "[Extension] Expanded <{}> into {} nodes as {}",
            tag.name(),
            group.len(),
            about
        );
        Ok(group)
    }

    /// Source text for an extension's rendered content.
    ///
    /// A failing `from_dom` is not fatal: the recorded source is replayed
    /// when the wrapper is unmodified, otherwise the text content is used,
    /// and a diagnostic is logged either way.
    pub fn from_dom(
        &self,
        api: &mut ExtensionApi,
        doc: &mut Document,
        name: &str,
        node: NodeId,
        wrapper_unmodified: bool,
    ) -> Result<String> {
        let tag = self.lookup(name)?;
        match tag.from_dom(api, doc, node, wrapper_unmodified) {
            Ok(src) => Ok(src),
            Err(e) => {
                api.log(
                    &format!("error/html2wt/{}", tag.name()),
                    format!("falling back to best-effort source: {}", e),
                );
                let recorded = doc.data_parsoid(node).and_then(|dp| dp.src.clone());
                match recorded {
                    Some(src) if wrapper_unmodified => Ok(src),
                    _ => Ok(doc.text_content(node)),
                }
            }
        }
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("tags", &self.names())
            .finish()
    }
}
