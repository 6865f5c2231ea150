//! Site and page configuration
//!
//! Site configuration is shared read-only between documents; everything
//! that belongs to one parse lives in [`Env`].

use crate::document::Document;
use crate::ext::{Nowiki, Pre};
use crate::extension::ExtensionRegistry;
use crate::selser;
use crate::types::NodeId;
use ahash::AHashSet;
use std::sync::Arc;

/// Lookups a site provides to the DOM passes
pub trait SiteConfig: Send + Sync {
    /// Extension tags enabled on this site
    fn extensions(&self) -> &ExtensionRegistry;

    /// Verbose tracing for a component, e.g. `dompasses`
    fn has_trace_flag(&self, _flag: &str) -> bool {
        false
    }

    /// DOM dumps at a pipeline point, e.g. `dom:post-cleanup`
    fn has_dump_flag(&self, _flag: &str) -> bool {
        false
    }
}

/// In-memory site with the bundled extension tags registered
#[derive(Debug, Clone)]
pub struct DefaultSiteConfig {
    extensions: ExtensionRegistry,
    trace_flags: AHashSet<String>,
    dump_flags: AHashSet<String>,
}

impl DefaultSiteConfig {
    pub fn new() -> Self {
        let mut extensions = ExtensionRegistry::new();
        extensions.register(Nowiki);
        extensions.register(Pre);
        Self {
            extensions,
            trace_flags: AHashSet::new(),
            dump_flags: AHashSet::new(),
        }
    }

    pub fn extensions_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }

    pub fn with_trace_flag(mut self, flag: &str) -> Self {
        self.trace_flags.insert(flag.to_string());
        self
    }

    pub fn with_dump_flag(mut self, flag: &str) -> Self {
        self.dump_flags.insert(flag.to_string());
        self
    }
}

impl Default for DefaultSiteConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteConfig for DefaultSiteConfig {
    fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    fn has_trace_flag(&self, flag: &str) -> bool {
        self.trace_flags.contains(flag)
    }

    fn has_dump_flag(&self, flag: &str) -> bool {
        self.dump_flags.contains(flag)
    }
}

/// Per-run pipeline options
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Dump flags enabled for this run in addition to the site's
    pub dump_flags: Vec<String>,
    /// Trace flags enabled for this run in addition to the site's
    pub trace_flags: Vec<String>,
    /// Group top-level content into `<section>` elements by heading
    pub wrap_sections: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dump_flags: Vec::new(),
            trace_flags: Vec::new(),
            wrap_sections: true,
        }
    }
}

/// Everything a pass needs to know about the page being processed
#[derive(Clone)]
pub struct Env {
    pub site: Arc<dyn SiteConfig>,
    pub page_id: Option<u64>,
    /// Wikitext the document was parsed from
    pub page_src: String,
    pub config: PipelineConfig,
}

impl Env {
    pub fn new(site: Arc<dyn SiteConfig>, page_src: impl Into<String>) -> Self {
        Self {
            site,
            page_id: None,
            page_src: page_src.into(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_page_id(mut self, page_id: u64) -> Self {
        self.page_id = Some(page_id);
        self
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        self.site.extensions()
    }

    pub fn has_trace_flag(&self, flag: &str) -> bool {
        self.config.trace_flags.iter().any(|f| f == flag) || self.site.has_trace_flag(flag)
    }

    pub fn has_dump_flag(&self, flag: &str) -> bool {
        self.config.dump_flags.iter().any(|f| f == flag) || self.site.has_dump_flag(flag)
    }

    /// Page source covered by the node's `dsr`
    pub fn wt_source(&self, doc: &Document, node: NodeId) -> Option<&str> {
        selser::wt_source(doc, node, &self.page_src)
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("extensions", self.site.extensions())
            .field("page_id", &self.page_id)
            .field("page_src_len", &self.page_src.len())
            .field("config", &self.config)
            .finish()
    }
}
