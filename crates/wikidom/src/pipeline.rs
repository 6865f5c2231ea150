//! DOM pass pipeline
//!
//! Passes run in registration order over a document owned by the
//! pipeline. The run is all or nothing: the first failing pass aborts it,
//! the partially processed document is dropped, and the error names the
//! pass.

use crate::cleanup::cleanup_and_save;
use crate::config::Env;
use crate::document::Document;
use crate::error::{DomError, Result};
use crate::predicates::has_node_name;
use crate::serializer::{DomSerializer, SerializerConfig};
use crate::types::NodeId;
use std::time::Instant;

/// Trace flag that logs every pass at `info` level
pub const TRACE_PASSES: &str = "dompasses";

/// One DOM pass
pub trait DomPass: Send + Sync {
    /// Name used in logs, dump flags (`dom:post-<name>`) and errors
    fn name(&self) -> &str;

    fn run(&self, doc: &mut Document, env: &Env) -> Result<()>;
}

/// A pass built from a closure
pub struct FnPass<F> {
    name: String,
    f: F,
}

impl<F> FnPass<F>
where
    F: Fn(&mut Document, &Env) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> DomPass for FnPass<F>
where
    F: Fn(&mut Document, &Env) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, doc: &mut Document, env: &Env) -> Result<()> {
        (self.f)(doc, env)
    }
}

/// Final cleanup and data-attribute save
pub struct CleanUpPass;

impl DomPass for CleanUpPass {
    fn name(&self) -> &str {
        "cleanup"
    }

    fn run(&self, doc: &mut Document, _env: &Env) -> Result<()> {
        let body = doc.body();
        cleanup_and_save(doc, body)
    }
}

/// Groups top-level content into nested `<section>` elements by heading
pub struct WrapSectionsPass;

fn heading_level(doc: &Document, id: NodeId) -> Option<u8> {
    (1..=6u8).find(|l| has_node_name(doc, id, &format!("h{}", l)))
}

impl DomPass for WrapSectionsPass {
    fn name(&self) -> &str {
        "wrap-sections"
    }

    fn run(&self, doc: &mut Document, _env: &Env) -> Result<()> {
        let body = doc.body();
        let mut stack: Vec<(u8, NodeId)> = Vec::new();
        let mut next_id = 1u32;

        for child in doc.children(body) {
            // Headings generated by templates do not start sections
            let level = heading_level(doc, child).filter(|_| !doc.has_attr(child, "about"));
            if let Some(level) = level {
                while stack.last().is_some_and(|&(l, _)| l >= level) {
                    stack.pop();
                }
                let section = doc.create_element("section");
                doc.set_attr(section, "data-mw-section-id", &next_id.to_string())?;
                next_id += 1;
                let parent = stack.last().map_or(body, |&(_, s)| s);
                doc.insert_before(parent, section, None)?;
                stack.push((level, section));
            } else if stack.is_empty() {
                let lead = doc.create_element("section");
                doc.set_attr(lead, "data-mw-section-id", "0")?;
                doc.insert_before(body, lead, Some(child))?;
                stack.push((0, lead));
            }
            if let Some(&(_, section)) = stack.last() {
                doc.append_child(section, child)?;
            }
        }
        tracing::debug!("[Pipeline] Wrapped {} heading sections", next_id - 1);
        Ok(())
    }
}

/// Serialized DOM captured after a pass by a `dom:post-<name>` dump flag
#[derive(Debug, Clone)]
pub struct PassDump {
    pub pass: String,
    pub html: String,
}

/// Ordered list of passes bound to one page environment
pub struct Pipeline {
    env: Env,
    passes: Vec<Box<dyn DomPass>>,
    dumps: Vec<PassDump>,
}

impl Pipeline {
    pub fn new(env: Env) -> Self {
        Self {
            env,
            passes: Vec::new(),
            dumps: Vec::new(),
        }
    }

    /// Standard post-processing: optional section wrapping, then cleanup
    pub fn standard(env: Env) -> Self {
        let wrap = env.config.wrap_sections;
        let mut pipeline = Self::new(env);
        if wrap {
            pipeline.register(Box::new(WrapSectionsPass));
        }
        pipeline.register(Box::new(CleanUpPass));
        pipeline
    }

    pub fn register(&mut self, pass: Box<dyn DomPass>) {
        tracing::debug!("[Pipeline] Registered pass: {}", pass.name());
        self.passes.push(pass);
    }

    /// Register a closure as a named pass
    pub fn add_pass<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Document, &Env) -> Result<()> + Send + Sync + 'static,
    {
        self.register(Box::new(FnPass::new(name, f)));
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn dumps(&self) -> &[PassDump] {
        &self.dumps
    }

    /// Run every pass over `doc`, returning it only if all passes succeed.
    /// Dumps from a previous run are discarded.
    pub fn run(&mut self, mut doc: Document) -> Result<Document> {
        self.dumps.clear();
        let trace = self.env.has_trace_flag(TRACE_PASSES);
        let started = Instant::now();

        for pass in &self.passes {
            let name = pass.name();
            if trace {
                tracing::info!("[Pipeline] Running pass {}", name);
            } else {
                tracing::debug!("[Pipeline] Running pass {}", name);
            }
            let pass_started = Instant::now();

            if let Err(e) = pass.run(&mut doc, &self.env) {
                tracing::error!("[Pipeline] Pass {} failed: {}", name, e);
                return Err(DomError::PassFailed {
                    pass: name.to_string(),
                    source: Box::new(e),
                });
            }
            if trace {
                tracing::info!("[Pipeline] Pass {} took {:?}", name, pass_started.elapsed());
            }

            if self.env.has_dump_flag(&format!("dom:post-{}", name)) {
                let serializer = DomSerializer::with_config(SerializerConfig {
                    include_data_attribs: true,
                });
                let html = serializer.serialize(&doc)?;
                tracing::info!("[Pipeline] DOM after {}:\n{}", name, html);
                self.dumps.push(PassDump {
                    pass: name.to_string(),
                    html,
                });
            }
        }

        tracing::debug!(
            "[Pipeline] {} passes done in {:?}, {} diagnostics",
            self.passes.len(),
            started.elapsed(),
            doc.diagnostics().len()
        );
        Ok(doc)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("passes", &self.pass_names())
            .field("env", &self.env)
            .finish()
    }
}
