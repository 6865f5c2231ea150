//! Round-trip DOM processing for wikitext
//!
//! Every node produced by parsing carries provenance: source offsets,
//! original attribute text, auto-insertion flags and encapsulation
//! boundaries. A serializer uses it to decide, node by node, whether the
//! original wikitext can be replayed or must be regenerated.
//!
//! ## Core Design
//!
//! ```text
//! tokens → DomBuilder → Document (arena, NodeId = u32) → Pipeline passes → HTML
//!                            │
//!                 sidecar records (data-parsoid, data-mw, data-parsoid-diff)
//! ```
//!
//! - Nodes live in one arena with live sibling/child links
//! - Sidecar records are typed and loaded lazily from `data-*` attributes
//! - Traversal is iterative and tolerates handlers that rewrite the tree

pub mod builder;
pub mod cleanup;
pub mod config;
pub mod diff;
pub mod document;
pub mod encapsulation;
pub mod entities;
pub mod error;
pub mod ext;
pub mod extension;
pub mod pipeline;
pub mod predicates;
pub mod selser;
pub mod serializer;
pub mod shadow;
pub mod store;
pub mod traverser;
pub mod types;

pub use builder::{tokens_from_dom, DomBuilder, DomBuilderConfig, Token, TokenAttr};
pub use config::{DefaultSiteConfig, Env, PipelineConfig, SiteConfig};
pub use document::{Diagnostic, Document};
pub use encapsulation::{Expansion, Expansions};
pub use error::{DomError, Result};
pub use extension::{ExtensionApi, ExtensionRegistry, ExtensionTag, Html2WtFlag};
pub use pipeline::{DomPass, Pipeline};
pub use serializer::{DomSerializer, SerializerConfig};
pub use shadow::{AttributeShadowInfo, TplAttrs};
pub use traverser::{Action, DomTraverser, NodeMatch, Walk};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    /// Build, edit, run the standard passes and check what can be reused.
    #[test]
    fn test_parse_edit_save_cycle() {
        let src = "''a'' b";
        let tokens = json!([
            {"type": "startTag", "name": "p", "dsr": [0, 7, 0, 0]},
            {"type": "startTag", "name": "i", "dsr": [0, 5, 2, 2]},
            {"type": "text", "value": "a"},
            {"type": "endTag", "name": "i"},
            {"type": "text", "value": " b"},
            {"type": "endTag", "name": "p"}
        ]);
        let doc = DomBuilder::new().build_from_json(&tokens).unwrap();
        let env = Env::new(Arc::new(DefaultSiteConfig::new()), src).with_config(PipelineConfig {
            wrap_sections: false,
            ..Default::default()
        });
        let mut doc = Pipeline::standard(env.clone()).run(doc).unwrap();

        let body = doc.body();
        let p = doc.first_child(body).unwrap();
        let i = doc.first_child(p).unwrap();
        assert_eq!(env.wt_source(&doc, p), Some(src));
        assert_eq!(selser::reuse_plan(&mut doc, body, 1, None), vec![p]);

        let text = doc.last_child(p).unwrap();
        doc.set_text(text, " c").unwrap();
        diff::mark_node(&mut doc, text, 1, DiffChange::Modified).unwrap();
        assert_eq!(selser::reuse_plan(&mut doc, body, 1, None), vec![i]);
        assert_eq!(
            selser::reusable_source(&mut doc, i, 1, None, src).as_deref(),
            Some("''a''")
        );
    }
}
