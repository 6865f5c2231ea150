//! Round-trip example - build a page, expand an extension tag, post-process
//! and serialize it, then ask which source slices can be reused after an edit

use serde_json::json;
use std::sync::Arc;
use wikidom::encapsulation::extract_expansions;
use wikidom::{
    diff, selser, Attributes, DefaultSiteConfig, DiffChange, DomBuilder, DomSerializer, Env,
    ExtensionApi, Pipeline, PipelineConfig, SiteConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let src = "== Intro ==\n* ''a''\n<nowiki>[[x]] &amp;</nowiki>";
    let tokens = json!([
        {"type": "startTag", "name": "h2", "dsr": [0, 11, 2, 2]},
        {"type": "text", "value": " Intro "},
        {"type": "endTag", "name": "h2"},
        {"type": "startTag", "name": "ul", "dsr": [12, 19, 0, 0]},
        {"type": "startTag", "name": "li", "dsr": [12, 19, 1, 0]},
        {"type": "text", "value": " "},
        {"type": "startTag", "name": "i", "dsr": [14, 19, 2, 2]},
        {"type": "text", "value": "a"},
        {"type": "endTag", "name": "i"},
        {"type": "endTag", "name": "ul"},
        {"type": "startTag", "name": "p", "dsr": [20, 52, 0, 0]}
    ]);
    let mut doc = DomBuilder::new().build_from_json(&tokens)?;

    let site = Arc::new(DefaultSiteConfig::new());
    let p = doc.last_child(doc.body()).ok_or("missing paragraph")?;
    let mut api = ExtensionApi::new();
    site.extensions().expand_into(
        &mut api,
        &mut doc,
        p,
        None,
        "nowiki",
        "[[x]] &amp;",
        &Attributes::new(),
    )?;

    let env = Env::new(site, src).with_config(PipelineConfig {
        dump_flags: vec!["dom:post-cleanup".into()],
        ..Default::default()
    });
    let mut pipeline = Pipeline::standard(env.clone());
    let mut doc = pipeline.run(doc)?;
    println!("HTML: {}", DomSerializer::new().serialize(&doc)?);

    let expansions = extract_expansions(&mut doc)?;
    for (src, expansion) in &expansions.extensions {
        println!("Extension {} -> {}", src, expansion.html);
    }

    // Edit the list item and see what survives
    let body = doc.body();
    let li = doc.find_by_tag("li").first().copied().ok_or("missing list item")?;
    let text = doc.create_text("new ");
    doc.insert_before(li, text, doc.first_child(li))?;
    diff::mark_node(&mut doc, text, 1, DiffChange::Inserted)?;
    for node in selser::reuse_plan(&mut doc, body, 1, None) {
        println!(
            "Reuse <{}>: {:?}",
            doc.get(node)?.name,
            env.wt_source(&doc, node)
        );
    }

    for d in doc.diagnostics().iter().chain(api.diagnostics()) {
        println!("{}: {}", d.channel, d.message);
    }
    Ok(())
}
