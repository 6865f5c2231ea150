//! Final post-processing pass over a parsed document
//!
//! Runs once after all other DOM passes and prepares every element for
//! output: parser-only flags are dropped, whitespace that wikitext syntax
//! ignores is trimmed (with its width recorded in `dsr`), scratch data is
//! discarded and the sidecar records are written back to attributes.

use crate::document::Document;
use crate::encapsulation::is_first_encapsulation_wrapper;
use crate::error::Result;
use crate::predicates::{is_literal_html_node, is_rendering_transparent};
use crate::traverser::{Action, DomTraverser, NodeMatch, Walk};
use crate::types::{NodeId, NodeKind};

/// Wikitext constructs that never have closing syntax
const WT_TAGS_WITHOUT_CLOSING_TAGS: &[&str] =
    &["pre", "li", "dt", "dd", "hr", "tr", "td", "th", "caption"];

/// Wikitext constructs whose edge whitespace is not content
const WT_TAGS_WITH_TRIMMABLE_WS: &[&str] = &[
    "li", "dt", "dd", "h1", "h2", "h3", "h4", "h5", "h6", "td", "th", "caption",
];

fn is_line_ws(s: &str) -> bool {
    s.bytes().all(|b| b == b' ' || b == b'\t')
}

fn text_value(doc: &Document, id: NodeId) -> Option<&str> {
    doc.node(id)
        .filter(|n| n.kind == NodeKind::Text)
        .map(|n| n.value.as_str())
}

/// Width of the whitespace trimmed from one edge, or `-1` when a rendering
/// transparent node sat between trimmed runs and the width is ambiguous.
fn trim_edge(doc: &mut Document, node: NodeId, leading: bool) -> Result<i32> {
    let step = |doc: &Document, n: NodeId| {
        if leading {
            doc.next_sibling(n)
        } else {
            doc.prev_sibling(n)
        }
    };
    let mut trimmed = 0usize;
    let mut reliable = true;
    let mut skipped = false;
    let mut cur = if leading {
        doc.first_child(node)
    } else {
        doc.last_child(node)
    };

    while let Some(c) = cur {
        let next = step(doc, c);
        let ws_len = text_value(doc, c).filter(|t| is_line_ws(t)).map(str::len);
        if let Some(len) = ws_len {
            trimmed += len;
            reliable = !skipped;
            doc.remove(c)?;
        } else if is_rendering_transparent(doc, c) {
            skipped = true;
        } else {
            break;
        }
        cur = next;
    }

    let edge = cur.and_then(|c| Some((c, text_value(doc, c)?.to_string())));
    if let Some((c, text)) = edge {
        let kept = if leading {
            text.trim_start_matches([' ', '\t'])
        } else {
            text.trim_end_matches([' ', '\t'])
        };
        let cut = text.len() - kept.len();
        // Trailing whitespace only counts after a non-space character
        let eligible = leading || kept.chars().last().is_some_and(|ch| !ch.is_whitespace());
        if cut > 0 && eligible {
            reliable = !skipped;
            trimmed += cut;
            doc.set_text(c, kept)?;
        }
    }
    Ok(if reliable { trimmed as i32 } else { -1 })
}

/// Trim line whitespace at both edges of `node`, recording the widths in
/// `dsr` when one is present.
pub fn trim_whitespace(doc: &mut Document, node: NodeId) -> Result<()> {
    let leading = trim_edge(doc, node, true)?;
    let trailing = trim_edge(doc, node, false)?;
    if let Some(dsr) = doc.data_parsoid_mut(node).and_then(|dp| dp.dsr.as_mut()) {
        dsr.leading_ws = Some(leading);
        dsr.trailing_ws = Some(trailing);
    }
    Ok(())
}

fn cleanup_element(doc: &mut Document, node: NodeId, walk: &Walk) -> Result<Action> {
    let name = doc.get(node)?.name.clone();
    let literal = is_literal_html_node(doc, node);
    let first_wrapper = is_first_encapsulation_wrapper(doc, node);
    let group_first = walk.tpl_info.map(|t| t.first);
    let empty = doc.first_child(node).is_none();

    let Some(dp) = doc.data_parsoid_mut(node) else {
        return Ok(Action::Continue);
    };

    // Empty elements the tree builder invented have no source at all
    let phantom = dp.auto_inserted_start && dp.auto_inserted_end && empty;
    if phantom && walk.depth > 0 && group_first != Some(node) {
        let next = doc.next_sibling(node);
        tracing::debug!("[CleanUp] Dropping empty auto-inserted <{}>", name);
        doc.remove(node)?;
        return Ok(Action::ResumeAt(next));
    }

    if !literal && WT_TAGS_WITHOUT_CLOSING_TAGS.contains(&name.as_str()) {
        dp.auto_inserted_end = false;
    }

    // Offsets of template-generated content point into the template, not the page
    if group_first.is_some() && group_first != Some(node) && !first_wrapper && !literal {
        dp.dsr = None;
    }

    if !literal && WT_TAGS_WITH_TRIMMABLE_WS.contains(&name.as_str()) {
        trim_whitespace(doc, node)?;
    }

    doc.clear_tmp(node);
    doc.save_data_attribs(node)?;
    Ok(Action::Continue)
}

/// Run the cleanup pass over the subtree rooted at `root`
pub fn cleanup_and_save(doc: &mut Document, root: NodeId) -> Result<()> {
    let mut traverser = DomTraverser::new().with_tpl_info();
    traverser.add_handler(NodeMatch::Any, |doc, node, walk| {
        if doc.get(node)?.is_element() {
            cleanup_element(doc, node, walk)
        } else {
            Ok(Action::Continue)
        }
    });
    traverser.traverse(doc, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{DomBuilder, Token, TokenAttr};
    use crate::types::{DataParsoid, Dsr, MwType, Syntax, TypeTag};

    fn cleaned_dsr(doc: &Document, node: NodeId) -> Option<Dsr> {
        doc.peek_data_parsoid(node).and_then(|dp| dp.dsr)
    }

    enum Piece {
        Text(&'static str),
        Comment,
        Category,
    }
    use Piece::*;

    /// Build `<tag>` holding `pieces` with a dsr, run cleanup, return the
    /// recorded whitespace widths and the remaining text.
    fn trimmed(tag: &str, pieces: &[Piece]) -> (i32, i32, String) {
        let mut tokens = vec![Token::StartTag {
            name: tag.to_string(),
            attrs: Vec::new(),
            dsr: Some(Dsr::with_widths(0, 10, 1, 0)),
            stx: None,
            self_closing: false,
        }];
        for piece in pieces {
            tokens.push(match piece {
                Text(t) => Token::text(t),
                Comment => Token::Comment { value: "c".into() },
                Category => Token::StartTag {
                    name: "link".into(),
                    attrs: vec![TokenAttr::new("rel", "mw:PageProp/Category")],
                    dsr: None,
                    stx: None,
                    self_closing: false,
                },
            });
        }
        tokens.push(Token::end(tag));

        let mut doc = DomBuilder::new().build(tokens).unwrap();
        let body = doc.body();
        cleanup_and_save(&mut doc, body).unwrap();
        let el = doc.first_child(body).unwrap();
        let dsr = cleaned_dsr(&doc, el).unwrap();
        (dsr.leading_ws.unwrap(), dsr.trailing_ws.unwrap(), doc.text_content(el))
    }

    fn ws(tag: &str, pieces: &[Piece]) -> (i32, i32) {
        let (leading, trailing, _) = trimmed(tag, pieces);
        (leading, trailing)
    }

    #[test]
    fn test_list_item_whitespace() {
        assert_eq!(trimmed("li", &[Text("a")]).0, 0);
        assert_eq!(trimmed("li", &[Text(" a")]), (1, 0, "a".into()));
        assert_eq!(trimmed("li", &[Text("    a  ")]), (4, 2, "a".into()));
        assert_eq!(trimmed("li", &[Text(" "), Comment, Text("a")]), (1, 0, "a".into()));
        assert_eq!(trimmed("li", &[Text(" "), Comment, Text(" a")]).0, -1);
        assert_eq!(ws("li", &[Text(" "), Comment, Text(" a ")]), (-1, 1));
        assert_eq!(trimmed("li", &[Text(" a ")]), (1, 1, "a".into()));
        assert_eq!(ws("li", &[Text("a"), Comment, Text(" ")]), (0, 1));
        assert_eq!(ws("li", &[Text("a "), Comment, Text(" ")]), (0, -1));
    }

    #[test]
    fn test_category_links_are_transparent() {
        assert_eq!(ws("li", &[Text(" "), Category, Text(" a")]), (-1, 0));
        assert_eq!(ws("li", &[Text(" x"), Category, Text(" ")]), (1, 1));
        assert_eq!(ws("li", &[Text(" x "), Category, Text(" ")]), (1, -1));
    }

    #[test]
    fn test_heading_and_cell_whitespace() {
        assert_eq!(ws("h2", &[Text("h")]), (0, 0));
        assert_eq!(trimmed("h2", &[Text("  h   ")]), (2, 3, "h".into()));
        assert_eq!(ws("h2", &[Text(" "), Comment, Text("h")]), (1, 0));
        assert_eq!(ws("h2", &[Text(" "), Comment, Text(" h ")]), (-1, 1));
        assert_eq!(ws("h2", &[Text(" h"), Comment, Text(" ")]), (1, 1));
        assert_eq!(ws("td", &[Text(" y  ")]), (1, 2));
        assert_eq!(ws("td", &[Text(" "), Comment, Text("x"), Comment, Text(" ")]), (1, 1));
        assert_eq!(
            ws("td", &[Text(" "), Comment, Text(" x "), Comment, Text(" ")]),
            (-1, -1)
        );
    }

    #[test]
    fn test_auto_inserted_end_flags() {
        let tokens = vec![
            Token::start("ul"),
            Token::start("li"),
            Token::text("a"),
            Token::start("li"),
            Token::text("b"),
            Token::end("ul"),
            Token::start("table"),
            Token::StartTag {
                name: "td".into(),
                attrs: Vec::new(),
                dsr: None,
                stx: Some(Syntax::Html),
                self_closing: false,
            },
            Token::text("c"),
        ];
        let mut doc = DomBuilder::new().build(tokens).unwrap();
        let body = doc.body();
        cleanup_and_save(&mut doc, body).unwrap();

        for li in doc.find_by_tag("li") {
            assert!(!doc.data_parsoid(li).unwrap().auto_inserted_end);
        }
        let td = doc.find_by_tag("td")[0];
        assert!(doc.data_parsoid(td).unwrap().auto_inserted_end);
        assert!(doc.attr(td, "data-parsoid").unwrap().contains("autoInsertedEnd"));
        // Tables have explicit closing syntax, so their flag stays
        let table = doc.find_by_tag("table")[0];
        assert!(doc.data_parsoid(table).unwrap().auto_inserted_end);
    }

    #[test]
    fn test_empty_auto_inserted_elements_are_removed() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = doc.create_element("p");
        doc.append_child(body, p).unwrap();
        let ghost = doc.create_element("b");
        doc.append_child(p, ghost).unwrap();
        let text = doc.create_text("x");
        doc.append_child(p, text).unwrap();
        if let Some(dp) = doc.data_parsoid_mut(ghost) {
            dp.auto_inserted_start = true;
            dp.auto_inserted_end = true;
        }
        cleanup_and_save(&mut doc, body).unwrap();
        assert_eq!(doc.children(p), vec![text]);
    }

    #[test]
    fn test_scratch_dropped_and_records_saved() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = doc.create_element("p");
        doc.append_child(body, p).unwrap();
        doc.set_data_parsoid(
            p,
            DataParsoid {
                dsr: Some(Dsr::new(0, 3)),
                ..Default::default()
            },
        );
        doc.set_data_attrib(p, "tmp_seen", serde_json::json!(true));
        cleanup_and_save(&mut doc, body).unwrap();

        assert_eq!(doc.attr(p, "data-parsoid"), Some(r#"{"dsr":[0,3,null,null]}"#));
        assert!(doc.data_attrib(p, "tmp_seen").map_or(true, |v| v.is_null()));
        assert!(!doc.has_attr(body, "data-parsoid"));
    }

    #[test]
    fn test_template_content_loses_offsets() {
        let mut doc = Document::new();
        let body = doc.body();
        let first = doc.create_element("span");
        let second = doc.create_element("p");
        for el in [first, second] {
            doc.append_child(body, el).unwrap();
            doc.set_attr(el, "about", "#mwt1").unwrap();
            doc.set_data_parsoid(
                el,
                DataParsoid {
                    dsr: Some(Dsr::new(0, 8)),
                    ..Default::default()
                },
            );
        }
        doc.add_type_of(first, TypeTag::mw(MwType::Transclusion)).unwrap();
        cleanup_and_save(&mut doc, body).unwrap();

        assert_eq!(cleaned_dsr(&doc, first), Some(Dsr::new(0, 8)));
        assert_eq!(cleaned_dsr(&doc, second), None);
    }
}
