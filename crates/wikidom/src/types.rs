//! Core type definitions: nodes, attributes, and the sidecar record
//!
//! Key design principles:
//! 1. Use u32 for node indices (4 bytes vs 8 bytes pointer)
//! 2. Sidecar namespaces are typed fields, not a free-form map
//! 3. Use SmallVec for small lists (diff changes, typeof tags, attributes)
//! 4. Unknown JSON keys are preserved so provenance round-trips losslessly

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

/// Node identifier (index into the document arena)
pub type NodeId = u32;

/// Page revision id that diff marks are validated against
pub type RevisionId = u64;

/// Reserved sidecar namespaces
pub const NS_PARSOID: &str = "parsoid";
pub const NS_MW: &str = "mw";
pub const NS_DIFF: &str = "parsoid-diff";
/// Prefix of process-local scratch namespaces. Never serialized.
pub const TMP_PREFIX: &str = "tmp_";

/// Node type, numbered as in the DOM specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeKind {
    Element = 1,
    Text = 3,
    Comment = 8,
    Document = 9,
}

impl NodeKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NodeKind::Element),
            3 => Some(NodeKind::Text),
            8 => Some(NodeKind::Comment),
            9 => Some(NodeKind::Document),
            _ => None,
        }
    }

    /// DOM `nodeName` for non-element nodes
    pub fn node_name(self) -> &'static str {
        match self {
            NodeKind::Element => "",
            NodeKind::Text => "#text",
            NodeKind::Comment => "#comment",
            NodeKind::Document => "#document",
        }
    }
}

/// Element attributes.
///
/// Order is kept only so that serialized output is deterministic; it carries
/// no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(SmallVec<[(String, String); 4]>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(k, _)| k == name)
    }

    /// Set an attribute, replacing any existing value in place
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.set(k, v);
        }
        attrs
    }
}

/// Document source range: where a node's wikitext lives in the page source.
///
/// Serialized as a JSON array `[start, end, openWidth, closeWidth, leadingWS,
/// trailingWS]`; the whitespace entries are omitted until they are computed.
/// A whitespace width of `-1` means it could not be determined reliably.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dsr {
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub open_width: Option<usize>,
    pub close_width: Option<usize>,
    pub leading_ws: Option<i32>,
    pub trailing_ws: Option<i32>,
}

impl Dsr {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn with_widths(start: usize, end: usize, open: usize, close: usize) -> Self {
        Self {
            open_width: Some(open),
            close_width: Some(close),
            ..Self::new(start, end)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s <= e)
    }

    /// Slice of `src` covered by this range, if it is valid for `src`
    pub fn source<'a>(&self, src: &'a str) -> Option<&'a str> {
        match (self.start, self.end) {
            (Some(s), Some(e)) if s <= e => src.get(s..e),
            _ => None,
        }
    }

    /// Source between the open and close tag syntax
    pub fn inner_source<'a>(&self, src: &'a str) -> Option<&'a str> {
        let (s, e) = (self.start?, self.end?);
        let inner_start = s + self.open_width?;
        let inner_end = e.checked_sub(self.close_width?)?;
        if inner_start > inner_end {
            return None;
        }
        src.get(inner_start..inner_end)
    }
}

impl Serialize for Dsr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut out: SmallVec<[Value; 6]> = SmallVec::new();
        for v in [self.start, self.end, self.open_width, self.close_width] {
            out.push(v.map_or(Value::Null, Value::from));
        }
        if self.leading_ws.is_some() || self.trailing_ws.is_some() {
            out.push(self.leading_ws.map_or(Value::Null, Value::from));
            out.push(self.trailing_ws.map_or(Value::Null, Value::from));
        }
        out.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Dsr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw: Vec<Option<i64>> = Vec::deserialize(deserializer)?;
        if raw.len() < 2 {
            return Err(de::Error::invalid_length(raw.len(), &"at least [start, end]"));
        }
        let offset = |i: usize| raw.get(i).copied().flatten().and_then(|v| usize::try_from(v).ok());
        let width = |i: usize| raw.get(i).copied().flatten().and_then(|v| i32::try_from(v).ok());
        Ok(Dsr {
            start: offset(0),
            end: offset(1),
            open_width: offset(2),
            close_width: offset(3),
            leading_ws: width(4),
            trailing_ws: width(5),
        })
    }
}

/// Which syntax produced an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Syntax {
    /// Literal HTML tag in the wikitext
    Html,
    Piped,
    Simple,
    Url,
    Magiclink,
    Row,
    Other(String),
}

impl From<String> for Syntax {
    fn from(s: String) -> Self {
        match s.as_str() {
            "html" => Syntax::Html,
            "piped" => Syntax::Piped,
            "simple" => Syntax::Simple,
            "url" => Syntax::Url,
            "magiclink" => Syntax::Magiclink,
            "row" => Syntax::Row,
            _ => Syntax::Other(s),
        }
    }
}

impl From<Syntax> for String {
    fn from(s: Syntax) -> Self {
        match s {
            Syntax::Html => "html".into(),
            Syntax::Piped => "piped".into(),
            Syntax::Simple => "simple".into(),
            Syntax::Url => "url".into(),
            Syntax::Magiclink => "magiclink".into(),
            Syntax::Row => "row".into(),
            Syntax::Other(s) => s,
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Parse provenance (`data-parsoid`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataParsoid {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsr: Option<Dsr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stx: Option<Syntax>,
    /// Attribute values as they were when the node was parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<BTreeMap<String, Option<String>>>,
    /// Original source text of attributes whose value was normalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sa: Option<BTreeMap<String, Option<String>>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_inserted_start: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_inserted_end: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub self_close: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

impl DataParsoid {
    pub fn is_empty(&self) -> bool {
        *self == DataParsoid::default()
    }

    pub fn is_literal_html(&self) -> bool {
        self.stx == Some(Syntax::Html)
    }

    /// Record the parsed value of an attribute, and its source text if the
    /// two differ.
    pub fn record_attribute(&mut self, name: &str, value: Option<&str>, source: Option<&str>) {
        self.a
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value.map(str::to_string));
        if let Some(src) = source {
            if Some(src) != value {
                self.sa
                    .get_or_insert_with(BTreeMap::new)
                    .insert(name.to_string(), Some(src.to_string()));
            }
        }
    }
}

/// Body of an extension tag as carried in `data-mw`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MwBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extsrc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// Structured template/extension payload (`data-mw`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataMw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MwBody>,
    /// Template invocation parts, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<Value>>,
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

impl DataMw {
    pub fn is_empty(&self) -> bool {
        *self == DataMw::default()
    }
}

/// Kind of edit recorded in a diff mark. Kinds this crate does not know
/// are kept verbatim so they survive a load and save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiffChange {
    Inserted,
    Modified,
    ModifiedWrapper,
    Deleted,
    DeletedChild,
    ChildrenChanged,
    SubtreeChanged,
    Other(String),
}

impl From<String> for DiffChange {
    fn from(s: String) -> Self {
        match s.as_str() {
            "inserted" => DiffChange::Inserted,
            "modified" => DiffChange::Modified,
            "modified-wrapper" => DiffChange::ModifiedWrapper,
            "deleted" => DiffChange::Deleted,
            "deleted-child" => DiffChange::DeletedChild,
            "children-changed" => DiffChange::ChildrenChanged,
            "subtree-changed" => DiffChange::SubtreeChanged,
            _ => DiffChange::Other(s),
        }
    }
}

impl From<DiffChange> for String {
    fn from(c: DiffChange) -> Self {
        match c {
            DiffChange::Inserted => "inserted".into(),
            DiffChange::Modified => "modified".into(),
            DiffChange::ModifiedWrapper => "modified-wrapper".into(),
            DiffChange::Deleted => "deleted".into(),
            DiffChange::DeletedChild => "deleted-child".into(),
            DiffChange::ChildrenChanged => "children-changed".into(),
            DiffChange::SubtreeChanged => "subtree-changed".into(),
            DiffChange::Other(s) => s,
        }
    }
}

/// Per-node record of edits since a reference revision (`data-parsoid-diff`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffMark {
    /// Revision the changes were computed against
    pub id: RevisionId,
    #[serde(rename = "diff", default)]
    pub changes: SmallVec<[DiffChange; 2]>,
}

impl DiffMark {
    pub fn new(id: RevisionId, change: DiffChange) -> Self {
        let mut changes = SmallVec::new();
        changes.push(change);
        Self { id, changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn contains(&self, change: &DiffChange) -> bool {
        self.changes.contains(change)
    }
}

/// Sidecar record attached to an element.
///
/// `None` in a typed field means "not loaded yet"; loading substitutes a
/// default when the hidden attribute is missing or malformed.
#[derive(Debug, Clone, Default)]
pub struct NodeData {
    pub parsoid: Option<DataParsoid>,
    pub mw: Option<DataMw>,
    pub diff: Option<DiffMark>,
    /// Other serialized namespaces, keyed by name without the `data-` prefix
    pub extra: BTreeMap<String, Value>,
    /// `tmp_` scratch entries, keyed by full name
    pub tmp: BTreeMap<String, Value>,
}

/// `mw:` type families that mark special markup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MwType {
    Transclusion,
    Extension,
    Image,
    ExpandedAttrs,
    Nowiki,
    Entity,
    DiffMarker,
    DomFragment,
    Placeholder,
    Param,
}

impl MwType {
    pub fn as_str(self) -> &'static str {
        match self {
            MwType::Transclusion => "Transclusion",
            MwType::Extension => "Extension",
            MwType::Image => "Image",
            MwType::ExpandedAttrs => "ExpandedAttrs",
            MwType::Nowiki => "Nowiki",
            MwType::Entity => "Entity",
            MwType::DiffMarker => "DiffMarker",
            MwType::DomFragment => "DOMFragment",
            MwType::Placeholder => "Placeholder",
            MwType::Param => "Param",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Transclusion" => MwType::Transclusion,
            "Extension" => MwType::Extension,
            "Image" => MwType::Image,
            "ExpandedAttrs" => MwType::ExpandedAttrs,
            "Nowiki" => MwType::Nowiki,
            "Entity" => MwType::Entity,
            "DiffMarker" => MwType::DiffMarker,
            "DOMFragment" => MwType::DomFragment,
            "Placeholder" => MwType::Placeholder,
            "Param" => MwType::Param,
            _ => return None,
        })
    }
}

/// One entry of a `typeof` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    /// `mw:<Kind>` or `mw:<Kind>/<sub>`
    Mw { kind: MwType, sub: Option<String> },
    Other(String),
}

impl TypeTag {
    pub fn mw(kind: MwType) -> Self {
        TypeTag::Mw { kind, sub: None }
    }

    pub fn mw_sub(kind: MwType, sub: impl Into<String>) -> Self {
        TypeTag::Mw {
            kind,
            sub: Some(sub.into()),
        }
    }

    pub fn parse(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix("mw:") {
            let (name, sub) = match rest.split_once('/') {
                Some((name, sub)) => (name, Some(sub)),
                None => (rest, None),
            };
            if let Some(kind) = MwType::from_name(name) {
                if sub != Some("") {
                    return TypeTag::Mw {
                        kind,
                        sub: sub.map(str::to_string),
                    };
                }
            }
        }
        TypeTag::Other(s.to_string())
    }

    pub fn kind(&self) -> Option<MwType> {
        match self {
            TypeTag::Mw { kind, .. } => Some(*kind),
            TypeTag::Other(_) => None,
        }
    }

    pub fn sub(&self) -> Option<&str> {
        match self {
            TypeTag::Mw { sub, .. } => sub.as_deref(),
            TypeTag::Other(_) => None,
        }
    }

    /// True for end markers such as `mw:Transclusion/End`
    pub fn is_end(&self) -> bool {
        self.sub().is_some_and(|s| s == "End" || s.ends_with("/End"))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Mw { kind, sub: None } => write!(f, "mw:{}", kind.as_str()),
            TypeTag::Mw {
                kind,
                sub: Some(sub),
            } => write!(f, "mw:{}/{}", kind.as_str(), sub),
            TypeTag::Other(s) => f.write_str(s),
        }
    }
}

/// Parsed `typeof` attribute: a whitespace separated tag list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeOf(SmallVec<[TypeTag; 2]>);

impl TypeOf {
    pub fn parse(s: &str) -> Self {
        TypeOf(s.split_whitespace().map(TypeTag::parse).collect())
    }

    pub fn has(&self, kind: MwType) -> bool {
        self.find(kind).is_some()
    }

    pub fn find(&self, kind: MwType) -> Option<&TypeTag> {
        self.0.iter().find(|t| t.kind() == Some(kind))
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.0.contains(tag)
    }

    /// Add a tag unless already present
    pub fn add(&mut self, tag: TypeTag) {
        if !self.0.contains(&tag) {
            self.0.push(tag);
        }
    }

    pub fn remove(&mut self, tag: &TypeTag) {
        self.0.retain(|t| t != tag);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeTag> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TypeOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", tag)?;
        }
        Ok(())
    }
}

/// A DOM node stored in the document arena
///
/// Tree links are private to the crate so that only `Document` can keep
/// them consistent.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Lowercase tag name for elements, `#text`/`#comment`/`#document` otherwise
    pub name: String,
    /// Character data for text and comment nodes
    pub value: String,
    pub attributes: Attributes,

    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) prev_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,

    pub(crate) data: Option<Box<NodeData>>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            value: String::new(),
            attributes: Attributes::new(),
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            data: None,
        }
    }

    /// Get tag name for element nodes
    pub fn tag_name(&self) -> Option<&str> {
        if self.kind == NodeKind::Element {
            Some(&self.name)
        } else {
            None
        }
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    pub fn is_comment(&self) -> bool {
        self.kind == NodeKind::Comment
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)
    }

    pub fn type_of(&self) -> TypeOf {
        self.attr("typeof").map(TypeOf::parse).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.last_child
    }

    pub fn prev_sibling(&self) -> Option<NodeId> {
        self.prev_sibling
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }

    pub fn has_children(&self) -> bool {
        self.first_child.is_some()
    }
}

/// Block-level tags (paragraph wrapping and block detection)
pub const BLOCK_TAGS: &[&str] = &[
    "div", "p", "table", "tbody", "thead", "tfoot", "caption", "th", "tr", "td", "ul", "ol",
    "li", "dl", "dt", "dd", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "pre", "blockquote",
    "center", "address", "form", "fieldset", "figure", "figcaption", "legend", "style",
    "object", "embed", "map", "noscript", "menu", "dir", "section", "article", "aside",
    "header", "footer", "nav", "main",
];

/// HTML formatting elements (adoption agency set)
pub const FORMATTING_TAGS: &[&str] = &[
    "a", "b", "big", "code", "em", "font", "i", "nobr", "s", "small", "strike", "strong", "tt",
    "u",
];

/// Elements that never have an end tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];
