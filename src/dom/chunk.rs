//! Content chunks: the unit the pruning pipeline selects and compresses.
//!
//! Chunk decomposition itself lives in the pruning pipeline (it is fused with
//! the semantic filter so removed subtrees never materialize); this module
//! defines the chunk model and the tag classification tables it runs on.

use indexmap::IndexMap;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};

/// Semantic role of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkType {
    Heading,
    Paragraph,
    List,
    Table,
    Form,
    Media,
    Card,
    Code,
    /// Extracted structured-data island (JSON-LD / OG); always kept
    Meta,
    /// React-server-component payload fragment; always kept
    RscData,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Heading => "HEADING",
            ChunkType::Paragraph => "PARAGRAPH",
            ChunkType::List => "LIST",
            ChunkType::Table => "TABLE",
            ChunkType::Form => "FORM",
            ChunkType::Media => "MEDIA",
            ChunkType::Card => "CARD",
            ChunkType::Code => "CODE",
            ChunkType::Meta => "META",
            ChunkType::RscData => "RSC_DATA",
        }
    }
}

/// One unit of compressed content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlChunk {
    /// Semantic role
    pub chunk_type: ChunkType,

    /// Sanitized text (entities decoded, control chars stripped)
    pub text: String,

    /// Pruning score; deterministic in the input
    pub weight: f64,

    /// Carried-forward attributes needed by downstream extractors
    /// (`itemprop`, price/rating `class` substrings, `aria-label`, ...)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: IndexMap<String, String>,

    /// XPath of the chunk's element
    pub xpath: String,

    /// XPath of the parent, for parent-context decisions
    pub xpath_prefix: String,

    /// Tag name of the chunk's element
    pub tag: String,

    /// Whether the chunk sits inside `<main>` or `<article>`
    pub in_main: bool,
}

impl HtmlChunk {
    /// Create a chunk; weight starts at the type's base and is adjusted by
    /// the pipeline.
    pub fn new(chunk_type: ChunkType, text: impl Into<String>, xpath: impl Into<String>) -> Self {
        let xpath = xpath.into();
        let xpath_prefix = parent_xpath(&xpath);
        Self {
            chunk_type,
            text: text.into(),
            weight: 1.0,
            attrs: IndexMap::new(),
            xpath,
            xpath_prefix,
            tag: String::new(),
            in_main: false,
        }
    }

    /// Builder method: set tag name
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Builder method: set main-content flag
    pub fn with_in_main(mut self, in_main: bool) -> Self {
        self.in_main = in_main;
        self
    }

    /// Builder method: set weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Builder method: add a carried-forward attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Attribute lookup
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// True if this chunk carries the given `itemprop`
    pub fn has_itemprop(&self, prop: &str) -> bool {
        self.attr("itemprop") == Some(prop)
    }
}

/// Drop the last path step of an XPath
pub fn parent_xpath(xpath: &str) -> String {
    match xpath.rfind('/') {
        Some(0) | None => String::new(),
        Some(pos) => xpath[..pos].to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tag classification tables
// ---------------------------------------------------------------------------

/// Tags removed entirely (script islands are harvested before this applies)
pub const REMOVE_TAGS: &[&str] = &[
    "script", "style", "svg", "noscript", "link", "path", "defs", "iframe", "template", "meta",
    "head", "br", "hr",
];

/// Inline tags that never form their own chunk
pub const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "del", "dfn", "em", "i", "ins", "kbd",
    "mark", "q", "rp", "rt", "ruby", "s", "samp", "small", "span", "strong", "sub", "sup", "time",
    "u", "var", "wbr", "img", "label",
];

/// Atomic boundary: the whole subtree becomes one chunk of the given type
pub fn atomic_chunk_type(tag: &str) -> Option<ChunkType> {
    match tag {
        "table" | "thead" | "tbody" => Some(ChunkType::Table),
        "ul" | "ol" | "dl" => Some(ChunkType::List),
        "figure" | "video" | "audio" | "picture" => Some(ChunkType::Media),
        "form" | "fieldset" => Some(ChunkType::Form),
        "pre" => Some(ChunkType::Code),
        _ => None,
    }
}

/// Heading tags h1–h6
pub fn is_heading_tag(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Containers the decomposition recurses into
pub fn is_container_tag(tag: &str) -> bool {
    matches!(
        tag,
        "article"
            | "section"
            | "main"
            | "aside"
            | "nav"
            | "header"
            | "footer"
            | "div"
            | "body"
            | "html"
            | "details"
            | "dialog"
            | "li"
            | "td"
            | "th"
            | "tr"
    )
}

pub fn is_inline_tag(tag: &str) -> bool {
    INLINE_TAGS.contains(&tag)
}

pub fn is_removed_tag(tag: &str) -> bool {
    REMOVE_TAGS.contains(&tag)
}

// Class substrings that justify keeping a `class` attribute through Stage 1
const SEMANTIC_CLASS_HINTS: &[&str] = &["price", "rating", "review", "product", "card", "item"];

/// Extract the attributes a chunk carries forward.
///
/// Stage-1 attribute stripping: everything is dropped except semantic
/// microdata/ARIA attributes, `data-price`/`data-value`, and `class` values
/// containing price/rating/product hints.
pub fn semantic_attrs(el: &ElementRef<'_>) -> IndexMap<String, String> {
    let mut attrs = IndexMap::new();
    for key in [
        "role",
        "aria-label",
        "itemprop",
        "itemtype",
        "property",
        "content",
        "datetime",
        "href",
        "src",
        "alt",
        "title",
        "data-price",
        "data-value",
    ] {
        if let Some(value) = el.value().attr(key) {
            if !value.is_empty() {
                attrs.insert(key.to_string(), value.to_string());
            }
        }
    }
    if let Some(class) = el.value().attr("class") {
        let lower = class.to_ascii_lowercase();
        if SEMANTIC_CLASS_HINTS.iter().any(|hint| lower.contains(hint)) {
            attrs.insert("class".to_string(), class.to_string());
        }
    }
    attrs
}
