//! Stage 3 semantic filtering, fused with chunk decomposition.
//!
//! The traversal walks the body once; subtrees the filter rejects are never
//! decomposed, so removal is free. Rules, in order:
//!
//! - removed tags and hidden elements are skipped outright
//! - class/id noise patterns (ads, banners, popups) drop a subtree
//! - `<nav>`/`<footer>`/`<aside>` subtrees are dropped **except** when they
//!   contain an interactable already referenced by the detector (AOM rule);
//!   rescued nodes are subtracted from the removal counter
//! - a link-density penalty (`links_text / total_text > 0.8`) drops a
//!   subtree, with two exemptions: the grid whitelist (`ul`/`ol`/`table`/
//!   `tbody` and `<section>` with ≥ 3 structurally similar children), and
//!   `<p>` inside `<article>`/`<main>` carrying > 80 chars of non-link text

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;

use crate::dom::chunk::{
    atomic_chunk_type, is_container_tag, is_heading_tag, is_inline_tag, is_removed_tag,
    semantic_attrs, ChunkType, HtmlChunk,
};
use crate::dom::{self, NormalizedDom};
use crate::sanitize::sanitize_text_with_limit;

/// Link-density threshold above which a subtree is removed
pub const LINK_DENSITY_THRESHOLD: f64 = 0.8;

/// Non-link chars that spare a `<p>` inside `<article>`/`<main>`
pub const PARAGRAPH_EXEMPTION_CHARS: usize = 80;

/// Similar-children floor for the `<section>` grid whitelist
pub const GRID_MIN_SIMILAR_CHILDREN: usize = 3;

const MAX_DECOMPOSE_DEPTH: usize = 100;

// Chunk text fields cap well above the short-field limit; structure matters
const CHUNK_TEXT_MAX: usize = 4000;

// Class/id noise patterns
static NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bad[-_]?\b",
        r"(?i)\badvertis",
        r"(?i)\bsponsor",
        r"(?i)\bbanner\b",
        r"(?i)\brecommend",
        r"(?i)\bsidebar\b",
        r"(?i)\bpopup\b",
        r"(?i)\bmodal\b",
        r"(?i)\bcookie\b",
        r"(?i)\btracking\b",
        r"(?i)\boverlay\b",
        r"(?i)\bpromo",
        r"(?i)\btoast\b",
        r"(?i)\bsnackbar\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Statistics from the filtering pass
#[derive(Debug, Clone, Default)]
pub struct FilterStats {
    pub total_nodes: usize,
    pub removed_nodes: usize,
    pub rescued_nodes: usize,
    pub removal_reasons: IndexMap<&'static str, usize>,
}

impl FilterStats {
    fn record(&mut self, reason: &'static str) {
        self.removed_nodes += 1;
        *self.removal_reasons.entry(reason).or_insert(0) += 1;
    }
}

struct Walker<'a> {
    rescue_names: &'a [String],
    stats: FilterStats,
    chunks: Vec<HtmlChunk>,
}

fn noise_match_count(el: &ElementRef<'_>) -> usize {
    let class = el.value().attr("class").unwrap_or("");
    let id = el.value().attr("id").unwrap_or("");
    if class.is_empty() && id.is_empty() {
        return 0;
    }
    let haystack = format!("{class} {id}");
    NOISE_PATTERNS.iter().filter(|p| p.is_match(&haystack)).count()
}

fn link_text_len(el: &ElementRef<'_>) -> usize {
    let mut total = 0;
    for descendant in el.descendants().filter_map(ElementRef::wrap) {
        if descendant.value().name() == "a" {
            total += dom::text_content(&descendant).chars().count();
        }
    }
    total
}

/// links_text / total_text for a subtree; 0.0 when empty
fn link_density(el: &ElementRef<'_>) -> f64 {
    let total = dom::text_content(el).chars().count();
    if total == 0 {
        return 0.0;
    }
    (link_text_len(el) as f64 / total as f64).min(1.0)
}

/// Grid whitelist: list/table containers plus `<section>` with ≥ 3
/// same-tag children — exempt from the link-density penalty entirely.
fn is_grid_whitelisted(el: &ElementRef<'_>) -> bool {
    let tag = el.value().name();
    if matches!(tag, "ul" | "ol" | "table" | "tbody") {
        return true;
    }
    if tag == "section" {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for child in el.children().filter_map(ElementRef::wrap) {
            *counts.entry(child.value().name()).or_insert(0) += 1;
        }
        return counts.values().any(|&n| n >= GRID_MIN_SIMILAR_CHILDREN);
    }
    false
}

fn in_main_context(xpath: &str) -> bool {
    xpath.contains("/main") || xpath.contains("/article")
}

/// Should a landmark subtree be rescued because it contains a referenced
/// interactable (the AOM rule)?
fn contains_referenced_interactable(el: &ElementRef<'_>, rescue_names: &[String]) -> bool {
    if rescue_names.is_empty() {
        return false;
    }
    let text = dom::text_content(el).to_lowercase();
    let mut aria: String = String::new();
    for descendant in el.descendants().filter_map(ElementRef::wrap) {
        if let Some(label) = descendant.value().attr("aria-label") {
            aria.push_str(&label.to_lowercase());
            aria.push(' ');
        }
    }
    rescue_names
        .iter()
        .any(|name| text.contains(name.as_str()) || aria.contains(name.as_str()))
}

impl<'a> Walker<'a> {
    fn emit(&mut self, el: &ElementRef<'_>, chunk_type: ChunkType, xpath: &str, in_main: bool) {
        let text = sanitize_text_with_limit(&dom::text_content(el), CHUNK_TEXT_MAX);
        if text.is_empty() {
            return;
        }
        let tag = el.value().name().to_string();
        let mut weight = match chunk_type {
            ChunkType::Heading => {
                if tag == "h1" {
                    2.5
                } else {
                    2.0
                }
            }
            ChunkType::Paragraph | ChunkType::List | ChunkType::Table | ChunkType::Form => 1.0,
            ChunkType::Card => 1.2,
            ChunkType::Code => 0.8,
            ChunkType::Media => 0.6,
            ChunkType::Meta | ChunkType::RscData => 10.0,
        };
        let attrs = semantic_attrs(el);
        if attrs.contains_key("itemprop") {
            weight += 1.0;
        }
        if attrs
            .get("class")
            .map(|c| c.to_ascii_lowercase().contains("price"))
            .unwrap_or(false)
            || attrs.contains_key("data-price")
        {
            weight += 1.0;
        }
        if in_main {
            weight += 0.5;
        }

        let mut chunk = HtmlChunk::new(chunk_type, text, xpath)
            .with_tag(tag)
            .with_in_main(in_main)
            .with_weight(weight);
        chunk.attrs = attrs;
        self.chunks.push(chunk);
    }

    fn walk(&mut self, el: ElementRef<'_>, xpath: &str, in_main: bool, in_grid: bool, depth: usize) {
        if depth > MAX_DECOMPOSE_DEPTH {
            log::warn!("max decomposition depth exceeded at {xpath}, skipping subtree");
            return;
        }
        let tag = el.value().name();
        self.stats.total_nodes += 1;

        if is_removed_tag(tag) {
            return;
        }

        // The page skeleton is never removed, whatever its density
        let protected = matches!(tag, "html" | "body" | "main" | "article");

        if !protected {
            if let Some(reason) = dom::hidden_element(&el) {
                self.stats.record(reason.as_str());
                return;
            }
            if noise_match_count(&el) >= 2 {
                self.stats.record("noise-pattern");
                return;
            }

            // Landmark removal with the AOM rescue
            let is_landmark = matches!(tag, "nav" | "aside" | "footer")
                || matches!(
                    el.value().attr("role"),
                    Some("navigation") | Some("complementary") | Some("contentinfo")
                );
            if is_landmark {
                if contains_referenced_interactable(&el, self.rescue_names) {
                    self.stats.rescued_nodes += 1;
                } else {
                    self.stats.record("landmark");
                    return;
                }
            }
        }

        // Link-density penalty with grid/paragraph exemptions
        let grid_here = in_grid || is_grid_whitelisted(&el);
        if !protected && !grid_here {
            let density = link_density(&el);
            if density > LINK_DENSITY_THRESHOLD {
                let text_len = dom::text_content(&el).chars().count();
                let non_link = text_len.saturating_sub(link_text_len(&el));
                let spared = tag == "p"
                    && in_main_context(xpath)
                    && non_link > PARAGRAPH_EXEMPTION_CHARS;
                if !spared && text_len > 0 {
                    self.stats.record("link-density");
                    return;
                }
            }
        }

        let now_in_main = in_main || tag == "main" || tag == "article";

        // Inline elements never chunk on their own, except microdata
        // carriers, which downstream extraction needs.
        if is_inline_tag(tag) {
            let attrs = semantic_attrs(&el);
            if attrs.contains_key("itemprop")
                || attrs.contains_key("property")
                || attrs.contains_key("data-price")
            {
                self.emit(&el, ChunkType::Paragraph, xpath, now_in_main);
            }
            return;
        }

        // Atomic boundary: whole subtree is one chunk
        if let Some(chunk_type) = atomic_chunk_type(tag) {
            self.emit(&el, chunk_type, xpath, now_in_main);
            return;
        }
        if is_heading_tag(tag) {
            self.emit(&el, ChunkType::Heading, xpath, now_in_main);
            return;
        }
        if tag == "p" {
            self.emit(&el, ChunkType::Paragraph, xpath, now_in_main);
            return;
        }

        let has_block_children = el
            .children()
            .filter_map(ElementRef::wrap)
            .any(|c| !is_inline_tag(c.value().name()));

        if is_container_tag(tag) || !is_inline_tag(tag) {
            if has_block_children {
                let mut sibling_counts: IndexMap<String, usize> = IndexMap::new();
                for child in el.children().filter_map(ElementRef::wrap) {
                    let child_tag = child.value().name().to_string();
                    let index = sibling_counts.entry(child_tag.clone()).or_insert(0);
                    *index += 1;
                    let child_xpath = format!("{xpath}/{child_tag}[{index}]");
                    self.walk(child, &child_xpath, now_in_main, grid_here, depth + 1);
                }
            } else {
                // Leaf container with only inline content: card when it
                // carries product-ish attrs, plain paragraph otherwise.
                let chunk_type = if semantic_attrs(&el)
                    .get("class")
                    .map(|c| {
                        let lower = c.to_ascii_lowercase();
                        lower.contains("card") || lower.contains("item") || lower.contains("product")
                    })
                    .unwrap_or(false)
                {
                    ChunkType::Card
                } else {
                    ChunkType::Paragraph
                };
                self.emit(&el, chunk_type, xpath, now_in_main);
            }
        }
    }
}

/// Walk the body, apply the semantic filter, and decompose the survivors
/// into chunks in document order.
pub fn filter_and_chunk(
    dom: &NormalizedDom,
    rescue_names: &[String],
) -> (Vec<HtmlChunk>, FilterStats) {
    let mut walker = Walker {
        rescue_names,
        stats: FilterStats::default(),
        chunks: Vec::new(),
    };
    if let Some(body) = dom.body() {
        walker.walk(body, "/html/body", false, false, 0);
    }
    log::debug!(
        "semantic filter: {} chunks, {}/{} nodes removed ({} rescued)",
        walker.chunks.len(),
        walker.stats.removed_nodes,
        walker.stats.total_nodes,
        walker.stats.rescued_nodes,
    );
    (walker.chunks, walker.stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageMapConfig;

    fn chunked(html: &str) -> (Vec<HtmlChunk>, FilterStats) {
        let dom = NormalizedDom::parse(html, &PageMapConfig::default()).unwrap();
        filter_and_chunk(&dom, &[])
    }

    fn texts(chunks: &[HtmlChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_basic_decomposition() {
        let (chunks, _) = chunked(
            "<html><body><main><h1>Product Name</h1><p>A description paragraph.</p>\
             <ul><li>Item 1</li><li>Item 2</li></ul></main></body></html>",
        );
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chunk_type, ChunkType::Heading);
        assert!(chunks[0].in_main);
        assert_eq!(chunks[1].chunk_type, ChunkType::Paragraph);
        assert_eq!(chunks[2].chunk_type, ChunkType::List);
        assert!(chunks[0].weight > chunks[1].weight);
    }

    #[test]
    fn test_nav_removed_without_rescue() {
        let (chunks, stats) = chunked(
            "<html><body><nav><a href=\"/a\">Nav link</a></nav>\
             <p>Body paragraph content.</p></body></html>",
        );
        assert!(!texts(&chunks).iter().any(|t| t.contains("Nav link")));
        assert_eq!(stats.removal_reasons.get("landmark"), Some(&1));
    }

    #[test]
    fn test_nav_rescued_by_referenced_interactable() {
        let dom = NormalizedDom::parse(
            "<html><body><nav><button>Open cart</button></nav>\
             <p>Body paragraph content.</p></body></html>",
            &PageMapConfig::default(),
        )
        .unwrap();
        let rescue = vec!["open cart".to_string()];
        let (chunks, stats) = filter_and_chunk(&dom, &rescue);
        assert!(texts(&chunks).iter().any(|t| t.contains("Open cart")));
        assert_eq!(stats.rescued_nodes, 1);
        assert_eq!(stats.removal_reasons.get("landmark"), None);
    }

    #[test]
    fn test_hidden_seo_spam_removed() {
        let (chunks, stats) = chunked(
            "<html><body><div style=\"font-size:0\">BUY CHEAP PILLS</div>\
             <div style=\"font-size:0.5rem\">Fine print</div>\
             <p>Normal content here.</p></body></html>",
        );
        let all = texts(&chunks).join(" ");
        assert!(!all.contains("BUY CHEAP PILLS"));
        assert!(all.contains("Fine print"));
        assert_eq!(stats.removal_reasons.get("font-size-zero"), Some(&1));
    }

    #[test]
    fn test_link_density_removes_link_farm() {
        let links = "<a href=\"/x\">Related article link text</a>".repeat(10);
        let (chunks, stats) = chunked(&format!(
            "<html><body><div>{links}</div><p>Real paragraph text that is not links.</p></body></html>"
        ));
        let all = texts(&chunks).join(" ");
        assert!(!all.contains("Related article"));
        assert!(all.contains("Real paragraph"));
        assert!(stats.removal_reasons.get("link-density").is_some());
    }

    #[test]
    fn test_grid_whitelist_spares_link_heavy_table() {
        let rows = "<tr><td><a href=\"/p\">Product name with a long link text</a></td></tr>".repeat(10);
        let (chunks, _) = chunked(&format!(
            "<html><body><table>{rows}</table></body></html>"
        ));
        assert!(texts(&chunks).iter().any(|t| t.contains("Product name")));
    }

    #[test]
    fn test_grid_whitelist_section_with_similar_children() {
        let cards = "<div><a href=\"/i\">Card item link text here</a></div>".repeat(4);
        let (chunks, _) = chunked(&format!(
            "<html><body><section>{cards}</section></body></html>"
        ));
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_paragraph_exemption_in_article() {
        // Footnote-marker-heavy paragraph: > 0.8 of its text is links, but
        // it has > 80 chars of running prose inside an article.
        let prose = "This is a substantial paragraph of running prose that easily exceeds the \
                     eighty character exemption window for paragraphs. ";
        let links = "<a href=\"#f\">[1]</a>".repeat(400);
        let (chunks, _) = chunked(&format!(
            "<html><body><article><p>{prose}{links}</p></article></body></html>"
        ));
        assert!(texts(&chunks).iter().any(|t| t.contains("substantial paragraph")));
    }

    #[test]
    fn test_noise_class_removed() {
        let (chunks, stats) = chunked(
            "<html><body><div class=\"popup modal\"><p>Subscribe now!</p></div>\
             <p>Actual page text.</p></body></html>",
        );
        assert!(!texts(&chunks).iter().any(|t| t.contains("Subscribe")));
        assert_eq!(stats.removal_reasons.get("noise-pattern"), Some(&1));
    }

    #[test]
    fn test_card_leaf_detection() {
        let (chunks, _) = chunked(
            "<html><body><div class=\"product-card\"><span>Sneaker</span> <span>89,000원</span></div></body></html>",
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Card);
    }

    #[test]
    fn test_document_order_preserved() {
        let (chunks, _) = chunked(
            "<html><body><h2>First</h2><p>Second</p><h2>Third</h2></body></html>",
        );
        assert_eq!(texts(&chunks), vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_xpath_prefix_populated() {
        let (chunks, _) = chunked("<html><body><main><p>Text here.</p></main></body></html>");
        assert_eq!(chunks[0].xpath, "/html/body/main[1]/p[1]");
        assert_eq!(chunks[0].xpath_prefix, "/html/body/main[1]");
    }
}
