//! HTML normalization: parsing, resource guards, and hidden-content checks.
//!
//! This module provides the entry point of every pipeline pass:
//! - [`NormalizedDom::parse`]: forgiving parse with byte-size and node-count
//!   guards
//! - hidden-content detection over resolved inline styles, tuned so that
//!   `font-size:0` is caught while `font-size:0.5rem` is not
//! - text helpers shared by chunking and detection

pub mod chunk;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::config::PageMapConfig;
use crate::error::{PageMapError, ResourceKind, Result};

// Matches only true zero values: 0, 0px, 0.0em — never 0.5rem / 0.875em.
static FONT_SIZE_ZERO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)font-size\s*:\s*0+(?:\.0+)?(?:px|em|rem|%)?\s*(?:;|!|$)")
        .expect("font-size regex")
});

static OPACITY_ZERO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)opacity\s*:\s*0+(?:\.0+)?\s*(?:;|!|$)").expect("opacity regex"));

static DISPLAY_NONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)display\s*:\s*none").expect("display regex"));

static VISIBILITY_HIDDEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)visibility\s*:\s*hidden").expect("visibility regex"));

// Far off-screen positioning (classic SEO-spam hiding spot)
static OFFSCREEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:left|top|text-indent)\s*:\s*-\s*\d{4,}(?:px)?").expect("offscreen regex")
});

static BODY_SELECTOR: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("body").ok());
static HTML_SELECTOR: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("html").ok());
static TITLE_SELECTOR: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("title").ok());

/// Why an element is considered hidden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenReason {
    DisplayNone,
    VisibilityHidden,
    OpacityZero,
    FontSizeZero,
    Offscreen,
    AriaHidden,
}

impl HiddenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HiddenReason::DisplayNone => "display-none",
            HiddenReason::VisibilityHidden => "visibility-hidden",
            HiddenReason::OpacityZero => "opacity-zero",
            HiddenReason::FontSizeZero => "font-size-zero",
            HiddenReason::Offscreen => "offscreen",
            HiddenReason::AriaHidden => "aria-hidden",
        }
    }
}

/// Check an inline style string for hiding patterns
pub fn hidden_by_style(style: &str) -> Option<HiddenReason> {
    if DISPLAY_NONE_RE.is_match(style) {
        return Some(HiddenReason::DisplayNone);
    }
    if VISIBILITY_HIDDEN_RE.is_match(style) {
        return Some(HiddenReason::VisibilityHidden);
    }
    if OPACITY_ZERO_RE.is_match(style) {
        return Some(HiddenReason::OpacityZero);
    }
    if FONT_SIZE_ZERO_RE.is_match(style) {
        return Some(HiddenReason::FontSizeZero);
    }
    if OFFSCREEN_RE.is_match(style) {
        return Some(HiddenReason::Offscreen);
    }
    None
}

/// Check an element's attributes for hiding signals (inline style + ARIA)
pub fn hidden_element(el: &ElementRef<'_>) -> Option<HiddenReason> {
    if el.value().attr("aria-hidden") == Some("true") {
        return Some(HiddenReason::AriaHidden);
    }
    if el.value().attr("hidden").is_some() {
        return Some(HiddenReason::DisplayNone);
    }
    el.value().attr("style").and_then(hidden_by_style)
}

/// Collapse whitespace runs to a single space
pub fn compact_ws(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim_end().to_string()
}

/// All visible text of an element, whitespace-collapsed
pub fn text_content(el: &ElementRef<'_>) -> String {
    compact_ws(&el.text().collect::<Vec<_>>().join(" "))
}

/// A parsed page that passed the resource guards
#[derive(Debug)]
pub struct NormalizedDom {
    doc: Html,
    element_count: usize,
    html_lang: Option<String>,
    title: String,
}

impl NormalizedDom {
    /// Parse HTML with size and node-count guards.
    ///
    /// The tree builder is forgiving — parse errors never surface — but an
    /// input over `max_html_bytes` or a DOM over `max_dom_nodes` element
    /// nodes fails fast with a resource error.
    pub fn parse(html: &str, config: &PageMapConfig) -> Result<Self> {
        if html.len() > config.max_html_bytes {
            return Err(PageMapError::ResourceExhausted {
                reason: ResourceKind::HtmlSize,
                detail: format!(
                    "{} bytes exceeds limit of {} bytes",
                    html.len(),
                    config.max_html_bytes
                ),
            });
        }
        if html.trim().is_empty() {
            return Err(PageMapError::MalformedHtml("empty input".to_string()));
        }

        let doc = Html::parse_document(html);

        let element_count = doc
            .tree
            .nodes()
            .filter(|n| n.value().is_element())
            .count();
        if element_count > config.max_dom_nodes {
            return Err(PageMapError::ResourceExhausted {
                reason: ResourceKind::DomNodes,
                detail: format!(
                    "{element_count} element nodes exceeds limit of {}",
                    config.max_dom_nodes
                ),
            });
        }

        let html_lang = HTML_SELECTOR
            .as_ref()
            .and_then(|sel| doc.select(sel).next())
            .and_then(|el| el.value().attr("lang"))
            .map(|s| s.to_string());

        let title = TITLE_SELECTOR
            .as_ref()
            .and_then(|sel| doc.select(sel).next())
            .map(|el| text_content(&el))
            .unwrap_or_default();

        log::debug!("parsed DOM: {element_count} element nodes, lang={html_lang:?}");

        Ok(Self {
            doc,
            element_count,
            html_lang,
            title,
        })
    }

    /// The underlying parsed document
    pub fn document(&self) -> &Html {
        &self.doc
    }

    /// The `<body>` element, when one exists
    pub fn body(&self) -> Option<ElementRef<'_>> {
        BODY_SELECTOR
            .as_ref()
            .and_then(|sel| self.doc.select(sel).next())
    }

    /// Number of element nodes in the parsed tree
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// Value of `<html lang>`, if present
    pub fn html_lang(&self) -> Option<&str> {
        self.html_lang.as_deref()
    }

    /// Text of `<title>`, whitespace-collapsed (unsanitized)
    pub fn title(&self) -> &str {
        &self.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PageMapConfig {
        PageMapConfig::default()
    }

    #[test]
    fn test_parse_extracts_lang_and_title() {
        let dom = NormalizedDom::parse(
            "<html lang=\"ko\"><head><title> My  Page </title></head><body><p>hi</p></body></html>",
            &config(),
        )
        .unwrap();
        assert_eq!(dom.html_lang(), Some("ko"));
        assert_eq!(dom.title(), "My Page");
        assert!(dom.body().is_some());
    }

    #[test]
    fn test_size_guard() {
        let cfg = PageMapConfig::new().max_html_bytes(10);
        let err = NormalizedDom::parse("<html><body>too long</body></html>", &cfg).unwrap_err();
        match err {
            PageMapError::ResourceExhausted { reason, .. } => {
                assert_eq!(reason, ResourceKind::HtmlSize)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_node_count_guard() {
        let cfg = PageMapConfig::new().max_dom_nodes(5);
        let many_divs = format!("<html><body>{}</body></html>", "<div>x</div>".repeat(20));
        let err = NormalizedDom::parse(&many_divs, &cfg).unwrap_err();
        match err {
            PageMapError::ResourceExhausted { reason, .. } => {
                assert_eq!(reason, ResourceKind::DomNodes)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_input_is_malformed() {
        let err = NormalizedDom::parse("   ", &config()).unwrap_err();
        assert!(matches!(err, PageMapError::MalformedHtml(_)));
    }

    #[test]
    fn test_hidden_style_zero_values() {
        assert_eq!(
            hidden_by_style("font-size:0"),
            Some(HiddenReason::FontSizeZero)
        );
        assert_eq!(
            hidden_by_style("font-size: 0px;"),
            Some(HiddenReason::FontSizeZero)
        );
        assert_eq!(
            hidden_by_style("font-size:0.0em"),
            Some(HiddenReason::FontSizeZero)
        );
        assert_eq!(
            hidden_by_style("font-size:0rem;"),
            Some(HiddenReason::FontSizeZero)
        );
        assert_eq!(
            hidden_by_style("font-size:0%"),
            Some(HiddenReason::FontSizeZero)
        );
    }

    #[test]
    fn test_hidden_style_no_false_positives() {
        assert_eq!(hidden_by_style("font-size:0.5rem"), None);
        assert_eq!(hidden_by_style("font-size: 0.875em;"), None);
        assert_eq!(hidden_by_style("font-size:0.1px"), None);
        assert_eq!(hidden_by_style("font-size: 10px"), None);
        assert_eq!(hidden_by_style("opacity: 0.5"), None);
        assert_eq!(hidden_by_style("opacity: 1"), None);
    }

    #[test]
    fn test_hidden_style_classics() {
        assert_eq!(
            hidden_by_style("display:none"),
            Some(HiddenReason::DisplayNone)
        );
        assert_eq!(
            hidden_by_style("visibility: hidden;"),
            Some(HiddenReason::VisibilityHidden)
        );
        assert_eq!(
            hidden_by_style("opacity:0;"),
            Some(HiddenReason::OpacityZero)
        );
        assert_eq!(
            hidden_by_style("opacity: 0.00"),
            Some(HiddenReason::OpacityZero)
        );
        assert_eq!(
            hidden_by_style("position:absolute;left:-99999px"),
            Some(HiddenReason::Offscreen)
        );
    }

    #[test]
    fn test_hidden_element_aria() {
        let doc = Html::parse_document(
            "<html><body><div aria-hidden=\"true\">x</div><div>y</div></body></html>",
        );
        let sel = Selector::parse("div").unwrap();
        let mut divs = doc.select(&sel);
        let hidden = divs.next().unwrap();
        let visible = divs.next().unwrap();
        assert_eq!(hidden_element(&hidden), Some(HiddenReason::AriaHidden));
        assert_eq!(hidden_element(&visible), None);
    }

    #[test]
    fn test_compact_ws() {
        assert_eq!(compact_ws("  a \n\t b  c "), "a b c");
        assert_eq!(compact_ws(""), "");
    }
}
