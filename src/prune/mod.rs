//! The five-stage pruning pipeline.
//!
//! Stage 1 (attribute strip) and stage 4 (schema-aware chunking) are fused
//! into the filtering walk; stage 2 (script islands) runs on the raw HTML
//! before anything is deleted; stage 3 is the semantic filter; stage 5
//! selects chunks greedily under the token budget and hands them to the
//! page-type compressor.
//!
//! Every sub-stage failure that does not invalidate the rest of the pass is
//! recorded as a warning, never raised. Cancellation and the per-pass
//! timeout are checked between stages.

pub mod compress;
pub mod filter;

use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::classify::{BlockedKind, PageType};
use crate::config::PageMapConfig;
use crate::dom::chunk::{ChunkType, HtmlChunk};
use crate::error::{PageMapError, Result};
use crate::extract::Metadata;
use crate::locale::TokenBudgeter;
use crate::sanitize::sanitize_block;
use crate::script;

pub use filter::FilterStats;

/// Minimum-Content-Guarantee floor: output under this many tokens triggers
/// the fallback cascade.
pub const MCG_FLOOR_TOKENS: usize = 10;

/// Telemetry from one pruning pass
#[derive(Debug, Clone, Default)]
pub struct PruneStats {
    pub raw_tokens: usize,
    pub pruned_tokens: usize,
    pub reduction_pct: f64,
    pub chunk_total: usize,
    pub chunk_selected: usize,
    pub language_removed: usize,
    pub language_tagged: usize,
    pub filter: FilterStats,
}

/// Result of one pruning pass
#[derive(Debug, Clone, Default)]
pub struct PruneOutcome {
    /// The rendered `Info` block
    pub context: String,
    /// Token estimate of `context`
    pub tokens: usize,
    /// Chunks that survived stage 5 selection
    pub selected_chunks: Vec<HtmlChunk>,
    pub stats: PruneStats,
    pub warnings: Vec<String>,
}

/// Inputs that stay fixed across a pass.
///
/// Chunks come pre-built (see [`filter::filter_and_chunk`]) so the caller
/// can run metadata extraction over them before compression.
pub struct PruneRequest<'a> {
    pub chunks: &'a [HtmlChunk],
    pub filter_stats: FilterStats,
    pub raw_html: &'a str,
    pub page_type: PageType,
    pub metadata: &'a Metadata,
    pub meta_chunks: &'a [HtmlChunk],
    pub budgeter: &'a TokenBudgeter,
    pub blocked_kind: Option<BlockedKind>,
    pub verify_ref: Option<u32>,
}

fn check_stage(
    cancel: &CancellationToken,
    started: Instant,
    config: &PageMapConfig,
    stage: &'static str,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PageMapError::Cancelled { stage });
    }
    if started.elapsed() > config.pipeline_timeout {
        return Err(PageMapError::PipelineTimeout {
            stage,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }
    Ok(())
}

/// Run stage 5 (selection + compression) over pre-filtered chunks.
pub fn prune_pipeline(
    request: &PruneRequest<'_>,
    config: &PageMapConfig,
    cancel: &CancellationToken,
) -> Result<PruneOutcome> {
    let started = Instant::now();
    let mut outcome = PruneOutcome::default();
    outcome.stats.raw_tokens = request.budgeter.estimate(request.raw_html);
    outcome.stats.filter = request.filter_stats.clone();

    // Stage-4 page-type weighting
    check_stage(cancel, started, config, "chunk_weighting")?;
    let mut chunks: Vec<HtmlChunk> = request.chunks.to_vec();
    for chunk in &mut chunks {
        chunk.weight *= compress::type_multiplier(request.page_type, chunk);
    }
    outcome.stats.chunk_total = chunks.len() + request.meta_chunks.len();

    if chunks.is_empty() {
        outcome
            .warnings
            .push("no content chunks survived filtering".to_string());
    }

    // Stage 5a: greedy selection by descending weight, then document order
    check_stage(cancel, started, config, "chunk_selection")?;
    let budget = config.max_pruned_tokens;
    let mut order: Vec<(usize, &HtmlChunk)> = chunks.iter().enumerate().collect();
    order.sort_by(|a, b| {
        b.1.weight
            .partial_cmp(&a.1.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    let mut selected_idx: Vec<usize> = Vec::new();
    let mut used = 0usize;
    for (i, chunk) in order {
        let cost = request.budgeter.estimate(&chunk.text);
        if used + cost > budget {
            continue;
        }
        used += cost;
        selected_idx.push(i);
    }
    selected_idx.sort_unstable();
    let selected: Vec<HtmlChunk> = selected_idx.into_iter().map(|i| chunks[i].clone()).collect();
    outcome.stats.chunk_selected = selected.len();

    // Stage 5b: schema-aware compression
    check_stage(cancel, started, config, "compression")?;
    let input = compress::CompressInput {
        chunks: &selected,
        metadata: request.metadata,
        locale: request.budgeter.locale(),
        budgeter: request.budgeter,
        budget,
        raw_html: request.raw_html,
        blocked_kind: request.blocked_kind,
        verify_ref: request.verify_ref,
    };
    let mut context = compress::compress(request.page_type, &input);

    // Script-based language filter
    if config.language_filter_enabled && !context.is_empty() {
        let lines: Vec<String> = context.lines().map(str::to_string).collect();
        let filtered = script::filter_lines(&lines, None);
        outcome.stats.language_removed = filtered.removed;
        outcome.stats.language_tagged = filtered.tagged;
        if filtered.removed > 0 {
            outcome.warnings.push(format!(
                "language filter removed {} foreign-script line(s)",
                filtered.removed
            ));
        }
        context = filtered.lines.join("\n");
    }

    context = sanitize_block(&context);

    // Minimum-Content-Guarantee cascade
    if request.budgeter.estimate(&context) < MCG_FLOOR_TOKENS
        && request.page_type != PageType::Blocked
    {
        context = mcg_fallback(request, &selected, &mut outcome.warnings);
    }

    outcome.tokens = request.budgeter.estimate(&context);
    outcome.stats.pruned_tokens = outcome.tokens;
    if outcome.stats.raw_tokens > 0 {
        outcome.stats.reduction_pct =
            (1.0 - outcome.tokens as f64 / outcome.stats.raw_tokens as f64) * 100.0;
    }
    outcome.selected_chunks = selected;
    outcome.context = context;

    log::info!(
        "pruning: {} -> {} tokens ({:.1}% reduction), {}/{} chunks",
        outcome.stats.raw_tokens,
        outcome.tokens,
        outcome.stats.reduction_pct,
        outcome.stats.chunk_selected,
        outcome.stats.chunk_total,
    );

    Ok(outcome)
}

static TAG_STRIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag strip regex"));

/// Fall through: OG description → surviving chunk text → raw-HTML text head.
fn mcg_fallback(
    request: &PruneRequest<'_>,
    selected: &[HtmlChunk],
    warnings: &mut Vec<String>,
) -> String {
    warnings.push("minimum-content guarantee triggered".to_string());

    for og_key in ["og:description", "meta:description"] {
        if let Some(chunk) = request.meta_chunks.iter().find(|c| c.attr(og_key).is_some()) {
            let description = sanitize_block(chunk.attr(og_key).unwrap_or_default());
            if request.budgeter.estimate(&description) >= MCG_FLOOR_TOKENS {
                warnings.push("fallback: og description".to_string());
                return description;
            }
        }
    }

    let joined = selected
        .iter()
        .filter(|c| !matches!(c.chunk_type, ChunkType::Meta | ChunkType::RscData))
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if request.budgeter.estimate(&joined) >= MCG_FLOOR_TOKENS {
        warnings.push("fallback: surviving chunk text".to_string());
        return joined;
    }

    warnings.push("fallback: raw html head".to_string());
    let stripped = TAG_STRIP_RE.replace_all(request.raw_html, " ");
    let head: String = sanitize_block(&stripped).chars().take(2000).collect();
    head.trim().to_string()
}

// ---------------------------------------------------------------------------
// Image extraction
// ---------------------------------------------------------------------------

static IMG_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*?>").expect("img tag regex"));
static IMG_SRC_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)\bsrc=["']([^"']+)["']"#,
        r#"(?i)\bdata-src=["']([^"']+)["']"#,
        r#"(?i)\bdata-lazy-src=["']([^"']+)["']"#,
        r#"(?i)\bdata-original=["']([^"']+)["']"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});
static SRCSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bsrcset=["']([^"']+)["']"#).expect("srcset regex"));
static PRODUCT_IMG_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(product|goods|item|detail|gallery|pdp|zoom|main[-_]?img|swiper|slide|hero|primary)")
        .expect("img hint regex")
});
static EXCLUDE_IMG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(icon|logo|banner|sprite|ad[_\-]|tracking|pixel|1x1|spacer|blank|svg\+xml)")
        .expect("img exclude regex")
});

/// Extract likely content-image URLs from raw HTML.
///
/// Harvests `src`/`data-src`/`srcset` (largest candidate), drops icons,
/// sprites and pixels, resolves relative URLs against the page URL,
/// deduplicates, and puts hinted product imagery first. Capped at 10.
pub fn extract_images(raw_html: &str, base_url: &str) -> Vec<String> {
    let base = url::Url::parse(base_url).ok();
    let mut hinted: Vec<String> = Vec::new();
    let mut plain: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for tag in IMG_TAG_RE.find_iter(raw_html) {
        let tag = tag.as_str();
        let has_hint = PRODUCT_IMG_HINT_RE.is_match(tag);

        let mut urls: Vec<String> = Vec::new();
        for re in IMG_SRC_RES.iter() {
            if let Some(caps) = re.captures(tag) {
                urls.push(caps[1].to_string());
            }
        }
        if let Some(caps) = SRCSET_RE.captures(tag) {
            // Last srcset entry is conventionally the largest width
            if let Some(largest) = caps[1]
                .split(',')
                .filter_map(|part| part.trim().split_whitespace().next())
                .filter(|u| !u.is_empty())
                .last()
            {
                urls.push(largest.to_string());
            }
        }

        for url in urls {
            let url = url.trim();
            if url.is_empty() || url.starts_with("data:") {
                continue;
            }
            if EXCLUDE_IMG_RE.is_match(url) {
                continue;
            }
            let resolved = if url.starts_with("//") {
                format!("https:{url}")
            } else if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else if let Some(base) = &base {
                match base.join(url) {
                    Ok(joined) => joined.to_string(),
                    Err(_) => continue,
                }
            } else {
                continue;
            };
            if !crate::extract::valid_image_url(&resolved) {
                continue;
            }
            if seen.contains(&resolved) {
                continue;
            }
            seen.push(resolved.clone());
            if has_hint {
                hinted.push(resolved);
            } else {
                plain.push(resolved);
            }
        }
    }

    hinted.into_iter().chain(plain).take(10).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NormalizedDom;
    use crate::extract::extract_script_islands;
    use crate::locale::Locale;

    fn run(html: &str, page_type: PageType, budget: usize) -> PruneOutcome {
        let config = PageMapConfig::default().max_pruned_tokens(budget);
        let dom = NormalizedDom::parse(html, &config).unwrap();
        let budgeter = TokenBudgeter::new(Locale::En);
        let meta_chunks = extract_script_islands(html);
        let metadata = Metadata::default();
        let (chunks, filter_stats) = filter::filter_and_chunk(&dom, &[]);
        let request = PruneRequest {
            chunks: &chunks,
            filter_stats,
            raw_html: html,
            page_type,
            metadata: &metadata,
            meta_chunks: &meta_chunks,
            budgeter: &budgeter,
            blocked_kind: None,
            verify_ref: None,
        };
        prune_pipeline(&request, &config, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_pipeline_basic_article() {
        let html = "<html><body><article><h1>Heading One</h1>\
                    <p>First paragraph with enough words to pass the length gates easily.</p>\
                    <p>Second paragraph, also carrying a reasonable amount of content.</p>\
                    </article></body></html>";
        let outcome = run(html, PageType::Article, 500);
        assert!(outcome.context.contains("Heading One"));
        assert!(outcome.context.contains("First paragraph"));
        assert!(outcome.tokens > 0);
        assert!(outcome.stats.chunk_selected > 0);
    }

    #[test]
    fn test_hidden_spam_absent_from_context() {
        let html = "<html><body>\
                    <div style=\"font-size:0\">BUY CHEAP PILLS</div>\
                    <div style=\"font-size:0.5rem\">Fine print terms apply to this offer.</div>\
                    <p>Visible product description for the page reader.</p></body></html>";
        let outcome = run(html, PageType::ProductDetail, 500);
        assert!(!outcome.context.contains("BUY CHEAP PILLS"));
        assert!(outcome.context.contains("Fine print"));
    }

    #[test]
    fn test_budget_respected() {
        let paragraphs: String = (0..80)
            .map(|i| format!("<p>Paragraph {i} with plenty of filler words to occupy budget space nicely.</p>"))
            .collect();
        let html = format!("<html><body><main>{paragraphs}</main></body></html>");
        let outcome = run(&html, PageType::Article, 200);
        assert!(
            outcome.tokens <= 210,
            "tokens {} over budget",
            outcome.tokens
        );
    }

    #[test]
    fn test_mcg_fallback_to_og_description() {
        let html = "<html><head>\
                    <meta property=\"og:description\" content=\"A concise page summary from Open Graph metadata that is long enough to count.\"/>\
                    </head><body><div></div></body></html>";
        let outcome = run(html, PageType::Landing, 500);
        assert!(outcome.context.contains("concise page summary"));
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("minimum-content")));
    }

    #[test]
    fn test_mcg_fallback_to_raw_head() {
        let html = "<html><body><span>tiny</span></body></html>";
        let outcome = run(html, PageType::Landing, 500);
        assert!(outcome.warnings.iter().any(|w| w.contains("raw html head")));
    }

    #[test]
    fn test_cancellation_between_stages() {
        let config = PageMapConfig::default();
        let budgeter = TokenBudgeter::new(Locale::En);
        let metadata = Metadata::default();
        let request = PruneRequest {
            chunks: &[],
            filter_stats: FilterStats::default(),
            raw_html: "",
            page_type: PageType::Article,
            metadata: &metadata,
            meta_chunks: &[],
            budgeter: &budgeter,
            blocked_kind: None,
            verify_ref: None,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = prune_pipeline(&request, &config, &cancel).unwrap_err();
        assert!(matches!(err, PageMapError::Cancelled { .. }));
    }

    #[test]
    fn test_language_filter_removes_foreign_ui() {
        let korean: String = (0..8)
            .map(|i| format!("<p>한국어 본문 단락 {i}번이며 충분히 길게 작성된 내용입니다.</p>"))
            .collect();
        let html = format!(
            "<html><body><main>{korean}<p>Sign in</p></main></body></html>"
        );
        let config = PageMapConfig::default();
        let dom = NormalizedDom::parse(&html, &config).unwrap();
        let budgeter = TokenBudgeter::new(Locale::Ko);
        let metadata = Metadata::default();
        let (chunks, filter_stats) = filter::filter_and_chunk(&dom, &[]);
        let request = PruneRequest {
            chunks: &chunks,
            filter_stats,
            raw_html: &html,
            page_type: PageType::Dashboard,
            metadata: &metadata,
            meta_chunks: &[],
            budgeter: &budgeter,
            blocked_kind: None,
            verify_ref: None,
        };
        let outcome = prune_pipeline(&request, &config, &CancellationToken::new()).unwrap();
        assert!(!outcome.context.contains("Sign in"));
        assert!(outcome.stats.language_removed >= 1);
    }

    #[test]
    fn test_extract_images() {
        let html = r#"<html><body>
            <img class="product-gallery" src="https://cdn.example.com/main.jpg">
            <img src="/images/alt-view.jpg">
            <img src="https://cdn.example.com/sprite-icon.png">
            <img src="data:image/gif;base64,R0lGOD">
            <img srcset="https://cdn.example.com/s.jpg 300w, https://cdn.example.com/l.jpg 1200w">
        </body></html>"#;
        let images = extract_images(html, "https://shop.example.com/item/1");
        assert_eq!(images[0], "https://cdn.example.com/main.jpg");
        assert!(images.contains(&"https://shop.example.com/images/alt-view.jpg".to_string()));
        assert!(images.contains(&"https://cdn.example.com/l.jpg".to_string()));
        assert!(!images.iter().any(|u| u.contains("sprite-icon")));
        assert!(!images.iter().any(|u| u.starts_with("data:")));
    }

    #[test]
    fn test_determinism() {
        let html = "<html><body><main><h1>Stable</h1><p>Deterministic output paragraph text.</p></main></body></html>";
        let a = run(html, PageType::Article, 300);
        let b = run(html, PageType::Article, 300);
        assert_eq!(a.context, b.context);
        assert_eq!(a.tokens, b.tokens);
    }
}
