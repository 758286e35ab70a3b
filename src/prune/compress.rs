//! Per-page-type compressors: render the `Info` block under a token budget.
//!
//! Every compressor follows the same three phases — metadata summary first,
//! structural extraction from chunks second, text-line fallback last — with
//! later phases filling budget only if earlier ones underspent. Dispatch is
//! by page type from a registry; adding a page type means adding one
//! compressor function.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classify::{BlockedKind, PageType};
use crate::dom::chunk::{ChunkType, HtmlChunk};
use crate::extract::Metadata;
use crate::locale::{Locale, LocaleLabels, TokenBudgeter, LISTING_TERMS, OPTION_TERMS, SEARCH_RESULT_TERMS};

// Multilingual price pattern: symbols, suffixes, thousand-grouped digits
static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ₩\s*[\d,]+
        | \d[\d,]*\s*원
        | \d[\d,]*\s*円
        | ¥\s*[\d,]+
        | £\s*[\d,]+(?:\.\d{2})?
        | €\s*[\d,.]+
        | \$\s*\d[\d,]*(?:\.\d{2})?
        | (?:USD|EUR|GBP|CHF|KRW|JPY)\s*[\d,.]+
        | \d{1,3}(?:,\d{3})+
        ",
    )
    .expect("price regex")
});

static RATING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:★|⭐|평점|별점|rating|rated|stars?\b|評価|étoile|Bewertung|\d\.\d\s*[/점])")
        .expect("rating regex")
});

static DISCOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}\s*%\s*(?:off|할인|OFF)").expect("discount regex"));

// Amazon-style nested price spans: the `a-offscreen` copy is authoritative
static PRICE_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)price").expect("price class regex"));

/// Everything a compressor needs for one render
pub struct CompressInput<'a> {
    pub chunks: &'a [HtmlChunk],
    pub metadata: &'a Metadata,
    pub locale: Locale,
    pub budgeter: &'a TokenBudgeter,
    pub budget: usize,
    /// Raw HTML, for pagination extraction only
    pub raw_html: &'a str,
    pub blocked_kind: Option<BlockedKind>,
    pub verify_ref: Option<u32>,
}

impl<'a> CompressInput<'a> {
    fn labels(&self) -> &'static LocaleLabels {
        LocaleLabels::for_locale(self.locale)
    }
}

/// Stage-4 weighting: how much a page type cares about each chunk type
pub fn type_multiplier(page_type: PageType, chunk: &HtmlChunk) -> f64 {
    match page_type {
        PageType::ProductDetail | PageType::ProductListing => match chunk.chunk_type {
            ChunkType::Card => 1.5,
            ChunkType::Paragraph if PRICE_RE.is_match(&chunk.text) => 1.5,
            ChunkType::List | ChunkType::Table => 1.2,
            _ => 1.0,
        },
        PageType::Article | PageType::Wiki | PageType::NewsPortal => match chunk.chunk_type {
            ChunkType::Heading => 1.3,
            ChunkType::Paragraph => 1.2,
            _ => 1.0,
        },
        PageType::Form | PageType::Checkout | PageType::Login | PageType::Settings => {
            match chunk.chunk_type {
                ChunkType::Form => 2.0,
                _ => 1.0,
            }
        }
        PageType::Dashboard => match chunk.chunk_type {
            ChunkType::Table => 1.5,
            ChunkType::List => 1.2,
            _ => 1.0,
        },
        PageType::Documentation => match chunk.chunk_type {
            ChunkType::Code => 1.5,
            ChunkType::Heading => 1.3,
            _ => 1.0,
        },
        _ => 1.0,
    }
}

/// Render the `Info` block for a page type
pub fn compress(page_type: PageType, input: &CompressInput<'_>) -> String {
    let render: fn(&CompressInput<'_>) -> String = match page_type {
        PageType::ProductDetail => compress_product,
        PageType::ProductListing => compress_listing,
        PageType::Article | PageType::Wiki => compress_article,
        PageType::NewsPortal => compress_news_portal,
        PageType::Video => compress_video,
        PageType::Form | PageType::Checkout | PageType::Login | PageType::Settings => compress_form,
        PageType::Blocked => compress_blocked,
        _ => compress_default,
    };
    let mut output = render(input);

    // Pagination footer for listing-shaped pages
    if matches!(page_type, PageType::ProductListing) {
        if let Some(pagination) = pagination_summary(input.raw_html, input.labels()) {
            output = format!("{}\n{pagination}", output.trim_end());
        }
    }

    input.budgeter.truncate_to_tokens(&output, input.budget)
}

// ---------------------------------------------------------------------------
// Currency helpers
// ---------------------------------------------------------------------------

/// Format a price with currency-specific notation
pub fn format_price(amount: f64, currency: &str) -> String {
    let group = |n: f64| -> String {
        let whole = n.trunc() as i64;
        let s = whole.abs().to_string();
        let mut grouped = String::new();
        for (i, c) in s.chars().enumerate() {
            if i > 0 && (s.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        if whole < 0 {
            format!("-{grouped}")
        } else {
            grouped
        }
    };
    match currency {
        "KRW" => format!("{}원", group(amount)),
        "JPY" => format!("{}円", group(amount)),
        "USD" => format!("${}.{:02}", group(amount), (amount.fract() * 100.0).round() as u32),
        "EUR" => format!("€{}.{:02}", group(amount), (amount.fract() * 100.0).round() as u32),
        "GBP" => format!("£{}.{:02}", group(amount), (amount.fract() * 100.0).round() as u32),
        _ => format!("{} {currency}", group(amount)),
    }
}

/// `1.5M` / `32K` suffixes for large counts
pub fn human_count(n: u64) -> String {
    if n >= 1_000_000 {
        let m = n as f64 / 1_000_000.0;
        if (m - m.trunc()).abs() < 0.05 {
            format!("{}M", m.trunc() as u64)
        } else {
            format!("{m:.1}M")
        }
    } else if n >= 1_000 {
        let k = n as f64 / 1_000.0;
        if (k - k.trunc()).abs() < 0.05 {
            format!("{}K", k.trunc() as u64)
        } else {
            format!("{k:.1}K")
        }
    } else {
        n.to_string()
    }
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// Price recovery cascade: JSON-LD/itemprop metadata → OG → DOM scan over
/// price-class chunks, with Amazon nested-span handling (`a-offscreen` text
/// wins over the visible split spans).
fn recover_price_line(input: &CompressInput<'_>) -> Option<String> {
    if let Some(price) = input.metadata.get_f64("price") {
        let currency = input
            .metadata
            .get_str("currency")
            .unwrap_or(input.labels().default_currency);
        return Some(format_price(price, currency));
    }

    // DOM scan: chunks whose class mentions price
    for chunk in input.chunks {
        let price_class = chunk
            .attr("class")
            .map(|c| PRICE_CLASS_RE.is_match(c))
            .unwrap_or(false)
            || chunk.attr("data-price").is_some();
        if !price_class {
            continue;
        }
        if chunk
            .attr("class")
            .map(|c| c.contains("a-offscreen"))
            .unwrap_or(false)
        {
            if let Some(m) = PRICE_RE.find(&chunk.text) {
                return Some(m.as_str().trim().to_string());
            }
        }
        if let Some(m) = PRICE_RE.find(&chunk.text) {
            return Some(m.as_str().trim().to_string());
        }
        if let Some(label) = chunk.attr("aria-label") {
            if let Some(m) = PRICE_RE.find(label) {
                return Some(m.as_str().trim().to_string());
            }
        }
    }

    // Last resort: any price-looking line
    input
        .chunks
        .iter()
        .find_map(|c| PRICE_RE.find(&c.text).map(|m| m.as_str().trim().to_string()))
}

fn compress_product(input: &CompressInput<'_>) -> String {
    let labels = input.labels();
    let meta = input.metadata;
    let mut parts: Vec<String> = Vec::new();

    // Phase 1 — metadata summary
    if let Some(name) = meta.get_str("name") {
        parts.push(format!("{}: {name}", labels.title));
    }
    if let Some(price) = recover_price_line(input) {
        parts.push(price);
    }
    if let Some(range) = meta.get_str("priceRange") {
        parts.push(range.to_string());
    }
    if let Some(rating) = meta.get_f64("rating") {
        let mut line = format!("{}: {rating}", labels.rating);
        if let Some(count) = meta.get_u64("reviewCount") {
            line.push(' ');
            line.push_str(&labels.reviews(count));
        }
        parts.push(line);
    }
    if let Some(brand) = meta.get_str("brand") {
        parts.push(format!("{}: {brand}", labels.brand));
    }
    if let Some(availability) = meta.get_str("availability") {
        parts.push(availability.to_string());
    }

    // Phase 2 — structural extraction: discounts, options, rating fallback
    let has_name = meta.get_str("name").is_some();
    let has_rating = meta.get_f64("rating").is_some();
    let option_terms: Vec<String> = OPTION_TERMS.iter().map(|t| t.to_lowercase()).collect();
    let mut option_lines = 0usize;
    let mut other_lines: Vec<&str> = Vec::new();

    for chunk in input.chunks {
        if matches!(chunk.chunk_type, ChunkType::Meta | ChunkType::RscData) {
            continue;
        }
        let text = chunk.text.trim();
        if text.len() < 2 {
            continue;
        }
        if !has_name && parts.is_empty() && chunk.tag == "h1" {
            parts.push(format!("{}: {text}", labels.title));
            continue;
        }
        if let Some(m) = DISCOUNT_RE.find(text) {
            let line = m.as_str().trim().to_string();
            if !parts.contains(&line) {
                parts.push(line);
            }
            continue;
        }
        if !has_rating && RATING_RE.is_match(text) && text.chars().count() < 80 {
            parts.push(text.to_string());
            continue;
        }
        let lower = text.to_lowercase();
        if option_lines < 5 && option_terms.iter().any(|t| lower.contains(t.as_str())) {
            parts.push(text.chars().take(150).collect());
            option_lines += 1;
            continue;
        }
        other_lines.push(text);
    }

    // Phase 3 — text-line fallback, only while budget remains
    let mut output = parts.join("\n");
    for line in other_lines.into_iter().take(6) {
        if input.budgeter.estimate(&output) >= input.budget {
            break;
        }
        if line.chars().count() > 15 {
            output.push('\n');
            output.push_str(&line.chars().take(200).collect::<String>());
        }
    }
    output
}

// ---------------------------------------------------------------------------
// Listing / search results
// ---------------------------------------------------------------------------

/// One detected product card
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub name: String,
    pub price_text: String,
    pub brand: Option<String>,
}

/// Detect product cards: JSON-LD ItemList first, then chunk heuristics.
pub fn detect_cards(chunks: &[HtmlChunk], metadata: &Metadata) -> Vec<Card> {
    let mut cards: Vec<Card> = Vec::new();

    for item in &metadata.items {
        let Some(name) = item.get("name").and_then(|v| v.as_str()) else {
            continue;
        };
        let price_text = match (
            item.get("price").and_then(|v| v.as_f64()),
            item.get("currency").and_then(|v| v.as_str()),
        ) {
            (Some(price), Some(currency)) => format_price(price, currency),
            (Some(price), None) => format!("{price}"),
            _ => String::new(),
        };
        cards.push(Card {
            name: name.to_string(),
            price_text,
            brand: item
                .get("brand")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        });
    }
    if !cards.is_empty() {
        return dedupe_cards(cards);
    }

    // Chunk pass 1: list/table/card chunks with name-price pairs in the text
    for chunk in chunks {
        if !matches!(
            chunk.chunk_type,
            ChunkType::List | ChunkType::Table | ChunkType::Card
        ) {
            continue;
        }
        if let Some(m) = PRICE_RE.find(&chunk.text) {
            let name_part = chunk.text[..m.start()].trim().trim_end_matches(['|', '·', '-']);
            if name_part.chars().count() > 2 {
                cards.push(Card {
                    name: name_part.trim().chars().take(120).collect(),
                    price_text: m.as_str().trim().to_string(),
                    brand: None,
                });
            }
        }
    }
    if !cards.is_empty() {
        return dedupe_cards(cards);
    }

    // Chunk pass 2: adjacent name/price line pairing
    let texts: Vec<&str> = chunks
        .iter()
        .filter(|c| !matches!(c.chunk_type, ChunkType::Meta | ChunkType::RscData))
        .map(|c| c.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    let mut i = 0;
    while i + 1 < texts.len() {
        let line = texts[i];
        let next = texts[i + 1];
        if !PRICE_RE.is_match(line) && line.chars().count() > 3 && line.chars().count() < 200 {
            if let Some(m) = PRICE_RE.find(next) {
                cards.push(Card {
                    name: line.chars().take(120).collect(),
                    price_text: m.as_str().trim().to_string(),
                    brand: None,
                });
                i += 2;
                continue;
            }
        }
        i += 1;
    }
    dedupe_cards(cards)
}

fn dedupe_cards(cards: Vec<Card>) -> Vec<Card> {
    let mut seen: Vec<(String, String)> = Vec::new();
    let mut out = Vec::new();
    for card in cards {
        let key = (card.name.to_lowercase(), card.price_text.clone());
        if !seen.contains(&key) {
            seen.push(key);
            out.push(card);
        }
    }
    out
}

fn serialize_cards(cards: &[Card], max_cards: usize, labels: &LocaleLabels) -> String {
    let mut lines: Vec<String> = Vec::new();
    for (i, card) in cards.iter().take(max_cards).enumerate() {
        let mut segments = vec![card.name.clone()];
        if !card.price_text.is_empty() {
            segments.push(card.price_text.clone());
        }
        if let Some(brand) = &card.brand {
            segments.push(brand.clone());
        }
        lines.push(format!("{}. {}", i + 1, segments.join(" | ")));
    }
    if cards.len() > max_cards {
        lines.push(format!("... {}", labels.overflow(cards.len() - max_cards)));
    }
    lines.join("\n")
}

fn compress_listing(input: &CompressInput<'_>) -> String {
    let labels = input.labels();
    let cards = detect_cards(input.chunks, input.metadata);

    let mut parts: Vec<String> = Vec::new();

    // Page status header: listing/search phrasing near the top
    let heading_terms: Vec<String> = LISTING_TERMS
        .iter()
        .chain(SEARCH_RESULT_TERMS.iter())
        .map(|t| t.to_lowercase())
        .collect();
    for chunk in input.chunks.iter().take(15) {
        let lower = chunk.text.to_lowercase();
        if heading_terms.iter().any(|t| lower.contains(t.as_str())) {
            parts.push(chunk.text.chars().take(150).collect());
            break;
        }
    }

    if !cards.is_empty() {
        parts.push(serialize_cards(&cards, 15, labels));
        return parts.join("\n");
    }

    // Fallback: price-bearing lines
    let mut product_lines = 0;
    for chunk in input.chunks {
        if PRICE_RE.is_match(&chunk.text) && product_lines < 10 {
            parts.push(chunk.text.chars().take(150).collect());
            product_lines += 1;
        }
    }
    parts.join("\n")
}

// ---------------------------------------------------------------------------
// Article / wiki / news portal
// ---------------------------------------------------------------------------

fn compress_article(input: &CompressInput<'_>) -> String {
    let labels = input.labels();
    let meta = input.metadata;
    let mut parts: Vec<String> = Vec::new();

    if let Some(headline) = meta.get_str("headline") {
        parts.push(format!("{}: {headline}", labels.title));
    }
    if let Some(author) = meta.get_str("author") {
        parts.push(author.to_string());
    }
    if let Some(date) = meta.get_str("datePublished") {
        parts.push(date.to_string());
    }

    // Body: headings and paragraphs in document order under the budget.
    // CJK weighting happens inside the budgeter; reference markers like
    // [1][2] ride along in the text untouched.
    let mut output = parts.join("\n");
    let has_headline = meta.get_str("headline").is_some();
    for chunk in input.chunks {
        match chunk.chunk_type {
            ChunkType::Heading => {
                if has_headline
                    && Some(chunk.text.trim()) == meta.get_str("headline").map(str::trim)
                {
                    continue;
                }
                let candidate = format!("{output}\n## {}", chunk.text.trim());
                if input.budgeter.estimate(&candidate) > input.budget {
                    break;
                }
                output = candidate;
            }
            ChunkType::Paragraph | ChunkType::List => {
                if chunk.text.chars().count() < 30 {
                    continue;
                }
                let candidate = format!("{output}\n{}", chunk.text.trim());
                if input.budgeter.estimate(&candidate) > input.budget {
                    break;
                }
                output = candidate;
            }
            _ => {}
        }
    }
    output.trim().to_string()
}

fn compress_news_portal(input: &CompressInput<'_>) -> String {
    // Numbered headline list; each item may carry a one-line summary when
    // the per-item budget allows.
    let headlines: Vec<&HtmlChunk> = input
        .chunks
        .iter()
        .filter(|c| c.chunk_type == ChunkType::Heading)
        .collect();
    if headlines.is_empty() {
        return compress_article(input);
    }

    let per_item = (input.budget / headlines.len().max(1)).max(8);
    let mut lines: Vec<String> = Vec::new();
    for (i, headline) in headlines.iter().enumerate() {
        let mut line = format!("{}. {}", i + 1, headline.text.trim());
        // Attach the paragraph that follows this heading, if it fits
        if let Some(summary) = input.chunks.iter().find(|c| {
            c.chunk_type == ChunkType::Paragraph
                && c.xpath_prefix == headline.xpath_prefix
                && c.xpath > headline.xpath
        }) {
            let with_summary = format!(
                "{line} — {}",
                summary.text.trim().chars().take(160).collect::<String>()
            );
            if input.budgeter.estimate(&with_summary) <= per_item {
                line = with_summary;
            }
        }
        let candidate = format!("{}\n{line}", lines.join("\n"));
        if input.budgeter.estimate(&candidate) > input.budget {
            break;
        }
        lines.push(line);
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

fn compress_video(input: &CompressInput<'_>) -> String {
    let labels = input.labels();
    let meta = input.metadata;
    let mut parts: Vec<String> = Vec::new();

    if let Some(name) = meta.get_str("name") {
        parts.push(format!("{}: {name}", labels.title));
    }
    if let Some(channel) = meta.get_str("channel") {
        parts.push(channel.to_string());
    }
    let mut stat_bits: Vec<String> = Vec::new();
    if let Some(views) = meta.get_u64("view_count") {
        stat_bits.push(format!("{} views", human_count(views)));
    }
    if let Some(likes) = meta.get_u64("like_count") {
        stat_bits.push(format!("{} likes", human_count(likes)));
    }
    if let Some(duration) = meta.get_str("duration") {
        stat_bits.push(duration.to_string());
    }
    if let Some(date) = meta.get_str("upload_date") {
        stat_bits.push(date.to_string());
    }
    if !stat_bits.is_empty() {
        parts.push(stat_bits.join(" | "));
    }

    // Description under a guarded fraction of the budget so CJK text cannot
    // blow past the cap mid-truncation.
    let header = parts.join("\n");
    let description = meta
        .get_str("description")
        .map(str::to_string)
        .or_else(|| {
            input
                .chunks
                .iter()
                .find(|c| c.chunk_type == ChunkType::Paragraph && c.text.chars().count() > 40)
                .map(|c| c.text.clone())
        });
    if let Some(description) = description {
        let header_cost = input.budgeter.estimate(&header);
        let remaining = input.budget.saturating_sub(header_cost);
        let guarded = ((remaining as f64) * 0.85) as usize;
        if guarded > 5 {
            let truncated = input.budgeter.truncate_to_tokens(&description, guarded);
            return format!("{header}\n{truncated}");
        }
    }
    header
}

// ---------------------------------------------------------------------------
// Form / checkout / login / settings
// ---------------------------------------------------------------------------

fn compress_form(input: &CompressInput<'_>) -> String {
    // Labels first, fields in document order
    let mut lines: Vec<String> = Vec::new();
    for chunk in input.chunks {
        match chunk.chunk_type {
            ChunkType::Heading => lines.push(chunk.text.trim().to_string()),
            ChunkType::Form => {
                for field_line in chunk.text.split('\n') {
                    let trimmed = field_line.trim();
                    if !trimmed.is_empty() {
                        lines.push(format!("- {trimmed}"));
                    }
                }
            }
            ChunkType::Paragraph if chunk.text.chars().count() < 120 => {
                lines.push(chunk.text.trim().to_string());
            }
            _ => {}
        }
        if input.budgeter.estimate(&lines.join("\n")) > input.budget {
            lines.pop();
            break;
        }
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Blocked
// ---------------------------------------------------------------------------

fn compress_blocked(input: &CompressInput<'_>) -> String {
    let kind = input
        .blocked_kind
        .map(|k| k.as_str())
        .unwrap_or("anti-bot");
    let mut notice = format!(
        "Access blocked by a {kind} challenge. The page content is not available until the challenge is completed."
    );
    match input.verify_ref {
        Some(ref_id) => {
            notice.push_str(&format!(
                "\nA verification element is exposed as ref [{ref_id}]; interacting with it may clear the challenge."
            ));
        }
        None => {
            notice.push_str("\nNo verification element was detected; retry later or use a different entry URL.");
        }
    }
    notice
}

// ---------------------------------------------------------------------------
// Dashboard / default
// ---------------------------------------------------------------------------

fn compress_default(input: &CompressInput<'_>) -> String {
    // Structural chunks in weight order under the global budget,
    // re-emitted in document order.
    let mut indexed: Vec<(usize, &HtmlChunk)> = input
        .chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| !matches!(c.chunk_type, ChunkType::Meta | ChunkType::RscData))
        .collect();
    indexed.sort_by(|a, b| {
        b.1.weight
            .partial_cmp(&a.1.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let mut selected: Vec<(usize, &HtmlChunk)> = Vec::new();
    let mut used = 0usize;
    for (i, chunk) in indexed {
        let cost = input.budgeter.estimate(&chunk.text);
        if used + cost > input.budget {
            continue;
        }
        used += cost;
        selected.push((i, chunk));
    }
    selected.sort_by_key(|(i, _)| *i);

    selected
        .into_iter()
        .map(|(_, c)| match c.chunk_type {
            ChunkType::Heading => format!("## {}", c.text.trim()),
            _ => c.text.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

static PAGE_PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:href|action)=["'][^"']*[?&](?:page|p|pg|pn|pageNo|pageNum|currentPage)=(\d+)"#)
        .expect("page param regex")
});

static TOTAL_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?xi)
        총\s*[\d,]+\s*건
        | [\d,]+\s*개의?\s*(?:상품|결과|검색결과)
        | \d[\d,]*\s*(?:results?|items?|products?)
        | \d[\d,]*\s*件の商品
        | \d[\d,]*\s*(?:résultats|produits|Ergebnisse|Produkte)
        ",
    )
    .expect("total count regex")
});

static CURRENT_PAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:page|seite|페이지)\s*(\d+)\s*(?:of|von|/)\s*(\d+)").expect("current page regex")
});

/// One-line pagination summary from raw HTML, or None when nothing fires
pub fn pagination_summary(raw_html: &str, labels: &LocaleLabels) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    let mut max_page: u64 = 0;
    for caps in PAGE_PARAM_RE.captures_iter(raw_html) {
        if let Ok(page) = caps[1].parse::<u64>() {
            max_page = max_page.max(page);
        }
    }
    if let Some(caps) = CURRENT_PAGE_RE.captures(raw_html) {
        if let Ok(total) = caps[2].parse::<u64>() {
            max_page = max_page.max(total);
        }
    }
    if max_page > 1 {
        parts.push(format!("~{max_page}{}", labels.page_suffix));
    }

    if let Some(m) = TOTAL_COUNT_RE.find(raw_html) {
        parts.push(m.as_str().trim().to_string());
    }

    let next_terms: Vec<String> = crate::locale::NEXT_BUTTON_TERMS
        .iter()
        .chain(crate::locale::LOAD_MORE_TERMS.iter())
        .map(|t| format!(">{t}<"))
        .collect();
    let has_next = next_terms.iter().any(|t| raw_html.contains(t.as_str()))
        || raw_html.contains("class=\"next")
        || raw_html.contains("rel=\"next\"");
    if has_next {
        parts.push(labels.next_available.to_string());
    }

    if parts.is_empty() {
        None
    } else {
        Some(format!("{}: {}", labels.pagination, parts.join(" | ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::Value;

    fn budgeter() -> TokenBudgeter {
        TokenBudgeter::new(Locale::En)
    }

    fn input<'a>(
        chunks: &'a [HtmlChunk],
        metadata: &'a Metadata,
        budgeter: &'a TokenBudgeter,
        raw_html: &'a str,
    ) -> CompressInput<'a> {
        CompressInput {
            chunks,
            metadata,
            locale: Locale::En,
            budgeter,
            budget: 500,
            raw_html,
            blocked_kind: None,
            verify_ref: None,
        }
    }

    fn product_meta() -> Metadata {
        let mut meta = Metadata::default();
        meta.fields
            .insert("name".into(), Value::String("Leather Jacket".into()));
        meta.fields.insert("price".into(), Value::from(139000.0));
        meta.fields
            .insert("currency".into(), Value::String("KRW".into()));
        meta.fields.insert("rating".into(), Value::from(4.6));
        meta.fields.insert("reviewCount".into(), Value::from(847u64));
        meta
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(139000.0, "KRW"), "139,000원");
        assert_eq!(format_price(49.99, "USD"), "$49.99");
        assert_eq!(format_price(1500.0, "JPY"), "1,500円");
        assert_eq!(format_price(12.5, "EUR"), "€12.50");
    }

    #[test]
    fn test_human_count() {
        assert_eq!(human_count(1_500_000), "1.5M");
        assert_eq!(human_count(2_000_000), "2M");
        assert_eq!(human_count(32_000), "32K");
        assert_eq!(human_count(847), "847");
    }

    #[test]
    fn test_product_compressor_metadata_first() {
        let chunks: Vec<HtmlChunk> = Vec::new();
        let meta = product_meta();
        let b = budgeter();
        let out = compress(PageType::ProductDetail, &input(&chunks, &meta, &b, ""));
        assert!(out.contains("Title: Leather Jacket"));
        assert!(out.contains("139,000원"));
        assert!(out.contains("Rating: 4.6 (847 reviews)"));
    }

    #[test]
    fn test_product_zero_price_rendered() {
        let mut meta = Metadata::default();
        meta.fields.insert("price".into(), Value::from(0.0));
        meta.fields
            .insert("currency".into(), Value::String("USD".into()));
        let chunks: Vec<HtmlChunk> = Vec::new();
        let b = budgeter();
        let out = compress(PageType::ProductDetail, &input(&chunks, &meta, &b, ""));
        assert!(out.contains("$0.00"));
    }

    #[test]
    fn test_price_recovery_from_price_class_chunk() {
        let chunks = vec![
            HtmlChunk::new(ChunkType::Paragraph, "Special offer today", "/html/body/p[1]")
                .with_tag("p"),
            HtmlChunk::new(ChunkType::Paragraph, "$89.99", "/html/body/span[1]")
                .with_tag("span")
                .with_attr("class", "a-price a-offscreen"),
        ];
        let meta = Metadata::default();
        let b = budgeter();
        let out = compress(PageType::ProductDetail, &input(&chunks, &meta, &b, ""));
        assert!(out.contains("$89.99"));
    }

    #[test]
    fn test_card_detection_from_itemlist() {
        let mut meta = Metadata::default();
        let mut item = IndexMap::new();
        item.insert("name".to_string(), Value::String("First Product".into()));
        item.insert("price".to_string(), Value::from(9.99));
        item.insert("currency".to_string(), Value::String("USD".into()));
        meta.items.push(item);
        let cards = detect_cards(&[], &meta);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].name, "First Product");
        assert_eq!(cards[0].price_text, "$9.99");
    }

    #[test]
    fn test_card_detection_from_list_chunks() {
        let chunks = vec![HtmlChunk::new(
            ChunkType::List,
            "Wool Coat 259,000원",
            "/html/body/ul[1]",
        )
        .with_tag("ul")];
        let cards = detect_cards(&chunks, &Metadata::default());
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].name, "Wool Coat");
        assert_eq!(cards[0].price_text, "259,000원");
    }

    #[test]
    fn test_listing_numbered_output() {
        let mut meta = Metadata::default();
        for (i, name) in ["Alpha", "Beta"].iter().enumerate() {
            let mut item = IndexMap::new();
            item.insert("name".to_string(), Value::String(name.to_string()));
            item.insert("price".to_string(), Value::from((i as f64 + 1.0) * 10.0));
            item.insert("currency".to_string(), Value::String("USD".into()));
            meta.items.push(item);
        }
        let chunks: Vec<HtmlChunk> = Vec::new();
        let b = budgeter();
        let out = compress(PageType::ProductListing, &input(&chunks, &meta, &b, ""));
        assert!(out.contains("1. Alpha | $10.00"));
        assert!(out.contains("2. Beta | $20.00"));
    }

    #[test]
    fn test_article_keeps_reference_markers() {
        let chunks = vec![
            HtmlChunk::new(ChunkType::Heading, "History", "/html/body/article[1]/h2[1]")
                .with_tag("h2"),
            HtmlChunk::new(
                ChunkType::Paragraph,
                "The language was announced in 2010.[1][2] Adoption grew steadily afterwards.",
                "/html/body/article[1]/p[1]",
            )
            .with_tag("p"),
        ];
        let meta = Metadata::default();
        let b = budgeter();
        let out = compress(PageType::Article, &input(&chunks, &meta, &b, ""));
        assert!(out.contains("## History"));
        assert!(out.contains("[1][2]"));
    }

    #[test]
    fn test_video_compressor_counts() {
        let mut meta = Metadata::default();
        meta.fields
            .insert("name".into(), Value::String("Unboxing".into()));
        meta.fields
            .insert("channel".into(), Value::String("TechChannel".into()));
        meta.fields.insert("view_count".into(), Value::from(1_500_000u64));
        meta.fields.insert("like_count".into(), Value::from(32_000u64));
        let chunks: Vec<HtmlChunk> = Vec::new();
        let b = budgeter();
        let out = compress(PageType::Video, &input(&chunks, &meta, &b, ""));
        assert!(out.contains("1.5M views"));
        assert!(out.contains("32K likes"));
    }

    #[test]
    fn test_blocked_notice_with_verify_ref() {
        let chunks: Vec<HtmlChunk> = Vec::new();
        let meta = Metadata::default();
        let b = budgeter();
        let mut inp = input(&chunks, &meta, &b, "");
        inp.blocked_kind = Some(BlockedKind::Turnstile);
        inp.verify_ref = Some(1);
        let out = compress(PageType::Blocked, &inp);
        assert!(out.contains("turnstile"));
        assert!(out.contains("ref [1]"));
    }

    #[test]
    fn test_default_respects_budget() {
        let chunks: Vec<HtmlChunk> = (0..50)
            .map(|i| {
                HtmlChunk::new(
                    ChunkType::Paragraph,
                    format!("Paragraph number {i} with a reasonable amount of words in it."),
                    format!("/html/body/p[{i}]"),
                )
                .with_tag("p")
            })
            .collect();
        let meta = Metadata::default();
        let b = budgeter();
        let mut inp = input(&chunks, &meta, &b, "");
        inp.budget = 100;
        let out = compress(PageType::Dashboard, &inp);
        assert!(b.estimate(&out) <= 105, "estimate {}", b.estimate(&out));
    }

    #[test]
    fn test_pagination_summary() {
        let html = r#"<a href="/list?page=2">2</a><a href="/list?page=25">25</a>
                      <span>1,234 results</span><a class="next" href="/list?page=2">Next</a>"#;
        let labels = LocaleLabels::for_locale(Locale::En);
        let summary = pagination_summary(html, labels).unwrap();
        assert!(summary.contains("~25"));
        assert!(summary.contains("1,234 results"));
        assert!(summary.contains("Next available"));
    }

    #[test]
    fn test_pagination_none_when_absent() {
        let labels = LocaleLabels::for_locale(Locale::En);
        assert!(pagination_summary("<p>no pages here</p>", labels).is_none());
    }

    #[test]
    fn test_type_multiplier() {
        let price_chunk = HtmlChunk::new(ChunkType::Paragraph, "only 139,000원", "/p[1]");
        assert!(type_multiplier(PageType::ProductDetail, &price_chunk) > 1.0);
        let plain = HtmlChunk::new(ChunkType::Paragraph, "hello world", "/p[2]");
        assert!((type_multiplier(PageType::ProductDetail, &plain) - 1.0).abs() < f64::EPSILON);
        let form_chunk = HtmlChunk::new(ChunkType::Form, "Name: ___", "/form[1]");
        assert!(type_multiplier(PageType::Checkout, &form_chunk) > 1.5);
    }
}
