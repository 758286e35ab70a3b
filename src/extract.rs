//! Structured-data extraction: JSON-LD, microdata, Open Graph, RSC payloads.
//!
//! Script islands are harvested from the raw HTML before the pruning stages
//! delete `<script>` tags. Per-schema parsers are dispatched by tag from a
//! registry; adding a schema means adding one parser (and optionally one
//! compressor).
//!
//! Extraction priority: JSON-LD > itemprop > OG meta > h1 fallback. Every
//! textual field passes through the sanitizer; numeric fields go through
//! [`to_float`]/[`to_int`], which accept both `1,500.99` and European
//! `1.500,99` and preserve an explicit zero price.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dom::chunk::{ChunkType, HtmlChunk};
use crate::sanitize::sanitize_text;

/// Bounded recursion for nested `@graph` structures (DoS guard)
const MAX_JSONLD_DEPTH: usize = 5;

/// Recognized structured-data schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
pub enum SchemaName {
    Product,
    Article,
    NewsArticle,
    VideoObject,
    BreadcrumbList,
    FaqPage,
    Event,
    LocalBusiness,
    WikiArticle,
    Generic,
}

impl SchemaName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaName::Product => "Product",
            SchemaName::Article => "Article",
            SchemaName::NewsArticle => "NewsArticle",
            SchemaName::VideoObject => "VideoObject",
            SchemaName::BreadcrumbList => "BreadcrumbList",
            SchemaName::FaqPage => "FAQPage",
            SchemaName::Event => "Event",
            SchemaName::LocalBusiness => "LocalBusiness",
            SchemaName::WikiArticle => "WikiArticle",
            SchemaName::Generic => "Generic",
        }
    }

    /// Map a JSON-LD `@type` string to a schema
    pub fn from_jsonld_type(t: &str) -> Option<SchemaName> {
        match t {
            "Product" | "IndividualProduct" | "ProductGroup" => Some(SchemaName::Product),
            "Article" | "BlogPosting" | "TechArticle" | "ScholarlyArticle" => {
                Some(SchemaName::Article)
            }
            "NewsArticle" | "ReportageNewsArticle" => Some(SchemaName::NewsArticle),
            "WikiArticle" => Some(SchemaName::WikiArticle),
            "VideoObject" => Some(SchemaName::VideoObject),
            "BreadcrumbList" => Some(SchemaName::BreadcrumbList),
            "FAQPage" => Some(SchemaName::FaqPage),
            "Event" | "MusicEvent" | "SportsEvent" | "TheaterEvent" | "BusinessEvent"
            | "Festival" => Some(SchemaName::Event),
            "LocalBusiness" | "Restaurant" | "Hotel" | "Store" => Some(SchemaName::LocalBusiness),
            _ => None,
        }
    }
}

impl std::fmt::Display for SchemaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed metadata extracted from structured-data islands.
///
/// Open-shape mapping with a closed set of recognized keys per schema;
/// insertion order is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Metadata {
    /// Schema the fields were parsed under
    pub schema: Option<SchemaName>,

    /// Recognized fields
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, Value>,

    /// ItemList entries for listing/search pages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<IndexMap<String, Value>>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.items.is_empty()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(Value::as_u64)
    }

    /// Insert a field unless already present (earlier sources win)
    fn fill(&mut self, key: &str, value: Value) {
        if !self.fields.contains_key(key) && !value.is_null() {
            self.fields.insert(key.to_string(), value);
        }
    }

    fn fill_text(&mut self, key: &str, raw: &str) {
        let clean = sanitize_text(raw);
        if !clean.is_empty() {
            self.fill(key, Value::String(clean));
        }
    }
}

// ---------------------------------------------------------------------------
// Numeric parsing
// ---------------------------------------------------------------------------

const CURRENCY_MARKS: &[char] = &['₩', '$', '¥', '€', '£', '원', '円', '元'];

/// Parse a number accepting US (`1,500.99`) and European (`1.500,99`)
/// separators, currency marks, and surrounding text noise.
pub fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float_str(s),
        _ => None,
    }
}

/// String-form of [`to_float`]
pub fn parse_float_str(raw: &str) -> Option<f64> {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| !CURRENCY_MARKS.contains(c) && !c.is_whitespace() && !c.is_alphabetic())
        .collect();
    if s.is_empty() {
        return None;
    }

    let has_dot = s.contains('.');
    let has_comma = s.contains(',');
    if has_dot && has_comma {
        // Rightmost separator is the decimal point
        let last_dot = s.rfind('.').unwrap_or(0);
        let last_comma = s.rfind(',').unwrap_or(0);
        if last_comma > last_dot {
            s = s.replace('.', "").replace(',', ".");
        } else {
            s = s.replace(',', "");
        }
    } else if has_comma {
        // "1,500" / "1,500,000" are thousands; "1,99" is a European decimal
        if THOUSANDS_COMMA_RE.is_match(&s) {
            s = s.replace(',', "");
        } else {
            s = s.replace(',', ".");
        }
    } else if has_dot && THOUSANDS_DOT_RE.is_match(&s) {
        // "1.500.000" — European thousands grouping
        s = s.replace('.', "");
    }

    s.parse::<f64>().ok()
}

static THOUSANDS_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{1,3}(,\d{3})+(\.\d+)?$").expect("thousands regex"));
static THOUSANDS_DOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{1,3}(\.\d{3})+$").expect("dot thousands regex"));

/// Integer parse that rounds rather than truncating (`"4.9"` → 5)
pub fn to_int(value: &Value) -> Option<i64> {
    to_float(value).map(|f| f.round() as i64)
}

/// Extract a date portion from ISO / dotted / Korean / Japanese forms
pub fn normalize_date(raw: &str) -> Option<String> {
    static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
        [
            r"^(\d{4})-(\d{1,2})-(\d{1,2})",
            r"^(\d{4})\.(\d{1,2})\.(\d{1,2})",
            r"^(\d{4})/(\d{1,2})/(\d{1,2})",
            r"^(\d{4})년\s*(\d{1,2})월\s*(\d{1,2})일",
            r"^(\d{4})年\s*(\d{1,2})月\s*(\d{1,2})日",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    });
    let s = raw.trim();
    for re in PATTERNS.iter() {
        if let Some(caps) = re.captures(s) {
            let y = &caps[1];
            let m: u32 = caps[2].parse().ok()?;
            let d: u32 = caps[3].parse().ok()?;
            return Some(format!("{y}-{m:02}-{d:02}"));
        }
    }
    None
}

/// Validate an image URL: http/https only, no `javascript:`/`data:` schemes
pub fn valid_image_url(url: &str) -> bool {
    let trimmed = url.trim();
    trimmed.starts_with("http://") || trimmed.starts_with("https://")
}

// ---------------------------------------------------------------------------
// Script-island harvesting (Stage 2 input)
// ---------------------------------------------------------------------------

static JSONLD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("jsonld regex")
});

static OG_META_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]*property\s*=\s*["']((?:og|product|article|video)[^"']*)["'][^>]*content\s*=\s*["']([^"']*)["'][^>]*/?>"#,
    )
    .expect("og regex")
});

static OG_META_REVERSED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]*content\s*=\s*["']([^"']*)["'][^>]*property\s*=\s*["']((?:og|product|article|video)[^"']*)["'][^>]*/?>"#,
    )
    .expect("og reversed regex")
});

static NAMED_META_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]*name\s*=\s*["'](description|author|keywords)["'][^>]*content\s*=\s*["']([^"']*)["'][^>]*/?>"#,
    )
    .expect("named meta regex")
});

static RSC_SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*>([^<]*self\.__next_f\.push\([^<]*)</script>"#)
        .expect("rsc regex")
});

static DATE_IN_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}[-./]\d{1,2}[-./]\d{1,2}").expect("date regex"));

/// Harvest structured-data islands from raw HTML into META/RSC chunks.
///
/// Runs on the raw string so the islands survive even though the pruning
/// stages delete every `<script>` element.
pub fn extract_script_islands(html: &str) -> Vec<HtmlChunk> {
    let mut chunks = Vec::new();

    for (i, caps) in JSONLD_RE.captures_iter(html).enumerate() {
        let content = caps[1].trim().to_string();
        if !content.is_empty() {
            chunks.push(
                HtmlChunk::new(ChunkType::Meta, content, format!("/json-ld[{i}]"))
                    .with_tag("script")
                    .with_attr("type", "application/ld+json"),
            );
        }
    }

    let mut og: IndexMap<String, String> = IndexMap::new();
    for caps in OG_META_RE.captures_iter(html) {
        og.entry(caps[1].to_string())
            .or_insert_with(|| caps[2].to_string());
    }
    for caps in OG_META_REVERSED_RE.captures_iter(html) {
        og.entry(caps[2].to_string())
            .or_insert_with(|| caps[1].to_string());
    }
    for caps in NAMED_META_RE.captures_iter(html) {
        og.entry(format!("meta:{}", caps[1].to_ascii_lowercase()))
            .or_insert_with(|| caps[2].to_string());
    }
    if !og.is_empty() {
        let text = og
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        let mut chunk = HtmlChunk::new(ChunkType::Meta, text, "/og-meta").with_tag("meta");
        for (k, v) in og {
            chunk.attrs.insert(k, v);
        }
        chunks.push(chunk);
    }

    for (i, caps) in RSC_SCRIPT_RE.captures_iter(html).enumerate() {
        let payload = &caps[1];
        let dates: Vec<&str> = DATE_IN_TEXT_RE
            .find_iter(payload)
            .map(|m| m.as_str())
            .collect();
        if !dates.is_empty() {
            let text = format!("RSC dates: {}", dates.join(", "));
            chunks.push(
                HtmlChunk::new(ChunkType::RscData, text, format!("/rsc-data[{i}]"))
                    .with_tag("script")
                    .with_attr("dates", dates.join(",")),
            );
        }
    }

    chunks
}

// ---------------------------------------------------------------------------
// JSON-LD navigation
// ---------------------------------------------------------------------------

/// Find the first object matching `pred` in a JSON-LD document, recursing
/// through arrays and `@graph` with bounded depth.
fn find_typed<'a>(data: &'a Value, pred: &dyn Fn(&str) -> bool, depth: usize) -> Option<&'a Value> {
    if depth > MAX_JSONLD_DEPTH {
        return None;
    }
    match data {
        Value::Array(items) => items.iter().find_map(|i| find_typed(i, pred, depth + 1)),
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                if let Some(found) = find_typed(graph, pred, depth + 1) {
                    return Some(found);
                }
            }
            let matched = match map.get("@type") {
                Some(Value::String(t)) => pred(t),
                Some(Value::Array(types)) => {
                    types.iter().filter_map(Value::as_str).any(pred)
                }
                _ => false,
            };
            if matched {
                Some(data)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Resolve the schema of a JSON-LD document from its first recognized `@type`
pub fn jsonld_schema(data: &Value) -> Option<SchemaName> {
    fn scan(data: &Value, depth: usize) -> Option<SchemaName> {
        if depth > MAX_JSONLD_DEPTH {
            return None;
        }
        match data {
            Value::Array(items) => items.iter().find_map(|i| scan(i, depth + 1)),
            Value::Object(map) => {
                if let Some(graph) = map.get("@graph") {
                    if let Some(schema) = scan(graph, depth + 1) {
                        return Some(schema);
                    }
                }
                match map.get("@type") {
                    Some(Value::String(t)) => SchemaName::from_jsonld_type(t),
                    Some(Value::Array(types)) => types
                        .iter()
                        .filter_map(Value::as_str)
                        .find_map(SchemaName::from_jsonld_type),
                    _ => None,
                }
            }
            _ => None,
        }
    }
    scan(data, 0)
}

fn str_field(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Object(map)) => map
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        Some(Value::Array(items)) => items.first().and_then(|i| match i {
            Value::String(s) => Some(s.clone()),
            Value::Object(m) => m.get("name").and_then(Value::as_str).map(|s| s.to_string()),
            _ => None,
        }),
        _ => None,
    }
}

/// Price/currency from an `offers` value (Offer, [Offer], AggregateOffer).
///
/// Explicit `is_none` checks throughout: a price of `0` must survive.
fn parse_offers(offers: &Value, meta: &mut Metadata) {
    let offer = match offers {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => return,
        },
        other => other,
    };
    let Value::Object(map) = offer else { return };

    let is_aggregate = map.get("@type").and_then(Value::as_str) == Some("AggregateOffer");
    let mut price = None;
    if is_aggregate {
        if let Some(low) = map.get("lowPrice") {
            price = to_float(low);
        }
        if price.is_none() {
            if let Some(p) = map.get("price") {
                price = to_float(p);
            }
        }
        if let (Some(low), Some(high)) = (
            map.get("lowPrice").and_then(to_float),
            map.get("highPrice").and_then(to_float),
        ) {
            meta.fill("priceRange", Value::String(format!("{low}-{high}")));
        }
    } else if let Some(p) = map.get("price") {
        price = to_float(p);
    }

    if let Some(p) = price {
        if let Some(n) = serde_json::Number::from_f64(p) {
            meta.fill("price", Value::Number(n));
        }
    }
    if let Some(currency) = map.get("priceCurrency").and_then(Value::as_str) {
        meta.fill_text("currency", currency);
    }
    if let Some(availability) = map.get("availability").and_then(Value::as_str) {
        // "https://schema.org/InStock" → "InStock"
        let short = availability.rsplit('/').next().unwrap_or(availability);
        meta.fill_text("availability", short);
    }
}

fn parse_rating(obj: &Value, meta: &mut Metadata) {
    if let Some(Value::Object(agg)) = obj.get("aggregateRating") {
        if let Some(rating) = agg.get("ratingValue").and_then(to_float) {
            if let Some(n) = serde_json::Number::from_f64(rating) {
                meta.fill("rating", Value::Number(n));
            }
        }
        if let Some(count) = agg
            .get("reviewCount")
            .or_else(|| agg.get("ratingCount"))
            .and_then(to_int)
        {
            meta.fill("reviewCount", Value::Number(count.into()));
        }
    }
}

fn parse_image(obj: &Value, key: &str, meta: &mut Metadata, field: &str) {
    let url = match obj.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(items)) => items.first().and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(m) => m.get("url").and_then(Value::as_str).map(|s| s.to_string()),
            _ => None,
        }),
        Some(Value::Object(m)) => m.get("url").and_then(Value::as_str).map(|s| s.to_string()),
        _ => None,
    };
    if let Some(url) = url {
        if valid_image_url(&url) {
            meta.fill(field, Value::String(url.trim().to_string()));
        }
    }
}

// ---------------------------------------------------------------------------
// Per-schema parsers (registry)
// ---------------------------------------------------------------------------

type SchemaParser = fn(&Value, &mut Metadata);

/// Registry of JSON-LD parsers keyed by schema
const SCHEMA_PARSERS: &[(SchemaName, SchemaParser)] = &[
    (SchemaName::Product, parse_product),
    (SchemaName::Article, parse_article),
    (SchemaName::NewsArticle, parse_article),
    (SchemaName::WikiArticle, parse_article),
    (SchemaName::VideoObject, parse_video),
    (SchemaName::BreadcrumbList, parse_breadcrumbs),
    (SchemaName::FaqPage, parse_faq),
    (SchemaName::Event, parse_event),
    (SchemaName::LocalBusiness, parse_local_business),
];

fn parser_for(schema: SchemaName) -> Option<SchemaParser> {
    SCHEMA_PARSERS
        .iter()
        .find(|(s, _)| *s == schema)
        .map(|(_, p)| *p)
}

fn parse_product(obj: &Value, meta: &mut Metadata) {
    if let Some(name) = str_field(obj, "name") {
        meta.fill_text("name", &name);
    }
    if let Some(offers) = obj.get("offers") {
        parse_offers(offers, meta);
    }
    // Direct price field on the product itself (rare but seen in the wild)
    if meta.fields.get("price").is_none() {
        if let Some(price) = obj.get("price").and_then(to_float) {
            if let Some(n) = serde_json::Number::from_f64(price) {
                meta.fill("price", Value::Number(n));
            }
        }
    }
    if let Some(brand) = str_field(obj, "brand") {
        meta.fill_text("brand", &brand);
    }
    parse_rating(obj, meta);
    parse_image(obj, "image", meta, "image");
}

fn parse_article(obj: &Value, meta: &mut Metadata) {
    if let Some(headline) = str_field(obj, "headline").or_else(|| str_field(obj, "name")) {
        meta.fill_text("headline", &headline);
    }
    if let Some(author) = str_field(obj, "author") {
        meta.fill_text("author", &author);
    }
    if let Some(date) = obj.get("datePublished").and_then(Value::as_str) {
        let normalized = normalize_date(date).unwrap_or_else(|| date.to_string());
        meta.fill_text("datePublished", &normalized);
    }
    if let Some(body) = obj.get("articleBody").and_then(Value::as_str) {
        meta.fill_text("body", body);
    }
    if let Some(publisher) = str_field(obj, "publisher") {
        meta.fill_text("publisher", &publisher);
    }
}

fn parse_video(obj: &Value, meta: &mut Metadata) {
    if let Some(name) = str_field(obj, "name") {
        meta.fill_text("name", &name);
    }
    if let Some(channel) = str_field(obj, "author").or_else(|| str_field(obj, "creator")) {
        meta.fill_text("channel", &channel);
    }
    if let Some(duration) = obj.get("duration").and_then(Value::as_str) {
        meta.fill_text("duration", duration);
    }
    if let Some(date) = obj.get("uploadDate").and_then(Value::as_str) {
        let normalized = normalize_date(date).unwrap_or_else(|| date.to_string());
        meta.fill_text("upload_date", &normalized);
    }
    // interactionStatistic carries watch/like counts
    if let Some(Value::Array(stats)) = obj.get("interactionStatistic") {
        for stat in stats {
            let kind = stat
                .get("interactionType")
                .map(|t| match t {
                    Value::String(s) => s.clone(),
                    Value::Object(m) => m
                        .get("@type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    _ => String::new(),
                })
                .unwrap_or_default();
            let count = stat.get("userInteractionCount").and_then(to_int);
            if let Some(count) = count {
                if kind.contains("Watch") {
                    meta.fill("view_count", Value::Number(count.into()));
                } else if kind.contains("Like") {
                    meta.fill("like_count", Value::Number(count.into()));
                }
            }
        }
    }
    parse_image(obj, "thumbnailUrl", meta, "thumbnail_url");
    if let Some(desc) = obj.get("description").and_then(Value::as_str) {
        meta.fill_text("description", desc);
    }
}

fn parse_breadcrumbs(obj: &Value, meta: &mut Metadata) {
    let Some(Value::Array(elements)) = obj.get("itemListElement") else {
        return;
    };
    let mut trail: Vec<(i64, String)> = Vec::new();
    for el in elements {
        let position = el.get("position").and_then(to_int).unwrap_or(0);
        let name = str_field(el, "name")
            .or_else(|| el.get("item").and_then(|i| str_field(i, "name")));
        if let Some(name) = name {
            let clean = sanitize_text(&name);
            if !clean.is_empty() {
                trail.push((position, clean));
            }
        }
    }
    trail.sort_by_key(|(pos, _)| *pos);
    if !trail.is_empty() {
        let path = trail
            .into_iter()
            .map(|(_, name)| name)
            .collect::<Vec<_>>()
            .join(" > ");
        meta.fill("breadcrumbs", Value::String(path));
    }
}

fn parse_faq(obj: &Value, meta: &mut Metadata) {
    let Some(Value::Array(entities)) = obj.get("mainEntity") else {
        return;
    };
    let mut questions = Vec::new();
    for q in entities.iter().take(10) {
        let question = str_field(q, "name");
        let answer = q
            .get("acceptedAnswer")
            .and_then(|a| a.get("text"))
            .and_then(Value::as_str);
        if let Some(question) = question {
            let mut entry = IndexMap::new();
            entry.insert(
                "question".to_string(),
                Value::String(sanitize_text(&question)),
            );
            if let Some(answer) = answer {
                entry.insert("answer".to_string(), Value::String(sanitize_text(answer)));
            }
            questions.push(entry);
        }
    }
    if !questions.is_empty() {
        meta.fill("question_count", Value::Number(questions.len().into()));
        meta.items = questions;
    }
}

fn parse_event(obj: &Value, meta: &mut Metadata) {
    if let Some(name) = str_field(obj, "name") {
        meta.fill_text("name", &name);
    }
    if let Some(start) = obj.get("startDate").and_then(Value::as_str) {
        meta.fill_text("startDate", start);
    }
    if let Some(location) = str_field(obj, "location") {
        meta.fill_text("location", &location);
    }
}

fn parse_local_business(obj: &Value, meta: &mut Metadata) {
    if let Some(name) = str_field(obj, "name") {
        meta.fill_text("name", &name);
    }
    if let Some(Value::Object(address)) = obj.get("address") {
        let parts: Vec<String> = ["streetAddress", "addressLocality", "addressRegion"]
            .iter()
            .filter_map(|k| address.get(*k).and_then(Value::as_str))
            .map(|s| s.to_string())
            .collect();
        if !parts.is_empty() {
            meta.fill_text("address", &parts.join(", "));
        }
    } else if let Some(address) = obj.get("address").and_then(Value::as_str) {
        meta.fill_text("address", address);
    }
    if let Some(tel) = obj.get("telephone").and_then(Value::as_str) {
        meta.fill_text("telephone", tel);
    }
    if let Some(hours) = obj.get("openingHours").and_then(Value::as_str) {
        meta.fill_text("openingHours", hours);
    }
}

// ---------------------------------------------------------------------------
// ItemList extraction (listing/search pages)
// ---------------------------------------------------------------------------

fn parse_itemlist(data: &Value) -> Vec<IndexMap<String, Value>> {
    let Some(list) = find_typed(data, &|t| t == "ItemList", 0) else {
        return Vec::new();
    };
    let Some(Value::Array(elements)) = list.get("itemListElement") else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for el in elements {
        let product = el.get("item").unwrap_or(el);
        let name = str_field(product, "name").or_else(|| str_field(product, "headline"));
        let Some(name) = name else { continue };

        let mut item = IndexMap::new();
        item.insert("name".to_string(), Value::String(sanitize_text(&name)));
        if let Some(pos) = el.get("position").and_then(to_int) {
            item.insert("position".to_string(), Value::Number(pos.into()));
        }
        let mut offer_meta = Metadata::default();
        if let Some(offers) = product.get("offers") {
            parse_offers(offers, &mut offer_meta);
        }
        for (k, v) in offer_meta.fields {
            item.insert(k, v);
        }
        if let Some(brand) = str_field(product, "brand") {
            item.insert("brand".to_string(), Value::String(sanitize_text(&brand)));
        }
        if let Some(url) = product
            .get("url")
            .or_else(|| el.get("url"))
            .and_then(Value::as_str)
        {
            item.insert("url".to_string(), Value::String(url.to_string()));
        }
        items.push(item);
    }
    items
}

// ---------------------------------------------------------------------------
// itemprop (microdata) and OG passes
// ---------------------------------------------------------------------------

fn itemprop_pass(chunks: &[HtmlChunk], schema: SchemaName, meta: &mut Metadata) {
    let field_map: &[(&str, &str)] = match schema {
        SchemaName::Product => &[
            ("name", "name"),
            ("price", "price"),
            ("priceCurrency", "currency"),
            ("brand", "brand"),
            ("ratingValue", "rating"),
            ("reviewCount", "reviewCount"),
            ("availability", "availability"),
        ],
        SchemaName::Article | SchemaName::NewsArticle | SchemaName::WikiArticle => &[
            ("headline", "headline"),
            ("author", "author"),
            ("datePublished", "datePublished"),
        ],
        _ => return,
    };

    for chunk in chunks {
        let Some(prop) = chunk.attr("itemprop") else {
            continue;
        };
        let Some((_, field)) = field_map.iter().find(|(p, _)| *p == prop) else {
            continue;
        };
        let raw = chunk
            .attr("content")
            .map(str::to_string)
            .unwrap_or_else(|| chunk.text.trim().to_string());
        if raw.is_empty() {
            continue;
        }
        match *field {
            "price" | "rating" => {
                if let Some(f) = parse_float_str(&raw) {
                    if let Some(n) = serde_json::Number::from_f64(f) {
                        meta.fill(field, Value::Number(n));
                    }
                }
            }
            "reviewCount" => {
                if let Some(i) = parse_float_str(&raw).map(|f| f.round() as i64) {
                    meta.fill(field, Value::Number(i.into()));
                }
            }
            _ => meta.fill_text(field, &raw),
        }
    }
}

fn og_pass(meta_chunks: &[HtmlChunk], schema: SchemaName, meta: &mut Metadata) {
    let og_map: &[(&str, &str)] = match schema {
        SchemaName::Product => &[
            ("og:title", "name"),
            ("og:image", "image"),
            ("og:price:amount", "price"),
            ("og:price:currency", "currency"),
            ("product:price:amount", "price"),
            ("product:price:currency", "currency"),
        ],
        SchemaName::Article | SchemaName::NewsArticle | SchemaName::WikiArticle => &[
            ("og:title", "headline"),
            ("article:published_time", "datePublished"),
            ("article:author", "author"),
            ("og:site_name", "publisher"),
        ],
        SchemaName::VideoObject => &[
            ("og:title", "name"),
            ("og:image", "thumbnail_url"),
            ("og:video:duration", "duration"),
        ],
        _ => &[("og:title", "name"), ("og:site_name", "publisher")],
    };

    for chunk in meta_chunks {
        if chunk.chunk_type != ChunkType::Meta {
            continue;
        }
        for (og_key, field) in og_map {
            let Some(value) = chunk.attr(og_key) else {
                continue;
            };
            match *field {
                "price" => {
                    if let Some(f) = parse_float_str(value) {
                        if let Some(n) = serde_json::Number::from_f64(f) {
                            meta.fill("price", Value::Number(n));
                        }
                    }
                }
                "image" | "thumbnail_url" => {
                    if valid_image_url(value) {
                        meta.fill(field, Value::String(value.trim().to_string()));
                    }
                }
                _ => meta.fill_text(field, value),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Extract typed metadata from harvested META/RSC chunks plus the chunks
/// that carry microdata attributes.
///
/// Cascade priority: JSON-LD > itemprop > OG meta > h1 fallback. A JSON-LD
/// parse error is a partial degradation: it is skipped, never raised.
pub fn extract_metadata(
    meta_chunks: &[HtmlChunk],
    content_chunks: &[HtmlChunk],
    schema: SchemaName,
) -> Metadata {
    let mut meta = Metadata {
        schema: Some(schema),
        ..Default::default()
    };

    // JSON-LD pass
    for chunk in meta_chunks {
        if chunk.attr("type") != Some("application/ld+json") {
            continue;
        }
        let Ok(data) = serde_json::from_str::<Value>(&chunk.text) else {
            log::debug!("skipping unparseable JSON-LD block at {}", chunk.xpath);
            continue;
        };

        // The block's own type wins over the requested schema when recognized
        let effective = jsonld_schema(&data).unwrap_or(schema);
        if let Some(parser) = parser_for(effective) {
            if let Some(obj) = find_typed(
                &data,
                &|t| SchemaName::from_jsonld_type(t) == Some(effective),
                0,
            ) {
                if meta.schema == Some(SchemaName::Generic) || meta.fields.is_empty() {
                    meta.schema = Some(effective);
                }
                parser(obj, &mut meta);
            }
        }

        if meta.items.is_empty() {
            meta.items = parse_itemlist(&data);
        }
    }

    itemprop_pass(content_chunks, schema, &mut meta);
    og_pass(meta_chunks, schema, &mut meta);

    // h1 fallback for the name/headline slot
    let name_key = match schema {
        SchemaName::Article | SchemaName::NewsArticle | SchemaName::WikiArticle => "headline",
        _ => "name",
    };
    if !meta.fields.contains_key(name_key) {
        if let Some(h1) = content_chunks
            .iter()
            .find(|c| c.tag == "h1" && !c.text.trim().is_empty())
        {
            let text = h1.text.trim();
            if text.chars().count() > 3 && text.chars().count() < 300 {
                meta.fill_text(name_key, text);
            }
        }
    }

    if !meta.is_empty() {
        log::debug!(
            "metadata ({}): {:?}",
            schema,
            meta.fields.keys().collect::<Vec<_>>()
        );
    }
    meta
}
