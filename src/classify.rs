//! Weighted-voting page classifier.
//!
//! Three signal layers — URL, meta (title / og:type / JSON-LD `@type`), and
//! DOM structure — vote simultaneously; each signal can push multiple page
//! types up or down. A short-circuit skips the HTML layers when the URL alone
//! is decisive, except that blocked-page signals are always evaluated:
//! captcha interstitials can appear under any URL shape.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::SchemaName;

/// Page types the classifier distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    ProductDetail,
    ProductListing,
    Article,
    NewsPortal,
    Video,
    Wiki,
    Login,
    Form,
    Checkout,
    Dashboard,
    HelpFaq,
    Settings,
    Error,
    Documentation,
    Landing,
    Blocked,
    Unknown,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::ProductDetail => "product_detail",
            PageType::ProductListing => "product_listing",
            PageType::Article => "article",
            PageType::NewsPortal => "news_portal",
            PageType::Video => "video",
            PageType::Wiki => "wiki",
            PageType::Login => "login",
            PageType::Form => "form",
            PageType::Checkout => "checkout",
            PageType::Dashboard => "dashboard",
            PageType::HelpFaq => "help_faq",
            PageType::Settings => "settings",
            PageType::Error => "error",
            PageType::Documentation => "documentation",
            PageType::Landing => "landing",
            PageType::Blocked => "blocked",
            PageType::Unknown => "unknown",
        }
    }

    /// Schema the extractor and compressor should run under
    pub fn schema(&self) -> SchemaName {
        match self {
            PageType::ProductDetail | PageType::ProductListing | PageType::Checkout => {
                SchemaName::Product
            }
            PageType::Article => SchemaName::Article,
            PageType::NewsPortal => SchemaName::NewsArticle,
            PageType::Video => SchemaName::VideoObject,
            PageType::Wiki => SchemaName::WikiArticle,
            PageType::HelpFaq => SchemaName::FaqPage,
            PageType::Landing => SchemaName::LocalBusiness,
            _ => SchemaName::Generic,
        }
    }
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anti-bot provider detected on a blocked page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BlockedKind {
    Cloudflare,
    Recaptcha,
    Hcaptcha,
    Turnstile,
    Datadome,
    Perimeterx,
    Imperva,
    Waf,
}

impl BlockedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockedKind::Cloudflare => "cloudflare",
            BlockedKind::Recaptcha => "recaptcha",
            BlockedKind::Hcaptcha => "hcaptcha",
            BlockedKind::Turnstile => "turnstile",
            BlockedKind::Datadome => "datadome",
            BlockedKind::Perimeterx => "perimeterx",
            BlockedKind::Imperva => "imperva",
            BlockedKind::Waf => "waf",
        }
    }
}

/// Result of classifying one page
#[derive(Debug, Clone)]
pub struct Classification {
    pub page_type: PageType,
    /// 0.0–1.0, score relative to twice the type threshold
    pub confidence: f64,
    pub score: i32,
    /// Names of the signals that fired, in evaluation order
    pub signals: Vec<&'static str>,
    pub runner_up: Option<PageType>,
    /// Set when `page_type` is [`PageType::Blocked`]
    pub blocked_kind: Option<BlockedKind>,
}

// ---------------------------------------------------------------------------
// Signal registry
// ---------------------------------------------------------------------------

struct SignalDef {
    name: &'static str,
    scores: &'static [(PageType, i32)],
    check: fn(&str) -> bool,
}

use PageType::*;

// URL signals run on the lowercased URL.
static URL_SIGNALS: &[SignalDef] = &[
    // product_detail
    SignalDef { name: "url_vp_products", scores: &[(ProductDetail, 25)], check: |u| u.contains("/vp/products/") },
    SignalDef { name: "url_products", scores: &[(ProductDetail, 20)], check: |u| u.contains("/products/") },
    SignalDef { name: "url_goods", scores: &[(ProductDetail, 20)], check: |u| u.contains("/good") && !u.contains("/goodbye") },
    SignalDef { name: "url_item", scores: &[(ProductDetail, 20)], check: |u| u.contains("/item/") },
    SignalDef { name: "url_product_slash", scores: &[(ProductDetail, 25)], check: |u| u.contains("/product/") || u.contains("/product.") },
    SignalDef { name: "url_dp", scores: &[(ProductDetail, 20)], check: |u| u.contains("/dp/") },
    // product_listing
    SignalDef { name: "url_search", scores: &[(ProductListing, 25)], check: |u| u.contains("/search") },
    SignalDef { name: "url_query_param", scores: &[(ProductListing, 25)], check: |u| {
        ["?q=", "&q=", "?query=", "&query=", "?keyword=", "&keyword=", "?searchterm=", "&searchterm="]
            .iter().any(|p| u.contains(p))
    } },
    SignalDef { name: "url_browse", scores: &[(ProductListing, 20)], check: |u| u.contains("/browse") },
    SignalDef { name: "url_category", scores: &[(ProductListing, 25)], check: |u| u.contains("/category/") || u.contains("/categories/") },
    SignalDef { name: "url_list", scores: &[(ProductListing, 20)], check: |u| u.contains("/list") && !u.contains("/listing") },
    SignalDef { name: "url_ranking", scores: &[(ProductListing, 20)], check: |u| u.contains("/ranking") || u.contains("/best") },
    SignalDef { name: "url_gender_path", scores: &[(ProductListing, 20), (ProductDetail, -5)], check: |u| {
        ["/men/", "/women/", "/man/", "/woman/", "/men.", "/women."].iter().any(|p| u.contains(p))
    } },
    // article
    SignalDef { name: "url_article", scores: &[(Article, 25), (NewsPortal, 5)], check: |u| u.contains("/article/") || u.contains("/articles/") },
    SignalDef { name: "url_blog", scores: &[(Article, 25)], check: |u| u.contains("/blog/") || u.contains("/post/") },
    SignalDef { name: "url_news", scores: &[(NewsPortal, 15), (Article, 10)], check: |u| u.contains("/news/") || u.contains("news.") },
    // wiki
    SignalDef { name: "url_wiki", scores: &[(Wiki, 30)], check: |u| u.contains("/wiki/") },
    SignalDef { name: "url_wikipedia_domain", scores: &[(Wiki, 15), (Dashboard, -15)], check: |u| u.contains("wikipedia.org") },
    // video
    SignalDef { name: "url_watch", scores: &[(Video, 30)], check: |u| u.contains("/watch") || u.contains("youtube.com") || u.contains("youtu.be") },
    SignalDef { name: "url_video", scores: &[(Video, 20)], check: |u| u.contains("/video/") || u.contains("/videos/") },
    // login
    SignalDef { name: "url_login", scores: &[(Login, 25), (Form, -10)], check: |u| u.contains("/login") || u.contains("/signin") || u.contains("/sign-in") },
    SignalDef { name: "url_auth", scores: &[(Login, 20)], check: |u| u.contains("/auth") && !u.contains("/author") },
    // checkout
    SignalDef { name: "url_checkout", scores: &[(Checkout, 25), (ProductDetail, -10)], check: |u| u.contains("/checkout") || u.contains("/payment") },
    SignalDef { name: "url_order", scores: &[(Checkout, 20)], check: |u| u.contains("/order") && !u.contains("/orders") },
    // form
    SignalDef { name: "url_register", scores: &[(Form, 20), (Login, -10)], check: |u| u.contains("/register") || u.contains("/signup") || u.contains("/sign-up") },
    SignalDef { name: "url_contact", scores: &[(Form, 20)], check: |u| u.contains("/contact") || u.contains("/apply") },
    // dashboard
    SignalDef { name: "url_dashboard", scores: &[(Dashboard, 20)], check: |u| u.contains("/dashboard") || u.contains("/admin") || u.contains("/analytics") },
    // help_faq
    SignalDef { name: "url_faq", scores: &[(HelpFaq, 20), (Article, -10)], check: |u| u.contains("/faq") },
    SignalDef { name: "url_help", scores: &[(HelpFaq, 20)], check: |u| u.contains("/help") || u.contains("/support") },
    // settings
    SignalDef { name: "url_settings", scores: &[(Settings, 20), (Form, -10)], check: |u| u.contains("/settings") || u.contains("/preferences") },
    SignalDef { name: "url_profile_edit", scores: &[(Settings, 20)], check: |u| u.contains("/profile/edit") || u.contains("/account/edit") },
    // error
    SignalDef { name: "url_404", scores: &[(Error, 15)], check: |u| u.contains("/404") || u.contains("/error") },
    // documentation
    SignalDef { name: "url_docs", scores: &[(Documentation, 20), (Article, -5)], check: |u| u.contains("/docs") || u.contains("/documentation") },
    SignalDef { name: "url_api_ref", scores: &[(Documentation, 25)], check: |u| u.contains("/api-reference") || u.contains("/api-docs") },
    // landing
    SignalDef { name: "url_root", scores: &[(Landing, 30), (ProductListing, -10)], check: is_root_url },
    // blocked
    SignalDef { name: "url_sorry", scores: &[(Blocked, 30)], check: |u| u.contains("/sorry/") },
    SignalDef { name: "url_captcha", scores: &[(Blocked, 25), (Error, -10)], check: |u| u.contains("/captcha") },
    SignalDef { name: "url_challenge", scores: &[(Blocked, 25), (Error, -10)], check: |u| u.contains("/challenge") && !u.contains("/challenges") },
    SignalDef { name: "url_cf_verify", scores: &[(Blocked, 30)], check: |u| u.contains("challenge-platform") || u.contains("cf-browser-verification") },
];

// Meta signals run on the lowercased HTML (title contents, og:type).
static META_SIGNALS: &[SignalDef] = &[
    SignalDef { name: "meta_title_login", scores: &[(Login, 15)], check: |h| {
        title_contains(h, &["login", "sign in", "log in", "로그인", "ログイン", "se connecter", "anmelden"])
    } },
    SignalDef { name: "meta_title_error", scores: &[(Error, 35)], check: |h| {
        title_contains(h, &["404", "500", "not found", "page not found", "페이지를 찾을 수 없", "ページが見つかりません"])
    } },
    SignalDef { name: "meta_title_faq", scores: &[(HelpFaq, 15)], check: |h| {
        title_contains(h, &["faq", "frequently asked", "자주 묻는 질문", "よくある質問", "help center", "도움말"])
    } },
    SignalDef { name: "meta_og_article", scores: &[(Article, 20)], check: |h| og_type_is(h, "article") },
    SignalDef { name: "meta_og_video", scores: &[(Video, 25)], check: |h| og_type_is(h, "video") || og_type_is(h, "video.other") },
    SignalDef { name: "meta_og_product", scores: &[(ProductDetail, 20)], check: |h| og_type_is(h, "product") },
    SignalDef { name: "meta_title_blocked", scores: &[(Blocked, 30), (Error, -15)], check: |h| {
        title_contains(h, &["access denied", "attention required", "please verify", "just a moment",
                            "you have been blocked", "접근이 거부", "アクセスが拒否"])
    } },
];

// DOM signals run on the lowercased HTML.
static DOM_SIGNALS: &[SignalDef] = &[
    // login
    SignalDef { name: "dom_password_input", scores: &[(Login, 30), (Form, -15), (Settings, -10)], check: |h| {
        h.contains("type=\"password\"") || h.contains("type='password'")
    } },
    SignalDef { name: "dom_remember_me", scores: &[(Login, 20)], check: |h| h.contains("remember") && h.contains("checkbox") },
    // checkout
    SignalDef { name: "dom_cc_fields", scores: &[(Checkout, 30), (Form, -10)], check: |h| {
        h.contains("autocomplete=\"cc-") || h.contains("autocomplete='cc-")
    } },
    SignalDef { name: "dom_shipping_fields", scores: &[(Checkout, 20)], check: |h| {
        h.contains("autocomplete=\"shipping") || h.contains("name=\"shipping")
    } },
    // form (not login)
    SignalDef { name: "dom_many_fields_no_password", scores: &[(Form, 25), (Login, -20)], check: |h| {
        count_occurrences(h, "<input") > 5 && !h.contains("type=\"password\"") && !h.contains("type='password'")
    } },
    SignalDef { name: "dom_textarea", scores: &[(Form, 15)], check: |h| h.contains("<textarea") },
    SignalDef { name: "dom_fieldset", scores: &[(Form, 20)], check: |h| count_occurrences(h, "<fieldset") >= 2 },
    // dashboard
    SignalDef { name: "dom_many_tables", scores: &[(Dashboard, 25), (Article, -10)], check: |h| count_occurrences(h, "<table") >= 2 },
    SignalDef { name: "dom_chart_elements", scores: &[(Dashboard, 25)], check: |h| {
        count_occurrences(h, "<canvas") + count_occurrences(h, "<svg") >= 3
    } },
    SignalDef { name: "dom_sidebar_nav", scores: &[(Dashboard, 20)], check: |h| {
        h.contains("role=\"navigation\"") && (h.contains("sidebar") || h.contains("side-nav") || h.contains("sidenav"))
    } },
    // help_faq
    SignalDef { name: "dom_details_elements", scores: &[(HelpFaq, 30), (Article, -10)], check: |h| count_occurrences(h, "<details") >= 3 },
    SignalDef { name: "dom_qa_pattern", scores: &[(HelpFaq, 20)], check: |h| {
        count_occurrences(h, "question") >= 3 || count_occurrences(h, "faq-item") >= 2 || count_occurrences(h, "accordion") >= 2
    } },
    // settings
    SignalDef { name: "dom_switch_role", scores: &[(Settings, 15), (Form, -10), (Login, -15)], check: |h| h.contains("role=\"switch\"") },
    SignalDef { name: "dom_many_selects", scores: &[(Settings, 10)], check: |h| count_occurrences(h, "<select") >= 3 },
    // error
    SignalDef { name: "dom_very_short_content", scores: &[(Error, 20)], check: |h| stripped_text_len(h) < 200 },
    SignalDef { name: "dom_not_found_text", scores: &[(Error, 25)], check: |h| {
        ["page not found", "페이지를 찾을 수 없", "ページが見つかりません", "page introuvable", "seite nicht gefunden"]
            .iter().any(|kw| h.contains(kw))
    } },
    // documentation
    SignalDef { name: "dom_code_blocks", scores: &[(Documentation, 30), (Article, -5)], check: |h| {
        count_occurrences(h, "<code") + count_occurrences(h, "<pre") >= 3
    } },
    SignalDef { name: "dom_toc_sidebar", scores: &[(Documentation, 25)], check: |h| {
        (h.contains("sidebar") || h.contains("side-nav") || h.contains("sidenav"))
            && (h.contains("table-of-contents") || h.contains("\"toc\"") || h.contains(" toc "))
    } },
    // article / news portal / wiki
    SignalDef { name: "dom_mw_content", scores: &[(Wiki, 25), (Dashboard, -20)], check: |h| {
        h.contains("mw-content-text") || h.contains("mw-parser-output")
    } },
    SignalDef { name: "dom_article_cluster", scores: &[(NewsPortal, 30), (Article, -5)], check: |h| {
        count_occurrences(h, "<article") >= 3
    } },
    SignalDef { name: "dom_single_article", scores: &[(Article, 10)], check: |h| count_occurrences(h, "<article") == 1 },
    // video
    SignalDef { name: "dom_video_element", scores: &[(Video, 20)], check: |h| h.contains("<video") },
    // landing
    SignalDef { name: "dom_hero_cta", scores: &[(Landing, 20), (Article, -10), (ProductListing, -10)], check: |h| {
        (h.contains("hero") || h.contains("jumbotron"))
            && (h.contains("cta") || h.contains("call-to-action") || h.contains("get-started") || h.contains("sign-up"))
    } },
    SignalDef { name: "dom_many_sections", scores: &[(Landing, 15)], check: |h| count_occurrences(h, "<section") >= 5 },
    // product_detail
    SignalDef { name: "dom_add_to_cart", scores: &[(ProductDetail, 20)], check: |h| {
        ["add to cart", "add to bag", "add to basket", "buy now", "장바구니", "카트에 담기", "구매하기",
         "바로구매", "カートに入れる", "今すぐ買う", "ajouter au panier", "in den warenkorb",
         "加入购物车", "立即购买", "añadir al carrito", "comprar ahora"]
            .iter().any(|kw| h.contains(kw))
    } },
    // blocked
    SignalDef { name: "dom_captcha_element", scores: &[(Blocked, 30), (Error, -10)], check: |h| {
        ["g-recaptcha", "h-captcha", "cf-turnstile", "challenge-form", "captcha-container"]
            .iter().any(|kw| h.contains(kw))
    } },
    SignalDef { name: "dom_modern_antibot", scores: &[(Blocked, 25)], check: |h| {
        ["datadome", "px-captcha", "human-challenge", "incapsula", "_incap_"].iter().any(|kw| h.contains(kw))
    } },
    SignalDef { name: "dom_blocked_short", scores: &[(Blocked, 35), (Error, -10)], check: |h| {
        stripped_text_len(h) < 2000
            && ["access denied", "access blocked", "forbidden", "접근이 거부", "アクセスが拒否"]
                .iter().any(|kw| h.contains(kw))
    } },
    SignalDef { name: "dom_cf_challenge", scores: &[(Blocked, 35)], check: |h| {
        ["cf-browser-verification", "challenge-platform", "cf-chl-bypass", "challenge-running"]
            .iter().any(|kw| h.contains(kw))
    } },
    SignalDef { name: "dom_just_a_moment", scores: &[(Blocked, 30)], check: |h| {
        h.contains("just a moment") && stripped_text_len(h) < 2000
    } },
];

// JSON-LD @type weights — parsed once per page, not per signal
fn jsonld_vote(html: &str) -> Option<(PageType, i32)> {
    static JSONLD_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?is)<script[^>]*type=["']application/ld\+json["'][^>]*>(.*?)</script>"#)
            .expect("jsonld regex")
    });
    for caps in JSONLD_RE.captures_iter(html) {
        let Ok(data) = serde_json::from_str::<Value>(caps[1].trim()) else {
            continue;
        };
        if let Some(schema) = crate::extract::jsonld_schema(&data) {
            let vote = match schema {
                SchemaName::Product => Some((ProductDetail, 40)),
                // A single NewsArticle is an article; the <article>-cluster
                // DOM signal is what promotes a front page to news_portal.
                SchemaName::NewsArticle => Some((Article, 30)),
                SchemaName::Article => Some((Article, 40)),
                SchemaName::VideoObject => Some((Video, 40)),
                SchemaName::WikiArticle => Some((Wiki, 40)),
                SchemaName::FaqPage => Some((HelpFaq, 40)),
                SchemaName::Event | SchemaName::LocalBusiness => Some((Landing, 35)),
                _ => None,
            };
            if vote.is_some() {
                return vote;
            }
        }
    }
    None
}

/// `@type` values that override the URL/DOM vote outright
pub fn schema_override(schema: SchemaName) -> Option<PageType> {
    match schema {
        SchemaName::WikiArticle => Some(PageType::Wiki),
        SchemaName::VideoObject => Some(PageType::Video),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

fn threshold(page_type: PageType) -> i32 {
    match page_type {
        Error | Landing => 25,
        Unknown => 50,
        _ => 20,
    }
}

// Positive DOM contribution is capped per type so structure counting cannot
// overwhelm URL + JSON-LD evidence.
const DOM_CAP: i32 = 40;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_root_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let path = parsed.path().trim_end_matches('/');
            path.is_empty() || path.starts_with("/index")
        }
        Err(_) => false,
    }
}

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex"));
static OG_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)property=["']og:type["'][^>]*content=["']([^"']+)"#).expect("og:type regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

fn title_contains(html: &str, terms: &[&str]) -> bool {
    let Some(caps) = TITLE_RE.captures(html) else {
        return false;
    };
    let title = caps[1].to_lowercase();
    terms.iter().any(|t| title.contains(t))
}

fn og_type_is(html: &str, expected: &str) -> bool {
    OG_TYPE_RE
        .captures(html)
        .map(|caps| caps[1].eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

fn stripped_text_len(html: &str) -> usize {
    TAG_RE.replace_all(html, "").trim().len()
}

// ---------------------------------------------------------------------------
// Core classifier
// ---------------------------------------------------------------------------

/// Classify a page from its URL and (optionally) raw HTML.
pub fn classify_page(url: &str, raw_html: Option<&str>) -> Classification {
    let url_lower = url.to_lowercase();
    let mut scores: Vec<(PageType, i32)> = Vec::new();
    let mut fired: Vec<&'static str> = Vec::new();

    let add = |scores: &mut Vec<(PageType, i32)>, ptype: PageType, weight: i32| {
        match scores.iter_mut().find(|(t, _)| *t == ptype) {
            Some((_, s)) => *s += weight,
            None => scores.push((ptype, weight)),
        }
    };

    for sig in URL_SIGNALS {
        if (sig.check)(&url_lower) {
            fired.push(sig.name);
            for &(ptype, weight) in sig.scores {
                add(&mut scores, ptype, weight);
            }
        }
    }

    // Short-circuit: decisive URL evidence skips the HTML layers
    let short_circuit = scores
        .iter()
        .max_by_key(|(_, s)| *s)
        .map(|&(t, s)| s > threshold(t) * 2)
        .unwrap_or(false);

    if let Some(html) = raw_html {
        let html_lower = html.to_lowercase();
        let mut dom_positive: Vec<(PageType, i32)> = Vec::new();

        let run_meta_dom = |only_blocked: bool,
                            scores: &mut Vec<(PageType, i32)>,
                            dom_positive: &mut Vec<(PageType, i32)>,
                            fired: &mut Vec<&'static str>| {
            for sig in META_SIGNALS {
                if only_blocked && !sig.scores.iter().any(|(t, _)| *t == Blocked) {
                    continue;
                }
                if (sig.check)(&html_lower) {
                    fired.push(sig.name);
                    for &(ptype, weight) in sig.scores {
                        match scores.iter_mut().find(|(t, _)| *t == ptype) {
                            Some((_, s)) => *s += weight,
                            None => scores.push((ptype, weight)),
                        }
                    }
                }
            }
            for sig in DOM_SIGNALS {
                if only_blocked && !sig.scores.iter().any(|(t, _)| *t == Blocked) {
                    continue;
                }
                if (sig.check)(&html_lower) {
                    fired.push(sig.name);
                    for &(ptype, weight) in sig.scores {
                        match scores.iter_mut().find(|(t, _)| *t == ptype) {
                            Some((_, s)) => *s += weight,
                            None => scores.push((ptype, weight)),
                        }
                        if weight > 0 {
                            match dom_positive.iter_mut().find(|(t, _)| *t == ptype) {
                                Some((_, s)) => *s += weight,
                                None => dom_positive.push((ptype, weight)),
                            }
                        }
                    }
                }
            }
        };

        if short_circuit {
            // Blocked signals are a safety override and always run
            run_meta_dom(true, &mut scores, &mut dom_positive, &mut fired);
        } else {
            run_meta_dom(false, &mut scores, &mut dom_positive, &mut fired);
            if let Some((ptype, weight)) = jsonld_vote(html) {
                fired.push("meta_jsonld");
                add(&mut scores, ptype, weight);
            }
        }

        // Clamp excess positive DOM contribution per type
        for &(ptype, total) in &dom_positive {
            if total > DOM_CAP {
                add(&mut scores, ptype, DOM_CAP - total);
            }
        }
    }

    let blocked_kind = if scores
        .iter()
        .any(|&(t, s)| t == Blocked && s >= threshold(Blocked))
    {
        raw_html.and_then(detect_blocked_kind).or(Some(BlockedKind::Waf))
    } else {
        None
    };

    if scores.is_empty() {
        return Classification {
            page_type: PageType::Unknown,
            confidence: 0.0,
            score: 0,
            signals: fired,
            runner_up: None,
            blocked_kind: None,
        };
    }

    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
    // Blocked wins outright once over threshold, regardless of other votes
    let (winner, winner_score) = if blocked_kind.is_some() {
        let blocked_score = scores
            .iter()
            .find(|(t, _)| *t == Blocked)
            .map(|(_, s)| *s)
            .unwrap_or(0);
        (Blocked, blocked_score)
    } else {
        sorted[0]
    };

    let thresh = threshold(winner);
    let runner_up = sorted
        .iter()
        .find(|(t, _)| *t != winner)
        .map(|(t, _)| *t);

    if winner_score < thresh {
        return Classification {
            page_type: PageType::Unknown,
            confidence: (winner_score as f64 / (thresh * 2) as f64).min(1.0),
            score: winner_score,
            signals: fired,
            runner_up,
            blocked_kind: None,
        };
    }

    log::debug!(
        "classified as {} (score {winner_score}, {} signals)",
        winner.as_str(),
        fired.len()
    );

    Classification {
        page_type: winner,
        confidence: (winner_score as f64 / (thresh * 2) as f64).min(1.0),
        score: winner_score,
        signals: fired,
        runner_up,
        blocked_kind,
    }
}

/// Identify the anti-bot provider from page content
fn detect_blocked_kind(html: &str) -> Option<BlockedKind> {
    let h = html.to_lowercase();
    if h.contains("cf-turnstile") || h.contains("turnstile") {
        Some(BlockedKind::Turnstile)
    } else if h.contains("g-recaptcha") || h.contains("recaptcha") {
        Some(BlockedKind::Recaptcha)
    } else if h.contains("h-captcha") || h.contains("hcaptcha") {
        Some(BlockedKind::Hcaptcha)
    } else if h.contains("datadome") {
        Some(BlockedKind::Datadome)
    } else if h.contains("px-captcha") || h.contains("perimeterx") || h.contains("human-challenge") {
        Some(BlockedKind::Perimeterx)
    } else if h.contains("incapsula") || h.contains("_incap_") || h.contains("imperva") {
        Some(BlockedKind::Imperva)
    } else if h.contains("cloudflare")
        || h.contains("cf-browser-verification")
        || h.contains("challenge-platform")
        || h.contains("just a moment")
    {
        Some(BlockedKind::Cloudflare)
    } else {
        None
    }
}
