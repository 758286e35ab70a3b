//! Locale resolution, token budgeting, and multilingual term tables.
//!
//! Two layers, mirroring how the detection/rendering split works in practice:
//! detection term tables are universal (all languages merged, matched in one
//! pass, no locale parameter), while rendering labels are locale-specific.
//!
//! All token budgets in the pipeline flow through [`TokenBudgeter`] so that
//! CJK content is not silently starved: Korean runs ~0.6 chars per token
//! where English runs ~4.0.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Supported locales (the built-in host table covers all ten)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Ko,
    Ja,
    Zh,
    Fr,
    De,
    Es,
    It,
    Pt,
    Ru,
}

impl Locale {
    /// Locale code as it appears in URLs and `<html lang>` attributes
    pub fn code(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ko => "ko",
            Locale::Ja => "ja",
            Locale::Zh => "zh",
            Locale::Fr => "fr",
            Locale::De => "de",
            Locale::Es => "es",
            Locale::It => "it",
            Locale::Pt => "pt",
            Locale::Ru => "ru",
        }
    }

    /// Parse a locale code, accepting region suffixes (`en-US`, `zh_CN`)
    pub fn parse(code: &str) -> Option<Locale> {
        let primary = code
            .split(['-', '_'])
            .next()
            .unwrap_or(code)
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Locale::En),
            "ko" => Some(Locale::Ko),
            "ja" => Some(Locale::Ja),
            "zh" => Some(Locale::Zh),
            "fr" => Some(Locale::Fr),
            "de" => Some(Locale::De),
            "es" => Some(Locale::Es),
            "it" => Some(Locale::It),
            "pt" => Some(Locale::Pt),
            "ru" => Some(Locale::Ru),
            _ => None,
        }
    }

    /// Average characters per token for this locale's dominant script
    pub fn chars_per_token(&self) -> f64 {
        match self {
            Locale::En => 4.0,
            Locale::Ko => 0.6,
            Locale::Ja => 0.7,
            Locale::Zh => 0.7,
            Locale::Fr => 3.8,
            Locale::De => 3.6,
            Locale::Es => 3.8,
            Locale::It => 3.8,
            Locale::Pt => 3.8,
            Locale::Ru => 3.0,
        }
    }

    /// True for locales whose dominant script is CJK/Hangul
    pub fn is_cjk(&self) -> bool {
        matches!(self, Locale::Ko | Locale::Ja | Locale::Zh)
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale::En
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// URL-based locale resolution
// ---------------------------------------------------------------------------

// Well-known domains checked before the TLD fallback
const DOMAIN_LOCALES: &[(&str, Locale)] = &[
    ("coupang.com", Locale::Ko),
    ("musinsa.com", Locale::Ko),
    ("29cm.co.kr", Locale::Ko),
    ("ssfshop.com", Locale::Ko),
    ("wconcept.co.kr", Locale::Ko),
    ("thehandsome.com", Locale::Ko),
    ("naver.com", Locale::Ko),
    ("rakuten.co.jp", Locale::Ja),
    ("taobao.com", Locale::Zh),
    ("jd.com", Locale::Zh),
];

const TLD_LOCALES: &[(&str, Locale)] = &[
    (".co.kr", Locale::Ko),
    (".kr", Locale::Ko),
    (".co.jp", Locale::Ja),
    (".jp", Locale::Ja),
    (".cn", Locale::Zh),
    (".tw", Locale::Zh),
    (".fr", Locale::Fr),
    (".de", Locale::De),
    (".es", Locale::Es),
    (".it", Locale::It),
    (".pt", Locale::Pt),
    (".br", Locale::Pt),
    (".ru", Locale::Ru),
    (".co.uk", Locale::En),
    (".com", Locale::En),
];

/// Resolve the locale for a page.
///
/// Priority: explicit config table → URL path segment / subdomain →
/// well-known domain → TLD → `<html lang>` → default.
pub fn resolve_locale(
    url: &str,
    html_lang: Option<&str>,
    overrides: &HashMap<String, Locale>,
    default: Locale,
) -> Locale {
    if let Ok(parsed) = Url::parse(url) {
        let host = parsed.host_str().unwrap_or("");

        if let Some(&locale) = overrides.get(host) {
            return locale;
        }

        // Path segment: /ja/, /fr/ — only the first two segments count
        for segment in parsed.path().split('/').filter(|s| !s.is_empty()).take(2) {
            if segment.len() == 2 {
                if let Some(locale) = Locale::parse(segment) {
                    return locale;
                }
            }
        }

        // Subdomain: ja.example.com
        if let Some(sub) = host.split('.').next() {
            if sub.len() == 2 {
                if let Some(locale) = Locale::parse(sub) {
                    return locale;
                }
            }
        }

        for (domain, locale) in DOMAIN_LOCALES {
            if host == *domain || host.ends_with(&format!(".{domain}")) {
                return *locale;
            }
        }

        for (tld, locale) in TLD_LOCALES {
            if host.ends_with(tld) {
                return *locale;
            }
        }
    }

    if let Some(locale) = html_lang.and_then(Locale::parse) {
        return locale;
    }

    default
}

// ---------------------------------------------------------------------------
// Token budgeter
// ---------------------------------------------------------------------------

/// Rough CJK block check used for blending mixed-script estimates
fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x9FFF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF | 0xFF00..=0xFFEF)
}

/// Locale-aware character → token estimator.
///
/// Estimates blend the locale's base rate with the CJK rate by the observed
/// CJK character ratio, so an English page with a Korean review block is not
/// under-budgeted.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudgeter {
    locale: Locale,
}

impl TokenBudgeter {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Estimate the token count of `text`
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        // Sample the head for the script ratio; long pages are homogeneous
        // enough that 2000 chars is representative.
        let mut total = 0usize;
        let mut cjk = 0usize;
        for c in text.chars().take(2000) {
            total += 1;
            if is_cjk_char(c) {
                cjk += 1;
            }
        }
        let char_count = text.chars().count();
        if total == 0 {
            return 0;
        }
        let ratio = cjk as f64 / total as f64;
        let base = self.locale.chars_per_token().max(0.7);
        let cjk_rate = if self.locale.is_cjk() {
            self.locale.chars_per_token()
        } else {
            0.7
        };
        let effective = base * (1.0 - ratio) + cjk_rate * ratio;
        (char_count as f64 / effective).ceil() as usize
    }

    /// Split `total` tokens across sections by weight.
    ///
    /// Budgets are floored but the remainder goes to the heaviest section, so
    /// the pieces always sum to `total`.
    pub fn section_budgets(&self, total: usize, weights: &[f64]) -> Vec<usize> {
        let sum: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if sum <= 0.0 || weights.is_empty() {
            return vec![0; weights.len()];
        }
        let mut budgets: Vec<usize> = weights
            .iter()
            .map(|w| ((w.max(0.0) / sum) * total as f64).floor() as usize)
            .collect();
        let assigned: usize = budgets.iter().sum();
        if assigned < total {
            let heaviest = weights
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0);
            budgets[heaviest] += total - assigned;
        }
        budgets
    }

    /// Truncate `text` so the estimate fits within `max_tokens`.
    ///
    /// Cuts at a line boundary when one exists in the tail window, so the
    /// output does not end mid-sentence.
    pub fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
        if self.estimate(text) <= max_tokens {
            return text.to_string();
        }
        let cpt = {
            // Reuse the blended rate from estimate() via proportionality
            let total_tokens = self.estimate(text).max(1);
            text.chars().count() as f64 / total_tokens as f64
        };
        let keep_chars = ((max_tokens as f64) * cpt).floor() as usize;
        let truncated: String = text.chars().take(keep_chars).collect();
        match truncated.rfind('\n') {
            Some(pos) if pos > keep_chars.saturating_sub(200) => truncated[..pos].to_string(),
            _ => truncated,
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering labels (per-locale)
// ---------------------------------------------------------------------------

/// Locale-specific labels and templates used by the compressors
#[derive(Debug, Clone, Copy)]
pub struct LocaleLabels {
    pub title: &'static str,
    pub rating: &'static str,
    pub brand: &'static str,
    pub pagination: &'static str,
    pub next_available: &'static str,
    pub page_suffix: &'static str,
    pub default_currency: &'static str,
}

impl LocaleLabels {
    /// Labels for a locale; unsupported rendering locales fall back to English
    pub fn for_locale(locale: Locale) -> &'static LocaleLabels {
        match locale {
            Locale::Ko => &KO_LABELS,
            Locale::Ja => &JA_LABELS,
            Locale::Fr => &FR_LABELS,
            Locale::De => &DE_LABELS,
            _ => &EN_LABELS,
        }
    }

    /// "+{n} more" overflow line
    pub fn overflow(&self, n: usize) -> String {
        match self.title {
            "제목" => format!("외 {n}건"),
            "タイトル" => format!("他{n}件"),
            "Titre" => format!("+{n} de plus"),
            "Titel" => format!("+{n} weitere"),
            _ => format!("+{n} more"),
        }
    }

    /// "({count} reviews)" suffix
    pub fn reviews(&self, count: u64) -> String {
        match self.title {
            "제목" => format!("({count}개 리뷰)"),
            "タイトル" => format!("({count}件のレビュー)"),
            "Titre" => format!("({count} avis)"),
            "Titel" => format!("({count} Bewertungen)"),
            _ => format!("({count} reviews)"),
        }
    }
}

static EN_LABELS: LocaleLabels = LocaleLabels {
    title: "Title",
    rating: "Rating",
    brand: "Brand",
    pagination: "Pagination",
    next_available: "Next available",
    page_suffix: " pages",
    default_currency: "USD",
};

static KO_LABELS: LocaleLabels = LocaleLabels {
    title: "제목",
    rating: "평점",
    brand: "브랜드",
    pagination: "페이지네이션",
    next_available: "다음 있음",
    page_suffix: "페이지",
    default_currency: "KRW",
};

static JA_LABELS: LocaleLabels = LocaleLabels {
    title: "タイトル",
    rating: "評価",
    brand: "ブランド",
    pagination: "ページネーション",
    next_available: "次あり",
    page_suffix: "ページ",
    default_currency: "JPY",
};

static FR_LABELS: LocaleLabels = LocaleLabels {
    title: "Titre",
    rating: "Note",
    brand: "Marque",
    pagination: "Pagination",
    next_available: "Suivant disponible",
    page_suffix: " pages",
    default_currency: "EUR",
};

static DE_LABELS: LocaleLabels = LocaleLabels {
    title: "Titel",
    rating: "Bewertung",
    brand: "Marke",
    pagination: "Seitennavigation",
    next_available: "Weiter verfügbar",
    page_suffix: " Seiten",
    default_currency: "EUR",
};

// ---------------------------------------------------------------------------
// Universal detection terms (all languages merged, single-pass matching)
// ---------------------------------------------------------------------------

pub const PRICE_TERMS: &[&str] = &[
    "₩", "$", "¥", "€", "£", "CHF", "SEK", "USD", "EUR", "GBP", "JPY", "KRW", "kr", "R$", "원",
    "円", "元",
];

pub const RATING_TERMS: &[&str] = &[
    "★", "평점", "별점", "stars", "rating", "rated", "評価", "レビュー", "étoile", "Bewertung",
    "Sterne",
];

pub const REVIEW_COUNT_TERMS: &[&str] = &[
    "개", "건", "리뷰", "review", "reviews", "レビュー", "件", "avis", "Bewertungen", "Rezension",
];

pub const BRAND_TERMS: &[&str] = &[
    "브랜드", "제조사", "brand", "manufacturer", "ブランド", "メーカー", "marque", "fabricant",
    "Marke", "Hersteller",
];

pub const OPTION_TERMS: &[&str] = &[
    "사이즈", "컬러", "색상", "옵션", "size", "color", "colour", "option", "サイズ", "カラー",
    "taille", "couleur", "Größe", "Farbe",
];

pub const FILTER_TERMS: &[&str] = &[
    "필터", "정렬", "카테고리", "filter", "sort", "category", "フィルター", "並び替え", "filtre",
    "tri", "Sortieren", "Kategorie",
];

pub const LISTING_TERMS: &[&str] = &[
    "베스트", "랭킹", "인기", "신상품", "best", "ranking", "new arrival", "new in", "ベスト",
    "ランキング", "人気", "nouveautés", "Bestseller", "Neuheiten",
];

pub const SEARCH_RESULT_TERMS: &[&str] = &[
    "검색결과", "개의 상품", "search results", "results", "items", "検索結果", "件の商品",
    "résultats", "produits", "Suchergebnisse", "Ergebnisse", "Produkte",
];

pub const NEXT_BUTTON_TERMS: &[&str] = &[
    "다음", "다음 페이지", "Next", "next", "Next Page", "次へ", "次のページ", "Suivant",
    "Page suivante", "Weiter", "Nächste Seite",
];

pub const LOAD_MORE_TERMS: &[&str] = &[
    "더보기", "더 보기", "Load more", "Show more", "View more", "もっと見る", "さらに表示",
    "Voir plus", "Mehr laden", "Mehr anzeigen",
];
