//! Content sanitization for prompt-injection defense.
//!
//! Page-map output enters an LLM context directly, so every string the crate
//! emits — interactable names, chunk text, metadata values, titles — passes
//! through the same sanitizer. Sanitization is an invariant, not a policy.
//!
//! Layers:
//! 1. [`sanitize_text`] — short fields (names, titles, metadata values)
//! 2. [`sanitize_block`] — large blocks (the pruned `Info` context)
//! 3. [`content_boundary`] — wraps output with a nonce-tagged marker so
//!    malicious content cannot forge a closing tag
//! 4. [`scrub_secrets`] — redacts API-key/bearer-token patterns from
//!    user-visible error detail and log lines

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Default cap for short sanitized fields
pub const SHORT_FIELD_MAX: usize = 256;

/// Default cap for sanitized content blocks
pub const BLOCK_MAX: usize = 50_000;

// Role-prefix patterns that could trick an LLM, both line-start and
// bracketed mid-text forms like "[SYSTEM: ...]".
static ROLE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\[?\s*(?:SYSTEM|ASSISTANT|USER|HUMAN|AI|ADMIN|INSTRUCTION|OVERRIDE|IMPORTANT|IGNORE|HACK|COMMAND)\s*[:\]]\s*",
    )
    .expect("role prefix regex")
});

// ANSI escape sequences
static ANSI_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("ansi regex"));

// Boundary tags — prevents content from escaping the <web_content_*> wrapper
static BOUNDARY_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<\s*/?\s*web_content\w*[^>]*>").expect("boundary regex"));

// Numeric character references: &#39; and &#x27;
static NUMERIC_ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]{1,6}|[0-9]{1,7});").expect("entity regex"));

// Secret patterns scrubbed from error detail and logs
static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sk-[A-Za-z0-9_-]{8,}").expect("api key regex"));
static BEARER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Bearer\s+\S+").expect("bearer regex"));

/// Decode HTML entities: the common named set plus numeric references.
pub fn unescape_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut decoded = NUMERIC_ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let cp = if let Some(hex) = body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                body.parse::<u32>().ok()
            };
            match cp.and_then(char::from_u32) {
                Some(c) if !c.is_control() || c == '\n' || c == '\t' => c.to_string(),
                _ => String::new(),
            }
        })
        .into_owned();

    for (entity, replacement) in [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&hellip;", "…"),
        ("&mdash;", "—"),
        ("&ndash;", "–"),
        ("&middot;", "·"),
        ("&copy;", "©"),
        ("&reg;", "®"),
        ("&trade;", "™"),
        // Last so freshly decoded text is not re-interpreted
        ("&amp;", "&"),
    ] {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, replacement);
        }
    }
    decoded
}

/// Strip Unicode control characters: C0/C1 controls, zero-width characters,
/// bidi overrides, interlinear annotations. `keep_newlines` preserves
/// `\n`/`\t` for block content where structure matters.
fn strip_control_chars(text: &str, keep_newlines: bool) -> String {
    text.chars()
        .filter(|&c| {
            if c == '\n' || c == '\t' {
                return keep_newlines;
            }
            if c == '\r' {
                return false;
            }
            let cp = c as u32;
            // C0 + DEL + C1
            if c.is_control() || (0x7F..=0x9F).contains(&cp) {
                return false;
            }
            // Zero-width + bidi + word joiners + interlinear annotation + BOM
            !matches!(cp,
                0x200B..=0x200F
                | 0x202A..=0x202E
                | 0x2060..=0x2069
                | 0xFEFF
                | 0xFFF9..=0xFFFB)
        })
        .collect()
}

/// Collapse runs of spaces/tabs into a single space
fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c == ' ' || c == '\t' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            last_space = false;
            out.push(c);
        }
    }
    out
}

/// Truncate at a char boundary without splitting a code point
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Sanitize a short text field (element names, titles, metadata values).
///
/// Decodes entities, removes ANSI escapes and Unicode control characters,
/// collapses newlines into spaces, strips role-prefix patterns and boundary
/// tags, then truncates to [`SHORT_FIELD_MAX`] characters.
pub fn sanitize_text(text: &str) -> String {
    sanitize_text_with_limit(text, SHORT_FIELD_MAX)
}

/// [`sanitize_text`] with an explicit character cap
pub fn sanitize_text_with_limit(text: &str, max_chars: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = unescape_entities(text);
    let text = ANSI_ESCAPE_RE.replace_all(&text, "");
    let text = strip_control_chars(&text, false);
    let text = text.replace(['\n', '\r'], " ");
    let text = ROLE_PREFIX_RE.replace_all(&text, "");
    let text = BOUNDARY_TAG_RE.replace_all(&text, "");
    let text = collapse_spaces(&text);
    truncate_chars(text.trim(), max_chars)
}

/// Sanitize a large content block (the pruned context).
///
/// Same treatment as [`sanitize_text`] but newlines are preserved and the
/// length cap is [`BLOCK_MAX`] characters.
pub fn sanitize_block(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = unescape_entities(text);
    let text = ANSI_ESCAPE_RE.replace_all(&text, "");
    let text = strip_control_chars(&text, true);
    let text = ROLE_PREFIX_RE.replace_all(&text, "");
    let text = BOUNDARY_TAG_RE.replace_all(&text, "");
    truncate_chars(text.trim(), BLOCK_MAX)
}

/// Redact API-key and bearer-token patterns from a detail string.
///
/// Applied to every user-visible error detail and to log lines that echo
/// request data.
pub fn scrub_secrets(text: &str) -> String {
    let text = API_KEY_RE.replace_all(text, "sk-***");
    BEARER_RE.replace_all(&text, "Bearer ***").into_owned()
}

/// Wrap content with a nonce-tagged boundary marker identifying the source.
///
/// The nonce is derived from the content and source URL, so the output is
/// deterministic for identical inputs while malicious content cannot
/// pre-compute its own closing tag (it would need a hash fixpoint).
pub fn content_boundary(text: &str, source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_url.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let nonce: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();

    let tag = format!("web_content_{nonce}");
    let body = BOUNDARY_TAG_RE.replace_all(text, "");
    format!(
        "<{tag} source=\"{}\">\n{body}\n</{tag}>",
        escape_attr(source_url)
    )
}

/// Escape a string for use in an XML-like attribute
fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
