//! PageMap serialization: agent prompt, JSON, and diff forms.
//!
//! The agent-prompt layout is a parsing contract — field order and
//! punctuation are stable:
//!
//! ```text
//! URL: <final_url>
//! Title: <title>
//! Type: <page_type>
//!
//! ## Actions
//! [<ref>] <role>: <name> (<affordances>) [options=...]
//!
//! ## Info
//! <compressed content>
//!
//! ## Images
//!   [<n>] <url>
//!
//! ## Meta
//! Tokens: ~<N> | Interactables: <M> | Generation: <T>ms
//! ```

use crate::config::PageMapConfig;
use crate::error::Result;
use crate::locale::TokenBudgeter;
use crate::map::PageMap;
use crate::sanitize::{content_boundary, sanitize_text};

/// Render the canonical agent prompt.
pub fn to_agent_prompt(page_map: &PageMap) -> String {
    let budgeter = TokenBudgeter::new(page_map.locale);
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("URL: {}", page_map.final_url));
    if !page_map.title.is_empty() {
        lines.push(format!("Title: {}", sanitize_text(&page_map.title)));
    }
    lines.push(format!("Type: {}", page_map.page_type));
    lines.push(String::new());

    if !page_map.interactables.is_empty() {
        lines.push("## Actions".to_string());
        for item in &page_map.interactables {
            lines.push(item.prompt_line());
        }
        lines.push(String::new());
    }

    if !page_map.pruned_context.is_empty() {
        lines.push("## Info".to_string());
        lines.push(content_boundary(&page_map.pruned_context, &page_map.final_url));
        lines.push(String::new());
    }

    if !page_map.images.is_empty() {
        lines.push("## Images".to_string());
        for (i, url) in page_map.images.iter().take(5).enumerate() {
            lines.push(format!("  [{}] {url}", i + 1));
        }
        lines.push(String::new());
    }

    let body = lines.join("\n");
    let total_tokens = budgeter.estimate(&body);
    let mut out = body;
    out.push_str("## Meta\n");
    out.push_str(&format!(
        "Tokens: ~{total_tokens} | Interactables: {} | Generation: {}ms",
        page_map.interactables.len(),
        page_map.stats.generation_ms
    ));
    if !page_map.stats.pruning_warnings.is_empty() {
        out.push_str(&format!(
            "\nWarnings: {}",
            page_map.stats.pruning_warnings.join("; ")
        ));
    }
    out
}

/// Loss-less JSON form.
pub fn to_json(page_map: &PageMap) -> Result<String> {
    Ok(serde_json::to_string_pretty(page_map)?)
}

/// Diff form against the previous PageMap for the same URL: unchanged
/// sections collapse to `— unchanged`, changed sections re-render in full.
pub fn to_diff(current: &PageMap, previous: &PageMap) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("URL: {}", current.final_url));
    if !current.title.is_empty() {
        lines.push(format!("Title: {}", sanitize_text(&current.title)));
    }
    lines.push(format!("Type: {}", current.page_type));
    lines.push(String::new());

    lines.push("## Actions".to_string());
    let actions_equal = current.fingerprint.dom_structure_hash
        == previous.fingerprint.dom_structure_hash
        && current.interactables.len() == previous.interactables.len();
    if actions_equal {
        lines.push("— unchanged".to_string());
    } else {
        for item in &current.interactables {
            lines.push(item.prompt_line());
        }
    }
    lines.push(String::new());

    lines.push("## Info".to_string());
    if current.pruned_context == previous.pruned_context {
        lines.push("— unchanged".to_string());
    } else {
        lines.push(content_boundary(&current.pruned_context, &current.final_url));
    }
    lines.push(String::new());

    lines.push("## Images".to_string());
    if current.images == previous.images {
        lines.push("— unchanged".to_string());
    } else {
        for (i, url) in current.images.iter().take(5).enumerate() {
            lines.push(format!("  [{}] {url}", i + 1));
        }
    }
    lines.push(String::new());

    lines.push("## Meta".to_string());
    lines.push(format!(
        "Tokens: ~{} | Interactables: {} | Generation: {}ms",
        current.stats.total_tokens,
        current.interactables.len(),
        current.stats.generation_ms
    ));

    lines.join("\n")
}

/// Truncate serialized output at the configured byte cap, appending a tail
/// marker that names the recovery action.
pub fn guard_output_size(text: String, config: &PageMapConfig) -> String {
    if text.len() <= config.max_text_bytes {
        return text;
    }
    let mut cut = config.max_text_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    log::warn!(
        "output truncated: {} bytes exceeds limit of {}",
        text.len(),
        config.max_text_bytes
    );
    format!(
        "{}\n[output truncated at {} bytes — rebuild with a smaller token budget or request the JSON form]",
        &text[..cut],
        config.max_text_bytes
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::PageType;
    use crate::detect::{Affordance, Bucket, Interactable};
    use crate::extract::{Metadata, SchemaName};
    use crate::locale::Locale;
    use crate::map::{Fingerprint, PageMapStats};

    fn sample_map() -> PageMap {
        PageMap {
            url: "https://shop.example.com/item/1".into(),
            final_url: "https://shop.example.com/item/1".into(),
            title: "Leather Jacket".into(),
            locale: Locale::En,
            page_type: PageType::ProductDetail,
            schema_name: SchemaName::Product,
            blocked_info: None,
            interactables: vec![Interactable {
                ref_id: 1,
                role: "button".into(),
                name: "Add to Cart".into(),
                affordances: vec![Affordance::Click],
                selector_chain: vec![],
                options: vec![],
                bucket: Bucket::Primary,
                value: None,
                tier: 2,
                parent_xpath: String::new(),
                tag: "button".into(),
            }],
            pruned_context: "Title: Leather Jacket\n139,000원".into(),
            images: vec!["https://cdn.example.com/jacket.jpg".into()],
            metadata: Metadata::default(),
            fingerprint: Fingerprint {
                dom_structure_hash: "aa".into(),
                content_hash: "bb".into(),
            },
            stats: PageMapStats {
                generation_ms: 42,
                ..Default::default()
            },
            allow_local_network: false,
            ignore_robots: false,
        }
    }

    #[test]
    fn test_agent_prompt_layout() {
        let prompt = to_agent_prompt(&sample_map());
        let url_pos = prompt.find("URL: ").unwrap();
        let title_pos = prompt.find("Title: ").unwrap();
        let type_pos = prompt.find("Type: product_detail").unwrap();
        let actions_pos = prompt.find("## Actions").unwrap();
        let info_pos = prompt.find("## Info").unwrap();
        let images_pos = prompt.find("## Images").unwrap();
        let meta_pos = prompt.find("## Meta").unwrap();
        assert!(url_pos < title_pos);
        assert!(title_pos < type_pos);
        assert!(type_pos < actions_pos);
        assert!(actions_pos < info_pos);
        assert!(info_pos < images_pos);
        assert!(images_pos < meta_pos);
        assert!(prompt.contains("[1] button: Add to Cart (click)"));
        assert!(prompt.contains("  [1] https://cdn.example.com/jacket.jpg"));
        assert!(prompt.contains("Tokens: ~"));
        assert!(prompt.contains("Interactables: 1"));
        assert!(prompt.contains("Generation: 42ms"));
    }

    #[test]
    fn test_agent_prompt_deterministic() {
        let map = sample_map();
        assert_eq!(to_agent_prompt(&map), to_agent_prompt(&map));
    }

    #[test]
    fn test_info_wrapped_in_boundary() {
        let prompt = to_agent_prompt(&sample_map());
        assert!(prompt.contains("<web_content_"));
        assert!(prompt.contains("</web_content_"));
    }

    #[test]
    fn test_json_round_trip() {
        let map = sample_map();
        let json = to_json(&map).unwrap();
        let back: PageMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, map.url);
        assert_eq!(back.interactables.len(), 1);
        assert_eq!(back.interactables[0].name, "Add to Cart");
        assert_eq!(back.pruned_context, map.pruned_context);
    }

    #[test]
    fn test_diff_unchanged_sections() {
        let map = sample_map();
        let diff = to_diff(&map, &map);
        assert_eq!(diff.matches("— unchanged").count(), 3);
        assert!(!diff.contains("[1] button"));
    }

    #[test]
    fn test_diff_changed_info_rerendered() {
        let previous = sample_map();
        let mut current = sample_map();
        current.pruned_context = "Title: Leather Jacket\n99,000원 (sale)".into();
        let diff = to_diff(&current, &previous);
        assert!(diff.contains("99,000원"));
        // Actions and Images still unchanged
        assert_eq!(diff.matches("— unchanged").count(), 2);
    }

    #[test]
    fn test_output_size_guard() {
        let config = PageMapConfig::new().max_text_bytes(100);
        let long = "x".repeat(500);
        let guarded = guard_output_size(long, &config);
        assert!(guarded.contains("[output truncated at 100 bytes"));
        assert!(guarded.len() < 300);
    }

    #[test]
    fn test_output_size_guard_noop_under_limit() {
        let config = PageMapConfig::default();
        let text = "short output".to_string();
        assert_eq!(guard_output_size(text.clone(), &config), text);
    }
}
