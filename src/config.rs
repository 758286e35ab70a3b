//! Pipeline configuration.
//!
//! All behavior switches flow through one immutable `PageMapConfig` passed
//! into the builder. The cache is the only long-lived state and is a separate
//! explicit collaborator.

use std::collections::HashMap;
use std::time::Duration;

use crate::locale::Locale;

/// Default hard limit on raw HTML input (5 MiB)
pub const DEFAULT_MAX_HTML_BYTES: usize = 5 * 1024 * 1024;

/// Default hard limit on parsed DOM element nodes
pub const DEFAULT_MAX_DOM_NODES: usize = 50_000;

/// Default truncation limit for serialized text output (1 MiB)
pub const DEFAULT_MAX_TEXT_BYTES: usize = 1024 * 1024;

/// Default screenshot guard (enforced by the caller, recorded here for audit)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Default token budget for the pruned `Info` block
pub const DEFAULT_PRUNED_CONTEXT_TOKENS: usize = 1500;

/// Default token budget for the whole agent prompt
pub const DEFAULT_TOTAL_BUDGET_TOKENS: usize = 5000;

/// Configuration for a page-map build
#[derive(Debug, Clone)]
pub struct PageMapConfig {
    /// Hard limit on raw HTML byte length
    pub max_html_bytes: usize,

    /// Hard limit on parsed DOM element-node count
    pub max_dom_nodes: usize,

    /// Truncation limit for serialized text output
    pub max_text_bytes: usize,

    /// Screenshot byte guard (consumed by the caller)
    pub max_image_bytes: usize,

    /// URL LRU cache capacity
    pub cache_capacity: usize,

    /// Safety TTL for cache entries
    pub cache_ttl: Duration,

    /// Token budget for the pruned context section
    pub max_pruned_tokens: usize,

    /// Token budget for the whole agent prompt
    pub total_budget_tokens: usize,

    /// Per-pass pruning timeout
    pub pipeline_timeout: Duration,

    /// Locale used when URL/html detection yields nothing
    pub default_locale: Locale,

    /// Explicit host → locale overrides, consulted before the built-in table
    pub locale_table: HashMap<String, Locale>,

    /// Script-based language filter (Stage 5)
    pub language_filter_enabled: bool,

    /// Consumed by the driver; recorded on the PageMap for audit only
    pub allow_local_network: bool,

    /// Consumed by the driver; recorded on the PageMap for audit only
    pub ignore_robots: bool,
}

impl Default for PageMapConfig {
    fn default() -> Self {
        Self {
            max_html_bytes: DEFAULT_MAX_HTML_BYTES,
            max_dom_nodes: DEFAULT_MAX_DOM_NODES,
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            cache_capacity: 20,
            cache_ttl: Duration::from_secs(90),
            max_pruned_tokens: DEFAULT_PRUNED_CONTEXT_TOKENS,
            total_budget_tokens: DEFAULT_TOTAL_BUDGET_TOKENS,
            pipeline_timeout: Duration::from_secs(30),
            default_locale: Locale::En,
            locale_table: HashMap::new(),
            language_filter_enabled: true,
            allow_local_network: false,
            ignore_robots: false,
        }
    }
}

impl PageMapConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set HTML byte limit
    pub fn max_html_bytes(mut self, limit: usize) -> Self {
        self.max_html_bytes = limit;
        self
    }

    /// Builder method: set DOM node limit
    pub fn max_dom_nodes(mut self, limit: usize) -> Self {
        self.max_dom_nodes = limit;
        self
    }

    /// Builder method: set text output limit
    pub fn max_text_bytes(mut self, limit: usize) -> Self {
        self.max_text_bytes = limit;
        self
    }

    /// Builder method: set pruned-context token budget
    pub fn max_pruned_tokens(mut self, budget: usize) -> Self {
        self.max_pruned_tokens = budget;
        self
    }

    /// Builder method: set cache capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    /// Builder method: set cache TTL
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Builder method: set default locale
    pub fn default_locale(mut self, locale: Locale) -> Self {
        self.default_locale = locale;
        self
    }

    /// Builder method: add a host → locale override
    pub fn locale_override(mut self, host: impl Into<String>, locale: Locale) -> Self {
        self.locale_table.insert(host.into(), locale);
        self
    }

    /// Builder method: toggle the language filter
    pub fn language_filter(mut self, enabled: bool) -> Self {
        self.language_filter_enabled = enabled;
        self
    }

    /// Builder method: record the driver's local-network policy
    pub fn allow_local_network(mut self, allow: bool) -> Self {
        self.allow_local_network = allow;
        self
    }

    /// Builder method: record the driver's robots policy
    pub fn ignore_robots(mut self, ignore: bool) -> Self {
        self.ignore_robots = ignore;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PageMapConfig::default();
        assert_eq!(config.max_html_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_dom_nodes, 50_000);
        assert_eq!(config.cache_capacity, 20);
        assert_eq!(config.cache_ttl, Duration::from_secs(90));
        assert!(config.language_filter_enabled);
        assert!(!config.allow_local_network);
        assert!(!config.ignore_robots);
    }

    #[test]
    fn test_builder_chain() {
        let config = PageMapConfig::new()
            .max_html_bytes(1024)
            .max_dom_nodes(100)
            .max_pruned_tokens(500)
            .language_filter(false)
            .default_locale(Locale::Ko);

        assert_eq!(config.max_html_bytes, 1024);
        assert_eq!(config.max_dom_nodes, 100);
        assert_eq!(config.max_pruned_tokens, 500);
        assert!(!config.language_filter_enabled);
        assert_eq!(config.default_locale, Locale::Ko);
    }

    #[test]
    fn test_cache_capacity_floor() {
        let config = PageMapConfig::new().cache_capacity(0);
        assert_eq!(config.cache_capacity, 1);
    }

    #[test]
    fn test_locale_override() {
        let config = PageMapConfig::new().locale_override("shop.example", Locale::Ja);
        assert_eq!(config.locale_table.get("shop.example"), Some(&Locale::Ja));
    }
}
