//! URL-keyed PageMap cache with three-tier freshness decisions.
//!
//! TTL is a safety net; actual freshness is decided by comparing the
//! driver-supplied fingerprint against the stored PageMap's:
//!
//! - **Tier A** (hit): both hashes match — return the prior PageMap
//! - **Tier B** (content refresh): structure matches, content differs —
//!   re-run the content pipeline reusing the interactable table and refs
//! - **Tier C** (full rebuild): structure changed or URL unknown
//!
//! The cache is the only shared mutable state in the crate; a mutex guards
//! it, held only for lookups and inserts so concurrent pipeline passes never
//! block each other.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::PageType;
use crate::config::PageMapConfig;
use crate::map::PageMap;
use crate::snapshot::SnapshotFingerprint;

/// Why an entry was invalidated; hard reasons evict the LRU entry, soft
/// reasons only mark the entry stale for the next decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    Navigation,
    Action,
    Timeout,
    SizeExceeded,
    Manual,
    StructureChanged,
    UrlChanged,
    SessionReset,
    Error,
    Ttl,
}

impl InvalidationReason {
    /// Hard invalidation removes the entry entirely; soft keeps it for a
    /// Tier-B refresh.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            InvalidationReason::Navigation
                | InvalidationReason::UrlChanged
                | InvalidationReason::SessionReset
                | InvalidationReason::Error
                | InvalidationReason::Timeout
                | InvalidationReason::SizeExceeded
                | InvalidationReason::StructureChanged
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationReason::Navigation => "navigation",
            InvalidationReason::Action => "action",
            InvalidationReason::Timeout => "timeout",
            InvalidationReason::SizeExceeded => "size_exceeded",
            InvalidationReason::Manual => "manual",
            InvalidationReason::StructureChanged => "structure_changed",
            InvalidationReason::UrlChanged => "url_changed",
            InvalidationReason::SessionReset => "session_reset",
            InvalidationReason::Error => "error",
            InvalidationReason::Ttl => "ttl",
        }
    }
}

/// Freshness decision for one request
#[derive(Debug, Clone)]
pub enum CacheDecision {
    /// Tier A: return the prior PageMap as-is
    Hit(Arc<PageMap>),
    /// Tier B: rebuild content, reusing the prior interactable table
    ContentRefresh(Arc<PageMap>),
    /// Tier C: run the full pipeline
    FullRebuild,
}

/// Counters for cache behaviour
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub content_refreshes: u64,
    pub fingerprint_mismatches: u64,
    pub ttl_expirations: u64,
    pub hard_invalidations: u64,
    pub soft_invalidations: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Normalize a URL into its cache key: lowercase scheme/host, sorted query
/// (duplicates preserved), fragment stripped, path case untouched.
pub fn normalize_cache_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let scheme = parsed.scheme().to_lowercase();
    let host = parsed.host_str().unwrap_or("").to_lowercase();
    let port = parsed
        .port()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();
    let path = parsed.path();

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    let query = if params.is_empty() {
        String::new()
    } else {
        let joined = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{joined}")
    };

    format!("{scheme}://{host}{port}{path}{query}")
}

struct CacheEntry {
    page_map: Arc<PageMap>,
    created_at: Instant,
    stale: bool,
}

struct Inner {
    lru: LruCache<String, CacheEntry>,
    stats: CacheStats,
}

/// URL-keyed LRU of PageMaps with fingerprint-driven tier decisions
pub struct PageMapCache {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl PageMapCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            ttl,
        }
    }

    pub fn from_config(config: &PageMapConfig) -> Self {
        Self::new(config.cache_capacity, config.cache_ttl)
    }

    /// Decide which tier a request for `url` lands in, given the driver's
    /// current fingerprint (None forces a full rebuild).
    pub fn decide(&self, url: &str, fingerprint: Option<&SnapshotFingerprint>) -> CacheDecision {
        let key = normalize_cache_url(url);
        let mut inner = self.inner.lock();

        let expired = match inner.lru.peek(&key) {
            None => {
                inner.stats.misses += 1;
                return CacheDecision::FullRebuild;
            }
            Some(entry) => entry.created_at.elapsed() > self.ttl,
        };
        if expired {
            inner.lru.pop(&key);
            inner.stats.ttl_expirations += 1;
            inner.stats.misses += 1;
            log::debug!("cache ttl expired: {key}");
            return CacheDecision::FullRebuild;
        }

        let Some(fingerprint) = fingerprint else {
            inner.stats.misses += 1;
            return CacheDecision::FullRebuild;
        };

        // Touch for recency, then compare hashes
        let Some(entry) = inner.lru.get(&key) else {
            inner.stats.misses += 1;
            return CacheDecision::FullRebuild;
        };
        let stored = &entry.page_map.fingerprint;
        let structure_match = stored.dom_structure_hash == fingerprint.dom_structure_hash;
        let content_match = stored.content_hash == fingerprint.content_hash;
        let stale = entry.stale;
        let prior = Arc::clone(&entry.page_map);

        if structure_match && content_match && !stale {
            inner.stats.hits += 1;
            log::debug!("cache hit (tier A): {key}");
            CacheDecision::Hit(prior)
        } else if structure_match {
            inner.stats.content_refreshes += 1;
            log::debug!("cache content refresh (tier B): {key}");
            CacheDecision::ContentRefresh(prior)
        } else {
            inner.stats.fingerprint_mismatches += 1;
            inner.stats.misses += 1;
            log::debug!("cache structure mismatch (tier C): {key}");
            CacheDecision::FullRebuild
        }
    }

    /// Store a freshly built PageMap; returns the shared handle.
    pub fn store(&self, page_map: PageMap) -> Arc<PageMap> {
        let key = normalize_cache_url(&page_map.url);
        let shared = Arc::new(page_map);
        let mut inner = self.inner.lock();
        if inner.lru.len() == inner.lru.cap().get() && !inner.lru.contains(&key) {
            inner.stats.evictions += 1;
        }
        inner.lru.put(
            key,
            CacheEntry {
                page_map: Arc::clone(&shared),
                created_at: Instant::now(),
                stale: false,
            },
        );
        shared
    }

    /// Invalidate one URL. Hard reasons evict; soft reasons mark stale so
    /// the next decision is at most Tier B.
    pub fn invalidate(&self, url: &str, reason: InvalidationReason) {
        let key = normalize_cache_url(url);
        let mut inner = self.inner.lock();
        if reason.is_hard() {
            inner.lru.pop(&key);
            inner.stats.hard_invalidations += 1;
        } else {
            if let Some(entry) = inner.lru.peek_mut(&key) {
                entry.stale = true;
            }
            inner.stats.soft_invalidations += 1;
        }
        log::debug!("cache invalidated: {key} reason={}", reason.as_str());
    }

    /// Clear everything (browser death, session reset).
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.stats.hard_invalidations += 1;
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Template cache
// ---------------------------------------------------------------------------

/// Learned per-(host, page-type) compressor parameters, reused across pages
/// of the same template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateParams {
    pub builds: u64,
    pub avg_selected_chunks: f64,
    pub avg_pruned_tokens: f64,
}

/// In-memory template cache keyed by (host, page_type)
#[derive(Default)]
pub struct TemplateCache {
    inner: Mutex<Vec<((String, PageType), TemplateParams)>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one build's outcome for the template
    pub fn record(&self, host: &str, page_type: PageType, selected_chunks: usize, pruned_tokens: usize) {
        let key = (host.to_lowercase(), page_type);
        let mut inner = self.inner.lock();
        match inner.iter_mut().find(|(k, _)| *k == key) {
            Some((_, params)) => {
                let n = params.builds as f64;
                params.avg_selected_chunks =
                    (params.avg_selected_chunks * n + selected_chunks as f64) / (n + 1.0);
                params.avg_pruned_tokens =
                    (params.avg_pruned_tokens * n + pruned_tokens as f64) / (n + 1.0);
                params.builds += 1;
            }
            None => {
                inner.push((
                    key,
                    TemplateParams {
                        builds: 1,
                        avg_selected_chunks: selected_chunks as f64,
                        avg_pruned_tokens: pruned_tokens as f64,
                    },
                ));
            }
        }
    }

    /// Prior parameters for a template, if any builds were recorded
    pub fn lookup(&self, host: &str, page_type: PageType) -> Option<TemplateParams> {
        let key = (host.to_lowercase(), page_type);
        self.inner
            .lock()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, params)| params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Interactable;
    use crate::extract::{Metadata, SchemaName};
    use crate::locale::Locale;
    use crate::map::{Fingerprint, PageMapStats};

    fn sample_map(url: &str, structure: &str, content: &str) -> PageMap {
        PageMap {
            url: url.into(),
            final_url: url.into(),
            title: "T".into(),
            locale: Locale::En,
            page_type: PageType::Article,
            schema_name: SchemaName::Article,
            blocked_info: None,
            interactables: Vec::<Interactable>::new(),
            pruned_context: "ctx".into(),
            images: vec![],
            metadata: Metadata::default(),
            fingerprint: Fingerprint {
                dom_structure_hash: structure.into(),
                content_hash: content.into(),
            },
            stats: PageMapStats::default(),
            allow_local_network: false,
            ignore_robots: false,
        }
    }

    fn fp(structure: &str, content: &str) -> SnapshotFingerprint {
        SnapshotFingerprint {
            dom_structure_hash: structure.into(),
            content_hash: content.into(),
        }
    }

    #[test]
    fn test_normalize_cache_url() {
        assert_eq!(
            normalize_cache_url("HTTPS://Example.COM/Path?b=2&a=1#frag"),
            "https://example.com/Path?a=1&b=2"
        );
        // Path case preserved, fragment stripped
        assert!(!normalize_cache_url("https://e.com/A#x").contains('#'));
    }

    #[test]
    fn test_tier_a_hit() {
        let cache = PageMapCache::new(20, Duration::from_secs(90));
        cache.store(sample_map("https://e.com/p", "s1", "c1"));
        match cache.decide("https://e.com/p", Some(&fp("s1", "c1"))) {
            CacheDecision::Hit(prior) => assert_eq!(prior.url, "https://e.com/p"),
            other => panic!("expected hit, got {other:?}"),
        }
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_tier_b_content_refresh() {
        let cache = PageMapCache::new(20, Duration::from_secs(90));
        cache.store(sample_map("https://e.com/p", "s1", "c1"));
        match cache.decide("https://e.com/p", Some(&fp("s1", "c2"))) {
            CacheDecision::ContentRefresh(prior) => {
                assert_eq!(prior.fingerprint.content_hash, "c1")
            }
            other => panic!("expected content refresh, got {other:?}"),
        }
        assert_eq!(cache.stats().content_refreshes, 1);
    }

    #[test]
    fn test_tier_c_structure_changed() {
        let cache = PageMapCache::new(20, Duration::from_secs(90));
        cache.store(sample_map("https://e.com/p", "s1", "c1"));
        assert!(matches!(
            cache.decide("https://e.com/p", Some(&fp("s2", "c1"))),
            CacheDecision::FullRebuild
        ));
        assert_eq!(cache.stats().fingerprint_mismatches, 1);
    }

    #[test]
    fn test_unknown_url_full_rebuild() {
        let cache = PageMapCache::new(20, Duration::from_secs(90));
        assert!(matches!(
            cache.decide("https://e.com/new", Some(&fp("s", "c"))),
            CacheDecision::FullRebuild
        ));
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = PageMapCache::new(20, Duration::from_millis(0));
        cache.store(sample_map("https://e.com/p", "s1", "c1"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            cache.decide("https://e.com/p", Some(&fp("s1", "c1"))),
            CacheDecision::FullRebuild
        ));
        assert_eq!(cache.stats().ttl_expirations, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = PageMapCache::new(2, Duration::from_secs(90));
        cache.store(sample_map("https://e.com/1", "s", "c"));
        cache.store(sample_map("https://e.com/2", "s", "c"));
        cache.store(sample_map("https://e.com/3", "s", "c"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
        // Oldest entry gone
        assert!(matches!(
            cache.decide("https://e.com/1", Some(&fp("s", "c"))),
            CacheDecision::FullRebuild
        ));
    }

    #[test]
    fn test_hard_invalidation_evicts() {
        let cache = PageMapCache::new(20, Duration::from_secs(90));
        cache.store(sample_map("https://e.com/p", "s1", "c1"));
        cache.invalidate("https://e.com/p", InvalidationReason::Navigation);
        assert!(matches!(
            cache.decide("https://e.com/p", Some(&fp("s1", "c1"))),
            CacheDecision::FullRebuild
        ));
        assert_eq!(cache.stats().hard_invalidations, 1);
    }

    #[test]
    fn test_soft_invalidation_degrades_to_tier_b() {
        let cache = PageMapCache::new(20, Duration::from_secs(90));
        cache.store(sample_map("https://e.com/p", "s1", "c1"));
        cache.invalidate("https://e.com/p", InvalidationReason::Action);
        match cache.decide("https://e.com/p", Some(&fp("s1", "c1"))) {
            CacheDecision::ContentRefresh(_) => {}
            other => panic!("expected content refresh, got {other:?}"),
        }
        assert_eq!(cache.stats().soft_invalidations, 1);
    }

    #[test]
    fn test_reason_hardness() {
        assert!(InvalidationReason::Navigation.is_hard());
        assert!(InvalidationReason::SessionReset.is_hard());
        assert!(InvalidationReason::StructureChanged.is_hard());
        assert!(!InvalidationReason::Action.is_hard());
        assert!(!InvalidationReason::Manual.is_hard());
        assert!(!InvalidationReason::Ttl.is_hard());
    }

    #[test]
    fn test_template_cache_averages() {
        let templates = TemplateCache::new();
        templates.record("shop.example.com", PageType::ProductDetail, 10, 1000);
        templates.record("shop.example.com", PageType::ProductDetail, 20, 2000);
        let params = templates
            .lookup("Shop.Example.com", PageType::ProductDetail)
            .unwrap();
        assert_eq!(params.builds, 2);
        assert!((params.avg_selected_chunks - 15.0).abs() < f64::EPSILON);
        assert!((params.avg_pruned_tokens - 1500.0).abs() < f64::EPSILON);
        assert!(templates.lookup("other.com", PageType::ProductDetail).is_none());
    }
}
