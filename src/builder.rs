//! The page-map builder: one deterministic pass from snapshot to PageMap.
//!
//! `build` runs the full pipeline; `build_cached` consults the cache first
//! and may short-circuit (Tier A), reuse the prior interactable table while
//! refreshing content (Tier B), or fall through to a full pass (Tier C).
//!
//! The builder owns the cache and the template cache; everything else is
//! created per call, so concurrent builds over independent snapshots never
//! contend outside the cache mutex.

use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheDecision, PageMapCache, TemplateCache};
use crate::classify::{classify_page, schema_override, PageType};
use crate::config::PageMapConfig;
use crate::detect::{budget_filter, detect_interactables, Interactable};
use crate::dom::NormalizedDom;
use crate::error::{PageMapError, Result};
use crate::extract::{extract_metadata, extract_script_islands, jsonld_schema, SchemaName};
use crate::locale::{resolve_locale, TokenBudgeter};
use crate::map::{BlockedInfo, Fingerprint, PageMap, PageMapStats};
use crate::prune::{self, filter, prune_pipeline, PruneRequest};
use crate::sanitize::sanitize_text;
use crate::serialize;
use crate::snapshot::Snapshot;

// Tokens reserved for the prompt header and meta footer
const PROMPT_OVERHEAD_TOKENS: usize = 80;

static VERIFY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(verify|human|robot|captcha|not a robot|확인)").expect("verify regex"));

/// Builds PageMaps; owns the URL cache and the template cache.
pub struct PageMapBuilder {
    config: PageMapConfig,
    cache: PageMapCache,
    templates: TemplateCache,
}

impl PageMapBuilder {
    pub fn new(config: PageMapConfig) -> Self {
        let cache = PageMapCache::from_config(&config);
        Self {
            config,
            cache,
            templates: TemplateCache::new(),
        }
    }

    pub fn config(&self) -> &PageMapConfig {
        &self.config
    }

    pub fn cache(&self) -> &PageMapCache {
        &self.cache
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    /// Full pipeline pass, bypassing the cache.
    pub fn build(&self, snapshot: &Snapshot) -> Result<PageMap> {
        self.build_with_cancel(snapshot, &CancellationToken::new())
    }

    /// Full pipeline pass with a cancellation signal.
    pub fn build_with_cancel(
        &self,
        snapshot: &Snapshot,
        cancel: &CancellationToken,
    ) -> Result<PageMap> {
        self.build_internal(snapshot, cancel, None)
    }

    /// Cache-aware build: Tier A returns the stored PageMap, Tier B reuses
    /// the prior interactable table and refs, Tier C runs the full pipeline.
    /// No partial PageMap is committed on error or cancellation.
    pub fn build_cached(
        &self,
        snapshot: &Snapshot,
        cancel: &CancellationToken,
    ) -> Result<Arc<PageMap>> {
        let decision = self
            .cache
            .decide(&snapshot.url, snapshot.fingerprint.as_ref());
        match decision {
            CacheDecision::Hit(prior) => Ok(prior),
            CacheDecision::ContentRefresh(prior) => {
                let rebuilt = self.build_internal(snapshot, cancel, Some(&prior))?;
                Ok(self.cache.store(rebuilt))
            }
            CacheDecision::FullRebuild => {
                let built = self.build_internal(snapshot, cancel, None)?;
                Ok(self.cache.store(built))
            }
        }
    }

    fn build_internal(
        &self,
        snapshot: &Snapshot,
        cancel: &CancellationToken,
        reuse: Option<&PageMap>,
    ) -> Result<PageMap> {
        let started = Instant::now();
        let config = &self.config;
        let url = snapshot.effective_url().to_string();

        if cancel.is_cancelled() {
            return Err(PageMapError::Cancelled { stage: "normalize" });
        }
        let dom = NormalizedDom::parse(&snapshot.html, config)?;

        let locale = resolve_locale(
            &url,
            dom.html_lang(),
            &config.locale_table,
            config.default_locale,
        );
        let budgeter = TokenBudgeter::new(locale);

        // Classification + schema-override table
        let classification = classify_page(&url, Some(&snapshot.html));
        let islands = extract_script_islands(&snapshot.html);
        let mut page_type = classification.page_type;
        if page_type != PageType::Blocked {
            for island in &islands {
                if island.attr("type") != Some("application/ld+json") {
                    continue;
                }
                let Ok(data) = serde_json::from_str::<serde_json::Value>(&island.text) else {
                    continue;
                };
                if let Some(overridden) = jsonld_schema(&data).and_then(schema_override) {
                    page_type = overridden;
                    break;
                }
            }
        }

        // Detection, or Tier-B reuse of the prior table with its refs
        let mut warnings: Vec<String> = Vec::new();
        let (interactables, tier_counts) = match reuse {
            Some(prior) => {
                log::debug!("tier B rebuild: reusing {} interactables", prior.interactables.len());
                (prior.interactables.clone(), prior.stats.tier_counts)
            }
            None => {
                let detection = detect_interactables(snapshot, &dom);
                warnings.extend(detection.warnings);
                (detection.interactables, detection.tier_counts)
            }
        };

        // Blocked short-circuit: emit the block notice, skip the rest
        if page_type == PageType::Blocked {
            return self.assemble_blocked(
                snapshot,
                &url,
                &dom,
                locale,
                &budgeter,
                classification.blocked_kind,
                interactables,
                tier_counts,
                warnings,
                started,
            );
        }

        if cancel.is_cancelled() {
            return Err(PageMapError::Cancelled {
                stage: "semantic_filter",
            });
        }

        // Stage 3+4: filter and chunk, rescuing referenced interactables
        let rescue_names: Vec<String> = interactables
            .iter()
            .filter(|i| i.name.chars().count() > 2)
            .map(|i| i.name.to_lowercase())
            .collect();
        let (chunks, filter_stats) = filter::filter_and_chunk(&dom, &rescue_names);

        // Metadata over islands + surviving chunks
        let schema = page_type.schema();
        let metadata = extract_metadata(&islands, &chunks, schema);

        // Stage 5
        let request = PruneRequest {
            chunks: &chunks,
            filter_stats,
            raw_html: &snapshot.html,
            page_type,
            metadata: &metadata,
            meta_chunks: &islands,
            budgeter: &budgeter,
            blocked_kind: None,
            verify_ref: None,
        };
        let outcome = prune_pipeline(&request, config, cancel)?;
        warnings.extend(outcome.warnings.clone());

        // Budget-aware interactable filtering. A Tier-B pass keeps the prior
        // refs untouched — that is the point of the tier.
        let interactables = if reuse.is_some() {
            interactables
        } else {
            let available = config
                .total_budget_tokens
                .saturating_sub(outcome.tokens + PROMPT_OVERHEAD_TOKENS);
            budget_filter(interactables, available, &budgeter, &mut warnings)
        };

        let images = prune::extract_images(&snapshot.html, &url);
        let fingerprint = Fingerprint::compute(&interactables, &outcome.selected_chunks);

        let title = if snapshot.title.is_empty() {
            dom.title().to_string()
        } else {
            snapshot.title.clone()
        };

        let mut page_map = PageMap {
            url: snapshot.url.clone(),
            final_url: url.clone(),
            title: sanitize_text(&title),
            locale,
            page_type,
            schema_name: metadata.schema.unwrap_or(schema),
            blocked_info: None,
            interactables,
            pruned_context: outcome.context,
            images,
            metadata,
            fingerprint,
            stats: PageMapStats {
                pruned_tokens: outcome.tokens,
                total_tokens: 0,
                generation_ms: started.elapsed().as_millis() as u64,
                raw_tokens: outcome.stats.raw_tokens,
                reduction_pct: outcome.stats.reduction_pct,
                chunk_total: outcome.stats.chunk_total,
                chunk_selected: outcome.stats.chunk_selected,
                tier_counts,
                pruning_warnings: warnings,
            },
            allow_local_network: config.allow_local_network,
            ignore_robots: config.ignore_robots,
        };
        page_map.stats.total_tokens =
            budgeter.estimate(&serialize::to_agent_prompt(&page_map));

        if let Ok(parsed) = url::Url::parse(&url) {
            if let Some(host) = parsed.host_str() {
                self.templates.record(
                    host,
                    page_type,
                    page_map.stats.chunk_selected,
                    page_map.stats.pruned_tokens,
                );
            }
        }

        log::info!(
            "page map built: {} interactables, {} pruned tokens, {}ms",
            page_map.interactables.len(),
            page_map.stats.pruned_tokens,
            page_map.stats.generation_ms,
        );

        Ok(page_map)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble_blocked(
        &self,
        snapshot: &Snapshot,
        url: &str,
        dom: &NormalizedDom,
        locale: crate::locale::Locale,
        budgeter: &TokenBudgeter,
        blocked_kind: Option<crate::classify::BlockedKind>,
        interactables: Vec<Interactable>,
        tier_counts: [usize; 3],
        mut warnings: Vec<String>,
        started: Instant,
    ) -> Result<PageMap> {
        let kind = blocked_kind.unwrap_or(crate::classify::BlockedKind::Waf);

        // The verification surface, when one is exposed
        let verify_ref = interactables
            .iter()
            .find(|i| i.role == "checkbox" || VERIFY_NAME_RE.is_match(&i.name))
            .map(|i| i.ref_id);

        let request = PruneRequest {
            chunks: &[],
            filter_stats: filter::FilterStats::default(),
            raw_html: &snapshot.html,
            page_type: PageType::Blocked,
            metadata: &crate::extract::Metadata::default(),
            meta_chunks: &[],
            budgeter,
            blocked_kind: Some(kind),
            verify_ref,
        };
        let outcome = prune_pipeline(&request, &self.config, &CancellationToken::new())?;
        warnings.push(format!("page blocked by {} challenge", kind.as_str()));

        let fingerprint = Fingerprint::compute(&interactables, &[]);
        let title = if snapshot.title.is_empty() {
            dom.title().to_string()
        } else {
            snapshot.title.clone()
        };

        Ok(PageMap {
            url: snapshot.url.clone(),
            final_url: url.to_string(),
            title: sanitize_text(&title),
            locale,
            page_type: PageType::Blocked,
            schema_name: SchemaName::Generic,
            blocked_info: Some(BlockedInfo {
                kind,
                verify_ref,
            }),
            interactables,
            pruned_context: outcome.context,
            images: Vec::new(),
            metadata: crate::extract::Metadata::default(),
            fingerprint,
            stats: PageMapStats {
                pruned_tokens: outcome.tokens,
                total_tokens: outcome.tokens,
                generation_ms: started.elapsed().as_millis() as u64,
                raw_tokens: outcome.stats.raw_tokens,
                reduction_pct: outcome.stats.reduction_pct,
                chunk_total: 0,
                chunk_selected: 0,
                tier_counts,
                pruning_warnings: warnings,
            },
            allow_local_network: self.config.allow_local_network,
            ignore_robots: self.config.ignore_robots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotFingerprint;

    const PRODUCT_HTML: &str = r#"<html lang="ko"><head><title>가죽 자켓</title>
        <script type="application/ld+json">
        {"@type":"Product","name":"오버핏 레더 자켓",
         "offers":{"@type":"Offer","price":"139000","priceCurrency":"KRW"}}
        </script></head>
        <body><main>
          <h1>오버핏 레더 자켓</h1>
          <span itemprop="price">139000</span>
          <span itemprop="priceCurrency">KRW</span>
          <p>부드러운 양가죽으로 제작된 오버핏 실루엣의 레더 자켓입니다.</p>
          <button>Add to Cart</button>
          <select name="size"><option>250</option><option>255</option></select>
        </main></body></html>"#;

    fn builder() -> PageMapBuilder {
        PageMapBuilder::new(PageMapConfig::default())
    }

    fn product_snapshot() -> Snapshot {
        Snapshot::new(PRODUCT_HTML, "https://shop.example.co.kr/products/123")
    }

    #[test]
    fn test_product_build_end_to_end() {
        let map = builder().build(&product_snapshot()).unwrap();
        assert_eq!(map.page_type, PageType::ProductDetail);
        assert_eq!(map.schema_name, SchemaName::Product);
        assert_eq!(map.metadata.get_f64("price"), Some(139000.0));
        assert_eq!(map.metadata.get_str("currency"), Some("KRW"));
        let cart = map
            .interactables
            .iter()
            .find(|i| i.name == "Add to Cart")
            .expect("add-to-cart interactable");
        assert_eq!(cart.role, "button");
        let select = map
            .interactables
            .iter()
            .find(|i| i.role == "combobox")
            .expect("size combobox");
        assert_eq!(select.options, vec!["250", "255"]);
        assert!(map.pruned_context.contains("139,000원"));
    }

    #[test]
    fn test_refs_unique_and_contiguous() {
        let map = builder().build(&product_snapshot()).unwrap();
        let mut refs: Vec<u32> = map.interactables.iter().map(|i| i.ref_id).collect();
        let expected: Vec<u32> = (1..=refs.len() as u32).collect();
        refs.sort_unstable();
        assert_eq!(refs, expected);
    }

    #[test]
    fn test_locale_resolved_from_tld() {
        let map = builder().build(&product_snapshot()).unwrap();
        assert_eq!(map.locale, crate::locale::Locale::Ko);
    }

    #[test]
    fn test_blocked_short_circuit() {
        let html = r#"<html><head><title>Just a moment...</title></head>
            <body><div class="cf-turnstile"></div>
            <input type="checkbox" aria-label="Verify you are human"></body></html>"#;
        let snapshot = Snapshot::new(html, "https://shop.example.com/products/1");
        let map = builder().build(&snapshot).unwrap();
        assert_eq!(map.page_type, PageType::Blocked);
        let info = map.blocked_info.as_ref().expect("blocked info");
        assert!(info.verify_ref.is_some());
        assert!(map.pruned_context.contains("challenge"));
        // Pipeline skipped: no chunks were processed
        assert_eq!(map.stats.chunk_selected, 0);
    }

    #[test]
    fn test_determinism_excluding_timing() {
        let builder = builder();
        let snapshot = product_snapshot();
        let mut a = builder.build(&snapshot).unwrap();
        let mut b = builder.build(&snapshot).unwrap();
        a.stats.generation_ms = 0;
        b.stats.generation_ms = 0;
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(
            serialize::to_agent_prompt(&a),
            serialize::to_agent_prompt(&b)
        );
    }

    #[test]
    fn test_cache_tier_a() {
        let builder = builder();
        let mut snapshot = product_snapshot();
        let cancel = CancellationToken::new();
        let first = builder.build_cached(&snapshot, &cancel).unwrap();
        snapshot.fingerprint = Some(SnapshotFingerprint {
            dom_structure_hash: first.fingerprint.dom_structure_hash.clone(),
            content_hash: first.fingerprint.content_hash.clone(),
        });
        let second = builder.build_cached(&snapshot, &cancel).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.cache().stats().hits, 1);
    }

    #[test]
    fn test_cache_tier_b_reuses_refs() {
        let builder = builder();
        let snapshot = product_snapshot();
        let cancel = CancellationToken::new();
        let first = builder.build_cached(&snapshot, &cancel).unwrap();

        // Same structure, different content hash → Tier B
        let mut mutated = product_snapshot();
        mutated.html = PRODUCT_HTML.replace("부드러운 양가죽", "새롭게 바뀐 설명의 양가죽");
        mutated.fingerprint = Some(SnapshotFingerprint {
            dom_structure_hash: first.fingerprint.dom_structure_hash.clone(),
            content_hash: "different".into(),
        });
        let second = builder.build_cached(&mutated, &cancel).unwrap();

        let refs_a: Vec<(u32, String)> = first
            .interactables
            .iter()
            .map(|i| (i.ref_id, i.name.clone()))
            .collect();
        let refs_b: Vec<(u32, String)> = second
            .interactables
            .iter()
            .map(|i| (i.ref_id, i.name.clone()))
            .collect();
        assert_eq!(refs_a, refs_b);
        assert_ne!(first.pruned_context, second.pruned_context);
        assert_eq!(builder.cache().stats().content_refreshes, 1);
    }

    #[test]
    fn test_no_partial_commit_on_cancel() {
        let builder = builder();
        let snapshot = product_snapshot();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(builder.build_cached(&snapshot, &cancel).is_err());
        assert!(builder.cache().is_empty());
    }

    #[test]
    fn test_size_guard_surfaces() {
        let config = PageMapConfig::new().max_html_bytes(64);
        let builder = PageMapBuilder::new(config);
        let err = builder.build(&product_snapshot()).unwrap_err();
        assert_eq!(err.kind(), "resource_exhausted");
        assert!(!err.recovery_hint().is_empty());
    }

    #[test]
    fn test_template_cache_records() {
        let builder = builder();
        builder.build(&product_snapshot()).unwrap();
        let params = builder
            .templates()
            .lookup("shop.example.co.kr", PageType::ProductDetail)
            .expect("template entry");
        assert_eq!(params.builds, 1);
    }

    #[test]
    fn test_audit_flags_recorded() {
        let config = PageMapConfig::new().allow_local_network(true).ignore_robots(true);
        let builder = PageMapBuilder::new(config);
        let map = builder.build(&product_snapshot()).unwrap();
        assert!(map.allow_local_network);
        assert!(map.ignore_robots);
    }
}
