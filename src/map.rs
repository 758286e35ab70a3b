//! The PageMap artifact and its fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classify::{BlockedKind, PageType};
use crate::detect::Interactable;
use crate::dom::chunk::HtmlChunk;
use crate::extract::{Metadata, SchemaName};
use crate::locale::Locale;

/// `(dom_structure_hash, content_hash)` — the pair driving cache tiers.
///
/// Structure-hash equality permits a content-only rebuild; equality of both
/// permits a cache hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Fingerprint {
    /// Stable hash over ordered (tag, role, name) tuples of interactables
    pub dom_structure_hash: String,

    /// Hash over the sanitized concatenation of surviving chunk texts
    pub content_hash: String,
}

impl Fingerprint {
    /// Compute the fingerprint pair from the interactable table and the
    /// surviving chunks.
    pub fn compute(interactables: &[Interactable], chunks: &[HtmlChunk]) -> Self {
        let mut structure = Sha256::new();
        for item in interactables {
            structure.update(item.tag.as_bytes());
            structure.update([0u8]);
            structure.update(item.role.as_bytes());
            structure.update([0u8]);
            if item.name.is_empty() {
                structure.update(b"\x01null");
            } else {
                structure.update(item.name.as_bytes());
            }
            structure.update([0u8]);
        }

        let mut content = Sha256::new();
        for chunk in chunks {
            content.update(chunk.text.as_bytes());
            content.update([0u8]);
        }

        Self {
            dom_structure_hash: hex(&structure.finalize()),
            content_hash: hex(&content.finalize()),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Why a blocked page could not be mapped
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct BlockedInfo {
    pub kind: BlockedKind,

    /// Ref of a detected verification element, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_ref: Option<u32>,
}

/// Generation telemetry carried on every PageMap
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PageMapStats {
    /// Token estimate of the pruned context
    pub pruned_tokens: usize,

    /// Token estimate of the whole agent prompt
    pub total_tokens: usize,

    pub generation_ms: u64,

    /// Raw-token count before pruning
    pub raw_tokens: usize,

    /// Pruning reduction percentage
    pub reduction_pct: f64,

    /// Chunk counts: total seen / selected
    pub chunk_total: usize,
    pub chunk_selected: usize,

    /// Detection tier counts [ax, implicit, listener]
    pub tier_counts: [usize; 3],

    /// Non-fatal losses recorded during the build
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pruning_warnings: Vec<String>,
}

/// The output artifact: one compressed, actionable view of one page
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PageMap {
    pub url: String,
    pub final_url: String,
    pub title: String,
    pub locale: Locale,
    pub page_type: PageType,
    pub schema_name: SchemaName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_info: Option<BlockedInfo>,

    pub interactables: Vec<Interactable>,

    /// The `Info` block
    pub pruned_context: String,

    /// Deduplicated canonical image URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    pub metadata: Metadata,

    pub fingerprint: Fingerprint,

    pub stats: PageMapStats,

    /// Audit copy of the driver policy flags active during the build
    pub allow_local_network: bool,
    pub ignore_robots: bool,
}

impl PageMap {
    /// Look up an interactable by ref
    pub fn interactable(&self, ref_id: u32) -> Option<&Interactable> {
        self.interactables.iter().find(|i| i.ref_id == ref_id)
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_info.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Affordance, Bucket};
    use crate::dom::chunk::ChunkType;

    fn item(ref_id: u32, role: &str, name: &str) -> Interactable {
        Interactable {
            ref_id,
            role: role.into(),
            name: name.into(),
            affordances: vec![Affordance::Click],
            selector_chain: vec![],
            options: vec![],
            bucket: Bucket::Named,
            value: None,
            tier: 2,
            parent_xpath: String::new(),
            tag: "button".into(),
        }
    }

    #[test]
    fn test_fingerprint_structure_stable_under_content_change() {
        let interactables = vec![item(1, "button", "Buy"), item(2, "link", "Home")];
        let chunks_a = vec![HtmlChunk::new(ChunkType::Paragraph, "old text", "/p[1]")];
        let chunks_b = vec![HtmlChunk::new(ChunkType::Paragraph, "new text", "/p[1]")];

        let a = Fingerprint::compute(&interactables, &chunks_a);
        let b = Fingerprint::compute(&interactables, &chunks_b);
        assert_eq!(a.dom_structure_hash, b.dom_structure_hash);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_fingerprint_changes_with_structure() {
        let chunks = vec![HtmlChunk::new(ChunkType::Paragraph, "same", "/p[1]")];
        let a = Fingerprint::compute(&[item(1, "button", "Buy")], &chunks);
        let b = Fingerprint::compute(&[item(1, "link", "Buy")], &chunks);
        assert_ne!(a.dom_structure_hash, b.dom_structure_hash);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let interactables = vec![item(1, "button", "Buy")];
        let chunks = vec![HtmlChunk::new(ChunkType::Paragraph, "text", "/p[1]")];
        let a = Fingerprint::compute(&interactables, &chunks);
        let b = Fingerprint::compute(&interactables, &chunks);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unnamed_vs_named_distinct() {
        let chunks: Vec<HtmlChunk> = vec![];
        let a = Fingerprint::compute(&[item(1, "button", "")], &chunks);
        let b = Fingerprint::compute(&[item(1, "button", "null")], &chunks);
        assert_ne!(a.dom_structure_hash, b.dom_structure_hash);
    }
}
