//! # pagemap
//!
//! Compresses a live web page's raw HTML (typically 50k–500k characters)
//! into a compact, structured *page map* of a few thousand tokens that an
//! AI agent can both read and act on.
//!
//! A page map pairs:
//! - a deduplicated list of interactive **affordances**, each addressable by
//!   a stable numeric **ref**
//! - a semantically pruned textual context (the `Info` block)
//! - typed metadata extracted from structured-data islands (JSON-LD,
//!   microdata, Open Graph)
//!
//! ## Building a page map
//!
//! ```rust
//! use pagemap::{PageMapBuilder, PageMapConfig, Snapshot};
//!
//! # fn main() -> pagemap::Result<()> {
//! let builder = PageMapBuilder::new(PageMapConfig::default());
//!
//! let snapshot = Snapshot::new(
//!     "<html><body><button>Add to Cart</button></body></html>",
//!     "https://shop.example.com/products/1",
//! );
//! let page_map = builder.build(&snapshot)?;
//!
//! println!("{}", pagemap::to_agent_prompt(&page_map));
//! # Ok(())
//! # }
//! ```
//!
//! ## Caching
//!
//! [`PageMapBuilder::build_cached`] consults a URL-keyed LRU before running
//! the pipeline. Freshness is decided by the snapshot's fingerprint pair:
//! a full match returns the stored map, a structure-only match re-runs the
//! content pipeline while keeping the interactable refs stable, and anything
//! else rebuilds from scratch.
//!
//! ## Module overview
//!
//! - [`snapshot`]: driver input types ([`Snapshot`], [`AxNode`])
//! - [`dom`]: HTML normalization, resource guards, hidden-content checks
//! - [`detect`]: three-tier interactive element detection
//! - [`extract`]: structured-data extraction into typed [`Metadata`]
//! - [`classify`]: weighted-voting page-type classifier
//! - [`prune`]: the five-stage pruning pipeline and compressors
//! - [`map`]: the [`PageMap`] artifact
//! - [`serialize`]: agent-prompt, JSON, and diff forms
//! - [`cache`]: URL-keyed LRU with three-tier freshness decisions
//! - [`builder`]: orchestration — **start here**

pub mod builder;
pub mod cache;
pub mod classify;
pub mod config;
pub mod detect;
pub mod dom;
pub mod error;
pub mod extract;
pub mod locale;
pub mod map;
pub mod prune;
pub mod sanitize;
pub mod script;
pub mod serialize;
pub mod snapshot;

pub use builder::PageMapBuilder;
pub use cache::{CacheDecision, InvalidationReason, PageMapCache, TemplateCache};
pub use classify::{BlockedKind, Classification, PageType};
pub use config::PageMapConfig;
pub use detect::{Affordance, Bucket, Interactable, SelectorStep};
pub use error::{PageMapError, ResourceKind, Result};
pub use extract::{Metadata, SchemaName};
pub use locale::{Locale, TokenBudgeter};
pub use map::{BlockedInfo, Fingerprint, PageMap, PageMapStats};
pub use serialize::{to_agent_prompt, to_diff, to_json};
pub use snapshot::{AxNode, ListenerHit, Snapshot, SnapshotFingerprint};
