//! Error types for the page-map pipeline.
//!
//! One crate-level error enum covers everything that can surface from a
//! pipeline pass. Sub-stage failures that do not invalidate the rest of the
//! build (AX-tier loss, a JSON-LD parse error, a price-recovery miss) are
//! never raised — they are recorded as pruning warnings on the PageMap.

use thiserror::Error;

/// Result type alias for page-map operations
pub type Result<T> = std::result::Result<T, PageMapError>;

/// Which resource limit was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Raw HTML byte length over `max_html_bytes`
    HtmlSize,
    /// Parsed DOM element count over `max_dom_nodes`
    DomNodes,
    /// Serialized text output over `max_text_bytes`
    TextOutput,
    /// Screenshot bytes over `max_image_bytes` (enforced by the caller)
    ImageOutput,
}

impl ResourceKind {
    /// Short tag used in error messages and telemetry
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::HtmlSize => "html_size",
            ResourceKind::DomNodes => "dom_nodes",
            ResourceKind::TextOutput => "text_output",
            ResourceKind::ImageOutput => "image_output",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by page-map construction
#[derive(Debug, Error)]
pub enum PageMapError {
    /// Input exceeded a hard byte limit before parsing
    #[error("input too large: {size} bytes exceeds limit of {limit} bytes")]
    InputTooLarge { size: usize, limit: usize },

    /// HTML could not be parsed into a usable document
    #[error("malformed HTML: {0}")]
    MalformedHtml(String),

    /// A resource limit was exceeded mid-pipeline
    #[error("resource exhausted ({reason}): {detail}")]
    ResourceExhausted { reason: ResourceKind, detail: String },

    /// A pipeline stage exceeded the per-call timeout
    #[error("pipeline timeout in stage `{stage}` after {elapsed_ms}ms")]
    PipelineTimeout { stage: &'static str, elapsed_ms: u64 },

    /// The pipeline pass was cancelled between stages
    #[error("pipeline cancelled in stage `{stage}`")]
    Cancelled { stage: &'static str },

    /// JSON (de)serialization failure at the output boundary
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PageMapError {
    /// User-facing recovery hint keyed by error kind.
    ///
    /// Included verbatim in error replies so agents know what to do next.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            PageMapError::InputTooLarge { .. } => {
                "page HTML exceeds the size limit; retry with a simpler page or raise max_html_bytes"
            }
            PageMapError::MalformedHtml(_) => "the page could not be parsed; reload and retry",
            PageMapError::ResourceExhausted { reason, .. } => match reason {
                ResourceKind::HtmlSize => {
                    "page HTML exceeds the size limit; retry with a simpler page or raise max_html_bytes"
                }
                ResourceKind::DomNodes => {
                    "page DOM is too large; retry after the page settles or raise max_dom_nodes"
                }
                ResourceKind::TextOutput | ResourceKind::ImageOutput => {
                    "output was truncated; request a narrower section of the page"
                }
            },
            PageMapError::PipelineTimeout { .. } => {
                "page-map generation timed out; retry, or retry with a smaller token budget"
            }
            PageMapError::Cancelled { .. } => "the request was cancelled; call get_page_map again",
            PageMapError::Serialization(_) => "internal serialization error; call get_page_map again",
        }
    }

    /// Short kind tag for the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            PageMapError::InputTooLarge { .. } => "input_too_large",
            PageMapError::MalformedHtml(_) => "malformed_html",
            PageMapError::ResourceExhausted { .. } => "resource_exhausted",
            PageMapError::PipelineTimeout { .. } => "pipeline_timeout",
            PageMapError::Cancelled { .. } => "cancelled",
            PageMapError::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_tags() {
        assert_eq!(ResourceKind::HtmlSize.as_str(), "html_size");
        assert_eq!(ResourceKind::DomNodes.as_str(), "dom_nodes");
        assert_eq!(ResourceKind::TextOutput.as_str(), "text_output");
        assert_eq!(ResourceKind::ImageOutput.as_str(), "image_output");
    }

    #[test]
    fn test_error_display() {
        let err = PageMapError::ResourceExhausted {
            reason: ResourceKind::DomNodes,
            detail: "52000 element nodes".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dom_nodes"));
        assert!(msg.contains("52000"));
    }

    #[test]
    fn test_timeout_carries_stage() {
        let err = PageMapError::PipelineTimeout {
            stage: "semantic_filter",
            elapsed_ms: 31000,
        };
        assert!(err.to_string().contains("semantic_filter"));
        assert_eq!(err.kind(), "pipeline_timeout");
    }

    #[test]
    fn test_every_error_has_recovery_hint() {
        let errors = vec![
            PageMapError::InputTooLarge { size: 1, limit: 0 },
            PageMapError::MalformedHtml("x".into()),
            PageMapError::ResourceExhausted {
                reason: ResourceKind::HtmlSize,
                detail: String::new(),
            },
            PageMapError::PipelineTimeout {
                stage: "assembly",
                elapsed_ms: 0,
            },
            PageMapError::Cancelled { stage: "chunking" },
        ];
        for err in errors {
            assert!(!err.recovery_hint().is_empty());
            assert!(!err.kind().is_empty());
        }
    }
}
