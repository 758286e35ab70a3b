//! Input types supplied by the browser driver.
//!
//! The core treats the driver as a pure source of snapshots: one [`Snapshot`]
//! carries everything a build needs — raw HTML, an accessibility-tree
//! projection, optional event-listener hits, and the driver's own DOM
//! fingerprint for cache-tier decisions.

use serde::{Deserialize, Serialize};

/// One node of the browser's accessibility tree
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AxNode {
    /// ARIA role reported by the browser (e.g. "button", "textbox")
    pub role: String,

    /// Accessible name
    #[serde(default)]
    pub name: String,

    /// Accessible description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Current value (inputs, sliders)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Checked state (checkboxes, radios, switches)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,

    /// XPath of the backing DOM node
    #[serde(default)]
    pub xpath: String,

    /// Child nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AxNode>,
}

impl AxNode {
    /// Create a node with a role and accessible name
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder method: set xpath
    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = xpath.into();
        self
    }

    /// Builder method: set value
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Builder method: set children
    pub fn with_children(mut self, children: Vec<AxNode>) -> Self {
        self.children = children;
        self
    }
}

/// A DOM node the driver observed carrying an event listener
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerHit {
    /// XPath of the element
    pub xpath: String,

    /// Event name ("click", "mousedown", ...)
    pub event: String,

    /// Best-effort accessible name from aria-label or inner text
    #[serde(default)]
    pub name: String,

    /// CSS selector resolved by the driver, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_selector: Option<String>,

    /// Tag name of the element
    #[serde(default)]
    pub tag: String,
}

impl ListenerHit {
    pub fn new(xpath: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            xpath: xpath.into(),
            event: event.into(),
            name: String::new(),
            css_selector: None,
            tag: String::new(),
        }
    }

    /// Builder method: set the best-effort name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method: set the tag name
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Builder method: set the resolved CSS selector
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.css_selector = Some(selector.into());
        self
    }
}

/// Driver-computed DOM fingerprint pair for cache-tier decisions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotFingerprint {
    /// Hash over (tag, role, name) tuples of interactive elements
    pub dom_structure_hash: String,

    /// Hash over the sanitized surviving content
    pub content_hash: String,
}

/// Everything the driver captured for one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Raw page HTML
    pub html: String,

    /// Accessibility-tree roots
    #[serde(default)]
    pub ax_tree: Vec<AxNode>,

    /// Event-listener hits (tier-3 detection input)
    #[serde(default)]
    pub listener_hits: Vec<ListenerHit>,

    /// Requested URL
    pub url: String,

    /// URL after redirects
    #[serde(default)]
    pub final_url: String,

    /// Page title reported by the driver
    #[serde(default)]
    pub title: String,

    /// HTTP status, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Driver-computed fingerprint, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<SnapshotFingerprint>,
}

impl Snapshot {
    /// Create a snapshot from HTML and a URL; other fields default empty
    pub fn new(html: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            html: html.into(),
            ax_tree: Vec::new(),
            listener_hits: Vec::new(),
            final_url: url.clone(),
            url,
            title: String::new(),
            status: None,
            fingerprint: None,
        }
    }

    /// Builder method: set the AX tree
    pub fn with_ax_tree(mut self, ax_tree: Vec<AxNode>) -> Self {
        self.ax_tree = ax_tree;
        self
    }

    /// Builder method: set listener hits
    pub fn with_listener_hits(mut self, hits: Vec<ListenerHit>) -> Self {
        self.listener_hits = hits;
        self
    }

    /// Builder method: set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder method: set the post-redirect URL
    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    /// Builder method: set the driver fingerprint
    pub fn with_fingerprint(mut self, fingerprint: SnapshotFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// The URL the agent should see: final URL when known, else requested
    pub fn effective_url(&self) -> &str {
        if self.final_url.is_empty() {
            &self.url
        } else {
            &self.final_url
        }
    }
}
