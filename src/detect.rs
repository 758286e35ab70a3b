//! Three-tier interactive element detection.
//!
//! Tier 1: AX-tree nodes with recognized roles and accessible names.
//! Tier 2: DOM tags with implicit roles (`<input>`, `<select>`, `<textarea>`,
//!         `<button>`, `<a href>`) even when absent from the AX tree.
//! Tier 3: elements the driver reported as carrying click handlers, promoted
//!         to `role=button` with a best-effort name.
//!
//! Later tiers fill blanks but never overwrite; entries deduplicate on
//! `(role, name, parent-xpath-prefix)`; refs are assigned in document order.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};

use crate::dom::{self, NormalizedDom};
use crate::sanitize::sanitize_text;
use crate::snapshot::{AxNode, Snapshot};

/// Action classes a user can perform on an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Affordance {
    Click,
    Type,
    Select,
    Hover,
}

impl Affordance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Affordance::Click => "click",
            Affordance::Type => "type",
            Affordance::Select => "select",
            Affordance::Hover => "hover",
        }
    }
}

/// Priority class for the budget-aware filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Form submit / add-to-cart-like calls to action
    Primary,
    /// Visible accessible name
    Named,
    /// Form controls
    Inputish,
    /// Pagination, menus, navigation chrome
    Chrome,
    /// Unnamed gridcells/rows, pure ordinals — demoted, never silently dropped
    TableNoise,
    Rest,
}

/// One step in the locator fallback chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectorStep {
    /// Locate by role and exact accessible name
    RoleName { role: String, name: String },
    /// CSS selector
    Css { selector: String },
    /// Degraded: first element with the role
    RoleFirstMatch { role: String },
}

/// One action surface on the page
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Interactable {
    /// Stable numeric reference within one PageMap, document order, from 1
    #[serde(rename = "ref")]
    pub ref_id: u32,

    /// Canonical role name
    pub role: String,

    /// Sanitized accessible name
    pub name: String,

    /// Non-empty affordance set; the first entry is primary
    pub affordances: Vec<Affordance>,

    /// Ordered candidate locators
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selector_chain: Vec<SelectorStep>,

    /// Option values for comboboxes/selects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    /// Budget-filter priority class
    pub bucket: Bucket,

    /// Current value, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Detection tier (1 = AX, 2 = implicit role, 3 = listener)
    pub tier: u8,

    /// XPath prefix of the parent, used for dedup
    #[serde(skip)]
    pub parent_xpath: String,

    /// Tag name when known (structure-hash input)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
}

impl Interactable {
    /// Primary affordance (the set is never empty)
    pub fn primary_affordance(&self) -> Affordance {
        self.affordances.first().copied().unwrap_or(Affordance::Click)
    }

    /// One-line rendering used for token accounting
    pub fn prompt_line(&self) -> String {
        let affordances = self
            .affordances
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut line = format!("[{}] {}: {} ({affordances})", self.ref_id, self.role, self.name);
        if let Some(value) = &self.value {
            if !value.is_empty() {
                line.push_str(&format!(" value=\"{value}\""));
            }
        }
        if !self.options.is_empty() {
            let shown: Vec<&str> = self.options.iter().take(8).map(String::as_str).collect();
            let mut opts = shown.join(",");
            if self.options.len() > 8 {
                opts.push_str(&format!("...+{}", self.options.len() - 8));
            }
            line.push_str(&format!(" [options={opts}]"));
        }
        line
    }
}

// ---------------------------------------------------------------------------
// Role tables
// ---------------------------------------------------------------------------

/// Primary affordance for a recognized role; None means not interactive
fn affordance_for_role(role: &str) -> Option<Affordance> {
    match role {
        "button" | "link" | "menuitem" | "menuitemcheckbox" | "menuitemradio" | "tab"
        | "treeitem" | "option" | "gridcell" | "cell" | "row" | "checkbox" | "switch" | "radio"
        | "slider" => Some(Affordance::Click),
        "textbox" | "searchbox" | "spinbutton" | "textarea" => Some(Affordance::Type),
        "combobox" | "listbox" => Some(Affordance::Select),
        _ => None,
    }
}

fn is_input_role(role: &str) -> bool {
    matches!(
        role,
        "textbox" | "searchbox" | "combobox" | "listbox" | "checkbox" | "radio" | "switch"
            | "slider" | "spinbutton" | "textarea"
    )
}

// Add-to-cart / submit-like call-to-action names (multilingual)
static PRIMARY_CTA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(장바구니|카트|구매|구입|주문|담기|바로구매|add.to.(?:cart|bag|basket)|buy.now|purchase|checkout|submit|order|カートに入れる|今すぐ買う|ajouter au panier|in den warenkorb|kaufen)",
    )
    .expect("cta regex")
});

// Pagination / menu chrome names
static CHROME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(next|prev|previous|menu|nav|more|다음|이전|메뉴|더보기|次へ|前へ|\d+)$")
        .expect("chrome regex")
});

// Pure ordinals or row labels ("1", "2.", "#3")
static ORDINAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#?\d+\.?$").expect("ordinal regex"));

/// Classify an interactable into its budget bucket
fn bucket_for(role: &str, name: &str) -> Bucket {
    let unnamed = name.trim().is_empty();
    if matches!(role, "gridcell" | "cell" | "row") && (unnamed || ORDINAL_RE.is_match(name.trim()))
    {
        return Bucket::TableNoise;
    }
    if !unnamed && PRIMARY_CTA_RE.is_match(name) {
        return Bucket::Primary;
    }
    if is_input_role(role) {
        return Bucket::Inputish;
    }
    if matches!(role, "tab" | "menuitem" | "menuitemcheckbox" | "menuitemradio")
        || (!unnamed && CHROME_RE.is_match(name.trim()))
    {
        return Bucket::Chrome;
    }
    if !unnamed {
        return Bucket::Named;
    }
    Bucket::Rest
}

// ---------------------------------------------------------------------------
// Tier 1: AX tree
// ---------------------------------------------------------------------------

fn extract_ax_options(node: &AxNode) -> Vec<String> {
    let mut options = Vec::new();
    for child in &node.children {
        let role = child.role.to_lowercase();
        if matches!(role.as_str(), "option" | "menuitem" | "listitem") {
            let name = sanitize_text(&child.name);
            if !name.is_empty() {
                options.push(name);
            }
        }
        if matches!(role.as_str(), "group" | "listbox") {
            options.extend(extract_ax_options(child));
        }
    }
    options
}

fn walk_ax(node: &AxNode, out: &mut Vec<Interactable>) {
    let role = node.role.to_lowercase();

    if let Some(primary) = affordance_for_role(&role) {
        let name = sanitize_text(&node.name);
        let options = if matches!(role.as_str(), "combobox" | "listbox") {
            extract_ax_options(node)
        } else {
            Vec::new()
        };
        let mut selector_chain = Vec::new();
        if !name.is_empty() {
            selector_chain.push(SelectorStep::RoleName {
                role: role.clone(),
                name: name.clone(),
            });
        }
        selector_chain.push(SelectorStep::RoleFirstMatch { role: role.clone() });

        out.push(Interactable {
            ref_id: 0,
            role: role.clone(),
            name,
            affordances: vec![primary],
            selector_chain,
            options,
            bucket: Bucket::Rest, // assigned after merge
            value: node.value.clone().map(|v| sanitize_text(&v)).filter(|v| !v.is_empty()),
            tier: 1,
            parent_xpath: crate::dom::chunk::parent_xpath(&node.xpath),
            tag: String::new(),
        });
    }

    for child in &node.children {
        walk_ax(child, out);
    }
}

// ---------------------------------------------------------------------------
// Tier 2: implicit HTML roles
// ---------------------------------------------------------------------------

fn implicit_role(el: &ElementRef<'_>) -> Option<(String, Affordance)> {
    let tag = el.value().name();
    match tag {
        "button" => Some(("button".into(), Affordance::Click)),
        "a" => el
            .value()
            .attr("href")
            .map(|_| ("link".into(), Affordance::Click)),
        "select" => Some(("combobox".into(), Affordance::Select)),
        "textarea" => Some(("textbox".into(), Affordance::Type)),
        "input" => {
            let input_type = el.value().attr("type").unwrap_or("text").to_lowercase();
            match input_type.as_str() {
                "hidden" | "image" => None,
                "submit" | "button" | "reset" => Some(("button".into(), Affordance::Click)),
                "checkbox" => Some(("checkbox".into(), Affordance::Click)),
                "radio" => Some(("radio".into(), Affordance::Click)),
                "range" => Some(("slider".into(), Affordance::Click)),
                "search" => Some(("searchbox".into(), Affordance::Type)),
                _ => Some(("textbox".into(), Affordance::Type)),
            }
        }
        _ => {
            // Explicit role attribute on any tag
            let role = el.value().attr("role")?.to_lowercase();
            affordance_for_role(&role).map(|a| (role, a))
        }
    }
}

fn element_name(el: &ElementRef<'_>) -> String {
    for attr in ["aria-label", "placeholder", "title", "alt"] {
        if let Some(value) = el.value().attr(attr) {
            let clean = sanitize_text(value);
            if !clean.is_empty() {
                return clean;
            }
        }
    }
    let text = dom::text_content(el);
    let clean = sanitize_text(&text);
    if !clean.is_empty() && clean.chars().count() <= 100 {
        return clean;
    }
    if let Some(name) = el.value().attr("name") {
        return sanitize_text(name);
    }
    String::new()
}

/// CSS locator preference: `#id` → unique-ish attribute → tag.class → path
fn css_selector_for(el: &ElementRef<'_>, css_path: &str) -> String {
    if let Some(id) = el.value().attr("id") {
        if !id.is_empty() && !id.contains(char::is_whitespace) {
            return format!("#{id}");
        }
    }
    for attr in ["data-testid", "data-test-id", "data-cy", "name"] {
        if let Some(value) = el.value().attr(attr) {
            if !value.is_empty() {
                return format!("{}[{attr}=\"{value}\"]", el.value().name());
            }
        }
    }
    if let Some(class) = el.value().attr("class") {
        if let Some(first) = class.split_whitespace().next() {
            return format!("{}.{first}", el.value().name());
        }
    }
    css_path.to_string()
}

struct DomWalkState {
    out: Vec<Interactable>,
}

fn walk_dom(el: ElementRef<'_>, xpath: &str, css_path: &str, state: &mut DomWalkState) {
    let tag = el.value().name();
    if crate::dom::chunk::is_removed_tag(tag) {
        return;
    }
    if dom::hidden_element(&el).is_some() {
        return;
    }
    if el.value().attr("disabled").is_some() {
        return;
    }

    if let Some((role, primary)) = implicit_role(&el) {
        let name = element_name(&el);
        let css = css_selector_for(&el, css_path);

        let mut options = Vec::new();
        if tag == "select" {
            for option in el
                .children()
                .filter_map(ElementRef::wrap)
                .flat_map(collect_options)
            {
                options.push(option);
            }
        }

        let mut selector_chain = Vec::new();
        if !name.is_empty() {
            selector_chain.push(SelectorStep::RoleName {
                role: role.clone(),
                name: name.clone(),
            });
        }
        selector_chain.push(SelectorStep::Css { selector: css });
        selector_chain.push(SelectorStep::RoleFirstMatch { role: role.clone() });

        let value = el
            .value()
            .attr("value")
            .map(sanitize_text)
            .filter(|v| !v.is_empty());

        state.out.push(Interactable {
            ref_id: 0,
            role,
            name,
            affordances: vec![primary],
            selector_chain,
            options,
            bucket: Bucket::Rest,
            value,
            tier: 2,
            parent_xpath: crate::dom::chunk::parent_xpath(xpath),
            tag: tag.to_string(),
        });
    }

    // Per-tag sibling indices for stable xpath steps
    let mut sibling_counts: IndexMap<String, usize> = IndexMap::new();
    for child in el.children().filter_map(ElementRef::wrap) {
        let child_tag = child.value().name().to_string();
        let index = sibling_counts.entry(child_tag.clone()).or_insert(0);
        *index += 1;
        let child_xpath = format!("{xpath}/{child_tag}[{index}]");
        let child_css = format!("{css_path} > {child_tag}:nth-of-type({index})");
        walk_dom(child, &child_xpath, &child_css, state);
    }
}

fn collect_options(el: ElementRef<'_>) -> Vec<String> {
    let mut out = Vec::new();
    if el.value().name() == "option" {
        let text = sanitize_text(&dom::text_content(&el));
        if !text.is_empty() {
            out.push(text);
        }
    } else if el.value().name() == "optgroup" {
        for child in el.children().filter_map(ElementRef::wrap) {
            out.extend(collect_options(child));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Merge + public API
// ---------------------------------------------------------------------------

/// Outcome of detection: the merged table plus non-fatal warnings
#[derive(Debug, Default)]
pub struct DetectionResult {
    pub interactables: Vec<Interactable>,
    pub warnings: Vec<String>,
    /// Tier counts for telemetry: [tier1, tier2, tier3]
    pub tier_counts: [usize; 3],
}

/// Run the three detection tiers and merge the results.
pub fn detect_interactables(snapshot: &Snapshot, dom: &NormalizedDom) -> DetectionResult {
    let mut result = DetectionResult::default();

    // Tier 1 — AX tree
    let mut ax_items = Vec::new();
    for root in &snapshot.ax_tree {
        walk_ax(root, &mut ax_items);
    }
    if snapshot.ax_tree.is_empty() {
        result
            .warnings
            .push("AX_DEGRADED: no accessibility tree in snapshot; falling back to DOM detection".to_string());
    }

    // Tier 2 — implicit HTML roles
    let mut dom_state = DomWalkState { out: Vec::new() };
    if let Some(body) = dom.body() {
        walk_dom(body, "/html/body", "body", &mut dom_state);
    }

    // Tier 3 — listener hits
    let mut listener_items = Vec::new();
    for hit in &snapshot.listener_hits {
        let name = sanitize_text(&hit.name);
        if name.is_empty() {
            continue;
        }
        let affordances = if hit.event.contains("mouseover") || hit.event.contains("mouseenter") {
            vec![Affordance::Hover, Affordance::Click]
        } else {
            vec![Affordance::Click]
        };
        let mut selector_chain = vec![SelectorStep::RoleName {
            role: "button".into(),
            name: name.clone(),
        }];
        if let Some(css) = &hit.css_selector {
            selector_chain.push(SelectorStep::Css {
                selector: css.clone(),
            });
        }
        selector_chain.push(SelectorStep::RoleFirstMatch {
            role: "button".into(),
        });
        listener_items.push(Interactable {
            ref_id: 0,
            role: "button".into(),
            name,
            affordances,
            selector_chain,
            options: Vec::new(),
            bucket: Bucket::Rest,
            value: None,
            tier: 3,
            parent_xpath: crate::dom::chunk::parent_xpath(&hit.xpath),
            tag: if hit.tag.is_empty() {
                "div".to_string()
            } else {
                hit.tag.clone()
            },
        });
    }

    // Merge in tier order; dedupe on (role, name, parent_xpath); later tiers
    // fill blanks but never overwrite.
    let mut merged: IndexMap<(String, String, String), Interactable> = IndexMap::new();
    let mut unnamed: Vec<Interactable> = Vec::new();
    for item in ax_items
        .into_iter()
        .chain(dom_state.out)
        .chain(listener_items)
    {
        match result.tier_counts.get_mut(item.tier as usize - 1) {
            Some(count) => *count += 1,
            None => {}
        }
        if item.name.is_empty() {
            // Unnamed entries are not deduplicated (they are distinct surfaces)
            unnamed.push(item);
            continue;
        }
        let key = (
            item.role.clone(),
            item.name.to_lowercase(),
            item.parent_xpath.clone(),
        );
        match merged.get_mut(&key) {
            None => {
                merged.insert(key, item);
            }
            Some(existing) => {
                if existing.options.is_empty() && !item.options.is_empty() {
                    existing.options = item.options;
                }
                if existing.value.is_none() {
                    existing.value = item.value;
                }
                let has_css = existing
                    .selector_chain
                    .iter()
                    .any(|s| matches!(s, SelectorStep::Css { .. }));
                if !has_css {
                    if let Some(css) = item
                        .selector_chain
                        .iter()
                        .find(|s| matches!(s, SelectorStep::Css { .. }))
                    {
                        // Keep the degraded step last
                        let insert_at = existing.selector_chain.len().saturating_sub(1);
                        existing.selector_chain.insert(insert_at, css.clone());
                    }
                }
                if existing.tag.is_empty() && !item.tag.is_empty() {
                    existing.tag = item.tag;
                }
            }
        }
    }

    let mut all: Vec<Interactable> = merged.into_values().chain(unnamed).collect();
    for (i, item) in all.iter_mut().enumerate() {
        item.ref_id = (i + 1) as u32;
        item.bucket = bucket_for(&item.role, &item.name);
    }

    log::info!(
        "detected {} interactables (tier1 {}, tier2 {}, tier3 {})",
        all.len(),
        result.tier_counts[0],
        result.tier_counts[1],
        result.tier_counts[2]
    );

    result.interactables = all;
    result
}

/// Filter interactables to fit the total token budget.
///
/// Buckets are drained in priority order; the survivors are re-sorted into
/// document order and renumbered contiguously from 1. Table-noise rows are
/// demoted to the back of the queue but are only dropped when the budget
/// truly runs out, and every drop is reported.
pub fn budget_filter(
    interactables: Vec<Interactable>,
    available_tokens: usize,
    budgeter: &crate::locale::TokenBudgeter,
    warnings: &mut Vec<String>,
) -> Vec<Interactable> {
    if interactables.is_empty() {
        return interactables;
    }
    let available = available_tokens.max(100);
    let total = interactables.len();

    let mut order: Vec<(Bucket, Interactable)> = interactables
        .into_iter()
        .map(|i| (i.bucket, i))
        .collect();
    order.sort_by_key(|(bucket, item)| (*bucket, item.ref_id));

    let mut selected = Vec::new();
    let mut used_tokens = 0usize;
    for (_, item) in order {
        let cost = budgeter.estimate(&item.prompt_line());
        if used_tokens + cost > available {
            continue;
        }
        used_tokens += cost;
        selected.push(item);
    }

    selected.sort_by_key(|i| i.ref_id);
    for (i, item) in selected.iter_mut().enumerate() {
        item.ref_id = (i + 1) as u32;
    }

    if selected.len() < total {
        let dropped = total - selected.len();
        log::info!("budget filter: {total} -> {} interactables ({available} tokens)", selected.len());
        warnings.push(format!(
            "interactable budget: {dropped} of {total} elements omitted to fit the token budget"
        ));
    }

    selected
}
