//! Unicode-script classification and script-based language filtering.
//!
//! Mixed-language pages (Spanish spec tables + Korean UI + English reviews)
//! create noise for agents. The filter detects the page-dominant script and
//! then removes short foreign-script UI fragments while tagging long foreign
//! passages with a `[lang]` marker instead of dropping them.
//!
//! Classification is a sorted-range bisect over codepoint ranges, O(log k)
//! per character.

use serde::{Deserialize, Serialize};

/// Writing-system classes the filter distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Script {
    Latin,
    Cjk,
    Hangul,
    Hiragana,
    Katakana,
    Cyrillic,
    Arabic,
    /// Digits, punctuation, whitespace, symbols — never counted
    Common,
    Unknown,
}

// Codepoint ranges, sorted by start. COMMON absorbs digits/punct/currency.
const RANGES: &[(u32, u32, Script)] = &[
    (0x0000, 0x0040, Script::Common),
    (0x0041, 0x005A, Script::Latin),
    (0x005B, 0x0060, Script::Common),
    (0x0061, 0x007A, Script::Latin),
    (0x007B, 0x00BF, Script::Common),
    (0x00C0, 0x024F, Script::Latin),
    (0x0400, 0x052F, Script::Cyrillic),
    (0x0600, 0x06FF, Script::Arabic),
    (0x0750, 0x077F, Script::Arabic),
    (0x08A0, 0x08FF, Script::Arabic),
    (0x1100, 0x11FF, Script::Hangul),
    (0x1E00, 0x1EFF, Script::Latin),
    (0x2000, 0x218F, Script::Common),
    (0x3000, 0x303F, Script::Common),
    (0x3040, 0x309F, Script::Hiragana),
    (0x30A0, 0x30FF, Script::Katakana),
    (0x3130, 0x318F, Script::Hangul),
    (0x31F0, 0x31FF, Script::Katakana),
    (0x3400, 0x4DBF, Script::Cjk),
    (0x4E00, 0x9FFF, Script::Cjk),
    (0xAC00, 0xD7AF, Script::Hangul),
    (0xD7B0, 0xD7FF, Script::Hangul),
    (0xF900, 0xFAFF, Script::Cjk),
    (0xFE30, 0xFE4F, Script::Common),
    (0xFF01, 0xFF20, Script::Common),
    (0x20000, 0x2A6DF, Script::Cjk),
    (0x2A700, 0x2B81F, Script::Cjk),
];

/// Classify a single character's script
pub fn classify_char(c: char) -> Script {
    let cp = c as u32;
    let idx = RANGES.partition_point(|r| r.0 <= cp);
    if idx > 0 {
        let (start, end, script) = RANGES[idx - 1];
        if (start..=end).contains(&cp) {
            return script;
        }
    }
    Script::Unknown
}

/// Script distribution of a text
#[derive(Debug, Clone)]
pub struct ScriptProfile {
    /// Count of non-Common, non-Unknown characters
    pub total_classified: usize,
    pub dominant: Script,
    pub dominant_ratio: f64,
}

/// Compute the script distribution of `text`
pub fn profile_text(text: &str) -> ScriptProfile {
    let mut counts: [(Script, usize); 7] = [
        (Script::Latin, 0),
        (Script::Cjk, 0),
        (Script::Hangul, 0),
        (Script::Hiragana, 0),
        (Script::Katakana, 0),
        (Script::Cyrillic, 0),
        (Script::Arabic, 0),
    ];
    for c in text.chars() {
        let script = classify_char(c);
        if let Some(entry) = counts.iter_mut().find(|(s, _)| *s == script) {
            entry.1 += 1;
        }
    }
    let total: usize = counts.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return ScriptProfile {
            total_classified: 0,
            dominant: Script::Common,
            dominant_ratio: 0.0,
        };
    }
    let (dominant, count) = counts
        .iter()
        .max_by_key(|(_, n)| *n)
        .copied()
        .unwrap_or((Script::Common, 0));
    ScriptProfile {
        total_classified: total,
        dominant,
        dominant_ratio: count as f64 / total as f64,
    }
}

// Japanese pages mix Hiragana, Katakana, and CJK ideographs; treat them as
// one group when judging "foreign" content.
fn script_group(s: Script) -> &'static [Script] {
    match s {
        Script::Cjk | Script::Hiragana | Script::Katakana => {
            &[Script::Cjk, Script::Hiragana, Script::Katakana]
        }
        Script::Hangul => &[Script::Hangul],
        Script::Latin => &[Script::Latin],
        Script::Cyrillic => &[Script::Cyrillic],
        Script::Arabic => &[Script::Arabic],
        Script::Common => &[Script::Common],
        Script::Unknown => &[Script::Unknown],
    }
}

/// Ratio of classified characters outside the page script's group
fn foreign_ratio(text: &str, page_script: Script) -> f64 {
    let group = script_group(page_script);
    let mut foreign = 0usize;
    let mut native = 0usize;
    for c in text.chars() {
        let s = classify_char(c);
        if s == Script::Common || s == Script::Unknown {
            continue;
        }
        if group.contains(&s) {
            native += 1;
        } else {
            foreign += 1;
        }
    }
    let total = foreign + native;
    if total == 0 {
        0.0
    } else {
        foreign as f64 / total as f64
    }
}

/// Short language label for `[lang]` tags
fn script_label(text: &str) -> &'static str {
    match profile_text(text).dominant {
        Script::Latin => "en",
        Script::Hangul => "ko",
        Script::Cjk => "zh",
        Script::Hiragana | Script::Katakana => "ja",
        Script::Cyrillic => "ru",
        Script::Arabic => "ar",
        _ => "other",
    }
}

// Lines that always pass through regardless of script: URLs, numbers with
// units, and anything short enough to be a brand name or code.
fn is_passthrough(line: &str) -> bool {
    let stripped = line.trim();
    if stripped.chars().count() <= 5 {
        return true;
    }
    if stripped.contains("http://") || stripped.contains("https://") {
        return true;
    }
    let mut has_digit = false;
    for c in stripped.chars() {
        if c.is_ascii_digit() {
            has_digit = true;
        } else if !matches!(c, '.' | ',' | ' ' | '%' | '℃' | '㎜' | '㎝' | '㎏' | '㎖' | '㎡')
            && !c.is_ascii_alphabetic()
        {
            return false;
        }
    }
    has_digit
}

/// Foreign ratio above which short lines are removed
pub const REMOVE_THRESHOLD: f64 = 0.8;

/// Foreign ratio above which long lines get a `[lang]` tag
pub const TAG_THRESHOLD: f64 = 0.5;

/// Result of language filtering
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub lines: Vec<String>,
    pub removed: usize,
    pub tagged: usize,
    pub page_script: Script,
}

/// Detect the dominant script of a page from its text lines
pub fn detect_page_script(lines: &[String]) -> Script {
    let all: String = lines.join("\n");
    let profile = profile_text(&all);
    if profile.total_classified == 0 {
        Script::Common
    } else {
        profile.dominant
    }
}

/// Filter lines by script affinity to the page-dominant script.
///
/// Short (< 50 char) mostly-foreign lines are removed as UI noise; long
/// mostly-foreign lines are kept but tagged. URLs, numerals, and strings of
/// five characters or fewer always pass.
pub fn filter_lines(lines: &[String], page_script: Option<Script>) -> FilterOutcome {
    let page_script = page_script.unwrap_or_else(|| detect_page_script(lines));

    if page_script == Script::Common || page_script == Script::Unknown {
        return FilterOutcome {
            lines: lines.to_vec(),
            removed: 0,
            tagged: 0,
            page_script,
        };
    }

    let mut out = Vec::with_capacity(lines.len());
    let mut removed = 0usize;
    let mut tagged = 0usize;

    for line in lines {
        if is_passthrough(line) {
            out.push(line.clone());
            continue;
        }
        let ratio = foreign_ratio(line, page_script);
        if line.chars().count() < 50 && ratio > REMOVE_THRESHOLD {
            removed += 1;
            continue;
        }
        if ratio > TAG_THRESHOLD {
            out.push(format!("[{}] {}", script_label(line), line));
            tagged += 1;
        } else {
            out.push(line.clone());
        }
    }

    FilterOutcome {
        lines: out,
        removed,
        tagged,
        page_script,
    }
}
