//! Parser for the engine's `plugins list` table.
//!
//! The CLI renders a box-drawn table whose cells get truncated (`bluebubb`)
//! or wrapped onto extra physical lines. The only untruncated identifiers
//! live in source paths like `stock:extensions/<id>/index.ts`, so those win
//! over whatever the id column says.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

static ANSI_ESCAPES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ANSI regex is valid"));

static EXTENSION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"extensions/([A-Za-z0-9._-]+)/").expect("extension path regex is valid")
});

static COLUMN_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("column gap regex is valid"));

/// Below this many table rows the listing is assumed mangled and records are
/// synthesized from the extension paths found anywhere in the text.
const MIN_TABLE_RECORDS: usize = 5;

const DESCRIPTION_KEYWORDS: &[&str] = &[
    "plugin",
    "channel",
    "integration",
    "support",
    "provider",
    "connector",
    "enables",
    "adds",
    "allows",
    "tool",
    "for ",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    Loaded,
    Disabled,
    Error,
}

impl PluginStatus {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "loaded" => Some(PluginStatus::Loaded),
            "disabled" => Some(PluginStatus::Disabled),
            "error" => Some(PluginStatus::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginStatus::Loaded => "loaded",
            PluginStatus::Disabled => "disabled",
            PluginStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    pub id: String,
    pub display_name: String,
    pub status: PluginStatus,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
}

/// Record under construction while walking the table.
#[derive(Debug)]
struct Draft {
    name: String,
    id: String,
    status: PluginStatus,
    source: String,
    description: String,
    /// Cell count and column positions of the row that opened this record.
    width: usize,
    name_col: Option<usize>,
    id_col: usize,
    source_col: usize,
}

fn normalize(text: &str) -> String {
    let stripped = ANSI_ESCAPES.replace_all(text, "");
    stripped
        .chars()
        .map(|c| match c {
            '│' | '┃' | '║' | '┆' | '┊' | '├' | '┤' | '┼' | '┬' | '┴' | '╠' | '╣' | '╬' | '╦'
            | '╩' | '┌' | '┐' | '└' | '┘' | '╭' | '╮' | '╯' | '╰' | '╔' | '╗' | '╚' | '╝' => '|',
            '─' | '━' | '═' | '┄' | '┈' => ' ',
            other => other,
        })
        .collect()
}

/// Splits a normalized line into cells. Box rows keep interior empty cells so
/// column positions stay aligned across wrapped lines.
fn split_cells(line: &str) -> (Vec<String>, bool) {
    if line.contains('|') {
        let mut parts: Vec<String> = line.split('|').map(|c| c.trim().to_string()).collect();
        if line.trim_start().starts_with('|') && !parts.is_empty() {
            parts.remove(0);
        }
        if line.trim_end().ends_with('|') && !parts.is_empty() {
            parts.pop();
        }
        (parts, true)
    } else {
        let cells = COLUMN_GAP
            .split(line.trim())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        (cells, false)
    }
}

fn looks_descriptive(text: &str) -> bool {
    let lower = text.to_lowercase();
    DESCRIPTION_KEYWORDS.iter().any(|k| lower.contains(k)) || text.split_whitespace().count() >= 3
}

fn looks_like_path(text: &str) -> bool {
    text.contains("extensions/") || (text.contains('/') && !text.contains(' '))
}

fn ends_mid_token(text: &str) -> bool {
    text.ends_with('-') || text.ends_with('/')
}

fn append_spaced(target: &mut String, piece: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(piece);
}

fn clean_id(raw: &str) -> String {
    raw.trim()
        .trim_end_matches('…')
        .trim_end_matches("...")
        .trim()
        .to_string()
}

/// Every `extensions/<id>/` fragment in the text.
pub fn candidate_ids(text: &str) -> BTreeSet<String> {
    let normalized = normalize(text);
    EXTENSION_ID
        .captures_iter(&normalized)
        .map(|c| c[1].to_string())
        .collect()
}

impl Draft {
    fn open(cells: &[String], status_col: usize, status: PluginStatus) -> Option<Self> {
        if status_col == 0 {
            return None;
        }
        let id_col = status_col - 1;
        let name_col = status_col.checked_sub(2);
        let id = cells[id_col].clone();
        let name = name_col
            .map(|c| cells[c].clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| id.clone());
        Some(Self {
            name,
            id,
            status,
            source: cells.get(status_col + 1).cloned().unwrap_or_default(),
            description: String::new(),
            width: cells.len(),
            name_col,
            id_col,
            source_col: status_col + 1,
        })
    }

    fn fold_columns(&mut self, cells: &[String]) {
        for (idx, cell) in cells.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            if Some(idx) == self.name_col {
                self.fold_name_cell(cell);
            } else if idx == self.id_col {
                self.id.push_str(cell);
            } else if idx == self.source_col {
                self.source.push_str(cell);
            }
        }
    }

    fn fold_name_cell(&mut self, cell: &str) {
        if ends_mid_token(&self.name) {
            self.name.push_str(cell);
        } else if !self.description.is_empty() || looks_descriptive(cell) {
            append_spaced(&mut self.description, cell);
        } else {
            append_spaced(&mut self.name, cell);
        }
    }

    fn fold_line(&mut self, text: &str) {
        if looks_like_path(text) {
            self.source.push_str(text);
        } else if looks_descriptive(text) {
            append_spaced(&mut self.description, text);
        } else if ends_mid_token(&self.id) {
            self.id.push_str(text);
            if ends_mid_token(&self.name) {
                self.name.push_str(text);
            }
        } else if ends_mid_token(&self.name) {
            self.name.push_str(text);
        } else {
            append_spaced(&mut self.description, text);
        }
    }

    fn finish(self, candidates: &BTreeSet<String>) -> PluginRecord {
        let id = resolve_id(&self.id, &self.source, candidates);
        let display_name = if self.name.is_empty() { id.clone() } else { self.name };
        PluginRecord {
            id,
            display_name,
            status: self.status,
            description: self.description,
            source: self.source,
        }
    }
}

/// Source path fragment first, then a prefix match against the candidates
/// (exact match preferred, otherwise the shortest), then the table cell.
fn resolve_id(table_id: &str, source: &str, candidates: &BTreeSet<String>) -> String {
    let compact: String = source.split_whitespace().collect();
    if let Some(cap) = EXTENSION_ID.captures(&compact) {
        return cap[1].to_string();
    }

    let cleaned = clean_id(table_id);
    if !cleaned.is_empty() {
        if candidates.contains(&cleaned) {
            return cleaned;
        }
        if let Some(best) = candidates
            .iter()
            .filter(|c| c.starts_with(&cleaned))
            .min_by_key(|c| c.len())
        {
            return best.clone();
        }
    }
    cleaned
}

fn status_near(lines: &[String], id: &str) -> PluginStatus {
    let needle = format!("extensions/{}/", id);
    let Some(pos) = lines.iter().position(|l| l.contains(&needle)) else {
        return PluginStatus::Disabled;
    };
    let lo = pos.saturating_sub(1);
    let hi = (pos + 1).min(lines.len().saturating_sub(1));
    for idx in std::iter::once(pos).chain(lo..=hi) {
        let (cells, _) = split_cells(&lines[idx]);
        if let Some(status) = cells.iter().find_map(|c| PluginStatus::from_token(c)) {
            return status;
        }
        if let Some(status) = lines[idx]
            .split(|c: char| !c.is_ascii_alphabetic())
            .find_map(PluginStatus::from_token)
        {
            return status;
        }
    }
    PluginStatus::Disabled
}

/// Parses `plugins list` output into records, deduplicated by corrected id.
/// Order of the result carries no meaning.
pub fn parse_plugin_table(text: &str) -> Vec<PluginRecord> {
    let normalized = normalize(text);
    let lines: Vec<String> = normalized.lines().map(str::to_string).collect();
    let candidates = candidate_ids(text);

    let mut drafts: Vec<Draft> = Vec::new();
    for line in &lines {
        if line.trim().is_empty() {
            continue;
        }
        let (cells, boxed) = split_cells(line);
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }

        let status_hit = cells
            .iter()
            .enumerate()
            .find_map(|(i, c)| PluginStatus::from_token(c).map(|s| (i, s)));
        if let Some((col, status)) = status_hit {
            if let Some(draft) = Draft::open(&cells, col, status) {
                drafts.push(draft);
                continue;
            }
        }

        let Some(current) = drafts.last_mut() else {
            continue;
        };
        if boxed && cells.len() == current.width {
            current.fold_columns(&cells);
        } else {
            let joined = cells
                .iter()
                .filter(|c| !c.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            current.fold_line(&joined);
        }
    }

    let mut seen = HashSet::new();
    let mut records: Vec<PluginRecord> = drafts
        .into_iter()
        .map(|d| d.finish(&candidates))
        .filter(|r| !r.id.is_empty() && seen.insert(r.id.clone()))
        .collect();

    if records.len() < MIN_TABLE_RECORDS && candidates.len() > records.len() {
        for id in &candidates {
            if seen.insert(id.clone()) {
                records.push(PluginRecord {
                    id: id.clone(),
                    display_name: id.clone(),
                    status: status_near(&lines, id),
                    description: String::new(),
                    source: format!("extensions/{}/", id),
                });
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(records: &'a [PluginRecord], id: &str) -> &'a PluginRecord {
        records
            .iter()
            .find(|r| r.id == id)
            .unwrap_or_else(|| panic!("no record {} in {:?}", id, records))
    }

    const TABLE: &str = "\
Plugins (3/6 loaded)
┌──────────────┬──────────┬──────────┬──────────────────────────────────┬─────────┐
│ Name         │ ID       │ Status   │ Source                           │ Version │
├──────────────┼──────────┼──────────┼──────────────────────────────────┼─────────┤
│ BlueBubbles  │ bluebubb │ disabled │ stock:extensions/bluebubbles/ind │ 2026.1  │
│              │          │          │ ex.ts                            │         │
│ Feishu       │ feishu   │ loaded   │ stock:extensions/feishu/index.ts │ 2026.1  │
│ Lark channel │          │          │                                  │         │
│ plugin       │          │          │                                  │         │
│ Memory Core  │ memory-  │ loaded   │ stock:extensions/memory-core/ind │ 2026.1  │
│              │ core     │          │ ex.ts                            │         │
│ Voice Call   │ voice-c… │ error    │ stock:extensions/voice-call/inde │ 2026.1  │
│ Telegram     │ telegram │ disabled │ stock:extensions/telegram/index. │ 2026.1  │
│ Slack        │ slack    │ disabled │ stock:extensions/slack/index.ts  │ 2026.1  │
└──────────────┴──────────┴──────────┴──────────────────────────────────┴─────────┘
";

    #[test]
    fn test_truncated_id_recovered_from_source() {
        let records = parse_plugin_table(TABLE);
        let r = find(&records, "bluebubbles");
        assert_eq!(r.status, PluginStatus::Disabled);
        assert_eq!(r.display_name, "BlueBubbles");
        assert!(records.iter().all(|r| r.id != "bluebubb"));
    }

    #[test]
    fn test_wrapped_id_and_description() {
        let records = parse_plugin_table(TABLE);
        let memory = find(&records, "memory-core");
        assert_eq!(memory.status, PluginStatus::Loaded);
        assert_eq!(memory.display_name, "Memory Core");

        let feishu = find(&records, "feishu");
        assert_eq!(feishu.display_name, "Feishu");
        assert_eq!(feishu.description, "Lark channel plugin");
    }

    #[test]
    fn test_ellipsis_id_resolved_by_source() {
        let records = parse_plugin_table(TABLE);
        assert_eq!(find(&records, "voice-call").status, PluginStatus::Error);
        assert_eq!(records.len(), 6);
    }

    #[test]
    fn test_prefix_match_against_candidates() {
        let text = "\
warn: failed to load extensions/voice-call/index.ts
| Voice Call | voice-c… | error | stock:exten… |
| Telegram | telegram | disabled | stock:extensions/telegram/index.ts |
";
        let candidates = candidate_ids(text);
        assert_eq!(resolve_id("voice-c…", "stock:exten…", &candidates), "voice-call");
        let records = parse_plugin_table(text);
        assert!(records.iter().any(|r| r.id == "voice-call"));
    }

    #[test]
    fn test_deduplicates_by_corrected_id() {
        let text = "\
| Feishu | feishu | loaded | stock:extensions/feishu/index.ts |
| Feishu (dup) | feis | disabled | stock:extensions/feishu/index.ts |
";
        let records = parse_plugin_table(text);
        let feishu: Vec<_> = records.iter().filter(|r| r.id == "feishu").collect();
        assert_eq!(feishu.len(), 1);
        assert_eq!(feishu[0].status, PluginStatus::Loaded);
    }

    #[test]
    fn test_strips_ansi() {
        let text = "\x1b[1m│\x1b[0m Slack \x1b[2m│\x1b[0m slack │ \x1b[32mloaded\x1b[0m │ stock:extensions/slack/index.ts │";
        let records = parse_plugin_table(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "slack");
        assert_eq!(records[0].status, PluginStatus::Loaded);
    }

    #[test]
    fn test_synthesizes_from_paths_when_table_is_mangled() {
        let text = "\
| Discord | discord | loaded | stock:extensions/discord/index.ts |
feishu loaded stock:extensions/feishu/index.ts
stock:extensions/telegram/index.ts
stock:extensions/slack/index.ts
";
        let records = parse_plugin_table(text);
        assert_eq!(records.len(), 4);
        assert_eq!(find(&records, "discord").status, PluginStatus::Loaded);
        assert_eq!(find(&records, "feishu").status, PluginStatus::Loaded);
        assert_eq!(find(&records, "slack").status, PluginStatus::Disabled);
    }

    #[test]
    fn test_plain_text_without_records() {
        assert!(parse_plugin_table("No plugins found.\n").is_empty());
    }
}
