// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Search-result formatting shared by the `web_search` tool, the
//! `aicli web search` subcommand, and the auto-search prompt prefix.

use serde_json::Value;

const MAX_TITLE: usize = 160;
const MAX_URL: usize = 500;
const MAX_SNIPPET: usize = 500;
const WRAP_WIDTH: usize = 80;

/// One normalised search hit, whichever provider produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Pull hits out of a provider response body.
///
/// Google CSE puts them in `items[]` (`title`/`link`/`snippet`); Brave in
/// `web.results[]` (`title`/`url`/`description`). Unknown shapes produce an
/// empty list rather than an error — formatting is best-effort.
pub fn extract_hits(body: &Value) -> Vec<SearchHit> {
    let google = body.get("items").and_then(Value::as_array);
    let brave = body
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(Value::as_array);

    let (items, url_key, snippet_key) = match (google, brave) {
        (Some(items), _) => (items, "link", "snippet"),
        (None, Some(items)) => (items, "url", "description"),
        (None, None) => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title").and_then(Value::as_str)?;
            let url = item.get(url_key).and_then(Value::as_str)?;
            let snippet = item.get(snippet_key).and_then(Value::as_str).unwrap_or("");
            Some(SearchHit {
                title: clip(title, MAX_TITLE),
                url: clip(url, MAX_URL),
                snippet: clip(snippet, MAX_SNIPPET),
            })
        })
        .collect()
}

/// Render hits as numbered TITLE / URL / wrapped-snippet entries.
pub fn format_hits(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, hit.title));
        out.push_str(&format!("   {}\n", hit.url));
        for line in wrap(&hit.snippet, WRAP_WIDTH.saturating_sub(3)) {
            out.push_str(&format!("   {line}\n"));
        }
    }
    out
}

/// Format a raw provider body, or fall back to compact JSON when no hits
/// could be extracted.
pub fn format_provider_body(body: &Value) -> String {
    let hits = extract_hits(body);
    if hits.is_empty() {
        return body.to_string();
    }
    format_hits(&hits)
}

fn clip(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
