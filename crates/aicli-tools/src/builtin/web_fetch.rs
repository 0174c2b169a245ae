// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::paging::{apply_paging, PagingCache};
use crate::tool::{Tool, ToolCall, ToolResult};

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_TIMEOUT_SECS: u64 = 15;
const CONNECT_TIMEOUT_SECS: u64 = 10;
/// At most this many prefixes are honoured from the environment.
pub const MAX_PREFIXES: usize = 32;

/// Parse `AICLI_WEB_FETCH_PREFIXES`: URL prefixes separated by commas or
/// whitespace, capped at [`MAX_PREFIXES`].
pub fn parse_prefix_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .take(MAX_PREFIXES)
        .map(str::to_string)
        .collect()
}

pub struct WebFetchTool {
    cache: Arc<PagingCache>,
    allowed_prefixes: Vec<String>,
    max_body_bytes: usize,
}

impl WebFetchTool {
    pub fn new(cache: Arc<PagingCache>, allowed_prefixes: Vec<String>, max_body_bytes: usize) -> Self {
        let max_body_bytes = if max_body_bytes == 0 { DEFAULT_MAX_BODY_BYTES } else { max_body_bytes };
        Self { cache, allowed_prefixes, max_body_bytes }
    }
}

impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL via HTTP GET with strict allowlisted URL prefixes. \
         Supports paging via start/size."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "url": {
                    "type": "string",
                    "description": "REQUIRED. URL to fetch (GET only)."
                },
                "start": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Byte offset for paging."
                },
                "size": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 4096,
                    "description": "Max bytes to return (<=4096)."
                },
                "idempotency": {
                    "type": "string",
                    "description": "Optional idempotency key for caching."
                }
            },
            "required": ["url"]
        })
    }

    fn run(&self, call: &ToolCall) -> ToolResult {
        let url = match call.args.get("url").and_then(Value::as_str) {
            Some(u) if !u.is_empty() => u,
            _ => return ToolResult::error(2, "invalid_request"),
        };
        let start = call.args.get("start").and_then(Value::as_u64).unwrap_or(0);
        let size = call.args.get("size").and_then(Value::as_u64).unwrap_or(0);
        let idempotency = call.args.get("idempotency").and_then(Value::as_str).unwrap_or("");

        if self.allowed_prefixes.is_empty() {
            return ToolResult::error(
                3,
                "web_fetch disabled. Set AICLI_WEB_FETCH_PREFIXES to allow URL prefixes. \
                 Hint for tool-using models: call cli_help(topic=\"web fetch\") to show the \
                 exact CLI/env help text.",
            );
        }
        if !self.allowed_prefixes.iter().any(|p| url.starts_with(p.as_str())) {
            return ToolResult::error(3, url_not_allowed_message(url, &self.allowed_prefixes));
        }

        let key = format!(
            "web_fetch|{idempotency}|{url}|{}:{}",
            start,
            if size == 0 { 4096 } else { size.min(4096) }
        );
        if let Some(entry) = self.cache.get(&key) {
            debug!(key = %key, "web_fetch cache hit");
            let mut out = ToolResult { cache_hit: true, ..Default::default() };
            apply_paging(&entry.data, start, size, &mut out);
            return out;
        }

        debug!(url = %url, "web_fetch tool");
        let body = match fetch_bounded(url, self.max_body_bytes) {
            Ok(b) => b,
            Err(e) => return e,
        };

        let mut out = ToolResult::default();
        apply_paging(&body, start, size, &mut out);
        self.cache.put(&key, &body, out.truncated, out.next_start);
        out
    }
}

fn fetch_bounded(url: &str, max_body_bytes: usize) -> Result<Vec<u8>, ToolResult> {
    use std::io::Read;

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("aicli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ToolResult::error(2, format!("http_client_init_failed: {e}")))?;

    let resp = client
        .get(url)
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/json,text/plain,*/*",
        )
        .send()
        .map_err(|e| ToolResult::error(2, e.to_string()))?;

    // Read incrementally so an oversized body aborts without buffering it.
    let mut body = Vec::with_capacity(8192);
    let mut reader = resp.take((max_body_bytes + 1) as u64);
    reader
        .read_to_end(&mut body)
        .map_err(|e| ToolResult::error(2, e.to_string()))?;
    if body.len() > max_body_bytes {
        return Err(ToolResult::error(4, "body_too_large"));
    }
    Ok(body)
}

/// The refusal message for a URL outside the prefix allowlist. Always
/// suggests a plausible prefix derived from the URL; lists the configured
/// prefixes (first 8) only when `AICLI_DEBUG_WEB_FETCH_ALLOWLIST` opts in.
fn url_not_allowed_message(url: &str, prefixes: &[String]) -> String {
    let hint = match suggest_prefix(url) {
        Some(p) => format!(
            "Try: export AICLI_WEB_FETCH_PREFIXES='{p},https://example.com/,https://docs.example.com/'"
        ),
        None => {
            "Try: export AICLI_WEB_FETCH_PREFIXES='https://example.com/,https://docs.example.com/'"
                .to_string()
        }
    };

    let debug_listing = std::env::var("AICLI_DEBUG_WEB_FETCH_ALLOWLIST")
        .map(|v| !v.is_empty() && v != "0")
        .unwrap_or(false);
    if debug_listing {
        let shown: Vec<String> = prefixes.iter().take(8).map(|p| format!("\"{p}\"")).collect();
        let ellipsis = if prefixes.len() > 8 { ", ..." } else { "" };
        return format!(
            "url_not_allowed: URL does not match AICLI_WEB_FETCH_PREFIXES; \
             allowed_prefixes=[{}{ellipsis}]",
            shown.join(", ")
        );
    }

    format!(
        "url_not_allowed: URL does not match AICLI_WEB_FETCH_PREFIXES. {hint}. \
         Hint for tool-using models: call cli_help(topic=\"web fetch\") to show the \
         exact CLI/env help text."
    )
}

/// Derive `scheme://host/` from a URL for the suggestion. Refuses URLs with
/// userinfo so credentials never end up in a suggested prefix; drops ports.
fn suggest_prefix(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.is_empty() || scheme.len() > 16 {
        return None;
    }
    let authority_end = rest
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    if authority.contains('@') {
        return None;
    }
    let host = authority.split(':').next().unwrap_or("");
    if host.is_empty() || host.len() > 255 {
        return None;
    }
    Some(format!("{scheme}://{host}/"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
