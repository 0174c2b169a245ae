// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use aicli_config::{SearchConfig, SearchProvider};

use crate::fmt::format_provider_body;
use crate::paging::{apply_paging, PagingCache};
use crate::search::{brave_web_search, google_cse_search};
use crate::tool::{Tool, ToolCall, ToolResult};

const DEFAULT_COUNT: u32 = 5;

pub struct WebSearchTool {
    config: SearchConfig,
    cache: Arc<PagingCache>,
}

impl WebSearchTool {
    pub fn new(config: SearchConfig, cache: Arc<PagingCache>) -> Self {
        Self { config, cache }
    }
}

impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Web search (read-only, network). Uses configured provider (google_cse or brave). \
         Supports paging via start/size (bytes of returned text/JSON)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "query": {
                    "type": "string",
                    "description": "REQUIRED. Search query string."
                },
                "provider": {
                    "type": "string",
                    "description": "Optional provider override: auto|google_cse|brave."
                },
                "count": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 20,
                    "description": "Optional max results (provider-capped)."
                },
                "lang": {
                    "type": "string",
                    "description": "Optional language hint (brave) or locale string."
                },
                "freshness": {
                    "type": "string",
                    "description": "Optional freshness: day|week|month (brave)."
                },
                "raw": {
                    "type": "boolean",
                    "description": "Optional: return raw JSON bytes when possible."
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
            "required": ["query"]
        })
    }

    fn run(&self, call: &ToolCall) -> ToolResult {
        let query = match call.args.get("query").and_then(Value::as_str) {
            Some(q) if !q.is_empty() => q,
            _ => return ToolResult::error(2, "invalid_request"),
        };
        let provider = resolve_provider(
            call.args.get("provider").and_then(Value::as_str),
            self.config.provider,
        );
        let count = call
            .args
            .get("count")
            .and_then(Value::as_u64)
            .map(|c| c as u32)
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_COUNT);
        let lang = call.args.get("lang").and_then(Value::as_str);
        let freshness = call.args.get("freshness").and_then(Value::as_str);
        let raw = call.args.get("raw").and_then(Value::as_bool).unwrap_or(false);
        let start = call.args.get("start").and_then(Value::as_u64).unwrap_or(0);
        let size = call.args.get("size").and_then(Value::as_u64).unwrap_or(0);
        let idempotency = call.args.get("idempotency").and_then(Value::as_str).unwrap_or("");

        let key = format!(
            "web_search|{idempotency}|{provider}|{query}|{}:{}",
            start,
            if size == 0 { 4096 } else { size.min(4096) }
        );
        if let Some(entry) = self.cache.get(&key) {
            debug!(key = %key, "web_search cache hit");
            let mut out = ToolResult { cache_hit: true, ..Default::default() };
            apply_paging(&entry.data, start, size, &mut out);
            return out;
        }

        debug!(query = %query, provider = %provider, count, "web_search tool");
        let body = match fetch_provider_body(&self.config, provider, query, count, lang, freshness)
        {
            Ok(b) => b,
            Err(e) => return e,
        };

        let full: Vec<u8> = if raw {
            body
        } else {
            match serde_json::from_slice::<Value>(&body) {
                Ok(v) => format_provider_body(&v).into_bytes(),
                Err(_) => body,
            }
        };

        let mut out = ToolResult::default();
        apply_paging(&full, start, size, &mut out);
        self.cache.put(&key, &full, out.truncated, out.next_start);
        out
    }
}

fn resolve_provider(requested: Option<&str>, configured: SearchProvider) -> SearchProvider {
    match requested {
        None | Some("") | Some("auto") => configured,
        Some(other) => other.parse().unwrap_or(configured),
    }
}

fn fetch_provider_body(
    config: &SearchConfig,
    provider: SearchProvider,
    query: &str,
    count: u32,
    lang: Option<&str>,
    freshness: Option<&str>,
) -> Result<Vec<u8>, ToolResult> {
    match provider {
        SearchProvider::GoogleCse => {
            let (api_key, cx) = match (config.google_api_key(), config.google_cse_cx()) {
                (Some(k), Some(cx)) => (k, cx),
                _ => {
                    return Err(ToolResult::error(
                        2,
                        "google_cse is not configured. Set GOOGLE_API_KEY and GOOGLE_CSE_CX, \
                         or use AICLI_SEARCH_PROVIDER=brave with BRAVE_API_KEY. \
                         Hint for tool-using models: call cli_help(topic=\"web search\") \
                         to show the exact CLI/env help text.",
                    ))
                }
            };
            let resp = google_cse_search(&api_key, &cx, query, count)
                .map_err(|e| ToolResult::error(2, e.to_string()))?;
            if resp.http_status != 200 {
                return Err(ToolResult::error(1, "google_http_error"));
            }
            Ok(resp.body)
        }
        SearchProvider::Brave => {
            let api_key = match config.brave_api_key() {
                Some(k) => k,
                None => {
                    return Err(ToolResult::error(
                        2,
                        "brave is not configured. Set BRAVE_API_KEY (and optionally \
                         AICLI_SEARCH_PROVIDER=brave). \
                         Hint for tool-using models: call cli_help(topic=\"web search\") \
                         to show the exact CLI/env help text.",
                    ))
                }
            };
            let resp = brave_web_search(&api_key, query, count, lang, freshness)
                .map_err(|e| ToolResult::error(2, e.to_string()))?;
            if resp.http_status != 200 {
                return Err(ToolResult::error(1, "brave_http_error"));
            }
            Ok(resp.body)
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
