// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Auto-search planning: one tool-free model call that decides whether the
//! prompt warrants a web search, and with what query.

use serde_json::Value;
use tracing::debug;

use aicli_config::Config;
use aicli_model::{build_initial_request, extract_output_text, Transport};

const PLANNER_SYSTEM: &str = "You are a query planner. Decide if web search is truly required. \
     Reply with ONLY valid JSON (no markdown), with fields: \
     {\"need_search\":true|false,\"query\":string}. \
     If need_search=false, query must be \"\". \
     Keep query <= 12 words, focused, and safe.";

/// Ask the model whether `user_prompt` needs a web search.
///
/// Returns the planned query on a valid positive reply. Every failure mode
/// (transport, non-200, unparseable reply, negative decision) is `None`:
/// planning is advisory and the caller proceeds without augmentation.
pub fn plan_search(config: &Config, transport: &dyn Transport, user_prompt: &str) -> Option<String> {
    if user_prompt.is_empty() {
        return None;
    }

    let payload = build_initial_request(
        &config.llm.model,
        user_prompt,
        Some(PLANNER_SYSTEM),
        None,
        None,
        Some("none"),
    );

    let resp = match transport.post(&payload) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "auto-search planner transport failed");
            return None;
        }
    };
    if resp.status != 200 || resp.body.is_empty() {
        debug!(status = resp.status, "auto-search planner non-200");
        return None;
    }

    let root: Value = serde_json::from_str(&resp.body).ok()?;
    let text = extract_output_text(&root)?;
    parse_planner_reply(&text)
}

/// Strict-JSON reply: `{"need_search": bool, "query": string}`. Anything
/// else — including `need_search: false` or a blank query — is `None`.
fn parse_planner_reply(text: &str) -> Option<String> {
    let reply: Value = serde_json::from_str(text.trim()).ok()?;
    if !reply.get("need_search").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let query = reply.get("query").and_then(Value::as_str)?.trim();
    (!query.is_empty()).then(|| query.to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
