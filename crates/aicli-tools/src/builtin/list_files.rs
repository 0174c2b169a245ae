// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use serde_json::{json, Value};

use crate::allowlist::Allowlist;
use crate::tool::{Tool, ToolCall, ToolResult};

const MAX_PAGE: u64 = 200;
const DEFAULT_PAGE: u64 = 50;

pub struct ListAllowedFilesTool {
    allowlist: Arc<Allowlist>,
}

impl ListAllowedFilesTool {
    pub fn new(allowlist: Arc<Allowlist>) -> Self {
        Self { allowlist }
    }
}

impl Tool for ListAllowedFilesTool {
    fn name(&self) -> &str {
        "list_allowed_files"
    }

    fn description(&self) -> &str {
        "Read-only: list allowlisted local files for the execute tool. \
         Returns paths/names/sizes only (no file contents). \
         Supports case-insensitive substring filtering (query) and paging (start/size)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Optional case-insensitive substring filter on full path."
                },
                "start": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "0-based start index for paging."
                },
                "size": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 200,
                    "description": "Max items to return (<=200). Default 50."
                }
            }
        })
    }

    fn raw_json_output(&self) -> bool {
        true
    }

    fn run(&self, call: &ToolCall) -> ToolResult {
        let query = call.args.get("query").and_then(Value::as_str).unwrap_or("");
        let start = call.args.get("start").and_then(Value::as_u64).unwrap_or(0);
        let size = call.args.get("size").and_then(Value::as_u64).unwrap_or(DEFAULT_PAGE);

        let json = list_allowed_files_json(&self.allowlist, query, start, size);
        ToolResult {
            stdout: json.to_string().into_bytes(),
            total_bytes: 0,
            ..Default::default()
        }
    }
}

/// Filter, page, and describe the allowlist. Index-based paging (not byte
/// paging): `start`/`size` count files.
pub fn list_allowed_files_json(allowlist: &Allowlist, query: &str, start: u64, size: u64) -> Value {
    let size = if size == 0 { DEFAULT_PAGE } else { size.min(MAX_PAGE) };
    let query_lower = query.to_lowercase();
    let matches = |path: &str| query_lower.is_empty() || path.to_lowercase().contains(&query_lower);

    let total = allowlist.files().iter().filter(|f| matches(&f.path)).count() as u64;

    let files: Vec<Value> = allowlist
        .files()
        .iter()
        .filter(|f| matches(&f.path))
        .skip(start as usize)
        .take(size as usize)
        .map(|f| json!({"path": f.path, "name": f.name, "size_bytes": f.size_bytes}))
        .collect();

    let returned = files.len() as u64;
    let has_next = start + returned < total;
    json!({
        "ok": true,
        "total": total,
        "start": start,
        "size": size,
        "returned": returned,
        "has_next": has_next,
        "next_start": if has_next { json!(start + returned) } else { Value::Null },
        "query": query,
        "files": files,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
