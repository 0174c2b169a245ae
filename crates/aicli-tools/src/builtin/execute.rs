// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The `execute` tool: parse → normalise → allowlist gate → bounded read →
//! stage loop → paging.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use aicli_dsl::{apply_stage, normalize_file_input_pipeline, parse_pipeline};

use crate::allowlist::Allowlist;
use crate::paging::apply_paging;
use crate::tool::{Tool, ToolCall, ToolResult};

/// Largest file the executor will read.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

pub struct ExecuteTool {
    allowlist: Arc<Allowlist>,
}

impl ExecuteTool {
    pub fn new(allowlist: Arc<Allowlist>) -> Self {
        Self { allowlist }
    }
}

impl Tool for ExecuteTool {
    fn name(&self) -> &str {
        "execute"
    }

    fn description(&self) -> &str {
        "Read-only restricted file access via a safe DSL. \
         Use ONLY for reading allowlisted local files. \
         MUST provide 'command'. Examples: \n\
         'cat README.md', 'cat README.md | head -n 80', 'sed -n 1,120p README.md'. \
         Do NOT use a shell; do NOT use redirections/globs; \
         keep it simple and safe."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "command": {
                    "type": "string",
                    "description": "REQUIRED. Restricted pipeline DSL command, e.g. 'cat README.md' or 'head -n 80 README.md'."
                },
                "file": {
                    "type": "string",
                    "description": "Optional primary file hint."
                },
                "id": {
                    "type": "string",
                    "description": "Optional opaque request id."
                },
                "idempotency": {
                    "type": "string",
                    "description": "Optional idempotency key."
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
                }
            },
            "required": ["command"]
        })
    }

    fn run(&self, call: &ToolCall) -> ToolResult {
        let command = match call.args.get("command").and_then(Value::as_str) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::error(2, "invalid_request"),
        };
        let start = call.args.get("start").and_then(Value::as_u64).unwrap_or(0);
        let size = call.args.get("size").and_then(Value::as_u64).unwrap_or(0);

        debug!(command = %command, start, size, "execute tool");
        run_pipeline(&self.allowlist, command, start, size)
    }
}

/// Run one DSL command against the allowlist and return a paged result.
/// Every failure mode is a result value with a short keyword in stderr.
pub fn run_pipeline(allowlist: &Allowlist, command: &str, start: u64, size: u64) -> ToolResult {
    let pipeline = match parse_pipeline(command) {
        Ok(p) => p,
        Err(e) => return ToolResult::error(2, e.to_string()),
    };
    let pipeline = match normalize_file_input_pipeline(&pipeline) {
        Ok(p) => p,
        Err(e) => return ToolResult::error(2, e.to_string()),
    };

    // Stage 0 is `cat FILE` after normalisation. Resolve and gate.
    let file_arg = &pipeline.stages[0].argv[1];
    let canonical = match std::fs::canonicalize(file_arg) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => return ToolResult::error(2, "invalid_path"),
    };
    if !allowlist.contains(&canonical) {
        debug!(path = %canonical, "allowlist rejected");
        return ToolResult::error(3, "file_not_allowed");
    }

    let data = match read_bounded(&canonical) {
        Ok(d) => d,
        Err(e) => return e,
    };

    // Two scratch buffers rotate so a stage never reads the buffer it is
    // writing into.
    let mut current = data;
    let mut scratch: Vec<u8> = Vec::new();
    for stage in &pipeline.stages[1..] {
        scratch.clear();
        if apply_stage(stage, &current, &mut scratch).is_err() {
            return ToolResult::error(2, "mvp_unsupported_stage");
        }
        std::mem::swap(&mut current, &mut scratch);
    }

    let mut out = ToolResult::default();
    apply_paging(&current, start, size, &mut out);
    out
}

fn read_bounded(path: &str) -> Result<Vec<u8>, ToolResult> {
    let md = std::fs::metadata(path).map_err(|e| ToolResult::error(1, e.to_string()))?;
    if md.len() > MAX_FILE_BYTES {
        return Err(ToolResult::error(4, "file_too_large"));
    }
    std::fs::read(path).map_err(|e| ToolResult::error(1, e.to_string()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
