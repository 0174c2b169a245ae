// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::{json, Value};

use aicli_tools::ToolSchema;

/// The tool-definition document sent with every request: one array item per
/// registered tool. `strict` stays false — strict mode constrains schemas
/// beyond what the paging parameters can satisfy.
pub fn build_tools_json(schemas: &[ToolSchema]) -> Value {
    let tools: Vec<Value> = schemas
        .iter()
        .map(|s| {
            json!({
                "type": "function",
                "name": s.name,
                "strict": false,
                "description": s.description,
                "parameters": s.parameters,
            })
        })
        .collect();
    Value::Array(tools)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
