// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::{json, Value};

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque `call_id` returned by the model (echoed verbatim in the output)
    pub call_id: String,
    pub name: String,
    /// Parsed JSON arguments. The Responses API sends these either as an
    /// object or as a JSON-encoded string; the loop normalises to an object
    /// before dispatch, so tools always see `Value::Object`.
    pub args: Value,
}

/// The result of executing a tool: one paged window of its output.
///
/// `stdout` is bytes, not text — `execute` reads arbitrary file contents and
/// `web_fetch` returns raw bodies. The JSON encoding escapes every non-ASCII
/// byte, so the wire shape stays valid regardless of what the bytes are.
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
    /// Size of the full (pre-paging) output.
    pub total_bytes: u64,
    pub truncated: bool,
    pub cache_hit: bool,
    /// Byte offset of the next window; present exactly when `truncated`.
    pub next_start: Option<u64>,
}

impl ToolResult {
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }

    /// Failure result carrying a short machine-readable keyword.
    pub fn error(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// The inner result object, rendered as a JSON string.
    ///
    /// Built by hand rather than through a serde struct because `stdout` is
    /// raw bytes: control and non-ASCII bytes become `\u00XX` escapes so the
    /// document is pure ASCII and never misdeclares UTF-8.
    pub fn to_inner_json(&self) -> String {
        let mut s = String::with_capacity(self.stdout.len() + 128);
        s.push_str("{\"ok\":");
        s.push_str(if self.ok() { "true" } else { "false" });
        s.push_str(&format!(",\"exit_code\":{}", self.exit_code));
        s.push_str(",\"stdout_text\":\"");
        escape_json_bytes(&self.stdout, &mut s);
        s.push_str("\",\"stderr_text\":\"");
        escape_json_bytes(self.stderr.as_bytes(), &mut s);
        s.push_str(&format!("\",\"total_bytes\":{}", self.total_bytes));
        s.push_str(&format!(",\"truncated\":{}", self.truncated));
        s.push_str(&format!(",\"cache_hit\":{}", self.cache_hit));
        match self.next_start {
            Some(n) => s.push_str(&format!(",\"next_start\":{n}")),
            None => s.push_str(",\"next_start\":null"),
        }
        s.push('}');
        s
    }

    /// The `function_call_output` item for the follow-up request. The inner
    /// JSON travels as a string in `output`; serde_json applies the outer
    /// layer of escaping when this item is serialized into the payload.
    pub fn to_function_call_output(&self, call_id: &str) -> Value {
        json!({
            "type": "function_call_output",
            "call_id": call_id,
            "output": self.to_inner_json(),
        })
    }
}

/// Wrap a pre-encoded JSON document (e.g. the `list_allowed_files` result)
/// as a `function_call_output` item.
pub fn raw_function_call_output(call_id: &str, raw_json: &str) -> Value {
    json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": raw_json,
    })
}

/// Append JSON string content (without surrounding quotes) for `bytes`.
/// Control bytes and everything ≥ 0x80 become `\u00XX`.
fn escape_json_bytes(bytes: &[u8], out: &mut String) {
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x08 => out.push_str("\\b"),
            0x0c => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7f => out.push(b as char),
            _ => out.push_str(&format!("\\u00{b:02x}")),
        }
    }
}

/// Trait every built-in tool implements. Tools are `Send + Sync`: one turn's
/// calls run in parallel on the worker pool, each through a shared
/// `Arc<dyn Tool>`.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;
    /// When true, `stdout` already holds a complete JSON document and is
    /// sent as the `output` string verbatim instead of being wrapped in the
    /// standard inner result object. `list_allowed_files` uses this.
    fn raw_json_output(&self) -> bool {
        false
    }
    /// Execute the tool. Failures are reported inside the result, never
    /// panicked or propagated: the model reads the error and adapts.
    fn run(&self, call: &ToolCall) -> ToolResult;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
