// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Responses-API payload building and response extraction.

use serde_json::{json, Value};

/// One `function_call` item scanned out of a response's `output[]`, with the
/// `arguments` payload already normalised to an owned JSON object.
#[derive(Debug, Clone)]
pub struct FunctionCallItem {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// The first request of a run: `input` is a single user-text message.
pub fn build_initial_request(
    model: &str,
    input_text: &str,
    system_text: Option<&str>,
    previous_response_id: Option<&str>,
    tools: Option<&Value>,
    tool_choice: Option<&str>,
) -> Value {
    let mut input = Vec::new();
    if let Some(system) = system_text {
        input.push(json!({
            "role": "system",
            "content": [{"type": "input_text", "text": system}],
        }));
    }
    input.push(json!({
        "role": "user",
        "content": [{"type": "input_text", "text": input_text}],
    }));

    let mut root = json!({
        "model": model,
        "input": input,
    });
    if let Some(id) = previous_response_id {
        root["previous_response_id"] = json!(id);
    }
    if let Some(tools) = tools {
        root["tools"] = tools.clone();
    }
    if let Some(choice) = tool_choice {
        root["tool_choice"] = json!(choice);
    }
    root
}

/// A follow-up request: tool outputs appended directly to the running input
/// list, linked by `previous_response_id`.
pub fn build_followup_request(
    model: &str,
    previous_response_id: &str,
    output_items: Vec<Value>,
    tools: Option<&Value>,
) -> Value {
    let mut root = json!({
        "model": model,
        "previous_response_id": previous_response_id,
        "input": output_items,
    });
    if let Some(tools) = tools {
        root["tools"] = tools.clone();
    }
    root
}

/// The server-assigned id on the response root.
pub fn extract_response_id(root: &Value) -> Option<&str> {
    root.get("id").and_then(Value::as_str)
}

fn output_array(root: &Value) -> Option<&Vec<Value>> {
    root.get("output").and_then(Value::as_array)
}

/// The model's final text, if this response carries one.
///
/// Current shape: `output[]` holds `{type:"message", content:[{type:
/// "output_text", text}]}`. The flat legacy shape (`output[]` item itself is
/// an `output_text`) is still accepted.
pub fn extract_output_text(root: &Value) -> Option<String> {
    let output = output_array(root)?;
    for item in output {
        if let Some(content) = item.get("content").and_then(Value::as_array) {
            for c in content {
                if c.get("type").and_then(Value::as_str) == Some("output_text") {
                    if let Some(text) = c.get("text").and_then(Value::as_str) {
                        return Some(text.to_string());
                    }
                }
            }
        }
        if item.get("type").and_then(Value::as_str) == Some("output_text") {
            if let Some(text) = item.get("text").and_then(Value::as_str) {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// Normalise a `function_call` item's `arguments` payload.
///
/// The API sends either a JSON object or a JSON-encoded string; both decode
/// to an owned object here. Anything else is `None` — the call is invalid.
pub fn parse_arguments(args: &Value) -> Option<Value> {
    match args {
        Value::Object(_) => Some(args.clone()),
        Value::String(s) if !s.is_empty() => {
            let parsed: Value = serde_json::from_str(s).ok()?;
            parsed.is_object().then_some(parsed)
        }
        _ => None,
    }
}

/// Scan `output[]` for `function_call` items. Items with a missing call id
/// or name are skipped; `arguments` is carried through `parse_arguments`
/// (items whose arguments fail to decode are returned with a `Null`
/// arguments value so the caller can report the call id).
pub fn extract_function_calls(root: &Value) -> Vec<FunctionCallItem> {
    let mut calls = Vec::new();
    let Some(output) = output_array(root) else {
        return calls;
    };
    for item in output {
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            continue;
        }
        let Some(call_id) = item.get("call_id").and_then(Value::as_str) else {
            continue;
        };
        if call_id.is_empty() {
            continue;
        }
        let Some(name) = item.get("name").and_then(Value::as_str) else {
            continue;
        };
        let arguments = item
            .get("arguments")
            .and_then(parse_arguments)
            .unwrap_or(Value::Null);
        calls.push(FunctionCallItem {
            call_id: call_id.to_string(),
            name: name.to_string(),
            arguments,
        });
    }
    calls
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
