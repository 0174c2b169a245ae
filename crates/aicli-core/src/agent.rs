// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The multi-turn tool loop.
//!
//! One invocation: POST the prompt, then per turn either extract the final
//! text or fan the response's `function_call` items out to the worker pool,
//! feed the results back linked by `previous_response_id`, and go again.
//! Tool failures are data the model reads; only transport failures, response
//! parse failures, and a turn with zero recognised calls abort the loop.

use std::sync::{mpsc, Arc};

use anyhow::{bail, Context};
use serde_json::Value;
use tracing::{debug, trace};

use aicli_config::{debug_max_bytes, Config};
use aicli_model::{
    build_followup_request, build_initial_request, build_tools_json, extract_function_calls,
    extract_output_text, extract_response_id, FunctionCallItem, Transport,
};
use aicli_tools::tool::raw_function_call_output;
use aicli_tools::{ToolCall, ToolRegistry, ToolResult};

use crate::pool::ThreadPool;

const MAX_TURNS_CAP: usize = 32;
const MAX_TOOL_CALLS_CAP: usize = 64;
const MAX_THREADS_CAP: usize = 64;

pub struct ToolLoopRequest<'a> {
    pub prompt: &'a str,
    pub previous_response_id: Option<&'a str>,
    pub tool_choice: Option<&'a str>,
    /// 0 means the configured default.
    pub max_turns: usize,
    pub max_tool_calls_per_turn: usize,
    pub tool_threads: usize,
}

/// What the loop produced. `final_text` is `None` when the turn budget ran
/// out; `last_response_json` always carries the most recent response body so
/// the caller can extract its id for continuation.
#[derive(Debug)]
pub struct ToolLoopOutcome {
    pub final_text: Option<String>,
    pub last_response_json: Option<String>,
}

pub fn run_with_tools(
    config: &Config,
    transport: &dyn Transport,
    registry: &Arc<ToolRegistry>,
    request: &ToolLoopRequest<'_>,
) -> anyhow::Result<ToolLoopOutcome> {
    if request.prompt.is_empty() {
        bail!("empty prompt");
    }
    let max_turns = effective(request.max_turns, config.limits.max_turns, MAX_TURNS_CAP);
    let max_calls = effective(
        request.max_tool_calls_per_turn,
        config.limits.max_tool_calls_per_turn,
        MAX_TOOL_CALLS_CAP,
    );
    let threads = effective(request.tool_threads, config.limits.tool_threads, MAX_THREADS_CAP);

    let tools_json = build_tools_json(&registry.schemas());
    log_payload(config.debug.api, "tools_json", &tools_json.to_string());

    let payload = build_initial_request(
        &config.llm.model,
        request.prompt,
        None,
        request.previous_response_id,
        Some(&tools_json),
        request.tool_choice,
    );
    debug!(model = %config.llm.model, tool_choice = ?request.tool_choice, "initial request");
    let mut body = post_checked(config, transport, &payload)?;

    let mut last_response_json: Option<String> = None;

    for turn in 0..max_turns {
        let root: Value = serde_json::from_str(&body)
            .with_context(|| format!("unparseable response body on turn {turn}"))?;

        if let Some(text) = extract_output_text(&root) {
            debug!(turn, "final text received");
            return Ok(ToolLoopOutcome {
                final_text: Some(text),
                last_response_json: Some(body),
            });
        }

        let response_id = extract_response_id(&root)
            .with_context(|| format!("response on turn {turn} has no id and no output text"))?
            .to_string();
        last_response_json = Some(body.clone());

        let all_calls = extract_function_calls(&root);
        let (calls, first_invalid) = recognise_calls(registry, all_calls, max_calls);
        if calls.is_empty() {
            match first_invalid {
                Some(call_id) => bail!(
                    "tool call invalid: arguments missing or malformed (call_id={call_id})"
                ),
                None => bail!("response on turn {turn} has neither output text nor tool calls"),
            }
        }
        debug!(turn, calls = calls.len(), "dispatching tool calls");

        let results = run_calls(registry, &calls, threads);

        let mut items = Vec::with_capacity(calls.len());
        for (call, result) in calls.iter().zip(results.iter()) {
            log_tool_result(config.debug.function_call, call, result);
            items.push(output_item(registry, call, result));
        }

        let payload =
            build_followup_request(&config.llm.model, &response_id, items, Some(&tools_json));
        log_payload(config.debug.api, "follow-up payload", &payload.to_string());
        body = post_checked(config, transport, &payload)?;
    }

    debug!(max_turns, "turn budget exhausted");
    Ok(ToolLoopOutcome { final_text: None, last_response_json })
}

fn effective(requested: usize, configured: usize, cap: usize) -> usize {
    let n = if requested != 0 { requested } else { configured };
    n.clamp(1, cap)
}

fn post_checked(
    config: &Config,
    transport: &dyn Transport,
    payload: &Value,
) -> anyhow::Result<String> {
    let resp = transport.post(payload)?;
    if resp.status != 200 {
        let shown = truncate_for_display(&resp.body, 2048);
        bail!("openai http_status={}: {shown}", resp.status);
    }
    if resp.body.is_empty() {
        bail!("openai returned an empty 200 body");
    }
    log_payload(config.debug.api, "response body", &resp.body);
    Ok(resp.body)
}

/// Keep calls the registry knows whose arguments satisfy the tool's declared
/// `required` keys, in scan order, capped at `max_calls`. The first call id
/// that failed validation is reported when nothing survives.
fn recognise_calls(
    registry: &ToolRegistry,
    all: Vec<FunctionCallItem>,
    max_calls: usize,
) -> (Vec<ToolCall>, Option<String>) {
    let mut calls = Vec::new();
    let mut first_invalid: Option<String> = None;
    for item in all {
        if calls.len() >= max_calls {
            debug!(call_id = %item.call_id, "per-turn call budget reached, dropping");
            continue;
        }
        let valid = registry
            .get(&item.name)
            .map(|tool| arguments_satisfy_schema(&item.arguments, &tool.parameters_schema()))
            .unwrap_or(false);
        if !valid {
            debug!(call_id = %item.call_id, name = %item.name, "dropping invalid tool call");
            first_invalid.get_or_insert(item.call_id);
            continue;
        }
        calls.push(ToolCall {
            call_id: item.call_id,
            name: item.name,
            args: item.arguments,
        });
    }
    (calls, first_invalid)
}

fn arguments_satisfy_schema(args: &Value, schema: &Value) -> bool {
    if !args.is_object() {
        // Tools whose schema requires nothing accept an absent payload.
        return schema_required(schema).is_empty() && args.is_null();
    }
    schema_required(schema)
        .iter()
        .all(|key| args.get(key).map(|v| !v.is_null()).unwrap_or(false))
}

fn schema_required(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Fan the calls out to a fresh pool, drain it, and collect results in
/// submission order. Workers own their `ToolCall` copies; nothing borrows
/// the response document.
fn run_calls(registry: &Arc<ToolRegistry>, calls: &[ToolCall], threads: usize) -> Vec<ToolResult> {
    let pool = ThreadPool::new(threads);
    let (tx, rx) = mpsc::channel::<(usize, ToolResult)>();
    for (i, call) in calls.iter().enumerate() {
        let registry = Arc::clone(registry);
        let call = call.clone();
        let job_tx = tx.clone();
        let submitted = pool.submit(move || {
            let result = registry.run(&call);
            let _ = job_tx.send((i, result));
        });
        if submitted.is_err() {
            let _ = tx.send((i, ToolResult::error(1, "tool pool stopped")));
        }
    }
    drop(tx);
    pool.drain();

    let mut results: Vec<ToolResult> = calls
        .iter()
        .map(|c| ToolResult::error(1, format!("tool did not report a result ({})", c.call_id)))
        .collect();
    for (i, result) in rx {
        results[i] = result;
    }
    results
}

fn output_item(registry: &ToolRegistry, call: &ToolCall, result: &ToolResult) -> Value {
    let raw = registry
        .get(&call.name)
        .map(|t| t.raw_json_output())
        .unwrap_or(false);
    if raw && result.ok() {
        if let Ok(doc) = std::str::from_utf8(&result.stdout) {
            return raw_function_call_output(&call.call_id, doc);
        }
    }
    result.to_function_call_output(&call.call_id)
}

fn truncate_for_display(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{} ... (truncated, {} bytes total)", &s[..end], s.len())
}

fn log_payload(level: u8, label: &str, payload: &str) {
    let max = debug_max_bytes(level);
    if max == 0 {
        return;
    }
    trace!("{label}: {}", truncate_for_display(payload, max));
}

fn log_tool_result(level: u8, call: &ToolCall, result: &ToolResult) {
    if level == 0 {
        return;
    }
    debug!(
        call_id = %call.call_id,
        tool = %call.name,
        exit_code = result.exit_code,
        truncated = result.truncated,
        total_bytes = result.total_bytes,
        "tool result"
    );
    if level >= 2 && !result.stderr.is_empty() {
        debug!(call_id = %call.call_id, stderr = %truncate_for_display(&result.stderr, debug_max_bytes(level)), "tool stderr");
    }
    if level >= 3 && !result.stdout.is_empty() {
        let text = String::from_utf8_lossy(&result.stdout);
        trace!(call_id = %call.call_id, stdout = %truncate_for_display(&text, debug_max_bytes(level)), "tool stdout");
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use aicli_model::HttpResponse;
    use aicli_tools::Tool;
    use serde_json::json;
    use std::sync::Mutex;

    /// Scripted transport: returns canned bodies in order and records every
    /// payload it was sent.
    struct ScriptedTransport {
        responses: Mutex<Vec<HttpResponse>>,
        sent: Mutex<Vec<Value>>,
    }

    impl ScriptedTransport {
        fn new(bodies: Vec<Value>) -> Self {
            let responses = bodies
                .into_iter()
                .map(|b| HttpResponse { status: 200, body: b.to_string() })
                .rev()
                .collect();
            Self { responses: Mutex::new(responses), sent: Mutex::new(Vec::new()) }
        }

        fn sent(&self) -> Vec<Value> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn post(&self, payload: &Value) -> anyhow::Result<HttpResponse> {
            self.sent.lock().unwrap().push(payload.clone());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("transport script exhausted"))
        }
    }

    struct UpperTool;

    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "uppercases 'text'"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {"text": {"type": "string"}},
                "required": ["text"],
            })
        }
        fn run(&self, call: &ToolCall) -> ToolResult {
            let text = call.args["text"].as_str().unwrap_or("");
            ToolResult {
                stdout: text.to_uppercase().into_bytes(),
                total_bytes: text.len() as u64,
                ..Default::default()
            }
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        reg.register(UpperTool);
        Arc::new(reg)
    }

    fn text_response(id: &str, text: &str) -> Value {
        json!({
            "id": id,
            "output": [{"type": "message", "content": [
                {"type": "output_text", "text": text}
            ]}]
        })
    }

    fn call_response(id: &str, calls: &[(&str, Value)]) -> Value {
        let output: Vec<Value> = calls
            .iter()
            .map(|(cid, args)| {
                json!({"type": "function_call", "call_id": cid, "name": "upper",
                       "arguments": args})
            })
            .collect();
        json!({"id": id, "output": output})
    }

    fn loop_request(prompt: &str) -> ToolLoopRequest<'_> {
        ToolLoopRequest {
            prompt,
            previous_response_id: None,
            tool_choice: None,
            max_turns: 0,
            max_tool_calls_per_turn: 0,
            tool_threads: 2,
        }
    }

    #[test]
    fn immediate_text_answer_short_circuits() {
        let transport = ScriptedTransport::new(vec![text_response("r1", "done")]);
        let out = run_with_tools(&Config::default(), &transport, &registry(), &loop_request("hi"))
            .unwrap();
        assert_eq!(out.final_text.as_deref(), Some("done"));
        assert_eq!(transport.sent().len(), 1);
        // initial request carries model, input, tools
        let first = &transport.sent()[0];
        assert_eq!(first["model"], json!("gpt-5-mini"));
        assert!(first["tools"].is_array());
    }

    #[test]
    fn two_turn_loop_links_ids_and_call_ids() {
        let transport = ScriptedTransport::new(vec![
            call_response(
                "resp_1",
                &[("c1", json!({"text": "a"})), ("c2", json!("{\"text\": \"b\"}"))],
            ),
            text_response("resp_2", "final answer"),
        ]);
        let out = run_with_tools(&Config::default(), &transport, &registry(), &loop_request("go"))
            .unwrap();
        assert_eq!(out.final_text.as_deref(), Some("final answer"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        let followup = &sent[1];
        assert_eq!(followup["previous_response_id"], json!("resp_1"));
        let input = followup["input"].as_array().unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input[0]["type"], json!("function_call_output"));
        assert_eq!(input[0]["call_id"], json!("c1"));
        assert_eq!(input[1]["call_id"], json!("c2"));
        // tool outputs decoded: inner JSON string with the uppercased text
        let inner: Value =
            serde_json::from_str(input[0]["output"].as_str().unwrap()).unwrap();
        assert_eq!(inner["stdout_text"], json!("A"));
        assert_eq!(inner["ok"], json!(true));
        // the same tools document rides along on the follow-up
        assert!(followup["tools"].is_array());
    }

    #[test]
    fn string_and_object_arguments_both_dispatch() {
        let transport = ScriptedTransport::new(vec![
            call_response(
                "r1",
                &[("c1", json!({"text": "x"})), ("c2", json!("{\"text\": \"y\"}"))],
            ),
            text_response("r2", "ok"),
        ]);
        let out = run_with_tools(&Config::default(), &transport, &registry(), &loop_request("p"))
            .unwrap();
        assert_eq!(out.final_text.as_deref(), Some("ok"));
        let sent = transport.sent();
        let input = sent[1]["input"].as_array().unwrap();
        let inner2: Value =
            serde_json::from_str(input[1]["output"].as_str().unwrap()).unwrap();
        assert_eq!(inner2["stdout_text"], json!("Y"));
    }

    #[test]
    fn calls_beyond_per_turn_budget_are_dropped_in_scan_order() {
        let calls: Vec<(String, Value)> = (0..12)
            .map(|i| (format!("c{i}"), json!({"text": format!("t{i}")})))
            .collect();
        let call_refs: Vec<(&str, Value)> =
            calls.iter().map(|(c, a)| (c.as_str(), a.clone())).collect();
        let transport = ScriptedTransport::new(vec![
            call_response("r1", &call_refs),
            text_response("r2", "done"),
        ]);
        // default max_tool_calls_per_turn is 8
        run_with_tools(&Config::default(), &transport, &registry(), &loop_request("p")).unwrap();
        let sent = transport.sent();
        let input = sent[1]["input"].as_array().unwrap();
        assert_eq!(input.len(), 8);
        for (i, item) in input.iter().enumerate() {
            assert_eq!(item["call_id"], json!(format!("c{i}")));
        }
    }

    #[test]
    fn zero_recognised_calls_aborts_with_first_invalid_id() {
        let transport = ScriptedTransport::new(vec![json!({
            "id": "r1",
            "output": [
                {"type": "function_call", "call_id": "bad_1", "name": "upper",
                 "arguments": "{\"wrong\": 1}"},
                {"type": "function_call", "call_id": "bad_2", "name": "no_such_tool",
                 "arguments": "{}"},
            ]
        })]);
        let err = run_with_tools(&Config::default(), &transport, &registry(), &loop_request("p"))
            .unwrap_err();
        assert!(err.to_string().contains("bad_1"), "got: {err}");
    }

    #[test]
    fn unrecognised_calls_are_dropped_but_valid_ones_run() {
        let transport = ScriptedTransport::new(vec![
            json!({
                "id": "r1",
                "output": [
                    {"type": "function_call", "call_id": "cx", "name": "no_such_tool",
                     "arguments": "{}"},
                    {"type": "function_call", "call_id": "c_ok", "name": "upper",
                     "arguments": {"text": "z"}},
                ]
            }),
            text_response("r2", "fin"),
        ]);
        run_with_tools(&Config::default(), &transport, &registry(), &loop_request("p")).unwrap();
        let sent = transport.sent();
        let input = sent[1]["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["call_id"], json!("c_ok"));
    }

    #[test]
    fn turn_budget_exhaustion_returns_last_body_without_text() {
        let transport = ScriptedTransport::new(vec![
            call_response("r1", &[("c1", json!({"text": "a"}))]),
            call_response("r2", &[("c2", json!({"text": "b"}))]),
            call_response("r3", &[("c3", json!({"text": "c"}))]),
            call_response("r4", &[("c4", json!({"text": "d"}))]),
            call_response("r5", &[("c5", json!({"text": "e"}))]),
        ]);
        let out = run_with_tools(&Config::default(), &transport, &registry(), &loop_request("p"))
            .unwrap();
        assert!(out.final_text.is_none());
        // default max_turns = 4 → r4 is the last body parsed in a turn
        let last = out.last_response_json.unwrap();
        let root: Value = serde_json::from_str(&last).unwrap();
        assert_eq!(root["id"], json!("r4"));
    }

    #[test]
    fn non_200_aborts_with_truncated_body() {
        struct ErrTransport;
        impl Transport for ErrTransport {
            fn post(&self, _payload: &Value) -> anyhow::Result<HttpResponse> {
                Ok(HttpResponse { status: 400, body: "bad request".into() })
            }
        }
        let err = run_with_tools(&Config::default(), &ErrTransport, &registry(), &loop_request("p"))
            .unwrap_err();
        assert!(err.to_string().contains("http_status=400"));
        assert!(err.to_string().contains("bad request"));
    }

    #[test]
    fn unparseable_body_aborts() {
        struct GarbageTransport;
        impl Transport for GarbageTransport {
            fn post(&self, _payload: &Value) -> anyhow::Result<HttpResponse> {
                Ok(HttpResponse { status: 200, body: "not json".into() })
            }
        }
        assert!(run_with_tools(
            &Config::default(),
            &GarbageTransport,
            &registry(),
            &loop_request("p")
        )
        .is_err());
    }

    #[test]
    fn response_without_id_or_text_aborts() {
        let transport = ScriptedTransport::new(vec![json!({"output": []})]);
        let err = run_with_tools(&Config::default(), &transport, &registry(), &loop_request("p"))
            .unwrap_err();
        assert!(err.to_string().contains("no id"));
    }

    #[test]
    fn previous_response_id_rides_on_initial_request() {
        let transport = ScriptedTransport::new(vec![text_response("r", "t")]);
        let req = ToolLoopRequest {
            previous_response_id: Some("resp_prev"),
            ..loop_request("p")
        };
        run_with_tools(&Config::default(), &transport, &registry(), &req).unwrap();
        assert_eq!(transport.sent()[0]["previous_response_id"], json!("resp_prev"));
    }

    #[test]
    fn tool_choice_rides_on_initial_request() {
        let transport = ScriptedTransport::new(vec![text_response("r", "t")]);
        let req = ToolLoopRequest { tool_choice: Some("required"), ..loop_request("p") };
        run_with_tools(&Config::default(), &transport, &registry(), &req).unwrap();
        assert_eq!(transport.sent()[0]["tool_choice"], json!("required"));
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let transport = ScriptedTransport::new(vec![]);
        assert!(run_with_tools(&Config::default(), &transport, &registry(), &loop_request(""))
            .is_err());
    }

    #[test]
    fn limit_clamping() {
        let config = Config::default();
        assert_eq!(effective(0, config.limits.max_turns, MAX_TURNS_CAP), 4);
        assert_eq!(effective(99, 4, MAX_TURNS_CAP), 32);
        assert_eq!(effective(2, 4, MAX_TURNS_CAP), 2);
        assert_eq!(effective(0, 0, MAX_TURNS_CAP), 1);
        assert_eq!(effective(200, 8, MAX_TOOL_CALLS_CAP), 64);
        assert_eq!(effective(100, 1, MAX_THREADS_CAP), 64);
    }

    #[test]
    fn many_parallel_calls_keep_positional_correspondence() {
        // 8 calls on 4 threads: completion order scrambles, output order
        // must not.
        let calls: Vec<(String, Value)> = (0..8)
            .map(|i| (format!("call_{i}"), json!({"text": format!("v{i}")})))
            .collect();
        let call_refs: Vec<(&str, Value)> =
            calls.iter().map(|(c, a)| (c.as_str(), a.clone())).collect();
        let transport = ScriptedTransport::new(vec![
            call_response("r1", &call_refs),
            text_response("r2", "done"),
        ]);
        let req = ToolLoopRequest { tool_threads: 4, ..loop_request("p") };
        run_with_tools(&Config::default(), &transport, &registry(), &req).unwrap();
        let sent = transport.sent();
        let input = sent[1]["input"].as_array().unwrap();
        for (i, item) in input.iter().enumerate() {
            assert_eq!(item["call_id"], json!(format!("call_{i}")));
            let inner: Value =
                serde_json::from_str(item["output"].as_str().unwrap()).unwrap();
            assert_eq!(inner["stdout_text"], json!(format!("V{i}")));
        }
    }
}
