// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::{json, Value};

use crate::paging::apply_paging;
use crate::tool::{Tool, ToolCall, ToolResult};

const HELP_MAIN: &str = "\
aicli - CLI agent for the OpenAI Responses API

Usage:
  aicli chat <PROMPT>
  aicli run [--auto-search] [--file PATH ...] <PROMPT>
  aicli web search <QUERY> [--count N] [--lang XX] [--freshness day|week|month]
  aicli completions <SHELL>
  aicli show-config

Global options:
  --model NAME       Model to use (env: AICLI_MODEL, default gpt-5-mini)
  --config PATH      Config file (default ~/.config/aicli/config.yaml)
  -v, -vv            Debug / trace logging to stderr

Environment:
  OPENAI_API_KEY     Required for chat/run.
  OPENAI_BASE_URL    API base (default https://api.openai.com/v1)
";

const HELP_RUN: &str = "\
aicli run [OPTIONS] <PROMPT>

Runs the multi-turn tool loop. The model may call: execute,
list_allowed_files, web_search, web_fetch, cli_help.

Options:
  --file PATH              Allow the model to read PATH (repeatable).
  --auto-search            Plan one web search and prefix its results.
  --max-turns N            Request/response turns (default 4, cap 32).
  --max-tool-calls N       Tool calls per turn (default 8, cap 64).
  --tool-threads N         Parallel tool workers (default 1, cap 64).
  --tool-choice CHOICE     none | auto | required | <tool name>.
  --continue[=MODE[=THREAD]]
                           Link turns across invocations; MODE is
                           auto|both|after|next, THREAD names a
                           separate conversation.
";

const HELP_WEB_SEARCH: &str = "\
aicli web search <QUERY> [--count N] [--lang XX] [--freshness day|week|month]

Providers (pick with AICLI_SEARCH_PROVIDER=google_cse|brave):
  google_cse   Set GOOGLE_API_KEY and GOOGLE_CSE_CX.
  brave        Set BRAVE_API_KEY.

The web_search tool uses the same configuration.
";

const HELP_WEB_FETCH: &str = "\
web_fetch fetches a URL via HTTP GET. Disabled until URL prefixes are
allowlisted:

  export AICLI_WEB_FETCH_PREFIXES='https://example.com/,https://docs.example.com/'

Prefixes are comma- or whitespace-separated; a URL is fetched only when it
starts with one of them. Bodies are capped at 1 MiB and paged in 4 KiB
windows via start/size.
";

const HELP_EXECUTE: &str = "\
execute runs a restricted read-only pipeline over allowlisted files:

  cat FILE [| STAGE ...]     stages: nl, head, tail, wc, sort, grep, sed

Examples:
  cat README.md
  cat README.md | head -n 80
  sed -n 1,120p README.md
  cat src/main.rs | grep -n fn | head -n 20

No shell, no redirection, no globs, at most 8 stages. Output is paged in
4 KiB windows via start/size.
";

fn select_help(topic: &str) -> &'static str {
    match topic.trim() {
        "" | "main" | "help" | "--help" => HELP_MAIN,
        "run" => HELP_RUN,
        "web" | "web search" | "web_search" => HELP_WEB_SEARCH,
        "web fetch" | "web_fetch" => HELP_WEB_FETCH,
        "execute" => HELP_EXECUTE,
        _ => HELP_MAIN,
    }
}

pub struct CliHelpTool;

impl Tool for CliHelpTool {
    fn name(&self) -> &str {
        "cli_help"
    }

    fn description(&self) -> &str {
        "Read-only: return built-in aicli CLI help/usage text. \
         Use this when you need to tell the user which flags or environment variables \
         are required (e.g. web_search provider keys, web_fetch allowlist). \
         Supports paging via start/size."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "Optional topic/subcommand, e.g. 'main', 'run', 'web', 'web search', 'web fetch', 'execute'. Defaults to 'main'."
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
            }
        })
    }

    fn run(&self, call: &ToolCall) -> ToolResult {
        let topic = call.args.get("topic").and_then(Value::as_str).unwrap_or("");
        let start = call.args.get("start").and_then(Value::as_u64).unwrap_or(0);
        let size = call.args.get("size").and_then(Value::as_u64).unwrap_or(0);

        let text = select_help(topic);
        let mut out = ToolResult::default();
        apply_paging(text.as_bytes(), start, size, &mut out);
        // The text is baked into the binary; every read is a cache hit.
        out.cache_hit = true;
        out
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { call_id: "c".into(), name: "cli_help".into(), args }
    }

    #[test]
    fn default_topic_is_main_usage() {
        let r = CliHelpTool.run(&call(json!({})));
        assert!(r.ok());
        assert!(r.cache_hit);
        let text = String::from_utf8(r.stdout).unwrap();
        assert!(text.contains("Usage:"));
        assert!(text.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn topic_selection() {
        for (topic, needle) in [
            ("run", "--max-turns"),
            ("web search", "GOOGLE_CSE_CX"),
            ("web fetch", "AICLI_WEB_FETCH_PREFIXES"),
            ("execute", "allowlisted files"),
        ] {
            let r = CliHelpTool.run(&call(json!({"topic": topic})));
            let text = String::from_utf8(r.stdout).unwrap();
            assert!(text.contains(needle), "topic {topic} missing {needle}");
        }
    }

    #[test]
    fn unknown_topic_falls_back_to_main() {
        let r = CliHelpTool.run(&call(json!({"topic": "zzz"})));
        assert!(String::from_utf8(r.stdout).unwrap().contains("Usage:"));
    }

    #[test]
    fn topic_whitespace_is_trimmed() {
        assert_eq!(select_help("  run \n"), HELP_RUN);
    }

    #[test]
    fn paging_windows_the_help_text() {
        let r = CliHelpTool.run(&call(json!({"size": 10})));
        assert_eq!(r.stdout.len(), 10);
        assert!(r.truncated);
        assert_eq!(r.next_start, Some(10));
        assert_eq!(r.total_bytes, HELP_MAIN.len() as u64);

        let r2 = CliHelpTool.run(&call(json!({"start": 10, "size": 10})));
        assert_eq!(r2.stdout, HELP_MAIN.as_bytes()[10..20].to_vec());
    }
}
