// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use aicli_config::{Config, SearchProvider};
use aicli_core::{parse_continue_opt, plan_search, read_id, run_with_tools, state_path, write_id,
                 ToolLoopRequest};
use aicli_model::{build_initial_request, extract_output_text, extract_response_id,
                  ResponsesClient, Transport};
use aicli_tools::builtin::{CliHelpTool, ExecuteTool, ListAllowedFilesTool, WebFetchTool,
                           WebSearchTool};
use aicli_tools::fmt::format_provider_body;
use aicli_tools::search::{brave_web_search, google_cse_search};
use aicli_tools::{Allowlist, PagingCache, ToolRegistry};

use crate::cli::{Cli, Commands, WebCommands};

// Process exit codes, aligned with the tool exit-code taxonomy.
const EXIT_OK: u8 = 0;
const EXIT_INTERNAL: u8 = 1;
const EXIT_INVALID: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("aicli: {e:#}");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    let mut config = match aicli_config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("aicli: {e}");
            return Ok(EXIT_INVALID);
        }
    };
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }

    match cli.command {
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(EXIT_OK)
        }
        Commands::ShowConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(EXIT_OK)
        }
        Commands::Chat { prompt } => chat(&config, &prompt),
        Commands::Web { command: WebCommands::Search { query, count, lang, freshness, provider, raw } } => {
            web_search_command(&config, &query, count, lang.as_deref(), freshness.as_deref(),
                               provider.as_deref(), raw)
        }
        Commands::Run {
            prompt,
            files,
            auto_search,
            max_turns,
            max_tool_calls,
            tool_threads,
            tool_choice,
            continuation,
        } => run_tool_loop(
            &config,
            &prompt,
            &files,
            auto_search,
            max_turns.unwrap_or(0),
            max_tool_calls.unwrap_or(0),
            tool_threads.unwrap_or(0),
            tool_choice.as_deref(),
            continuation.as_deref(),
        ),
    }
}

fn require_api_key(config: &Config) -> Option<String> {
    let key = config.llm.api_key();
    if key.is_none() {
        eprintln!("aicli: {} is not set", config.llm.api_key_env);
    }
    key
}

fn chat(config: &Config, prompt: &str) -> anyhow::Result<u8> {
    let Some(api_key) = require_api_key(config) else {
        return Ok(EXIT_INVALID);
    };
    let transport = ResponsesClient::new(&config.llm.base_url, &api_key)?;
    let payload = build_initial_request(&config.llm.model, prompt, None, None, None, None);
    let resp = transport.post(&payload)?;
    if resp.status != 200 {
        eprintln!("aicli: openai http_status={}", resp.status);
        eprintln!("{}", truncate(&resp.body, 2048));
        return Ok(EXIT_INTERNAL);
    }
    let root: serde_json::Value = serde_json::from_str(&resp.body)?;
    match extract_output_text(&root) {
        Some(text) => {
            println!("{text}");
            Ok(EXIT_OK)
        }
        None => {
            eprintln!("aicli: response carried no output text");
            Ok(EXIT_INVALID)
        }
    }
}

fn web_search_command(
    config: &Config,
    query: &str,
    count: u32,
    lang: Option<&str>,
    freshness: Option<&str>,
    provider: Option<&str>,
    raw: bool,
) -> anyhow::Result<u8> {
    let provider = match provider {
        None | Some("") | Some("auto") => config.search.provider,
        Some(p) => match p.parse::<SearchProvider>() {
            Ok(p) => p,
            Err(()) => {
                eprintln!("aicli: unknown provider {p:?} (use google_cse or brave)");
                return Ok(EXIT_INVALID);
            }
        },
    };

    let resp = match provider {
        SearchProvider::GoogleCse => {
            let (Some(key), Some(cx)) = (config.search.google_api_key(), config.search.google_cse_cx())
            else {
                eprintln!("aicli: google_cse is not configured; set GOOGLE_API_KEY and GOOGLE_CSE_CX");
                return Ok(EXIT_INVALID);
            };
            google_cse_search(&key, &cx, query, count)?
        }
        SearchProvider::Brave => {
            let Some(key) = config.search.brave_api_key() else {
                eprintln!("aicli: brave is not configured; set BRAVE_API_KEY");
                return Ok(EXIT_INVALID);
            };
            brave_web_search(&key, query, count, lang, freshness)?
        }
    };

    if resp.http_status != 200 {
        eprintln!("aicli: search http_status={}", resp.http_status);
        eprintln!("{}", truncate(&String::from_utf8_lossy(&resp.body), 2048));
        return Ok(EXIT_INTERNAL);
    }
    if raw {
        println!("{}", String::from_utf8_lossy(&resp.body));
    } else {
        match serde_json::from_slice::<serde_json::Value>(&resp.body) {
            Ok(v) => print!("{}", format_provider_body(&v)),
            Err(_) => println!("{}", String::from_utf8_lossy(&resp.body)),
        }
    }
    Ok(EXIT_OK)
}

#[allow(clippy::too_many_arguments)]
fn run_tool_loop(
    config: &Config,
    prompt: &str,
    files: &[std::path::PathBuf],
    auto_search: bool,
    max_turns: usize,
    max_tool_calls: usize,
    tool_threads: usize,
    tool_choice: Option<&str>,
    continuation: Option<&str>,
) -> anyhow::Result<u8> {
    let Some(api_key) = require_api_key(config) else {
        return Ok(EXIT_INVALID);
    };

    let mut allowlist = Allowlist::new();
    for file in files {
        if let Err(e) = allowlist.add_path(file) {
            eprintln!("aicli: cannot allow file {}: {e}", file.display());
            return Ok(EXIT_INVALID);
        }
    }
    let allowlist = Arc::new(allowlist);

    let continue_opt = match continuation {
        Some(raw) => match parse_continue_opt(Some(raw)) {
            Ok(opt) => Some(opt),
            Err(e) => {
                eprintln!("aicli: {e}");
                return Ok(EXIT_INVALID);
            }
        },
        None => None,
    };
    let state_file = match &continue_opt {
        Some(opt) => Some(state_path(opt)?),
        None => None,
    };
    let previous_response_id = match (&continue_opt, &state_file) {
        (Some(opt), Some(path)) if opt.mode.reads() => read_id(path)?,
        _ => None,
    };

    let transport = ResponsesClient::new(&config.llm.base_url, &api_key)?;
    let registry = Arc::new(build_registry(config, allowlist));

    let prompt = if auto_search {
        augment_with_search(config, &transport, prompt)
    } else {
        prompt.to_string()
    };

    let request = ToolLoopRequest {
        prompt: &prompt,
        previous_response_id: previous_response_id.as_deref(),
        tool_choice,
        max_turns,
        max_tool_calls_per_turn: max_tool_calls,
        tool_threads,
    };
    let outcome = run_with_tools(config, &transport, &registry, &request)?;

    // Persist the latest response id regardless of how the run ended, so a
    // follow-up invocation can pick the conversation up.
    if let (Some(opt), Some(path), Some(body)) =
        (&continue_opt, &state_file, &outcome.last_response_json)
    {
        if opt.mode.writes() {
            if let Ok(root) = serde_json::from_str::<serde_json::Value>(body) {
                if let Some(id) = extract_response_id(&root) {
                    if let Err(e) = write_id(path, id) {
                        tracing::warn!(error = %e, "could not persist response id");
                    }
                }
            }
        }
    }

    match outcome.final_text {
        Some(text) => {
            println!("{text}");
            Ok(EXIT_OK)
        }
        None => {
            eprintln!("aicli: turn budget exhausted without a final answer");
            Ok(EXIT_INVALID)
        }
    }
}

fn build_registry(config: &Config, allowlist: Arc<Allowlist>) -> ToolRegistry {
    let cache = Arc::new(PagingCache::new(config.limits.cache_entries));
    let prefixes = std::env::var("AICLI_WEB_FETCH_PREFIXES")
        .map(|raw| aicli_tools::builtin::parse_prefix_list(&raw))
        .unwrap_or_default();

    let mut registry = ToolRegistry::new();
    registry.register(ExecuteTool::new(allowlist.clone()));
    registry.register(ListAllowedFilesTool::new(allowlist));
    registry.register(WebSearchTool::new(config.search.clone(), cache.clone()));
    registry.register(WebFetchTool::new(cache, prefixes, config.limits.fetch_max_body_bytes));
    registry.register(CliHelpTool);
    registry
}

/// Run the auto-search planner; on a planned query, fetch and format the
/// results and prefix them to the prompt. Every failure leaves the prompt
/// untouched.
fn augment_with_search(config: &Config, transport: &dyn Transport, prompt: &str) -> String {
    let Some(query) = plan_search(config, transport, prompt) else {
        return prompt.to_string();
    };
    tracing::debug!(query = %query, "auto-search planned");

    let resp = match config.search.provider {
        SearchProvider::GoogleCse => {
            match (config.search.google_api_key(), config.search.google_cse_cx()) {
                (Some(key), Some(cx)) => google_cse_search(&key, &cx, &query, 5).ok(),
                _ => None,
            }
        }
        SearchProvider::Brave => match config.search.brave_api_key() {
            Some(key) => brave_web_search(&key, &query, 5, None, None).ok(),
            None => None,
        },
    };
    let Some(resp) = resp.filter(|r| r.http_status == 200) else {
        return prompt.to_string();
    };
    let Ok(body) = serde_json::from_slice::<serde_json::Value>(&resp.body) else {
        return prompt.to_string();
    };
    let formatted = format_provider_body(&body);
    format!("Web search results for \"{query}\":\n{formatted}\nUser request: {prompt}")
}

fn truncate(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{} ... (truncated, {} bytes total)", &s[..end], s.len())
}
