// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "aicli",
    about = "A CLI agent that drives the OpenAI Responses API with safe, read-only tools",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Model to use, e.g. "gpt-5-mini"
    #[arg(long, short = 'M', env = "AICLI_MODEL", global = true)]
    pub model: Option<String>,

    /// Path to config file (overrides ~/.config/aicli/config.yaml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// One-shot chat: send the prompt, print the model's answer. No tools.
    Chat {
        prompt: String,
    },

    /// Run the multi-turn tool loop over the prompt.
    ///
    /// The model may read files named with --file (through the restricted
    /// pipeline DSL), list them, search the web, fetch allowlisted URLs,
    /// and read the CLI help.
    Run {
        prompt: String,

        /// Allow the model to read this file (repeatable).
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Ask the model to plan one web search first and prefix the
        /// formatted results to the prompt.
        #[arg(long)]
        auto_search: bool,

        /// Request/response turns before giving up (default 4, cap 32).
        #[arg(long, value_name = "N")]
        max_turns: Option<usize>,

        /// Tool calls dispatched per turn (default 8, cap 64).
        #[arg(long = "max-tool-calls", value_name = "N")]
        max_tool_calls: Option<usize>,

        /// Worker threads for parallel tool execution (default 1, cap 64).
        #[arg(long, value_name = "N")]
        tool_threads: Option<usize>,

        /// none | auto | required | <tool name>
        #[arg(long, value_name = "CHOICE")]
        tool_choice: Option<String>,

        /// Link turns across invocations via the stored response id.
        /// MODE is auto|both|after|next; THREAD names an independent
        /// conversation within the session.
        #[arg(
            long = "continue",
            value_name = "MODE[=THREAD]",
            num_args = 0..=1,
            require_equals = true,
            default_missing_value = ""
        )]
        continuation: Option<String>,
    },

    /// Web utilities (search from the terminal).
    Web {
        #[command(subcommand)]
        command: WebCommands,
    },

    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the effective configuration and exit
    ShowConfig,
}

#[derive(Subcommand, Debug)]
pub enum WebCommands {
    /// Search the web with the configured provider and print the results.
    Search {
        query: String,

        /// Max results (provider-capped).
        #[arg(long, short = 'n', default_value = "5")]
        count: u32,

        /// Language hint (brave) or locale string.
        #[arg(long)]
        lang: Option<String>,

        /// day | week | month (brave).
        #[arg(long)]
        freshness: Option<String>,

        /// Provider override: auto|google_cse|brave.
        #[arg(long)]
        provider: Option<String>,

        /// Print the raw provider JSON instead of the formatted summary.
        #[arg(long)]
        raw: bool,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "aicli", &mut std::io::stdout());
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_parses_files_and_limits() {
        let cli = Cli::parse_from([
            "aicli", "run", "--file", "/tmp/a", "--file", "/tmp/b", "--max-turns", "6",
            "--tool-threads", "4", "do things",
        ]);
        match cli.command {
            Commands::Run { prompt, files, max_turns, tool_threads, .. } => {
                assert_eq!(prompt, "do things");
                assert_eq!(files.len(), 2);
                assert_eq!(max_turns, Some(6));
                assert_eq!(tool_threads, Some(4));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn continue_flag_value_is_optional() {
        let cli = Cli::parse_from(["aicli", "run", "--continue", "p"]);
        match cli.command {
            Commands::Run { continuation, .. } => assert_eq!(continuation.as_deref(), Some("")),
            other => panic!("unexpected: {other:?}"),
        }

        let cli = Cli::parse_from(["aicli", "run", "--continue=next=work", "p"]);
        match cli.command {
            Commands::Run { continuation, .. } => {
                assert_eq!(continuation.as_deref(), Some("next=work"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn web_search_defaults() {
        let cli = Cli::parse_from(["aicli", "web", "search", "rust lru"]);
        match cli.command {
            Commands::Web { command: WebCommands::Search { query, count, raw, .. } } => {
                assert_eq!(query, "rust lru");
                assert_eq!(count, 5);
                assert!(!raw);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn global_model_flag_applies_to_subcommands() {
        let cli = Cli::parse_from(["aicli", "chat", "hello", "--model", "gpt-5"]);
        assert_eq!(cli.model.as_deref(), Some("gpt-5"));
    }

    #[test]
    fn verify_cli_assertions() {
        Cli::command().debug_assert();
    }
}
