// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name forwarded to the Responses API
    #[serde(default = "default_model")]
    pub model: String,
    /// API base URL ending before `/responses`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable that holds the API key (read at use time,
    /// never stored in the config struct or serialized back out)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_model() -> String {
    "gpt-5-mini".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

/// Default backend for the `web_search` tool and `aicli web search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchProvider {
    #[default]
    GoogleCse,
    Brave,
}

impl std::fmt::Display for SearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchProvider::GoogleCse => write!(f, "google_cse"),
            SearchProvider::Brave => write!(f, "brave"),
        }
    }
}

impl std::str::FromStr for SearchProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" | "google_cse" => Ok(SearchProvider::GoogleCse),
            "brave" => Ok(SearchProvider::Brave),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Provider used when the model does not request one explicitly
    #[serde(default)]
    pub provider: SearchProvider,
    /// Environment variable holding the Google Custom Search API key
    #[serde(default = "default_google_api_key_env")]
    pub google_api_key_env: String,
    /// Environment variable holding the Google CSE engine id (cx)
    #[serde(default = "default_google_cse_cx_env")]
    pub google_cse_cx_env: String,
    /// Environment variable holding the Brave Search API key
    #[serde(default = "default_brave_api_key_env")]
    pub brave_api_key_env: String,
}

fn default_google_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_google_cse_cx_env() -> String {
    "GOOGLE_CSE_CX".into()
}
fn default_brave_api_key_env() -> String {
    "BRAVE_API_KEY".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::GoogleCse,
            google_api_key_env: default_google_api_key_env(),
            google_cse_cx_env: default_google_cse_cx_env(),
            brave_api_key_env: default_brave_api_key_env(),
        }
    }
}

impl SearchConfig {
    pub fn google_api_key(&self) -> Option<String> {
        std::env::var(&self.google_api_key_env).ok().filter(|k| !k.is_empty())
    }
    pub fn google_cse_cx(&self) -> Option<String> {
        std::env::var(&self.google_cse_cx_env).ok().filter(|k| !k.is_empty())
    }
    pub fn brave_api_key(&self) -> Option<String> {
        std::env::var(&self.brave_api_key_env).ok().filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum request/response turns per invocation (hard cap 32)
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Maximum tool calls dispatched per turn (hard cap 64)
    #[serde(default = "default_max_tool_calls_per_turn")]
    pub max_tool_calls_per_turn: usize,
    /// Worker threads for parallel tool execution (hard cap 64)
    #[serde(default = "default_tool_threads")]
    pub tool_threads: usize,
    /// Hard cap on a fetched HTTP body, in bytes
    #[serde(default = "default_fetch_max_body_bytes")]
    pub fetch_max_body_bytes: usize,
    /// Paging cache capacity, in entries
    #[serde(default = "default_cache_entries")]
    pub cache_entries: usize,
}

fn default_max_turns() -> usize {
    4
}
fn default_max_tool_calls_per_turn() -> usize {
    8
}
fn default_tool_threads() -> usize {
    1
}
fn default_fetch_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_cache_entries() -> usize {
    64
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_tool_calls_per_turn: default_max_tool_calls_per_turn(),
            tool_threads: default_tool_threads(),
            fetch_max_body_bytes: default_fetch_max_body_bytes(),
            cache_entries: default_cache_entries(),
        }
    }
}

/// Payload-logging levels. 0 = off; 1 = summary (512-byte excerpts);
/// 2 = normal (2 KiB); 3 = verbose (8 KiB).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub api: u8,
    #[serde(default)]
    pub function_call: u8,
}

/// Byte cap for a logged payload excerpt at the given debug level.
pub fn debug_max_bytes(level: u8) -> usize {
    match level {
        0 => 0,
        1 => 512,
        2 => 2048,
        _ => 8192,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_model() {
        let c = Config::default();
        assert_eq!(c.llm.model, "gpt-5-mini");
    }

    #[test]
    fn config_default_base_url() {
        let c = Config::default();
        assert_eq!(c.llm.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn config_default_api_key_env_is_openai() {
        let c = Config::default();
        assert_eq!(c.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn config_default_limits() {
        let c = Config::default();
        assert_eq!(c.limits.max_turns, 4);
        assert_eq!(c.limits.max_tool_calls_per_turn, 8);
        assert_eq!(c.limits.tool_threads, 1);
        assert_eq!(c.limits.fetch_max_body_bytes, 1024 * 1024);
        assert_eq!(c.limits.cache_entries, 64);
    }

    #[test]
    fn config_default_search_provider_is_google() {
        let c = Config::default();
        assert_eq!(c.search.provider, SearchProvider::GoogleCse);
    }

    #[test]
    fn config_default_debug_levels_off() {
        let c = Config::default();
        assert_eq!(c.debug.api, 0);
        assert_eq!(c.debug.function_call, 0);
    }

    #[test]
    fn search_provider_parses_aliases() {
        assert_eq!("google".parse(), Ok(SearchProvider::GoogleCse));
        assert_eq!("google_cse".parse(), Ok(SearchProvider::GoogleCse));
        assert_eq!("brave".parse(), Ok(SearchProvider::Brave));
        assert!("bing".parse::<SearchProvider>().is_err());
    }

    #[test]
    fn search_provider_display_round_trip() {
        for p in [SearchProvider::GoogleCse, SearchProvider::Brave] {
            assert_eq!(p.to_string().parse(), Ok(p));
        }
    }

    #[test]
    fn debug_max_bytes_ladder() {
        assert_eq!(debug_max_bytes(0), 0);
        assert_eq!(debug_max_bytes(1), 512);
        assert_eq!(debug_max_bytes(2), 2048);
        assert_eq!(debug_max_bytes(3), 8192);
        assert_eq!(debug_max_bytes(7), 8192);
    }

    #[test]
    fn config_deserialises_from_yaml() {
        let yaml = "llm:\n  model: gpt-5\n  base_url: http://localhost:9999/v1\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.llm.model, "gpt-5");
        assert_eq!(c.llm.base_url, "http://localhost:9999/v1");
        // untouched sections fall back to defaults
        assert_eq!(c.limits.max_turns, 4);
    }

    #[test]
    fn config_partial_yaml_fills_in_defaults() {
        let yaml = "limits:\n  max_turns: 8\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.limits.max_turns, 8);
        assert_eq!(c.limits.max_tool_calls_per_turn, 8);
        assert_eq!(c.llm.model, "gpt-5-mini");
    }

    #[test]
    fn config_yaml_round_trip() {
        let mut c = Config::default();
        c.llm.model = "gpt-5".into();
        c.search.provider = SearchProvider::Brave;
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.llm.model, "gpt-5");
        assert_eq!(back.search.provider, SearchProvider::Brave);
    }
}
