// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Search-provider HTTP clients.

mod brave;
mod google;

pub use brave::brave_web_search;
pub use google::google_cse_search;

/// A provider response: HTTP status plus the raw body. Non-200 statuses are
/// returned to the caller, not turned into errors here — the tool layer
/// decides what to tell the model.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub http_status: u16,
    pub body: Vec<u8>,
}

/// Transport-level failure (DNS, TLS, timeout, client construction).
#[derive(Debug)]
pub struct SearchError(pub String);

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SearchError {}

pub(crate) fn search_client() -> Result<reqwest::blocking::Client, SearchError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .connect_timeout(std::time::Duration::from_secs(10))
        .user_agent(concat!("aicli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SearchError(format!("http_client_init_failed: {e}")))
}
