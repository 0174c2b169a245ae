// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 4;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Status + body of one HTTP exchange. A non-200 status is data, not an
/// error: the caller decides policy.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// The POST function the tool loop consumes. Implemented by
/// [`ResponsesClient`] for the real API and by in-memory fakes in tests.
pub trait Transport: Send + Sync {
    fn post(&self, payload: &Value) -> anyhow::Result<HttpResponse>;
}

/// Blocking client for `POST {base_url}/responses`.
pub struct ResponsesClient {
    url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl ResponsesClient {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("aicli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("http_client_init_failed")?;
        Ok(Self {
            url: join_url(base_url, "/responses"),
            api_key: api_key.to_string(),
            client,
        })
    }
}

impl Transport for ResponsesClient {
    fn post(&self, payload: &Value) -> anyhow::Result<HttpResponse> {
        post_responses(&self.client, &self.url, &self.api_key, payload)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// POST with the capped retry policy: up to 4 attempts, retrying only 429
/// (honouring a `Retry-After` seconds hint) and 503, with exponential
/// backoff and sub-second jitter capped at 30 s. Every other status returns
/// immediately for the caller to judge.
pub fn post_responses(
    client: &reqwest::blocking::Client,
    url: &str,
    api_key: &str,
    payload: &Value,
) -> anyhow::Result<HttpResponse> {
    let mut delay_hint: Option<Duration> = None;
    let mut last: Option<HttpResponse> = None;

    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            let delay = delay_hint.take().unwrap_or_else(|| retry_delay(attempt));
            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying request");
            std::thread::sleep(delay.min(BACKOFF_CAP));
        }

        let resp = client
            .post(url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .with_context(|| format!("POST {url} failed"))?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = resp.text().with_context(|| format!("reading body from {url}"))?;
        debug!(status, body_len = body.len(), "response");

        if status != 429 && status != 503 {
            return Ok(HttpResponse { status, body });
        }
        warn!(status, attempt, "retriable status");
        if status == 429 {
            delay_hint = retry_after.map(Duration::from_secs);
        }
        last = Some(HttpResponse { status, body });
    }
    Ok(last.expect("at least one attempt ran"))
}

fn retry_delay(attempt: u32) -> Duration {
    let backoff = Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(1 << attempt));
    let jitter = Duration::from_millis(subsecond_jitter_ms());
    (backoff + jitter).min(BACKOFF_CAP)
}

/// Sub-second jitter without a rand dependency: the clock's nanosecond field
/// is uniform enough to de-synchronise concurrent retries.
fn subsecond_jitter_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()) % 250)
        .unwrap_or(0)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
