// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use super::{search_client, SearchError, SearchResponse};

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// One Google Custom Search request. `count` is clamped to the API's 1–10.
pub fn google_cse_search(
    api_key: &str,
    cx: &str,
    query: &str,
    count: u32,
) -> Result<SearchResponse, SearchError> {
    let num = count.clamp(1, 10).to_string();
    let client = search_client()?;
    let resp = client
        .get(ENDPOINT)
        .query(&[("key", api_key), ("cx", cx), ("q", query), ("num", &num)])
        .header("Accept", "application/json")
        .send()
        .map_err(|e| SearchError(e.to_string()))?;

    let http_status = resp.status().as_u16();
    let body = resp.bytes().map_err(|e| SearchError(e.to_string()))?.to_vec();
    Ok(SearchResponse { http_status, body })
}
