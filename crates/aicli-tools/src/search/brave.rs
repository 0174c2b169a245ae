// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use super::{search_client, SearchError, SearchResponse};

const ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// One Brave web-search request. `count` is clamped to the API's 1–20;
/// `freshness` accepts the CLI spellings `day|week|month`.
pub fn brave_web_search(
    api_key: &str,
    query: &str,
    count: u32,
    lang: Option<&str>,
    freshness: Option<&str>,
) -> Result<SearchResponse, SearchError> {
    let count_s = count.clamp(1, 20).to_string();
    let mut params: Vec<(&str, &str)> = vec![("q", query), ("count", &count_s)];
    if let Some(lang) = lang {
        params.push(("search_lang", lang));
    }
    let freshness_code = freshness.map(freshness_to_api_code);
    if let Some(code) = freshness_code {
        params.push(("freshness", code));
    }

    let client = search_client()?;
    let resp = client
        .get(ENDPOINT)
        .query(&params)
        .header("Accept", "application/json")
        .header("X-Subscription-Token", api_key)
        .send()
        .map_err(|e| SearchError(e.to_string()))?;

    let http_status = resp.status().as_u16();
    let body = resp.bytes().map_err(|e| SearchError(e.to_string()))?.to_vec();
    Ok(SearchResponse { http_status, body })
}

fn freshness_to_api_code(f: &str) -> &str {
    match f {
        "day" => "pd",
        "week" => "pw",
        "month" => "pm",
        other => other,
    }
}
