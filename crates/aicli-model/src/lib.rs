// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire layer for the OpenAI Responses API: request building, response
//! parsing, the tool-schema document, and the blocking POST transport with
//! its retry policy.

mod responses;
mod schema;
mod transport;

pub use responses::{
    build_followup_request, build_initial_request, extract_function_calls, extract_output_text,
    extract_response_id, parse_arguments, FunctionCallItem,
};
pub use schema::build_tools_json;
pub use transport::{post_responses, HttpResponse, ResponsesClient, Transport};
