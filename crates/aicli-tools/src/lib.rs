// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The tools the model may call, and the plumbing they share.
//!
//! Every tool is read-only and produces a [`ToolResult`]: a paged byte
//! window plus the metadata the model needs to request the next window.
//! Network-backed tools cache their full body in a shared [`PagingCache`]
//! so follow-up pages do not re-issue the request.

pub mod allowlist;
pub mod builtin;
pub mod fmt;
pub mod paging;
pub mod registry;
pub mod search;
pub mod tool;

pub use allowlist::{AllowedFile, Allowlist};
pub use paging::{apply_paging, PageEntry, PagingCache};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolCall, ToolResult};

/// Hard cap on one paged tool window, in bytes.
pub const MAX_TOOL_BYTES: u64 = 4096;
