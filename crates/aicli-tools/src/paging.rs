// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Byte-window paging and the LRU cache behind the network tools.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::tool::ToolResult;
use crate::MAX_TOOL_BYTES;

/// Window `data` to `[start, start+size)` and fill `out` with the window
/// plus its paging metadata. `size` is clamped to [`MAX_TOOL_BYTES`];
/// 0 means the default (maximum) window.
pub fn apply_paging(data: &[u8], start: u64, size: u64, out: &mut ToolResult) {
    let size = if size == 0 { MAX_TOOL_BYTES } else { size.min(MAX_TOOL_BYTES) };
    let total = data.len() as u64;
    let start = start.min(total);
    let n = (total - start).min(size);

    out.stdout = data[start as usize..(start + n) as usize].to_vec();
    out.exit_code = 0;
    out.total_bytes = total;
    out.truncated = start + n < total;
    out.next_start = out.truncated.then_some(start + n);
}

/// One cached full body plus the paging metadata of the window that created
/// it. Shared out behind `Arc`: readers keep the entry alive even if it is
/// evicted while they page through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub data: Vec<u8>,
    pub total_bytes: u64,
    pub truncated: bool,
    pub next_start: Option<u64>,
}

/// Keyed LRU of owned byte blobs. Internally synchronised — the web tools
/// running on the worker pool within one turn share a single cache.
pub struct PagingCache {
    inner: Mutex<LruCache<String, Arc<PageEntry>>>,
}

impl PagingCache {
    /// `max_entries` of 0 falls back to the default of 64.
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::new(64).unwrap());
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    /// Look up `key`, marking it most-recently used.
    pub fn get(&self, key: &str) -> Option<Arc<PageEntry>> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    /// Insert or replace `key`. The bytes are copied; the caller keeps its
    /// buffer. The inserted entry becomes most-recent; the least-recent
    /// entry is evicted when the cache is full.
    pub fn put(&self, key: &str, data: &[u8], truncated: bool, next_start: Option<u64>) {
        let entry = Arc::new(PageEntry {
            data: data.to_vec(),
            total_bytes: data.len() as u64,
            truncated,
            next_start,
        });
        self.inner.lock().unwrap().put(key.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
