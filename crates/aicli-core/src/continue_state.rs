// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The between-invocations rendezvous: one file holding the previous
//! response id, named after the login session so separate invocations from
//! the same terminal session share a conversation.

use std::path::{Path, PathBuf};

/// What to do with the stored id around a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinueMode {
    /// Read the stored id before the run and write the new id after.
    #[default]
    Auto,
    /// Same as `Auto`; kept as a distinct spelling for explicitness.
    Both,
    /// Only read — continue after the stored conversation without
    /// advancing it.
    After,
    /// Only write — start fresh, saving the id for the next invocation.
    Next,
}

impl ContinueMode {
    pub fn reads(self) -> bool {
        matches!(self, ContinueMode::Auto | ContinueMode::Both | ContinueMode::After)
    }

    pub fn writes(self) -> bool {
        matches!(self, ContinueMode::Auto | ContinueMode::Both | ContinueMode::Next)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinueOpt {
    pub mode: ContinueMode,
    pub thread: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid --continue mode: {0}")]
pub struct ParseContinueError(String);

fn parse_mode(s: &str) -> Option<ContinueMode> {
    match s {
        "" | "auto" => Some(ContinueMode::Auto),
        "both" => Some(ContinueMode::Both),
        "after" => Some(ContinueMode::After),
        "next" => Some(ContinueMode::Next),
        _ => None,
    }
}

/// Thread names become file-name components: keep `[A-Za-z0-9_-]`, map
/// separators to `_`, drop the rest, cap at 63 bytes.
fn sanitize_thread_name(raw: &str) -> Option<String> {
    let mut out = String::new();
    for c in raw.chars() {
        if out.len() >= 63 {
            break;
        }
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => out.push(c),
            ' ' | '.' | ':' | '/' => out.push('_'),
            _ => {}
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Parse the `--continue` value: empty → auto; `MODE`; `MODE=THREAD`; a bare
/// non-mode token is a THREAD with mode auto.
pub fn parse_continue_opt(raw: Option<&str>) -> Result<ContinueOpt, ParseContinueError> {
    let raw = raw.unwrap_or("");
    if let Some((mode_s, thread_s)) = raw.split_once('=') {
        let mode = parse_mode(mode_s).ok_or_else(|| ParseContinueError(mode_s.to_string()))?;
        return Ok(ContinueOpt { mode, thread: sanitize_thread_name(thread_s) });
    }
    match parse_mode(raw) {
        Some(mode) => Ok(ContinueOpt { mode, thread: None }),
        None => Ok(ContinueOpt {
            mode: ContinueMode::Auto,
            thread: sanitize_thread_name(raw),
        }),
    }
}

fn pick_runtime_dir() -> PathBuf {
    for var in ["XDG_RUNTIME_DIR", "TMPDIR"] {
        if let Ok(dir) = std::env::var(var) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
    }
    PathBuf::from("/tmp")
}

fn session_id() -> i64 {
    #[cfg(unix)]
    {
        i64::from(unsafe { libc::getsid(0) })
    }
    #[cfg(not(unix))]
    {
        i64::from(std::process::id())
    }
}

/// `<base>/aicli/.previous_response_id_s<SID>[_<THREAD>]`, creating the
/// `aicli` directory mode 0700 when missing.
pub fn state_path_in(base: &Path, sid: i64, opt: &ContinueOpt) -> std::io::Result<PathBuf> {
    let dir = base.join("aicli");
    match std::fs::create_dir(&dir) {
        Ok(()) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }
    let name = match &opt.thread {
        Some(thread) => format!(".previous_response_id_s{sid}_{thread}"),
        None => format!(".previous_response_id_s{sid}"),
    };
    Ok(dir.join(name))
}

/// The state path under the runtime directory for the calling session.
pub fn state_path(opt: &ContinueOpt) -> std::io::Result<PathBuf> {
    state_path_in(&pick_runtime_dir(), session_id(), opt)
}

/// Read the stored id; `Ok(None)` when no state exists yet.
pub fn read_id(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let id = contents.trim_end_matches(['\n', '\r']).to_string();
            if id.is_empty() {
                return Ok(None);
            }
            Ok(Some(id))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Atomic write: `.tmp` sibling, fsync, rename. A crash at any point leaves
/// either the old content or the new — never a torn file.
pub fn write_id(path: &Path, response_id: &str) -> std::io::Result<()> {
    if response_id.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty response id",
        ));
    }
    let tmp = path.with_extension("tmp");
    {
        use std::io::Write;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;
        file.write_all(response_id.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
