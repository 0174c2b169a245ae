// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Stage transformers: pure byte-in/byte-out implementations of the command
//! vocabulary, plus the per-stage argv validation.
//!
//! Each transformer appends to the caller's output buffer and never reads
//! anything but its input slice. Argument shapes are strict: an argv that
//! does not match the accepted form for its command fails the stage rather
//! than being guessed at.

use regex::bytes::Regex;

use crate::parser::{CmdKind, Stage};

/// Input lines longer than this fail the stage.
const MAX_INPUT_LINE: usize = 64 * 1024;
/// A produced line longer than this fails the stage.
const MAX_OUTPUT_LINE: usize = 256 * 1024;
/// Substitutions applied to a single line beyond this fail the stage.
const MAX_SUBST_PER_LINE: usize = 4096;

/// Stage failure. `Display` is the wire keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("mvp_unsupported_stage")]
pub struct StageError;

/// Split `input` into lines without their terminators. A trailing newline
/// terminates the final line; it does not open an empty one.
fn split_lines(input: &[u8]) -> Result<Vec<&[u8]>, StageError> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in input.iter().enumerate() {
        if *b == b'\n' {
            lines.push(&input[start..i]);
            start = i + 1;
        }
    }
    if start < input.len() {
        lines.push(&input[start..]);
    }
    if lines.iter().any(|l| l.len() > MAX_INPUT_LINE) {
        return Err(StageError);
    }
    Ok(lines)
}

fn parse_count(s: &str) -> Result<u64, StageError> {
    s.parse::<u64>().map_err(|_| StageError)
}

/// `head -n N` / `tail -n N` argv shapes: bare (default 10), `-nN`, `-n N`.
fn parse_line_count(argv: &[&str]) -> Result<u64, StageError> {
    match argv {
        [_] => Ok(10),
        [_, opt] if opt.starts_with("-n") && opt.len() > 2 => parse_count(&opt[2..]),
        [_, "-n", n] => parse_count(n),
        _ => Err(StageError),
    }
}

/// Apply one (non-`cat`) stage to `input`, appending the result to `out`.
pub fn apply_stage(stage: &Stage, input: &[u8], out: &mut Vec<u8>) -> Result<(), StageError> {
    let argv = stage.argv_without_double_dash();
    match stage.kind {
        CmdKind::Cat => Err(StageError), // only valid as the normalised stage 0
        CmdKind::Nl => stage_nl(&argv, input, out),
        CmdKind::Head => stage_head(parse_line_count(&argv)?, input, out),
        CmdKind::Tail => stage_tail(parse_line_count(&argv)?, input, out),
        CmdKind::Wc => stage_wc(&argv, input, out),
        CmdKind::Sort => stage_sort(&argv, input, out),
        CmdKind::Grep => stage_grep(&argv, input, out),
        CmdKind::Sed => stage_sed(&argv, input, out),
    }
}

fn stage_nl(argv: &[&str], input: &[u8], out: &mut Vec<u8>) -> Result<(), StageError> {
    match argv {
        [_] | [_, "-ba"] => {}
        _ => return Err(StageError),
    }
    for (idx, line) in split_lines(input)?.iter().enumerate() {
        out.extend_from_slice(format!("{:>6}\t", idx + 1).as_bytes());
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    Ok(())
}

fn stage_head(nlines: u64, input: &[u8], out: &mut Vec<u8>) -> Result<(), StageError> {
    if nlines == 0 {
        return Ok(());
    }
    let mut seen = 0u64;
    for b in input {
        out.push(*b);
        if *b == b'\n' {
            seen += 1;
            if seen >= nlines {
                return Ok(());
            }
        }
    }
    Ok(())
}

fn stage_tail(nlines: u64, input: &[u8], out: &mut Vec<u8>) -> Result<(), StageError> {
    if nlines == 0 {
        return Ok(());
    }
    // Walk backwards; the (nlines+1)-th newline from the end marks the start
    // of the window. An unterminated final line counts as a line.
    let mut seen = 0u64;
    for i in (0..input.len()).rev() {
        if input[i] == b'\n' {
            seen += 1;
            if seen == nlines + 1 {
                out.extend_from_slice(&input[i + 1..]);
                return Ok(());
            }
        }
    }
    out.extend_from_slice(input);
    Ok(())
}

fn stage_wc(argv: &[&str], input: &[u8], out: &mut Vec<u8>) -> Result<(), StageError> {
    let count: u64 = match argv {
        [_, "-c"] => input.len() as u64,
        [_, "-l"] => input.iter().filter(|b| **b == b'\n').count() as u64,
        [_, "-w"] => {
            let mut words = 0u64;
            let mut in_word = false;
            for b in input {
                let ws = matches!(b, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r');
                if ws {
                    in_word = false;
                } else if !in_word {
                    in_word = true;
                    words += 1;
                }
            }
            words
        }
        _ => return Err(StageError),
    };
    out.extend_from_slice(format!("{count}\n").as_bytes());
    Ok(())
}

fn stage_sort(argv: &[&str], input: &[u8], out: &mut Vec<u8>) -> Result<(), StageError> {
    let reverse = match argv {
        [_] => false,
        [_, "-r"] => true,
        _ => return Err(StageError),
    };
    let mut lines = split_lines(input)?;
    // Stable sort: equal lines keep their input order, so `sort | sort` is
    // idempotent regardless of duplicates.
    lines.sort_by(|a, b| if reverse { b.cmp(a) } else { a.cmp(b) });
    for line in lines {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    Ok(())
}

struct GrepArgs<'a> {
    pattern: &'a str,
    fixed: bool,
    invert: bool,
    line_numbers: bool,
}

fn parse_grep_args<'a>(argv: &[&'a str]) -> Result<GrepArgs<'a>, StageError> {
    let mut fixed = false;
    let mut invert = false;
    let mut line_numbers = false;
    let mut pattern: Option<&str> = None;
    for arg in &argv[1..] {
        match *arg {
            "-F" if !fixed => fixed = true,
            "-v" if !invert => invert = true,
            "-n" if !line_numbers => line_numbers = true,
            _ if pattern.is_none() => pattern = Some(arg),
            _ => return Err(StageError),
        }
    }
    let pattern = pattern.ok_or(StageError)?;
    Ok(GrepArgs { pattern, fixed, invert, line_numbers })
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn stage_grep(argv: &[&str], input: &[u8], out: &mut Vec<u8>) -> Result<(), StageError> {
    let args = parse_grep_args(argv)?;

    // Documented contract: the empty pattern matches nothing, fixed or not.
    if args.pattern.is_empty() {
        return Ok(());
    }

    let re = if args.fixed {
        None
    } else {
        Some(Regex::new(args.pattern).map_err(|_| StageError)?)
    };

    for (idx, line) in split_lines(input)?.iter().enumerate() {
        let matched = match &re {
            Some(re) => re.is_match(line),
            None => contains_subslice(line, args.pattern.as_bytes()),
        };
        if matched != args.invert {
            if args.line_numbers {
                out.extend_from_slice(format!("{}:", idx + 1).as_bytes());
            }
            out.extend_from_slice(line);
            out.push(b'\n');
        }
    }
    Ok(())
}

// ── sed ──────────────────────────────────────────────────────────────────────

enum SedScript {
    NumericRange { start: u64, end: u64, print: bool },
    RegexRange { open: Regex, close: Option<Regex>, print: bool },
    Substitute { re: Regex, replacement: Vec<u8>, global: bool, print_on_match: bool },
}

/// Split `s/RE/REPL/flags` (or `/RE/...`) on unescaped delimiters, starting
/// just past the leading delimiter. Returns the segment and the rest after
/// the closing delimiter.
fn take_delimited(s: &str) -> Option<(&str, &str)> {
    let bytes = s.as_bytes();
    let mut escaped = false;
    for (i, b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'/' => return Some((&s[..i], &s[i + 1..])),
            _ => {}
        }
    }
    None
}

/// `\/` and `\\` unescape; everything else is literal (no backreferences).
fn unescape_replacement(repl: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(repl.len());
    let mut escaped = false;
    for b in repl.bytes() {
        if escaped {
            match b {
                b'/' | b'\\' => out.push(b),
                _ => {
                    out.push(b'\\');
                    out.push(b);
                }
            }
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else {
            out.push(b);
        }
    }
    if escaped {
        out.push(b'\\');
    }
    out
}

fn parse_sed_script(script: &str) -> Result<SedScript, StageError> {
    if let Some(rest) = script.strip_prefix("s/") {
        let (re_text, rest) = take_delimited(rest).ok_or(StageError)?;
        let (repl, flags) = take_delimited(rest).ok_or(StageError)?;
        let mut global = false;
        let mut print_on_match = false;
        for f in flags.chars() {
            match f {
                'g' if !global => global = true,
                'p' if !print_on_match => print_on_match = true,
                _ => return Err(StageError),
            }
        }
        let re = Regex::new(re_text).map_err(|_| StageError)?;
        return Ok(SedScript::Substitute {
            re,
            replacement: unescape_replacement(repl),
            global,
            print_on_match,
        });
    }

    if let Some(rest) = script.strip_prefix('/') {
        let (re1, rest) = take_delimited(rest).ok_or(StageError)?;
        let open = Regex::new(re1).map_err(|_| StageError)?;
        let (close, cmd) = if let Some(rest2) = rest.strip_prefix(",/") {
            let (re2, rest3) = take_delimited(rest2).ok_or(StageError)?;
            (Some(Regex::new(re2).map_err(|_| StageError)?), rest3)
        } else {
            (None, rest)
        };
        let print = match cmd {
            "p" => true,
            "d" => false,
            _ => return Err(StageError),
        };
        return Ok(SedScript::RegexRange { open, close, print });
    }

    // Numeric: N[,M](p|d), 1-based, N ≤ M, 0 rejected.
    let cmd = match script.chars().last() {
        Some('p') => true,
        Some('d') => false,
        _ => return Err(StageError),
    };
    let addr = &script[..script.len() - 1];
    let (start, end) = match addr.split_once(',') {
        Some((a, b)) => (parse_count(a)?, parse_count(b)?),
        None => {
            let n = parse_count(addr)?;
            (n, n)
        }
    };
    if start == 0 || end == 0 || start > end {
        return Err(StageError);
    }
    Ok(SedScript::NumericRange { start, end, print: cmd })
}

fn parse_sed_args(argv: &[&str]) -> Result<SedScript, StageError> {
    match argv {
        [_, "-n", script] => parse_sed_script(script),
        _ => Err(StageError),
    }
}

/// Validation-only entry used by pipeline normalisation: is `script` a sed
/// script this executor accepts?
pub(crate) fn sed_script_is_supported(script: &str) -> bool {
    parse_sed_script(script).is_ok()
}

fn emit_line(out: &mut Vec<u8>, line: &[u8]) {
    out.extend_from_slice(line);
    out.push(b'\n');
}

fn stage_sed(argv: &[&str], input: &[u8], out: &mut Vec<u8>) -> Result<(), StageError> {
    let script = parse_sed_args(argv)?;
    let lines = split_lines(input)?;

    match script {
        SedScript::NumericRange { start, end, print } => {
            for (idx, line) in lines.iter().enumerate() {
                let lineno = (idx + 1) as u64;
                let in_range = lineno >= start && lineno <= end;
                if in_range == print {
                    emit_line(out, line);
                }
            }
        }
        SedScript::RegexRange { open, close, print } => match close {
            None => {
                for line in &lines {
                    if open.is_match(line) == print {
                        emit_line(out, line);
                    }
                }
            }
            Some(close) => {
                // Classic restartable ranges: a range opens at a line
                // matching the open pattern and closes at the next line
                // matching the close pattern (inclusive).
                let mut in_range = false;
                for line in &lines {
                    let selected = if in_range {
                        if close.is_match(line) {
                            in_range = false;
                        }
                        true
                    } else if open.is_match(line) {
                        in_range = true;
                        true
                    } else {
                        false
                    };
                    if selected == print {
                        emit_line(out, line);
                    }
                }
            }
        },
        SedScript::Substitute { re, replacement, global, print_on_match } => {
            for line in &lines {
                let (result, count) = substitute_line(&re, &replacement, global, line)?;
                if result.len() > MAX_OUTPUT_LINE {
                    return Err(StageError);
                }
                if !print_on_match || count > 0 {
                    emit_line(out, &result);
                }
            }
        }
    }
    Ok(())
}

fn substitute_line(
    re: &Regex,
    replacement: &[u8],
    global: bool,
    line: &[u8],
) -> Result<(Vec<u8>, usize), StageError> {
    let mut out = Vec::with_capacity(line.len());
    let mut count = 0usize;
    let mut last = 0usize;
    for m in re.find_iter(line) {
        if count >= MAX_SUBST_PER_LINE {
            return Err(StageError);
        }
        out.extend_from_slice(&line[last..m.start()]);
        out.extend_from_slice(replacement);
        last = m.end();
        count += 1;
        if !global {
            break;
        }
    }
    out.extend_from_slice(&line[last..]);
    Ok((out, count))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
