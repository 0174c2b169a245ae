// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::{MAX_ARGS, MAX_STAGES, MAX_TOKEN_BYTES};

/// Parse failure statuses. `Display` is the exact keyword reported back to
/// the model in `stderr_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty")]
    Empty,
    #[error("parse_error")]
    Parse,
    #[error("forbidden")]
    Forbidden,
    #[error("too_many_stages")]
    TooManyStages,
    #[error("too_many_args")]
    TooManyArgs,
}

/// The fixed command vocabulary. Anything else is `forbidden`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdKind {
    Cat,
    Nl,
    Head,
    Tail,
    Wc,
    Sort,
    Grep,
    Sed,
}

impl CmdKind {
    fn from_token(tok: &str) -> Option<Self> {
        match tok {
            "cat" => Some(CmdKind::Cat),
            "nl" => Some(CmdKind::Nl),
            "head" => Some(CmdKind::Head),
            "tail" => Some(CmdKind::Tail),
            "wc" => Some(CmdKind::Wc),
            "sort" => Some(CmdKind::Sort),
            "grep" => Some(CmdKind::Grep),
            "sed" => Some(CmdKind::Sed),
            _ => None,
        }
    }
}

/// One pipeline stage: the command kind plus its argv exactly as written
/// (after quote/escape processing), command word included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub kind: CmdKind,
    pub argv: Vec<String>,
}

impl Stage {
    /// Argv with `--` end-of-options markers removed.
    pub fn argv_without_double_dash(&self) -> Vec<&str> {
        self.argv.iter().map(|s| s.as_str()).filter(|a| *a != "--").collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

// Shell metacharacters blocked outside quotes. `|` is the stage separator
// and is handled by the tokeniser, not listed here.
fn is_forbidden(c: char) -> bool {
    matches!(c, ';' | '&' | '>' | '<' | '$' | '`' | '\n' | '\r')
}

// Inside quotes, expansion/substitution characters stay blocked; spaces and
// `|` become plain data.
fn is_forbidden_in_quote(c: char) -> bool {
    matches!(c, '$' | '`' | '\n' | '\r')
}

struct Tokenizer<'a> {
    rest: std::str::Chars<'a>,
    peeked: Option<char>,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self { rest: source.chars(), peeked: None }
    }

    fn peek(&mut self) -> Option<char> {
        if self.peeked.is_none() {
            self.peeked = self.rest.next();
        }
        self.peeked
    }

    fn bump(&mut self) -> Option<char> {
        self.peek();
        self.peeked.take()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Read one token. Returns `Ok(None)` at end of input or just before a
    /// `|` separator (which is left in place for the stage loop).
    fn read_token(&mut self) -> Result<Option<String>, ParseError> {
        self.skip_ws();
        match self.peek() {
            None | Some('|') => return Ok(None),
            _ => {}
        }

        let mut out = String::new();
        let mut push = |out: &mut String, c: char| -> Result<(), ParseError> {
            if out.len() + c.len_utf8() > MAX_TOKEN_BYTES {
                return Err(ParseError::Parse);
            }
            out.push(c);
            Ok(())
        };

        if matches!(self.peek(), Some('\'') | Some('"')) {
            let quote = self.bump().unwrap();
            loop {
                let mut c = match self.bump() {
                    Some(c) => c,
                    None => return Err(ParseError::Parse), // unterminated quote
                };
                if c == quote {
                    break;
                }
                if quote == '"' && c == '\\' {
                    // Inside double quotes only `"` and `\` are escapable;
                    // any other backslash stays literal.
                    match self.peek() {
                        Some(next @ ('"' | '\\')) => {
                            self.bump();
                            c = next;
                        }
                        _ => {}
                    }
                }
                if is_forbidden_in_quote(c) {
                    return Err(ParseError::Forbidden);
                }
                push(&mut out, c)?;
            }
        } else {
            while let Some(c) = self.peek() {
                if c.is_whitespace() || c == '|' {
                    break;
                }
                let mut c = self.bump().unwrap();
                if c == '\\' {
                    c = self.bump().ok_or(ParseError::Parse)?;
                }
                if is_forbidden(c) {
                    return Err(ParseError::Forbidden);
                }
                push(&mut out, c)?;
            }
        }

        // A quoted pair may produce an empty token; it is a valid argument
        // (e.g. `grep -F ""`).
        Ok(Some(out))
    }
}

/// Parse a command string into a typed pipeline.
///
/// Every token is an owned `String`; the caller may drop the source
/// immediately.
pub fn parse_pipeline(command: &str) -> Result<Pipeline, ParseError> {
    let mut tz = Tokenizer::new(command);
    let mut stages: Vec<Stage> = Vec::new();

    loop {
        tz.skip_ws();
        if tz.peek().is_none() {
            break;
        }
        if tz.peek() == Some('|') {
            // Leading `|`, `||`, or trailing `|` — a separator with no stage.
            return Err(ParseError::Parse);
        }
        if stages.len() >= MAX_STAGES {
            return Err(ParseError::TooManyStages);
        }

        let cmd_tok = match tz.read_token()? {
            Some(t) if !t.is_empty() => t,
            _ => return Err(ParseError::Parse),
        };
        let kind = CmdKind::from_token(&cmd_tok).ok_or(ParseError::Forbidden)?;
        let mut argv = vec![cmd_tok];

        while let Some(tok) = tz.read_token()? {
            if argv.len() >= MAX_ARGS {
                return Err(ParseError::TooManyArgs);
            }
            argv.push(tok);
        }

        stages.push(Stage { kind, argv });

        tz.skip_ws();
        match tz.peek() {
            Some('|') => {
                tz.bump();
                tz.skip_ws();
                if tz.peek().is_none() {
                    // Trailing separator with no stage behind it.
                    return Err(ParseError::Parse);
                }
            }
            _ => break,
        }
    }

    if stages.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(Pipeline { stages })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
