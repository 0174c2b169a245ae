// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Pipeline normalisation.
//!
//! Models frequently write `head -n 20 FILE` or `sed -n '1,20p' FILE` rather
//! than `cat FILE | head -n 20`. Execution requires the canonical shape
//! `cat FILE | …`, so file-taking first stages are rewritten before the
//! allowlist gate runs.

use crate::parser::{CmdKind, Pipeline, Stage};
use crate::stages::sed_script_is_supported;
use crate::MAX_STAGES;

/// Normalisation failure: the pipeline has no usable `cat FILE` head and its
/// first stage is not one of the rewritable shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("mvp_requires: cat <FILE> (or head/tail/nl/sed ... <FILE>)")]
pub struct NormalizeError;

// Commands whose trailing argument may name the source file.
fn takes_file_arg(kind: CmdKind) -> bool {
    matches!(kind, CmdKind::Head | CmdKind::Tail | CmdKind::Nl | CmdKind::Sed)
}

/// `sed -n SCRIPT FILE`: four argv entries whose SCRIPT is a script the
/// executor actually supports. Anything else must not be mistaken for a
/// file-input shape.
fn is_sed_file_form(stage: &Stage) -> bool {
    stage.kind == CmdKind::Sed
        && stage.argv.len() == 4
        && stage.argv[1] == "-n"
        && !stage.argv[2].is_empty()
        && !stage.argv[3].is_empty()
        && sed_script_is_supported(&stage.argv[2])
}

/// Rewrite `pipeline` so stage 0 is `cat FILE`.
///
/// Already-normalised pipelines pass through untouched. Returns the rewritten
/// pipeline or an error when no rewrite applies.
pub fn normalize_file_input_pipeline(pipeline: &Pipeline) -> Result<Pipeline, NormalizeError> {
    let first = pipeline.stages.first().ok_or(NormalizeError)?;

    if first.kind == CmdKind::Cat && first.argv.len() == 2 {
        return Ok(pipeline.clone());
    }

    let sed_file_form = is_sed_file_form(first);
    if first.kind == CmdKind::Sed && !sed_file_form {
        // A sed head is only rewritable in the validated `-n SCRIPT FILE`
        // shape; stripping anything else would mistake a script for a file.
        return Err(NormalizeError);
    }
    if !sed_file_form && !takes_file_arg(first.kind) {
        return Err(NormalizeError);
    }
    if first.argv.len() < 2 || pipeline.stages.len() >= MAX_STAGES {
        return Err(NormalizeError);
    }

    let file = if sed_file_form {
        first.argv[3].clone()
    } else {
        first.argv.last().cloned().unwrap_or_default()
    };
    if file.is_empty() {
        return Err(NormalizeError);
    }

    let mut stripped = first.clone();
    stripped.argv.pop();

    let mut stages = Vec::with_capacity(pipeline.stages.len() + 1);
    stages.push(Stage {
        kind: CmdKind::Cat,
        argv: vec!["cat".to_string(), file],
    });
    stages.push(stripped);
    stages.extend(pipeline.stages[1..].iter().cloned());
    Ok(Pipeline { stages })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_pipeline;

    fn normalize(cmd: &str) -> Result<Pipeline, NormalizeError> {
        normalize_file_input_pipeline(&parse_pipeline(cmd).unwrap())
    }

    fn rendered(p: &Pipeline) -> String {
        p.stages
            .iter()
            .map(|s| s.argv.join(" "))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    #[test]
    fn cat_head_passes_through() {
        let p = normalize("cat /tmp/f | head -n 2").unwrap();
        assert_eq!(rendered(&p), "cat /tmp/f | head -n 2");
    }

    #[test]
    fn bare_cat_passes_through() {
        let p = normalize("cat /tmp/f").unwrap();
        assert_eq!(rendered(&p), "cat /tmp/f");
    }

    #[test]
    fn head_file_is_rewritten() {
        let p = normalize("head -n 20 /tmp/f").unwrap();
        assert_eq!(rendered(&p), "cat /tmp/f | head -n 20");
        assert_eq!(p.stages[0].kind, CmdKind::Cat);
    }

    #[test]
    fn tail_and_nl_files_are_rewritten() {
        assert_eq!(rendered(&normalize("tail -n 5 /tmp/f").unwrap()), "cat /tmp/f | tail -n 5");
        assert_eq!(rendered(&normalize("nl /tmp/f").unwrap()), "cat /tmp/f | nl");
    }

    #[test]
    fn sed_addr_file_is_rewritten() {
        let p = normalize("sed -n 1,20p /tmp/f").unwrap();
        assert_eq!(rendered(&p), "cat /tmp/f | sed -n 1,20p");
    }

    #[test]
    fn sed_regex_file_is_rewritten() {
        let p = normalize("sed -n /needle/p /tmp/f").unwrap();
        assert_eq!(rendered(&p), "cat /tmp/f | sed -n /needle/p");
    }

    #[test]
    fn sed_subst_file_is_rewritten() {
        let p = normalize("sed -n s/a/b/g /tmp/f").unwrap();
        assert_eq!(rendered(&p), "cat /tmp/f | sed -n s/a/b/g");
    }

    #[test]
    fn sed_unsupported_script_is_not_a_file_form() {
        assert!(normalize("sed -n 5,2p /tmp/f").is_err());
        assert!(normalize("sed -n y/a/b/ /tmp/f").is_err());
    }

    #[test]
    fn rewritten_tail_of_pipeline_is_preserved() {
        let p = normalize("head -n 20 /tmp/f | wc -l").unwrap();
        assert_eq!(rendered(&p), "cat /tmp/f | head -n 20 | wc -l");
    }

    #[test]
    fn grep_file_form_is_not_rewritten() {
        // grep is not a rewritable first stage: its trailing arg is a
        // pattern, not a file.
        assert!(normalize("grep needle /tmp/f").is_err());
    }

    #[test]
    fn sort_first_is_an_error() {
        assert!(normalize("sort /tmp/f").is_err());
        assert!(normalize("wc -l").is_err());
    }

    #[test]
    fn bare_head_without_file_is_an_error() {
        assert!(normalize("head").is_err());
    }

    #[test]
    fn full_pipeline_cannot_grow_past_stage_cap() {
        assert!(normalize("nl /tmp/f | nl | nl | nl | nl | nl | nl | nl").is_err());
    }

    #[test]
    fn cat_with_extra_args_is_an_error() {
        // `cat a b` is neither the canonical shape nor rewritable.
        assert!(normalize("cat /tmp/a /tmp/b").is_err());
    }

    #[test]
    fn keyword_matches_wire_string() {
        assert_eq!(
            NormalizeError.to_string(),
            "mvp_requires: cat <FILE> (or head/tail/nl/sed ... <FILE>)"
        );
    }
}
