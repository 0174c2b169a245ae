// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Configuration discovery and loading.
//!
//! Precedence, lowest to highest:
//! 1. built-in defaults,
//! 2. `~/.config/aicli/config.yaml` (only when its permissions are safe),
//! 3. environment variables (`AICLI_MODEL`, `OPENAI_BASE_URL`,
//!    `AICLI_SEARCH_PROVIDER`, `AICLI_DEBUG_API`, `AICLI_DEBUG_FUNCTION_CALL`),
//! 4. an explicit `--config PATH` (replaces step 2 and skips the permission
//!    check opt-out: an explicit path must still be secure).

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::{Config, SearchProvider};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("config file {0}: {1}")]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("config file {0} is group/world accessible; refusing to read it (chmod 600)")]
    InsecurePermissions(PathBuf),
}

/// Load the effective configuration.
///
/// `explicit_path` comes from `--config`; when `None` the default location is
/// probed and silently skipped if absent.
pub fn load(explicit_path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match explicit_path {
        Some(p) => read_file(p)?,
        None => match default_config_path() {
            Some(p) if p.exists() => read_file(&p)?,
            _ => Config::default(),
        },
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("aicli").join("config.yaml"))
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let md = std::fs::metadata(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    if !permissions_are_private(&md) {
        return Err(ConfigError::InsecurePermissions(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let config =
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// The config file may name API-key environment variables; refuse files that
/// other users could have written or can read.
#[cfg(unix)]
fn permissions_are_private(md: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    md.is_file() && md.uid() == unsafe { libc::getuid() } && md.mode() & 0o077 == 0
}

#[cfg(not(unix))]
fn permissions_are_private(md: &std::fs::Metadata) -> bool {
    md.is_file()
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(model) = std::env::var("AICLI_MODEL") {
        if !model.is_empty() {
            config.llm.model = model;
        }
    }
    if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
        if !url.is_empty() {
            config.llm.base_url = url;
        }
    }
    if let Ok(provider) = std::env::var("AICLI_SEARCH_PROVIDER") {
        match provider.parse::<SearchProvider>() {
            Ok(p) => config.search.provider = p,
            Err(()) if !provider.is_empty() => {
                warn!(provider = %provider, "unknown AICLI_SEARCH_PROVIDER, keeping configured value");
            }
            Err(()) => {}
        }
    }
    if let Some(level) = parse_debug_level("AICLI_DEBUG_API") {
        config.debug.api = level;
    }
    if let Some(level) = parse_debug_level("AICLI_DEBUG_FUNCTION_CALL") {
        config.debug.function_call = level;
    }
}

/// A bare non-numeric value (e.g. `AICLI_DEBUG_API=1x` typo'd or `=yes`)
/// enables level 1 rather than being ignored.
fn parse_debug_level(var: &str) -> Option<u8> {
    let raw = std::env::var(var).ok()?;
    if raw.is_empty() || raw == "0" {
        return None;
    }
    Some(raw.parse::<u8>().unwrap_or(1))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[cfg(unix)]
    fn write_config(dir: &tempfile::TempDir, mode: u32, contents: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("config.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn private_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, 0o600, "llm:\n  model: test-model\n");
        let c = load(Some(&path)).unwrap();
        assert_eq!(c.llm.model, "test-model");
    }

    #[cfg(unix)]
    #[test]
    fn group_readable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, 0o640, "llm:\n  model: leaky\n");
        let err = load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::InsecurePermissions(_)));
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, 0o644, "llm:\n  model: leaky\n");
        assert!(load(Some(&path)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, 0o600, "llm: [not a map\n");
        let err = load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(load(Some(&path)).is_err());
    }
}
