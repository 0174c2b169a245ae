// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

/// One file the `execute` tool may read.
#[derive(Debug, Clone)]
pub struct AllowedFile {
    /// Canonical absolute path — the sole key the access gate compares.
    pub path: String,
    /// Display name (the final path component as given by the user).
    pub name: String,
    pub size_bytes: u64,
}

/// The set of files the model may read. Built once by the CLI before the
/// loop starts; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    files: Vec<AllowedFile>,
}

impl Allowlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalize `path`, stat it, and add it. Fails when the file does
    /// not exist or is not a regular file.
    pub fn add_path(&mut self, path: &Path) -> std::io::Result<()> {
        let canonical = std::fs::canonicalize(path)?;
        let md = std::fs::metadata(&canonical)?;
        if !md.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.files.push(AllowedFile {
            path: canonical.to_string_lossy().into_owned(),
            name,
            size_bytes: md.len(),
        });
        Ok(())
    }

    /// Byte-exact membership test against canonical paths. No prefix or
    /// substring matching: `/tmp/a` does not admit `/tmp/a.txt`.
    pub fn contains(&self, canonical_path: &str) -> bool {
        self.files.iter().any(|f| f.path == canonical_path)
    }

    pub fn files(&self) -> &[AllowedFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn add_and_contains_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hi").unwrap();

        let mut allow = Allowlist::new();
        allow.add_path(&path).unwrap();
        assert_eq!(allow.len(), 1);

        let canonical = std::fs::canonicalize(&path).unwrap();
        assert!(allow.contains(&canonical.to_string_lossy()));
    }

    #[test]
    fn no_prefix_or_substring_matching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hi").unwrap();

        let mut allow = Allowlist::new();
        allow.add_path(&path).unwrap();

        let canonical = std::fs::canonicalize(&path).unwrap();
        let canonical = canonical.to_string_lossy();
        assert!(!allow.contains(&canonical[..canonical.len() - 1]));
        assert!(!allow.contains(&format!("{canonical}x")));
        assert!(!allow.contains("a.txt"));
    }

    #[test]
    fn symlink_resolves_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.txt");
        std::fs::File::create(&target).unwrap().write_all(b"x").unwrap();
        let link = dir.path().join("link.txt");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &link).unwrap();
        #[cfg(not(unix))]
        return;

        let mut allow = Allowlist::new();
        allow.add_path(&link).unwrap();
        // The stored key is the resolved target, so the link's own path is
        // not a member but the target's canonical path is.
        let canonical_target = std::fs::canonicalize(&target).unwrap();
        assert!(allow.contains(&canonical_target.to_string_lossy()));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut allow = Allowlist::new();
        assert!(allow.add_path(&dir.path().join("absent.txt")).is_err());
        assert!(allow.is_empty());
    }

    #[test]
    fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut allow = Allowlist::new();
        assert!(allow.add_path(dir.path()).is_err());
    }

    #[test]
    fn records_name_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::File::create(&path).unwrap().write_all(&[0u8; 42]).unwrap();

        let mut allow = Allowlist::new();
        allow.add_path(&path).unwrap();
        let f = &allow.files()[0];
        assert_eq!(f.name, "data.bin");
        assert_eq!(f.size_bytes, 42);
    }
}
