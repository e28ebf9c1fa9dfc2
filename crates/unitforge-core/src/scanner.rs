//! Recursive discovery of eligible source files.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ScanConfig;
use crate::domain::{ForgeError, Result, SourceUnit};

/// Rules for one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Eligible extensions without the dot, compared case-insensitively.
    pub extensions: Vec<String>,

    /// Directory names never descended into.
    pub excluded_dirs: Vec<String>,

    /// Absolute directories never descended into (output and build dirs).
    pub excluded_paths: Vec<PathBuf>,
}

impl ScanOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excluded_dirs: config.excluded_dirs.clone(),
            excluded_paths: Vec::new(),
        }
    }

    /// Also skip `dir` (and its name) while scanning.
    pub fn exclude_path(mut self, dir: &Path) -> Self {
        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            if !self.excluded_dirs.iter().any(|d| d == name) {
                self.excluded_dirs.push(name.to_string());
            }
        }
        self.excluded_paths
            .push(std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()));
        self
    }

    fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn skips_dir(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        name.starts_with('.')
            || self.excluded_dirs.iter().any(|d| d.as_str() == name)
            || self.excluded_paths.iter().any(|p| p == path)
    }
}

/// Scan `root` recursively and return every eligible file, sorted by path.
///
/// The root is canonicalized first, so every returned path is absolute.
pub fn scan_sources(root: &Path, options: &ScanOptions) -> Result<Vec<SourceUnit>> {
    let root = std::fs::canonicalize(root)?;
    if !root.is_dir() {
        return Err(ForgeError::NoSourcesFound(root));
    }

    info!(root = %root.display(), "scanning for source files");
    let mut units = Vec::new();
    scan_dir(&root, options, &mut units)?;
    info!(count = units.len(), "source scan complete");
    Ok(units)
}

fn scan_dir(dir: &Path, options: &ScanOptions, units: &mut Vec<SourceUnit>) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if options.skips_dir(&path) {
                debug!(dir = %path.display(), "skipping directory");
                continue;
            }
            scan_dir(&path, options, units)?;
        } else if file_type.is_file() && options.is_eligible(&path) {
            let bytes = std::fs::read(&path)?;
            let content = String::from_utf8_lossy(&bytes).into_owned();
            units.push(SourceUnit::new(path, content));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write");
    }

    fn options() -> ScanOptions {
        ScanOptions::from_config(&ScanConfig::default())
    }

    #[test]
    fn test_scan_finds_eligible_files_recursively() {
        let dir = tempdir().expect("tempdir");
        write(&dir.path().join("calc.cpp"), "int add();");
        write(&dir.path().join("net/socket.cc"), "void open();");
        write(&dir.path().join("legacy/ring.c"), "int push();");
        write(&dir.path().join("calc.h"), "int add();");
        write(&dir.path().join("README.md"), "# docs");

        let units = scan_sources(dir.path(), &options()).expect("scan");
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["calc.cpp", "ring.c", "socket.cc"]);
        assert!(units.iter().all(|u| u.path.is_absolute()));
        assert_eq!(units[0].content, "int add();");
    }

    #[test]
    fn test_scan_skips_build_test_and_hidden_dirs() {
        let dir = tempdir().expect("tempdir");
        write(&dir.path().join("src/core.cpp"), "");
        write(&dir.path().join("build/CMakeFiles/gen.cpp"), "");
        write(&dir.path().join("tests/test_core.cpp"), "");
        write(&dir.path().join("node_modules/x/y.cpp"), "");
        write(&dir.path().join(".git/hooks/z.cpp"), "");

        let units = scan_sources(dir.path(), &options()).expect("scan");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "core.cpp");
    }

    #[test]
    fn test_scan_skips_configured_output_dir() {
        let dir = tempdir().expect("tempdir");
        write(&dir.path().join("lib.cpp"), "");
        write(&dir.path().join("generated/test_lib.cpp"), "");

        let options = options().exclude_path(&dir.path().join("generated"));
        let units = scan_sources(dir.path(), &options).expect("scan");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "lib.cpp");
    }

    #[test]
    fn test_scan_extension_match_is_case_insensitive() {
        let dir = tempdir().expect("tempdir");
        write(&dir.path().join("Widget.CPP"), "");
        let units = scan_sources(dir.path(), &options()).expect("scan");
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_scan_missing_root_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let err = scan_sources(&dir.path().join("absent"), &options()).expect_err("should fail");
        assert!(matches!(err, ForgeError::Io(_)));
    }

    #[test]
    fn test_scan_empty_project_returns_nothing() {
        let dir = tempdir().expect("tempdir");
        let units = scan_sources(dir.path(), &options()).expect("scan");
        assert!(units.is_empty());
    }
}
