//! Discovered source files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Source extensions replaced by `.cpp` when naming the generated test file.
const RENAMED_EXTENSIONS: [&str; 4] = ["cpp", "cc", "cxx", "c"];

/// One discovered compilable source file. Immutable once scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Absolute path of the file.
    pub path: PathBuf,

    /// File name (e.g. `calculator.cpp`).
    pub name: String,

    /// Raw file content at scan time.
    pub content: String,
}

impl SourceUnit {
    /// Create a source unit; the name is taken from the path's final component.
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            content: content.into(),
        }
    }

    /// Directory holding this source file.
    pub fn dir(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// Default test file name: `test_<stem>.cpp`.
    pub fn artifact_file_name(&self) -> String {
        artifact_file_name(&self.name)
    }
}

/// Map a source file name to its test file name.
///
/// `math.cc` becomes `test_math.cpp`; names without a recognised C/C++
/// extension keep their name and gain a `.cpp` suffix.
pub fn artifact_file_name(source_name: &str) -> String {
    let path = Path::new(source_name);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext {
        Some(ext) if RENAMED_EXTENSIONS.contains(&ext.as_str()) => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("test_{stem}.cpp")
        }
        _ => format!("test_{source_name}.cpp"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unit_name_from_path() {
        let unit = SourceUnit::new("/work/src/calculator.cpp", "int add();");
        assert_eq!(unit.name, "calculator.cpp");
        assert_eq!(unit.dir(), Some(Path::new("/work/src")));
    }

    #[test]
    fn test_artifact_file_name_replaces_extension() {
        assert_eq!(artifact_file_name("calculator.cpp"), "test_calculator.cpp");
        assert_eq!(artifact_file_name("parser.cc"), "test_parser.cpp");
        assert_eq!(artifact_file_name("vec.cxx"), "test_vec.cpp");
        assert_eq!(artifact_file_name("ring.c"), "test_ring.cpp");
    }

    #[test]
    fn test_artifact_file_name_unknown_extension() {
        assert_eq!(artifact_file_name("weird.inl"), "test_weird.inl.cpp");
    }
}
