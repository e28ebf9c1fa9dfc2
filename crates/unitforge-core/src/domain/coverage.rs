//! Structured line-coverage data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Line coverage for one instrumented source file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    /// Executed lines as a percentage (0.0 – 100.0).
    pub percentage: f64,

    /// Instrumented lines in the file.
    pub total_lines: u64,
}

/// Coverage keyed by absolute source path. Only paths under the scanned
/// project root are ever inserted by the parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageRecord {
    files: BTreeMap<PathBuf, FileCoverage>,
}

impl CoverageRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `path`.
    pub fn insert(&mut self, path: PathBuf, coverage: FileCoverage) {
        self.files.insert(path, coverage);
    }

    pub fn get(&self, path: &Path) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FileCoverage)> {
        self.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_existing_entry() {
        let mut record = CoverageRecord::new();
        let path = PathBuf::from("/root/src/a.cpp");
        record.insert(
            path.clone(),
            FileCoverage {
                percentage: 10.0,
                total_lines: 5,
            },
        );
        record.insert(
            path.clone(),
            FileCoverage {
                percentage: 80.0,
                total_lines: 5,
            },
        );
        assert_eq!(record.len(), 1);
        assert_eq!(record.get(&path).map(|c| c.percentage), Some(80.0));
    }

    #[test]
    fn test_record_serializes_as_path_map() {
        let mut record = CoverageRecord::new();
        record.insert(
            PathBuf::from("/root/src/a.cpp"),
            FileCoverage {
                percentage: 55.5,
                total_lines: 200,
            },
        );
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["/root/src/a.cpp"]["percentage"], 55.5);
        assert_eq!(json["/root/src/a.cpp"]["totalLines"], 200);
    }
}
