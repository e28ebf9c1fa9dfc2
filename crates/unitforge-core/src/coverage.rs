//! Parser for gcov-style textual coverage summaries.
//!
//! The input is a sequence of blocks, each opened by a `File '<path>'` line and
//! normally followed, possibly after other lines, by
//! `Lines executed:<P>% of <N>`. A summary is attributed to the most recent
//! file line only; tracking resets after every summary, so a file block that
//! lacks its summary yields nothing and never steals the next block's numbers.
//! Paths outside the project source root (system headers, tool noise) are
//! dropped.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{CoverageRecord, FileCoverage};

fn file_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^File '(.+)'\s*$").expect("static regex"))
}

fn summary_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^Lines executed:\s*(\d+(?:\.\d+)?)% of (\d+)").expect("static regex")
    })
}

/// Turns raw coverage text into a [`CoverageRecord`] scoped to a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageParser {
    source_root: PathBuf,
    base_dir: PathBuf,
}

impl CoverageParser {
    /// `source_root` bounds which files are kept; relative file paths in the
    /// text resolve against `base_dir` (where the coverage tool ran).
    pub fn new(source_root: impl AsRef<Path>, base_dir: impl AsRef<Path>) -> Self {
        Self {
            source_root: normalize(source_root.as_ref()),
            base_dir: normalize(base_dir.as_ref()),
        }
    }

    /// Parse `raw`. Pure: the same input always yields the same record.
    pub fn parse(&self, raw: &str) -> CoverageRecord {
        let mut record = CoverageRecord::new();
        let mut current: Option<PathBuf> = None;

        for line in raw.lines() {
            let line = line.trim_end_matches('\r');

            if let Some(caps) = file_line_pattern().captures(line) {
                current = caps.get(1).map(|m| self.resolve(m.as_str()));
                continue;
            }

            let Some(caps) = summary_line_pattern().captures(line) else {
                continue;
            };
            let Some(file) = current.take() else {
                continue;
            };
            if !file.starts_with(&self.source_root) {
                continue;
            }

            let percentage = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
            let total_lines = caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok());
            if let (Some(percentage), Some(total_lines)) = (percentage, total_lines) {
                record.insert(
                    file,
                    FileCoverage {
                        percentage,
                        total_lines,
                    },
                );
            }
        }

        record
    }

    fn resolve(&self, raw_path: &str) -> PathBuf {
        let path = Path::new(raw_path);
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.base_dir.join(path))
        }
    }
}

/// Lexically resolve `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CoverageParser {
        CoverageParser::new("/work/project", "/work/project/build")
    }

    #[test]
    fn test_keeps_in_root_and_drops_system_headers() {
        let raw = "\
File '/usr/include/foo.h'
Lines executed:90.00% of 10
Creating 'foo.h.gcov'

File '/work/project/src/bar.cpp'
Lines executed:55.50% of 200
Branches executed:40.00% of 20
Creating 'bar.cpp.gcov'
";
        let record = parser().parse(raw);
        assert_eq!(record.len(), 1);
        let bar = record
            .get(Path::new("/work/project/src/bar.cpp"))
            .expect("bar.cpp entry");
        assert_eq!(bar.percentage, 55.5);
        assert_eq!(bar.total_lines, 200);
        assert!(record.get(Path::new("/usr/include/foo.h")).is_none());
    }

    #[test]
    fn test_block_without_summary_is_skipped_not_misattributed() {
        let raw = "\
File '/work/project/src/empty.cpp'
No executable lines
File '/work/project/src/real.cpp'
Lines executed:75.00% of 8
";
        let record = parser().parse(raw);
        assert_eq!(record.len(), 1);
        assert!(record.get(Path::new("/work/project/src/empty.cpp")).is_none());
        assert_eq!(
            record
                .get(Path::new("/work/project/src/real.cpp"))
                .map(|c| c.percentage),
            Some(75.0)
        );
    }

    #[test]
    fn test_summary_without_file_line_is_ignored() {
        let raw = "Lines executed:12.00% of 25\nFile '/work/project/a.cpp'\n";
        assert!(parser().parse(raw).is_empty());
    }

    #[test]
    fn test_second_summary_after_reset_is_ignored() {
        let raw = "\
File '/work/project/a.cpp'
Lines executed:10.00% of 10
Lines executed:99.00% of 10
";
        let record = parser().parse(raw);
        assert_eq!(
            record.get(Path::new("/work/project/a.cpp")).map(|c| c.percentage),
            Some(10.0)
        );
    }

    #[test]
    fn test_out_of_root_summary_resets_tracking() {
        let raw = "\
File '/opt/vendor/lib.cpp'
Lines executed:50.00% of 4
Lines executed:60.00% of 4
";
        assert!(parser().parse(raw).is_empty());
    }

    #[test]
    fn test_relative_paths_resolve_against_base_dir() {
        let raw = "\
File '../src/calc.cpp'
Lines executed:100.00% of 12
File '../../elsewhere/x.cpp'
Lines executed:100.00% of 3
";
        let record = parser().parse(raw);
        assert_eq!(record.len(), 1);
        assert!(record.get(Path::new("/work/project/src/calc.cpp")).is_some());
    }

    #[test]
    fn test_sibling_directory_with_common_prefix_is_outside_root() {
        let raw = "File '/work/project-old/a.cpp'\nLines executed:10.00% of 1\n";
        assert!(parser().parse(raw).is_empty());
    }

    #[test]
    fn test_crlf_and_integer_percentages() {
        let raw = "File '/work/project/a.cpp'\r\nLines executed:100% of 7\r\n";
        let record = parser().parse(raw);
        assert_eq!(
            record.get(Path::new("/work/project/a.cpp")).map(|c| c.total_lines),
            Some(7)
        );
    }

    #[test]
    fn test_parse_is_idempotent() {
        let raw = "\
File '/work/project/src/a.cpp'
Lines executed:33.33% of 3
File '/usr/include/c++/vector'
Lines executed:1.00% of 100
File '/work/project/src/b.cpp'
Lines executed:0.00% of 9
";
        let parser = parser();
        let first = parser.parse(raw);
        let second = parser.parse(raw);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_normalize_collapses_dots() {
        assert_eq!(
            normalize(Path::new("/work/project/build/./../src/a.cpp")),
            PathBuf::from("/work/project/src/a.cpp")
        );
    }
}
