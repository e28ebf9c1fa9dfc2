//! Diagnostic-to-artifact routing.
//!
//! Build diagnostics and test failure logs are either broadcast to every
//! artifact or routed only to the artifacts they mention. Attribution looks
//! for two kinds of evidence:
//! - file references such as `tests/test_calc.cpp:42:7: error: ...`
//! - GoogleTest failure lines such as `[  FAILED  ] CalcTest.Divides (0 ms)`,
//!   matched against the suites each artifact declares
//!
//! When nothing can be attributed the route falls back to broadcast.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::store::ArtifactStore;

/// Which artifacts receive a diagnostic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// Every artifact receives every diagnostic.
    #[default]
    Broadcast,
    /// Only artifacts referenced by the diagnostic, falling back to broadcast.
    Attributed,
}

impl RoutingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingPolicy::Broadcast => "broadcast",
            RoutingPolicy::Attributed => "attributed",
        }
    }
}

impl std::str::FromStr for RoutingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broadcast" => Ok(RoutingPolicy::Broadcast),
            "attributed" => Ok(RoutingPolicy::Attributed),
            other => Err(format!("unknown routing policy: {other}")),
        }
    }
}

/// The artifacts selected for one diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Store indices, ascending.
    pub targets: Vec<usize>,

    /// `true` when targets came from attribution rather than broadcast.
    pub attributed: bool,
}

fn file_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9_.+\-]+\.(?:cpp|cc|cxx|c|hpp|hh|hxx|h))\b")
            .expect("static regex")
    })
}

fn failed_case_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\[\s*FAILED\s*\]\s+(?:\w+/)?(\w+)\.\w+").expect("static regex")
    })
}

/// File names (final path component) referenced anywhere in `text`.
pub fn referenced_files(text: &str) -> BTreeSet<String> {
    file_reference_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Test suites reported as failed by GoogleTest in `log`.
pub fn failed_suites(log: &str) -> BTreeSet<String> {
    failed_case_pattern()
        .captures_iter(log)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn declares_suite(content: &str, suite: &str) -> bool {
    let pattern = format!(r"\bTEST(?:_F|_P)?\s*\(\s*{}\s*,", regex::escape(suite));
    Regex::new(&pattern)
        .map(|re| re.is_match(content))
        .unwrap_or(false)
}

/// Select the artifacts that should receive `diagnostics`.
pub fn route(policy: RoutingPolicy, diagnostics: &str, store: &ArtifactStore) -> Route {
    let broadcast = Route {
        targets: (0..store.len()).collect(),
        attributed: false,
    };
    if policy == RoutingPolicy::Broadcast {
        return broadcast;
    }

    let files = referenced_files(diagnostics);
    let suites = failed_suites(diagnostics);

    let targets: Vec<usize> = store
        .iter()
        .enumerate()
        .filter(|(_, artifact)| {
            files.contains(&artifact.file_name)
                || suites.iter().any(|s| declares_suite(&artifact.content, s))
        })
        .map(|(idx, _)| idx)
        .collect();

    if targets.is_empty() {
        broadcast
    } else {
        Route {
            targets,
            attributed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceUnit;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn store_with(dir: &std::path::Path) -> ArtifactStore {
        let mut store = ArtifactStore::new(dir);
        store
            .insert(
                Arc::new(SourceUnit::new("/src/calc.cpp", "")),
                "TEST(CalcTest, Adds) {}\nTEST(CalcTest, Divides) {}".to_string(),
            )
            .expect("insert");
        store
            .insert(
                Arc::new(SourceUnit::new("/src/stack.cpp", "")),
                "TEST_F(StackFixture, Pops) {}".to_string(),
            )
            .expect("insert");
        store
    }

    #[test]
    fn test_referenced_files_extracts_names() {
        let text = "/work/tests/test_calc.cpp:12:5: error: 'foo' was not declared\n\
                    In file included from ../codebase/stack.h:3,\n\
                    make[2]: *** [CMakeFiles/test_runner.dir/build.make:76] Error 1";
        let files = referenced_files(text);
        assert!(files.contains("test_calc.cpp"));
        assert!(files.contains("stack.h"));
        assert!(!files.contains("build.make"));
    }

    #[test]
    fn test_failed_suites_parses_gtest_summary() {
        let log = "[ RUN      ] CalcTest.Divides\n\
                   [  FAILED  ] CalcTest.Divides (0 ms)\n\
                   [  FAILED  ] Params/MathTest.Rounds/2, where GetParam() = 3\n\
                   [  PASSED  ] 4 tests.";
        let suites = failed_suites(log);
        assert_eq!(
            suites.into_iter().collect::<Vec<_>>(),
            vec!["CalcTest".to_string(), "MathTest".to_string()]
        );
    }

    #[test]
    fn test_broadcast_selects_everything() {
        let dir = tempdir().expect("tempdir");
        let store = store_with(dir.path());
        let route = route(RoutingPolicy::Broadcast, "test_calc.cpp:1: error", &store);
        assert_eq!(route.targets, vec![0, 1]);
        assert!(!route.attributed);
    }

    #[test]
    fn test_attributed_by_file_reference() {
        let dir = tempdir().expect("tempdir");
        let store = store_with(dir.path());
        let route = route(
            RoutingPolicy::Attributed,
            "/out/test_stack.cpp:3:1: error: expected ';'",
            &store,
        );
        assert_eq!(route.targets, vec![1]);
        assert!(route.attributed);
    }

    #[test]
    fn test_attributed_by_failed_suite() {
        let dir = tempdir().expect("tempdir");
        let store = store_with(dir.path());
        let route = route(
            RoutingPolicy::Attributed,
            "[  FAILED  ] CalcTest.Divides (1 ms)",
            &store,
        );
        assert_eq!(route.targets, vec![0]);
        assert!(route.attributed);
    }

    #[test]
    fn test_attribution_falls_back_to_broadcast() {
        let dir = tempdir().expect("tempdir");
        let store = store_with(dir.path());
        let route = route(
            RoutingPolicy::Attributed,
            "collect2: error: ld returned 1 exit status",
            &store,
        );
        assert_eq!(route.targets, vec![0, 1]);
        assert!(!route.attributed);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("Attributed".parse::<RoutingPolicy>(), Ok(RoutingPolicy::Attributed));
        assert_eq!("broadcast".parse::<RoutingPolicy>(), Ok(RoutingPolicy::Broadcast));
        assert!("nearest".parse::<RoutingPolicy>().is_err());
    }
}
