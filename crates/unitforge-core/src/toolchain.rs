//! External toolchain seams: build tool, test binary and coverage tool.
//!
//! The core only relies on the textual contract of each tool; concrete
//! subprocess-backed implementations live in the `unitforge-ci` crate.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Result;

/// Inputs of one build: the artifact files plus the source directories whose
/// files are compiled alongside them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub artifact_paths: Vec<PathBuf>,
    pub source_dirs: Vec<PathBuf>,
}

impl BuildPlan {
    pub fn new(artifact_paths: Vec<PathBuf>, source_dirs: Vec<PathBuf>) -> Self {
        Self {
            artifact_paths,
            source_dirs,
        }
    }
}

/// Outcome of one build attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub success: bool,

    /// Combined stdout/stderr; present only on failure.
    pub diagnostics: Option<String>,
}

impl BuildOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            diagnostics: None,
        }
    }

    pub fn failed(diagnostics: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostics: Some(diagnostics.into()),
        }
    }

    /// Diagnostic text, empty on success.
    pub fn diagnostic_text(&self) -> &str {
        self.diagnostics.as_deref().unwrap_or("")
    }
}

/// Outcome of one execution of the compiled test binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    /// `true` when every case passed (zero exit status).
    pub passed: bool,

    /// Captured output of the binary.
    pub output: String,
}

impl TestRun {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: output.into(),
        }
    }
}

/// Builds the test binary described by a [`BuildPlan`].
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Build against the fixed build directory. Timeouts are reported as a
    /// failed outcome; `Err` is reserved for the tool being unusable.
    async fn build(&self, plan: &BuildPlan) -> Result<BuildOutcome>;
}

/// Runs the compiled test binary.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_tests(&self) -> Result<TestRun>;
}

/// Produces raw coverage text for the last test execution.
#[async_trait]
pub trait CoverageAnalyzer: Send + Sync {
    /// Concatenated coverage tool output. `Err` means coverage is unavailable.
    async fn collect(&self) -> Result<String>;

    /// Directory the coverage tool ran in; relative paths in its output
    /// resolve against it.
    fn working_dir(&self) -> PathBuf;
}

/// The three external tools one pipeline run drives.
#[derive(Clone)]
pub struct Toolchain {
    pub builder: Arc<dyn BuildRunner>,
    pub tests: Arc<dyn TestRunner>,
    pub coverage: Arc<dyn CoverageAnalyzer>,
}

impl Toolchain {
    pub fn new(
        builder: Arc<dyn BuildRunner>,
        tests: Arc<dyn TestRunner>,
        coverage: Arc<dyn CoverageAnalyzer>,
    ) -> Self {
        Self {
            builder,
            tests,
            coverage,
        }
    }
}

#[async_trait]
impl<T: BuildRunner + ?Sized> BuildRunner for Arc<T> {
    async fn build(&self, plan: &BuildPlan) -> Result<BuildOutcome> {
        (**self).build(plan).await
    }
}

#[async_trait]
impl<T: TestRunner + ?Sized> TestRunner for Arc<T> {
    async fn run_tests(&self) -> Result<TestRun> {
        (**self).run_tests().await
    }
}

#[async_trait]
impl<T: CoverageAnalyzer + ?Sized> CoverageAnalyzer for Arc<T> {
    async fn collect(&self) -> Result<String> {
        (**self).collect().await
    }

    fn working_dir(&self) -> PathBuf {
        (**self).working_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_outcome_constructors() {
        let ok = BuildOutcome::succeeded();
        assert!(ok.success);
        assert!(ok.diagnostics.is_none());
        assert_eq!(ok.diagnostic_text(), "");

        let failed = BuildOutcome::failed("error: expected ';'");
        assert!(!failed.success);
        assert_eq!(failed.diagnostic_text(), "error: expected ';'");
    }

    #[test]
    fn test_test_run_constructors() {
        assert!(TestRun::passed("[  PASSED  ] 3 tests.").passed);
        assert!(!TestRun::failed("[  FAILED  ] A.B").passed);
    }
}
