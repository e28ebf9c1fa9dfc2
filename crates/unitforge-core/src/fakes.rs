//! In-memory fakes for the oracle and toolchain traits (testing only)
//!
//! Provides `ScriptedOracle`, `ScriptedBuildRunner`, `ScriptedTestRunner` and
//! `StaticCoverageAnalyzer`. Each scripted fake is driven by a closure that
//! receives the zero-based call number, and counts its calls.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{ForgeError, Result};
use crate::oracle::{CodeTransformOracle, OracleError, OracleRequest};
use crate::toolchain::{BuildOutcome, BuildPlan, BuildRunner, CoverageAnalyzer, TestRun, TestRunner};

// ---------------------------------------------------------------------------
// ScriptedOracle
// ---------------------------------------------------------------------------

type OracleScript = dyn Fn(usize, &OracleRequest) -> std::result::Result<String, OracleError> + Send + Sync;

/// Oracle answering from a closure and recording every request.
pub struct ScriptedOracle {
    script: Box<OracleScript>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(usize, &OracleRequest) -> std::result::Result<String, OracleError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer `content`.
    pub fn echo(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new(move |_, _| Ok(content.clone()))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeTransformOracle for ScriptedOracle {
    async fn transform(&self, request: &OracleRequest) -> std::result::Result<String, OracleError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        (self.script)(call, request)
    }
}

// ---------------------------------------------------------------------------
// ScriptedBuildRunner
// ---------------------------------------------------------------------------

type BuildScript = dyn Fn(usize, &BuildPlan) -> BuildOutcome + Send + Sync;

/// Build runner answering from a closure and recording every plan it was given.
pub struct ScriptedBuildRunner {
    script: Box<BuildScript>,
    builds: Mutex<Vec<BuildPlan>>,
}

impl ScriptedBuildRunner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(usize, &BuildPlan) -> BuildOutcome + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            builds: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `failures` builds with `diagnostics`, then succeed.
    pub fn failing_times(failures: usize, diagnostics: impl Into<String>) -> Self {
        let diagnostics = diagnostics.into();
        Self::new(move |call, _| {
            if call < failures {
                BuildOutcome::failed(diagnostics.clone())
            } else {
                BuildOutcome::succeeded()
            }
        })
    }

    /// Fail every build with `diagnostics`.
    pub fn always_failing(diagnostics: impl Into<String>) -> Self {
        let diagnostics = diagnostics.into();
        Self::new(move |_, _| BuildOutcome::failed(diagnostics.clone()))
    }

    pub fn calls(&self) -> usize {
        self.builds.lock().unwrap().len()
    }

    /// Plans passed to each build, in call order.
    pub fn builds(&self) -> Vec<BuildPlan> {
        self.builds.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildRunner for ScriptedBuildRunner {
    async fn build(&self, plan: &BuildPlan) -> Result<BuildOutcome> {
        let call = {
            let mut builds = self.builds.lock().unwrap();
            builds.push(plan.clone());
            builds.len() - 1
        };
        Ok((self.script)(call, plan))
    }
}

// ---------------------------------------------------------------------------
// ScriptedTestRunner
// ---------------------------------------------------------------------------

type TestScript = dyn Fn(usize) -> TestRun + Send + Sync;

/// Test runner answering from a closure.
pub struct ScriptedTestRunner {
    script: Box<TestScript>,
    calls: Mutex<usize>,
}

impl ScriptedTestRunner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(usize) -> TestRun + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(0),
        }
    }

    /// Fail the first `failures` runs with `log`, then pass.
    pub fn failing_times(failures: usize, log: impl Into<String>) -> Self {
        let log = log.into();
        Self::new(move |call| {
            if call < failures {
                TestRun::failed(log.clone())
            } else {
                TestRun::passed("[  PASSED  ] all tests.")
            }
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TestRunner for ScriptedTestRunner {
    async fn run_tests(&self) -> Result<TestRun> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls - 1
        };
        Ok((self.script)(call))
    }
}

// ---------------------------------------------------------------------------
// StaticCoverageAnalyzer
// ---------------------------------------------------------------------------

/// Coverage analyzer returning fixed text, or reporting coverage unavailable.
#[derive(Debug)]
pub struct StaticCoverageAnalyzer {
    output: Option<String>,
    working_dir: PathBuf,
    calls: Mutex<usize>,
}

impl StaticCoverageAnalyzer {
    pub fn new(output: impl Into<String>, working_dir: impl AsRef<Path>) -> Self {
        Self {
            output: Some(output.into()),
            working_dir: working_dir.as_ref().to_path_buf(),
            calls: Mutex::new(0),
        }
    }

    pub fn unavailable(working_dir: impl AsRef<Path>) -> Self {
        Self {
            output: None,
            working_dir: working_dir.as_ref().to_path_buf(),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl CoverageAnalyzer for StaticCoverageAnalyzer {
    async fn collect(&self) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        self.output
            .clone()
            .ok_or_else(|| ForgeError::Toolchain("no coverage data".to_string()))
    }

    fn working_dir(&self) -> PathBuf {
        self.working_dir.clone()
    }
}
