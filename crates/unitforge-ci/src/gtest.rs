//! GoogleTest binary implementation of the test runner.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;
use unitforge_core::config::ToolchainConfig;
use unitforge_core::domain::{ForgeError, Result};
use unitforge_core::toolchain::{TestRun, TestRunner};

use crate::runner::CiRunner;
use crate::stage::{BuiltinStage, StageConfig};

/// Runs the compiled test binary inside the build directory.
pub struct GtestRunner {
    build_dir: PathBuf,
    toolchain: ToolchainConfig,
}

impl GtestRunner {
    pub fn new(build_dir: &Path, toolchain: ToolchainConfig) -> Self {
        Self {
            build_dir: build_dir.to_path_buf(),
            toolchain,
        }
    }
}

#[async_trait]
impl TestRunner for GtestRunner {
    async fn run_tests(&self) -> Result<TestRun> {
        let config =
            StageConfig::from_builtin(BuiltinStage::RunTests, &self.toolchain).in_dir(&self.build_dir);
        let result = CiRunner::execute_stage(&config)
            .await
            .map_err(|e| ForgeError::Toolchain(format!("{e:#}")))?;

        info!(
            passed = result.passed(),
            timed_out = result.timed_out,
            duration_ms = result.duration_ms,
            "test binary finished"
        );
        if result.passed() {
            Ok(TestRun::passed(result.stdout))
        } else {
            Ok(TestRun::failed(result.combined_output()))
        }
    }
}
