//! CMake + make implementation of the build runner.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};
use unitforge_core::config::ToolchainConfig;
use unitforge_core::domain::{ForgeError, Result};
use unitforge_core::toolchain::{BuildOutcome, BuildPlan, BuildRunner};

use crate::descriptor::write_descriptor;
use crate::runner::CiRunner;
use crate::stage::{BuiltinStage, StageConfig};

/// Writes the descriptor into the build directory, then runs `cmake .` and
/// `make` there.
pub struct CmakeBuildRunner {
    build_dir: PathBuf,
    toolchain: ToolchainConfig,
    extensions: Vec<String>,
}

impl CmakeBuildRunner {
    pub fn new(build_dir: &Path, toolchain: ToolchainConfig, extensions: Vec<String>) -> Self {
        Self {
            build_dir: build_dir.to_path_buf(),
            toolchain,
            extensions,
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }
}

#[async_trait]
impl BuildRunner for CmakeBuildRunner {
    async fn build(&self, plan: &BuildPlan) -> Result<BuildOutcome> {
        write_descriptor(
            &self.build_dir,
            plan,
            &self.toolchain.test_binary,
            &self.extensions,
        )
        .map_err(|e| ForgeError::Toolchain(format!("{e:#}")))?;

        for stage in [BuiltinStage::CmakeConfigure, BuiltinStage::Make] {
            let config = StageConfig::from_builtin(stage, &self.toolchain).in_dir(&self.build_dir);
            let result = CiRunner::execute_stage(&config)
                .await
                .map_err(|e| ForgeError::Toolchain(format!("{e:#}")))?;

            if !result.passed() {
                warn!(
                    stage = stage.name(),
                    exit_code = result.exit_code,
                    timed_out = result.timed_out,
                    "build stage failed"
                );
                return Ok(BuildOutcome::failed(result.combined_output()));
            }
            info!(stage = stage.name(), duration_ms = result.duration_ms, "build stage passed");
        }

        Ok(BuildOutcome::succeeded())
    }
}
