//! unitforge CI - external toolchain stages
//!
//! Implements the core toolchain traits with real subprocesses:
//! - `CmakeBuildRunner`: writes `CMakeLists.txt`, runs `cmake .` then `make`
//! - `GtestRunner`: runs the compiled GoogleTest binary
//! - `GcovAnalyzer`: runs `gcov -pb` for every coverage note file
//!
//! Every subprocess is deadline-bound; a timeout is a failed outcome.

pub mod cmake;
pub mod descriptor;
pub mod gcov;
pub mod gtest;
pub mod runner;
pub mod stage;

// Re-export key types
pub use cmake::CmakeBuildRunner;
pub use descriptor::{render_cmake_lists, write_descriptor};
pub use gcov::{find_coverage_notes, GcovAnalyzer};
pub use gtest::GtestRunner;
pub use runner::{CiRunner, StageResult};
pub use stage::{BuiltinStage, StageConfig};

use std::sync::Arc;

use unitforge_core::config::ForgeConfig;
use unitforge_core::toolchain::Toolchain;

/// Subprocess-backed toolchain rooted at `build_dir`.
pub fn cmake_toolchain(config: &ForgeConfig, build_dir: &std::path::Path) -> Toolchain {
    Toolchain::new(
        Arc::new(CmakeBuildRunner::new(
            build_dir,
            config.toolchain.clone(),
            config.scan.extensions.clone(),
        )),
        Arc::new(GtestRunner::new(build_dir, config.toolchain.clone())),
        Arc::new(GcovAnalyzer::new(build_dir, config.toolchain.clone())),
    )
}
