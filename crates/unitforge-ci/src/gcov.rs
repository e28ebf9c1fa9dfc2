//! gcov implementation of the coverage analyzer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use unitforge_core::config::ToolchainConfig;
use unitforge_core::domain::{ForgeError, Result};
use unitforge_core::toolchain::CoverageAnalyzer;

use crate::runner::CiRunner;
use crate::stage::{BuiltinStage, StageConfig};

/// Every `*.gcno` file under `build_dir`, relative to it, sorted.
pub fn find_coverage_notes(build_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut notes = Vec::new();
    collect_notes(build_dir, build_dir, &mut notes)?;
    notes.sort();
    Ok(notes)
}

fn collect_notes(root: &Path, dir: &Path, notes: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_notes(root, &path, notes)?;
        } else if path.extension().is_some_and(|e| e == "gcno") {
            if let Ok(relative) = path.strip_prefix(root) {
                notes.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}

/// Runs `gcov -pb <note>` in the build directory for every note file and
/// concatenates the outputs.
pub struct GcovAnalyzer {
    build_dir: PathBuf,
    toolchain: ToolchainConfig,
}

impl GcovAnalyzer {
    pub fn new(build_dir: &Path, toolchain: ToolchainConfig) -> Self {
        Self {
            build_dir: build_dir.to_path_buf(),
            toolchain,
        }
    }
}

#[async_trait]
impl CoverageAnalyzer for GcovAnalyzer {
    async fn collect(&self) -> Result<String> {
        let notes = find_coverage_notes(&self.build_dir)?;
        if notes.is_empty() {
            return Err(ForgeError::Toolchain(format!(
                "no .gcno files under {}",
                self.build_dir.display()
            )));
        }

        let mut output = String::new();
        for note in &notes {
            let config = StageConfig::from_builtin(BuiltinStage::Gcov, &self.toolchain)
                .arg(note.to_string_lossy())
                .in_dir(&self.build_dir);
            let result = CiRunner::execute_stage(&config)
                .await
                .map_err(|e| ForgeError::Toolchain(format!("{e:#}")))?;

            if !result.passed() {
                warn!(note = %note.display(), exit_code = result.exit_code, "gcov failed for note file");
                continue;
            }
            debug!(note = %note.display(), "gcov collected");
            output.push_str(&result.stdout);
            if !output.ends_with('\n') {
                output.push('\n');
            }
        }
        Ok(output)
    }

    fn working_dir(&self) -> PathBuf {
        self.build_dir.clone()
    }
}
