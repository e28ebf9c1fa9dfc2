//! Toolchain stage definitions and configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use unitforge_core::config::ToolchainConfig;

/// Builtin toolchain stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStage {
    /// cmake .
    CmakeConfigure,

    /// make
    Make,

    /// ./test_runner
    RunTests,

    /// gcov -pb (the note file is appended by the caller)
    Gcov,
}

impl BuiltinStage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStage::CmakeConfigure => "cmake_configure",
            BuiltinStage::Make => "make",
            BuiltinStage::RunTests => "run_tests",
            BuiltinStage::Gcov => "gcov",
        }
    }

    /// Get the stage's command for the given toolchain settings.
    ///
    /// Tool settings may carry their own arguments (`make -j8`); they are
    /// split on whitespace.
    pub fn command(&self, toolchain: &ToolchainConfig) -> Vec<String> {
        let mut command = match self {
            BuiltinStage::CmakeConfigure => split_tool(&toolchain.cmake),
            BuiltinStage::Make => split_tool(&toolchain.make),
            BuiltinStage::RunTests => vec![format!("./{}", toolchain.test_binary)],
            BuiltinStage::Gcov => split_tool(&toolchain.gcov),
        };
        match self {
            BuiltinStage::CmakeConfigure => command.push(".".to_string()),
            BuiltinStage::Gcov => command.push("-pb".to_string()),
            BuiltinStage::Make | BuiltinStage::RunTests => {}
        }
        command
    }

    /// Get the stage's timeout in seconds.
    pub fn timeout_secs(&self, toolchain: &ToolchainConfig) -> u64 {
        match self {
            BuiltinStage::CmakeConfigure => toolchain.configure_timeout_secs,
            BuiltinStage::Make => toolchain.build_timeout_secs,
            BuiltinStage::RunTests => toolchain.test_timeout_secs,
            BuiltinStage::Gcov => toolchain.coverage_timeout_secs,
        }
    }
}

fn split_tool(tool: &str) -> Vec<String> {
    tool.split_whitespace().map(str::to_string).collect()
}

/// Configuration for a toolchain stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Human-readable stage name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Directory to run in; the current directory when `None`.
    pub working_dir: Option<PathBuf>,

    /// Timeout in seconds (0 = none).
    pub timeout_secs: u64,
}

impl StageConfig {
    /// Create a new stage configuration from a builtin stage.
    pub fn from_builtin(stage: BuiltinStage, toolchain: &ToolchainConfig) -> Self {
        Self {
            name: stage.name().to_string(),
            command: stage.command(toolchain),
            working_dir: None,
            timeout_secs: stage.timeout_secs(toolchain),
        }
    }

    /// Create a custom stage configuration.
    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            working_dir: None,
            timeout_secs,
        }
    }

    /// Run this stage inside `dir`.
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    /// Append one argument to the command.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_stage_names() {
        assert_eq!(BuiltinStage::CmakeConfigure.name(), "cmake_configure");
        assert_eq!(BuiltinStage::Make.name(), "make");
        assert_eq!(BuiltinStage::RunTests.name(), "run_tests");
        assert_eq!(BuiltinStage::Gcov.name(), "gcov");
    }

    #[test]
    fn test_builtin_stage_commands() {
        let toolchain = ToolchainConfig::default();
        assert_eq!(BuiltinStage::CmakeConfigure.command(&toolchain), vec!["cmake", "."]);
        assert_eq!(BuiltinStage::Make.command(&toolchain), vec!["make"]);
        assert_eq!(BuiltinStage::RunTests.command(&toolchain), vec!["./test_runner"]);
        assert_eq!(BuiltinStage::Gcov.command(&toolchain), vec!["gcov", "-pb"]);
    }

    #[test]
    fn test_tool_settings_may_carry_arguments() {
        let toolchain = ToolchainConfig {
            make: "make -j8".to_string(),
            gcov: "llvm-cov gcov".to_string(),
            ..ToolchainConfig::default()
        };
        assert_eq!(BuiltinStage::Make.command(&toolchain), vec!["make", "-j8"]);
        assert_eq!(
            BuiltinStage::Gcov.command(&toolchain),
            vec!["llvm-cov", "gcov", "-pb"]
        );
    }

    #[test]
    fn test_stage_config_from_builtin_uses_stage_timeout() {
        let toolchain = ToolchainConfig {
            build_timeout_secs: 42,
            ..ToolchainConfig::default()
        };
        let config = StageConfig::from_builtin(BuiltinStage::Make, &toolchain);
        assert_eq!(config.name, "make");
        assert_eq!(config.timeout_secs, 42);
        assert!(config.working_dir.is_none());
    }

    #[test]
    fn test_stage_config_custom_in_dir_with_arg() {
        let config = StageConfig::custom("my_stage".to_string(), vec!["echo".to_string()], 60)
            .in_dir(Path::new("/tmp/build"))
            .arg("hello");
        assert_eq!(config.command, vec!["echo", "hello"]);
        assert_eq!(config.working_dir, Some(PathBuf::from("/tmp/build")));
    }
}
