//! Pipeline configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! environment variables (oracle connection only), then CLI flags applied by
//! the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{ForgeError, Result};
use crate::routing::RoutingPolicy;

/// Environment variable holding the oracle endpoint.
pub const ENV_ORACLE_ENDPOINT: &str = "UNITFORGE_ORACLE_ENDPOINT";
/// Environment variable holding the oracle model name.
pub const ENV_ORACLE_MODEL: &str = "UNITFORGE_ORACLE_MODEL";
/// Environment variable holding the oracle bearer token.
pub const ENV_ORACLE_TOKEN: &str = "UNITFORGE_ORACLE_TOKEN";
/// Fallback token variable for GitHub-hosted model endpoints.
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
/// Unprefixed endpoint variable found in existing `.env` files.
pub const ENV_LEGACY_ENDPOINT: &str = "ENDPOINT";
/// Unprefixed model variable found in existing `.env` files.
pub const ENV_LEGACY_MODEL: &str = "MODEL_NAME";

/// Output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory receiving generated test files (default: `<project>/tests`).
    pub output_dir: Option<PathBuf>,

    /// Directory holding the project descriptor and build products
    /// (default: `<project>/build`).
    pub build_dir: Option<PathBuf>,

    /// Report file name inside the output directory.
    pub report_file: String,

    /// Journal file name inside the output directory.
    pub journal_file: String,

    /// Optional directory with system-instruction overrides.
    pub instructions_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            build_dir: None,
            report_file: "test_report.json".to_string(),
            journal_file: "run_journal.json".to_string(),
            instructions_dir: None,
        }
    }
}

impl PathsConfig {
    pub fn resolve_output_dir(&self, project: &Path) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| project.join("tests"))
    }

    pub fn resolve_build_dir(&self, project: &Path) -> PathBuf {
        self.build_dir
            .clone()
            .unwrap_or_else(|| project.join("build"))
    }
}

/// Source discovery rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Eligible file extensions, without the dot.
    pub extensions: Vec<String>,

    /// Directory names never descended into.
    pub excluded_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: ["cpp", "cc", "cxx", "c"].map(String::from).to_vec(),
            excluded_dirs: ["build", "tests", "node_modules"].map(String::from).to_vec(),
        }
    }
}

/// Oracle connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of the chat-completions service.
    pub endpoint: Option<String>,

    /// Model identifier sent with every request.
    pub model: String,

    /// Bearer token. Never serialized back out.
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Per-request timeout in seconds (0 disables it).
    pub request_timeout_secs: u64,

    /// Retries per oracle call on failure.
    pub max_retries: u32,

    /// Base delay before the first retry, doubled for each further retry
    /// (0 retries immediately).
    pub backoff_base_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "gpt-4o".to_string(),
            token: None,
            request_timeout_secs: 300,
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

/// Build-repair loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Repair-and-rebuild attempts after the initial failing build.
    pub max_attempts: u32,

    /// Which artifacts receive a diagnostic.
    pub routing: RoutingPolicy,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            routing: RoutingPolicy::Broadcast,
        }
    }
}

/// Budget for the test → prune → rebuild cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Maximum prune cycles before the run is declared exhausted.
    pub max_prune_cycles: u32,

    /// Wall-clock limit in seconds for build + test stages combined.
    pub deadline_secs: Option<u64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_prune_cycles: 10,
            deadline_secs: None,
        }
    }
}

/// External tool commands and timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub cmake: String,
    pub make: String,
    pub gcov: String,

    /// Name of the test executable produced by the descriptor.
    pub test_binary: String,

    pub configure_timeout_secs: u64,
    pub build_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub coverage_timeout_secs: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cmake: "cmake".to_string(),
            make: "make".to_string(),
            gcov: "gcov".to_string(),
            test_binary: "test_runner".to_string(),
            configure_timeout_secs: 300,
            build_timeout_secs: 1200,
            test_timeout_secs: 600,
            coverage_timeout_secs: 300,
        }
    }
}

/// Complete unitforge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub paths: PathsConfig,
    pub scan: ScanConfig,
    pub oracle: OracleConfig,
    pub repair: RepairConfig,
    pub budget: BudgetConfig,
    pub toolchain: ToolchainConfig,
}

impl ForgeConfig {
    /// Load from a TOML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Overlay oracle settings from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay oracle settings using `lookup` as the environment.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) =
            non_empty(ENV_ORACLE_ENDPOINT).or_else(|| non_empty(ENV_LEGACY_ENDPOINT))
        {
            self.oracle.endpoint = Some(endpoint);
        }
        if let Some(model) = non_empty(ENV_ORACLE_MODEL).or_else(|| non_empty(ENV_LEGACY_MODEL)) {
            self.oracle.model = model;
        }
        if let Some(token) = non_empty(ENV_ORACLE_TOKEN).or_else(|| non_empty(ENV_GITHUB_TOKEN)) {
            self.oracle.token = Some(token);
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.repair.max_attempts == 0 {
            return Err(ForgeError::InvalidConfig(
                "repair.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.scan.extensions.is_empty() {
            return Err(ForgeError::InvalidConfig(
                "scan.extensions must not be empty".to_string(),
            ));
        }
        let commands = [
            ("toolchain.cmake", &self.toolchain.cmake),
            ("toolchain.make", &self.toolchain.make),
            ("toolchain.gcov", &self.toolchain.gcov),
            ("toolchain.test_binary", &self.toolchain.test_binary),
        ];
        for (name, value) in commands {
            if value.trim().is_empty() {
                return Err(ForgeError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if self.paths.report_file.trim().is_empty() {
            return Err(ForgeError::InvalidConfig(
                "paths.report_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::default();
        assert_eq!(config.repair.max_attempts, 5);
        assert_eq!(config.repair.routing, RoutingPolicy::Broadcast);
        assert_eq!(config.budget.max_prune_cycles, 10);
        assert!(config.budget.deadline_secs.is_none());
        assert_eq!(config.oracle.max_retries, 2);
        assert_eq!(config.oracle.backoff_base_ms, 500);
        assert_eq!(config.paths.report_file, "test_report.json");
        assert_eq!(config.toolchain.test_binary, "test_runner");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
[repair]
max_attempts = 3
routing = "attributed"

[budget]
deadline_secs = 900

[oracle]
endpoint = "https://models.example.com/inference"
"#;
        let config = ForgeConfig::from_toml_str(raw).expect("parse");
        assert_eq!(config.repair.max_attempts, 3);
        assert_eq!(config.repair.routing, RoutingPolicy::Attributed);
        assert_eq!(config.budget.deadline_secs, Some(900));
        assert_eq!(config.budget.max_prune_cycles, 10);
        assert_eq!(config.oracle.model, "gpt-4o");
        assert_eq!(
            config.oracle.endpoint.as_deref(),
            Some("https://models.example.com/inference")
        );
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = ForgeConfig::from_toml_str("[repair\nmax_attempts = ").expect_err("should fail");
        assert!(matches!(err, ForgeError::ConfigParse(_)));
    }

    #[test]
    fn test_env_overlay_and_token_fallback() {
        let env: HashMap<&str, &str> = [
            (ENV_ORACLE_ENDPOINT, "http://localhost:8081"),
            (ENV_ORACLE_MODEL, ""),
            (ENV_GITHUB_TOKEN, "ghp_secret"),
        ]
        .into_iter()
        .collect();

        let mut config = ForgeConfig::default();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.oracle.endpoint.as_deref(), Some("http://localhost:8081"));
        assert_eq!(config.oracle.model, "gpt-4o");
        assert_eq!(config.oracle.token.as_deref(), Some("ghp_secret"));
    }

    #[test]
    fn test_unprefixed_env_names_are_fallbacks() {
        let env: HashMap<&str, &str> = [
            (ENV_LEGACY_ENDPOINT, "https://models.inference.ai.azure.com"),
            (ENV_LEGACY_MODEL, "gpt-4o-mini"),
        ]
        .into_iter()
        .collect();

        let mut config = ForgeConfig::default();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(
            config.oracle.endpoint.as_deref(),
            Some("https://models.inference.ai.azure.com")
        );
        assert_eq!(config.oracle.model, "gpt-4o-mini");
    }

    #[test]
    fn test_prefixed_env_names_win_over_unprefixed() {
        let env: HashMap<&str, &str> = [
            (ENV_ORACLE_ENDPOINT, "http://localhost:8081"),
            (ENV_LEGACY_ENDPOINT, "https://models.inference.ai.azure.com"),
            (ENV_ORACLE_MODEL, "local-coder"),
            (ENV_LEGACY_MODEL, "gpt-4o-mini"),
        ]
        .into_iter()
        .collect();

        let mut config = ForgeConfig::default();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.oracle.endpoint.as_deref(), Some("http://localhost:8081"));
        assert_eq!(config.oracle.model, "local-coder");
    }

    #[test]
    fn test_token_is_not_serialized() {
        let mut config = ForgeConfig::default();
        config.oracle.token = Some("secret".to_string());
        let rendered = toml::to_string(&config).expect("serialize");
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts_and_empty_commands() {
        let mut config = ForgeConfig::default();
        config.repair.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ForgeError::InvalidConfig(_))));

        let mut config = ForgeConfig::default();
        config.toolchain.gcov = " ".to_string();
        let err = config.validate().expect_err("should fail");
        assert!(err.to_string().contains("toolchain.gcov"));
    }

    #[test]
    fn test_default_dirs_resolve_under_project() {
        let paths = PathsConfig::default();
        let project = Path::new("/work/codebase");
        assert_eq!(paths.resolve_output_dir(project), project.join("tests"));
        assert_eq!(paths.resolve_build_dir(project), project.join("build"));
    }
}
