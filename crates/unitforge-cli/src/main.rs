//! unitforge - GoogleTest generation with self-repairing builds
//!
//! ## Commands
//!
//! - `run`: Generate, build, repair, execute and measure tests for a project
//! - `scan`: List the source files a run would generate tests for
//! - `coverage`: Parse saved `gcov -pb` output into per-file coverage

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use unitforge_core::reporting::render_summary;
use unitforge_core::{
    scan_sources, CoverageParser, ForgeConfig, HttpOracle, Instructions, PipelineOrchestrator,
    PipelineResult, RoutingPolicy, ScanOptions,
};

#[derive(Parser)]
#[command(name = "unitforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate and repair GoogleTest suites for C/C++ projects", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline against a project
    Run {
        /// Project root to scan
        #[arg(default_value = ".")]
        project: PathBuf,

        /// TOML configuration file
        #[arg(short, long, env = "UNITFORGE_CONFIG")]
        config: Option<PathBuf>,

        /// Directory receiving generated test files (default: <project>/tests)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Build directory (default: <project>/build)
        #[arg(long)]
        build_dir: Option<PathBuf>,

        /// Repair attempts after the first failed build
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Prune-and-rebuild cycles before giving up
        #[arg(long)]
        max_prune_cycles: Option<u32>,

        /// Wall-clock budget in seconds, measured from the first build
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Diagnostic routing: broadcast or attributed
        #[arg(long)]
        routing: Option<RoutingPolicy>,

        /// Directory with system-instruction overrides
        #[arg(long)]
        instructions_dir: Option<PathBuf>,
    },

    /// List eligible source files without contacting the oracle
    Scan {
        /// Project root to scan
        #[arg(default_value = ".")]
        project: PathBuf,

        /// TOML configuration file
        #[arg(short, long, env = "UNITFORGE_CONFIG")]
        config: Option<PathBuf>,

        /// Print the listing as JSON
        #[arg(long)]
        list_json: bool,
    },

    /// Parse saved gcov output and print per-file coverage as JSON
    Coverage {
        /// File holding concatenated `gcov -pb` stdout
        file: PathBuf,

        /// Only files under this root are kept
        #[arg(long)]
        root: PathBuf,

        /// Directory relative paths in the output resolve against
        /// (default: the root)
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },
}

/// CLI overrides for `run`, applied over file and environment settings.
#[derive(Debug, Default)]
struct RunOverrides {
    output_dir: Option<PathBuf>,
    build_dir: Option<PathBuf>,
    max_attempts: Option<u32>,
    max_prune_cycles: Option<u32>,
    deadline_secs: Option<u64>,
    routing: Option<RoutingPolicy>,
    instructions_dir: Option<PathBuf>,
}

impl RunOverrides {
    fn apply(self, config: &mut ForgeConfig) {
        if let Some(dir) = self.output_dir {
            config.paths.output_dir = Some(dir);
        }
        if let Some(dir) = self.build_dir {
            config.paths.build_dir = Some(dir);
        }
        if let Some(dir) = self.instructions_dir {
            config.paths.instructions_dir = Some(dir);
        }
        if let Some(n) = self.max_attempts {
            config.repair.max_attempts = n;
        }
        if let Some(routing) = self.routing {
            config.repair.routing = routing;
        }
        if let Some(n) = self.max_prune_cycles {
            config.budget.max_prune_cycles = n;
        }
        if let Some(secs) = self.deadline_secs {
            config.budget.deadline_secs = Some(secs);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    unitforge_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            project,
            config,
            output_dir,
            build_dir,
            max_attempts,
            max_prune_cycles,
            deadline_secs,
            routing,
            instructions_dir,
        } => {
            let overrides = RunOverrides {
                output_dir,
                build_dir,
                max_attempts,
                max_prune_cycles,
                deadline_secs,
                routing,
                instructions_dir,
            };
            cmd_run(&project, config.as_deref(), overrides).await
        }
        Commands::Scan {
            project,
            config,
            list_json,
        } => cmd_scan(&project, config.as_deref(), list_json),
        Commands::Coverage {
            file,
            root,
            base_dir,
        } => cmd_coverage(&file, &root, base_dir.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<ForgeConfig> {
    let mut config = ForgeConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;
    config.apply_env();
    Ok(config)
}

async fn cmd_run(project: &Path, config_path: Option<&Path>, overrides: RunOverrides) -> Result<()> {
    let mut config = load_config(config_path)?;
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let project = std::fs::canonicalize(project)
        .with_context(|| format!("Project directory {:?} not found", project))?;
    let build_dir = config.paths.resolve_build_dir(&project);

    let oracle = HttpOracle::from_config(&config.oracle).context("Oracle is not configured")?;
    let instructions = Instructions::load(config.paths.instructions_dir.as_deref())
        .context("Failed to load instruction overrides")?;
    let toolchain = unitforge_ci::cmake_toolchain(&config, &build_dir);

    info!(
        project = %project.display(),
        endpoint = %oracle.url(),
        model = %oracle.model(),
        "starting run"
    );
    println!("Generating tests for: {}", project.display());
    println!("Build directory: {}", build_dir.display());
    println!();

    let orchestrator = PipelineOrchestrator::new(config, Arc::new(oracle), toolchain)
        .with_instructions(instructions);
    let result = orchestrator.run(&project).await;

    print_result(&result);

    if !result.is_success() {
        anyhow::bail!("Pipeline finished with status {}", result.status.as_str());
    }
    Ok(())
}

fn print_result(result: &PipelineResult) {
    println!("Run ID: {}", result.run_id);
    println!("Status: {}", result.status.as_str());
    println!("Artifacts: {}", result.artifact_count);
    println!("Duration: {}ms", result.duration_ms);

    if let (Some(report), Some(path)) = (&result.report, &result.report_path) {
        println!();
        println!("{}", render_summary(report, path));
    }
    if let Some(error) = &result.error {
        println!();
        println!("Error: {}", error);
    }
    if let Some(diagnostics) = &result.diagnostics {
        println!();
        println!("Last diagnostics:");
        println!("{}", diagnostics.trim_end());
    }
    if let Some(journal) = &result.journal_path {
        println!();
        println!("Journal: {}", journal.display());
    }
}

#[derive(Debug, Serialize)]
struct ScanListing {
    root: PathBuf,
    sources: Vec<ScanEntry>,
}

#[derive(Debug, Serialize)]
struct ScanEntry {
    path: PathBuf,
    test_file: String,
    bytes: usize,
}

fn cmd_scan(project: &Path, config_path: Option<&Path>, list_json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let root = std::fs::canonicalize(project)
        .with_context(|| format!("Project directory {:?} not found", project))?;

    let options = ScanOptions::from_config(&config.scan)
        .exclude_path(&config.paths.resolve_output_dir(&root))
        .exclude_path(&config.paths.resolve_build_dir(&root));
    let units = scan_sources(&root, &options).context("Failed to scan project")?;

    let listing = ScanListing {
        root: root.clone(),
        sources: units
            .iter()
            .map(|unit| ScanEntry {
                path: unit.path.clone(),
                test_file: unit.artifact_file_name(),
                bytes: unit.content.len(),
            })
            .collect(),
    };

    if list_json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.sources.is_empty() {
        println!("No eligible source files under {}", root.display());
        return Ok(());
    }
    for entry in &listing.sources {
        let shown = entry.path.strip_prefix(&root).unwrap_or(&entry.path);
        println!("{}  ->  {}", shown.display(), entry.test_file);
    }
    println!();
    println!("{} source file(s)", listing.sources.len());
    Ok(())
}

fn cmd_coverage(file: &Path, root: &Path, base_dir: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read gcov output {:?}", file))?;
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("Coverage root {:?} not found", root))?;
    let base_dir = base_dir.map(Path::to_path_buf).unwrap_or_else(|| root.clone());

    let record = CoverageParser::new(&root, &base_dir).parse(&raw);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_parses_overrides() {
        let cli = Cli::try_parse_from([
            "unitforge",
            "--verbose",
            "run",
            "/tmp/project",
            "--max-attempts",
            "3",
            "--max-prune-cycles",
            "4",
            "--deadline-secs",
            "600",
            "--routing",
            "attributed",
        ])
        .expect("parse");

        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                project,
                max_attempts,
                max_prune_cycles,
                deadline_secs,
                routing,
                ..
            } => {
                assert_eq!(project, PathBuf::from("/tmp/project"));
                assert_eq!(max_attempts, Some(3));
                assert_eq!(max_prune_cycles, Some(4));
                assert_eq!(deadline_secs, Some(600));
                assert_eq!(routing, Some(RoutingPolicy::Attributed));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_unknown_routing_is_rejected() {
        let parsed = Cli::try_parse_from(["unitforge", "run", ".", "--routing", "nearest"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_coverage_requires_root() {
        assert!(Cli::try_parse_from(["unitforge", "coverage", "gcov.txt"]).is_err());
        assert!(Cli::try_parse_from(["unitforge", "coverage", "gcov.txt", "--root", "."]).is_ok());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = ForgeConfig::default();
        RunOverrides {
            output_dir: Some(PathBuf::from("/out")),
            max_attempts: Some(2),
            routing: Some(RoutingPolicy::Attributed),
            deadline_secs: Some(30),
            ..RunOverrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.paths.output_dir, Some(PathBuf::from("/out")));
        assert_eq!(config.repair.max_attempts, 2);
        assert_eq!(config.repair.routing, RoutingPolicy::Attributed);
        assert_eq!(config.budget.deadline_secs, Some(30));
        assert_eq!(config.budget.max_prune_cycles, 10);
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut config = ForgeConfig::default();
        RunOverrides::default().apply(&mut config);
        assert_eq!(config, ForgeConfig::default());
    }
}
