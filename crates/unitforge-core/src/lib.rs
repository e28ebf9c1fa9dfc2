//! unitforge core library
//!
//! Generates C++ unit tests through a text-generation oracle, then drives the
//! generated files to a buildable, passing, coverage-reported state. Re-exports
//! the pipeline stages and their collaborators for programmatic use.

pub mod config;
pub mod coverage;
pub mod domain;
pub mod execution;
pub mod fakes;
pub mod journal;
pub mod obs;
pub mod oracle;
pub mod orchestrator;
pub mod prompts;
pub mod repair;
pub mod reporting;
pub mod routing;
pub mod scanner;
pub mod store;
pub mod telemetry;
pub mod toolchain;

pub use config::ForgeConfig;
pub use coverage::CoverageParser;
pub use domain::{
    ArtifactStage, CoverageRecord, FileCoverage, ForgeError, Report, ReportDetail, ReportSummary,
    Result, SourceUnit, TestArtifact,
};
pub use execution::{CycleBudget, CycleOutcome, ExhaustionReason, TestExecutionCycle};
pub use journal::{read_journal_artifact, JournalStage, RunJournal};
pub use oracle::{CodeTransformOracle, HttpOracle, OracleError, OracleRequest, RetryingOracle};
pub use orchestrator::{PipelineOrchestrator, PipelineResult, PipelineStatus};
pub use prompts::Instructions;
pub use repair::{BuildRepairLoop, BuildRepairOutcome, RepairPolicy};
pub use routing::RoutingPolicy;
pub use scanner::{scan_sources, ScanOptions};
pub use store::ArtifactStore;
pub use telemetry::init_tracing;
pub use toolchain::{BuildOutcome, BuildPlan, BuildRunner, CoverageAnalyzer, TestRun, TestRunner, Toolchain};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
