//! Top-level pipeline driver.
//!
//! scan → generate → refine → build/repair → execute/prune → report.
//! Every run ends in a [`PipelineResult`]; errors and panics inside a stage are
//! converted into a `Failed` result instead of escaping. Once the output
//! directory exists, the run journal is written for every outcome.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::ForgeConfig;
use crate::coverage::CoverageParser;
use crate::domain::{ArtifactStage, ForgeError, Report, Result, SourceUnit};
use crate::execution::{CycleBudget, CycleOutcome, TestExecutionCycle};
use crate::journal::{JournalStage, RunJournal};
use crate::obs::{
    emit_artifact_degraded, emit_pipeline_finished, emit_pipeline_started, pipeline_span,
};
use crate::oracle::{CodeTransformOracle, RetryingOracle};
use crate::prompts::{generation_request, refinement_request, Instructions};
use crate::repair::{rewrite_artifacts, BuildRepairLoop, BuildRepairOutcome, RepairPolicy};
use crate::reporting::{build_report, render_summary, write_report_json};
use crate::scanner::{scan_sources, ScanOptions};
use crate::store::ArtifactStore;
use crate::toolchain::Toolchain;

/// Terminal status of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Tests pass and the report was written.
    Succeeded,
    /// The build never succeeded within the repair ceiling; artifacts exist,
    /// no report.
    BuildFailed,
    /// The prune cycle budget was spent with tests still failing.
    Exhausted,
    /// Fatal error or panic.
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Succeeded => "succeeded",
            PipelineStatus::BuildFailed => "build_failed",
            PipelineStatus::Exhausted => "exhausted",
            PipelineStatus::Failed => "failed",
        }
    }
}

/// Result of [`PipelineOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub status: PipelineStatus,
    pub report: Option<Report>,
    pub report_path: Option<PathBuf>,
    pub journal_path: Option<PathBuf>,
    pub artifact_count: usize,

    /// Human-readable reason for any non-success status.
    pub error: Option<String>,

    /// Last build diagnostics or test failure log, when the run ended on one.
    pub diagnostics: Option<String>,

    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }
}

/// State that must survive a failed or panicking run.
#[derive(Debug, Default)]
struct RunState {
    output_dir: Option<PathBuf>,
    artifact_count: usize,
}

struct Finished {
    status: PipelineStatus,
    report: Option<Report>,
    report_path: Option<PathBuf>,
    error: Option<String>,
    diagnostics: Option<String>,
}

impl Finished {
    fn failed(error: String) -> Self {
        Self {
            status: PipelineStatus::Failed,
            report: None,
            report_path: None,
            error: Some(error),
            diagnostics: None,
        }
    }
}

/// Composes every stage for one project.
pub struct PipelineOrchestrator {
    config: ForgeConfig,
    oracle: Arc<dyn CodeTransformOracle>,
    toolchain: Toolchain,
    instructions: Arc<Instructions>,
}

impl PipelineOrchestrator {
    /// Build an orchestrator. `oracle` is wrapped in a [`RetryingOracle`]
    /// using `config.oracle.max_retries` and `config.oracle.backoff_base_ms`.
    pub fn new(config: ForgeConfig, oracle: Arc<dyn CodeTransformOracle>, toolchain: Toolchain) -> Self {
        let oracle: Arc<dyn CodeTransformOracle> = Arc::new(
            RetryingOracle::new(oracle, config.oracle.max_retries)
                .with_backoff(Duration::from_millis(config.oracle.backoff_base_ms)),
        );
        Self {
            config,
            oracle,
            toolchain,
            instructions: Arc::new(Instructions::default()),
        }
    }

    pub fn with_instructions(mut self, instructions: Instructions) -> Self {
        self.instructions = Arc::new(instructions);
        self
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Run the whole pipeline against `project`.
    pub async fn run(&self, project: &Path) -> PipelineResult {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let span = pipeline_span(&run_id);

        let mut journal = RunJournal::new(&run_id);
        let mut state = RunState::default();

        let outcome = async {
            emit_pipeline_started(&run_id, &project.display().to_string());
            AssertUnwindSafe(self.execute(project, &mut journal, &mut state))
                .catch_unwind()
                .await
        }
        .instrument(span.clone())
        .await;

        let finished = match outcome {
            Ok(Ok(finished)) => finished,
            Ok(Err(e)) => {
                warn!(run_id = %run_id, error = %e, "pipeline failed");
                Finished::failed(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(run_id = %run_id, panic = %message, "pipeline stage panicked");
                Finished::failed(format!("stage panicked: {message}"))
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        journal.record(
            JournalStage::Pipeline,
            "finished",
            json!({"status": finished.status, "error": finished.error, "duration_ms": duration_ms}),
        );
        journal.set_outcome(finished.status.as_str());

        let journal_path = state.output_dir.as_ref().and_then(|dir| {
            match journal.write_artifact(&dir.join(&self.config.paths.journal_file)) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, "failed to write run journal");
                    None
                }
            }
        });

        span.in_scope(|| emit_pipeline_finished(&run_id, finished.status.as_str(), duration_ms));

        PipelineResult {
            run_id,
            status: finished.status,
            report: finished.report,
            report_path: finished.report_path,
            journal_path,
            artifact_count: state.artifact_count,
            error: finished.error,
            diagnostics: finished.diagnostics,
            duration_ms,
        }
    }

    async fn execute(
        &self,
        project: &Path,
        journal: &mut RunJournal,
        state: &mut RunState,
    ) -> Result<Finished> {
        let project = std::fs::canonicalize(project)?;
        let output_dir = self.config.paths.resolve_output_dir(&project);
        let build_dir = self.config.paths.resolve_build_dir(&project);
        std::fs::create_dir_all(&output_dir)?;
        std::fs::create_dir_all(&build_dir)?;
        state.output_dir = Some(output_dir.clone());
        journal.record(
            JournalStage::Pipeline,
            "started",
            json!({"project": project, "output_dir": output_dir, "build_dir": build_dir}),
        );

        let options = ScanOptions::from_config(&self.config.scan)
            .exclude_path(&output_dir)
            .exclude_path(&build_dir);
        let units = scan_sources(&project, &options)?;
        journal.record(JournalStage::Scan, "completed", json!({"sources": units.len()}));
        if units.is_empty() {
            return Err(ForgeError::NoSourcesFound(project));
        }
        let units: Vec<Arc<SourceUnit>> = units.into_iter().map(Arc::new).collect();

        let mut store = ArtifactStore::new(&output_dir);
        self.generate(&units, &mut store, journal).await;
        state.artifact_count = store.len();
        if store.is_empty() {
            return Err(ForgeError::NoArtifactsGenerated {
                attempted: units.len(),
            });
        }

        self.refine(&mut store, journal).await;

        let build_started = Instant::now();
        let repair = BuildRepairLoop::new(
            Arc::clone(&self.oracle),
            Arc::clone(&self.toolchain.builder),
            Arc::clone(&self.instructions),
            RepairPolicy::from(&self.config.repair),
        )
        .with_source_dirs(source_dirs(&units));

        if let BuildRepairOutcome::Failed {
            attempts,
            diagnostics,
        } = repair.repair_and_build(&mut store, journal).await?
        {
            warn!(attempts, "build failed after repair attempts; no report written");
            return Ok(Finished {
                status: PipelineStatus::BuildFailed,
                report: None,
                report_path: None,
                error: Some(format!("build failed after {attempts} repair attempts")),
                diagnostics: Some(diagnostics),
            });
        }

        let parser = CoverageParser::new(&project, self.toolchain.coverage.working_dir());
        let cycle = TestExecutionCycle::new(
            Arc::clone(&self.oracle),
            Arc::clone(&self.toolchain.tests),
            Arc::clone(&self.toolchain.coverage),
            parser,
            Arc::clone(&self.instructions),
        )
        .with_routing(self.config.repair.routing)
        .with_budget(CycleBudget::from(&self.config.budget));

        match cycle
            .execute_and_report(&repair, &mut store, journal, build_started)
            .await?
        {
            CycleOutcome::Passed { coverage, .. } => {
                let report = build_report(&store, coverage.as_ref());
                let report_path =
                    write_report_json(&output_dir, &self.config.paths.report_file, &report)
                        .map_err(|e| ForgeError::Unexpected(format!("{e:#}")))?;
                store.mark_all(ArtifactStage::Reported);
                journal.record(
                    JournalStage::Report,
                    "written",
                    json!({
                        "path": report_path,
                        "artifacts": report.summary.total_artifacts,
                        "cases": report.summary.total_cases,
                        "average_coverage_percent": report.summary.average_coverage_percent,
                    }),
                );
                info!("{}", render_summary(&report, &report_path));
                Ok(Finished {
                    status: PipelineStatus::Succeeded,
                    report: Some(report),
                    report_path: Some(report_path),
                    error: None,
                    diagnostics: None,
                })
            }
            CycleOutcome::BuildFailed {
                prune_cycles,
                attempts,
                diagnostics,
            } => Ok(Finished {
                status: PipelineStatus::BuildFailed,
                report: None,
                report_path: None,
                error: Some(format!(
                    "rebuild after prune cycle {prune_cycles} failed after {attempts} repair attempts"
                )),
                diagnostics: Some(diagnostics),
            }),
            CycleOutcome::Exhausted {
                prune_cycles,
                reason,
                last_failure_log,
            } => Ok(Finished {
                status: PipelineStatus::Exhausted,
                report: None,
                report_path: None,
                error: Some(format!("{reason} after {prune_cycles} prune cycles")),
                diagnostics: Some(last_failure_log),
            }),
        }
    }

    /// One artifact per unit, best effort.
    async fn generate(
        &self,
        units: &[Arc<SourceUnit>],
        store: &mut ArtifactStore,
        journal: &mut RunJournal,
    ) {
        let test_dir = store.output_dir().to_path_buf();
        for unit in units {
            let request = generation_request(&self.instructions, unit, &test_dir);
            let inserted = match self.oracle.transform(&request).await {
                Ok(content) => store
                    .insert(Arc::clone(unit), content)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match inserted {
                Ok(idx) => {
                    if let Some(artifact) = store.get(idx) {
                        info!(source = %unit.name, artifact = %artifact.file_name, cases = artifact.case_count, "generated test file");
                        journal.record(
                            JournalStage::Generate,
                            "generated",
                            json!({
                                "source": unit.name,
                                "artifact": artifact.file_name,
                                "cases": artifact.case_count,
                            }),
                        );
                    }
                }
                Err(error) => {
                    emit_artifact_degraded(ArtifactStage::Generated.as_str(), &unit.name, &error);
                    journal.record(
                        JournalStage::Generate,
                        "failed",
                        json!({"source": unit.name, "error": error}),
                    );
                }
            }
        }
    }

    /// Review every artifact once; failures keep the generated content.
    async fn refine(&self, store: &mut ArtifactStore, journal: &mut RunJournal) {
        let targets: Vec<usize> = (0..store.len()).collect();
        let instructions = Arc::clone(&self.instructions);
        let refined = rewrite_artifacts(
            self.oracle.as_ref(),
            store,
            &targets,
            ArtifactStage::Refined,
            JournalStage::Refine,
            journal,
            |artifact| refinement_request(&instructions, artifact),
        )
        .await;
        info!(refined, total = store.len(), "refinement complete");
    }
}

/// Distinct parent directories of the scanned units, sorted.
fn source_dirs(units: &[Arc<SourceUnit>]) -> Vec<PathBuf> {
    units
        .iter()
        .filter_map(|u| u.dir().map(Path::to_path_buf))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
