//! Test execution cycle: run, prune failing cases, rebuild, run again.
//!
//! Entered only after a successful build. The prune/rebuild re-entry is
//! bounded by a [`CycleBudget`]; spending it ends the cycle with
//! [`CycleOutcome::Exhausted`], distinct from a build that never recovers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::BudgetConfig;
use crate::coverage::CoverageParser;
use crate::domain::{ArtifactStage, CoverageRecord, Result};
use crate::journal::{JournalStage, RunJournal};
use crate::obs::{emit_prune_cycle, emit_tests_executed};
use crate::oracle::CodeTransformOracle;
use crate::prompts::{prune_request, Instructions};
use crate::repair::{rewrite_artifacts, BuildRepairLoop, BuildRepairOutcome};
use crate::routing::{route, RoutingPolicy};
use crate::store::ArtifactStore;
use crate::toolchain::{CoverageAnalyzer, TestRunner};

/// Limits on test → prune → rebuild re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleBudget {
    pub max_prune_cycles: u32,

    /// Measured from the start of the build stage.
    pub deadline: Option<Duration>,
}

impl Default for CycleBudget {
    fn default() -> Self {
        Self {
            max_prune_cycles: 10,
            deadline: None,
        }
    }
}

impl From<&BudgetConfig> for CycleBudget {
    fn from(config: &BudgetConfig) -> Self {
        Self {
            max_prune_cycles: config.max_prune_cycles,
            deadline: config.deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Which limit ended an exhausted cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    PruneCycles,
    Deadline,
}

impl std::fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExhaustionReason::PruneCycles => write!(f, "prune cycle limit reached"),
            ExhaustionReason::Deadline => write!(f, "deadline exceeded"),
        }
    }
}

/// Terminal state of [`TestExecutionCycle::execute_and_report`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Every case passed. `coverage` is `None` when the tool was unavailable.
    Passed {
        coverage: Option<CoverageRecord>,
        prune_cycles: u32,
    },

    /// A rebuild after pruning never succeeded.
    BuildFailed {
        prune_cycles: u32,
        attempts: u32,
        diagnostics: String,
    },

    /// The cycle budget was spent while tests still failed.
    Exhausted {
        prune_cycles: u32,
        reason: ExhaustionReason,
        last_failure_log: String,
    },
}

/// Strip the failing cases named in `failure_log` from each target artifact.
///
/// Oracle failures leave the artifact unchanged. Returns how many artifacts
/// were rewritten.
pub async fn prune_failed_cases(
    oracle: &dyn CodeTransformOracle,
    instructions: &Instructions,
    store: &mut ArtifactStore,
    targets: &[usize],
    failure_log: &str,
    journal: &mut RunJournal,
) -> usize {
    rewrite_artifacts(
        oracle,
        store,
        targets,
        ArtifactStage::Pruned,
        JournalStage::Prune,
        journal,
        |artifact| prune_request(instructions, artifact, failure_log),
    )
    .await
}

/// Runs the test binary and drives pruning until the suite passes or the
/// budget is spent.
pub struct TestExecutionCycle {
    oracle: Arc<dyn CodeTransformOracle>,
    tests: Arc<dyn TestRunner>,
    coverage: Arc<dyn CoverageAnalyzer>,
    parser: CoverageParser,
    instructions: Arc<Instructions>,
    routing: RoutingPolicy,
    budget: CycleBudget,
}

impl TestExecutionCycle {
    pub fn new(
        oracle: Arc<dyn CodeTransformOracle>,
        tests: Arc<dyn TestRunner>,
        coverage: Arc<dyn CoverageAnalyzer>,
        parser: CoverageParser,
        instructions: Arc<Instructions>,
    ) -> Self {
        Self {
            oracle,
            tests,
            coverage,
            parser,
            instructions,
            routing: RoutingPolicy::default(),
            budget: CycleBudget::default(),
        }
    }

    pub fn with_routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_budget(mut self, budget: CycleBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Execute the suite, pruning and rebuilding through `repair` on failure.
    ///
    /// `build_started` anchors the deadline. `Err` is returned only when the
    /// test binary or build tool cannot be run at all.
    pub async fn execute_and_report(
        &self,
        repair: &BuildRepairLoop,
        store: &mut ArtifactStore,
        journal: &mut RunJournal,
        build_started: Instant,
    ) -> Result<CycleOutcome> {
        let mut prune_cycles = 0u32;

        loop {
            let run = self.tests.run_tests().await?;
            store.mark_all(ArtifactStage::Executed);
            emit_tests_executed(prune_cycles, run.passed);
            journal.record(
                JournalStage::Test,
                "executed",
                json!({"cycle": prune_cycles, "passed": run.passed, "output_bytes": run.output.len()}),
            );

            if run.passed {
                let coverage = self.collect_coverage(journal).await;
                return Ok(CycleOutcome::Passed {
                    coverage,
                    prune_cycles,
                });
            }

            if let Some(reason) = self.exhausted(prune_cycles, build_started) {
                warn!(prune_cycles, %reason, "cycle budget spent with failing tests");
                journal.record(
                    JournalStage::Prune,
                    "exhausted",
                    json!({"prune_cycles": prune_cycles, "reason": reason}),
                );
                return Ok(CycleOutcome::Exhausted {
                    prune_cycles,
                    reason,
                    last_failure_log: run.output,
                });
            }

            prune_cycles += 1;
            let route = route(self.routing, &run.output, store);
            let pruned = prune_failed_cases(
                self.oracle.as_ref(),
                &self.instructions,
                store,
                &route.targets,
                &run.output,
                journal,
            )
            .await;
            emit_prune_cycle(prune_cycles, route.targets.len(), route.attributed);
            journal.record(
                JournalStage::Prune,
                "cycle",
                json!({
                    "cycle": prune_cycles,
                    "targets": route.targets.len(),
                    "attributed": route.attributed,
                    "rewritten": pruned,
                }),
            );

            match repair.repair_and_build(store, journal).await? {
                BuildRepairOutcome::Built { .. } => {}
                BuildRepairOutcome::Failed {
                    attempts,
                    diagnostics,
                } => {
                    return Ok(CycleOutcome::BuildFailed {
                        prune_cycles,
                        attempts,
                        diagnostics,
                    });
                }
            }
        }
    }

    fn exhausted(&self, prune_cycles: u32, build_started: Instant) -> Option<ExhaustionReason> {
        if prune_cycles >= self.budget.max_prune_cycles {
            return Some(ExhaustionReason::PruneCycles);
        }
        match self.budget.deadline {
            Some(deadline) if build_started.elapsed() >= deadline => Some(ExhaustionReason::Deadline),
            _ => None,
        }
    }

    async fn collect_coverage(&self, journal: &mut RunJournal) -> Option<CoverageRecord> {
        match self.coverage.collect().await {
            Ok(raw) => {
                let record = self.parser.parse(&raw);
                info!(files = record.len(), "coverage collected");
                journal.record(
                    JournalStage::Coverage,
                    "collected",
                    json!({"files": record.len()}),
                );
                Some(record)
            }
            Err(e) => {
                warn!(error = %e, "coverage unavailable; continuing without it");
                journal.record(
                    JournalStage::Coverage,
                    "unavailable",
                    json!({"error": e.to_string()}),
                );
                None
            }
        }
    }
}
