//! Bounded build-repair loop.
//!
//! Build once; on failure, run at most `max_attempts` repair attempts. Each
//! attempt hands every routed artifact to the oracle together with the full
//! diagnostics of the previous build, overwrites the artifact with the answer
//! and rebuilds. An oracle failure only skips that artifact for the attempt.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::RepairConfig;
use crate::domain::{ArtifactStage, Result, TestArtifact};
use crate::journal::{JournalStage, RunJournal};
use crate::obs::{emit_artifact_degraded, emit_build_attempted, emit_repair_attempt};
use crate::oracle::{CodeTransformOracle, OracleRequest};
use crate::prompts::{repair_request, Instructions};
use crate::routing::{route, RoutingPolicy};
use crate::store::ArtifactStore;
use crate::toolchain::{BuildOutcome, BuildPlan, BuildRunner};

/// Policy governing the repair loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPolicy {
    /// Repair-and-rebuild attempts after the initial failing build.
    pub max_attempts: u32,

    /// Which artifacts receive the build diagnostics.
    pub routing: RoutingPolicy,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            routing: RoutingPolicy::Broadcast,
        }
    }
}

impl From<&RepairConfig> for RepairPolicy {
    fn from(config: &RepairConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            routing: config.routing,
        }
    }
}

/// Terminal state of one `repair_and_build` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildRepairOutcome {
    /// The build succeeded after `repair_attempts` repairs (0 = first try).
    Built { repair_attempts: u32 },

    /// Every attempt was spent; `diagnostics` is the final build's output.
    Failed { attempts: u32, diagnostics: String },
}

impl BuildRepairOutcome {
    pub fn is_built(&self) -> bool {
        matches!(self, BuildRepairOutcome::Built { .. })
    }
}

/// Build-and-repair driver over one artifact store.
pub struct BuildRepairLoop {
    oracle: Arc<dyn CodeTransformOracle>,
    builder: Arc<dyn BuildRunner>,
    instructions: Arc<Instructions>,
    policy: RepairPolicy,
    source_dirs: Vec<PathBuf>,
}

impl BuildRepairLoop {
    pub fn new(
        oracle: Arc<dyn CodeTransformOracle>,
        builder: Arc<dyn BuildRunner>,
        instructions: Arc<Instructions>,
        policy: RepairPolicy,
    ) -> Self {
        Self {
            oracle,
            builder,
            instructions,
            policy,
            source_dirs: Vec::new(),
        }
    }

    /// Source directories compiled into every build.
    pub fn with_source_dirs(mut self, source_dirs: Vec<PathBuf>) -> Self {
        self.source_dirs = source_dirs;
        self
    }

    /// Build, repairing on failure up to the attempt ceiling.
    ///
    /// `Err` is returned only when the build tool itself cannot be run.
    pub async fn repair_and_build(
        &self,
        store: &mut ArtifactStore,
        journal: &mut RunJournal,
    ) -> Result<BuildRepairOutcome> {
        store.mark_all(ArtifactStage::BuildAttempted);
        let outcome = self.build(store, 0, journal).await?;
        if outcome.success {
            return Ok(BuildRepairOutcome::Built { repair_attempts: 0 });
        }

        let mut diagnostics = outcome.diagnostic_text().to_string();
        for attempt in 1..=self.policy.max_attempts {
            let route = route(self.policy.routing, &diagnostics, store);
            let instructions = Arc::clone(&self.instructions);
            let rewritten = rewrite_artifacts(
                self.oracle.as_ref(),
                store,
                &route.targets,
                ArtifactStage::Repaired,
                JournalStage::Repair,
                journal,
                |artifact| repair_request(&instructions, artifact, &diagnostics),
            )
            .await;

            emit_repair_attempt(attempt, self.policy.max_attempts, route.targets.len(), rewritten);
            journal.record(
                JournalStage::Repair,
                "attempt",
                json!({
                    "attempt": attempt,
                    "max_attempts": self.policy.max_attempts,
                    "targets": route.targets.len(),
                    "attributed": route.attributed,
                    "rewritten": rewritten,
                }),
            );

            let outcome = self.build(store, attempt, journal).await?;
            if outcome.success {
                return Ok(BuildRepairOutcome::Built {
                    repair_attempts: attempt,
                });
            }
            diagnostics = outcome.diagnostic_text().to_string();
        }

        Ok(BuildRepairOutcome::Failed {
            attempts: self.policy.max_attempts,
            diagnostics,
        })
    }

    async fn build(
        &self,
        store: &ArtifactStore,
        attempt: u32,
        journal: &mut RunJournal,
    ) -> Result<BuildOutcome> {
        let plan = BuildPlan::new(store.paths(), self.source_dirs.clone());
        let outcome = self.builder.build(&plan).await?;
        emit_build_attempted(attempt, outcome.success);
        journal.record(
            JournalStage::Build,
            "attempted",
            json!({
                "attempt": attempt,
                "success": outcome.success,
                "diagnostics_bytes": outcome.diagnostic_text().len(),
            }),
        );
        Ok(outcome)
    }
}

/// Send each target artifact through the oracle and overwrite it with the
/// answer, one artifact at a time. Per-artifact failures are logged,
/// journalled and skipped. Returns how many artifacts were overwritten.
pub(crate) async fn rewrite_artifacts<F>(
    oracle: &dyn CodeTransformOracle,
    store: &mut ArtifactStore,
    targets: &[usize],
    stage: ArtifactStage,
    journal_stage: JournalStage,
    journal: &mut RunJournal,
    build_request: F,
) -> usize
where
    F: Fn(&TestArtifact) -> OracleRequest,
{
    let mut rewritten = 0;
    for &idx in targets {
        let Some(artifact) = store.get(idx) else {
            continue;
        };
        let name = artifact.file_name.clone();
        let request = build_request(artifact);

        let response = match oracle.transform(&request).await {
            Ok(content) => content,
            Err(e) => {
                emit_artifact_degraded(stage.as_str(), &name, &e);
                journal.record(
                    journal_stage,
                    "oracle_failed",
                    json!({"artifact": name, "error": e.to_string()}),
                );
                continue;
            }
        };

        match store.overwrite(idx, response, stage) {
            Ok(changed) => {
                rewritten += 1;
                journal.record(
                    journal_stage,
                    "rewritten",
                    json!({"artifact": name, "changed": changed}),
                );
            }
            Err(e) => {
                emit_artifact_degraded(stage.as_str(), &name, &e);
                journal.record(
                    journal_stage,
                    "write_failed",
                    json!({"artifact": name, "error": e.to_string()}),
                );
            }
        }
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceUnit;
    use crate::fakes::{ScriptedBuildRunner, ScriptedOracle};
    use crate::oracle::OracleError;
    use tempfile::tempdir;

    fn store_with_two(dir: &std::path::Path) -> ArtifactStore {
        let mut store = ArtifactStore::new(dir);
        for name in ["/src/a.cpp", "/src/b.cpp"] {
            store
                .insert(Arc::new(SourceUnit::new(name, "")), "TEST(X, Y) {}".to_string())
                .expect("insert");
        }
        store
    }

    #[tokio::test]
    async fn test_success_on_first_build_skips_oracle() {
        let dir = tempdir().expect("tempdir");
        let mut store = store_with_two(dir.path());
        let oracle = Arc::new(ScriptedOracle::echo("fixed"));
        let builder = Arc::new(ScriptedBuildRunner::failing_times(0, "error"));
        let repair = BuildRepairLoop::new(
            oracle.clone(),
            builder.clone(),
            Arc::new(Instructions::default()),
            RepairPolicy::default(),
        );
        let mut journal = RunJournal::new("t");

        let outcome = repair.repair_and_build(&mut store, &mut journal).await.expect("run");
        assert_eq!(outcome, BuildRepairOutcome::Built { repair_attempts: 0 });
        assert_eq!(oracle.calls(), 0);
        assert_eq!(builder.calls(), 1);
        assert!(store.iter().all(|a| a.stage == ArtifactStage::BuildAttempted));
    }

    #[tokio::test]
    async fn test_oracle_failure_skips_only_that_artifact() {
        let dir = tempdir().expect("tempdir");
        let mut store = store_with_two(dir.path());
        let oracle = Arc::new(ScriptedOracle::new(|call, _| {
            if call == 0 {
                Err(OracleError::Other("rate limited".to_string()))
            } else {
                Ok("TEST(X, Fixed) {}".to_string())
            }
        }));
        let builder = Arc::new(ScriptedBuildRunner::failing_times(1, "error: boom"));
        let repair = BuildRepairLoop::new(
            oracle.clone(),
            builder.clone(),
            Arc::new(Instructions::default()),
            RepairPolicy::default(),
        );
        let mut journal = RunJournal::new("t");

        let outcome = repair.repair_and_build(&mut store, &mut journal).await.expect("run");
        assert_eq!(outcome, BuildRepairOutcome::Built { repair_attempts: 1 });
        assert_eq!(oracle.calls(), 2);

        let first = store.get(0).expect("a");
        assert_eq!(first.content, "TEST(X, Y) {}");
        assert_eq!(first.stage, ArtifactStage::BuildAttempted);
        let second = store.get(1).expect("b");
        assert_eq!(second.content, "TEST(X, Fixed) {}");
        assert_eq!(second.stage, ArtifactStage::Repaired);

        assert_eq!(journal.count(JournalStage::Repair, "oracle_failed"), 1);
        assert_eq!(journal.count(JournalStage::Repair, "rewritten"), 1);
    }

    #[tokio::test]
    async fn test_attributed_routing_limits_oracle_calls() {
        let dir = tempdir().expect("tempdir");
        let mut store = store_with_two(dir.path());
        let oracle = Arc::new(ScriptedOracle::echo("TEST(X, Z) {}"));
        let builder = Arc::new(ScriptedBuildRunner::failing_times(
            1,
            "/out/test_b.cpp:4:2: error: expected ';' before '}' token",
        ));
        let repair = BuildRepairLoop::new(
            oracle.clone(),
            builder,
            Arc::new(Instructions::default()),
            RepairPolicy {
                max_attempts: 5,
                routing: RoutingPolicy::Attributed,
            },
        );
        let mut journal = RunJournal::new("t");

        let outcome = repair.repair_and_build(&mut store, &mut journal).await.expect("run");
        assert!(outcome.is_built());
        assert_eq!(oracle.calls(), 1);
        assert_eq!(store.get(1).map(|a| a.content.as_str()), Some("TEST(X, Z) {}"));
        assert_eq!(store.get(0).map(|a| a.content.as_str()), Some("TEST(X, Y) {}"));
    }

    #[test]
    fn test_outcome_serde_tag() {
        let json = serde_json::to_value(BuildRepairOutcome::Failed {
            attempts: 5,
            diagnostics: "error".to_string(),
        })
        .expect("serialize");
        assert_eq!(json["type"], "failed");
        assert_eq!(json["attempts"], 5);
    }

    #[test]
    fn test_policy_from_config() {
        let config = RepairConfig {
            max_attempts: 2,
            routing: RoutingPolicy::Attributed,
        };
        let policy = RepairPolicy::from(&config);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.routing, RoutingPolicy::Attributed);
    }
}
