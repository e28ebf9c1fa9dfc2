//! Structured observability hooks for pipeline lifecycle events.
//!
//! Every helper logs one `event = "<name>"` line with typed fields so the
//! JSON log format can be filtered without parsing messages.

use tracing::{info, warn};

/// Span tagging every log emitted during a pipeline run with its id.
///
/// Attach it to the run future with `tracing::Instrument` so it is
/// re-entered on every poll.
pub fn pipeline_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("unitforge.run", run_id = %run_id)
}

pub fn emit_pipeline_started(run_id: &str, project: &str) {
    info!(event = "pipeline.started", run_id = %run_id, project = %project);
}

pub fn emit_pipeline_finished(run_id: &str, status: &str, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        status = %status,
        duration_ms = duration_ms,
    );
}

/// One invocation of the build tool.
pub fn emit_build_attempted(attempt: u32, success: bool) {
    info!(event = "build.attempted", attempt = attempt, success = success);
}

/// One oracle-driven rewrite pass of the repair loop.
pub fn emit_repair_attempt(attempt: u32, max_attempts: u32, targets: usize, rewritten: usize) {
    info!(
        event = "repair.attempt",
        attempt = attempt,
        max_attempts = max_attempts,
        targets = targets,
        rewritten = rewritten,
    );
}

pub fn emit_tests_executed(cycle: u32, passed: bool) {
    info!(event = "tests.executed", cycle = cycle, passed = passed);
}

pub fn emit_prune_cycle(cycle: u32, targets: usize, attributed: bool) {
    info!(
        event = "prune.cycle",
        cycle = cycle,
        targets = targets,
        attributed = attributed,
    );
}

/// A per-artifact failure that degrades the artifact but not the run.
pub fn emit_artifact_degraded(stage: &str, artifact: &str, error: &dyn std::fmt::Display) {
    warn!(event = "artifact.degraded", stage = %stage, artifact = %artifact, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_span_create() {
        let span = pipeline_span("test-run-id");
        let _entered = span.enter();
        emit_build_attempted(0, true);
    }
}
