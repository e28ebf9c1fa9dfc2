//! Report assembly, persistence and console rendering.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::domain::{CoverageRecord, Report, ReportDetail, ReportSummary};
use crate::store::ArtifactStore;

/// Assemble the final report from the store and the optional coverage record.
///
/// An artifact whose source file has no coverage entry gets
/// `coverage_percent: None` and does not count towards the average.
pub fn build_report(store: &ArtifactStore, coverage: Option<&CoverageRecord>) -> Report {
    let details: Vec<ReportDetail> = store
        .iter()
        .map(|artifact| ReportDetail {
            source_name: artifact.source.name.clone(),
            artifact_name: artifact.file_name.clone(),
            case_count: artifact.case_count,
            coverage_percent: coverage
                .and_then(|record| record.get(&artifact.source.path))
                .map(|c| c.percentage),
        })
        .collect();

    let covered: Vec<f64> = details.iter().filter_map(|d| d.coverage_percent).collect();
    let average = if covered.is_empty() {
        0.0
    } else {
        round2(covered.iter().sum::<f64>() / covered.len() as f64)
    };

    Report {
        timestamp: Utc::now(),
        summary: ReportSummary {
            total_artifacts: details.len(),
            total_cases: details.iter().map(|d| d.case_count).sum(),
            average_coverage_percent: average,
            processed_source_names: details.iter().map(|d| d.source_name.clone()).collect(),
        },
        details,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Write the report as pretty JSON to `output_dir/file_name`.
pub fn write_report_json(output_dir: &Path, file_name: &str, report: &Report) -> Result<PathBuf> {
    let path = output_dir.join(file_name);
    let content = serde_json::to_string_pretty(report).context("serialize report")?;
    std::fs::write(&path, content).with_context(|| format!("write {:?}", path))?;
    Ok(path)
}

/// Plain-text console summary of a written report.
pub fn render_summary(report: &Report, report_path: &Path) -> String {
    let mut out = String::new();
    out.push_str("Test Generation Report\n");
    out.push_str(&format!(
        "- source files processed: {}\n",
        report.summary.processed_source_names.len()
    ));
    out.push_str(&format!(
        "- test files generated: {}\n",
        report.summary.total_artifacts
    ));
    out.push_str(&format!("- total test cases: {}\n", report.summary.total_cases));
    out.push_str(&format!(
        "- average coverage: {:.2}%\n",
        report.summary.average_coverage_percent
    ));
    out.push_str(&format!("- report saved to: {}\n", report_path.display()));
    out
}
