//! The persisted end-of-run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate section of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_artifacts: usize,
    pub total_cases: usize,
    /// Mean over artifacts that have a coverage record, rounded to two decimals.
    pub average_coverage_percent: f64,
    pub processed_source_names: Vec<String>,
}

/// Per-artifact line of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    pub source_name: String,
    pub artifact_name: String,
    pub case_count: usize,
    /// `None` when the coverage tool produced nothing for the source file.
    pub coverage_percent: Option<f64>,
}

/// Final aggregate written once at the end of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub summary: ReportSummary,
    pub details: Vec<ReportDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_wire_field_names() {
        let report = Report {
            timestamp: Utc::now(),
            summary: ReportSummary {
                total_artifacts: 1,
                total_cases: 4,
                average_coverage_percent: 62.5,
                processed_source_names: vec!["calc.cpp".to_string()],
            },
            details: vec![ReportDetail {
                source_name: "calc.cpp".to_string(),
                artifact_name: "test_calc.cpp".to_string(),
                case_count: 4,
                coverage_percent: None,
            }],
        };

        let json = serde_json::to_value(&report).expect("serialize");
        assert!(json.get("timestamp").is_some());
        assert_eq!(json["summary"]["totalArtifacts"], 1);
        assert_eq!(json["summary"]["totalCases"], 4);
        assert_eq!(json["summary"]["averageCoveragePercent"], 62.5);
        assert_eq!(json["summary"]["processedSourceNames"][0], "calc.cpp");
        assert_eq!(json["details"][0]["artifactName"], "test_calc.cpp");
        assert!(json["details"][0]["coveragePercent"].is_null());
    }
}
