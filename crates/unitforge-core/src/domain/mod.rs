//! Domain models for unitforge.
//!
//! Canonical definitions for the core entities:
//! - `SourceUnit`: one scanned source file
//! - `TestArtifact`: the generated test file bound to a source unit
//! - `CoverageRecord`: per-file line coverage inside the project root
//! - `Report`: the persisted end-of-run aggregate

pub mod artifact;
pub mod coverage;
pub mod digest;
pub mod error;
pub mod report;
pub mod source;

pub use artifact::{count_test_cases, ArtifactStage, TestArtifact};
pub use coverage::{CoverageRecord, FileCoverage};
pub use digest::ContentDigest;
pub use error::{ForgeError, Result};
pub use report::{Report, ReportDetail, ReportSummary};
pub use source::{artifact_file_name, SourceUnit};
