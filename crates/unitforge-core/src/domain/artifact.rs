//! Generated test artifacts and their lifecycle.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::digest::ContentDigest;
use super::source::SourceUnit;

/// Lifecycle stage of a test artifact within one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStage {
    Generated,
    Refined,
    BuildAttempted,
    Repaired,
    Executed,
    Pruned,
    Reported,
}

impl ArtifactStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStage::Generated => "generated",
            ArtifactStage::Refined => "refined",
            ArtifactStage::BuildAttempted => "build_attempted",
            ArtifactStage::Repaired => "repaired",
            ArtifactStage::Executed => "executed",
            ArtifactStage::Pruned => "pruned",
            ArtifactStage::Reported => "reported",
        }
    }
}

/// One generated test file, permanently bound to its source unit.
#[derive(Debug, Clone)]
pub struct TestArtifact {
    /// The source unit this artifact tests.
    pub source: Arc<SourceUnit>,

    /// Test file name (e.g. `test_calculator.cpp`).
    pub file_name: String,

    /// Backing file path in the output directory.
    pub path: PathBuf,

    /// Current content, mirrored on disk.
    pub content: String,

    /// Number of test cases declared in `content`.
    pub case_count: usize,

    /// Latest lifecycle stage reached.
    pub stage: ArtifactStage,

    /// Number of content writes since generation (generation is revision 0).
    pub revision: u32,

    /// Digest of `content`.
    pub digest: ContentDigest,
}

impl TestArtifact {
    /// Create a freshly generated artifact.
    pub fn new(
        source: Arc<SourceUnit>,
        file_name: impl Into<String>,
        path: impl Into<PathBuf>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            source,
            file_name: file_name.into(),
            path: path.into(),
            case_count: count_test_cases(&content),
            digest: ContentDigest::from_bytes(content.as_bytes()),
            content,
            stage: ArtifactStage::Generated,
            revision: 0,
        }
    }

    /// Replace the in-memory content. Returns `false` when the new content is
    /// identical to the current one (nothing changes in that case).
    pub(crate) fn replace_content(&mut self, content: String) -> bool {
        let digest = ContentDigest::from_bytes(content.as_bytes());
        if digest == self.digest {
            return false;
        }
        self.case_count = count_test_cases(&content);
        self.content = content;
        self.digest = digest;
        self.revision += 1;
        true
    }
}

fn test_case_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bTEST(?:_F|_P)?\s*\(").expect("static regex"))
}

/// Count GoogleTest case declarations (`TEST(`, `TEST_F(`, `TEST_P(`).
pub fn count_test_cases(content: &str) -> usize {
    test_case_pattern().find_iter(content).count()
}
