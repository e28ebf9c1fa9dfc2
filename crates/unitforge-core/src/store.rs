//! In-memory artifact records mirrored to backing files.
//!
//! The store exclusively owns every [`TestArtifact`] of one pipeline run.
//! Every content change goes through [`ArtifactStore::overwrite`], which
//! writes the backing file before updating the record, so memory and disk
//! never disagree after a successful call.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::domain::{ArtifactStage, ForgeError, Result, SourceUnit, TestArtifact};

/// Owned set of test artifacts for one pipeline run.
#[derive(Debug)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    artifacts: Vec<TestArtifact>,
    taken_names: HashSet<String>,
}

impl ArtifactStore {
    /// Create an empty store writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            artifacts: Vec::new(),
            taken_names: HashSet::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File name the next artifact for `source` would receive.
    ///
    /// Two sources with the same file name in different directories would
    /// collide on `test_<stem>.cpp`; later ones get `_2`, `_3`, ... suffixes.
    pub fn next_file_name(&self, source: &SourceUnit) -> String {
        let base = source.artifact_file_name();
        if !self.taken_names.contains(&base) {
            return base;
        }
        let stem = base.trim_end_matches(".cpp");
        (2..)
            .map(|n| format!("{stem}_{n}.cpp"))
            .find(|candidate| !self.taken_names.contains(candidate))
            .unwrap_or(base)
    }

    /// Register a freshly generated artifact and write its backing file.
    ///
    /// Returns the artifact's index in the store.
    pub fn insert(&mut self, source: Arc<SourceUnit>, content: String) -> Result<usize> {
        let file_name = self.next_file_name(&source);
        let path = self.output_dir.join(&file_name);
        std::fs::write(&path, content.as_bytes())?;

        debug!(artifact = %file_name, source = %source.name, "artifact written");
        self.taken_names.insert(file_name.clone());
        self.artifacts
            .push(TestArtifact::new(source, file_name, path, content));
        Ok(self.artifacts.len() - 1)
    }

    /// Overwrite an artifact's content on disk and in memory, and move it to
    /// `stage`.
    ///
    /// The file is rewritten even when the content is unchanged. Returns
    /// whether the content differs from the previous revision.
    pub fn overwrite(&mut self, index: usize, content: String, stage: ArtifactStage) -> Result<bool> {
        let artifact = self
            .artifacts
            .get_mut(index)
            .ok_or_else(|| ForgeError::ArtifactNotFound(format!("index {index}")))?;
        std::fs::write(&artifact.path, content.as_bytes())?;
        let changed = artifact.replace_content(content);
        artifact.stage = stage;
        Ok(changed)
    }

    /// Move every artifact to `stage`.
    pub fn mark_all(&mut self, stage: ArtifactStage) {
        for artifact in &mut self.artifacts {
            artifact.stage = stage;
        }
    }

    pub fn get(&self, index: usize) -> Option<&TestArtifact> {
        self.artifacts.get(index)
    }

    /// Index of the artifact with the given file name.
    pub fn position(&self, file_name: &str) -> Option<usize> {
        self.artifacts.iter().position(|a| a.file_name == file_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestArtifact> {
        self.artifacts.iter()
    }

    /// Backing file paths, in insertion order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
