//! Auditable record of every stage decision in one pipeline run.
//!
//! The journal is written to `<output>/<journal_file>` alongside a
//! `<journal_file>.digest` file holding the SHA-256 of the JSON bytes, so a
//! later reader can tell whether it was edited.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ContentDigest, ForgeError, Result};

/// Pipeline stage an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalStage {
    Scan,
    Generate,
    Refine,
    Build,
    Repair,
    Test,
    Prune,
    Coverage,
    Report,
    Pipeline,
}

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub stage: JournalStage,
    pub kind: String,
    pub detail: Value,
}

/// Ordered decisions of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunJournal {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub entries: Vec<JournalEntry>,
    pub outcome: Option<String>,
}

impl RunJournal {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            entries: Vec::new(),
            outcome: None,
        }
    }

    /// Append an entry; sequence numbers start at 1.
    pub fn record(&mut self, stage: JournalStage, kind: impl Into<String>, detail: Value) {
        let seq = self.entries.len() as u64 + 1;
        self.entries.push(JournalEntry {
            seq,
            at: Utc::now(),
            stage,
            kind: kind.into(),
            detail,
        });
    }

    pub fn set_outcome(&mut self, outcome: impl Into<String>) {
        self.outcome = Some(outcome.into());
    }

    /// Entries recorded for `stage`.
    pub fn entries_for(&self, stage: JournalStage) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    /// Number of entries of `kind` in `stage`.
    pub fn count(&self, stage: JournalStage, kind: &str) -> usize {
        self.entries_for(stage).filter(|e| e.kind == kind).count()
    }

    /// Persist as pretty JSON plus digest file; returns the JSON path.
    pub fn write_artifact(&self, path: &Path) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(self)?;
        let digest = ContentDigest::from_bytes(&json);

        std::fs::write(path, &json)?;
        std::fs::write(digest_path(path), digest.as_str().as_bytes())?;
        Ok(path.to_path_buf())
    }
}

fn digest_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".digest");
    PathBuf::from(name)
}

/// Read a journal written by [`RunJournal::write_artifact`] and verify its digest.
pub fn read_journal_artifact(path: &Path) -> Result<RunJournal> {
    let json = std::fs::read(path)?;
    let expected = std::fs::read_to_string(digest_path(path))?;
    let actual = ContentDigest::from_bytes(&json);
    if expected.trim() != actual.as_str() {
        return Err(ForgeError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual: actual.as_str().to_string(),
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_record_assigns_sequence() {
        let mut journal = RunJournal::new("run-1");
        journal.record(JournalStage::Build, "attempted", json!({"success": false}));
        journal.record(JournalStage::Repair, "attempt", json!({"attempt": 1}));
        journal.record(JournalStage::Build, "attempted", json!({"success": true}));

        assert_eq!(journal.entries.len(), 3);
        assert_eq!(journal.entries[2].seq, 3);
        assert_eq!(journal.count(JournalStage::Build, "attempted"), 2);
        assert_eq!(journal.entries_for(JournalStage::Repair).count(), 1);
    }

    #[test]
    fn test_artifact_roundtrip_with_digest() {
        let dir = tempdir().expect("tempdir");
        let mut journal = RunJournal::new("run-2");
        journal.record(JournalStage::Pipeline, "started", json!({"project": "/p"}));
        journal.set_outcome("succeeded");

        let path = journal
            .write_artifact(&dir.path().join("run_journal.json"))
            .expect("write");
        assert!(dir.path().join("run_journal.json.digest").exists());

        let loaded = read_journal_artifact(&path).expect("read");
        assert_eq!(loaded, journal);
    }

    #[test]
    fn test_tampered_artifact_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let journal = RunJournal::new("run-3");
        let path = journal
            .write_artifact(&dir.path().join("run_journal.json"))
            .expect("write");

        std::fs::write(&path, b"{\"run_id\":\"forged\"}").expect("tamper");
        let err = read_journal_artifact(&path).expect_err("should fail");
        assert!(matches!(err, ForgeError::DigestMismatch { .. }));
    }
}
