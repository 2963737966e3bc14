//! Run results shared by previews, live runs and undo.
//!
//! A [`RunReport`] has the same shape no matter how it was produced, so a
//! preview can be compared entry for entry with the live run it predicts.

use crate::error::FileError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Why a file was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Extension has no category and uncategorized files are skipped.
    Uncategorized,
    /// Destination exists and the conflict policy is skip.
    Exists,
    /// The file already sits at its destination.
    InPlace,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Uncategorized => "uncategorized",
            SkipReason::Exists => "exists",
            SkipReason::InPlace => "in-place",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable machine code for a per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ConflictExhausted,
    Io,
    CopyVerify,
    Protected,
    Missing,
    Modified,
    Occupied,
    LedgerWrite,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ConflictExhausted => "conflict-exhausted",
            FailureKind::Io => "io",
            FailureKind::CopyVerify => "copy-verify",
            FailureKind::Protected => "protected",
            FailureKind::Missing => "missing",
            FailureKind::Modified => "modified",
            FailureKind::Occupied => "occupied",
            FailureKind::LedgerWrite => "ledger-write",
        }
    }
}

/// A per-file failure as it appears in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&FileError> for Failure {
    fn from(error: &FileError) -> Self {
        let kind = match error {
            FileError::ConflictExhausted { .. } => FailureKind::ConflictExhausted,
            FileError::Io { .. } => FailureKind::Io,
            FileError::Verification { .. } => FailureKind::CopyVerify,
            FileError::Protected { .. } => FailureKind::Protected,
            FileError::Missing { .. } => FailureKind::Missing,
            FileError::Modified { .. } => FailureKind::Modified,
            FileError::Occupied { .. } => FailureKind::Occupied,
            FileError::LedgerWrite(_) => FailureKind::LedgerWrite,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl From<FileError> for Failure {
    fn from(error: FileError) -> Self {
        Self::from(&error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    Skipped(SkipReason),
    Failed(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// One line of a report: which file, where it went (or would go), and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub outcome: Outcome,
}

/// Final counters handed to progress consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    pub(crate) fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Success,
    PartialFailure,
    TotalFailure,
}

/// Ordered outcomes of one run, preview or undo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub cancelled: bool,
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            cancelled: false,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for entry in &self.entries {
            summary.record(&entry.outcome);
        }
        summary
    }

    /// `Success` when nothing failed, `TotalFailure` when something failed and
    /// nothing succeeded, `PartialFailure` otherwise.
    pub fn status(&self) -> RunStatus {
        let summary = self.summary();
        if summary.failed == 0 {
            RunStatus::Success
        } else if summary.succeeded == 0 {
            RunStatus::TotalFailure
        } else {
            RunStatus::PartialFailure
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failed())
    }

    /// Serializes the report as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, outcome: Outcome) -> ReportEntry {
        ReportEntry {
            source: PathBuf::from(name),
            destination: None,
            outcome,
        }
    }

    #[test]
    fn test_status_success_when_nothing_failed() {
        let mut report = RunReport::new(false);
        report.push(entry("a", Outcome::Success));
        report.push(entry("b", Outcome::Skipped(SkipReason::Exists)));
        assert_eq!(report.status(), RunStatus::Success);
    }

    #[test]
    fn test_status_partial_and_total_failure() {
        let failure = Failure {
            kind: FailureKind::Io,
            message: "denied".to_string(),
        };

        let mut partial = RunReport::new(false);
        partial.push(entry("a", Outcome::Success));
        partial.push(entry("b", Outcome::Failed(failure.clone())));
        assert_eq!(partial.status(), RunStatus::PartialFailure);

        let mut total = RunReport::new(false);
        total.push(entry("b", Outcome::Failed(failure)));
        assert_eq!(total.status(), RunStatus::TotalFailure);
    }

    #[test]
    fn test_summary_counts() {
        let mut report = RunReport::new(true);
        report.push(entry("a", Outcome::Success));
        report.push(entry("b", Outcome::Success));
        report.push(entry("c", Outcome::Skipped(SkipReason::Uncategorized)));
        let summary = report.summary();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn test_failure_from_file_error_uses_stable_code() {
        let error = FileError::Verification {
            path: PathBuf::from("x"),
            expected: 10,
            actual: 4,
        };
        let failure = Failure::from(&error);
        assert_eq!(failure.kind, FailureKind::CopyVerify);
        assert!(failure.to_string().starts_with("copy-verify"));
    }
}
