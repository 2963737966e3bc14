//! Undo of the most recent live run.
//!
//! Entries are replayed newest first. A moved file is put back where it came
//! from; a copied file is deleted. Each entry succeeds or fails on its own,
//! and the ledger is consumed once every entry has been tried.
use crate::error::{FileError, LedgerError, OrganizeResult};
use crate::fs_ops::FileOps;
use crate::ledger::{LedgerEntry, LedgerHandle};
use crate::planner::ActionKind;
use crate::progress::ProgressReporter;
use crate::report::{Failure, Outcome, ReportEntry, RunReport};
use std::fs;
use std::io;
use std::path::Path;

/// Reverts ledger runs.
pub struct UndoManager;

impl UndoManager {
    /// Reverts the recorded run in `ledger`.
    ///
    /// With [`DryRunOps`](crate::fs_ops::DryRunOps) every check still runs
    /// and the report says what a real undo would do, but the ledger stays
    /// recorded.
    ///
    /// # Errors
    ///
    /// * [`LedgerError::Busy`] while a run or another undo holds the ledger
    /// * [`LedgerError::NothingToUndo`] when no run is recorded
    ///
    /// A store that cannot be cleared afterwards is only logged: the report
    /// is still returned and the ledger keeps the run.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sortwise::fs_ops::LiveOps;
    /// use sortwise::ledger::LedgerHandle;
    /// use sortwise::progress::SilentReporter;
    /// use sortwise::undo::UndoManager;
    ///
    /// let ledger = LedgerHandle::open_file("/tmp/sortwise-ledger.jsonl").unwrap();
    /// let report = UndoManager::undo(&ledger, &LiveOps, &SilentReporter).unwrap();
    /// println!("Restored {} files", report.summary().succeeded);
    /// ```
    pub fn undo(
        ledger: &LedgerHandle,
        ops: &dyn FileOps,
        reporter: &dyn ProgressReporter,
    ) -> OrganizeResult<RunReport> {
        let mut ledger = ledger.acquire()?;
        let run = ledger
            .recorded_run()
            .ok_or(LedgerError::NothingToUndo)?
            .clone();

        let dry_run = ops.is_dry_run();
        let mut report = RunReport::new(dry_run);
        reporter.on_start(Some(run.entries.len()), dry_run);

        for entry in run.entries.iter().rev() {
            let outcome = match Self::restore_entry(entry, ops) {
                Ok(()) => Outcome::Success,
                Err(e) => {
                    tracing::warn!(path = %entry.final_destination.display(), error = %e, "Could not undo entry");
                    Outcome::Failed(Failure::from(e))
                }
            };
            let restored_to = match entry.kind {
                ActionKind::Move => Some(entry.original_source.clone()),
                ActionKind::Copy => None,
            };
            let line = ReportEntry {
                source: entry.final_destination.clone(),
                destination: restored_to,
                outcome,
            };
            reporter.on_entry(report.entries.len(), &line);
            report.push(line);
        }

        for dir in run.created_dirs.iter().rev() {
            match ops.remove_empty_dir(dir) {
                Ok(true) => tracing::debug!(path = %dir.display(), "Removed created directory"),
                Ok(false) => {}
                Err(e) => tracing::warn!(path = %dir.display(), error = %e, "Could not remove directory"),
            }
        }

        // Files are already restored at this point; the report is returned regardless.
        if !dry_run && let Err(e) = ledger.consume() {
            tracing::warn!(error = %e, "Undo finished but the ledger could not be cleared");
        }

        reporter.on_finish(&report.summary(), false);
        Ok(report)
    }

    /// Validates and reverts a single entry.
    fn restore_entry(entry: &LedgerEntry, ops: &dyn FileOps) -> Result<(), FileError> {
        let current = &entry.final_destination;
        let metadata = match fs::symlink_metadata(current) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(FileError::Missing { path: current.clone() }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FileError::Missing { path: current.clone() });
            }
            Err(e) => return Err(FileError::io("read", current, e)),
        };

        if metadata.len() != entry.size {
            return Err(FileError::Modified { path: current.clone() });
        }

        match entry.kind {
            ActionKind::Copy => ops.remove_file(current),
            ActionKind::Move => {
                let original = &entry.original_source;
                if original.symlink_metadata().is_ok() {
                    return Err(FileError::Occupied { path: original.clone() });
                }
                if let Some(parent) = original.parent().filter(|p| !p.exists()) {
                    ops.ensure_dir(parent)?;
                }
                ops.transfer(ActionKind::Move, current, original)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::{DryRunOps, LiveOps};
    use crate::ledger::{ActionLog, Ledger, LedgerState, LedgerStore, MemoryStore, RunHeader, RunRecord};
    use crate::progress::SilentReporter;
    use crate::report::FailureKind;
    use tempfile::TempDir;

    /// Moves or copies `file` into `base/<folder>/` and records it like a live run would.
    fn record_run(ledger: &LedgerHandle, base: &Path, files: &[(&str, &str, ActionKind)]) {
        let mut guard = ledger.acquire().expect("Ledger should be free");
        let mut recorder = guard
            .begin_run(RunHeader::new(base, base))
            .expect("Failed to begin run");

        for (name, folder, kind) in files {
            let source = base.join(name);
            let dir = base.join(folder);
            for created in LiveOps.ensure_dir(&dir).expect("Failed to create dir") {
                recorder.record_dir(&created).expect("Failed to record dir");
            }
            let destination = dir.join(name);
            let size = fs::metadata(&source).expect("Missing source").len();
            LiveOps
                .transfer(*kind, &source, &destination)
                .expect("Failed to transfer");
            recorder
                .record_action(*kind, &source, &destination, size)
                .expect("Failed to record action");
        }
    }

    /// Memory store whose `clear` always fails.
    #[derive(Default)]
    struct StuckStore(MemoryStore);

    impl LedgerStore for StuckStore {
        fn load(&mut self) -> Result<Option<RunRecord>, LedgerError> {
            self.0.load()
        }
        fn begin(&mut self, header: &RunHeader) -> Result<(), LedgerError> {
            self.0.begin(header)
        }
        fn append(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
            self.0.append(entry)
        }
        fn record_dir(&mut self, path: &Path) -> Result<(), LedgerError> {
            self.0.record_dir(path)
        }
        fn clear(&mut self) -> Result<(), LedgerError> {
            Err(LedgerError::Store {
                path: "stuck".into(),
                source: io::Error::other("read-only medium"),
            })
        }
    }

    #[test]
    fn test_undo_nothing_recorded() {
        let ledger = LedgerHandle::in_memory();
        let result = UndoManager::undo(&ledger, &LiveOps, &SilentReporter);
        assert!(matches!(
            result,
            Err(crate::error::OrganizeError::Ledger(LedgerError::NothingToUndo))
        ));
    }

    #[test]
    fn test_undo_restores_moves_and_removes_dirs() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("image.png"), "image data").expect("Failed to write file");
        fs::write(base.join("document.pdf"), "pdf data").expect("Failed to write file");

        let ledger = LedgerHandle::in_memory();
        record_run(
            &ledger,
            base,
            &[
                ("image.png", "Images", ActionKind::Move),
                ("document.pdf", "Documents", ActionKind::Move),
            ],
        );
        assert!(!base.join("image.png").exists());

        let report = UndoManager::undo(&ledger, &LiveOps, &SilentReporter).expect("Undo failed");

        assert_eq!(report.summary().succeeded, 2);
        assert_eq!(report.entries[0].source, base.join("Documents").join("document.pdf"));
        assert!(base.join("image.png").exists());
        assert!(base.join("document.pdf").exists());
        assert!(!base.join("Images").exists());
        assert!(!base.join("Documents").exists());
        assert_eq!(
            ledger.acquire().unwrap().state(),
            &LedgerState::Consumed
        );
    }

    #[test]
    fn test_undo_copy_deletes_destination_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("notes.txt"), "notes").expect("Failed to write file");

        let ledger = LedgerHandle::in_memory();
        record_run(&ledger, base, &[("notes.txt", "Documents", ActionKind::Copy)]);
        assert!(base.join("Documents").join("notes.txt").exists());

        let report = UndoManager::undo(&ledger, &LiveOps, &SilentReporter).expect("Undo failed");
        assert_eq!(report.summary().succeeded, 1);
        assert_eq!(report.entries[0].destination, None);
        assert!(base.join("notes.txt").exists());
        assert!(!base.join("Documents").join("notes.txt").exists());
    }

    #[test]
    fn test_undo_refuses_occupied_missing_and_modified() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        for name in ["a.txt", "b.txt", "c.txt"] {
            fs::write(base.join(name), "same size").expect("Failed to write file");
        }

        let ledger = LedgerHandle::in_memory();
        record_run(
            &ledger,
            base,
            &[
                ("a.txt", "Documents", ActionKind::Move),
                ("b.txt", "Documents", ActionKind::Move),
                ("c.txt", "Documents", ActionKind::Move),
            ],
        );

        fs::write(base.join("a.txt"), "squatter").expect("Failed to create conflict");
        fs::remove_file(base.join("Documents").join("b.txt")).expect("Failed to remove");
        fs::write(base.join("Documents").join("c.txt"), "grown since then").expect("Failed to modify");

        let report = UndoManager::undo(&ledger, &LiveOps, &SilentReporter).expect("Undo failed");
        let kinds: Vec<_> = report
            .entries
            .iter()
            .map(|e| match &e.outcome {
                Outcome::Failed(f) => f.kind,
                other => panic!("expected failure, got {:?}", other),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![FailureKind::Modified, FailureKind::Missing, FailureKind::Occupied]
        );

        assert_eq!(fs::read_to_string(base.join("a.txt")).unwrap(), "squatter");
        assert!(base.join("Documents").exists());
        assert!(!ledger.can_undo().unwrap());
    }

    #[test]
    fn test_undo_dry_run_keeps_ledger() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("test.txt"), "test content").expect("Failed to write file");

        let ledger = LedgerHandle::in_memory();
        record_run(&ledger, base, &[("test.txt", "Documents", ActionKind::Move)]);

        let preview = UndoManager::undo(&ledger, &DryRunOps, &SilentReporter).expect("Preview failed");
        assert!(preview.dry_run);
        assert_eq!(preview.summary().succeeded, 1);
        assert!(!base.join("test.txt").exists());
        assert!(ledger.can_undo().unwrap());

        let live = UndoManager::undo(&ledger, &LiveOps, &SilentReporter).expect("Undo failed");
        assert_eq!(preview.entries, live.entries);
        assert!(base.join("test.txt").exists());
    }

    #[test]
    fn test_undo_report_survives_ledger_clear_failure() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("test.txt"), "x").expect("Failed to write file");

        let ledger = LedgerHandle::new(
            Ledger::open(Box::<StuckStore>::default()).expect("Failed to open ledger"),
        );
        record_run(&ledger, base, &[("test.txt", "Documents", ActionKind::Move)]);

        let report = UndoManager::undo(&ledger, &LiveOps, &SilentReporter)
            .expect("Undo should report even when the ledger cannot be cleared");
        assert_eq!(report.summary().succeeded, 1);
        assert!(base.join("test.txt").exists());
        assert!(matches!(
            ledger.acquire().unwrap().state(),
            LedgerState::Recorded(_)
        ));
    }

    #[test]
    fn test_undo_twice_has_nothing_left() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::write(base.join("test.txt"), "x").expect("Failed to write file");

        let ledger = LedgerHandle::in_memory();
        record_run(&ledger, base, &[("test.txt", "Documents", ActionKind::Move)]);

        UndoManager::undo(&ledger, &LiveOps, &SilentReporter).expect("Undo failed");
        assert!(UndoManager::undo(&ledger, &LiveOps, &SilentReporter).is_err());
    }
}
