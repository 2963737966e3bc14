//! Applies plan steps in order and builds the run report.
//!
//! Previews and live runs go through [`Executor::run`] alike. They differ
//! only in the injected [`FileOps`] and [`ActionLog`], so a preview reports
//! exactly what the live run would do against the same tree.

use crate::error::FileError;
use crate::fs_ops::{FileOps, check_creatable};
use crate::ledger::ActionLog;
use crate::planner::{ActionKind, ConflictOutcome, PlanStep, PlannedAction};
use crate::progress::{CancellationToken, ProgressReporter};
use crate::report::{Failure, Outcome, ReportEntry, RunReport};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub struct Executor<'a> {
    ops: &'a dyn FileOps,
    reporter: &'a dyn ProgressReporter,
    cancel: &'a CancellationToken,
}

enum Step {
    Continue,
    Halt,
}

impl<'a> Executor<'a> {
    pub fn new(
        ops: &'a dyn FileOps,
        reporter: &'a dyn ProgressReporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            ops,
            reporter,
            cancel,
        }
    }

    /// Runs every step, recording completed actions in `log`.
    ///
    /// Per-file failures become report entries. A failed ledger append halts
    /// the run after rolling back the action it belonged to.
    pub fn run<I>(&self, steps: I, total: Option<usize>, log: &mut dyn ActionLog) -> RunReport
    where
        I: IntoIterator<Item = PlanStep>,
    {
        let dry_run = self.ops.is_dry_run();
        let mut report = RunReport::new(dry_run);
        let mut failed_dirs: HashMap<PathBuf, Failure> = HashMap::new();
        self.reporter.on_start(total, dry_run);

        for step in steps {
            if self.cancel.is_cancelled() {
                tracing::info!("Run cancelled; remaining files left untouched");
                report.cancelled = true;
                break;
            }

            match step {
                PlanStep::EnsureDir(dir) => self.ensure_dir(dir, log, &mut failed_dirs),
                PlanStep::Rejected { source, failure } => {
                    self.push(
                        &mut report,
                        ReportEntry {
                            source,
                            destination: None,
                            outcome: Outcome::Failed(failure),
                        },
                    );
                }
                PlanStep::Action(action) => {
                    let (entry, next) = self.apply(&action, log, &failed_dirs);
                    self.push(&mut report, entry);
                    if let Step::Halt = next {
                        tracing::error!("Ledger is no longer writable; stopping the run");
                        report.cancelled = true;
                        break;
                    }
                }
            }
        }

        self.reporter.on_finish(&report.summary(), report.cancelled);
        report
    }

    fn push(&self, report: &mut RunReport, entry: ReportEntry) {
        self.reporter.on_entry(report.entries.len(), &entry);
        report.push(entry);
    }

    fn ensure_dir(
        &self,
        dir: PathBuf,
        log: &mut dyn ActionLog,
        failed_dirs: &mut HashMap<PathBuf, Failure>,
    ) {
        match self.ops.ensure_dir(&dir) {
            Ok(created) => {
                for path in created {
                    if let Err(e) = log.record_dir(&path) {
                        tracing::warn!(path = %path.display(), error = %e, "Could not record created directory");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Could not create destination directory");
                failed_dirs.insert(dir, Failure::from(&e));
            }
        }
    }

    fn apply(
        &self,
        action: &PlannedAction,
        log: &mut dyn ActionLog,
        failed_dirs: &HashMap<PathBuf, Failure>,
    ) -> (ReportEntry, Step) {
        let source = action.source.path.clone();
        let destination = match &action.conflict {
            ConflictOutcome::Proceed | ConflictOutcome::Overwrite => action.destination.as_path(),
            ConflictOutcome::RenamedTo(path) => path.as_path(),
            ConflictOutcome::Skipped(reason) => {
                tracing::debug!(source = %source.display(), %reason, "Skipped");
                let entry = ReportEntry {
                    source,
                    destination: None,
                    outcome: Outcome::Skipped(*reason),
                };
                return (entry, Step::Continue);
            }
        };

        let failed = |failure: Failure| ReportEntry {
            source: action.source.path.clone(),
            destination: Some(destination.to_path_buf()),
            outcome: Outcome::Failed(failure),
        };

        if let Some(failure) = destination.parent().and_then(|p| failed_dirs.get(p)) {
            return (failed(failure.clone()), Step::Continue);
        }

        let size = match precheck(action, destination) {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(source = %source.display(), error = %e, "Action rejected");
                return (failed(Failure::from(e)), Step::Continue);
            }
        };

        if let Err(e) = self.ops.transfer(action.kind, &source, destination) {
            tracing::warn!(source = %source.display(), error = %e, "Action failed");
            return (failed(Failure::from(e)), Step::Continue);
        }

        if let Err(e) = log.record_action(action.kind, &source, destination, size) {
            self.roll_back(action.kind, &source, destination);
            return (failed(Failure::from(FileError::from(e))), Step::Halt);
        }

        tracing::info!(
            action = %action.kind,
            source = %source.display(),
            destination = %destination.display(),
            "Done"
        );
        let entry = ReportEntry {
            source,
            destination: Some(destination.to_path_buf()),
            outcome: Outcome::Success,
        };
        (entry, Step::Continue)
    }

    fn roll_back(&self, kind: ActionKind, source: &Path, destination: &Path) {
        let result = match kind {
            ActionKind::Move => self.ops.transfer(ActionKind::Move, destination, source),
            ActionKind::Copy => self.ops.remove_file(destination),
        };
        if let Err(e) = result {
            tracing::error!(
                source = %source.display(),
                destination = %destination.display(),
                error = %e,
                "Could not roll back unrecorded action"
            );
        }
    }
}

/// Checks that hold for previews and live runs alike. Returns the source size.
fn precheck(action: &PlannedAction, destination: &Path) -> Result<u64, FileError> {
    let source = &action.source.path;
    let metadata = match fs::symlink_metadata(source) {
        Ok(m) if m.is_file() => m,
        Ok(_) => {
            return Err(FileError::Missing {
                path: source.clone(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FileError::Missing {
                path: source.clone(),
            });
        }
        Err(e) => return Err(FileError::io("read", source, e)),
    };

    if let Some(parent) = destination.parent() {
        check_creatable(parent)?;
    }

    match (&action.conflict, fs::symlink_metadata(destination)) {
        (ConflictOutcome::Overwrite, Ok(existing))
            if existing.is_dir() || existing.permissions().readonly() =>
        {
            Err(FileError::Protected {
                path: destination.to_path_buf(),
            })
        }
        (ConflictOutcome::Proceed | ConflictOutcome::RenamedTo(_), Ok(_)) => {
            Err(FileError::Occupied {
                path: destination.to_path_buf(),
            })
        }
        _ => Ok(metadata.len()),
    }
}
