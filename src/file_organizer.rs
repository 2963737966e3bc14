//! Entry point for organizing a directory.
//!
//! [`OrganizeRequest`] says what to do; [`FileOrganizer`] validates it,
//! plans it and runs it, either as a preview or for real.

use crate::category::CategoryMap;
use crate::classifier::OrganizationMode;
use crate::config::{CompiledFilters, DEFAULT_RENAME_LIMIT};
use crate::conflict::ConflictPolicy;
use crate::error::{ConfigError, OrganizeResult};
use crate::executor::Executor;
use crate::fs_ops::{DryRunOps, FileOps, LiveOps};
use crate::ledger::{LedgerHandle, NoopLog, RunHeader};
use crate::planner::{ActionKind, Plan, PlanStep};
use crate::progress::{CancellationToken, ProgressReporter, SilentReporter};
use crate::report::RunReport;
use crate::undo::UndoManager;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Folder created inside the source when no destination is given.
pub const DEFAULT_DESTINATION_DIR: &str = "Organized_Files";

#[cfg(target_os = "linux")]
const SYSTEM_DIRS: &[&str] = &["/usr", "/bin", "/sbin", "/etc"];
#[cfg(target_os = "macos")]
const SYSTEM_DIRS: &[&str] = &["/System", "/Library", "/usr"];
#[cfg(windows)]
const SYSTEM_DIRS: &[&str] = &[
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
];
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
const SYSTEM_DIRS: &[&str] = &["/usr", "/bin", "/sbin", "/etc"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizeRequest {
    pub source: PathBuf,
    /// Defaults to `<source>/Organized_Files`.
    pub destination: Option<PathBuf>,
    pub mode: OrganizationMode,
    pub action: ActionKind,
    pub conflict_policy: ConflictPolicy,
    pub recursive: bool,
    pub skip_uncategorized: bool,
    /// Upper bound on ` (n)` suffixes tried by [`ConflictPolicy::Rename`].
    pub rename_limit: u32,
}

impl OrganizeRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: None,
            mode: OrganizationMode::default(),
            action: ActionKind::default(),
            conflict_policy: ConflictPolicy::default(),
            recursive: false,
            skip_uncategorized: false,
            rename_limit: DEFAULT_RENAME_LIMIT,
        }
    }

    pub fn destination_root(&self) -> PathBuf {
        self.destination
            .clone()
            .unwrap_or_else(|| self.source.join(DEFAULT_DESTINATION_DIR))
    }

    /// Checks the request against the filesystem and returns the normalized
    /// `(source, destination)` roots.
    ///
    /// # Errors
    ///
    /// Every [`ConfigError`] variant describing an unusable source or
    /// destination, and [`ConfigError::InvalidRenameLimit`] for a zero limit.
    pub fn validate(&self) -> Result<(PathBuf, PathBuf), ConfigError> {
        if self.rename_limit == 0 {
            return Err(ConfigError::InvalidRenameLimit);
        }
        if self.source.as_os_str().is_empty() {
            return Err(ConfigError::MissingSource);
        }

        let source = match fs::metadata(&self.source) {
            Ok(m) if m.is_dir() => self.source.canonicalize().map_err(|source| ConfigError::Io {
                path: self.source.clone(),
                source,
            })?,
            Ok(_) => {
                return Err(ConfigError::SourceNotDirectory {
                    path: self.source.clone(),
                });
            }
            Err(_) => {
                return Err(ConfigError::SourceNotFound {
                    path: self.source.clone(),
                });
            }
        };

        let destination = normalize_destination(&self.destination_root())?;

        if source == destination {
            return Err(ConfigError::SameSourceAndDestination { path: source });
        }
        if is_system_path(&destination) {
            return Err(ConfigError::ProtectedDestination { path: destination });
        }
        if destination.exists() {
            check_destination_dir(&destination)?;
        }

        let mut entries = fs::read_dir(&source).map_err(|e| ConfigError::Io {
            path: source.clone(),
            source: e,
        })?;
        if entries.next().is_none() {
            return Err(ConfigError::EmptySource { path: source });
        }

        Ok((source, destination))
    }
}

/// Makes `path` absolute and resolves symlinks in the part that exists.
fn normalize_destination(path: &Path) -> Result<PathBuf, ConfigError> {
    let unreadable = |source| ConfigError::UnreadableDestination {
        path: path.to_path_buf(),
        source,
    };

    let absolute = std::path::absolute(path).map_err(unreadable)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while existing.symlink_metadata().is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize().map_err(unreadable)?;
    resolved.extend(missing.iter().rev());
    Ok(resolved)
}

/// Directories a run must never write into.
fn protected_dirs() -> Vec<PathBuf> {
    let mut protected: Vec<PathBuf> = SYSTEM_DIRS.iter().copied().map(PathBuf::from).collect();
    if cfg!(windows)
        && let Some(home) = dirs::home_dir()
    {
        protected.push(home.join("AppData"));
    }
    protected
}

fn is_system_path(path: &Path) -> bool {
    protected_dirs().iter().any(|dir| {
        path.starts_with(dir) || dir.canonicalize().is_ok_and(|real| path.starts_with(real))
    })
}

fn check_destination_dir(path: &Path) -> Result<(), ConfigError> {
    let unreadable = |source| ConfigError::UnreadableDestination {
        path: path.to_path_buf(),
        source,
    };
    if !path.is_dir() {
        return Err(unreadable(io::Error::other("not a directory")));
    }
    fs::read_dir(path).map(|_| ()).map_err(unreadable)
}

/// Validates, plans and runs organize requests.
///
/// One organizer can serve many requests. Progress goes to the configured
/// [`ProgressReporter`]; cancelling the token returned by
/// [`FileOrganizer::cancellation_token`] stops a run between files.
///
/// # Examples
///
/// ```no_run
/// use sortwise::category::CategoryMap;
/// use sortwise::file_organizer::{FileOrganizer, OrganizeRequest};
/// use sortwise::ledger::LedgerHandle;
///
/// let organizer = FileOrganizer::new(CategoryMap::default());
/// let request = OrganizeRequest::new("/home/me/Downloads");
///
/// let preview = organizer.preview(&request).unwrap();
/// println!("{} files would move", preview.summary().succeeded);
///
/// let ledger = LedgerHandle::in_memory();
/// let report = organizer.organize(&request, &ledger).unwrap();
/// println!("{} files moved", report.summary().succeeded);
/// ```
pub struct FileOrganizer {
    categories: CategoryMap,
    filters: CompiledFilters,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl Default for FileOrganizer {
    fn default() -> Self {
        Self::new(CategoryMap::default())
    }
}

impl FileOrganizer {
    pub fn new(categories: CategoryMap) -> Self {
        Self {
            categories,
            filters: CompiledFilters::allow_all(),
            reporter: Arc::new(SilentReporter),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_filters(mut self, filters: CompiledFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    /// Validates `request` and returns its plan without running it.
    pub fn plan<'a>(&'a self, request: &'a OrganizeRequest) -> Result<Plan<'a>, ConfigError> {
        let (source, destination) = request.validate()?;
        Ok(Plan::new(
            request,
            source,
            destination,
            &self.categories,
            &self.filters,
        ))
    }

    /// Reports what [`FileOrganizer::organize`] would do. Touches nothing
    /// and leaves every ledger alone.
    pub fn preview(&self, request: &OrganizeRequest) -> OrganizeResult<RunReport> {
        let plan = self.plan(request)?;
        let total = reportable_steps(&plan);
        let report = Executor::new(&DryRunOps, self.reporter.as_ref(), &self.cancel).run(
            plan.steps(),
            Some(total),
            &mut NoopLog,
        );
        log_summary(&report);
        Ok(report)
    }

    /// Runs `request` for real, recording every completed action in `ledger`.
    ///
    /// The previously recorded run can no longer be undone once this starts.
    ///
    /// # Errors
    ///
    /// Validation failures, [`LedgerError::Busy`](crate::error::LedgerError::Busy)
    /// while another run or undo holds the ledger, and ledger store failures
    /// when the run cannot be started.
    pub fn organize(
        &self,
        request: &OrganizeRequest,
        ledger: &LedgerHandle,
    ) -> OrganizeResult<RunReport> {
        let plan = self.plan(request)?;
        let mut ledger = ledger.acquire()?;
        let total = reportable_steps(&plan);

        let mut recorder =
            ledger.begin_run(RunHeader::new(plan.source_root(), plan.destination_root()))?;
        tracing::info!(
            source = %plan.source_root().display(),
            destination = %plan.destination_root().display(),
            mode = %request.mode,
            action = %request.action,
            "Starting run"
        );
        let report = Executor::new(&LiveOps, self.reporter.as_ref(), &self.cancel).run(
            plan.steps(),
            Some(total),
            &mut recorder,
        );
        for dir in recorder.finish().iter().rev() {
            match LiveOps.remove_empty_dir(dir) {
                Ok(true) => tracing::debug!(path = %dir.display(), "Removed unused directory"),
                Ok(false) => {}
                Err(e) => tracing::warn!(path = %dir.display(), error = %e, "Could not remove directory"),
            }
        }
        log_summary(&report);
        Ok(report)
    }

    /// Reverts the last run recorded in `ledger`. With `dry_run` the
    /// ledger keeps the run.
    pub fn undo(&self, ledger: &LedgerHandle, dry_run: bool) -> OrganizeResult<RunReport> {
        let report = if dry_run {
            UndoManager::undo(ledger, &DryRunOps, self.reporter.as_ref())?
        } else {
            UndoManager::undo(ledger, &LiveOps, self.reporter.as_ref())?
        };
        log_summary(&report);
        Ok(report)
    }
}

/// Steps that will produce a report entry.
fn reportable_steps(plan: &Plan<'_>) -> usize {
    plan.steps()
        .filter(|step| !matches!(step, PlanStep::EnsureDir(_)))
        .count()
}

fn log_summary(report: &RunReport) {
    let summary = report.summary();
    tracing::info!(
        dry_run = report.dry_run,
        cancelled = report.cancelled,
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        failed = summary.failed,
        "Finished"
    );
}
