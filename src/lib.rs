//! sortwise - sort a directory into folders, preview it first, undo it later
//!
//! This library classifies files by type, modification date, size, first
//! letter or name, plans where each file goes, resolves name conflicts,
//! moves or copies them with per-file error isolation, and records every
//! completed action in a ledger so the last run can be reverted.

pub mod category;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod error;
pub mod executor;
pub mod file_organizer;
pub mod fs_ops;
pub mod ledger;
pub mod output;
pub mod planner;
pub mod progress;
pub mod report;
pub mod undo;

pub use category::{CategoryMap, UNCATEGORIZED};
pub use classifier::{DateGranularity, OrganizationMode, SizeTier, classify};
pub use config::{CompiledFilters, Config};
pub use conflict::{ConflictPolicy, ResolvedOutcome, resolve};
pub use error::{ConfigError, FileError, LedgerError, OrganizeError, OrganizeResult};
pub use file_organizer::{FileOrganizer, OrganizeRequest};
pub use ledger::{Ledger, LedgerEntry, LedgerHandle, LedgerState};
pub use planner::{ActionKind, ConflictOutcome, FileEntry, Plan, PlanStep, PlannedAction};
pub use progress::{CancellationToken, ChannelReporter, ProgressEvent, ProgressReporter};
pub use report::{Outcome, ReportEntry, RunReport, RunStatus, RunSummary, SkipReason};
pub use undo::UndoManager;

pub use cli::run_cli;
