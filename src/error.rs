//! Error types for sortwise.
//!
//! Errors are split by how far they travel:
//! - [`ConfigError`] and [`LedgerError`] abort a whole operation before any
//!   file is touched and surface as [`OrganizeError`].
//! - [`FileError`] belongs to a single file and is always folded into the
//!   run report; it never stops a run.

use std::path::PathBuf;
use thiserror::Error;

/// Whole-operation failure returned by organize and undo.
#[derive(Error, Debug)]
pub enum OrganizeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Problems detected before planning starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No source directory was given")]
    MissingSource,

    #[error("Source path not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Source is not a directory: {path}")]
    SourceNotDirectory { path: PathBuf },

    #[error("Source directory is empty: {path}")]
    EmptySource { path: PathBuf },

    #[error("Source and destination cannot be the same: {path}")]
    SameSourceAndDestination { path: PathBuf },

    #[error("Cannot organize into system directory: {path}")]
    ProtectedDestination { path: PathBuf },

    #[error("Destination is not usable: {path}\nCause: {source}")]
    UnreadableDestination {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Rename limit must be at least 1")]
    InvalidRenameLimit,

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("Invalid category file {path}: {reason}")]
    InvalidCategories { path: PathBuf, reason: String },

    #[error("IO error reading configuration {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Lifecycle violations on the undo ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Another run or undo is already in progress")]
    Busy,

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Failed to persist ledger {path}: {source}")]
    Store {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt ledger {path} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// A failure confined to one file. Converted to a report entry, never propagated.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("No free name for {path} after {limit} attempts")]
    ConflictExhausted { path: PathBuf, limit: u32 },

    #[error("Failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Copy of {path} is incomplete: expected {expected} bytes, found {actual}")]
    Verification {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Refusing to overwrite protected path {path}")]
    Protected { path: PathBuf },

    #[error("File not found: {path}")]
    Missing { path: PathBuf },

    #[error("File changed since it was recorded: {path}")]
    Modified { path: PathBuf },

    #[error("Original location is occupied: {path}")]
    Occupied { path: PathBuf },

    #[error("Could not record action in ledger: {0}")]
    LedgerWrite(#[from] LedgerError),
}

impl FileError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type OrganizeResult<T> = std::result::Result<T, OrganizeError>;
