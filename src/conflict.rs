//! Destination name conflict resolution.
//!
//! [`resolve`] never touches the filesystem itself; it asks an injected
//! probe whether a path is taken. The same probe answers give the same
//! outcome, which keeps previews and live runs in agreement.

use crate::error::FileError;
use crate::report::SkipReason;
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What to do when the destination name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Append ` (n)` before the extension until a free name is found.
    #[default]
    Rename,
    /// Replace the existing file.
    Overwrite,
    /// Leave both files alone and skip the action.
    Skip,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Rename => "rename",
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Skip => "skip",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rename" => Ok(ConflictPolicy::Rename),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "skip" => Ok(ConflictPolicy::Skip),
            other => Err(format!(
                "unknown conflict policy '{}' (expected rename, overwrite or skip)",
                other
            )),
        }
    }
}

/// Result of conflict resolution for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOutcome {
    /// Desired name is free.
    Proceed(PathBuf),
    /// Desired name was taken; this free sibling name is used instead.
    RenamedTo(PathBuf),
    /// Desired name is taken and will be replaced.
    Overwrite(PathBuf),
    Skipped(SkipReason),
}

impl ResolvedOutcome {
    /// Final destination, unless skipped.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedOutcome::Proceed(p)
            | ResolvedOutcome::RenamedTo(p)
            | ResolvedOutcome::Overwrite(p) => Some(p),
            ResolvedOutcome::Skipped(_) => None,
        }
    }
}

/// Resolves `desired_name` inside `destination_dir` under `policy`.
///
/// `probe` reports whether a path is already taken. `rename_limit` bounds
/// the ` (n)` suffix search; exceeding it yields
/// [`FileError::ConflictExhausted`].
pub fn resolve<P>(
    destination_dir: &Path,
    desired_name: &OsStr,
    policy: ConflictPolicy,
    probe: P,
    rename_limit: u32,
) -> Result<ResolvedOutcome, FileError>
where
    P: Fn(&Path) -> bool,
{
    let desired = destination_dir.join(desired_name);
    if !probe(&desired) {
        return Ok(ResolvedOutcome::Proceed(desired));
    }

    match policy {
        ConflictPolicy::Skip => Ok(ResolvedOutcome::Skipped(SkipReason::Exists)),
        ConflictPolicy::Overwrite => Ok(ResolvedOutcome::Overwrite(desired)),
        ConflictPolicy::Rename => {
            for n in 1..=rename_limit {
                let candidate = destination_dir.join(numbered_name(desired_name, n));
                if !probe(&candidate) {
                    return Ok(ResolvedOutcome::RenamedTo(candidate));
                }
            }
            Err(FileError::ConflictExhausted {
                path: desired,
                limit: rename_limit,
            })
        }
    }
}

/// `report.pdf` -> `report (n).pdf`, `README` -> `README (n)`.
fn numbered_name(name: &OsStr, n: u32) -> OsString {
    let path = Path::new(name);
    let stem = path.file_stem().unwrap_or(name);

    let mut numbered = OsString::from(stem);
    numbered.push(format!(" ({})", n));
    if let Some(ext) = path.extension() {
        numbered.push(".");
        numbered.push(ext);
    }
    numbered
}
