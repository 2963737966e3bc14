//! Pure mapping from a file snapshot to a relative destination folder.

use crate::category::{CategoryMap, UNCATEGORIZED};
use crate::planner::FileEntry;
use crate::report::SkipReason;
use chrono::{DateTime, Datelike, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

const MIB: u64 = 1024 * 1024;

/// Bucket used by [`OrganizationMode::ByFirstLetter`] for names that do not start with a letter.
pub const NON_LETTER_BUCKET: &str = "#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateGranularity {
    /// `{year}/{month:02}-{MonthName}`
    Month,
    /// `{year}/{month:02}/{day:02}`
    Day,
}

/// How files are grouped under the destination root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrganizationMode {
    #[default]
    ByType,
    ByDate(DateGranularity),
    BySize,
    ByFirstLetter,
    ByName,
}

impl OrganizationMode {
    pub const ALL: [OrganizationMode; 6] = [
        OrganizationMode::ByType,
        OrganizationMode::ByDate(DateGranularity::Month),
        OrganizationMode::ByDate(DateGranularity::Day),
        OrganizationMode::BySize,
        OrganizationMode::ByFirstLetter,
        OrganizationMode::ByName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationMode::ByType => "type",
            OrganizationMode::ByDate(DateGranularity::Month) => "date",
            OrganizationMode::ByDate(DateGranularity::Day) => "day",
            OrganizationMode::BySize => "size",
            OrganizationMode::ByFirstLetter => "first-letter",
            OrganizationMode::ByName => "name",
        }
    }
}

impl fmt::Display for OrganizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrganizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "type" => Ok(OrganizationMode::ByType),
            "date" | "month" => Ok(OrganizationMode::ByDate(DateGranularity::Month)),
            "day" => Ok(OrganizationMode::ByDate(DateGranularity::Day)),
            "size" => Ok(OrganizationMode::BySize),
            "first-letter" | "letter" => Ok(OrganizationMode::ByFirstLetter),
            "name" => Ok(OrganizationMode::ByName),
            other => Err(format!(
                "unknown organization mode '{}' (expected one of: type, date, day, size, first-letter, name)",
                other
            )),
        }
    }
}

impl TryFrom<String> for OrganizationMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrganizationMode> for String {
    fn from(mode: OrganizationMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Fixed size buckets. Lower bound inclusive, upper bound exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeTier {
    /// Under 1 MiB
    Small,
    /// 1 MiB up to 100 MiB
    Medium,
    /// 100 MiB and above
    Large,
}

impl SizeTier {
    pub fn for_size(size: u64) -> Self {
        if size < MIB {
            SizeTier::Small
        } else if size < 100 * MIB {
            SizeTier::Medium
        } else {
            SizeTier::Large
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SizeTier::Small => "Small",
            SizeTier::Medium => "Medium",
            SizeTier::Large => "Large",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Folder relative to the destination root.
    Folder(PathBuf),
    Skip(SkipReason),
}

/// Classifies `entry` under `mode`. Performs no I/O.
///
/// With `skip_uncategorized`, [`OrganizationMode::ByType`] returns
/// [`Classification::Skip`] for extensions missing from `categories` instead
/// of the "Uncategorized" folder. Other modes ignore the flag.
pub fn classify(
    entry: &FileEntry,
    mode: OrganizationMode,
    categories: &CategoryMap,
    skip_uncategorized: bool,
) -> Classification {
    match mode {
        OrganizationMode::ByType => match categories.lookup(&entry.extension) {
            Some(category) => Classification::Folder(PathBuf::from(category)),
            None if skip_uncategorized => Classification::Skip(SkipReason::Uncategorized),
            None => Classification::Folder(PathBuf::from(UNCATEGORIZED)),
        },
        OrganizationMode::ByDate(granularity) => {
            Classification::Folder(date_folder(entry, granularity))
        }
        OrganizationMode::BySize => {
            Classification::Folder(PathBuf::from(SizeTier::for_size(entry.size).name()))
        }
        OrganizationMode::ByFirstLetter => {
            Classification::Folder(PathBuf::from(first_letter_bucket(entry)))
        }
        OrganizationMode::ByName => {
            let folder = entry
                .path
                .file_stem()
                .or_else(|| entry.path.file_name())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(NON_LETTER_BUCKET));
            Classification::Folder(folder)
        }
    }
}

fn date_folder(entry: &FileEntry, granularity: DateGranularity) -> PathBuf {
    let local: DateTime<Local> = DateTime::from(entry.modified);
    let year = PathBuf::from(local.year().to_string());
    match granularity {
        DateGranularity::Month => {
            year.join(format!("{:02}-{}", local.month(), local.format("%B")))
        }
        DateGranularity::Day => year
            .join(format!("{:02}", local.month()))
            .join(format!("{:02}", local.day())),
    }
}

fn first_letter_bucket(entry: &FileEntry) -> String {
    let stem = entry
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match stem.chars().next() {
        Some(c) if c.is_alphabetic() => c.to_uppercase().collect(),
        _ => NON_LETTER_BUCKET.to_string(),
    }
}
