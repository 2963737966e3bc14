//! Turns a source tree into an ordered, restartable sequence of plan steps.
//!
//! The walk is sorted by file name at every level, so the steps come out
//! in path order and two walks over an unchanged tree yield identical
//! plans. Steps are produced lazily; nothing is collected up front.

use crate::category::{CategoryMap, UNCATEGORIZED};
use crate::classifier::{Classification, classify};
use crate::config::CompiledFilters;
use crate::conflict::{ConflictPolicy, ResolvedOutcome, resolve};
use crate::error::FileError;
use crate::file_organizer::OrganizeRequest;
use crate::report::{Failure, SkipReason};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use walkdir::WalkDir;

/// Snapshot of a source file taken at plan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    /// Lowercased with a leading dot, or empty.
    pub extension: String,
}

impl FileEntry {
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        Self {
            path,
            size,
            modified,
            extension,
        }
    }

    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self::new(path, metadata.len(), modified)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[default]
    Move,
    Copy,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Move => "move",
            ActionKind::Copy => "copy",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "move" => Ok(ActionKind::Move),
            "copy" => Ok(ActionKind::Copy),
            other => Err(format!("unknown action '{}' (expected move or copy)", other)),
        }
    }
}

/// Conflict resolution recorded on a planned action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    Proceed,
    RenamedTo(PathBuf),
    /// Proceeds with the desired name, replacing the file already there.
    Overwrite,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub source: FileEntry,
    /// Desired destination before conflict resolution.
    pub destination: PathBuf,
    pub kind: ActionKind,
    pub conflict: ConflictOutcome,
}

impl PlannedAction {
    /// Where the file actually lands, or `None` when the action is skipped.
    pub fn final_destination(&self) -> Option<&Path> {
        match &self.conflict {
            ConflictOutcome::Proceed | ConflictOutcome::Overwrite => Some(&self.destination),
            ConflictOutcome::RenamedTo(path) => Some(path),
            ConflictOutcome::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.conflict, ConflictOutcome::Skipped(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Create this directory (and parents) before the next action that needs it.
    EnsureDir(PathBuf),
    Action(PlannedAction),
    /// A file that could not be planned; reported as failed.
    Rejected { source: PathBuf, failure: Failure },
}

/// A plan over one source tree. Call [`Plan::steps`] as often as needed;
/// every call restarts the walk.
pub struct Plan<'a> {
    request: &'a OrganizeRequest,
    source_root: PathBuf,
    destination_root: PathBuf,
    categories: &'a CategoryMap,
    filters: &'a CompiledFilters,
}

impl<'a> Plan<'a> {
    /// `source_root` and `destination_root` should be absolute and normalized
    /// so the destination can be pruned from the walk.
    pub fn new(
        request: &'a OrganizeRequest,
        source_root: PathBuf,
        destination_root: PathBuf,
        categories: &'a CategoryMap,
        filters: &'a CompiledFilters,
    ) -> Self {
        Self {
            request,
            source_root,
            destination_root,
            categories,
            filters,
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    pub fn steps(&self) -> PlanSteps<'_> {
        let max_depth = if self.request.recursive { usize::MAX } else { 1 };
        let prune = self.destination_root.clone();
        let walker = WalkDir::new(&self.source_root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| e.path() != prune.as_path());

        PlanSteps {
            plan: self,
            walker: Box::new(walker),
            pending: VecDeque::new(),
            claimed: HashSet::new(),
            ensured: HashSet::new(),
        }
    }

    /// Collects only the actions, dropping directory steps and rejections.
    pub fn actions(&self) -> Vec<PlannedAction> {
        self.steps()
            .filter_map(|step| match step {
                PlanStep::Action(action) => Some(action),
                _ => None,
            })
            .collect()
    }
}

type Walker<'p> = Box<dyn Iterator<Item = walkdir::Result<walkdir::DirEntry>> + 'p>;

pub struct PlanSteps<'p> {
    plan: &'p Plan<'p>,
    walker: Walker<'p>,
    pending: VecDeque<PlanStep>,
    /// Destinations handed out earlier in this walk.
    claimed: HashSet<PathBuf>,
    ensured: HashSet<PathBuf>,
}

impl PlanSteps<'_> {
    fn plan_file(&mut self, entry: FileEntry) {
        let plan = self.plan;
        let request = plan.request;
        let Some(file_name) = entry.path.file_name().map(|n| n.to_os_string()) else {
            return;
        };

        let folder = match classify(
            &entry,
            request.mode,
            plan.categories,
            request.skip_uncategorized,
        ) {
            Classification::Folder(folder) => folder,
            Classification::Skip(reason) => {
                let destination = plan
                    .destination_root
                    .join(UNCATEGORIZED)
                    .join(&file_name);
                self.push_action(entry, destination, ConflictOutcome::Skipped(reason));
                return;
            }
        };

        let destination_dir = plan.destination_root.join(folder);
        let desired = destination_dir.join(&file_name);

        if desired == entry.path {
            self.push_action(entry, desired, ConflictOutcome::Skipped(SkipReason::InPlace));
            return;
        }

        // Overwrite only replaces files that were there before the run.
        let policy = match request.conflict_policy {
            ConflictPolicy::Overwrite if self.claimed.contains(&desired) => {
                tracing::debug!(
                    destination = %desired.display(),
                    "Destination taken earlier in this run, renaming instead"
                );
                ConflictPolicy::Rename
            }
            policy => policy,
        };

        let claimed = &self.claimed;
        let resolved = resolve(
            &destination_dir,
            &file_name,
            policy,
            |p| claimed.contains(p) || p.symlink_metadata().is_ok(),
            request.rename_limit,
        );

        let conflict = match resolved {
            Ok(ResolvedOutcome::Proceed(_)) => ConflictOutcome::Proceed,
            Ok(ResolvedOutcome::Overwrite(_)) => ConflictOutcome::Overwrite,
            Ok(ResolvedOutcome::RenamedTo(path)) => ConflictOutcome::RenamedTo(path),
            Ok(ResolvedOutcome::Skipped(reason)) => ConflictOutcome::Skipped(reason),
            Err(error) => {
                self.reject(entry.path, &error);
                return;
            }
        };

        if !matches!(conflict, ConflictOutcome::Skipped(_))
            && !self.ensured.contains(&destination_dir)
            && !destination_dir.is_dir()
        {
            self.ensured.insert(destination_dir.clone());
            self.pending.push_back(PlanStep::EnsureDir(destination_dir));
        }

        self.push_action(entry, desired, conflict);
    }

    fn push_action(&mut self, source: FileEntry, destination: PathBuf, conflict: ConflictOutcome) {
        let action = PlannedAction {
            source,
            destination,
            kind: self.plan.request.action,
            conflict,
        };
        if let Some(final_path) = action.final_destination() {
            self.claimed.insert(final_path.to_path_buf());
        }
        tracing::debug!(
            source = %action.source.path.display(),
            destination = %action.destination.display(),
            conflict = ?action.conflict,
            "Planned action"
        );
        self.pending.push_back(PlanStep::Action(action));
    }

    fn reject(&mut self, source: PathBuf, error: &FileError) {
        tracing::warn!(source = %source.display(), %error, "Could not plan file");
        self.pending.push_back(PlanStep::Rejected {
            source,
            failure: Failure::from(error),
        });
    }
}

impl Iterator for PlanSteps<'_> {
    type Item = PlanStep;

    fn next(&mut self) -> Option<PlanStep> {
        loop {
            if let Some(step) = self.pending.pop_front() {
                return Some(step);
            }

            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.plan.source_root.clone());
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                    self.reject(path.clone(), &FileError::io("read", path, source));
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.plan.source_root)
                .unwrap_or(entry.path());
            if !self.plan.filters.should_include(relative) {
                tracing::debug!(path = %entry.path().display(), "Excluded by filters");
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    let file = FileEntry::from_metadata(entry.into_path(), &metadata);
                    self.plan_file(file);
                }
                Err(err) => {
                    let path = entry.into_path();
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("metadata unavailable"));
                    self.reject(path.clone(), &FileError::io("stat", path, source));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::OrganizationMode;
    use std::fs;
    use tempfile::TempDir;

    fn request(source: &Path) -> OrganizeRequest {
        OrganizeRequest::new(source)
    }

    fn plan_for<'a>(
        req: &'a OrganizeRequest,
        categories: &'a CategoryMap,
        filters: &'a CompiledFilters,
        dest: &Path,
    ) -> Plan<'a> {
        Plan::new(
            req,
            req.source.clone(),
            dest.to_path_buf(),
            categories,
            filters,
        )
    }

    #[test]
    fn test_file_entry_extension_is_lowercased() {
        let e = FileEntry::new(PathBuf::from("/a/Photo.JPG"), 1, SystemTime::UNIX_EPOCH);
        assert_eq!(e.extension, ".jpg");
        let e = FileEntry::new(PathBuf::from("/a/Makefile"), 1, SystemTime::UNIX_EPOCH);
        assert_eq!(e.extension, "");
    }

    #[test]
    fn test_plan_is_sorted_and_repeatable() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir(&src).unwrap();
        for name in ["b.txt", "a.png", "c.mp3"] {
            fs::write(src.join(name), name).unwrap();
        }
        let dest = temp.path().join("out");

        let req = request(&src);
        let categories = CategoryMap::default();
        let filters = CompiledFilters::allow_all();
        let plan = plan_for(&req, &categories, &filters, &dest);

        let first: Vec<_> = plan.steps().collect();
        let second: Vec<_> = plan.steps().collect();
        assert_eq!(first, second);

        let sources: Vec<_> = plan
            .actions()
            .into_iter()
            .map(|a| a.source.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(sources, vec!["a.png", "b.txt", "c.mp3"]);
    }

    #[test]
    fn test_ensure_dir_emitted_once_per_directory() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("one.txt"), "1").unwrap();
        fs::write(src.join("two.txt"), "2").unwrap();
        let dest = temp.path().join("out");

        let req = request(&src);
        let categories = CategoryMap::default();
        let filters = CompiledFilters::allow_all();
        let steps: Vec<_> = plan_for(&req, &categories, &filters, &dest).steps().collect();

        let ensures: Vec<_> = steps
            .iter()
            .filter_map(|s| match s {
                PlanStep::EnsureDir(d) => Some(d.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ensures, vec![dest.join("Documents")]);
        assert!(matches!(steps[0], PlanStep::EnsureDir(_)));
    }

    #[test]
    fn test_non_recursive_ignores_subdirectories() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("top.txt"), "t").unwrap();
        fs::write(src.join("nested").join("deep.txt"), "d").unwrap();
        let dest = temp.path().join("out");
        let categories = CategoryMap::default();
        let filters = CompiledFilters::allow_all();

        let flat = request(&src);
        assert_eq!(plan_for(&flat, &categories, &filters, &dest).actions().len(), 1);

        let mut deep = request(&src);
        deep.recursive = true;
        assert_eq!(plan_for(&deep, &categories, &filters, &dest).actions().len(), 2);
    }

    #[test]
    fn test_destination_inside_source_is_pruned() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().to_path_buf();
        let dest = src.join("Organized_Files");
        fs::create_dir_all(dest.join("Documents")).unwrap();
        fs::write(dest.join("Documents").join("old.txt"), "o").unwrap();
        fs::write(src.join("new.txt"), "n").unwrap();

        let mut req = request(&src);
        req.recursive = true;
        let categories = CategoryMap::default();
        let filters = CompiledFilters::allow_all();
        let actions = plan_for(&req, &categories, &filters, &dest).actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].source.path, src.join("new.txt"));
    }

    #[test]
    fn test_same_name_files_claim_distinct_destinations() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("a")).unwrap();
        fs::create_dir_all(src.join("b")).unwrap();
        fs::write(src.join("a").join("notes.txt"), "a").unwrap();
        fs::write(src.join("b").join("notes.txt"), "b").unwrap();
        let dest = temp.path().join("out");

        let mut req = request(&src);
        req.recursive = true;
        let categories = CategoryMap::default();
        let filters = CompiledFilters::allow_all();
        let actions = plan_for(&req, &categories, &filters, &dest).actions();

        assert_eq!(actions[0].conflict, ConflictOutcome::Proceed);
        assert_eq!(
            actions[1].conflict,
            ConflictOutcome::RenamedTo(dest.join("Documents").join("notes (1).txt"))
        );

        req.conflict_policy = ConflictPolicy::Skip;
        let actions = plan_for(&req, &categories, &filters, &dest).actions();
        assert_eq!(actions[1].conflict, ConflictOutcome::Skipped(SkipReason::Exists));
    }

    #[test]
    fn test_overwrite_never_replaces_a_file_from_the_same_run() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("a")).unwrap();
        fs::create_dir_all(src.join("b")).unwrap();
        fs::write(src.join("a").join("notes.txt"), "a").unwrap();
        fs::write(src.join("b").join("notes.txt"), "b").unwrap();
        let dest = temp.path().join("out");
        fs::create_dir_all(dest.join("Documents")).unwrap();
        fs::write(dest.join("Documents").join("notes.txt"), "old").unwrap();

        let mut req = request(&src);
        req.recursive = true;
        req.conflict_policy = ConflictPolicy::Overwrite;
        let categories = CategoryMap::default();
        let filters = CompiledFilters::allow_all();
        let actions = plan_for(&req, &categories, &filters, &dest).actions();

        assert_eq!(actions[0].conflict, ConflictOutcome::Overwrite);
        assert_eq!(
            actions[1].conflict,
            ConflictOutcome::RenamedTo(dest.join("Documents").join("notes (1).txt"))
        );
    }

    #[test]
    fn test_skip_uncategorized_plans_skipped_action() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("blob.xyz"), "x").unwrap();
        let dest = temp.path().join("out");

        let mut req = request(&src);
        req.skip_uncategorized = true;
        req.mode = OrganizationMode::ByType;
        let categories = CategoryMap::default();
        let filters = CompiledFilters::allow_all();
        let steps: Vec<_> = plan_for(&req, &categories, &filters, &dest).steps().collect();

        assert_eq!(steps.len(), 1);
        match &steps[0] {
            PlanStep::Action(a) => {
                assert_eq!(a.conflict, ConflictOutcome::Skipped(SkipReason::Uncategorized));
                assert_eq!(a.final_destination(), None);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_organized() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("real.txt"), "r").unwrap();
        std::os::unix::fs::symlink(src.join("real.txt"), src.join("link.txt")).unwrap();
        let dest = temp.path().join("out");

        let req = request(&src);
        let categories = CategoryMap::default();
        let filters = CompiledFilters::allow_all();
        let actions = plan_for(&req, &categories, &filters, &dest).actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].source.path, src.join("real.txt"));
    }
}
