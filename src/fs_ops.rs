//! Filesystem capability used by the executor and by undo.
//!
//! [`LiveOps`] touches the disk, [`DryRunOps`] only answers as if it had.
//! Everything that decides *whether* an action may run lives in the callers
//! or in read-only checks both implementations share, so a preview fails
//! exactly where a live run would.

use crate::error::FileError;
use crate::planner::ActionKind;
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait FileOps {
    fn is_dry_run(&self) -> bool;

    /// Creates `dir` with any missing parents.
    ///
    /// Returns the directories that did not exist before, outermost first.
    fn ensure_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, FileError>;

    /// Moves or copies `source` to `destination`, replacing an existing file.
    fn transfer(&self, kind: ActionKind, source: &Path, destination: &Path)
    -> Result<(), FileError>;

    fn remove_file(&self, path: &Path) -> Result<(), FileError>;

    /// Removes `dir` if it is empty. Returns `false` when it still has entries.
    fn remove_empty_dir(&self, dir: &Path) -> Result<bool, FileError>;
}

/// Performs real filesystem operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveOps;

impl FileOps for LiveOps {
    fn is_dry_run(&self) -> bool {
        false
    }

    fn ensure_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, FileError> {
        check_creatable(dir)?;
        let mut missing: Vec<PathBuf> = dir
            .ancestors()
            .take_while(|p| !p.as_os_str().is_empty() && p.symlink_metadata().is_err())
            .map(Path::to_path_buf)
            .collect();
        missing.reverse();

        fs::create_dir_all(dir).map_err(|e| FileError::io("create directory", dir, e))?;
        Ok(missing)
    }

    fn transfer(
        &self,
        kind: ActionKind,
        source: &Path,
        destination: &Path,
    ) -> Result<(), FileError> {
        match kind {
            ActionKind::Copy => copy_verified(source, destination),
            ActionKind::Move => move_file(source, destination),
        }
    }

    fn remove_file(&self, path: &Path) -> Result<(), FileError> {
        fs::remove_file(path).map_err(|e| FileError::io("delete", path, e))
    }

    fn remove_empty_dir(&self, dir: &Path) -> Result<bool, FileError> {
        match fs::remove_dir(dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FileError::io("remove directory", dir, e)),
        }
    }
}

/// Fails when the nearest existing ancestor of `dir` is not a directory.
///
/// Read-only, so previews and live runs reject the same directories with
/// the same error.
pub(crate) fn check_creatable(dir: &Path) -> Result<(), FileError> {
    let existing = dir
        .ancestors()
        .find(|p| p.as_os_str().is_empty() || p.symlink_metadata().is_ok());
    match existing {
        Some(p) if !p.as_os_str().is_empty() && !p.is_dir() => Err(FileError::io(
            "create directory",
            dir,
            io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", p.display()),
            ),
        )),
        _ => Ok(()),
    }
}

/// Answers every call as the live filesystem would, and touches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunOps;

impl FileOps for DryRunOps {
    fn is_dry_run(&self) -> bool {
        true
    }

    fn ensure_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, FileError> {
        check_creatable(dir)?;
        Ok(Vec::new())
    }

    fn transfer(
        &self,
        _kind: ActionKind,
        _source: &Path,
        _destination: &Path,
    ) -> Result<(), FileError> {
        Ok(())
    }

    fn remove_file(&self, _path: &Path) -> Result<(), FileError> {
        Ok(())
    }

    fn remove_empty_dir(&self, _dir: &Path) -> Result<bool, FileError> {
        Ok(false)
    }
}

/// Renames within a volume; across volumes falls back to copy, verify, delete.
fn move_file(source: &Path, destination: &Path) -> Result<(), FileError> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::warn!(
                source = %source.display(),
                destination = %destination.display(),
                "Rename crosses devices, falling back to copy and delete"
            );
            copy_verified(source, destination)?;
            if let Err(e) = fs::remove_file(source) {
                // Source stays authoritative.
                let _ = fs::remove_file(destination);
                return Err(FileError::io("delete", source, e));
            }
            Ok(())
        }
        Err(e) => Err(FileError::io("move", source, e)),
    }
}

/// Copies and checks the written length. A failed copy leaves no destination behind.
fn copy_verified(source: &Path, destination: &Path) -> Result<(), FileError> {
    let metadata = fs::metadata(source).map_err(|e| FileError::io("read", source, e))?;

    if let Err(e) = fs::copy(source, destination) {
        discard_partial(destination);
        return Err(FileError::io("copy", source, e));
    }
    verify_length(destination, metadata.len())?;

    let mtime = FileTime::from_last_modification_time(&metadata);
    if let Err(e) = filetime::set_file_mtime(destination, mtime) {
        tracing::warn!(path = %destination.display(), error = %e, "Could not preserve modification time");
    }
    Ok(())
}

fn verify_length(destination: &Path, expected: u64) -> Result<(), FileError> {
    let actual = match fs::metadata(destination) {
        Ok(m) => m.len(),
        Err(e) => {
            discard_partial(destination);
            return Err(FileError::io("verify", destination, e));
        }
    };
    if actual != expected {
        discard_partial(destination);
        return Err(FileError::Verification {
            path: destination.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn discard_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::error!(path = %path.display(), error = %e, "Could not remove partial copy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_reports_created_directories() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("a").join("b").join("c");

        let created = LiveOps.ensure_dir(&target).unwrap();
        assert_eq!(
            created,
            vec![
                temp.path().join("a"),
                temp.path().join("a").join("b"),
                target.clone(),
            ]
        );
        assert!(target.is_dir());

        assert!(LiveOps.ensure_dir(&target).unwrap().is_empty());
    }

    #[test]
    fn test_move_and_copy() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        fs::write(&src, "hello").unwrap();

        let copied = temp.path().join("copy.txt");
        LiveOps.transfer(ActionKind::Copy, &src, &copied).unwrap();
        assert!(src.exists());
        assert_eq!(fs::read_to_string(&copied).unwrap(), "hello");

        let moved = temp.path().join("moved.txt");
        LiveOps.transfer(ActionKind::Move, &src, &moved).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&moved).unwrap(), "hello");
    }

    #[test]
    fn test_copy_preserves_mtime() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("old.txt");
        fs::write(&src, "x").unwrap();
        let past = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src, past).unwrap();

        let dest = temp.path().join("new.txt");
        LiveOps.transfer(ActionKind::Copy, &src, &dest).unwrap();

        let meta = fs::metadata(&dest).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), past);
    }

    #[test]
    fn test_verify_length_mismatch_removes_destination() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("short.bin");
        fs::write(&dest, [0u8; 4]).unwrap();

        let err = verify_length(&dest, 10).unwrap_err();
        assert!(matches!(
            err,
            FileError::Verification { expected: 10, actual: 4, .. }
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_copy_of_missing_source_fails_cleanly() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("never.txt");
        let result = LiveOps.transfer(ActionKind::Copy, &temp.path().join("nope"), &dest);
        assert!(matches!(result, Err(FileError::Io { .. })));
        assert!(!dest.exists());
    }

    #[test]
    fn test_remove_empty_dir_keeps_populated_dirs() {
        let temp = TempDir::new().unwrap();
        let full = temp.path().join("full");
        let empty = temp.path().join("empty");
        fs::create_dir(&full).unwrap();
        fs::create_dir(&empty).unwrap();
        fs::write(full.join("f"), "f").unwrap();

        assert!(!LiveOps.remove_empty_dir(&full).unwrap());
        assert!(LiveOps.remove_empty_dir(&empty).unwrap());
        assert!(full.exists());
        assert!(!empty.exists());
    }

    #[test]
    fn test_blocked_directory_fails_the_same_way_in_both_modes() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("Documents");
        fs::write(&blocker, "not a folder").unwrap();
        let target = blocker.join("2024");

        let live = LiveOps.ensure_dir(&target).unwrap_err();
        let dry = DryRunOps.ensure_dir(&target).unwrap_err();
        assert!(matches!(live, FileError::Io { op: "create directory", .. }));
        assert_eq!(live.to_string(), dry.to_string());
        assert!(blocker.is_file());

        assert!(check_creatable(&temp.path().join("free").join("deep")).is_ok());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        fs::write(&src, "a").unwrap();
        let dir = temp.path().join("new");

        assert!(DryRunOps.ensure_dir(&dir).unwrap().is_empty());
        DryRunOps
            .transfer(ActionKind::Move, &src, &dir.join("a.txt"))
            .unwrap();
        DryRunOps.remove_file(&src).unwrap();

        assert!(src.exists());
        assert!(!dir.exists());
    }
}
