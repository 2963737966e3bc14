//! Persistent record of the most recent live run.
//!
//! The ledger holds at most one run. Starting a live run supersedes the
//! previous one; undoing a run consumes it. Every completed file action is
//! appended through a [`LedgerStore`] before the next action starts, so a
//! crash loses at most the action in flight.
//!
//! The JSON Lines store writes one record per line:
//!
//! ```text
//! {"record":"run","run_id":"...","started_at":"...","source":"...","destination":"..."}
//! {"record":"dir","path":".../Organized_Files/Documents"}
//! {"record":"entry","sequence":0,"original_source":"...","final_destination":"...","kind":"move","size":12,"timestamp":"..."}
//! ```

use crate::error::LedgerError;
use crate::planner::ActionKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

/// One completed file action, in completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub original_source: PathBuf,
    pub final_destination: PathBuf,
    pub kind: ActionKind,
    /// Size in bytes at the time of the action; undo refuses files whose size changed.
    pub size: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHeader {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl RunHeader {
    pub fn new(source: &Path, destination: &Path) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: started_at.format("%Y%m%dT%H%M%S%.6fZ").to_string(),
            started_at,
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        }
    }
}

/// A run as loaded from or written to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub header: RunHeader,
    pub entries: Vec<LedgerEntry>,
    /// Directories the run created, in creation order.
    pub created_dirs: Vec<PathBuf>,
}

impl RunRecord {
    fn new(header: RunHeader) -> Self {
        Self {
            header,
            entries: Vec::new(),
            created_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerState {
    Empty,
    /// The last live run, available for undo.
    Recorded(RunRecord),
    /// The last run was undone.
    Consumed,
    /// A newer run started and has not recorded an action yet.
    Superseded,
}

impl LedgerState {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerState::Empty => "empty",
            LedgerState::Recorded(_) => "recorded",
            LedgerState::Consumed => "consumed",
            LedgerState::Superseded => "superseded",
        }
    }
}

/// Durable backing for a [`Ledger`].
pub trait LedgerStore: Send {
    /// Reads the stored run, if any.
    fn load(&mut self) -> Result<Option<RunRecord>, LedgerError>;
    /// Discards whatever was stored and starts a new run.
    fn begin(&mut self, header: &RunHeader) -> Result<(), LedgerError>;
    /// Appends an entry durably before returning.
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError>;
    fn record_dir(&mut self, path: &Path) -> Result<(), LedgerError>;
    fn clear(&mut self) -> Result<(), LedgerError>;
}

/// Keeps the run in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    run: Option<RunRecord>,
}

impl LedgerStore for MemoryStore {
    fn load(&mut self) -> Result<Option<RunRecord>, LedgerError> {
        Ok(self.run.clone())
    }

    fn begin(&mut self, header: &RunHeader) -> Result<(), LedgerError> {
        self.run = Some(RunRecord::new(header.clone()));
        Ok(())
    }

    fn append(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        if let Some(run) = self.run.as_mut() {
            run.entries.push(entry.clone());
        }
        Ok(())
    }

    fn record_dir(&mut self, path: &Path) -> Result<(), LedgerError> {
        if let Some(run) = self.run.as_mut() {
            run.created_dirs.push(path.to_path_buf());
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), LedgerError> {
        self.run = None;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum LedgerLine {
    Run(RunHeader),
    Dir { path: PathBuf },
    Entry(LedgerEntry),
}

/// Append-only JSON Lines file, synced after every write.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Store {
            path: self.path.clone(),
            source,
        }
    }

    fn write_line(&self, file: &mut File, line: &LedgerLine) -> Result<(), LedgerError> {
        let mut json = serde_json::to_string(line).map_err(|e| self.store_error(e.into()))?;
        json.push('\n');
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| self.store_error(e))
    }

    fn append_line(&self, line: &LedgerLine) -> Result<(), LedgerError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.store_error(e))?;
        self.write_line(&mut file, line)
    }

    fn corrupt(&self, line: usize, reason: impl Into<String>) -> LedgerError {
        LedgerError::Corrupt {
            path: self.path.clone(),
            line,
            reason: reason.into(),
        }
    }
}

impl LedgerStore for JsonLinesStore {
    fn load(&mut self) -> Result<Option<RunRecord>, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.store_error(e)),
        };

        let lines: Vec<&str> = content.split('\n').collect();
        let last = lines.len() - 1;
        let mut run: Option<RunRecord> = None;

        for (index, raw) in lines.iter().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            let number = index + 1;
            let line: LedgerLine = match serde_json::from_str(raw) {
                Ok(line) => line,
                // A final line without a newline is a write cut short by a crash.
                Err(e) if index == last => {
                    tracing::warn!(path = %self.path.display(), line = number, error = %e, "Ignoring truncated ledger line");
                    break;
                }
                Err(e) => return Err(self.corrupt(number, e.to_string())),
            };

            match (line, run.as_mut()) {
                (LedgerLine::Run(header), None) => run = Some(RunRecord::new(header)),
                (LedgerLine::Run(_), Some(_)) => {
                    return Err(self.corrupt(number, "second run header"));
                }
                (_, None) => return Err(self.corrupt(number, "missing run header")),
                (LedgerLine::Dir { path }, Some(run)) => run.created_dirs.push(path),
                (LedgerLine::Entry(entry), Some(run)) => run.entries.push(entry),
            }
        }

        Ok(run)
    }

    fn begin(&mut self, header: &RunHeader) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.store_error(e))?;
        }
        let mut file = File::create(&self.path).map_err(|e| self.store_error(e))?;
        self.write_line(&mut file, &LedgerLine::Run(header.clone()))
    }

    fn append(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.append_line(&LedgerLine::Entry(entry.clone()))
    }

    fn record_dir(&mut self, path: &Path) -> Result<(), LedgerError> {
        self.append_line(&LedgerLine::Dir {
            path: path.to_path_buf(),
        })
    }

    fn clear(&mut self) -> Result<(), LedgerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.store_error(e)),
        }
    }
}

/// The single-run undo ledger.
pub struct Ledger {
    store: Box<dyn LedgerStore>,
    state: LedgerState,
}

impl Ledger {
    /// Opens a ledger over `store`, restoring a previously recorded run.
    pub fn open(mut store: Box<dyn LedgerStore>) -> Result<Self, LedgerError> {
        let state = match store.load()? {
            Some(run) if !run.entries.is_empty() => LedgerState::Recorded(run),
            _ => LedgerState::Empty,
        };
        tracing::debug!(state = state.name(), "Opened ledger");
        Ok(Self { store, state })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Box::<MemoryStore>::default(),
            state: LedgerState::Empty,
        }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// The run an undo would revert.
    pub fn recorded_run(&self) -> Option<&RunRecord> {
        match &self.state {
            LedgerState::Recorded(run) if !run.entries.is_empty() => Some(run),
            _ => None,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.recorded_run().is_some()
    }

    /// Starts recording a new run, superseding whatever was recorded.
    pub(crate) fn begin_run(&mut self, header: RunHeader) -> Result<RunRecorder<'_>, LedgerError> {
        self.store.begin(&header)?;
        if matches!(self.state, LedgerState::Recorded(_)) {
            tracing::info!("Previous run superseded; it can no longer be undone");
        }
        self.state = LedgerState::Superseded;
        Ok(RunRecorder {
            ledger: self,
            pending: RunRecord::new(header),
            next_sequence: 0,
        })
    }

    /// Marks the recorded run as undone and clears the store.
    pub(crate) fn consume(&mut self) -> Result<(), LedgerError> {
        self.store.clear()?;
        self.state = LedgerState::Consumed;
        Ok(())
    }
}

/// Sink for actions completed by the executor.
pub trait ActionLog {
    fn record_dir(&mut self, path: &Path) -> Result<(), LedgerError>;
    fn record_action(
        &mut self,
        kind: ActionKind,
        source: &Path,
        destination: &Path,
        size: u64,
    ) -> Result<(), LedgerError>;
}

/// Discards everything; used for previews.
pub struct NoopLog;

impl ActionLog for NoopLog {
    fn record_dir(&mut self, _path: &Path) -> Result<(), LedgerError> {
        Ok(())
    }

    fn record_action(
        &mut self,
        _kind: ActionKind,
        _source: &Path,
        _destination: &Path,
        _size: u64,
    ) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Writes one live run into its [`Ledger`].
///
/// The ledger leaves [`LedgerState::Superseded`] on the first recorded action.
pub struct RunRecorder<'l> {
    ledger: &'l mut Ledger,
    /// Mirrors the run until it has an entry and becomes the ledger state.
    pending: RunRecord,
    next_sequence: u64,
}

impl RunRecorder<'_> {
    fn current_run(&mut self) -> &mut RunRecord {
        match &mut self.ledger.state {
            LedgerState::Recorded(run) => run,
            _ => &mut self.pending,
        }
    }

    /// Ends the run. Returns the directories it created when it recorded no
    /// action, since no undo will ever remove them.
    pub(crate) fn finish(self) -> Vec<PathBuf> {
        if matches!(self.ledger.state, LedgerState::Recorded(_)) {
            Vec::new()
        } else {
            self.pending.created_dirs
        }
    }
}

impl ActionLog for RunRecorder<'_> {
    fn record_dir(&mut self, path: &Path) -> Result<(), LedgerError> {
        self.ledger.store.record_dir(path)?;
        self.current_run().created_dirs.push(path.to_path_buf());
        Ok(())
    }

    fn record_action(
        &mut self,
        kind: ActionKind,
        source: &Path,
        destination: &Path,
        size: u64,
    ) -> Result<(), LedgerError> {
        let entry = LedgerEntry {
            sequence: self.next_sequence,
            original_source: source.to_path_buf(),
            final_destination: destination.to_path_buf(),
            kind,
            size,
            timestamp: Utc::now(),
        };
        self.ledger.store.append(&entry)?;
        self.next_sequence += 1;

        if let LedgerState::Recorded(run) = &mut self.ledger.state {
            run.entries.push(entry);
        } else {
            let header = self.pending.header.clone();
            let mut run = std::mem::replace(&mut self.pending, RunRecord::new(header));
            run.entries.push(entry);
            self.ledger.state = LedgerState::Recorded(run);
        }
        Ok(())
    }
}

/// Shared handle enforcing one run or undo at a time.
#[derive(Clone)]
pub struct LedgerHandle {
    inner: Arc<Mutex<Ledger>>,
}

impl LedgerHandle {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Ledger::in_memory())
    }

    /// Opens the JSON Lines ledger at `path`.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        Ok(Self::new(Ledger::open(Box::new(JsonLinesStore::new(path)))?))
    }

    /// Takes exclusive access, failing with [`LedgerError::Busy`] instead of waiting.
    pub fn acquire(&self) -> Result<MutexGuard<'_, Ledger>, LedgerError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(LedgerError::Busy),
            // A panicked run leaves the last durable state behind; keep using it.
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    pub fn can_undo(&self) -> Result<bool, LedgerError> {
        Ok(self.acquire()?.can_undo())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(recorder: &mut RunRecorder<'_>, name: &str) {
        recorder
            .record_action(
                ActionKind::Move,
                &Path::new("/src").join(name),
                &Path::new("/dest").join(name),
                3,
            )
            .unwrap();
    }

    #[test]
    fn test_lifecycle_states() {
        let mut ledger = Ledger::in_memory();
        assert_eq!(ledger.state(), &LedgerState::Empty);

        {
            let mut recorder = ledger
                .begin_run(RunHeader::new(Path::new("/src"), Path::new("/dest")))
                .unwrap();
            record(&mut recorder, "a.txt");
            record(&mut recorder, "b.txt");
        }
        let run = ledger.recorded_run().unwrap();
        assert_eq!(run.entries.len(), 2);
        assert_eq!(run.entries[1].sequence, 1);

        {
            let _recorder = ledger
                .begin_run(RunHeader::new(Path::new("/src"), Path::new("/dest")))
                .unwrap();
        }
        assert_eq!(ledger.state(), &LedgerState::Superseded);
        assert!(!ledger.can_undo());

        ledger.consume().unwrap();
        assert_eq!(ledger.state(), &LedgerState::Consumed);
    }

    #[test]
    fn test_dirs_recorded_before_first_entry_are_kept() {
        let mut ledger = Ledger::in_memory();
        {
            let mut recorder = ledger
                .begin_run(RunHeader::new(Path::new("/src"), Path::new("/dest")))
                .unwrap();
            recorder.record_dir(Path::new("/dest/Documents")).unwrap();
            record(&mut recorder, "a.txt");
        }
        assert_eq!(
            ledger.recorded_run().unwrap().created_dirs,
            vec![PathBuf::from("/dest/Documents")]
        );
    }

    #[test]
    fn test_finish_hands_back_dirs_of_an_empty_run() {
        let mut ledger = Ledger::in_memory();
        let mut recorder = ledger
            .begin_run(RunHeader::new(Path::new("/src"), Path::new("/dest")))
            .unwrap();
        recorder.record_dir(Path::new("/dest/Documents")).unwrap();
        assert_eq!(recorder.finish(), vec![PathBuf::from("/dest/Documents")]);
        assert_eq!(ledger.state(), &LedgerState::Superseded);

        let mut recorder = ledger
            .begin_run(RunHeader::new(Path::new("/src"), Path::new("/dest")))
            .unwrap();
        recorder.record_dir(Path::new("/dest/Images")).unwrap();
        record(&mut recorder, "a.png");
        assert!(recorder.finish().is_empty());
        assert!(ledger.can_undo());
    }

    #[test]
    fn test_json_lines_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("ledger.jsonl");

        {
            let mut ledger = Ledger::open(Box::new(JsonLinesStore::new(&path))).unwrap();
            let mut recorder = ledger
                .begin_run(RunHeader::new(Path::new("/src"), Path::new("/dest")))
                .unwrap();
            recorder.record_dir(Path::new("/dest/Documents")).unwrap();
            record(&mut recorder, "a.txt");
        }

        let reopened = Ledger::open(Box::new(JsonLinesStore::new(&path))).unwrap();
        let run = reopened.recorded_run().unwrap();
        assert_eq!(run.entries.len(), 1);
        assert_eq!(run.entries[0].original_source, PathBuf::from("/src/a.txt"));
        assert_eq!(run.created_dirs, vec![PathBuf::from("/dest/Documents")]);
    }

    #[test]
    fn test_truncated_last_line_is_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.jsonl");
        {
            let mut ledger = Ledger::open(Box::new(JsonLinesStore::new(&path))).unwrap();
            let mut recorder = ledger
                .begin_run(RunHeader::new(Path::new("/src"), Path::new("/dest")))
                .unwrap();
            record(&mut recorder, "a.txt");
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"record":"entry","seq"#).unwrap();

        let reopened = Ledger::open(Box::new(JsonLinesStore::new(&path))).unwrap();
        assert_eq!(reopened.recorded_run().unwrap().entries.len(), 1);
    }

    #[test]
    fn test_corrupt_middle_line_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.jsonl");
        fs::write(&path, "not json\n{\"record\":\"dir\",\"path\":\"/x\"}\n").unwrap();

        let result = Ledger::open(Box::new(JsonLinesStore::new(&path)));
        assert!(matches!(result, Err(LedgerError::Corrupt { line: 1, .. })));
    }

    #[test]
    fn test_header_without_entries_loads_as_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.jsonl");
        let mut store = JsonLinesStore::new(&path);
        store
            .begin(&RunHeader::new(Path::new("/src"), Path::new("/dest")))
            .unwrap();

        let ledger = Ledger::open(Box::new(store)).unwrap();
        assert_eq!(ledger.state(), &LedgerState::Empty);
    }

    #[test]
    fn test_handle_reports_busy_while_held() {
        let handle = LedgerHandle::in_memory();
        let other = handle.clone();
        let _guard = handle.acquire().unwrap();
        assert!(matches!(other.acquire(), Err(LedgerError::Busy)));
    }
}
