//! Progress reporting and cooperative cancellation.
//!
//! The engine never renders anything. It calls a [`ProgressReporter`] after
//! every finished action; the CLI draws a progress bar from those calls and
//! a GUI can take them off a channel with [`ChannelReporter`].

use crate::report::{ReportEntry, RunSummary};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// Receives per-file outcomes while a run or undo is in progress.
///
/// All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    /// `total` is the number of files the run expects to report, when known.
    fn on_start(&self, _total: Option<usize>, _dry_run: bool) {}
    fn on_entry(&self, _index: usize, _entry: &ReportEntry) {}
    fn on_finish(&self, _summary: &RunSummary, _cancelled: bool) {}
}

/// Reporter that drops every event.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { total: Option<usize>, dry_run: bool },
    Entry { index: usize, entry: ReportEntry },
    Finished { summary: RunSummary, cancelled: bool },
}

/// Forwards events over an mpsc channel so another thread can consume them.
pub struct ChannelReporter {
    tx: Sender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        // A consumer that hung up just stops listening; the run carries on.
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_start(&self, total: Option<usize>, dry_run: bool) {
        self.send(ProgressEvent::Started { total, dry_run });
    }

    fn on_entry(&self, index: usize, entry: &ReportEntry) {
        self.send(ProgressEvent::Entry {
            index,
            entry: entry.clone(),
        });
    }

    fn on_finish(&self, summary: &RunSummary, cancelled: bool) {
        self.send(ProgressEvent::Finished {
            summary: *summary,
            cancelled,
        });
    }
}

/// Shared flag checked between actions. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Outcome;
    use std::path::PathBuf;
    use std::thread;

    #[test]
    fn test_channel_reporter_delivers_in_order() {
        let (reporter, rx) = ChannelReporter::new();
        let handle = thread::spawn(move || {
            reporter.on_start(Some(1), true);
            reporter.on_entry(
                0,
                &ReportEntry {
                    source: PathBuf::from("a.txt"),
                    destination: None,
                    outcome: Outcome::Success,
                },
            );
            reporter.on_finish(&RunSummary::default(), false);
        });
        handle.join().unwrap();

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ProgressEvent::Started { total: Some(1), dry_run: true }));
        assert!(matches!(events[1], ProgressEvent::Entry { index: 0, .. }));
        assert!(matches!(events[2], ProgressEvent::Finished { cancelled: false, .. }));
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let (reporter, rx) = ChannelReporter::new();
        drop(rx);
        reporter.on_start(None, false);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
