//! Terminal output for the CLI.
//!
//! Colored status lines, the progress bar reporter and the end-of-run
//! summary table all live here so the engine never prints anything.

use crate::progress::ProgressReporter;
use crate::report::{Outcome, ReportEntry, RunReport, RunSummary};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;

/// Styled one-line messages.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sortwise::output::OutputFormatter;
    /// OutputFormatter::success("Organized 12 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Progress bar styled for file runs. Falls back to the default style
    /// if the template is rejected.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }

    /// Formats one report entry: `✓ src -> dest`, `- src (reason)` or `✗ src: failure`.
    pub fn entry_line(entry: &ReportEntry) -> String {
        let source = entry.source.display();
        match (&entry.outcome, &entry.destination) {
            (Outcome::Success, Some(dest)) => {
                format!("{} {} -> {}", "✓".green(), source, dest.display())
            }
            (Outcome::Success, None) => format!("{} {} (removed)", "✓".green(), source),
            (Outcome::Skipped(reason), _) => {
                format!("{} {} ({})", "-".dimmed(), source, reason.as_str().dimmed())
            }
            (Outcome::Failed(failure), _) => {
                format!("{} {}: {}", "✗".red(), source, failure.to_string().red())
            }
        }
    }

    /// Prints succeeded files per destination folder, then the outcome totals.
    pub fn summary_table(report: &RunReport) {
        Self::header(if report.dry_run {
            "SUMMARY (dry run)"
        } else {
            "SUMMARY"
        });

        let folders = folder_counts(report);
        let width = folders
            .keys()
            .map(|name| name.chars().count())
            .max()
            .unwrap_or(0)
            .max("Succeeded".len());

        if !folders.is_empty() {
            println!("{:<width$} | {}", "Folder".bold(), "Files".bold(), width = width);
            println!("{}", "-".repeat(width + 10));
            for (folder, count) in &folders {
                println!(
                    "{:<width$} | {} {}",
                    folder,
                    count.to_string().green(),
                    plural(*count),
                    width = width
                );
            }
            println!("{}", "-".repeat(width + 10));
        }

        let summary = report.summary();
        let rows = [
            ("Succeeded", summary.succeeded.to_string().green()),
            ("Skipped", summary.skipped.to_string().yellow()),
            ("Failed", summary.failed.to_string().red()),
        ];
        for (label, count) in rows {
            println!("{:<width$} | {}", label.bold(), count, width = width);
        }

        if report.cancelled {
            Self::warning("Run stopped early; remaining files were left untouched");
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Succeeded entries grouped by the name of their destination folder.
fn folder_counts(report: &RunReport) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for entry in report.entries.iter().filter(|e| e.outcome.is_success()) {
        let folder = entry
            .destination
            .as_deref()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned());
        if let Some(folder) = folder {
            *counts.entry(folder).or_insert(0) += 1;
        }
    }
    counts
}

/// Drives an `indicatif` bar from engine progress events.
///
/// Failures are printed above the bar as they happen; with `verbose`
/// every entry is.
pub struct TerminalReporter {
    bar: ProgressBar,
    verbose: bool,
}

impl TerminalReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            bar: OutputFormatter::create_progress_bar(0),
            verbose,
        }
    }

    /// A reporter that draws nothing.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose: false,
        }
    }
}

impl ProgressReporter for TerminalReporter {
    fn on_start(&self, total: Option<usize>, dry_run: bool) {
        if let Some(total) = total {
            self.bar.set_length(total as u64);
        }
        if dry_run {
            self.bar.set_message("previewing");
        }
    }

    fn on_entry(&self, _index: usize, entry: &ReportEntry) {
        self.bar.inc(1);
        if let Some(name) = entry.source.file_name() {
            self.bar.set_message(name.to_string_lossy().into_owned());
        }
        if self.verbose || entry.outcome.is_failed() {
            self.bar.println(OutputFormatter::entry_line(entry));
        }
    }

    fn on_finish(&self, _summary: &RunSummary, _cancelled: bool) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Failure, FailureKind, SkipReason};
    use std::path::PathBuf;

    fn success(src: &str, dest: &str) -> ReportEntry {
        ReportEntry {
            source: PathBuf::from(src),
            destination: Some(PathBuf::from(dest)),
            outcome: Outcome::Success,
        }
    }

    #[test]
    fn test_folder_counts_group_by_destination_folder() {
        let mut report = RunReport::new(false);
        report.push(success("/s/a.png", "/d/Images/a.png"));
        report.push(success("/s/b.png", "/d/Images/b.png"));
        report.push(success("/s/c.pdf", "/d/Documents/c.pdf"));
        report.push(ReportEntry {
            source: PathBuf::from("/s/x.xyz"),
            destination: None,
            outcome: Outcome::Skipped(SkipReason::Uncategorized),
        });

        let counts = folder_counts(&report);
        assert_eq!(counts.get("Images"), Some(&2));
        assert_eq!(counts.get("Documents"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_entry_line_mentions_failure_code() {
        colored::control::set_override(false);
        let entry = ReportEntry {
            source: PathBuf::from("/s/a.txt"),
            destination: Some(PathBuf::from("/d/a.txt")),
            outcome: Outcome::Failed(Failure {
                kind: FailureKind::Protected,
                message: "read-only".to_string(),
            }),
        };
        let line = OutputFormatter::entry_line(&entry);
        assert!(line.contains("/s/a.txt"));
        assert!(line.contains("protected: read-only"));
    }

    #[test]
    fn test_hidden_reporter_accepts_events() {
        let reporter = TerminalReporter::hidden();
        reporter.on_start(Some(1), false);
        reporter.on_entry(0, &success("/s/a.txt", "/d/Documents/a.txt"));
        reporter.on_finish(&RunSummary::default(), false);
    }
}
