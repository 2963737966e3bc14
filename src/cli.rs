//! Command-line interface for sortwise.
//!
//! Parses arguments with `clap`, layers them over the configuration file and
//! hands the result to [`FileOrganizer`]. Exit codes: 0 when nothing failed,
//! 1 when some file failed, 2 when the command could not run at all.

use crate::category::CategoryMap;
use crate::classifier::OrganizationMode;
use crate::config::{self, Config};
use crate::conflict::ConflictPolicy;
use crate::error::{ConfigError, OrganizeResult};
use crate::file_organizer::{FileOrganizer, OrganizeRequest};
use crate::ledger::LedgerHandle;
use crate::output::{OutputFormatter, TerminalReporter};
use crate::planner::ActionKind;
use crate::progress::ProgressReporter;
use crate::report::{RunReport, RunStatus};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sortwise", version, about = "Sort a directory into folders by type, date, size or name, with undo")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only show errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Organize the files of a directory
    Organize(OrganizeArgs),
    /// Revert the last organize run
    Undo(UndoArgs),
    /// Show or create the category file
    Categories(CategoriesArgs),
}

#[derive(Args, Debug, Default)]
pub struct OrganizeArgs {
    /// Directory to organize
    pub source: PathBuf,

    /// Destination root (default: <SOURCE>/Organized_Files)
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Grouping: type, date, day, size, first-letter, name
    #[arg(long)]
    pub mode: Option<OrganizationMode>,

    /// move or copy
    #[arg(long)]
    pub action: Option<ActionKind>,

    /// What to do when a name is taken: rename, overwrite, skip
    #[arg(long)]
    pub conflict: Option<ConflictPolicy>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Leave files with unknown extensions in place
    #[arg(long)]
    pub skip_uncategorized: bool,

    /// Show what would happen without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum ` (n)` suffix tried when renaming around a conflict
    #[arg(long)]
    pub rename_limit: Option<u32>,

    /// Configuration file (default: ./.sortwise.toml, then the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Category file (JSON)
    #[arg(long)]
    pub categories: Option<PathBuf>,

    /// Undo ledger file
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Default)]
pub struct UndoArgs {
    /// Show what undo would restore without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Undo ledger file
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Default)]
pub struct CategoriesArgs {
    /// Write the built-in categories to the category file
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing category file with --init
    #[arg(long, requires = "init")]
    pub force: bool,

    /// Category file (JSON)
    #[arg(long)]
    pub categories: Option<PathBuf>,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is unset.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

/// Runs the parsed command and returns the process exit code.
///
/// # Errors
///
/// Configuration and ledger errors that stop the command before any file
/// is processed.
pub fn run_cli(cli: &Cli) -> OrganizeResult<u8> {
    match &cli.command {
        Command::Organize(args) => organize(args, cli),
        Command::Undo(args) => undo(args, cli),
        Command::Categories(args) => categories(args, cli).map(|_| 0),
    }
}

/// Builds the request from the config file with flags layered on top.
pub fn build_request(args: &OrganizeArgs, config: &Config) -> OrganizeRequest {
    let mut request = config.organize.request_for(&args.source);
    if let Some(dest) = &args.dest {
        request.destination = Some(dest.clone());
    }
    if let Some(mode) = args.mode {
        request.mode = mode;
    }
    if let Some(action) = args.action {
        request.action = action;
    }
    if let Some(conflict) = args.conflict {
        request.conflict_policy = conflict;
    }
    if let Some(limit) = args.rename_limit {
        request.rename_limit = limit;
    }
    request.recursive |= args.recursive;
    request.skip_uncategorized |= args.skip_uncategorized;
    request
}

fn organize(args: &OrganizeArgs, cli: &Cli) -> OrganizeResult<u8> {
    let settings = Config::load(args.config.as_deref())?;
    let request = build_request(args, &settings);

    let categories_file = args
        .categories
        .as_deref()
        .or(settings.organize.categories_file.as_deref());
    let categories = config::load_categories(categories_file)?;
    let filters = settings.compile_filters()?;

    let organizer = FileOrganizer::new(categories)
        .with_filters(filters)
        .with_reporter(reporter(cli, args.json));

    if !cli.quiet && !args.json {
        let verb = if args.dry_run { "Previewing" } else { "Organizing" };
        OutputFormatter::info(&format!(
            "{} {} by {}",
            verb,
            request.source.display(),
            request.mode
        ));
    }

    let report = if args.dry_run {
        organizer.preview(&request)?
    } else {
        let ledger = open_ledger(args.ledger.as_deref())?;
        organizer.organize(&request, &ledger)?
    };

    Ok(finish(&report, cli, args.json))
}

fn undo(args: &UndoArgs, cli: &Cli) -> OrganizeResult<u8> {
    let ledger = open_ledger(args.ledger.as_deref())?;
    let organizer = FileOrganizer::new(CategoryMap::empty()).with_reporter(reporter(cli, args.json));
    let report = organizer.undo(&ledger, args.dry_run)?;
    Ok(finish(&report, cli, args.json))
}

fn categories(args: &CategoriesArgs, cli: &Cli) -> OrganizeResult<()> {
    let path = args
        .categories
        .clone()
        .or_else(config::default_categories_path);

    if args.init {
        let path = path.ok_or_else(|| {
            ConfigError::ConfigInvalid("no configuration directory on this platform".to_string())
        })?;
        if path.exists() && !args.force {
            OutputFormatter::warning(&format!(
                "{} already exists; use --force to replace it",
                path.display()
            ));
        } else {
            config::save_categories(&path, &CategoryMap::default())?;
            OutputFormatter::success(&format!("Wrote default categories to {}", path.display()));
        }
    }

    let explicit = args.categories.as_deref();
    let map = config::load_categories(explicit)?;
    if cli.quiet {
        return Ok(());
    }

    OutputFormatter::header("CATEGORIES");
    for (name, extensions) in map.iter() {
        OutputFormatter::plain(&format!("{:<12} {}", name, extensions.join(" ")));
    }
    Ok(())
}

fn open_ledger(path: Option<&Path>) -> OrganizeResult<LedgerHandle> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config::default_ledger_path);
    tracing::debug!(path = %path.display(), "Opening ledger");
    Ok(LedgerHandle::open_file(path)?)
}

fn reporter(cli: &Cli, json: bool) -> Arc<dyn ProgressReporter> {
    if cli.quiet || json {
        Arc::new(TerminalReporter::hidden())
    } else {
        Arc::new(TerminalReporter::new(cli.verbose > 0))
    }
}

/// Prints the report and maps its status to an exit code.
fn finish(report: &RunReport, cli: &Cli, json: bool) -> u8 {
    if json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => OutputFormatter::error(&format!("Could not serialize report: {}", e)),
        }
    } else if !cli.quiet {
        if report.dry_run {
            OutputFormatter::dry_run_notice("No files were changed");
            if cli.verbose == 0 {
                for entry in &report.entries {
                    OutputFormatter::plain(&OutputFormatter::entry_line(entry));
                }
            }
        }
        OutputFormatter::summary_table(report);
    }

    match report.status() {
        RunStatus::Success => 0,
        RunStatus::PartialFailure | RunStatus::TotalFailure => 1,
    }
}
