//! Configuration files: organize defaults, filter rules and the category file.
//!
//! Settings are read from TOML. Every table and key is optional:
//!
//! ```toml
//! [organize]
//! mode = "type"            # type, date, day, size, first-letter, name
//! action = "move"          # move or copy
//! conflict = "rename"      # rename, overwrite or skip
//! recursive = false
//! skip_uncategorized = false
//! rename_limit = 1000
//! destination = "/home/me/Sorted"
//! categories_file = "/home/me/.config/sortwise/categories.json"
//!
//! [filters]
//! enable_hidden_files = true
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "node_modules/**"]
//! extensions = ["bak", "tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```
//!
//! Filter patterns match the path relative to the source root.

use crate::category::{CategoryMap, normalize_extension};
use crate::classifier::OrganizationMode;
use crate::conflict::ConflictPolicy;
use crate::error::ConfigError;
use crate::file_organizer::OrganizeRequest;
use crate::planner::ActionKind;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Default bound on ` (n)` suffix attempts when renaming around a conflict.
pub const DEFAULT_RENAME_LIMIT: u32 = 1000;

const APP_DIR: &str = "sortwise";
const LOCAL_CONFIG: &str = ".sortwise.toml";

/// Contents of a sortwise TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub organize: OrganizeSettings,
    pub filters: FilterRules,
}

/// Defaults for `sortwise organize`, overridable per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeSettings {
    pub mode: OrganizationMode,
    pub action: ActionKind,
    pub conflict: ConflictPolicy,
    pub recursive: bool,
    pub skip_uncategorized: bool,
    pub rename_limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories_file: Option<PathBuf>,
}

impl Default for OrganizeSettings {
    fn default() -> Self {
        Self {
            mode: OrganizationMode::default(),
            action: ActionKind::default(),
            conflict: ConflictPolicy::default(),
            recursive: false,
            skip_uncategorized: false,
            rename_limit: DEFAULT_RENAME_LIMIT,
            destination: None,
            categories_file: None,
        }
    }
}

impl OrganizeSettings {
    /// A request for `source` carrying these settings.
    pub fn request_for(&self, source: &Path) -> OrganizeRequest {
        OrganizeRequest {
            source: source.to_path_buf(),
            destination: self.destination.clone(),
            mode: self.mode,
            action: self.action,
            conflict_policy: self.conflict,
            recursive: self.recursive,
            skip_uncategorized: self.skip_uncategorized,
            rename_limit: self.rename_limit,
        }
    }
}

/// Which files under the source take part in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Organize dotfiles and files inside dot-directories. Defaults to true.
    #[serde(default = "default_enable_hidden_files")]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Matches here win over every exclusion.
    #[serde(default)]
    pub include: IncludeRules,
}

fn default_enable_hidden_files() -> bool {
    true
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: default_enable_hidden_files(),
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeRules {
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns such as `*.tmp` or `node_modules/**`.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Case-insensitive, with or without the leading dot.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regexes tested against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Config {
    /// Finds and loads configuration.
    ///
    /// Looks at, in order:
    /// 1. `config_path`, which must exist when given
    /// 2. `.sortwise.toml` in the current directory
    /// 3. `sortwise/config.toml` under the platform config directory
    ///
    /// and falls back to defaults when none exists.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local = PathBuf::from(LOCAL_CONFIG);
        if local.is_file() {
            return Self::load_from_file(&local);
        }

        if let Some(user) = user_config_path()
            && user.is_file()
        {
            return Self::load_from_file(&user);
        }

        tracing::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Compiles the filter rules, rejecting malformed patterns.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// `sortwise/config.toml` under the platform config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// `sortwise/categories.json` under the platform config directory.
pub fn default_categories_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("categories.json"))
}

/// `sortwise/ledger.jsonl` under the platform data directory, or the
/// current directory when the platform has none.
pub fn default_ledger_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("ledger.jsonl")
}

/// Loads a category file.
///
/// An explicit `path` must exist. Without one, the default category file is
/// used when present, and the built-in categories otherwise.
pub fn load_categories(path: Option<&Path>) -> Result<CategoryMap, ConfigError> {
    let path = match path {
        Some(path) if !path.exists() => return Err(ConfigError::ConfigNotFound(path.to_path_buf())),
        Some(path) => path.to_path_buf(),
        None => match default_categories_path().filter(|p| p.is_file()) {
            Some(path) => path,
            None => return Ok(CategoryMap::default()),
        },
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let map: CategoryMap =
        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidCategories {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    tracing::debug!(path = %path.display(), categories = map.len(), "Loaded categories");
    Ok(map)
}

/// Writes `map` as pretty JSON, creating parent directories.
pub fn save_categories(path: &Path, map: &CategoryMap) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let raw: BTreeMap<String, Vec<String>> = map.clone().into();
    let json = serde_json::to_string_pretty(&raw).map_err(|e| ConfigError::InvalidCategories {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, json).map_err(io_error)
}

/// Filter rules with patterns compiled once up front.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl Default for CompiledFilters {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl CompiledFilters {
    /// Filters that let every file through.
    pub fn allow_all() -> Self {
        Self {
            enable_hidden_files: true,
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }

    pub fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .filter(|ext| !ext.is_empty())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Decides whether the file at `relative` (relative to the source root)
    /// takes part in the run.
    ///
    /// Include patterns win outright. Otherwise hidden paths, listed names,
    /// listed extensions, glob matches and regex matches are excluded.
    pub fn should_include(&self, relative: &Path) -> bool {
        if self.include_patterns.iter().any(|p| p.matches_path(relative)) {
            return true;
        }

        if !self.enable_hidden_files && is_hidden(relative) {
            return false;
        }

        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = relative.extension()
            && self
                .exclude_extensions
                .contains(&normalize_extension(&ext.to_string_lossy()))
        {
            return false;
        }

        if self.exclude_patterns.iter().any(|p| p.matches_path(relative)) {
            return false;
        }

        !self.exclude_regexes.iter().any(|r| r.is_match(&file_name))
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

/// True when any component of `path` starts with a dot.
fn is_hidden(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}
