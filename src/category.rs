//! Extension to category mapping.
//!
//! A [`CategoryMap`] maps file extensions (case-insensitive, stored with a
//! leading dot) to category names. Every extension belongs to at most one
//! category; assigning it again moves it to the newer category.
//!
//! # Examples
//!
//! ```
//! use sortwise::category::{CategoryMap, UNCATEGORIZED};
//!
//! let map = CategoryMap::default();
//! assert_eq!(map.category_for(".PNG"), "Images");
//! assert_eq!(map.category_for(".xyz"), UNCATEGORIZED);
//! ```

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Category used for extensions no category claims.
pub const UNCATEGORIZED: &str = "Uncategorized";

const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Images",
        &[
            ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".webp", ".heic", ".svg", ".ico",
        ],
    ),
    (
        "Videos",
        &[
            ".mp4", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v", ".mpeg", ".mpg",
        ],
    ),
    (
        "Audio",
        &[".mp3", ".wav", ".aac", ".ogg", ".flac", ".m4a", ".wma", ".opus"],
    ),
    (
        "Documents",
        &[
            ".pdf", ".docx", ".doc", ".txt", ".pptx", ".ppt", ".xlsx", ".xls", ".odt", ".csv",
            ".rtf", ".tex",
        ],
    ),
    (
        "Archives",
        &[".zip", ".rar", ".7z", ".tar", ".gz", ".bz2", ".xz", ".iso"],
    ),
    (
        "Code",
        &[
            ".py", ".js", ".html", ".css", ".java", ".cpp", ".c", ".h", ".json", ".xml", ".yaml",
            ".yml",
        ],
    ),
    (
        "Executables",
        &[".exe", ".msi", ".apk", ".appimage", ".dmg", ".deb", ".rpm"],
    ),
];

/// Lowercases an extension and makes sure it carries a leading dot.
///
/// Returns an empty string for an empty input.
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

/// Category name to ordered extension list, with a reverse index for lookups.
///
/// Serializes as the persisted category file shape:
/// `{ "Images": [".png", ".jpg"], ... }`. Deserializing applies the
/// categories in file order, so an extension listed twice ends up in the
/// category that appears last in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "BTreeMap<String, Vec<String>>")]
pub struct CategoryMap {
    categories: BTreeMap<String, Vec<String>>,
    index: HashMap<String, String>,
}

impl CategoryMap {
    /// Creates a map with no categories; every file is uncategorized.
    pub fn empty() -> Self {
        Self {
            categories: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    /// Adds extensions to a category, creating it if needed.
    ///
    /// An extension already owned by another category is moved here.
    pub fn insert<I, S>(&mut self, category: &str, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.categories.entry(category.to_string()).or_default();

        for ext in extensions {
            let ext = normalize_extension(ext.as_ref());
            if ext.is_empty() {
                continue;
            }

            if let Some(previous) = self.index.insert(ext.clone(), category.to_string()) {
                if previous == category {
                    continue;
                }
                tracing::warn!(
                    extension = %ext,
                    from = %previous,
                    to = %category,
                    "Duplicate extension, keeping the later category"
                );
                if let Some(list) = self.categories.get_mut(&previous) {
                    list.retain(|e| e != &ext);
                }
            }

            if let Some(list) = self.categories.get_mut(category) {
                list.push(ext);
            }
        }
    }

    /// Returns the category owning `ext`, if any.
    pub fn lookup(&self, ext: &str) -> Option<&str> {
        self.index
            .get(&normalize_extension(ext))
            .map(String::as_str)
    }

    /// Returns the category for `ext`, falling back to [`UNCATEGORIZED`].
    pub fn category_for(&self, ext: &str) -> &str {
        self.lookup(ext).unwrap_or(UNCATEGORIZED)
    }

    /// Iterates categories in name order with their extensions.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(name, exts)| (name.as_str(), exts.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl Default for CategoryMap {
    fn default() -> Self {
        let mut map = Self::empty();
        for (name, exts) in DEFAULT_CATEGORIES {
            map.insert(name, exts.iter());
        }
        map
    }
}

impl<'de> Deserialize<'de> for CategoryMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(CategoryMapVisitor)
    }
}

struct CategoryMapVisitor;

impl<'de> Visitor<'de> for CategoryMapVisitor {
    type Value = CategoryMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of category names to extension lists")
    }

    fn visit_map<A>(self, mut access: A) -> Result<CategoryMap, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut map = CategoryMap::empty();
        while let Some((name, extensions)) = access.next_entry::<String, Vec<String>>()? {
            map.insert(&name, extensions);
        }
        Ok(map)
    }
}

impl From<CategoryMap> for BTreeMap<String, Vec<String>> {
    fn from(map: CategoryMap) -> Self {
        map.categories
    }
}
