//! Case-insensitive ignore sets for discovery.
//!
//! Matching is by base name only (`readme.md`, never `docs/readme.md`) and is
//! an exact comparison, not a glob.

use std::collections::HashSet;
use std::ffi::OsStr;

/// A read-only set of base names excluded from discovery.
///
/// Names are folded to lowercase on insert so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    names: HashSet<String>,
}

impl IgnoreSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    /// Parse a comma-separated list (`"readme.md, .gitkeep"`).
    pub fn from_csv(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.names.is_empty() && self.names.contains(&name.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// True when `name` is listed in `ignore`.
///
/// Names that are not valid UTF-8 are compared lossily.
pub fn is_ignored(name: &OsStr, ignore: &IgnoreSet) -> bool {
    ignore.contains(&name.to_string_lossy())
}
