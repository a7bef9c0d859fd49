//! File suffixes whose modification may be a minor update.

use std::path::Path;

/// Suffixes of files that can change without an application restart.
pub const BUILTIN_MINOR_UPDATE_SUFFIXES: &str = ".class,.jsp,.jspx,.jsw,.jsv,.jspf,.tld,.tag";

/// Case-insensitive allow-list of minor-update file suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinorUpdateSuffixes {
    suffixes: Vec<String>,
}

impl MinorUpdateSuffixes {
    /// The built-in list.
    pub fn builtin() -> Self {
        Self {
            suffixes: parse_list(BUILTIN_MINOR_UPDATE_SUFFIXES),
        }
    }

    /// The built-in list with the comma-separated `extra` suffixes appended.
    pub fn with_override(extra: &str) -> Self {
        let mut list = Self::builtin();
        for suffix in parse_list(extra) {
            if !list.suffixes.contains(&suffix) {
                list.suffixes.push(suffix);
            }
        }
        list
    }

    /// True when the file name of `path` ends with an allow-listed suffix.
    pub fn allows(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();
        self.suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }

    /// The suffixes, lower-cased.
    pub fn as_slice(&self) -> &[String] {
        &self.suffixes
    }
}

impl Default for MinorUpdateSuffixes {
    fn default() -> Self {
        Self::builtin()
    }
}

fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
