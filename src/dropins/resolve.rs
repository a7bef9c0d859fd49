//! Turning configured locations into filesystem paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolves a possibly symbolic or relative location to a concrete path.
pub trait PathResolver: Send + Sync {
    /// The filesystem path for `location`.
    fn resolve(&self, location: &str) -> PathBuf;
}

impl<F> PathResolver for F
where
    F: Fn(&str) -> PathBuf + Send + Sync,
{
    fn resolve(&self, location: &str) -> PathBuf {
        self(location)
    }
}

/// Resolves `${name}` prefixes from a variable table and relative locations
/// against a base directory.
///
/// # Examples
///
/// ```rust
/// use app_monitor::dropins::{PathResolver, SymbolicResolver};
/// use std::path::PathBuf;
///
/// let resolver = SymbolicResolver::new("/srv/server")
///     .with_var("shared.app.dir", "/srv/shared/apps");
///
/// assert_eq!(resolver.resolve("dropins"), PathBuf::from("/srv/server/dropins"));
/// assert_eq!(
///     resolver.resolve("${shared.app.dir}/shop.war"),
///     PathBuf::from("/srv/shared/apps/shop.war")
/// );
/// ```
#[derive(Debug, Clone)]
pub struct SymbolicResolver {
    base: PathBuf,
    vars: HashMap<String, PathBuf>,
}

impl SymbolicResolver {
    /// Resolve relative locations against `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            vars: HashMap::new(),
        }
    }

    /// Resolve relative locations against the process working directory.
    pub fn current_dir() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }

    /// Define `${name}`.
    pub fn with_var(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.vars.insert(name.into(), path.into());
        self
    }

    /// The directory relative locations are resolved against.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn expand<'a>(&'a self, location: &'a str) -> (Option<&'a Path>, &'a str) {
        let Some(rest) = location.strip_prefix("${") else {
            return (None, location);
        };
        let Some((name, tail)) = rest.split_once('}') else {
            return (None, location);
        };
        match self.vars.get(name) {
            Some(path) => (Some(path.as_path()), tail.trim_start_matches(['/', '\\'])),
            None => {
                tracing::debug!(var = name, location, "undefined location variable");
                (None, location)
            }
        }
    }
}

impl PathResolver for SymbolicResolver {
    fn resolve(&self, location: &str) -> PathBuf {
        match self.expand(location) {
            (Some(prefix), "") => prefix.to_path_buf(),
            (Some(prefix), tail) => prefix.join(tail),
            (None, literal) => self.base.join(literal),
        }
    }
}
