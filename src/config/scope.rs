//! Scope strings: the wildcard `*` or a canonical absolute directory path.
//!
//! Canonical paths are absolute, lexically normalised and end with the path
//! separator, so that "is `q` inside scope `s`" reduces to a string prefix
//! test that cannot match partial components (`/foo/` never matches
//! `/foobar/`).

use std::path::{MAIN_SEPARATOR, Path};

use crate::sys::absolutize;
use crate::{Error, Result};

/// The scope string that applies everywhere.
pub const WILDCARD: &str = "*";

/// A canonicalised scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// `*`: applies to every directory, least specific.
    Wildcard,
    /// Absolute directory path with a trailing separator.
    Path(String),
}

impl Scope {
    /// Canonicalise a raw scope argument, resolving relative paths against `cwd`.
    pub fn parse(raw: &str, cwd: &Path) -> Result<Self> {
        if raw == WILDCARD {
            return Ok(Scope::Wildcard);
        }
        if raw.is_empty() {
            return Err(Error::InvalidScope("scope must not be empty".to_string()));
        }

        let absolute = absolutize(Path::new(raw), cwd).ok_or_else(|| {
            Error::InvalidScope(format!("'{}' resolves outside the filesystem root", raw))
        })?;
        let mut canonical = absolute
            .to_str()
            .ok_or_else(|| Error::InvalidScope(format!("'{}' is not valid UTF-8", raw)))?
            .to_string();
        if !canonical.ends_with(MAIN_SEPARATOR) {
            canonical.push(MAIN_SEPARATOR);
        }
        Ok(Scope::Path(canonical))
    }

    /// Canonicalise against the process working directory.
    pub fn from_cwd(raw: &str) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::parse(raw, &cwd)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Scope::Wildcard => WILDCARD,
            Scope::Path(path) => path,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Scope::Wildcard)
    }

    /// Ordering weight for resolution: longer scopes are more specific and
    /// the wildcard loses to every path, including `/`.
    pub fn specificity(&self) -> usize {
        match self {
            Scope::Wildcard => 0,
            Scope::Path(path) => path.len(),
        }
    }

    /// Whether a document entry stored under this scope applies to `query`.
    ///
    /// A wildcard entry applies everywhere. A path entry applies to itself
    /// and its descendants. A wildcard query only sees wildcard entries.
    pub fn contains(&self, query: &Scope) -> bool {
        match (self, query) {
            (Scope::Wildcard, _) => true,
            (Scope::Path(_), Scope::Wildcard) => false,
            (Scope::Path(entry), Scope::Path(query)) => query.starts_with(entry.as_str()),
        }
    }

    /// Interpret a key already stored in a document.
    ///
    /// Stored keys are canonical, so this only normalises a missing trailing
    /// separator.
    pub fn from_stored(key: &str) -> Self {
        if key == WILDCARD {
            return Scope::Wildcard;
        }
        let mut path = key.to_string();
        if !path.ends_with(MAIN_SEPARATOR) {
            path.push(MAIN_SEPARATOR);
        }
        Scope::Path(path)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
