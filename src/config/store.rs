//! On-disk persistence of the scoped configuration document.
//!
//! The document lives at `<home>/.doppler.yaml` (or the `--configuration`
//! override). Every save goes through a sibling temp file that is fsynced and
//! renamed over the target, so a crash leaves either the old or the new
//! document on disk and never a truncated one. There is no cross-process
//! lock: concurrent writers resolve as last-writer-wins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::migrate::{self, StartupOutcome};
use crate::config::resolver::{self, ResolvedOptions};
use crate::config::schema::{Assignment, ConfigOption, Document, ScopedOptions};
use crate::config::scope::Scope;
use crate::sys;
use crate::{Error, Result};

/// File name of the configuration document under the home directory.
pub const CONFIG_FILE_NAME: &str = ".doppler.yaml";

/// File name of the legacy JSON document under the home directory.
pub const LEGACY_FILE_NAME: &str = ".doppler.json";

/// Locations of the current and legacy documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub config: PathBuf,
    pub legacy: PathBuf,
}

impl StorePaths {
    /// Standard locations inside `home`.
    pub fn in_home(home: &Path) -> Self {
        Self {
            config: home.join(CONFIG_FILE_NAME),
            legacy: home.join(LEGACY_FILE_NAME),
        }
    }

    /// Resolve paths from an optional `--configuration` override.
    ///
    /// With an override the legacy file is expected next to it; without one
    /// both files live in the user's home directory.
    pub fn resolve(config_override: Option<&Path>) -> Result<Self> {
        match config_override {
            Some(config) => Ok(Self {
                config: config.to_path_buf(),
                legacy: parent_dir(config).join(LEGACY_FILE_NAME),
            }),
            None => Ok(Self::in_home(&sys::home_dir()?)),
        }
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Whether the document file is present.
pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Read and parse the document. An empty file is an empty document.
///
/// Hand-edited keys are brought into canonical form on the way in, so
/// `/a` and `/a/` name the same entry.
pub fn load(path: &Path) -> Result<Document> {
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Document::new());
    }
    let raw: Document = serde_yaml::from_str(&contents).map_err(|e| Error::CorruptStore {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    canonicalize_entries(raw, path)
}

/// Rebuild a document with canonical scope keys.
///
/// Empty entries are dropped. Keys that collapse onto the same canonical
/// scope are merged field by field, later keys winning. A key that cannot
/// be canonicalised makes the whole document corrupt.
pub(crate) fn canonicalize_entries<I>(entries: I, source: &Path) -> Result<Document>
where
    I: IntoIterator<Item = (String, ScopedOptions)>,
{
    let mut document = Document::new();
    for (raw_scope, options) in entries {
        if options.is_empty() {
            continue;
        }
        let scope = Scope::parse(&raw_scope, Path::new("/")).map_err(|e| Error::CorruptStore {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;

        let entry = document.entry(scope.as_str().to_string()).or_default();
        for option in ConfigOption::ALL {
            let value = options.get(option);
            if !value.is_empty() {
                entry.set(option, value);
            }
        }
    }
    Ok(document)
}

/// Serialise the document exactly as [`save`] writes it.
pub fn serialize(document: &Document) -> Result<String> {
    if document.is_empty() {
        return Ok(String::new());
    }
    serde_yaml::to_string(document)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Symlink hops followed before giving up on a store path.
const MAX_SYMLINK_DEPTH: usize = 40;

/// The file a save should replace: `path` itself, or the file at the end of
/// its symlink chain so the link survives the rename.
fn write_target(path: &Path) -> Result<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_DEPTH {
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let link = fs::read_link(&current)?;
                current = if link.is_absolute() {
                    link
                } else {
                    parent_dir(&current).join(link)
                };
            }
            _ => return Ok(current),
        }
    }
    Err(Error::Io(std::io::Error::other(format!(
        "too many levels of symbolic links: {}",
        path.display()
    ))))
}

/// Atomically replace the document at `path` with mode 0600.
///
/// When `path` is a symlink the file it points to is replaced and the link
/// is left in place.
pub fn save(path: &Path, document: &Document) -> Result<()> {
    let contents = serialize(document)?;
    let target = write_target(path)?;
    let path = target.as_path();
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    #[cfg(unix)]
    {
        use crate::config::schema::CONFIG_FILE_MODE;
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(CONFIG_FILE_MODE))?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!(path = %path.display(), scopes = document.len(), "saved config");
    Ok(())
}

/// The loaded document together with where it persists.
///
/// Mutations work on a copy that only replaces the in-memory document after
/// the write succeeded, so a failed call leaves both memory and disk as they
/// were.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: StorePaths,
    document: Document,
}

impl ConfigStore {
    /// Run startup (legacy migration or first-run initialisation) and load.
    pub fn open(paths: StorePaths) -> Result<Self> {
        let outcome = migrate::prepare(&paths)?;
        if let StartupOutcome::Migrated { scopes } = outcome {
            tracing::info!(
                from = %paths.legacy.display(),
                to = %paths.config.display(),
                scopes,
                "migrated legacy config"
            );
        }
        let document = load(&paths.config)?;
        Ok(Self { paths, document })
    }

    /// Wrap an already loaded document.
    pub fn with_document(paths: StorePaths, document: Document) -> Self {
        Self { paths, document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn path(&self) -> &Path {
        &self.paths.config
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Resolve the options that apply at `query`.
    pub fn resolve(&self, query: &Scope) -> ResolvedOptions {
        resolver::resolve_scope(&self.document, query)
    }

    /// Validate raw `name=value` arguments and apply them at `scope`.
    pub fn set_raw<S: AsRef<str>>(&mut self, scope: &Scope, raw: &[S]) -> Result<()> {
        let assignments = Assignment::parse_all(raw)?;
        self.set(scope, &assignments)
    }

    /// Apply assignments in order to the entry at `scope`, creating it if needed.
    pub fn set(&mut self, scope: &Scope, assignments: &[Assignment]) -> Result<()> {
        if assignments.is_empty() {
            return Err(Error::MissingArgument(
                "expected at least one name=value pair".to_string(),
            ));
        }

        let mut next = self.document.clone();
        let entry = next.entry(scope.as_str().to_string()).or_default();
        for assignment in assignments {
            entry.set(assignment.option, assignment.value.clone());
        }
        if entry.is_empty() {
            next.remove(scope.as_str());
        }

        self.commit(next)
    }

    /// Validate raw option names and clear them at `scope`.
    pub fn unset_raw<S: AsRef<str>>(&mut self, scope: &Scope, raw: &[S]) -> Result<bool> {
        let options = raw
            .iter()
            .map(|name| ConfigOption::parse(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.unset(scope, &options)
    }

    /// Clear options at `scope`, dropping the entry once it is empty.
    ///
    /// Returns `false` without touching disk when the scope has no entry.
    pub fn unset(&mut self, scope: &Scope, options: &[ConfigOption]) -> Result<bool> {
        if options.is_empty() {
            return Err(Error::MissingArgument(
                "expected at least one option name".to_string(),
            ));
        }
        if !self.document.contains_key(scope.as_str()) {
            return Ok(false);
        }

        let mut next = self.document.clone();
        if let Some(entry) = next.get_mut(scope.as_str()) {
            for option in options {
                entry.clear(*option);
            }
            if entry.is_empty() {
                next.remove(scope.as_str());
            }
        }

        self.commit(next)?;
        Ok(true)
    }

    fn commit(&mut self, next: Document) -> Result<()> {
        save(&self.paths.config, &next)?;
        self.document = next;
        Ok(())
    }
}
