//! First-run handling: legacy migration or initialisation.
//!
//! Runs before the document is loaded. Once `.doppler.yaml` exists nothing
//! here touches disk again. The legacy `.doppler.json` is only ever read.

use std::fs;
use std::path::Path;

use crate::config::schema::{Document, LegacyDocument, ScopedOptions};
use crate::config::store::{self, StorePaths};
use crate::{Error, Result};

/// What startup had to do before the document could be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// `.doppler.yaml` already existed.
    Existing,
    /// The legacy document was converted and written out.
    Migrated { scopes: usize },
    /// Neither file existed; an empty document was created.
    Initialized,
}

/// Ensure the configuration file exists, migrating the legacy one if present.
pub fn prepare(paths: &StorePaths) -> Result<StartupOutcome> {
    if store::exists(&paths.config) {
        return Ok(StartupOutcome::Existing);
    }

    if paths.legacy.is_file() {
        let legacy = read_legacy(&paths.legacy)?;
        let document = convert_legacy(legacy, &paths.legacy)?;
        store::save(&paths.config, &document)?;
        return Ok(StartupOutcome::Migrated {
            scopes: document.len(),
        });
    }

    store::save(&paths.config, &Document::new())?;
    tracing::debug!(path = %paths.config.display(), "created empty config");
    Ok(StartupOutcome::Initialized)
}

fn read_legacy(path: &Path) -> Result<LegacyDocument> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| Error::CorruptStore {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Rename legacy fields and canonicalise scope keys.
///
/// Empty entries are dropped. Keys that collapse onto the same canonical
/// scope are merged field by field, later keys winning.
pub fn convert_legacy(legacy: LegacyDocument, source: &Path) -> Result<Document> {
    store::canonicalize_entries(
        legacy
            .into_iter()
            .map(|(scope, options)| (scope, ScopedOptions::from(options))),
        source,
    )
}
