//! Schema definitions for `.doppler.yaml` and the legacy `.doppler.json`.
//!
//! This module provides:
//! - The scoped option triple (`key`, `project`, `config`)
//! - The document mapping scope strings to triples
//! - The legacy document shape consumed once by migration
//! - Option name and `name=value` assignment parsing

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// Required permissions for `.doppler.yaml` (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o600;

/// One of the three options a scope can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigOption {
    /// API credential
    Key,
    /// Logical project id
    Project,
    /// Named config (environment) under a project
    Config,
}

impl ConfigOption {
    /// All options in display order.
    pub const ALL: [ConfigOption; 3] = [
        ConfigOption::Key,
        ConfigOption::Project,
        ConfigOption::Config,
    ];

    /// Parse an option name. Names are exact and lowercase.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "key" => Ok(ConfigOption::Key),
            "project" => Ok(ConfigOption::Project),
            "config" => Ok(ConfigOption::Config),
            other => Err(Error::InvalidOption(format!(
                "unknown option '{}' (expected one of: key, project, config)",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigOption::Key => "key",
            ConfigOption::Project => "project",
            ConfigOption::Config => "config",
        }
    }
}

impl std::fmt::Display for ConfigOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed `name=value` argument to `configure set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub option: ConfigOption,
    pub value: String,
}

impl Assignment {
    /// Parse `name=value`. The value may itself contain `=`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (name, value) = raw.split_once('=').ok_or_else(|| {
            Error::InvalidOption(format!("'{}' is not of the form name=value", raw))
        })?;
        Ok(Self {
            option: ConfigOption::parse(name)?,
            value: value.to_string(),
        })
    }

    /// Parse every argument, failing on the first malformed one.
    pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Self>> {
        raw.iter().map(|r| Self::parse(r.as_ref())).collect()
    }
}

/// The options stored for a single scope.
///
/// Empty strings mean "not set". On disk empty fields are omitted; loaders
/// accept omitted, empty and null fields alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedOptions {
    #[serde(
        default,
        deserialize_with = "string_or_null",
        skip_serializing_if = "String::is_empty"
    )]
    pub project: String,

    #[serde(
        default,
        deserialize_with = "string_or_null",
        skip_serializing_if = "String::is_empty"
    )]
    pub config: String,

    #[serde(
        default,
        deserialize_with = "string_or_null",
        skip_serializing_if = "String::is_empty"
    )]
    pub key: String,
}

impl ScopedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no option is set.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.project.is_empty() && self.config.is_empty()
    }

    pub fn get(&self, option: ConfigOption) -> &str {
        match option {
            ConfigOption::Key => &self.key,
            ConfigOption::Project => &self.project,
            ConfigOption::Config => &self.config,
        }
    }

    pub fn set(&mut self, option: ConfigOption, value: impl Into<String>) {
        let value = value.into();
        match option {
            ConfigOption::Key => self.key = value,
            ConfigOption::Project => self.project = value,
            ConfigOption::Config => self.config = value,
        }
    }

    pub fn clear(&mut self, option: ConfigOption) {
        self.set(option, String::new());
    }
}

fn string_or_null<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// The whole persisted mapping from scope string to options.
///
/// Keys are `*` or canonical absolute paths ending in `/`. The sorted map
/// keeps on-disk output stable and yields matching ancestors before their
/// descendants.
pub type Document = BTreeMap<String, ScopedOptions>;

/// Options as stored by the legacy `.doppler.json` format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LegacyOptions {
    #[serde(default, deserialize_with = "string_or_null")]
    pub pipeline: String,

    #[serde(default, deserialize_with = "string_or_null")]
    pub environment: String,

    #[serde(default, deserialize_with = "string_or_null")]
    pub key: String,
}

impl From<LegacyOptions> for ScopedOptions {
    fn from(legacy: LegacyOptions) -> Self {
        Self {
            project: legacy.pipeline,
            config: legacy.environment,
            key: legacy.key,
        }
    }
}

/// The legacy document: same shape, legacy field names.
pub type LegacyDocument = BTreeMap<String, LegacyOptions>;
