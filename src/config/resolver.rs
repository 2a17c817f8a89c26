//! Precedence resolution for scoped options and command-line overrides.
//!
//! ## Scope resolution
//!
//! Every entry whose scope contains the query contributes. Each option is
//! resolved independently: the value from the most specific (longest)
//! matching scope wins, and `*` loses to every path.
//!
//! ## Effective configuration (highest to lowest)
//!
//! 1. CLI flags (`--key`, `--project`, `--config`) when non-empty
//! 2. Scope-resolved values for `--scope`

use serde::Serialize;

use crate::config::schema::{ConfigOption, Document};
use crate::config::scope::Scope;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from the document entry at this scope string
    Scope(String),
    /// Value from CLI flag
    CliFlag,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Scope(scope) => write!(f, "{}", scope),
            ValueSource::CliFlag => write!(f, "flag"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    #[serde(rename = "scope")]
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// The three options after resolution, each with provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Resolved<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<Resolved<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Resolved<String>>,
}

impl ResolvedOptions {
    pub fn get(&self, option: ConfigOption) -> Option<&Resolved<String>> {
        match option {
            ConfigOption::Key => self.key.as_ref(),
            ConfigOption::Project => self.project.as_ref(),
            ConfigOption::Config => self.config.as_ref(),
        }
    }

    fn slot_mut(&mut self, option: ConfigOption) -> &mut Option<Resolved<String>> {
        match option {
            ConfigOption::Key => &mut self.key,
            ConfigOption::Project => &mut self.project,
            ConfigOption::Config => &mut self.config,
        }
    }

    /// The value for `option`, or `""` when unset.
    pub fn value(&self, option: ConfigOption) -> &str {
        self.get(option).map(|r| r.value.as_str()).unwrap_or("")
    }

    pub fn key(&self) -> &str {
        self.value(ConfigOption::Key)
    }

    pub fn project(&self) -> &str {
        self.value(ConfigOption::Project)
    }

    pub fn config(&self) -> &str {
        self.value(ConfigOption::Config)
    }

    /// True when no option resolved to a value.
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.project.is_none() && self.config.is_none()
    }

    /// Get the masked key for display purposes.
    pub fn masked_key(&self) -> Option<String> {
        self.key.as_ref().map(|r| mask_secret(&r.value))
    }
}

/// Mask all but the edges of a credential.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        let head: String = chars.iter().take(4.min(chars.len())).collect();
        format!("{}...", head)
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Resolve the options that apply at `query`.
///
/// When a more specific scope overrides a value, the value is replaced but
/// the recorded source keeps the scope that first supplied the option.
pub fn resolve_scope(document: &Document, query: &Scope) -> ResolvedOptions {
    let mut result = ResolvedOptions::default();
    // Specificity of the scope whose value currently occupies each slot.
    let mut depth = [0usize; 3];

    for (stored, options) in document {
        let scope = Scope::from_stored(stored);
        if !scope.contains(query) {
            continue;
        }

        for (idx, option) in ConfigOption::ALL.into_iter().enumerate() {
            let value = options.get(option);
            if value.is_empty() {
                continue;
            }

            let slot = result.slot_mut(option);
            match *slot {
                None => {
                    *slot = Some(Resolved::new(
                        value.to_string(),
                        ValueSource::Scope(stored.clone()),
                    ));
                    depth[idx] = scope.specificity();
                }
                Some(ref mut current) if scope.specificity() > depth[idx] => {
                    current.value = value.to_string();
                    depth[idx] = scope.specificity();
                }
                Some(_) => {}
            }
        }
    }

    tracing::debug!(
        scope = %query,
        key = result.key.as_ref().map(|r| r.source.to_string()),
        project = result.project.as_ref().map(|r| r.source.to_string()),
        config = result.config.as_ref().map(|r| r.source.to_string()),
        "resolved scope"
    );
    result
}

/// CLI overrides for option resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub key: Option<String>,
    pub project: Option<String>,
    pub config: Option<String>,
}

impl ConfigOverrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }

    fn get(&self, option: ConfigOption) -> Option<&str> {
        match option {
            ConfigOption::Key => self.key.as_deref(),
            ConfigOption::Project => self.project.as_deref(),
            ConfigOption::Config => self.config.as_deref(),
        }
    }
}

/// Layer non-empty CLI overrides on top of the scope-resolved options.
///
/// Read-only: nothing is persisted.
pub fn resolve_effective(
    document: &Document,
    query: &Scope,
    overrides: &ConfigOverrides,
) -> ResolvedOptions {
    let mut result = resolve_scope(document, query);
    for option in ConfigOption::ALL {
        if let Some(value) = overrides.get(option).filter(|v| !v.is_empty()) {
            *result.slot_mut(option) = Some(Resolved::new(value.to_string(), ValueSource::CliFlag));
        }
    }
    result
}
