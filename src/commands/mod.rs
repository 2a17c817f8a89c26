//! Command implementations for the Doppler CLI.
//!
//! Each command returns a result that can be printed as JSON or for humans:
//! - `configure` - show, get, set and unset scoped options
//! - `secrets` - fetch and print secrets for the effective configuration
//! - `run` - inject secrets into a child process

use serde::Serialize;

use crate::api::{ApiClient, SecretMap};
use crate::config::{ConfigOption, ConfigStore, Document, ResolvedOptions, Scope, ScopedOptions};
use crate::{Error, Result, runner};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait CommandResult {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Parse option names, failing on the first unknown one.
fn parse_options(names: &[String]) -> Result<Vec<ConfigOption>> {
    names.iter().map(|n| ConfigOption::parse(n)).collect()
}

fn format_options(options: &ScopedOptions) -> Vec<String> {
    ConfigOption::ALL
        .iter()
        .filter(|o| !options.get(**o).is_empty())
        .map(|o| format!("  {:<8} {}", o.as_str(), options.get(*o)))
        .collect()
}

// ============================================================================
// configure
// ============================================================================

/// Every scope in the document.
#[derive(Debug, Serialize)]
pub struct ConfigureShow {
    pub path: String,
    pub scopes: Document,
}

impl CommandResult for ConfigureShow {
    fn to_json(&self) -> String {
        json(&self.scopes)
    }

    fn to_human(&self) -> String {
        if self.scopes.is_empty() {
            return format!("No configuration set ({})", self.path);
        }
        let mut lines = Vec::new();
        for (scope, options) in &self.scopes {
            lines.push(scope.clone());
            lines.extend(format_options(options));
        }
        lines.join("\n")
    }
}

/// Show the whole document.
pub fn configure_show(store: &ConfigStore) -> ConfigureShow {
    ConfigureShow {
        path: store.path().display().to_string(),
        scopes: store.document().clone(),
    }
}

/// Effective options at a scope, with provenance.
#[derive(Debug, Serialize)]
pub struct ConfigureGet {
    pub scope: String,
    #[serde(flatten)]
    pub options: ResolvedOptions,
    #[serde(skip)]
    pub selected: Vec<ConfigOption>,
    #[serde(skip)]
    pub plain: bool,
}

impl CommandResult for ConfigureGet {
    fn to_json(&self) -> String {
        if self.selected.len() == ConfigOption::ALL.len() {
            return json(self);
        }
        let mut filtered = ResolvedOptions::default();
        for option in &self.selected {
            match option {
                ConfigOption::Key => filtered.key = self.options.key.clone(),
                ConfigOption::Project => filtered.project = self.options.project.clone(),
                ConfigOption::Config => filtered.config = self.options.config.clone(),
            }
        }
        json(&ConfigureGet {
            scope: self.scope.clone(),
            options: filtered,
            selected: Vec::new(),
            plain: false,
        })
    }

    fn to_human(&self) -> String {
        if self.plain {
            return self
                .selected
                .iter()
                .map(|o| self.options.value(*o).to_string())
                .collect::<Vec<_>>()
                .join("\n");
        }

        let mut lines = Vec::new();
        for option in &self.selected {
            let line = match self.options.get(*option) {
                Some(resolved) => {
                    let shown = match option {
                        ConfigOption::Key => self.options.masked_key().unwrap_or_default(),
                        _ => resolved.value.clone(),
                    };
                    format!("{:<8} {:<24} ({})", option.as_str(), shown, resolved.source)
                }
                None => format!("{:<8} (not set)", option.as_str()),
            };
            lines.push(line);
        }
        lines.join("\n")
    }
}

/// Resolve the effective options at `scope`, optionally limited to `names`.
pub fn configure_get(
    scope: &Scope,
    options: ResolvedOptions,
    names: &[String],
    plain: bool,
) -> Result<ConfigureGet> {
    let selected = if names.is_empty() {
        ConfigOption::ALL.to_vec()
    } else {
        parse_options(names)?
    };
    Ok(ConfigureGet {
        scope: scope.to_string(),
        options,
        selected,
        plain,
    })
}

/// Options stored at a scope after a mutation.
#[derive(Debug, Serialize)]
pub struct ConfigureUpdate {
    pub scope: String,
    /// Whether the document changed on disk
    pub updated: bool,
    /// Options now stored at the scope; absent once the scope is removed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ScopedOptions>,
}

impl CommandResult for ConfigureUpdate {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match (&self.options, self.updated) {
            (Some(options), _) => {
                let mut lines = vec![format!("Updated {}", self.scope)];
                lines.extend(format_options(options));
                lines.join("\n")
            }
            (None, true) => format!("Removed {}", self.scope),
            (None, false) => format!("Nothing configured at {}", self.scope),
        }
    }
}

fn update_result(store: &ConfigStore, scope: &Scope, updated: bool) -> ConfigureUpdate {
    ConfigureUpdate {
        scope: scope.to_string(),
        updated,
        options: store.document().get(scope.as_str()).cloned(),
    }
}

/// Apply `name=value` pairs at `scope` and persist.
pub fn configure_set(
    store: &mut ConfigStore,
    scope: &Scope,
    pairs: &[String],
) -> Result<ConfigureUpdate> {
    store.set_raw(scope, pairs)?;
    Ok(update_result(store, scope, true))
}

/// Clear options at `scope` and persist.
pub fn configure_unset(
    store: &mut ConfigStore,
    scope: &Scope,
    names: &[String],
) -> Result<ConfigureUpdate> {
    let updated = store.unset_raw(scope, names)?;
    Ok(update_result(store, scope, updated))
}

// ============================================================================
// secrets
// ============================================================================

/// Fetched secrets, as requested by the user.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct SecretsResult {
    pub secrets: SecretMap,
    #[serde(skip)]
    pub plain: bool,
}

impl CommandResult for SecretsResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.plain {
            return self
                .secrets
                .values()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
        }
        let width = self.secrets.keys().map(|k| k.len()).max().unwrap_or(0);
        self.secrets
            .iter()
            .map(|(name, value)| format!("{:<width$}  {}", name, value, width = width))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fetch secrets for the effective options, optionally only `names`.
pub fn secrets(
    client: &ApiClient,
    options: &ResolvedOptions,
    names: &[String],
    plain: bool,
) -> Result<SecretsResult> {
    runner::require_key(options)?;
    let all = client.fetch_secrets(options.key(), options.project(), options.config())?;
    if names.is_empty() {
        return Ok(SecretsResult { secrets: all, plain });
    }

    let mut selected = SecretMap::new();
    for name in names {
        let value = all
            .get(name)
            .ok_or_else(|| Error::MissingArgument(format!("secret '{}' does not exist", name)))?;
        selected.insert(name.clone(), value.clone());
    }
    Ok(SecretsResult {
        secrets: selected,
        plain,
    })
}

// ============================================================================
// run
// ============================================================================

/// Run `argv` with secrets for the effective options injected.
pub fn run(client: &ApiClient, options: &ResolvedOptions, argv: &[String]) -> Result<()> {
    runner::run(client, options, argv)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{ConfigOverrides, resolve_effective};
    use crate::test_utils::TestEnv;
    use std::path::Path;

    fn scope(raw: &str) -> Scope {
        Scope::parse(raw, Path::new("/")).unwrap()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_configure_set_and_show() {
        let env = TestEnv::new();
        let mut store = env.open_store();

        let result = configure_set(&mut store, &scope("/srv/app"), &strings(&["project=P"])).unwrap();
        assert!(result.updated);
        assert_eq!(result.scope, "/srv/app/");
        assert_eq!(result.options.as_ref().unwrap().project, "P");
        assert!(result.to_human().contains("Updated /srv/app/"));

        let show = configure_show(&store);
        let parsed: serde_json::Value = serde_json::from_str(&show.to_json()).unwrap();
        assert_eq!(parsed["/srv/app/"]["project"], "P");
        assert!(show.to_human().contains("project"));
    }

    #[test]
    fn test_configure_show_empty() {
        let env = TestEnv::new();
        let store = env.open_store();
        let show = configure_show(&store);
        assert_eq!(show.to_json(), "{}");
        assert!(show.to_human().starts_with("No configuration set"));
    }

    #[test]
    fn test_configure_unset_removes_scope() {
        let env = TestEnv::new();
        let mut store = env.open_store();
        configure_set(&mut store, &scope("/x"), &strings(&["project=P"])).unwrap();

        let result = configure_unset(&mut store, &scope("/x"), &strings(&["project"])).unwrap();
        assert!(result.updated);
        assert!(result.options.is_none());
        assert_eq!(result.to_human(), "Removed /x/");

        let result = configure_unset(&mut store, &scope("/x"), &strings(&["project"])).unwrap();
        assert!(!result.updated);
        assert_eq!(result.to_human(), "Nothing configured at /x/");
    }

    #[test]
    fn test_configure_get_with_provenance() {
        let env = TestEnv::new();
        let mut store = env.open_store();
        configure_set(&mut store, &Scope::Wildcard, &strings(&["key=dp.st.abcdefghijklmnop"])).unwrap();
        configure_set(&mut store, &scope("/a"), &strings(&["project=PA"])).unwrap();

        let query = scope("/a/b");
        let overrides = ConfigOverrides::new().with_config("CF");
        let options = resolve_effective(store.document(), &query, &overrides);
        let result = configure_get(&query, options, &[], false).unwrap();

        let human = result.to_human();
        assert!(human.contains("dp.s...mnop"));
        assert!(!human.contains("dp.st.abcdefghijklmnop"));
        assert!(human.contains("(/a/)"));
        assert!(human.contains("(flag)"));

        let parsed: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(parsed["scope"], "/a/b/");
        assert_eq!(parsed["key"]["value"], "dp.st.abcdefghijklmnop");
        assert_eq!(parsed["key"]["scope"], "*");
        assert_eq!(parsed["project"]["scope"], "/a/");
        assert_eq!(parsed["config"]["scope"], "flag");
    }

    #[test]
    fn test_configure_get_plain_and_filtered() {
        let env = TestEnv::new();
        let mut store = env.open_store();
        configure_set(&mut store, &scope("/a"), &strings(&["project=PA", "config=dev"])).unwrap();

        let query = scope("/a");
        let options = store.resolve(&query);
        let result = configure_get(&query, options, &strings(&["config"]), true).unwrap();
        assert_eq!(result.to_human(), "dev");

        let parsed: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(parsed["config"]["value"], "dev");
        assert!(parsed.get("project").is_none());
    }

    #[test]
    fn test_configure_get_rejects_unknown_option() {
        let options = ResolvedOptions::default();
        assert!(matches!(
            configure_get(&Scope::Wildcard, options, &strings(&["color"]), false),
            Err(Error::InvalidOption(_))
        ));
    }

    #[test]
    fn test_configure_get_unset_field_human() {
        let result = configure_get(&scope("/"), ResolvedOptions::default(), &[], false).unwrap();
        assert!(result.to_human().contains("(not set)"));
        assert!(result.options.get(ConfigOption::Key).is_none());
    }

    #[test]
    fn test_secrets_requires_key() {
        let client = ApiClient::new("http://127.0.0.1:9");
        assert!(matches!(
            secrets(&client, &ResolvedOptions::default(), &[], false),
            Err(Error::MissingArgument(_))
        ));
    }

    #[test]
    fn test_secrets_result_output() {
        let mut map = SecretMap::new();
        map.insert("A".to_string(), "1".to_string());
        map.insert("LONGER".to_string(), "2".to_string());

        let result = SecretsResult {
            secrets: map.clone(),
            plain: false,
        };
        assert_eq!(result.to_human(), "A       1\nLONGER  2");
        assert_eq!(result.to_json(), r#"{"A":"1","LONGER":"2"}"#);

        let plain = SecretsResult {
            secrets: map,
            plain: true,
        };
        assert_eq!(plain.to_human(), "1\n2");
    }
}
