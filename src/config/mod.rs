//! Scoped local configuration for Doppler.
//!
//! ## .doppler.yaml
//!
//! Located at `~/.doppler.yaml` unless `--configuration` points elsewhere.
//! A mapping from scope to options:
//!
//! ```yaml
//! '*':
//!   key: dp.st.xxxx
//! /home/u/proj/:
//!   project: backend
//!   config: dev
//! ```
//!
//! A scope is `*` (applies everywhere) or an absolute directory path with a
//! trailing separator (applies to that directory and its descendants).
//!
//! ## Security
//!
//! The file holds API keys and MUST be written with 0600 permissions.
//!
//! ## Legacy format
//!
//! `~/.doppler.json` uses `pipeline`/`environment`/`key` field names. It is
//! converted once when `.doppler.yaml` does not exist yet and is never
//! modified.
//!
//! ## Precedence
//!
//! CLI flag > most specific matching scope > less specific scope > `*`.
//! Use the [`resolver`] module for resolution.

pub mod migrate;
pub mod resolver;
pub mod schema;
pub mod scope;
pub mod store;

pub use migrate::StartupOutcome;
pub use resolver::{
    ConfigOverrides, Resolved, ResolvedOptions, ValueSource, mask_secret, resolve_effective,
    resolve_scope,
};
#[cfg(unix)]
pub use schema::CONFIG_FILE_MODE;
pub use schema::{Assignment, ConfigOption, Document, ScopedOptions};
pub use scope::{Scope, WILDCARD};
pub use store::{CONFIG_FILE_NAME, ConfigStore, LEGACY_FILE_NAME, StorePaths};
