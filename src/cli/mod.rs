//! CLI argument definitions for Doppler.

use clap::{Args, Parser, Subcommand};

use crate::api::DEFAULT_API_HOST;
use crate::config::ConfigOverrides;

/// Version string including the build commit and timestamp.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("DOPPLER_GIT_COMMIT"),
    ", built ",
    env!("DOPPLER_BUILD_TIMESTAMP"),
    ")"
);

/// Doppler - fetch secrets and inject them into your processes.
///
/// Options are stored per directory in ~/.doppler.yaml. Use
/// `doppler configure set` to pick a key, project and config for a
/// directory, then `doppler run -- <command>` to run with its secrets.
#[derive(Parser, Debug)]
#[command(name = "doppler")]
#[command(author, version, long_version = LONG_VERSION, about = "Fetch secrets from Doppler and inject them into processes", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory whose configuration applies, or `*` for the global default
    #[arg(long, global = true, default_value = ".")]
    pub scope: String,

    /// Doppler API key (overrides the configured key)
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Doppler project (overrides the configured project)
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Doppler config (overrides the configured config)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Path to the configuration file [default: ~/.doppler.yaml]
    #[arg(long, global = true, env = "DOPPLER_CONFIG_FILE")]
    pub configuration: Option<std::path::PathBuf>,

    /// Doppler API base URL
    #[arg(long, global = true, env = "DOPPLER_API_HOST", default_value = DEFAULT_API_HOST)]
    pub api_host: String,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Log debug information to stderr
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalArgs {
    /// The flag overrides to layer over the scoped configuration.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            key: self.key.clone(),
            project: self.project.clone(),
            config: self.config.clone(),
        }
    }
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// View and edit scoped configuration (with no subcommand, show all scopes)
    Configure {
        #[command(subcommand)]
        command: Option<ConfigureCommands>,
    },

    /// Fetch secrets for the current configuration
    Secrets {
        /// Print values only, one per line
        #[arg(long)]
        plain: bool,

        #[command(subcommand)]
        command: Option<SecretsCommands>,
    },

    /// Run a command with secrets injected into its environment
    ///
    /// Everything after `--` is the command and its arguments.
    Run {
        /// Command to run, followed by its arguments
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
}

/// Configure subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigureCommands {
    /// Show the effective options for --scope and where each comes from
    Get {
        /// Options to show (key, project, config); all when omitted
        names: Vec<String>,

        /// Print values only, one per line
        #[arg(long)]
        plain: bool,
    },

    /// Set options at --scope
    Set {
        /// Assignments of the form name=value (name is key, project or config)
        #[arg(required = true, value_name = "NAME=VALUE")]
        pairs: Vec<String>,
    },

    /// Remove options from --scope
    Unset {
        /// Options to remove (key, project, config)
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },
}

/// Secrets subcommands
#[derive(Subcommand, Debug)]
pub enum SecretsCommands {
    /// Print only the named secrets
    Get {
        /// Secret names
        #[arg(required = true)]
        names: Vec<String>,

        /// Print values only, one per line
        #[arg(long)]
        plain: bool,
    },
}
