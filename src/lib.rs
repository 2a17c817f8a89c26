//! Doppler - a command-line client for the Doppler secret-management service.
//!
//! This library provides the core of the `doppler` CLI tool: the scoped
//! local configuration store, the resolver that turns scope + flags into the
//! effective configuration, and the runner that injects fetched secrets into
//! a child process.

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod runner;
pub mod sys;


/// Library-level error type for Doppler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unable to parse {path}: {message}")]
    CorruptStore { path: String, message: String },

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Doppler API returned HTTP {status}: {}", api::describe_error_body(.body))]
    Remote { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unable to launch command: {0}")]
    Spawn(String),

    #[error("Command exited with status {code}")]
    ChildFailure { code: i32 },
}

impl Error {
    /// Process exit code the binary should use for this error.
    ///
    /// A failing child forwards its own code; everything else is `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ChildFailure { code } => *code,
            _ => 1,
        }
    }
}

/// Result type alias for Doppler operations.
pub type Result<T> = std::result::Result<T, Error>;
