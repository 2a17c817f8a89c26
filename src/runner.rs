//! Secret injection: fetch secrets and run a child process with them.
//!
//! One run moves through `Init → Resolving → FetchingSecrets → Spawned →
//! Waiting → Exited`. The child inherits this process's stdin, stdout and
//! stderr unbuffered, and its exit status becomes ours.
//!
//! Secret values are never logged and never written to disk here.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::process::Command;

use crate::api::{ApiClient, SecretMap};
use crate::config::ResolvedOptions;
use crate::sys::{self, Foreground, SignalForwarder};
use crate::{Error, Result};

/// Variables the remote service may never override in the child.
pub const RESERVED: [&str; 3] = ["PATH", "PS1", "HOME"];

/// Whether `name` is in [`RESERVED`].
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Progress of a single `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Resolving,
    FetchingSecrets,
    Spawned,
    Waiting,
    Exited,
}

fn enter(state: RunState) {
    tracing::debug!(?state, "run state");
}

/// Compose the child's environment.
///
/// Starts from `parent` and adds each secret, replacing any parent variable
/// of the same name, except names in [`RESERVED`] which keep the parent's
/// value (or stay absent).
pub fn build_child_env<I, K, V>(parent: I, secrets: &SecretMap) -> BTreeMap<OsString, OsString>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut env: BTreeMap<OsString, OsString> = parent
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect();

    for (name, value) in secrets {
        if is_reserved(name) {
            tracing::debug!(name = %name, "ignoring reserved variable from Doppler");
            continue;
        }
        env.insert(OsString::from(name), OsString::from(value));
    }
    env
}

/// Fail unless the effective options carry an API key.
pub fn require_key(options: &ResolvedOptions) -> Result<()> {
    if options.key().is_empty() {
        return Err(Error::MissingArgument(
            "API key: pass --key or run `doppler configure set key=<key>`".to_string(),
        ));
    }
    Ok(())
}

/// Spawn `program` with exactly `env` and wait for it.
///
/// The child leads its own process group, which receives every forwarded
/// signal, and owns the terminal while it runs when this process did.
/// Returns the code this process should exit with: the child's exit code,
/// or `128 + signal` if it was killed by a signal.
pub fn spawn_and_wait(
    program: &str,
    args: &[String],
    env: &BTreeMap<OsString, OsString>,
) -> Result<i32> {
    let mut forwarder = SignalForwarder::install()?;

    let mut command = Command::new(program);
    command.args(args).env_clear().envs(env);
    sys::isolate_process_group(&mut command);
    let mut child = command
        .spawn()
        .map_err(|e| Error::Spawn(format!("{}: {}", program, e)))?;
    enter(RunState::Spawned);

    let foreground = Foreground::hand_to(child.id());
    forwarder.forward_to(child.id());
    enter(RunState::Waiting);
    let status = forwarder.wait(&mut child);
    foreground.restore();
    forwarder.stop();

    let code = sys::exit_code_from_status(&status?);
    enter(RunState::Exited);
    tracing::debug!(code, "child exited");
    Ok(code)
}

/// Fetch secrets for `options` and run `argv` with them injected.
///
/// A child exiting non-zero surfaces as [`Error::ChildFailure`] carrying its
/// code.
pub fn run(client: &ApiClient, options: &ResolvedOptions, argv: &[String]) -> Result<()> {
    enter(RunState::Init);
    let (program, args) = argv.split_first().ok_or_else(|| {
        Error::MissingArgument(
            "command to run (usage: doppler run -- <command> [args...])".to_string(),
        )
    })?;

    enter(RunState::Resolving);
    require_key(options)?;

    enter(RunState::FetchingSecrets);
    let secrets = client.fetch_secrets(options.key(), options.project(), options.config())?;
    let env = build_child_env(std::env::vars_os(), &secrets);

    match spawn_and_wait(program, args, &env)? {
        0 => Ok(()),
        code => Err(Error::ChildFailure { code }),
    }
}
