//! Doppler CLI - fetch secrets and inject them into processes.

use clap::Parser;
use doppler::api::ApiClient;
use doppler::cli::{Cli, Commands, ConfigureCommands, GlobalArgs, SecretsCommands};
use doppler::commands::{self, CommandResult};
use doppler::config::{ConfigStore, Scope, StorePaths, resolve_effective};
use doppler::{Error, Result};
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.debug);

    let json = cli.global.json;
    if let Err(e) = run_command(cli.command, &cli.global) {
        // The child already reported its own failure
        if !matches!(e, Error::ChildFailure { .. }) {
            if json {
                eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
            } else {
                eprintln!("Error: {}", e);
            }
        }
        process::exit(e.exit_code());
    }
}

/// Log to stderr. `DOPPLER_LOG` takes a full filter directive; otherwise
/// `--debug` enables debug output for this crate and everything else is
/// limited to warnings.
fn init_logging(debug: bool) {
    let default = if debug { "doppler=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("DOPPLER_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn run_command(command: Commands, global: &GlobalArgs) -> Result<()> {
    let paths = StorePaths::resolve(global.configuration.as_deref())?;
    let mut store = ConfigStore::open(paths)?;
    let scope = Scope::from_cwd(&global.scope)?;
    tracing::debug!(scope = %scope, path = %store.path().display(), "configuration loaded");

    match command {
        Commands::Configure { command } => match command {
            None => output(&commands::configure_show(&store), global.json),
            Some(ConfigureCommands::Get { names, plain }) => {
                let options = resolve_effective(store.document(), &scope, &global.overrides());
                let result = commands::configure_get(&scope, options, &names, plain)?;
                output(&result, global.json);
            }
            Some(ConfigureCommands::Set { pairs }) => {
                let result = commands::configure_set(&mut store, &scope, &pairs)?;
                output(&result, global.json);
            }
            Some(ConfigureCommands::Unset { names }) => {
                let result = commands::configure_unset(&mut store, &scope, &names)?;
                output(&result, global.json);
            }
        },
        Commands::Secrets { plain, command } => {
            let options = resolve_effective(store.document(), &scope, &global.overrides());
            let client = ApiClient::new(&global.api_host);
            let (names, plain) = match command {
                Some(SecretsCommands::Get {
                    names,
                    plain: get_plain,
                }) => (names, plain || get_plain),
                None => (Vec::new(), plain),
            };
            let result = commands::secrets(&client, &options, &names, plain)?;
            output(&result, global.json);
        }
        Commands::Run { command } => {
            let options = resolve_effective(store.document(), &scope, &global.overrides());
            let client = ApiClient::new(&global.api_host);
            commands::run(&client, &options, &command)?;
        }
    }
    Ok(())
}

fn output<T: CommandResult>(result: &T, json: bool) {
    if json {
        println!("{}", result.to_json());
    } else {
        println!("{}", result.to_human());
    }
}
