use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use serde::Serialize;
use snapfront::{
    application::{cache_admin::CacheAdminService, error::AppError},
    cache::{CacheConfig, CachePolicies, CacheStore},
    config::{self, Command},
    infra::{error::InfraError, primary::open_primary, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args.command.unwrap_or(Command::Probe);

    telemetry::init(&settings.logging)?;

    let cache_config = CacheConfig::from(&settings.cache);
    let primary = open_primary(&cache_config)?;
    let store = Arc::new(CacheStore::new(&cache_config, primary));
    let admin = CacheAdminService::new(CachePolicies::new(store, &cache_config));

    match command {
        Command::Probe => print_json(&admin.probe().await),
        Command::Inspect(entry) => {
            let report = admin
                .inspect(entry.class, &entry.resource_id, entry.identity.as_deref())
                .await?;
            print_json(&report)
        }
        Command::Invalidate(entry) => {
            let report = admin
                .invalidate(entry.class, &entry.resource_id, entry.identity.as_deref())
                .await?;
            print_json(&report)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    writeln!(stdout).map_err(InfraError::from)?;
    Ok(())
}
