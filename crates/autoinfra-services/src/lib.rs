#![doc = include_str!("../README.md")]

pub mod config;
pub mod telemetry;

use autoinfra_lifecycle::{ServiceConfig, ServiceRegistry};
use clap::{CommandFactory, FromArgMatches};
use config::{CliArgs, ServiceProfile};
use telemetry::init_telemetry;

/// Shared `main` body for every service binary.
///
/// Loads `.env`, parses arguments, installs telemetry and hands the service to
/// the lifecycle manager. Telemetry is flushed whether the lifecycle ends in a
/// graceful stop or a fatal error.
pub async fn launch(profile: ServiceProfile, registry: ServiceRegistry) -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let matches = CliArgs::command().name(profile.binary).get_matches();
    let args = CliArgs::from_arg_matches(&matches)?;
    let config = args.into_service_config(&profile)?;

    let providers = init_telemetry(&profile)?;
    log_startup_info(&config);

    let res = autoinfra_lifecycle::start(config, registry).await;
    if let Err(e) = &res {
        tracing::error!("{} service terminated: {e}", profile.name);
    }
    providers.shutdown();
    Ok(res?)
}

fn log_startup_info(config: &ServiceConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Launching {} service on {} with full config: {:#?}",
            config.name,
            config.socket_addr(),
            config
        );
    } else {
        tracing::info!(
            "Launching {} service on {}",
            config.name,
            config.socket_addr()
        );
    }
}
