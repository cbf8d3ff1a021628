// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Replays a captured invocation payload through the log forwarder.
//!
//! ```text
//! log-forwarder-replay <event.json> [object-root] [--function-arn <arn>]
//! ```
//!
//! Objects referenced by storage notifications are read from
//! `<object-root>/<bucket>/<key>`. Everything else is the forwarder's usual
//! environment.

use std::{env, path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use log_forwarder::{
    client::LogsApiClient,
    config::ForwarderConfig,
    context::ExecutionContext,
    handler::Forwarder,
    license_key::LicenseKeyFactory,
    logger::Formatter,
    object_store::LocalObjectStore,
};

const DEFAULT_FUNCTION_ARN: &str = "arn:aws:lambda:us-east-1:000000000000:function:log-forwarder-replay";

/// Replay a captured invocation payload through the log forwarder
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Captured invocation payload
    event: PathBuf,

    /// Directory holding objects as `<bucket>/<key>`
    #[arg(default_value = ".")]
    object_root: PathBuf,

    /// ARN of the function the forwarder runs as
    #[arg(long, env = "FUNCTION_ARN", default_value = DEFAULT_FUNCTION_ARN)]
    function_arn: String,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ForwarderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{}", config.log_level);
    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let context = match ExecutionContext::from_function_arn(&cli.function_arn) {
        Ok(context) => context,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let payload = match tokio::fs::read(&cli.event).await {
        Ok(payload) => payload,
        Err(e) => {
            error!("failed to read event file {}: {e}", cli.event.display());
            return ExitCode::FAILURE;
        }
    };

    let client = match LogsApiClient::from_config(Arc::new(license_key_factory(&config)), &config) {
        Ok(client) => client,
        Err(e) => {
            error!("error initializing logs client: {e}");
            return ExitCode::FAILURE;
        }
    };
    let forwarder = Forwarder::from_config(
        &config,
        Arc::new(LocalObjectStore::new(cli.object_root)),
        Arc::new(client),
        context,
    );

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling invocation");
            ctrl_c_cancel.cancel();
        }
    });

    match forwarder.handle(&payload, &cancel).await {
        Ok(summary) => {
            info!("Replay finished: {summary:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Replay failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// The key from `LICENSE_KEY`, else a key stored under the configured secret
/// name. Without a secret store, the secret is looked up as an environment
/// variable of that name.
fn license_key_factory(config: &ForwarderConfig) -> LicenseKeyFactory {
    if let Some(license_key) = &config.license_key {
        return LicenseKeyFactory::from_key(license_key);
    }
    let secret_name = config.license_key_secret_name.clone();
    LicenseKeyFactory::from_resolver(Arc::new(move || {
        let secret_name = secret_name.clone();
        Box::pin(async move {
            let name = secret_name?;
            let key = env::var(&name).ok();
            if key.is_none() {
                warn!("No license key found in secret {name}");
            }
            key
        })
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults_object_root() {
        let cli = Cli::try_parse_from([
            "log-forwarder-replay",
            "event.json",
            "--function-arn",
            DEFAULT_FUNCTION_ARN,
        ])
        .unwrap();

        assert_eq!(cli.event, PathBuf::from("event.json"));
        assert_eq!(cli.object_root, PathBuf::from("."));
        assert_eq!(cli.function_arn, DEFAULT_FUNCTION_ARN);
    }

    #[test]
    fn test_cli_requires_event() {
        assert!(Cli::try_parse_from(["log-forwarder-replay"]).is_err());
    }
}
