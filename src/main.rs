use std::process::ExitCode;

use clap::Parser;

use crate::cloudwatch::CloudWatchSink;
use crate::config::RunConfig;
use crate::container::docker::DockerRuntime;
use crate::pipeline::{Outcome, RunError};

mod cli;
mod cloudwatch;
mod config;
mod container;
mod pipeline;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match RunConfig::try_from(cli::Args::parse()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid arguments: {err}");
            return ExitCode::FAILURE;
        }
    };
    log::debug!("{:?}", config);

    match run(&config).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &RunConfig) -> Result<Outcome, RunError> {
    // Installed before anything is created, so no signal hits the default
    // handler while a container exists.
    let shutdown = shutdown_signal();
    let runtime = DockerRuntime::connect()?;
    let sink = CloudWatchSink::new(&config.aws).await;
    pipeline::run(config, &runtime, &sink, shutdown).await
}

/// Resolves on SIGINT or SIGTERM. The handlers are registered when this is
/// called, not when the future is first polled.
#[cfg(unix)]
fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{SignalKind, signal};

    let handlers = signal(SignalKind::interrupt())
        .and_then(|interrupt| Ok((interrupt, signal(SignalKind::terminate())?)));

    async move {
        match handlers {
            Ok((mut interrupt, mut terminate)) => tokio::select! {
                _ = interrupt.recv() => log::warn!("Received SIGINT"),
                _ = terminate.recv() => log::warn!("Received SIGTERM"),
            },
            Err(err) => {
                log::warn!("Unable to install signal handlers: {err}");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::warn!("Unable to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    }
}
