//! Launcher → shipper, once.
//!
//! Everything that can fail without a container (runtime, image) is checked
//! before the destination is touched, and the destination is ready before
//! the container starts.

use std::future::Future;

use log::{info, warn};

use crate::cloudwatch::{LogSink, ShipError, Shipper, SinkError};
use crate::config::RunConfig;
use crate::container::{ContainerRuntime, LaunchError, LaunchedContainer, OutputLines};

/// Exit status reported when the run was interrupted.
const INTERRUPTED_EXIT_CODE: u8 = 130;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Destination(#[from] SinkError),
    #[error(transparent)]
    Ship(#[from] ShipError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited(i64),
    Interrupted,
}

impl Outcome {
    /// Process exit status: the container's own when it fits, else 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Exited(code) => u8::try_from(*code).unwrap_or(1),
            Outcome::Interrupted => INTERRUPTED_EXIT_CODE,
        }
    }
}

/// Runs the container once. `interrupt` may resolve at any point: before the
/// container exists the run just stops, afterwards the container is stopped.
/// Either way it is removed before returning.
pub async fn run<F>(
    config: &RunConfig,
    runtime: &dyn ContainerRuntime,
    sink: &dyn LogSink,
    interrupt: F,
) -> Result<Outcome, RunError>
where
    F: Future<Output = ()>,
{
    let mut interrupt = std::pin::pin!(interrupt);
    let shipper = Shipper::new(sink, config);

    tokio::select! {
        biased;
        () = &mut interrupt => {
            warn!("Interrupted before the container was started");
            return Ok(Outcome::Interrupted);
        }
        prepared = prepare(config, runtime, &shipper) => prepared?,
    }

    // Not raced: a launch dropped halfway could leave a container behind.
    // A signal arriving meanwhile is seen by `supervise`.
    let container = runtime.launch(&config.container).await?;
    info!("Container is running...");

    let id = container.id.clone();
    let result = supervise(runtime, &shipper, container, interrupt).await;

    if let Err(e) = runtime.remove(&id).await {
        warn!("Failed to remove container {}: {}", id, e);
    }
    result
}

async fn prepare(
    config: &RunConfig,
    runtime: &dyn ContainerRuntime,
    shipper: &Shipper<'_>,
) -> Result<(), RunError> {
    runtime.check_available().await?;
    runtime
        .prepare_image(&config.container.image, config.container.pull)
        .await?;
    shipper.ensure_destination().await?;
    Ok(())
}

async fn supervise<F>(
    runtime: &dyn ContainerRuntime,
    shipper: &Shipper<'_>,
    container: LaunchedContainer,
    interrupt: F,
) -> Result<Outcome, RunError>
where
    F: Future<Output = ()>,
{
    let LaunchedContainer { id, output } = container;
    let mut lines = OutputLines::new(output);

    let finished = async {
        let report = shipper.ship(&mut lines).await?;
        let code = runtime.wait(&id).await?;
        Ok::<_, RunError>((report, code))
    };

    tokio::select! {
        biased;
        () = interrupt => {
            warn!("Interrupted, stopping container {}", id);
            if let Err(e) = runtime.stop(&id).await {
                warn!("Failed to stop container {}: {}", id, e);
            }
            Ok(Outcome::Interrupted)
        }
        finished = finished => {
            let (report, code) = finished?;
            info!(
                "Container exited with code {}; sent {} of {} lines in {} requests",
                code, report.sent, report.lines, report.batches
            );
            if report.skipped > 0 || report.rejected > 0 {
                warn!(
                    "{} empty lines skipped, {} events rejected",
                    report.skipped, report.rejected
                );
            }
            Ok(Outcome::Exited(code))
        }
    }
}
