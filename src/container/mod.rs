//! The launcher side: run one container and expose its output.

pub mod docker;
#[cfg(test)]
pub mod fake;
pub mod output;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::ContainerSpec;

pub use output::{OutputChunk, OutputLine, OutputLines};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Docker daemon is not available: {0}")]
    RuntimeUnavailable(String),
    #[error("Image {image} is not available: {reason}")]
    ImageUnavailable { image: String, reason: String },
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("Container output stream failed: {0}")]
    Output(String),
}

/// When the image is pulled before the container is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PullPolicy {
    /// Pull only if the image is not present locally.
    #[default]
    Missing,
    /// Always pull, picking up a moved tag.
    Always,
    /// Never pull; fail if the image is not present.
    Never,
}

/// What to do with an image before creating the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAction {
    Use,
    Pull,
    Refuse,
}

impl PullPolicy {
    pub fn action(self, present: bool) -> ImageAction {
        match (self, present) {
            (PullPolicy::Always, _) => ImageAction::Pull,
            (PullPolicy::Missing | PullPolicy::Never, true) => ImageAction::Use,
            (PullPolicy::Missing, false) => ImageAction::Pull,
            (PullPolicy::Never, false) => ImageAction::Refuse,
        }
    }
}

pub type OutputStream = BoxStream<'static, Result<OutputChunk, LaunchError>>;

/// A started container and the frames it writes.
pub struct LaunchedContainer {
    pub id: String,
    pub output: OutputStream,
}

/// The container runtime as seen by the pipeline.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Fails with [`LaunchError::RuntimeUnavailable`] if the runtime does not answer.
    async fn check_available(&self) -> Result<(), LaunchError>;

    /// Makes `image` present locally according to `policy`.
    async fn prepare_image(&self, image: &str, policy: PullPolicy) -> Result<(), LaunchError>;

    /// Creates and starts the container. Output is captured from the very
    /// first byte.
    async fn launch(&self, spec: &ContainerSpec) -> Result<LaunchedContainer, LaunchError>;

    /// Waits for the container to stop and returns its exit code.
    async fn wait(&self, id: &str) -> Result<i64, LaunchError>;

    async fn stop(&self, id: &str) -> Result<(), LaunchError>;

    /// Removes the container. A container that is already gone is not an error.
    async fn remove(&self, id: &str) -> Result<(), LaunchError>;
}
