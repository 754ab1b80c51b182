//! Docker-backed container runtime using bollard.
//!
//! Each invocation owns a single client connected with the local defaults
//! (Unix socket on Linux/macOS, named pipe on Windows, or `DOCKER_HOST`).

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerCreateBody, ContainerWaitResponse};
use bollard::query_parameters::{
    AttachContainerOptions, AttachContainerOptionsBuilder, CreateContainerOptions,
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
    InspectContainerOptionsBuilder, RemoveContainerOptions, RemoveContainerOptionsBuilder,
    StartContainerOptions, StartContainerOptionsBuilder, StopContainerOptions,
    StopContainerOptionsBuilder, WaitContainerOptions, WaitContainerOptionsBuilder,
};
use futures_util::StreamExt;

use super::{
    ContainerRuntime, ImageAction, LaunchError, LaunchedContainer, OutputChunk, OutputStream,
    PullPolicy,
};
use crate::config::{CommandLine, ContainerSpec};

const STOP_TIMEOUT_SECS: i32 = 10;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, LaunchError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| LaunchError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    async fn image_exists(&self, image: &str) -> Result<bool, LaunchError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(LaunchError::DockerApi(e)),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), LaunchError> {
        log::info!("Pulling image: {}", image);

        let (name, tag) = parse_image_reference(image);
        let mut builder = CreateImageOptionsBuilder::new().from_image(name);
        if let Some(tag) = tag {
            builder = builder.tag(tag);
        }

        let mut stream = self.docker.create_image(Some(builder.build()), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        log::debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    log::error!("Failed to pull image {}: {}", image, e);
                    return Err(LaunchError::ImageUnavailable {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        log::info!("Image {} pulled successfully", image);
        Ok(())
    }

    async fn attach_and_start(&self, id: &str) -> Result<OutputStream, LaunchError> {
        // Attached before start so that early output is part of the stream.
        let options: AttachContainerOptions = AttachContainerOptionsBuilder::new()
            .stream(true)
            .logs(true)
            .stdout(true)
            .stderr(true)
            .build();
        let attached = self.docker.attach_container(id, Some(options)).await?;

        let options: StartContainerOptions = StartContainerOptionsBuilder::new().build();
        self.docker
            .start_container(id, Some(options))
            .await
            .inspect_err(|e| {
                log::error!("Failed to start container {}: {}", id, e);
            })?;

        Ok(attached
            .output
            .map(|frame| {
                frame
                    .map(OutputChunk::from)
                    .map_err(|e| LaunchError::Output(e.to_string()))
            })
            .boxed())
    }

    async fn inspect_exit_code(&self, id: &str) -> Result<i64, LaunchError> {
        let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();
        let info = self.docker.inspect_container(id, Some(options)).await?;
        Ok(info.state.and_then(|s| s.exit_code).unwrap_or(-1))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn check_available(&self) -> Result<(), LaunchError> {
        self.docker
            .ping()
            .await
            .map_err(|e| LaunchError::RuntimeUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn prepare_image(&self, image: &str, policy: PullPolicy) -> Result<(), LaunchError> {
        let present = self.image_exists(image).await?;
        match policy.action(present) {
            ImageAction::Use => {
                log::debug!("Image {} is present locally", image);
                Ok(())
            }
            ImageAction::Pull => self.pull_image(image).await,
            ImageAction::Refuse => Err(LaunchError::ImageUnavailable {
                image: image.to_string(),
                reason: "not present locally and pulling is disabled".to_string(),
            }),
        }
    }

    async fn launch(&self, spec: &ContainerSpec) -> Result<LaunchedContainer, LaunchError> {
        let name = container_name();
        log::info!("Creating container {} from {}", name, spec.image);

        let options: CreateContainerOptions =
            CreateContainerOptionsBuilder::new().name(&name).build();
        let created = self
            .docker
            .create_container(Some(options), container_body(spec))
            .await
            .inspect_err(|e| {
                log::error!("Failed to create container {}: {}", name, e);
            })?;

        for warning in &created.warnings {
            log::warn!("Container {}: {}", name, warning);
        }

        match self.attach_and_start(&created.id).await {
            Ok(output) => Ok(LaunchedContainer {
                id: created.id,
                output,
            }),
            Err(e) => {
                if let Err(remove_err) = self.remove(&created.id).await {
                    log::warn!("Failed to clean up container {}: {}", name, remove_err);
                }
                Err(e)
            }
        }
    }

    async fn wait(&self, id: &str) -> Result<i64, LaunchError> {
        let options: WaitContainerOptions = WaitContainerOptionsBuilder::new()
            .condition("not-running")
            .build();
        let mut stream = std::pin::pin!(self.docker.wait_container(id, Some(options)));

        let mut exit_code = None;
        while let Some(result) = stream.next().await {
            exit_code = Some(wait_status(result)?);
        }

        match exit_code {
            Some(code) => Ok(code),
            None => self.inspect_exit_code(id).await,
        }
    }

    async fn stop(&self, id: &str) -> Result<(), LaunchError> {
        log::info!("Stopping container: {}", id);

        let options: StopContainerOptions = StopContainerOptionsBuilder::new()
            .t(STOP_TIMEOUT_SECS)
            .build();

        match self.docker.stop_container(id, Some(options)).await {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304 | 404,
                ..
            }) => {
                log::info!("Container {} already stopped", id);
                Ok(())
            }
            Err(e) => Err(LaunchError::DockerApi(e)),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), LaunchError> {
        let options: RemoveContainerOptions =
            RemoveContainerOptionsBuilder::new().force(true).build();

        match self.docker.remove_container(id, Some(options)).await {
            Ok(_) => {
                log::debug!("Container {} removed", id);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(LaunchError::DockerApi(e)),
        }
    }
}

/// Exit code carried by one item of the wait stream.
fn wait_status(
    result: Result<ContainerWaitResponse, bollard::errors::Error>,
) -> Result<i64, LaunchError> {
    match result {
        Ok(response) => Ok(response.status_code),
        // bollard reports a non-zero exit as an error carrying the code
        Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => Ok(code),
        Err(e) => Err(LaunchError::DockerApi(e)),
    }
}

fn container_name() -> String {
    format!("log-container-{}", uuid::Uuid::now_v7().simple())
}

fn container_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let (entrypoint, cmd) = match &spec.command {
        CommandLine::Argv(argv) => (None, argv.clone()),
        CommandLine::Shell(script) => (
            Some(vec!["bash".to_string()]),
            vec!["-c".to_string(), script.clone()],
        ),
    };

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        entrypoint,
        cmd: Some(cmd),
        tty: Some(false),
        open_stdin: Some(false),
        attach_stdin: Some(false),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    }
}

/// Split an image reference into the name and tag `create_image` expects.
/// Digest references are passed whole, with no tag.
fn parse_image_reference(image: &str) -> (&str, Option<&str>) {
    if image.contains('@') {
        return (image, None);
    }

    // A colon followed by a slash belongs to a registry port
    // (localhost:5000/app), not to a tag.
    if let Some(colon_pos) = image.rfind(':') {
        let after_colon = &image[colon_pos + 1..];
        if !after_colon.contains('/') {
            return (&image[..colon_pos], Some(after_colon));
        }
    }

    (image, Some("latest"))
}
