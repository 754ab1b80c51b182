//! In-memory container runtime for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;

use super::{
    ContainerRuntime, ImageAction, LaunchError, LaunchedContainer, OutputChunk, PullPolicy,
};
use crate::config::ContainerSpec;

/// Ordered record of calls, shared between fakes so tests can assert on
/// cross-component ordering.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

pub struct FakeRuntime {
    journal: Journal,
    pub available: bool,
    /// Images present locally.
    pub known_images: Mutex<Vec<String>>,
    /// Images a pull can fetch.
    pub registry_images: Vec<String>,
    pub exit_code: i64,
    /// Keep the output stream open after the scripted frames.
    pub hang: bool,
    /// Never return from `wait`.
    pub wait_forever: bool,
    frames: Mutex<Vec<Result<OutputChunk, LaunchError>>>,
    pub launched: Mutex<Vec<ContainerSpec>>,
}

impl FakeRuntime {
    pub fn new(journal: Journal, frames: Vec<Result<OutputChunk, LaunchError>>) -> Self {
        Self {
            journal,
            available: true,
            known_images: Mutex::new(vec!["alpine:3.20".to_string()]),
            registry_images: vec!["alpine:3.20".to_string(), "ubuntu:24.04".to_string()],
            exit_code: 0,
            hang: false,
            wait_forever: false,
            frames: Mutex::new(frames),
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_stdout(journal: Journal, text: &str) -> Self {
        Self::new(journal, vec![Ok(OutputChunk::stdout(text.to_string()))])
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn check_available(&self) -> Result<(), LaunchError> {
        self.journal.record("runtime:ping");
        if self.available {
            Ok(())
        } else {
            Err(LaunchError::RuntimeUnavailable(
                "Cannot connect to the Docker daemon".to_string(),
            ))
        }
    }

    async fn prepare_image(&self, image: &str, policy: PullPolicy) -> Result<(), LaunchError> {
        self.journal.record(format!("runtime:image:{image}"));
        let present = self.known_images.lock().unwrap().iter().any(|i| i == image);

        match policy.action(present) {
            ImageAction::Use => Ok(()),
            ImageAction::Pull if self.registry_images.iter().any(|i| i == image) => {
                self.journal.record(format!("runtime:pull:{image}"));
                self.known_images.lock().unwrap().push(image.to_string());
                Ok(())
            }
            ImageAction::Pull => Err(LaunchError::ImageUnavailable {
                image: image.to_string(),
                reason: "pull access denied".to_string(),
            }),
            ImageAction::Refuse => Err(LaunchError::ImageUnavailable {
                image: image.to_string(),
                reason: "not present locally".to_string(),
            }),
        }
    }

    async fn launch(&self, spec: &ContainerSpec) -> Result<LaunchedContainer, LaunchError> {
        self.journal.record("runtime:launch");
        self.launched.lock().unwrap().push(spec.clone());

        let frames = std::mem::take(&mut *self.frames.lock().unwrap());
        let output = if self.hang {
            stream::iter(frames).chain(stream::pending()).boxed()
        } else {
            stream::iter(frames).boxed()
        };

        Ok(LaunchedContainer {
            id: "fake-container".to_string(),
            output,
        })
    }

    async fn wait(&self, id: &str) -> Result<i64, LaunchError> {
        self.journal.record(format!("runtime:wait:{id}"));
        if self.wait_forever {
            std::future::pending::<()>().await;
        }
        Ok(self.exit_code)
    }

    async fn stop(&self, id: &str) -> Result<(), LaunchError> {
        self.journal.record(format!("runtime:stop:{id}"));
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), LaunchError> {
        self.journal.record(format!("runtime:remove:{id}"));
        Ok(())
    }
}
