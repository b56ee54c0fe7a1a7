//! The Docker connection handle and its `ContainerHost` impl wiring

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use serde_json::Value;
use tracing::debug;

use crate::config::DockerConfiguration;

use super::super::traits::{ContainerHandle, ContainerHost, ContainerHostError, ContainerHostResult, WaitOutcome};
use super::{container, power};

/// Bollard-backed container host.
///
/// Holds one long-lived connection to the local Docker daemon and the
/// network/DNS settings every mission container is created with.
pub struct DockerContainerHost {
    pub(super) docker: Docker,
    pub(super) network: String,
    pub(super) dns: Vec<String>,
}

impl DockerContainerHost {
    /// Connect to Docker using the configured socket, or the platform
    /// default if none was configured.
    pub fn connect(config: &DockerConfiguration) -> ContainerHostResult<Self> {
        let docker = match &config.socket {
            Some(socket) => Docker::connect_with_unix(socket, 120, bollard::API_DEFAULT_VERSION)
                .map_err(ContainerHostError::Docker)?,
            None => Docker::connect_with_local_defaults().map_err(ContainerHostError::Docker)?,
        };

        debug!("connected to docker daemon, network={}", config.network);

        Ok(Self {
            docker,
            network: config.network.clone(),
            dns: config.dns.clone(),
        })
    }

    pub(super) fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl ContainerHost for DockerContainerHost {
    async fn has_image(&self, image: &str) -> ContainerHostResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Ok(false)
            }
            Err(e) => Err(ContainerHostError::Docker(e)),
        }
    }

    async fn create(&self, image: &str, payload: &Value) -> ContainerHostResult<ContainerHandle> {
        container::create_container(self, image, payload).await
    }

    async fn start(&self, handle: &ContainerHandle) -> ContainerHostResult<()> {
        power::start_container(self, handle).await
    }

    async fn wait(&self, handle: &ContainerHandle, timeout: Duration) -> ContainerHostResult<WaitOutcome> {
        power::wait_container(self, handle, timeout).await
    }

    async fn stop(&self, handle: &ContainerHandle, grace: Duration) -> ContainerHostResult<()> {
        power::stop_container(self, handle, grace).await
    }

    async fn remove(&self, handle: &ContainerHandle) -> ContainerHostResult<()> {
        container::remove_container(self, handle).await
    }
}
