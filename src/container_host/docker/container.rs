//! Container creation and removal

use bollard::container::{Config, CreateContainerOptions, RemoveContainerOptions};
use bollard::models::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::super::traits::{ContainerHandle, ContainerHostError, ContainerHostResult};
use super::host::DockerContainerHost;

/// Create a container from `image`, with `PAYLOAD` carrying the mission
/// payload, detached, attached to the configured network, stdin open and a
/// TTY allocated (spec §4.1 step 2).
pub async fn create_container(
    host: &DockerContainerHost,
    image: &str,
    payload: &Value,
) -> ContainerHostResult<ContainerHandle> {
    let name = format!("mission-{}", Uuid::new_v4());

    let env = vec![format!("PAYLOAD={}", payload)];

    let host_config = HostConfig {
        network_mode: Some(host.network.clone()),
        dns: if host.dns.is_empty() {
            None
        } else {
            Some(host.dns.clone())
        },
        restart_policy: Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::NO),
            ..Default::default()
        }),
        ..Default::default()
    };

    let config = Config {
        image: Some(image.to_string()),
        env: Some(env),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        open_stdin: Some(true),
        tty: Some(true),
        host_config: Some(host_config),
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: name.clone(),
        platform: None,
    };

    debug!("creating container {} from image {}", name, image);

    let response = host
        .docker()
        .create_container(Some(options), config)
        .await
        .map_err(ContainerHostError::Docker)?;

    info!("created container {} ({})", name, response.id);

    Ok(ContainerHandle(response.id))
}

/// Remove a (stopped) container, tolerating a prior removal.
pub async fn remove_container(host: &DockerContainerHost, handle: &ContainerHandle) -> ContainerHostResult<()> {
    let options = RemoveContainerOptions {
        force: false,
        ..Default::default()
    };

    match host.docker().remove_container(handle.id(), Some(options)).await {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
        Err(e) => Err(ContainerHostError::Docker(e)),
    }
}
