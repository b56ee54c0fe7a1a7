//! Start, wait, and stop operations

use std::time::Duration;

use bollard::container::{KillContainerOptions, StartContainerOptions, WaitContainerOptions};
use futures_util::StreamExt;
use tracing::{debug, warn};

use super::super::traits::{ContainerHandle, ContainerHostError, ContainerHostResult, WaitOutcome};
use super::host::DockerContainerHost;

/// Start a previously created container.
pub async fn start_container(host: &DockerContainerHost, handle: &ContainerHandle) -> ContainerHostResult<()> {
    host.docker()
        .start_container(handle.id(), None::<StartContainerOptions<String>>)
        .await
        .map_err(ContainerHostError::Docker)
}

/// Wait up to `timeout` for the container to exit (spec §4.1 step 4,
/// "wait for container exit with a short timeout").
pub async fn wait_container(
    host: &DockerContainerHost,
    handle: &ContainerHandle,
    timeout: Duration,
) -> ContainerHostResult<WaitOutcome> {
    let options = WaitContainerOptions {
        condition: "not-running",
    };

    let mut stream = host.docker().wait_container(handle.id(), Some(options));

    tokio::select! {
        next = stream.next() => {
            match next {
                Some(Ok(response)) => {
                    debug!("container {} exited with code {}", handle.id(), response.status_code);
                    Ok(WaitOutcome::Exited(response.status_code))
                }
                Some(Err(e)) => Err(ContainerHostError::Docker(e)),
                None => Err(ContainerHostError::Other("wait stream ended with no result".into())),
            }
        }
        _ = tokio::time::sleep(timeout) => Ok(WaitOutcome::TimedOut),
    }
}

/// Stop a container: send SIGTERM, wait up to `grace`, then SIGKILL if it
/// is still running (spec §4.1 step 4, "call container stop with a
/// 5-second grace").
pub async fn stop_container(
    host: &DockerContainerHost,
    handle: &ContainerHandle,
    grace: Duration,
) -> ContainerHostResult<()> {
    send_signal(host, handle, "SIGTERM").await?;

    match wait_container(host, handle, grace).await? {
        WaitOutcome::Exited(_) => Ok(()),
        WaitOutcome::TimedOut => {
            warn!("container {} ignored SIGTERM, sending SIGKILL", handle.id());
            send_signal(host, handle, "SIGKILL").await
        }
    }
}

async fn send_signal(host: &DockerContainerHost, handle: &ContainerHandle, signal: &str) -> ContainerHostResult<()> {
    let options = KillContainerOptions { signal };

    match host.docker().kill_container(handle.id(), Some(options)).await {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 409, .. }) => {
            // Container already stopped.
            Ok(())
        }
        Err(e) => Err(ContainerHostError::Docker(e)),
    }
}
