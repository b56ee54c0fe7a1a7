//! ContainerHost trait definition
//!
//! Abstracts the container runtime (spec §6 "ContainerHost capability") so
//! the mission supervisor depends only on this interface, never on
//! `bollard` directly.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Error type for container-host operations
#[derive(Debug, thiserror::Error)]
pub enum ContainerHostError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("operation timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

pub type ContainerHostResult<T> = Result<T, ContainerHostError>;

/// Opaque handle to a created container. Adapters are free to stuff
/// whatever identifier they need inside.
#[derive(Debug, Clone)]
pub struct ContainerHandle(pub String);

impl ContainerHandle {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Outcome of a bounded wait for a container to exit.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// The container exited with the given code.
    Exited(i64),
    /// The wait quantum elapsed before the container exited.
    TimedOut,
}

/// Trait defining the container runtime interface (spec §6).
///
/// This trait abstracts container lifecycle operations, allowing the
/// mission supervisor to be agnostic of the underlying container
/// technology.
#[async_trait]
pub trait ContainerHost: Send + Sync {
    /// Check whether an image is present on this host.
    async fn has_image(&self, image: &str) -> ContainerHostResult<bool>;

    /// Create a container from `image`, detached, with `PAYLOAD` set to the
    /// JSON encoding of `payload`, attached to the configured network, with
    /// stdin open and a TTY allocated.
    async fn create(&self, image: &str, payload: &Value) -> ContainerHostResult<ContainerHandle>;

    /// Start a previously created container.
    async fn start(&self, handle: &ContainerHandle) -> ContainerHostResult<()>;

    /// Wait up to `timeout` for the container to exit.
    async fn wait(&self, handle: &ContainerHandle, timeout: Duration) -> ContainerHostResult<WaitOutcome>;

    /// Request the container stop, giving it `grace` before a forceful kill.
    async fn stop(&self, handle: &ContainerHandle, grace: Duration) -> ContainerHostResult<()>;

    /// Remove a (stopped) container.
    async fn remove(&self, handle: &ContainerHandle) -> ContainerHostResult<()>;
}
