//! Container runtime abstraction
//!
//! Mirrors the teacher daemon's `environment` module: a trait abstracting
//! container-lifecycle operations so the mission supervisor can stay
//! agnostic of the underlying runtime, plus one production adapter over
//! `bollard`.

pub mod docker;
mod traits;

pub use docker::DockerContainerHost;
pub use traits::{ContainerHandle, ContainerHost, ContainerHostError, ContainerHostResult, WaitOutcome};
