//! Bollard-backed `ContainerHost` adapter

mod container;
mod host;
mod power;

pub use host::DockerContainerHost;
