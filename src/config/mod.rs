//! Configuration management module
//!
//! Provides TOML-based configuration for the daemon: API bind address,
//! system directories, container-host adapter settings, and process
//! manager tunables.

mod config;

pub use config::*;
