//! Configuration structures and loading

use std::path::PathBuf;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Main daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Enable debug mode
    #[serde(default)]
    pub debug: bool,

    /// API server configuration
    #[serde(default)]
    pub api: ApiConfiguration,

    /// System paths and settings
    #[serde(default)]
    pub system: SystemConfiguration,

    /// Container host (Docker) configuration
    #[serde(default)]
    pub docker: DockerConfiguration,

    /// Process manager tunables
    #[serde(default)]
    pub process: ProcessConfiguration,
}

impl Configuration {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> Result<Self> {
        let config_path = std::path::Path::new(path);
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Configuration = toml::from_str(&content)
            .with_context(|| "Failed to parse configuration")?;

        // Resolve relative paths based on the config file's parent directory
        // or current working directory if config file has no parent
        let base_dir = config_path
            .parent()
            .and_then(|p| if p.as_os_str().is_empty() { None } else { Some(p) })
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        config.system.resolve_paths(&base_dir);

        std::fs::create_dir_all(&config.system.data_directory)?;
        std::fs::create_dir_all(&config.system.log_directory)?;

        Ok(config)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            debug: false,
            api: ApiConfiguration::default(),
            system: SystemConfiguration::default(),
            docker: DockerConfiguration::default(),
            process: ProcessConfiguration::default(),
        }
    }
}

/// API server configuration for the thin submission/halt entry surface
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfiguration {
    /// Host to bind to
    #[serde(default = "default_api_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfiguration {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

fn default_api_host() -> String {
    "0.0.0.0".into()
}

fn default_api_port() -> u16 {
    8080
}

/// System paths and settings
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfiguration {
    /// Directory holding the daemon's sqlite database
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    /// Log directory
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,

    /// Filename of the sqlite state database, resolved under `data_directory`
    #[serde(default = "default_database_filename")]
    pub database_filename: String,
}

impl SystemConfiguration {
    pub fn database_path(&self) -> PathBuf {
        self.data_directory.join(&self.database_filename)
    }

    /// Resolve all relative paths to absolute paths based on the given base directory.
    pub fn resolve_paths(&mut self, base_dir: &std::path::Path) {
        self.data_directory = Self::resolve_path(&self.data_directory, base_dir);
        self.log_directory = Self::resolve_path(&self.log_directory, base_dir);
    }

    fn resolve_path(path: &std::path::Path, base_dir: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            let resolved = base_dir.join(path);
            resolved
                .canonicalize()
                .unwrap_or_else(|_| Self::normalize_path(&resolved))
        }
    }

    fn normalize_path(path: &std::path::Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::ParentDir => {
                    components.pop();
                }
                std::path::Component::CurDir => {}
                c => components.push(c),
            }
        }
        components.iter().collect()
    }
}

impl Default for SystemConfiguration {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            log_directory: default_log_directory(),
            database_filename: default_database_filename(),
        }
    }
}

fn default_data_directory() -> PathBuf {
    PathBuf::from(".orchestrator/data")
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(".orchestrator/logs")
}

fn default_database_filename() -> String {
    "processes.db".into()
}

/// Container host (Docker) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfiguration {
    /// Docker socket path; `None` lets bollard pick the platform default
    #[serde(default)]
    pub socket: Option<String>,

    /// Bridge network new containers are attached to
    #[serde(default = "default_network_name")]
    pub network: String,

    /// Whether to remove containers after they reach a terminal state
    /// (mirrors the `DELETE_CONTAINERS=True` environment contract)
    #[serde(default = "default_delete_containers")]
    pub delete_containers: bool,

    /// DNS servers for containers
    #[serde(default)]
    pub dns: Vec<String>,
}

impl Default for DockerConfiguration {
    fn default() -> Self {
        Self {
            socket: None,
            network: default_network_name(),
            delete_containers: default_delete_containers(),
            dns: Vec::new(),
        }
    }
}

fn default_network_name() -> String {
    "caelus_orchestrator_default".into()
}

fn default_delete_containers() -> bool {
    std::env::var("DELETE_CONTAINERS")
        .map(|v| v == "True")
        .unwrap_or(false)
}

/// Process manager tunables
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfiguration {
    /// Maximum number of processes that may be RUNNING concurrently
    #[serde(default = "default_max_concurrent_processes")]
    pub max_concurrent_processes: usize,

    /// How long a supervisor waits for a container exit before re-checking
    /// the should-stop flag
    #[serde(default = "default_wait_quantum_secs")]
    pub wait_quantum_secs: u64,

    /// Grace period given to a container after a stop/kill request
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// Maximum interval the monitor loop sleeps when the queue is empty
    #[serde(default = "default_monitor_idle_secs")]
    pub monitor_idle_secs: u64,
}

impl Default for ProcessConfiguration {
    fn default() -> Self {
        Self {
            max_concurrent_processes: default_max_concurrent_processes(),
            wait_quantum_secs: default_wait_quantum_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            monitor_idle_secs: default_monitor_idle_secs(),
        }
    }
}

fn default_max_concurrent_processes() -> usize {
    8
}

fn default_wait_quantum_secs() -> u64 {
    3
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_monitor_idle_secs() -> u64 {
    1
}
