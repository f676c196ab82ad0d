//! Configuration structures and loading

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level engine configuration, loaded once at startup and passed
/// explicitly into every task — there are no ambient singletons.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,

    /// Relational store (SQLite) configuration
    pub store: StoreConfiguration,

    /// Event bus client (Redis) configuration
    pub broker: BrokerConfiguration,

    /// Docker driver configuration
    #[serde(default)]
    pub docker: DockerConfiguration,

    /// Image registry configuration
    pub registry: RegistryConfiguration,

    /// Agent bridge transport configuration
    pub agent: AgentConfiguration,

    /// Worker pool configuration
    #[serde(default)]
    pub worker: WorkerConfiguration,
}

impl Configuration {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path))?;

        let config: Configuration =
            toml::from_str(&content).with_context(|| "failed to parse configuration")?;

        if let Some(parent) = std::path::Path::new(&config.store.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create store directory: {:?}", parent))?;
            }
        }

        Ok(config)
    }
}

/// Relational store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfiguration {
    /// Path to the SQLite database file
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "eru-core.sqlite3".into()
}

/// Event bus client (Redis) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfiguration {
    /// Redis server URL
    #[serde(default = "default_broker_url")]
    pub url: String,
}

fn default_broker_url() -> String {
    "redis://127.0.0.1:6379".into()
}

/// Docker driver configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfiguration {
    /// Per-host dial timeout in seconds
    #[serde(default = "default_docker_timeout")]
    pub timeout_secs: u64,
}

impl Default for DockerConfiguration {
    fn default() -> Self {
        Self {
            timeout_secs: default_docker_timeout(),
        }
    }
}

fn default_docker_timeout() -> u64 {
    120
}

/// Image registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfiguration {
    /// Base URL used to build `<registry>/<app>:<short_sha>` image URLs
    pub url: String,
}

/// Which agent RPC transport the process was started with. Chosen once at
/// startup (`AGENT_API` in the original), never per-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTransport {
    Broadcast,
    Synchronous,
}

/// Agent bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfiguration {
    /// Selected transport
    pub transport: AgentTransport,

    /// `http://<host>/path` template for the synchronous transport; `{host}`
    /// is substituted with the host's address
    #[serde(default = "default_agent_endpoint_template")]
    pub endpoint_template: String,

    /// Per-IP feedback timeout in seconds (spec: 15s)
    #[serde(default = "default_feedback_timeout")]
    pub feedback_timeout_secs: u64,

    /// Maximum attach attempts before giving up (spec: 5)
    #[serde(default = "default_max_attach_attempts")]
    pub max_attach_attempts: u32,
}

fn default_agent_endpoint_template() -> String {
    "http://{host}:9000/vlan".into()
}

fn default_feedback_timeout() -> u64 {
    15
}

fn default_max_attach_attempts() -> u32 {
    5
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfiguration {
    /// Maximum number of tasks running concurrently; defaults to the host's
    /// logical CPU count, matching the teacher's `Manager::initialize`
    /// concurrency cap
    #[serde(default)]
    pub max_concurrent_tasks: Option<usize>,

    /// How long to block on each queue dequeue attempt, in seconds
    #[serde(default = "default_dequeue_timeout")]
    pub dequeue_timeout_secs: u64,
}

impl Default for WorkerConfiguration {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: None,
            dequeue_timeout_secs: default_dequeue_timeout(),
        }
    }
}

fn default_dequeue_timeout() -> u64 {
    5
}

impl WorkerConfiguration {
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_tasks.unwrap_or_else(num_cpus::get)
    }
}
