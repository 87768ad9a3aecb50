/// Stack configuration
/// Loaded from stackup.toml in the project root
use crate::error::{BootstrapError, Result};
use crate::poll::PollPolicy;
use crate::project::ProjectRoot;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StackConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub verify: VerifyConfig,
}

impl StackConfig {
    /// Load `stackup.toml` from the project root, or defaults when absent.
    pub fn load(root: &ProjectRoot) -> Result<Self> {
        let path = root.config_file();
        if !path.exists() {
            tracing::warn!(
                "[Config] No {} found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            BootstrapError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&content)
            .map_err(|e| BootstrapError::Config(format!("{}: {}", path.display(), e)))?;

        tracing::info!("[Config] Loaded stack configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let config: StackConfig =
            toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.runtime.interpreters.is_empty() {
            return Err("runtime.interpreters must list at least one interpreter".to_string());
        }
        if self.service.name.trim().is_empty() {
            return Err("service.name must not be empty".to_string());
        }
        if self.service.poll_interval_secs == 0 {
            return Err("service.poll_interval_secs must be at least 1".to_string());
        }
        if self.service.poll_ceiling_secs < self.service.poll_interval_secs {
            return Err("service.poll_ceiling_secs must not be shorter than the interval".to_string());
        }
        if self.verify.workers == 0 {
            return Err("verify.workers must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Language runtime and dependency environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Interpreter names tried in order
    #[serde(default = "default_interpreters")]
    pub interpreters: Vec<String>,

    #[serde(default = "default_min_version")]
    pub min_version: Version,

    /// Isolated environment directory, relative to the project root
    #[serde(default = "default_venv_dir")]
    pub venv_dir: PathBuf,

    /// Application package checked after installation
    #[serde(default = "default_package")]
    pub package: String,

    /// Third-party modules that must import after installation
    #[serde(default = "default_critical_imports")]
    pub critical_imports: Vec<String>,

    /// Optional-dependency group installed in editable mode when declared
    #[serde(default = "default_dev_extra")]
    pub dev_extra: String,

    /// Working directories created when absent
    #[serde(default = "default_directories")]
    pub directories: Vec<PathBuf>,
}

fn default_interpreters() -> Vec<String> {
    vec![
        "python3.11".to_string(),
        "python3".to_string(),
        "python".to_string(),
    ]
}

fn default_min_version() -> Version {
    Version::new(3, 11, 0)
}

fn default_venv_dir() -> PathBuf {
    PathBuf::from("venv")
}

fn default_package() -> String {
    "kosmos".to_string()
}

fn default_critical_imports() -> Vec<String> {
    vec![
        "anthropic".to_string(),
        "pydantic".to_string(),
        "sqlalchemy".to_string(),
        "neo4j".to_string(),
    ]
}

fn default_dev_extra() -> String {
    "dev".to_string()
}

fn default_directories() -> Vec<PathBuf> {
    [
        "data",
        "logs",
        "results",
        "neo4j_data",
        "neo4j_logs",
        "neo4j_import",
        "neo4j_plugins",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interpreters: default_interpreters(),
            min_version: default_min_version(),
            venv_dir: default_venv_dir(),
            package: default_package(),
            critical_imports: default_critical_imports(),
            dev_extra: default_dev_extra(),
            directories: default_directories(),
        }
    }
}

/// Container engine installation on a WSL2 host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// File whose contents identify the host
    #[serde(default = "default_host_signature_file")]
    pub host_signature_file: PathBuf,

    /// Case-insensitive markers; any match means a recognized host
    #[serde(default = "default_host_markers")]
    pub host_markers: Vec<String>,

    #[serde(default)]
    pub allow_unrecognized_host: bool,

    #[serde(default = "default_engine_binary")]
    pub binary: String,

    #[serde(default = "default_prerequisites")]
    pub prerequisites: Vec<String>,

    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    #[serde(default = "default_group")]
    pub group: String,

    #[serde(default = "default_keyring_dir")]
    pub keyring_dir: PathBuf,

    #[serde(default = "default_key_url")]
    pub key_url: String,

    #[serde(default = "default_repo_url")]
    pub repo_url: String,

    #[serde(default = "default_sources_file")]
    pub sources_file: PathBuf,

    #[serde(default = "default_smoke_image")]
    pub smoke_image: String,
}

fn default_host_signature_file() -> PathBuf {
    PathBuf::from("/proc/version")
}

fn default_host_markers() -> Vec<String> {
    vec!["microsoft".to_string(), "wsl".to_string()]
}

fn default_engine_binary() -> String {
    "docker".to_string()
}

fn default_prerequisites() -> Vec<String> {
    ["ca-certificates", "curl", "gnupg", "lsb-release"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_packages() -> Vec<String> {
    [
        "docker-ce",
        "docker-ce-cli",
        "containerd.io",
        "docker-buildx-plugin",
        "docker-compose-plugin",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_group() -> String {
    "docker".to_string()
}

fn default_keyring_dir() -> PathBuf {
    PathBuf::from("/etc/apt/keyrings")
}

fn default_key_url() -> String {
    "https://download.docker.com/linux/ubuntu/gpg".to_string()
}

fn default_repo_url() -> String {
    "https://download.docker.com/linux/ubuntu".to_string()
}

fn default_sources_file() -> PathBuf {
    PathBuf::from("/etc/apt/sources.list.d/docker.list")
}

fn default_smoke_image() -> String {
    "hello-world".to_string()
}

impl EngineConfig {
    pub fn key_path(&self) -> PathBuf {
        self.keyring_dir.join("docker.gpg")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_signature_file: default_host_signature_file(),
            host_markers: default_host_markers(),
            allow_unrecognized_host: false,
            binary: default_engine_binary(),
            prerequisites: default_prerequisites(),
            packages: default_packages(),
            group: default_group(),
            keyring_dir: default_keyring_dir(),
            key_url: default_key_url(),
            repo_url: default_repo_url(),
            sources_file: default_sources_file(),
            smoke_image: default_smoke_image(),
        }
    }
}

/// The compose-managed service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name in the compose file
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default = "default_container_name")]
    pub container_name: String,

    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    /// Primary (web/administrative) port, polled for readiness
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Secondary (binary protocol) port
    #[serde(default = "default_bolt_port")]
    pub bolt_port: u16,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_poll_ceiling_secs")]
    pub poll_ceiling_secs: u64,

    #[serde(default = "default_username")]
    pub username: String,

    /// Manifest default; `.env` overrides it
    #[serde(default = "default_password")]
    pub password: String,

    /// Keys expected in `.env` for this service
    #[serde(default = "default_env_keys")]
    pub env_keys: Vec<String>,
}

fn default_service_name() -> String {
    "neo4j".to_string()
}

fn default_container_name() -> String {
    "kosmos-neo4j".to_string()
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_http_port() -> u16 {
    7474
}

fn default_bolt_port() -> u16 {
    7687
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_poll_ceiling_secs() -> u64 {
    60
}

fn default_username() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "kosmos-password".to_string()
}

fn default_env_keys() -> Vec<String> {
    vec![
        "NEO4J_URI".to_string(),
        "NEO4J_USER".to_string(),
        "NEO4J_PASSWORD".to_string(),
    ]
}

impl ServiceConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.poll_ceiling_secs),
        )
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            container_name: default_container_name(),
            compose_file: default_compose_file(),
            host: default_host(),
            http_port: default_http_port(),
            bolt_port: default_bolt_port(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_ceiling_secs: default_poll_ceiling_secs(),
            username: default_username(),
            password: default_password(),
            env_keys: default_env_keys(),
        }
    }
}

/// Deployment verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Checks evaluated concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-probe network timeout
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Window in which a refused network check is retried; 0 checks once
    #[serde(default)]
    pub retry_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl VerifyConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            probe_timeout_secs: default_probe_timeout_secs(),
            retry_secs: 0,
        }
    }
}
