use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validate;

/// Environments the CLI accepts. Anything else is rejected before the config
/// is even consulted.
pub const ALLOWED_ENVIRONMENTS: [&str; 3] = ["dev", "staging", "prod"];

pub const PRODUCTION: &str = "prod";

#[derive(Debug, Deserialize, Serialize)]
pub struct ShiplaneConfig {
    pub app: AppConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub terraform: TerraformConfig,
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_container_port")]
    pub container_port: u16,
    #[serde(default = "default_publish_port")]
    pub publish_port: u16,
    pub app_dir: Option<String>,
}

fn default_container_port() -> u16 {
    8080
}

fn default_publish_port() -> u16 {
    80
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            lock_dir: default_lock_dir(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from(".shiplane/deployments.json")
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from(".shiplane/locks")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_path")]
    pub path: String,
    pub port: Option<u16>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_health_timeout")]
    pub timeout: u64,
    /// Seconds between attempts.
    #[serde(default = "default_health_interval")]
    pub interval: u64,
    #[serde(default = "default_health_retries")]
    pub retries: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            port: None,
            timeout: default_health_timeout(),
            interval: default_health_interval(),
            retries: default_health_retries(),
        }
    }
}

fn default_health_path() -> String {
    "/health".to_string()
}
fn default_health_timeout() -> u64 {
    5
}
fn default_health_interval() -> u64 {
    5
}
fn default_health_retries() -> u32 {
    12
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TerraformConfig {
    #[serde(default = "default_terraform_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_terraform_binary")]
    pub binary: String,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            dir: default_terraform_dir(),
            binary: default_terraform_binary(),
        }
    }
}

fn default_terraform_dir() -> PathBuf {
    PathBuf::from("terraform")
}

fn default_terraform_binary() -> String {
    "terraform".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InventorySource {
    #[default]
    Static,
    Terraform,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EnvironmentConfig {
    /// Image deployed by `deploy-app`/`update-app` when no --image is given.
    pub docker_image: Option<String>,
    /// Externally reachable address of the load balancer.
    pub url: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    /// Jump host for replicas in private subnets.
    pub bastion: Option<String>,
    #[serde(default)]
    pub inventory: InventorySource,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    pub role: Option<String>,
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl EnvironmentConfig {
    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or("deploy")
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HostConfig {
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    #[serde(default = "default_database_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    /// Name of the local environment variable holding the password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

fn default_database_port() -> u16 {
    5432
}

fn default_password_env() -> String {
    "DB_PASSWORD".to_string()
}

impl ShiplaneConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        validate::validate(&config)?;
        Ok(config)
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        validate::environment_name(name)?;
        self.environments
            .get(name)
            .with_context(|| format!("Environment '{}' not found in config", name))
    }

    pub fn app_dir(&self) -> String {
        self.app
            .app_dir
            .clone()
            .unwrap_or_else(|| format!("/opt/{}", self.app.name))
    }

    pub fn health_port(&self) -> u16 {
        self.health_check.port.unwrap_or(self.app.publish_port)
    }
}
