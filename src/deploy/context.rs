use std::collections::BTreeMap;

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

use crate::config::{EnvironmentConfig, ShiplaneConfig, PRODUCTION};
use crate::error::DeployError;

const ENV_FILE_TEMPLATE: &str = include_str!("../../templates/app.env.j2");

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseRuntime {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// Everything a launched container needs to find its data store and know
/// which environment it serves. Resolved before any replica is touched.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeConfig {
    pub role: String,
    pub database: DatabaseRuntime,
    pub env: BTreeMap<String, String>,
    pub app_dir: String,
    pub container_port: u16,
    pub publish_port: u16,
}

impl RuntimeConfig {
    /// `discovered_db_host` comes from inventory when the config leaves the
    /// host out; `lookup` reads the operator's environment variables.
    pub fn resolve(
        config: &ShiplaneConfig,
        environment: &str,
        env: &EnvironmentConfig,
        discovered_db_host: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DeployError> {
        let db = env.database.as_ref().ok_or_else(|| {
            DeployError::config(format!(
                "environment '{}' has no [environments.{}.database] section",
                environment, environment
            ))
        })?;

        let host = db
            .host
            .clone()
            .or_else(|| discovered_db_host.map(str::to_string))
            .ok_or_else(|| {
                DeployError::config(format!(
                    "no database host for '{}' (set database.host or expose database_endpoint from terraform)",
                    environment
                ))
            })?;

        let password = lookup(&db.password_env)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                DeployError::config(format!(
                    "database password for '{}' not set (export {})",
                    environment, db.password_env
                ))
            })?;

        let role = env.role.clone().unwrap_or_else(|| {
            if environment == PRODUCTION {
                "production".to_string()
            } else {
                "development".to_string()
            }
        });

        Ok(Self {
            role,
            database: DatabaseRuntime {
                host,
                port: db.port,
                name: db.name.clone(),
                user: db.user.clone(),
                password,
            },
            env: env.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            app_dir: config.app_dir(),
            container_port: config.app.container_port,
            publish_port: config.app.publish_port,
        })
    }

    pub fn env_file_path(&self) -> String {
        format!("{}/app.env", self.app_dir)
    }

    /// Renders the `--env-file` passed to `docker run`.
    pub fn render_env_file(&self) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("app.env", ENV_FILE_TEMPLATE)
            .context("Failed to load env file template")?;

        let tmpl = env.get_template("app.env")?;
        let rendered = tmpl
            .render(minijinja::context! {
                role => &self.role,
                database => &self.database,
                env => &self.env,
            })
            .context("Failed to render env file")?;

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ShiplaneConfig {
        ShiplaneConfig::parse(
            r#"
[app]
name = "webshop"
publish_port = 8000

[environments.dev]
hosts = [{ address = "10.0.1.10" }]
env = { FEATURE_FLAGS = "beta" }

[environments.dev.database]
host = "db.dev.internal"
name = "shop"
user = "shop"
password_env = "SHOP_DB_PASSWORD"

[environments.prod]
inventory = "terraform"

[environments.prod.database]
name = "shop"
user = "shop"
"#,
        )
        .unwrap()
    }

    fn secrets(name: &str) -> Option<String> {
        match name {
            "SHOP_DB_PASSWORD" | "DB_PASSWORD" => Some("hunter2".to_string()),
            _ => None,
        }
    }

    #[test]
    fn resolves_runtime_for_environment() {
        let config = config();
        let dev = config.environment("dev").unwrap();
        let runtime = RuntimeConfig::resolve(&config, "dev", dev, None, secrets).unwrap();

        assert_eq!(runtime.role, "development");
        assert_eq!(runtime.database.host, "db.dev.internal");
        assert_eq!(runtime.database.password, "hunter2");
        assert_eq!(runtime.publish_port, 8000);
        assert_eq!(runtime.env_file_path(), "/opt/webshop/app.env");
    }

    #[test]
    fn production_role_and_discovered_host() {
        let config = config();
        let prod = config.environment("prod").unwrap();
        let runtime =
            RuntimeConfig::resolve(&config, "prod", prod, Some("shop.rds.internal"), secrets)
                .unwrap();

        assert_eq!(runtime.role, "production");
        assert_eq!(runtime.database.host, "shop.rds.internal");
    }

    #[test]
    fn missing_database_host_is_a_configuration_error() {
        let config = config();
        let prod = config.environment("prod").unwrap();
        let err = RuntimeConfig::resolve(&config, "prod", prod, None, secrets).unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }

    #[test]
    fn missing_password_is_a_configuration_error() {
        let config = config();
        let dev = config.environment("dev").unwrap();
        let err = RuntimeConfig::resolve(&config, "dev", dev, None, |_| None).unwrap_err();
        assert!(err.to_string().contains("SHOP_DB_PASSWORD"));
    }

    #[test]
    fn env_file_carries_database_and_role() {
        let config = config();
        let dev = config.environment("dev").unwrap();
        let runtime = RuntimeConfig::resolve(&config, "dev", dev, None, secrets).unwrap();

        let rendered = runtime.render_env_file().unwrap();
        assert!(rendered.contains("APP_ENV=development"));
        assert!(rendered.contains("DB_HOST=db.dev.internal"));
        assert!(rendered.contains("DB_PORT=5432"));
        assert!(rendered.contains("DB_PASSWORD=hunter2"));
        assert!(rendered.contains("FEATURE_FLAGS=beta"));
    }
}
