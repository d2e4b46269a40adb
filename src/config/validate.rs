use anyhow::{bail, Result};

use super::{InventorySource, ShiplaneConfig, ALLOWED_ENVIRONMENTS};

pub fn validate(config: &ShiplaneConfig) -> Result<()> {
    if config.app.name.is_empty() {
        bail!("app.name cannot be empty");
    }

    if config.health_check.retries == 0 {
        bail!("health_check.retries must be at least 1");
    }

    if config.health_check.timeout == 0 {
        bail!("health_check.timeout must be at least 1 second");
    }

    if !config.health_check.path.starts_with('/') {
        bail!(
            "health_check.path must start with '/', got '{}'",
            config.health_check.path
        );
    }

    for (name, env) in &config.environments {
        environment_name(name)?;

        if let Some(image) = &env.docker_image {
            if image.trim().is_empty() {
                bail!("Environment '{}' has an empty docker_image", name);
            }
        }

        if env.inventory == InventorySource::Static && env.hosts.is_empty() {
            bail!(
                "Environment '{}' has no hosts defined (add hosts or set inventory = \"terraform\")",
                name
            );
        }

        for host in &env.hosts {
            if host.address.is_empty() {
                bail!("Environment '{}' has a host with empty address", name);
            }
        }

        if let Some(db) = &env.database {
            if db.name.is_empty() || db.user.is_empty() {
                bail!("Environment '{}' database needs both name and user", name);
            }
        }
    }

    Ok(())
}

pub fn environment_name(name: &str) -> Result<()> {
    if !ALLOWED_ENVIRONMENTS.contains(&name) {
        bail!(
            "'{}' is not an allowed environment. Supported: {}",
            name,
            ALLOWED_ENVIRONMENTS.join(", ")
        );
    }
    Ok(())
}
