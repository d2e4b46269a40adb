use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::{EnvironmentConfig, InventorySource, ShiplaneConfig};
use crate::provision::Terraform;

const REPLICAS_OUTPUT: &str = "instance_ips";
const LOAD_BALANCER_OUTPUT: &str = "load_balancer_dns";
const DATABASE_OUTPUT: &str = "database_endpoint";

/// What the core needs to know about a fleet: where the replicas are, how
/// operators reach the load balancer, and where the data store lives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetInventory {
    pub replicas: Vec<String>,
    pub url: Option<String>,
    pub database_host: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputValue {
    value: serde_json::Value,
}

pub fn discover(
    config: &ShiplaneConfig,
    environment: &str,
    env: &EnvironmentConfig,
) -> Result<FleetInventory> {
    match env.inventory {
        InventorySource::Static => Ok(FleetInventory {
            replicas: env.hosts.iter().map(|h| h.address.clone()).collect(),
            url: env.url.clone(),
            database_host: None,
        }),
        InventorySource::Terraform => {
            let raw = Terraform::new(&config.terraform).outputs(environment)?;
            let mut inventory = parse_terraform_outputs(&raw)?;
            if env.url.is_some() {
                inventory.url = env.url.clone();
            }
            Ok(inventory)
        }
    }
}

/// Reads the replica list, load balancer and database endpoint from
/// `terraform output -json`.
pub fn parse_terraform_outputs(raw: &str) -> Result<FleetInventory> {
    let outputs: HashMap<String, OutputValue> =
        serde_json::from_str(raw).context("Failed to parse terraform output JSON")?;

    let replicas = match outputs.get(REPLICAS_OUTPUT) {
        Some(out) => serde_json::from_value::<Vec<String>>(out.value.clone())
            .with_context(|| format!("'{}' output must be a list of addresses", REPLICAS_OUTPUT))?,
        None => Vec::new(),
    };

    let string_output = |name: &str| {
        outputs
            .get(name)
            .and_then(|out| out.value.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let url = string_output(LOAD_BALANCER_OUTPUT).map(|dns| {
        if dns.starts_with("http://") || dns.starts_with("https://") {
            dns
        } else {
            format!("http://{}", dns)
        }
    });

    // RDS-style endpoints carry the port
    let database_host = string_output(DATABASE_OUTPUT).map(|endpoint| {
        match endpoint.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host.to_string(),
            _ => endpoint,
        }
    });

    Ok(FleetInventory {
        replicas,
        url,
        database_host,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_inventory_uses_configured_hosts() {
        let config = ShiplaneConfig::parse(
            r#"
[app]
name = "webshop"

[environments.dev]
url = "http://dev.example.com"
hosts = [{ address = "10.0.1.10" }, { address = "10.0.1.11" }]
"#,
        )
        .unwrap();
        let env = config.environment("dev").unwrap();

        let inventory = discover(&config, "dev", env).unwrap();
        assert_eq!(inventory.replicas, vec!["10.0.1.10", "10.0.1.11"]);
        assert_eq!(inventory.url.as_deref(), Some("http://dev.example.com"));
        assert_eq!(inventory.database_host, None);
    }

    #[test]
    fn parses_terraform_outputs() {
        let raw = r#"{
            "instance_ips": {"sensitive": false, "type": ["list", "string"], "value": ["10.0.2.4", "10.0.3.9"]},
            "load_balancer_dns": {"sensitive": false, "type": "string", "value": "web-prod-123.eu-west-1.elb.amazonaws.com"},
            "database_endpoint": {"sensitive": false, "type": "string", "value": "web-prod.abc.eu-west-1.rds.amazonaws.com:5432"}
        }"#;

        let inventory = parse_terraform_outputs(raw).unwrap();
        assert_eq!(inventory.replicas, vec!["10.0.2.4", "10.0.3.9"]);
        assert_eq!(
            inventory.url.as_deref(),
            Some("http://web-prod-123.eu-west-1.elb.amazonaws.com")
        );
        assert_eq!(
            inventory.database_host.as_deref(),
            Some("web-prod.abc.eu-west-1.rds.amazonaws.com")
        );
    }

    #[test]
    fn missing_outputs_leave_inventory_empty() {
        let inventory = parse_terraform_outputs("{}").unwrap();
        assert_eq!(inventory, FleetInventory::default());
    }

    #[test]
    fn malformed_replica_list_is_an_error() {
        let raw = r#"{"instance_ips": {"value": "10.0.2.4"}}"#;
        assert!(parse_terraform_outputs(raw).is_err());
    }
}
