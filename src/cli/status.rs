use anyhow::Result;
use tracing::{debug, warn};

use crate::config::{InventorySource, ShiplaneConfig};
use crate::history::HistoryStore;
use crate::inventory;
use crate::output;

pub fn run(config: &ShiplaneConfig, environment: &str) -> Result<()> {
    let env = config.environment(environment)?;
    let store = HistoryStore::open(&config.ledger.path);
    debug!("Reading {}", store.location());
    let record = store.get(environment)?.unwrap_or_default();

    // Terraform may be unreachable from where status is run.
    let url = match env.inventory {
        InventorySource::Static => env.url.clone(),
        InventorySource::Terraform => match inventory::discover(config, environment, env) {
            Ok(fleet) => fleet.url,
            Err(e) => {
                warn!("Could not read Terraform outputs: {:#}", e);
                env.url.clone()
            }
        },
    };

    output::header(&format!("{} on {}", config.app.name, environment));
    output::field("current", record.current.as_deref());
    output::field("previous", record.previous.as_deref());
    output::field(
        "last deployment",
        record
            .last_deployment
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .as_deref(),
    );
    output::field("url", url.as_deref());

    Ok(())
}
