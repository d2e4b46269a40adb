use anyhow::Result;

use crate::config::ShiplaneConfig;
use crate::history::HistoryStore;
use crate::output;

pub fn run(config: &ShiplaneConfig, environment: &str) -> Result<()> {
    config.environment(environment)?;
    let store = HistoryStore::open(&config.ledger.path);
    let record = store.get(environment)?.unwrap_or_default();

    output::header(&format!(
        "Deployments of {} on {}",
        config.app.name, environment
    ));

    if record.history.is_empty() {
        output::warning("No deployments recorded");
        return Ok(());
    }

    let mut live_marked = false;
    for entry in record.history.iter().rev() {
        let stamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S");
        let line = format!("{}  {:<10}  {}", stamp, entry.action, entry.image);

        // Only the newest entry for the live image is what is running now.
        if !live_marked && record.current.as_deref() == Some(entry.image.as_str()) {
            live_marked = true;
            println!("  {} ← current", line);
        } else {
            println!("  {}", line);
        }
    }

    Ok(())
}
