use anyhow::{bail, Context, Result};
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::action::Action;
use crate::config::ShiplaneConfig;
use crate::deploy::context::RuntimeConfig;
use crate::deploy::{rollback, Coordinator, Outcome, Transition};
use crate::fleet::docker::DockerReplica;
use crate::fleet::Replica;
use crate::health::{FleetHealthProber, ProbePolicy};
use crate::history::lock::EnvironmentLock;
use crate::history::HistoryStore;
use crate::inventory;
use crate::output;
use crate::resolve::ImageResolver;

/// `deploy-app`, `update-app` and `rollback`: move the fleet to a new image
/// and report a single outcome.
pub async fn run(
    config: &ShiplaneConfig,
    environment: &str,
    action: Action,
    image: Option<&str>,
) -> Result<()> {
    let env = config.environment(environment)?;

    let lock = EnvironmentLock::acquire(&config.ledger.lock_dir, environment)?;
    let store = HistoryStore::open(&config.ledger.path);
    let resolver = ImageResolver::new(config, &store);

    // Everything that can fail on configuration fails here, before any
    // replica is contacted.
    let transition = match action {
        Action::Rollback => rollback::select(&resolver, environment, image)?,
        _ => Transition::update(&resolver, environment, action, image)?,
    };
    let fleet = inventory::discover(config, environment, env)?;
    let runtime = RuntimeConfig::resolve(
        config,
        environment,
        env,
        fleet.database_host.as_deref(),
        |name| std::env::var(name).ok(),
    )?;
    if fleet.replicas.is_empty() {
        bail!("No replicas found for '{}'", environment);
    }

    output::header(&format!(
        "{} {} on {} ({})",
        action,
        config.app.name,
        environment,
        transition.target.recorded_image()
    ));
    output::field("live", store.current_image(environment)?.as_deref());

    let connections = join_all(
        fleet
            .replicas
            .iter()
            .map(|address| DockerReplica::connect(config, env, address)),
    )
    .await;
    let mut replicas: Vec<DockerReplica> = Vec::with_capacity(connections.len());
    for connection in connections {
        replicas.push(connection?);
    }
    let fleet_refs: Vec<&dyn Replica> = replicas.iter().map(|r| r as &dyn Replica).collect();

    let (cancel_tx, cancel) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output::warning("Interrupted, treating as failed health check");
            let _ = cancel_tx.send(true);
        }
    });

    let prober = FleetHealthProber::http(ProbePolicy::from_config(&config.health_check));
    let coordinator = Coordinator::new(&store, &prober, &runtime);
    let report = coordinator
        .execute(&lock, &transition, &fleet_refs, fleet.url.as_deref(), &cancel)
        .await;
    interrupt.abort();
    drop(fleet_refs);

    for replica in replicas {
        let host = replica.id().to_string();
        if let Err(e) = replica.close().await {
            warn!("Failed to close session to {}: {:#}", host, e);
        }
    }
    let report = report.context("Transition aborted")?;
    debug!("{} went through {:?}", environment, report.phases);

    println!();
    match report.outcome {
        Outcome::Committed { image, record, url } => {
            output::success(&format!("{} is live on {}", image, environment));
            output::field("previous", record.previous.as_deref());
            if let Some(url) = url {
                output::url("Application", &url);
            }
            Ok(())
        }
        Outcome::RolledBack {
            failures,
            commit_error,
            restored,
            restore_failures,
            recovery,
        } => {
            if let Some(error) = &commit_error {
                output::error(&format!("Ledger not updated: {}", error));
            }
            if !failures.is_empty() {
                let failed: Vec<&str> = failures.iter().map(|f| f.replica.as_str()).collect();
                output::error(&format!(
                    "{} of {} replica(s) failed: {}",
                    failed.len(),
                    fleet.replicas.len(),
                    failed.join(", ")
                ));
            }
            for (replica, reason) in &restore_failures {
                output::replica_error(replica, format_args!("could not be restored: {}", reason));
            }

            let recovered = recovery.is_healthy() && restore_failures.is_empty();
            if recovered {
                output::info(&format!("Restored {} replica(s) from backup", restored.len()));
            } else {
                output::warning(&format!(
                    "Only {} of {} restored replica(s) answer health checks",
                    recovery.healthy_count(),
                    restored.len()
                ));
            }

            bail!(
                "{} to {} was rolled back{}; the ledger still shows the previous state",
                action,
                transition.target.recorded_image(),
                if recovered { "" } else { " incompletely" }
            )
        }
    }
}
