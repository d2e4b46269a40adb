use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::DeployError;
use crate::fleet::Replica;

use super::context::RuntimeConfig;
use super::Target;

/// What happened on one replica before probing.
#[derive(Debug)]
pub struct Prepared {
    /// The replica's running container was changed and needs undoing on failure.
    pub touched: bool,
    pub result: Result<(), DeployError>,
}

/// Backup then launch on every replica concurrently. Within a replica the
/// launch only starts once its backup has succeeded.
pub async fn prepare_all(
    replicas: &[&dyn Replica],
    target: &Target,
    runtime: &RuntimeConfig,
) -> Vec<Prepared> {
    join_all(replicas.iter().map(|r| prepare(*r, target, runtime))).await
}

async fn prepare(replica: &dyn Replica, target: &Target, runtime: &RuntimeConfig) -> Prepared {
    let failed = |touched: bool, stage: &str, e: anyhow::Error| {
        warn!("[{}] {} failed: {:#}", replica.id(), stage, e);
        Prepared {
            touched,
            result: Err(DeployError::ReplicaLaunch {
                replica: replica.id().to_string(),
                reason: format!("{}: {:#}", stage, e),
            }),
        }
    };

    match target {
        Target::Image(image) => {
            let before = match replica.versions().await {
                Ok(stack) => stack,
                Err(e) => return failed(false, "backup", e),
            };
            if let Err(e) = replica.backup().await {
                // A backup that failed after moving the running version aside
                // still has to be undone.
                let touched = match replica.versions().await {
                    Ok(after) => after != before,
                    Err(read) => {
                        warn!("[{}] state unknown after failed backup: {:#}", replica.id(), read);
                        false
                    }
                };
                return failed(touched, "backup", e);
            }
            debug!("[{}] backed up, launching {}", replica.id(), image);

            if let Err(e) = replica.launch(image, runtime).await {
                return failed(true, "launch", e);
            }
        }
        Target::LocalBackups { .. } => {
            if let Err(e) = replica.revert().await {
                return failed(false, "revert", e);
            }
            debug!("[{}] reverted to its retained backup", replica.id());
        }
    }

    Prepared {
        touched: true,
        result: Ok(()),
    }
}

/// Undo the transition on the given replicas. Forward launches restore their
/// backup; backup reverts swap back. Returns per-replica failures.
pub async fn recover_all(replicas: &[&dyn Replica], target: &Target) -> Vec<(String, anyhow::Error)> {
    let undo = replicas.iter().map(|replica| async move {
        let result = match target {
            Target::Image(_) => replica.restore().await,
            Target::LocalBackups { .. } => replica.revert().await,
        };
        result.err().map(|e| (replica.id().to_string(), e))
    });

    join_all(undo).await.into_iter().flatten().collect()
}
