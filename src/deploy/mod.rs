pub mod context;
pub mod rollback;
pub mod steps;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::error::DeployError;
use crate::fleet::Replica;
use crate::health::{FleetHealthProber, FleetVerdict};
use crate::history::lock::EnvironmentLock;
use crate::history::{DeploymentRecord, HistoryStore};
use crate::output;
use crate::resolve::ImageResolver;

use context::RuntimeConfig;

const TOTAL_STEPS: usize = 4;

/// Where a transition moves the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every replica runs this image.
    Image(String),
    /// Every replica goes back to its own retained backup. `nominal` is the
    /// image the ledger records for the transition.
    LocalBackups { nominal: String },
}

impl Target {
    pub fn recorded_image(&self) -> &str {
        match self {
            Target::Image(image) => image,
            Target::LocalBackups { nominal } => nominal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub environment: String,
    pub target: Target,
    pub action: Action,
}

impl Transition {
    /// Forward transition for `deploy`, `deploy-app` and `update-app`.
    pub fn update(
        resolver: &ImageResolver<'_>,
        environment: &str,
        action: Action,
        explicit: Option<&str>,
    ) -> Result<Self, DeployError> {
        let image = resolver.resolve(environment, action, explicit)?;
        Ok(Self {
            environment: environment.to_string(),
            target: Target::Image(image),
            action,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    BackingUp,
    Launching,
    Probing,
    Committed,
    RolledBack,
}

impl Phase {
    fn may_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, BackingUp)
                | (BackingUp, Launching)
                | (Launching, Probing)
                | (Probing, Committed)
                | (Probing, RolledBack)
        )
    }
}

#[derive(Debug)]
pub struct ReplicaFailure {
    pub replica: String,
    pub error: DeployError,
}

#[derive(Debug)]
pub enum Outcome {
    Committed {
        image: String,
        record: DeploymentRecord,
        url: Option<String>,
    },
    RolledBack {
        failures: Vec<ReplicaFailure>,
        /// Set when every replica passed but the ledger write did not.
        commit_error: Option<DeployError>,
        restored: Vec<String>,
        restore_failures: Vec<(String, String)>,
        recovery: FleetVerdict,
    },
}

#[derive(Debug)]
pub struct TransitionReport {
    pub phases: Vec<Phase>,
    pub outcome: Outcome,
}


/// Drives one transition across a fleet: back up, launch, probe, then
/// commit to the ledger or restore every touched replica.
///
/// The ledger is written only on commit; a rolled-back transition leaves it
/// exactly as it was.
pub struct Coordinator<'a> {
    store: &'a HistoryStore,
    prober: &'a FleetHealthProber,
    runtime: &'a RuntimeConfig,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        store: &'a HistoryStore,
        prober: &'a FleetHealthProber,
        runtime: &'a RuntimeConfig,
    ) -> Self {
        Self {
            store,
            prober,
            runtime,
        }
    }

    pub async fn execute(
        &self,
        lock: &EnvironmentLock,
        transition: &Transition,
        replicas: &[&dyn Replica],
        url: Option<&str>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<TransitionReport, DeployError> {
        if lock.environment() != transition.environment {
            return Err(DeployError::config(format!(
                "lock held for '{}' cannot cover a transition of '{}'",
                lock.environment(),
                transition.environment
            )));
        }
        if replicas.is_empty() {
            return Err(DeployError::config(format!(
                "no replicas found for '{}'",
                transition.environment
            )));
        }

        let mut phases = vec![Phase::Idle];
        let mut advance = |next: Phase| {
            let current = *phases.last().unwrap_or(&Phase::Idle);
            debug_assert!(current.may_advance_to(next), "{:?} -> {:?}", current, next);
            debug!("{}: {:?} -> {:?}", transition.environment, current, next);
            phases.push(next);
        };

        info!(
            "{} {} -> {} on {} replica(s)",
            transition.action,
            transition.environment,
            transition.target.recorded_image(),
            replicas.len()
        );

        // Backup and launch are one per-replica pipeline so a replica never
        // launches before its own backup finished.
        advance(Phase::BackingUp);
        output::step(1, TOTAL_STEPS, "Backing up running containers");
        advance(Phase::Launching);
        output::step(
            2,
            TOTAL_STEPS,
            &match &transition.target {
                Target::Image(image) => format!("Launching {}", image),
                Target::LocalBackups { .. } => "Reverting each replica to its backup".to_string(),
            },
        );
        let prepared = steps::prepare_all(replicas, &transition.target, self.runtime).await;

        let mut failures = Vec::new();
        let mut launched = Vec::new();
        let mut touched = Vec::new();
        for (replica, prep) in replicas.iter().zip(prepared) {
            if prep.touched {
                touched.push(*replica);
            }
            match prep.result {
                Ok(()) => launched.push(*replica),
                Err(error) => failures.push(ReplicaFailure {
                    replica: replica.id().to_string(),
                    error,
                }),
            }
        }

        advance(Phase::Probing);
        output::step(3, TOTAL_STEPS, "Probing replica health");
        let endpoints: Vec<String> = launched.iter().map(|r| r.health_endpoint()).collect();
        let spinner = output::create_spinner(&format!(
            "Waiting up to {}s for {} replica(s) to report healthy ...",
            self.prober.policy().max_wait().as_secs(),
            endpoints.len()
        ));
        let verdict = self.prober.probe(&endpoints, cancel).await;
        spinner.finish_and_clear();

        for (replica, replica_verdict) in launched.iter().zip(&verdict.replicas) {
            if let Some(error) = replica_verdict.failure(replica.id()) {
                debug!("[{}] unhealthy at {}", replica.id(), replica_verdict.endpoint);
                failures.push(ReplicaFailure {
                    replica: replica.id().to_string(),
                    error,
                });
            }
        }

        // A fleet that passed but could not be recorded is rolled back like
        // any other failure, so the ledger and the fleet never disagree.
        let mut commit_error = None;
        if failures.is_empty() && verdict.is_healthy() {
            output::success(&format!("{} replica(s) healthy", verdict.healthy_count()));
            output::step(4, TOTAL_STEPS, "Recording deployment");

            let image = transition.target.recorded_image().to_string();
            match self.store.record(
                &transition.environment,
                &image,
                transition.action.as_str(),
                Utc::now(),
            ) {
                Ok(record) => {
                    advance(Phase::Committed);
                    return Ok(TransitionReport {
                        phases,
                        outcome: Outcome::Committed {
                            image,
                            record,
                            url: url.map(str::to_string),
                        },
                    });
                }
                Err(error) => {
                    warn!("Recording {} in {} failed: {}", image, self.store.location(), error);
                    output::error(&format!("Could not record the deployment: {}", error));
                    commit_error = Some(error);
                }
            }
        }

        for failure in &failures {
            output::error(&failure.error.to_string());
        }
        if commit_error.is_none() {
            output::warning(&format!(
                "{} of {} replica(s) failed, rolling back",
                failures.len(),
                replicas.len()
            ));
        } else {
            output::warning("Rolling back the unrecorded transition");
        }
        advance(Phase::RolledBack);
        output::step(4, TOTAL_STEPS, "Restoring backups");

        let restore_failures: Vec<(String, String)> =
            steps::recover_all(&touched, &transition.target)
                .await
                .into_iter()
                .map(|(replica, e)| {
                    warn!("[{}] restore failed: {:#}", replica, e);
                    (replica, format!("{:#}", e))
                })
                .collect();

        let restored: Vec<&dyn Replica> = touched
            .into_iter()
            .filter(|r| !restore_failures.iter().any(|(id, _)| id == r.id()))
            .collect();

        // The operator may already have cancelled; recovery is probed regardless.
        let (_keep_open, recovery_cancel) = watch::channel(false);
        let recovery_endpoints: Vec<String> =
            restored.iter().map(|r| r.health_endpoint()).collect();
        let recovery = self.prober.probe(&recovery_endpoints, &recovery_cancel).await;

        if recovery.is_healthy() && restore_failures.is_empty() {
            output::success("Previous containers restored and healthy");
        } else {
            output::error("Recovery incomplete, inspect the fleet manually");
        }

        Ok(TransitionReport {
            phases,
            outcome: Outcome::RolledBack {
                failures,
                commit_error,
                restored: restored.iter().map(|r| r.id().to_string()).collect(),
                restore_failures,
                recovery,
            },
        })
    }
}
