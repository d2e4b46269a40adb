use thiserror::Error;

/// Failures the deployment core distinguishes.
///
/// Resolution and configuration variants abort before anything is touched.
/// Replica-level variants are collected per replica and resolved through the
/// rollback path instead of being returned raw.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no prior deployment recorded for '{environment}'; pass --image to choose a rollback target")]
    NoPriorDeployment { environment: String },

    #[error("deployment ledger is corrupt: {0}")]
    LedgerCorruption(String),

    #[error("launch failed on {replica}: {reason}")]
    ReplicaLaunch { replica: String, reason: String },

    #[error("{replica} did not report healthy after {attempts} attempt(s)")]
    HealthProbeTimeout { replica: String, attempts: u32 },

    #[error("'{action}' against '{environment}' requires confirmation (re-run interactively or pass --yes)")]
    ConfirmationRequired { environment: String, action: String },

    #[error("another transition is already running for '{environment}' (lock: {lock})")]
    TransitionInProgress { environment: String, lock: String },

    #[error("ledger I/O failed: {0}")]
    Ledger(#[from] std::io::Error),
}

impl DeployError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
