use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DeployError;

#[derive(Debug, Serialize, Deserialize)]
struct LockOwner {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Exclusive claim on one environment for the duration of a transition.
///
/// Backed by a lock file created with create-new semantics so a second
/// invocation, in this process or another, fails instead of interleaving.
/// The file is removed when the guard drops.
#[derive(Debug)]
pub struct EnvironmentLock {
    environment: String,
    path: PathBuf,
}

impl EnvironmentLock {
    pub fn acquire(lock_dir: &Path, environment: &str) -> Result<Self, DeployError> {
        fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(format!("{}.lock", environment));

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(DeployError::TransitionInProgress {
                    environment: environment.to_string(),
                    lock: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let owner = LockOwner {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let body = serde_json::to_string(&owner).unwrap_or_default();
        file.write_all(body.as_bytes())?;

        debug!("Acquired {}", path.display());
        Ok(Self {
            environment: environment.to_string(),
            path,
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}

impl Drop for EnvironmentLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}
