use clap::ValueEnum;
use std::fmt;

/// What the operator asked `shiplane deploy` to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Show the infrastructure changes Terraform would make
    Plan,
    /// Create or update the environment's infrastructure
    Apply,
    /// Apply infrastructure, then deploy the application
    Deploy,
    /// Tear down the environment's infrastructure
    Destroy,
    /// Prepare replicas (Docker, application directory)
    SetupEnv,
    /// Deploy the application image to the fleet
    DeployApp,
    /// Roll the fleet forward to a new image
    UpdateApp,
    /// Return the fleet to the previous image
    Rollback,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Plan => "plan",
            Action::Apply => "apply",
            Action::Deploy => "deploy",
            Action::Destroy => "destroy",
            Action::SetupEnv => "setup-env",
            Action::DeployApp => "deploy-app",
            Action::UpdateApp => "update-app",
            Action::Rollback => "rollback",
        }
    }

    /// Actions that change what the fleet runs.
    pub fn moves_image(&self) -> bool {
        matches!(
            self,
            Action::Deploy | Action::DeployApp | Action::UpdateApp | Action::Rollback
        )
    }

    /// Actions that need an explicit yes before touching production.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Action::Apply | Action::Deploy | Action::Destroy | Action::Rollback
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
