use tracing::debug;

use crate::action::Action;
use crate::config::ShiplaneConfig;
use crate::error::DeployError;
use crate::history::HistoryStore;

/// Picks the image a transition should move the fleet to.
///
/// Reads the environment config and the ledger, never writes either.
pub struct ImageResolver<'a> {
    config: &'a ShiplaneConfig,
    store: &'a HistoryStore,
}

impl<'a> ImageResolver<'a> {
    pub fn new(config: &'a ShiplaneConfig, store: &'a HistoryStore) -> Self {
        Self { config, store }
    }

    pub fn resolve(
        &self,
        environment: &str,
        action: Action,
        explicit: Option<&str>,
    ) -> Result<String, DeployError> {
        if !action.moves_image() {
            return Err(DeployError::config(format!(
                "'{}' does not deploy an image",
                action
            )));
        }

        if let Some(image) = explicit {
            let image = image.trim();
            if image.is_empty() {
                return Err(DeployError::config("--image was given an empty value"));
            }
            debug!("Using explicit image {} for {} {}", image, action, environment);
            return Ok(image.to_string());
        }

        match action {
            Action::Rollback => self
                .store
                .previous_image(environment)?
                .ok_or_else(|| DeployError::NoPriorDeployment {
                    environment: environment.to_string(),
                }),
            _ => {
                let env = self
                    .config
                    .environments
                    .get(environment)
                    .ok_or_else(|| {
                        DeployError::config(format!(
                            "environment '{}' is not declared in the config",
                            environment
                        ))
                    })?;

                env.docker_image.clone().ok_or_else(|| {
                    DeployError::config(format!(
                        "environment '{}' declares no docker_image; set one or pass --image",
                        environment
                    ))
                })
            }
        }
    }
}
