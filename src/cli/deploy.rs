use anyhow::Result;

use crate::action::Action;
use crate::config::ShiplaneConfig;
use crate::provision::Terraform;

use super::{app, confirm, setup};

pub async fn run(
    config: ShiplaneConfig,
    environment: &str,
    action: Action,
    image: Option<&str>,
    assume_yes: bool,
) -> Result<()> {
    // Unknown environments fail before the operator is asked anything.
    config.environment(environment)?;
    confirm::confirm(environment, action, assume_yes)?;

    let terraform = Terraform::new(&config.terraform);

    match action {
        Action::Plan => terraform.plan(environment),
        Action::Apply => terraform.apply(environment),
        Action::Destroy => terraform.destroy(environment),
        Action::Deploy => {
            terraform.apply(environment)?;
            println!();
            app::run(&config, environment, action, image).await
        }
        Action::SetupEnv => setup::run(&config, environment).await,
        Action::DeployApp | Action::UpdateApp | Action::Rollback => {
            app::run(&config, environment, action, image).await
        }
    }
}
