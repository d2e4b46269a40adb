use anyhow::{Context, Result};

use crate::config::ShiplaneConfig;
use crate::inventory;
use crate::output;
use crate::ssh::{SshSession, SshTarget};

const INSTALL_DOCKER: &str = "curl -fsSL https://get.docker.com | sh";

pub async fn run(config: &ShiplaneConfig, environment: &str) -> Result<()> {
    let env = config.environment(environment)?;
    let target = SshTarget::for_environment(env);
    let user = target.user;
    let app_dir = config.app_dir();

    output::header(&format!(
        "Setting up {} for {}",
        environment, config.app.name
    ));

    let fleet = inventory::discover(config, environment, env)?;
    if fleet.replicas.is_empty() {
        output::warning("No replicas to set up");
        return Ok(());
    }

    for address in &fleet.replicas {
        output::info(&format!("Setting up {}", address));

        let session = SshSession::connect(&target, address).await?;

        install_docker(&session).await?;
        add_docker_group(&session, user).await;
        create_app_dir(&session, user, &app_dir).await?;

        session.close().await?;
        output::success(&format!("Replica {} is ready", address));
    }

    println!();
    output::success(&format!(
        "Setup complete! Deploy with: shiplane deploy {} deploy-app",
        environment
    ));
    Ok(())
}

async fn install_docker(session: &SshSession) -> Result<()> {
    if session.exec_ok("command -v docker").await? {
        output::success("Docker already installed");
        return Ok(());
    }

    let spinner = output::create_spinner("Installing Docker...");
    session
        .sudo_exec(INSTALL_DOCKER)
        .await
        .context("Failed to install Docker")?;
    spinner.finish_and_clear();

    output::success("Docker installed");
    Ok(())
}

// Already a member is the common case; a failure here is not fatal.
async fn add_docker_group(session: &SshSession, user: &str) {
    let _ = session
        .sudo_exec(&format!("usermod -aG docker {}", user))
        .await;
}

async fn create_app_dir(session: &SshSession, user: &str, app_dir: &str) -> Result<()> {
    if session.path_exists(app_dir).await? {
        output::success(&format!("{} already exists", app_dir));
        return Ok(());
    }

    session
        .sudo_exec(&format!(
            "mkdir -p {dir} && chown {user}:{user} {dir}",
            dir = app_dir,
            user = user
        ))
        .await
        .with_context(|| format!("Failed to create {}", app_dir))?;

    output::success(&format!("Created {}", app_dir));
    Ok(())
}
