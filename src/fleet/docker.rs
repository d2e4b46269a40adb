use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::config::{EnvironmentConfig, ShiplaneConfig};
use crate::deploy::context::RuntimeConfig;
use crate::ssh::{SshSession, SshTarget};

use super::{Replica, VersionStack};

/// The replica's version stack together with the container holding its backup.
struct Containers {
    stack: VersionStack,
    backup: Option<String>,
}

/// A replica host running the application as a single Docker container.
///
/// The live container is named after the app; the retained backup is the
/// newest `<app>-backup-<stamp>` container. Backup names sort by time, so
/// the lexically greatest one is the most recent.
pub struct DockerReplica {
    session: SshSession,
    container: String,
    health_endpoint: String,
}

impl DockerReplica {
    pub async fn connect(
        config: &ShiplaneConfig,
        env: &EnvironmentConfig,
        address: &str,
    ) -> Result<Self> {
        let session = SshSession::connect(&SshTarget::for_environment(env), address)
            .await
            .with_context(|| format!("Failed to connect to replica {}", address))?;

        Ok(Self {
            session,
            container: config.app.name.clone(),
            health_endpoint: format!(
                "http://{}:{}{}",
                address,
                config.health_port(),
                config.health_check.path
            ),
        })
    }

    pub async fn close(self) -> Result<()> {
        self.session.close().await
    }

    fn backup_prefix(&self) -> String {
        format!("{}-backup-", self.container)
    }

    fn backup_name(&self) -> String {
        format!("{}{}", self.backup_prefix(), Utc::now().format("%Y%m%d-%H%M%S%3f"))
    }

    async fn image_of(&self, container: &str) -> Result<Option<String>> {
        let out = self
            .session
            .exec(&format!(
                "docker inspect --format '{{{{.Config.Image}}}}' {} 2>/dev/null || true",
                container
            ))
            .await?;

        let image = out.trim();
        Ok((!image.is_empty()).then(|| image.to_string()))
    }

    /// Backup containers, newest first.
    async fn backups(&self) -> Result<Vec<String>> {
        self.session
            .exec_lines(&format!(
                "docker ps -a --filter 'name=^{}' --format '{{{{.Names}}}}' | sort -r",
                self.backup_prefix()
            ))
            .await
    }

    async fn latest_backup(&self) -> Result<Option<String>> {
        Ok(self.backups().await?.into_iter().next())
    }

    async fn prune_backups_except(&self, keep: &str) -> Result<()> {
        for old in self.backups().await? {
            if old != keep {
                debug!("[{}] pruning old backup {}", self.session.host(), old);
                self.session
                    .exec(&format!("docker rm -f {}", old))
                    .await?;
            }
        }
        Ok(())
    }

    async fn inspect(&self) -> Result<Containers> {
        let current = self.image_of(&self.container).await?;
        let backup = self.latest_backup().await?;
        let backup_image = match &backup {
            Some(name) => self.image_of(name).await?,
            None => None,
        };
        Ok(Containers {
            stack: VersionStack::new(current, backup_image),
            backup,
        })
    }

    async fn remove_current(&self) -> Result<()> {
        self.session
            .exec(&format!("docker rm -f {} 2>/dev/null || true", self.container))
            .await?;
        Ok(())
    }

    async fn promote(&self, backup: &str) -> Result<()> {
        self.session
            .exec(&format!(
                "docker rename {} {} && docker start {}",
                backup, self.container, self.container
            ))
            .await
            .with_context(|| format!("Failed to promote backup {}", backup))?;
        Ok(())
    }
}

#[async_trait]
impl Replica for DockerReplica {
    fn id(&self) -> &str {
        self.session.host()
    }

    fn health_endpoint(&self) -> String {
        self.health_endpoint.clone()
    }

    async fn backup(&self) -> Result<()> {
        let mut state = self.inspect().await?;
        if !state.stack.backup() {
            debug!("[{}] nothing running, no backup taken", self.id());
            return Ok(());
        }

        let name = self.backup_name();
        self.session
            .exec(&format!("docker rename {} {}", self.container, name))
            .await
            .context("Failed to retain running container as backup")?;

        // Older backups only cost disk space.
        if let Err(e) = self.prune_backups_except(&name).await {
            warn!("[{}] could not prune old backups: {:#}", self.id(), e);
        }

        debug!("[{}] backup {} holds {:?}", self.id(), name, state.stack.backup);
        Ok(())
    }

    async fn launch(&self, image: &str, runtime: &RuntimeConfig) -> Result<()> {
        let mut state = self.inspect().await?;

        let env_file = runtime.env_file_path();
        self.session
            .exec(&format!("mkdir -p {}", runtime.app_dir))
            .await?;
        self.session
            .write_private_file(&env_file, &runtime.render_env_file()?)
            .await?;
        self.session.exec(&format!("chmod 600 {}", env_file)).await?;

        self.session
            .exec(&format!("docker pull {}", image))
            .await
            .with_context(|| format!("Failed to pull {}", image))?;

        // The backup still holds the published port
        if let Some(backup) = &state.backup {
            self.session
                .exec(&format!("docker stop {}", backup))
                .await?;
        }
        self.remove_current().await?;

        self.session
            .exec(&format!(
                "docker run -d --name {} --restart unless-stopped -p {}:{} --env-file {} {}",
                self.container, runtime.publish_port, runtime.container_port, env_file, image
            ))
            .await
            .with_context(|| format!("Failed to start {}", image))?;

        state.stack.launch(image);
        let running = self.image_of(&self.container).await?;
        if running != state.stack.current {
            bail!("{} runs {:?} after launching {}", self.id(), running, image);
        }
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        let mut state = self.inspect().await?;
        state.stack.restore();
        self.remove_current().await?;

        match (state.stack.current, state.backup) {
            (Some(image), Some(backup)) => {
                self.promote(&backup).await?;
                debug!("[{}] restored {} from {}", self.id(), image, backup);
            }
            _ => debug!("[{}] no backup to restore, replica left empty", self.id()),
        }
        Ok(())
    }

    async fn revert(&self) -> Result<()> {
        let mut state = self.inspect().await?;
        state
            .stack
            .revert()
            .with_context(|| format!("{} cannot revert", self.id()))?;
        let backup = state
            .backup
            .with_context(|| format!("{} has no backup container to revert to", self.id()))?;

        // After the swap the backup slot holds what was running.
        if state.stack.backup.is_some() {
            let parked = self.backup_name();
            self.session
                .exec(&format!(
                    "docker stop {} && docker rename {} {}",
                    self.container, self.container, parked
                ))
                .await
                .context("Failed to park running container")?;
        }

        self.promote(&backup).await?;
        debug!("[{}] reverted to {:?}", self.id(), state.stack.current);
        Ok(())
    }

    async fn versions(&self) -> Result<VersionStack> {
        Ok(self.inspect().await?.stack)
    }
}
