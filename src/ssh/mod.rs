pub mod exec;

use anyhow::{Context, Result};
use openssh::{KnownHosts, Session, SessionBuilder};
use tracing::debug;

use crate::config::EnvironmentConfig;

/// Connection settings shared by every replica of one environment.
#[derive(Debug, Clone, Copy)]
pub struct SshTarget<'a> {
    pub user: &'a str,
    pub port: Option<u16>,
    pub bastion: Option<&'a str>,
}

impl<'a> SshTarget<'a> {
    pub fn for_environment(env: &'a EnvironmentConfig) -> Self {
        Self {
            user: env.user(),
            port: env.port,
            bastion: env.bastion.as_deref(),
        }
    }
}

/// Remote command transport to one replica host.
pub struct SshSession {
    session: Session,
    host: String,
}

impl SshSession {
    pub async fn connect(target: &SshTarget<'_>, host: &str) -> Result<Self> {
        match target.bastion {
            Some(jump) => debug!("Connecting to {}@{} via {}", target.user, host, jump),
            None => debug!("Connecting to {}@{}", target.user, host),
        }

        let mut builder = SessionBuilder::default();
        builder
            .known_hosts_check(KnownHosts::Accept)
            .user(target.user.to_string());
        if let Some(port) = target.port {
            builder.port(port);
        }
        if let Some(jump) = target.bastion {
            builder.jump_hosts([jump]);
        }

        let session = builder
            .connect(host)
            .await
            .with_context(|| format!("Failed to connect to {}@{}", target.user, host))?;

        Ok(Self {
            session,
            host: host.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn close(self) -> Result<()> {
        self.session
            .close()
            .await
            .with_context(|| format!("Failed to close SSH session to {}", self.host))
    }
}
