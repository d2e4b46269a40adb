pub mod docker;
pub mod stack;

use anyhow::Result;
use async_trait::async_trait;

use crate::deploy::context::RuntimeConfig;

pub use stack::VersionStack;

/// One running instance of the application, as the coordinator drives it.
///
/// Implementations must keep `backup` ahead of `launch`: the coordinator
/// only launches on a replica whose backup call returned `Ok`.
#[async_trait]
pub trait Replica: Send + Sync {
    fn id(&self) -> &str;

    fn health_endpoint(&self) -> String;

    /// Keep the running container aside as the most recent backup.
    async fn backup(&self) -> Result<()>;

    /// Replace the running container with `image`.
    async fn launch(&self, image: &str, runtime: &RuntimeConfig) -> Result<()>;

    /// Throw away the running container and bring the backup back.
    async fn restore(&self) -> Result<()>;

    /// Swap the running container with the backup.
    async fn revert(&self) -> Result<()>;

    async fn versions(&self) -> Result<VersionStack>;
}
