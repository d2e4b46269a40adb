use anyhow::{bail, Result};

/// What one replica runs, plus the single backup it keeps for recovery.
///
/// `backup` must happen before `launch` overwrites `current`, otherwise
/// `restore` has nothing to go back to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionStack {
    pub current: Option<String>,
    pub backup: Option<String>,
}

impl VersionStack {
    pub fn new(current: Option<String>, backup: Option<String>) -> Self {
        Self { current, backup }
    }

    /// Retains the running image as the backup, dropping any older one.
    /// Returns false when nothing was running.
    pub fn backup(&mut self) -> bool {
        match &self.current {
            Some(image) => {
                self.backup = Some(image.clone());
                true
            }
            None => false,
        }
    }

    pub fn launch(&mut self, image: &str) {
        self.current = Some(image.to_string());
    }

    /// Discards the running image and promotes the backup.
    pub fn restore(&mut self) {
        self.current = self.backup.take();
    }

    /// Swaps running and backup images so the swap can itself be undone.
    pub fn revert(&mut self) -> Result<()> {
        if self.backup.is_none() {
            bail!("no backup retained to revert to");
        }
        std::mem::swap(&mut self.current, &mut self.backup);
        Ok(())
    }
}
