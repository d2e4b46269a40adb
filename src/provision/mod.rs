use anyhow::{bail, Context, Result};
use std::process::Command;
use tracing::debug;

use crate::config::TerraformConfig;
use crate::output;

/// Thin wrapper over the Terraform CLI. Each environment is a Terraform
/// workspace fed by `<environment>.tfvars` in the Terraform directory.
pub struct Terraform<'a> {
    config: &'a TerraformConfig,
}

impl<'a> Terraform<'a> {
    pub fn new(config: &'a TerraformConfig) -> Self {
        Self { config }
    }

    fn ensure_installed(&self) -> Result<()> {
        if which::which(&self.config.binary).is_err() {
            bail!(
                "'{}' not found on PATH. Install Terraform from https://developer.hashicorp.com/terraform/install",
                self.config.binary
            );
        }
        Ok(())
    }

    fn var_file(environment: &str) -> String {
        format!("-var-file={}.tfvars", environment)
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        debug!("{} {}", self.config.binary, args.join(" "));

        let status = Command::new(&self.config.binary)
            .args(args)
            .current_dir(&self.config.dir)
            .status()
            .with_context(|| format!("Failed to run {} {}", self.config.binary, args[0]))?;

        if !status.success() {
            bail!("{} {} failed ({})", self.config.binary, args.join(" "), status);
        }
        Ok(())
    }

    fn capture(&self, args: &[&str]) -> Result<String> {
        debug!("{} {}", self.config.binary, args.join(" "));

        let out = Command::new(&self.config.binary)
            .args(args)
            .current_dir(&self.config.dir)
            .output()
            .with_context(|| format!("Failed to run {} {}", self.config.binary, args[0]))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            bail!("{} {} failed: {}", self.config.binary, args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    }

    /// `init` plus selecting (or creating) the environment's workspace.
    fn prepare(&self, environment: &str) -> Result<()> {
        self.ensure_installed()?;
        self.run(&["init", "-input=false"])?;
        self.run(&["workspace", "select", "-or-create", environment])
    }

    pub fn plan(&self, environment: &str) -> Result<()> {
        output::header(&format!("Planning infrastructure for {}", environment));
        self.prepare(environment)?;
        self.run(&["plan", "-input=false", &Self::var_file(environment)])
    }

    pub fn apply(&self, environment: &str) -> Result<()> {
        output::header(&format!("Applying infrastructure for {}", environment));
        self.prepare(environment)?;
        self.run(&[
            "apply",
            "-input=false",
            "-auto-approve",
            &Self::var_file(environment),
        ])?;
        output::success("Infrastructure up to date");
        Ok(())
    }

    pub fn destroy(&self, environment: &str) -> Result<()> {
        output::header(&format!("Destroying infrastructure for {}", environment));
        self.prepare(environment)?;
        self.run(&[
            "destroy",
            "-input=false",
            "-auto-approve",
            &Self::var_file(environment),
        ])?;
        output::success("Infrastructure destroyed");
        Ok(())
    }

    /// Raw `terraform output -json` for the environment's workspace.
    pub fn outputs(&self, environment: &str) -> Result<String> {
        self.ensure_installed()?;
        self.run(&["workspace", "select", environment])?;
        self.capture(&["output", "-json"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_file_is_named_after_environment() {
        assert_eq!(Terraform::var_file("prod"), "-var-file=prod.tfvars");
    }

    #[test]
    fn missing_binary_is_reported() {
        let config = TerraformConfig {
            dir: ".".into(),
            binary: "shiplane-no-such-terraform".to_string(),
        };
        let err = Terraform::new(&config).plan("dev").unwrap_err();
        assert!(err.to_string().contains("not found on PATH"));
    }
}
